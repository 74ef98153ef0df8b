//! Reads the generated asset out of an image-generation payload.
//!
//! The payload shape differs between the Images API and the Responses
//! `image_generation` tool. [`extract_asset_reference`] is the single adapter
//! that knows those shapes; callers only see an [`AssetReference`].

use serde::Serialize;

const DEFAULT_MEDIA_TYPE: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetReference {
    Url { url: String },
    Inline { media_type: String, base64: String },
}

impl AssetReference {
    /// A single string usable as an `<img src>`: the URL, or a data URI.
    #[must_use]
    pub fn to_reference_string(&self) -> String {
        match self {
            AssetReference::Url { url } => url.clone(),
            AssetReference::Inline { media_type, base64 } => {
                format!("data:{media_type};base64,{base64}")
            }
        }
    }
}

/// Find the first asset in an image payload.
///
/// Recognised shapes, in order:
/// - Images API: `{"data": [{"url": …} | {"b64_json": …}]}`
/// - Responses API: `{"output": [{"type": "image_generation_call", "result": <b64>}]}`
/// - Bare: `{"url": …}` or `{"b64_json": …}`
#[must_use]
pub fn extract_asset_reference(payload: &serde_json::Value) -> Option<AssetReference> {
    let media_type = payload
        .get("output_format")
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| DEFAULT_MEDIA_TYPE.to_string(), |f| format!("image/{f}"));

    if let Some(items) = payload.get("data").and_then(serde_json::Value::as_array) {
        if let Some(found) = items.iter().find_map(|item| from_item(item, &media_type)) {
            return Some(found);
        }
    }

    if let Some(items) = payload.get("output").and_then(serde_json::Value::as_array) {
        let found = items
            .iter()
            .filter(|item| {
                item.get("type").and_then(serde_json::Value::as_str)
                    == Some("image_generation_call")
            })
            .find_map(|item| {
                non_empty_str(item, "result").map(|b64| AssetReference::Inline {
                    media_type: item
                        .get("output_format")
                        .and_then(serde_json::Value::as_str)
                        .map_or_else(|| media_type.clone(), |f| format!("image/{f}")),
                    base64: b64.to_string(),
                })
            });
        if found.is_some() {
            return found;
        }
    }

    from_item(payload, &media_type)
}

fn from_item(item: &serde_json::Value, media_type: &str) -> Option<AssetReference> {
    if let Some(url) = non_empty_str(item, "url") {
        return Some(AssetReference::Url {
            url: url.to_string(),
        });
    }
    non_empty_str(item, "b64_json").map(|b64| AssetReference::Inline {
        media_type: media_type.to_string(),
        base64: b64.to_string(),
    })
}

fn non_empty_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
