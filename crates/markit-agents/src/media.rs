//! Inline image directives in assistant replies.
//!
//! The chat agent asks for an image by embedding
//! `<IMAGE_PROMPT>…</IMAGE_PROMPT>` in its reply, optionally followed by a
//! `Caption: …` line. The reply text itself is never rewritten.

use std::sync::LazyLock;

use markit_llm::{extract_asset_reference, ImageProvider};
use regex::Regex;
use serde::Serialize;

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<IMAGE_PROMPT>(.*?)</IMAGE_PROMPT>").expect("valid regex")
});
static CAPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*caption[ \t]*:[ \t]*(.+?)[ \t]*$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaDirective {
    pub prompt: String,
    pub caption: Option<String>,
}

/// The first image directive in `text`, if any.
///
/// Both delimiters are required and the enclosed prompt must be non-blank.
/// The caption is the first `Caption:` line after the closing delimiter.
#[must_use]
pub fn extract_directive(text: &str) -> Option<MediaDirective> {
    let captures = DIRECTIVE_RE.captures(text)?;
    let prompt = captures.get(1)?.as_str().trim();
    if prompt.is_empty() {
        return None;
    }
    let end = captures.get(0)?.end();
    let caption = CAPTION_RE
        .captures(&text[end..])
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty());

    Some(MediaDirective {
        prompt: prompt.to_string(),
        caption,
    })
}

/// Generate the image for `directive` and attach the outcome to reply meta.
///
/// Sets `image` to `{prompt, caption, asset_reference}` and, on failure,
/// `image_error`. Never fails the turn.
pub(crate) async fn attach_image(
    images: Option<&dyn ImageProvider>,
    directive: &MediaDirective,
    meta: &mut serde_json::Map<String, serde_json::Value>,
) {
    let mut asset_reference = None;
    match images {
        None => {
            tracing::debug!("image directive found but image generation is disabled");
        }
        Some(images) => match images.generate_image(&directive.prompt).await {
            Ok(payload) => match extract_asset_reference(&payload) {
                Some(asset) => asset_reference = Some(asset.to_reference_string()),
                None => {
                    tracing::warn!("image response carried no recognisable asset");
                    meta.insert(
                        "image_error".to_string(),
                        serde_json::Value::String("no asset in image response".to_string()),
                    );
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "image generation failed");
                meta.insert(
                    "image_error".to_string(),
                    serde_json::Value::String(e.to_string()),
                );
            }
        },
    }

    meta.insert(
        "image".to_string(),
        serde_json::json!({
            "prompt": directive.prompt,
            "caption": directive.caption,
            "asset_reference": asset_reference,
        }),
    );
}
