use crate::app_config::{AirtableConfig, AppConfig, Environment};
use crate::ConfigError;

const DEFAULT_AIRTABLE_TABLE: &str = "OAI Hackathon";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let openai_api_key = require("OPENAI_API_KEY")?;

    let env = parse_environment(&or_default("MARKIT_ENV", "development"));
    let bind_addr = or_default("MARKIT_BIND_ADDR", "0.0.0.0:8000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("MARKIT_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("MARKIT_LOG_LEVEL", "info");
    let prompts_path = PathBuf::from(or_default("MARKIT_PROMPTS_PATH", "./config/prompts.yaml"));

    let openai_base_url = or_default("MARKIT_OPENAI_BASE_URL", "https://api.openai.com/v1")
        .trim_end_matches('/')
        .to_string();
    let model = or_default("MARKIT_MODEL", "gpt-5");
    let image_model = or_default("MARKIT_IMAGE_MODEL", "gpt-image-1");
    let provider_timeout_secs = parse_u64("MARKIT_PROVIDER_TIMEOUT_SECS", "300")?;
    let provider_max_retries = or_default("MARKIT_PROVIDER_MAX_RETRIES", "2")
        .parse::<u32>()
        .map_err(|e| invalid("MARKIT_PROVIDER_MAX_RETRIES", e.to_string()))?;
    let provider_backoff_base_ms = parse_u64("MARKIT_PROVIDER_BACKOFF_BASE_MS", "1000")?;
    let images_enabled = parse_bool("MARKIT_IMAGES_ENABLED", "true")?;

    let airtable_timeout_secs = parse_u64("MARKIT_AIRTABLE_TIMEOUT_SECS", "30")?;
    let airtable = match (optional("AIRTABLE_API_KEY"), optional("AIRTABLE_BASE_ID")) {
        (Some(api_key), Some(base_id)) => Some(AirtableConfig {
            api_key,
            base_id,
            table: sanitize_table_name(&or_default("AIRTABLE_TABLE", DEFAULT_AIRTABLE_TABLE)),
            timeout_secs: airtable_timeout_secs,
        }),
        _ => None,
    };

    let session_ttl_secs = parse_u64("MARKIT_SESSION_TTL_SECS", "86400")?;
    if session_ttl_secs == 0 {
        return Err(invalid(
            "MARKIT_SESSION_TTL_SECS",
            "must be greater than zero".to_string(),
        ));
    }
    let session_sweep_cron = or_default("MARKIT_SESSION_SWEEP_CRON", "0 */5 * * * *");

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        prompts_path,
        openai_api_key,
        openai_base_url,
        model,
        image_model,
        provider_timeout_secs,
        provider_max_retries,
        provider_backoff_base_ms,
        images_enabled,
        airtable,
        session_ttl_secs,
        session_sweep_cron,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

/// Table names are often pasted from a shell prompt; drop surrounding
/// whitespace and stray trailing `%` characters.
fn sanitize_table_name(raw: &str) -> String {
    let cleaned = raw.trim().trim_end_matches('%').trim();
    if cleaned.is_empty() {
        DEFAULT_AIRTABLE_TABLE.to_string()
    } else {
        cleaned.to_string()
    }
}
