//! Shared configuration, prompt set and domain types for Markit.

pub mod app_config;
pub mod chat;
pub mod config;
pub mod identity;
pub mod prompts;

use thiserror::Error;

pub use app_config::{AirtableConfig, AppConfig, Environment};
pub use chat::{render_transcript, ChatTurn, Role};
pub use config::{load_app_config, load_app_config_from_env};
pub use identity::{Email, IdentityError};
pub use prompts::{load_prompts, FanOutPrompt, PromptSet, SubAgentPrompt};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read prompts file {path}: {source}")]
    PromptsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse prompts file: {0}")]
    PromptsFileParse(#[from] serde_yaml::Error),

    #[error("prompt validation failed: {0}")]
    Validation(String),
}
