//! Hosted language-model access for Markit.
//!
//! Wraps the OpenAI Responses and Images endpoints behind the [`Provider`] and
//! [`ImageProvider`] traits, provides the tolerant JSON extractor used at every
//! provider boundary, and a hand-off capable [`AgentRunner`].

pub mod client;
pub mod error;
pub mod extract;
pub mod image;
pub mod runner;
pub mod types;

mod retry;

pub use client::OpenAiClient;
pub use error::ProviderError;
pub use extract::{extract, ParsedOutput};
pub use image::{extract_asset_reference, AssetReference};
pub use runner::{AgentDefinition, AgentRunner, HandoffRunner, RunContext, RunOutput};
pub use types::{
    ImageProvider, InvokeOptions, Provider, ProviderResponse, ReasoningEffort, ResponseFormat,
};
