//! Hand-off capable agent runner.
//!
//! A starting agent may delegate a turn to one of its declared hand-off
//! targets by replying with a single `HANDOFF: <key>` line. The target then
//! answers the same input under its own instructions and output schema.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{InvokeOptions, Provider, ReasoningEffort, ResponseFormat};

const HANDOFF_PREFIX: &str = "HANDOFF:";

/// One agent: instructions plus an optional declared output shape.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    pub key: String,
    pub name: String,
    /// Shown to the starting agent when listing hand-off targets.
    pub description: String,
    pub instructions: String,
    pub output_schema: Option<serde_json::Value>,
}

impl AgentDefinition {
    #[must_use]
    pub fn new(key: &str, name: &str, instructions: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            description: String::new(),
            instructions: instructions.to_string(),
            output_schema: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    #[must_use]
    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// Per-run context shared with every agent in the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub final_output: String,
    /// Name of the agent that produced `final_output`.
    pub agent: String,
    /// Key of the hand-off target, when one was used.
    pub handoff: Option<String>,
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the starting agent on `input`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when a provider call fails or an agent
    /// produces no output.
    async fn run(&self, input: &str, context: &RunContext) -> Result<RunOutput, ProviderError>;
}

/// [`AgentRunner`] over a single [`Provider`], with at most one hand-off per
/// run.
pub struct HandoffRunner {
    provider: Arc<dyn Provider>,
    starting: AgentDefinition,
    handoffs: Vec<AgentDefinition>,
    options: InvokeOptions,
}

impl HandoffRunner {
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        starting: AgentDefinition,
        handoffs: Vec<AgentDefinition>,
    ) -> Self {
        Self {
            provider,
            starting,
            handoffs,
            options: InvokeOptions::research().with_reasoning_effort(ReasoningEffort::Medium),
        }
    }

    /// Starting instructions followed by the hand-off roster, if any.
    fn starting_instructions(&self) -> String {
        if self.handoffs.is_empty() {
            return self.starting.instructions.clone();
        }
        let mut out = self.starting.instructions.trim_end().to_string();
        out.push_str("\n\n<HANDOFFS>\n");
        for agent in &self.handoffs {
            out.push_str(&format!("- {}: {} ({})\n", agent.key, agent.name, agent.description));
        }
        out.push_str(
            "To delegate, reply with exactly one line `HANDOFF: <key>` and nothing else.\n</HANDOFFS>",
        );
        out
    }

    async fn run_handoff(
        &self,
        target: &AgentDefinition,
        input: &str,
        context: &RunContext,
    ) -> Result<RunOutput, ProviderError> {
        let mut options = InvokeOptions::research();
        if let Some(schema) = &target.output_schema {
            options = options.with_response_format(ResponseFormat::JsonSchema {
                name: target.key.clone(),
                schema: schema.clone(),
            });
        }
        let user_text = format!("Requester email: {}\n\n{input}", context.email);
        let response = self
            .provider
            .invoke(&target.instructions, &user_text, &options)
            .await?;
        let text = non_blank(response.output_text).ok_or_else(|| ProviderError::EmptyOutput {
            agent: target.name.clone(),
        })?;
        Ok(RunOutput {
            final_output: text,
            agent: target.name.clone(),
            handoff: Some(target.key.clone()),
        })
    }
}

#[async_trait]
impl AgentRunner for HandoffRunner {
    async fn run(&self, input: &str, context: &RunContext) -> Result<RunOutput, ProviderError> {
        let instructions = self.starting_instructions();
        let response = self
            .provider
            .invoke(&instructions, input, &self.options)
            .await?;
        let text = non_blank(response.output_text).ok_or_else(|| ProviderError::EmptyOutput {
            agent: self.starting.name.clone(),
        })?;

        if let Some(key) = parse_handoff(&text) {
            if let Some(target) = self.handoffs.iter().find(|a| a.key.eq_ignore_ascii_case(key)) {
                tracing::info!(
                    from = %self.starting.name,
                    to = %target.name,
                    email = %context.email,
                    "agent hand-off"
                );
                return self.run_handoff(target, input, context).await;
            }
            tracing::warn!(key, agent = %self.starting.name, "hand-off to unknown agent, keeping reply");
        }

        Ok(RunOutput {
            final_output: text,
            agent: self.starting.name.clone(),
            handoff: None,
        })
    }
}

/// The target key of a `HANDOFF: <key>` reply. Only a single-line reply
/// counts as a hand-off.
#[must_use]
pub fn parse_handoff(text: &str) -> Option<&str> {
    let line = text.trim();
    if line.contains('\n') {
        return None;
    }
    let prefix = line.get(..HANDOFF_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(HANDOFF_PREFIX) {
        return None;
    }
    let rest = &line[HANDOFF_PREFIX.len()..];
    let key = rest.trim().trim_matches('`');
    if key.is_empty() || key.contains(char::is_whitespace) {
        None
    } else {
        Some(key)
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}
