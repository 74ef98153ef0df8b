//! Versioned prompt set, loaded from YAML at startup.
//!
//! Prompt wording is configuration data; the orchestration code only refers to
//! prompts by their role (brief, chat, fan-out task, sub-agent).

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Fan-out task names that every prompt set must define.
pub const STANDARD_FANOUT_TASKS: [&str; 4] = ["positioning", "landing_copy", "ads", "emails"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSet {
    pub version: u32,
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    pub brief: BriefPrompts,
    pub chat: ChatPrompts,
    pub fanout: Vec<FanOutPrompt>,
    #[serde(default)]
    pub sub_agents: Vec<SubAgentPrompt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefPrompts {
    pub instructions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPrompts {
    pub instructions: String,
    pub transcript_preamble: String,
    /// Hidden first user turn. Placeholders: `{email}`, `{domain}`,
    /// `{business_info}`.
    pub greeting_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutPrompt {
    pub name: String,
    pub instructions: String,
}

/// A hand-off target of the chat agent with its declared output shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentPrompt {
    pub key: String,
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub output_schema: serde_json::Value,
}

fn default_assistant_name() -> String {
    "Mark".to_string()
}

impl PromptSet {
    /// Parse and validate a prompt set from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the YAML is malformed or fails validation.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let prompts: PromptSet = serde_yaml::from_str(content)?;
        validate_prompts(&prompts)?;
        Ok(prompts)
    }

    /// Render the hidden greeting turn for a new chat session.
    #[must_use]
    pub fn render_greeting(
        &self,
        email: &str,
        domain: &str,
        business_info: Option<&serde_json::Value>,
    ) -> String {
        let info = business_info.map_or_else(|| "{}".to_string(), ToString::to_string);
        fill_placeholders(
            &self.chat.greeting_template,
            &[("email", email), ("domain", domain), ("business_info", &info)],
        )
    }

    /// Build the chat prompt: preamble, separator, transcript.
    #[must_use]
    pub fn render_chat_prompt(&self, transcript: &str) -> String {
        format!("{}\n---\n{transcript}", self.chat.transcript_preamble.trim_end())
    }
}

/// Load and validate the prompt set from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_prompts(path: &Path) -> Result<PromptSet, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::PromptsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    PromptSet::from_yaml_str(&content)
}

fn validate_prompts(prompts: &PromptSet) -> Result<(), ConfigError> {
    let non_empty = |label: &str, value: &str| -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            Err(ConfigError::Validation(format!("{label} must be non-empty")))
        } else {
            Ok(())
        }
    };

    non_empty("assistant_name", &prompts.assistant_name)?;
    non_empty("brief.instructions", &prompts.brief.instructions)?;
    non_empty("chat.instructions", &prompts.chat.instructions)?;
    non_empty("chat.transcript_preamble", &prompts.chat.transcript_preamble)?;
    non_empty("chat.greeting_template", &prompts.chat.greeting_template)?;

    let mut seen_tasks = HashSet::new();
    for task in &prompts.fanout {
        non_empty("fanout task name", &task.name)?;
        non_empty(&format!("fanout '{}' instructions", task.name), &task.instructions)?;
        if !seen_tasks.insert(task.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate fanout task: '{}'",
                task.name
            )));
        }
    }
    for required in STANDARD_FANOUT_TASKS {
        if !seen_tasks.contains(required) {
            return Err(ConfigError::Validation(format!(
                "missing fanout task: '{required}'"
            )));
        }
    }

    let mut seen_agents = HashSet::new();
    for agent in &prompts.sub_agents {
        non_empty("sub-agent key", &agent.key)?;
        non_empty(&format!("sub-agent '{}' instructions", agent.key), &agent.instructions)?;
        if !agent.output_schema.is_object() {
            return Err(ConfigError::Validation(format!(
                "sub-agent '{}' output_schema must be a JSON schema object",
                agent.key
            )));
        }
        if !seen_agents.insert(agent.key.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate sub-agent key: '{}'",
                agent.key
            )));
        }
    }

    Ok(())
}

/// Substitute `{name}` placeholders in one pass over `template`.
///
/// Substituted values are never rescanned. Unknown `{...}` spans and stray
/// braces are copied through unchanged.
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
