//! Parallel fan-out of the configured brief tasks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use markit_core::PromptSet;
use markit_llm::{extract, InvokeOptions, ParsedOutput, Provider};
use serde::{Serialize, Serializer};

/// One fan-out task: a named provider call with its own instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutTask {
    pub name: String,
    pub instructions: String,
}

impl FanOutTask {
    /// Tasks in prompt-set order.
    #[must_use]
    pub fn from_prompts(prompts: &PromptSet) -> Vec<Self> {
        prompts
            .fanout
            .iter()
            .map(|p| Self {
                name: p.name.clone(),
                instructions: p.instructions.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Parsed(ParsedOutput),
    /// Provider error or panicked task. Serialized as `{"error": message}`.
    Failed { error: String },
}

impl TaskOutcome {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}

impl Serialize for TaskOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TaskOutcome::Parsed(parsed) => parsed.serialize(serializer),
            TaskOutcome::Failed { error } => {
                serde_json::json!({ "error": error }).serialize(serializer)
            }
        }
    }
}

/// Task name → outcome. Holds every configured task key.
pub type FanOutResult = BTreeMap<String, TaskOutcome>;

/// Run every task concurrently against `identity` and wait for all of them.
///
/// Each task runs on its own tokio task, so latencies overlap. A failing or
/// panicking task only affects its own key.
pub async fn run_all(
    provider: Arc<dyn Provider>,
    identity: &str,
    tasks: &[FanOutTask],
) -> FanOutResult {
    let started = Instant::now();

    let (names, handles): (Vec<String>, Vec<_>) = tasks
        .iter()
        .map(|task| {
            let provider = Arc::clone(&provider);
            let instructions = task.instructions.clone();
            let identity = identity.to_string();
            let handle = tokio::spawn(async move {
                provider
                    .invoke(&instructions, &identity, &InvokeOptions::research())
                    .await
            });
            (task.name.clone(), handle)
        })
        .unzip();

    let joined = join_all(handles).await;

    let result: FanOutResult = names
        .into_iter()
        .zip(joined)
        .map(|(name, joined)| {
            let outcome = match joined {
                Ok(Ok(response)) => TaskOutcome::Parsed(extract(response.output_text.as_deref())),
                Ok(Err(e)) => {
                    tracing::warn!(task = %name, error = %e, "fan-out task failed");
                    TaskOutcome::Failed {
                        error: e.to_string(),
                    }
                }
                Err(e) => {
                    tracing::error!(task = %name, error = %e, "fan-out task aborted");
                    TaskOutcome::Failed {
                        error: format!("task aborted: {e}"),
                    }
                }
            };
            (name, outcome)
        })
        .collect();

    let failed = result.values().filter(|o| o.is_failed()).count();
    tracing::info!(
        tasks = result.len(),
        failed,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "fan-out complete"
    );
    result
}
