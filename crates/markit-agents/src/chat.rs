//! Conversational replies with an ordered strategy cascade.
//!
//! Each turn renders the session transcript into a prompt and tries the
//! configured [`ReplyStrategy`]s in order until one produces text. When every
//! strategy fails the reply is empty and the meta carries each cause.

use std::sync::Arc;

use async_trait::async_trait;
use markit_airtable::{Record, RecordStore};
use markit_core::{render_transcript, ChatTurn, Email, PromptSet, Role};
use markit_llm::{
    AgentDefinition, AgentRunner, HandoffRunner, ImageProvider, InvokeOptions, Provider,
    ProviderError, RunContext,
};
use serde::Serialize;

use crate::media::{attach_image, extract_directive};
use crate::session::{SessionNotFound, SessionStore};

type Meta = serde_json::Map<String, serde_json::Value>;

/// Text produced by one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyReply {
    pub text: String,
    pub agent: Option<String>,
    pub handoff: Option<String>,
}

#[async_trait]
pub trait ReplyStrategy: Send + Sync {
    /// Reported as `meta.provider` when this strategy answers.
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns [`ProviderError`] when no usable reply was produced.
    async fn reply(&self, prompt: &str, email: &str) -> Result<StrategyReply, ProviderError>;
}

/// Runs the chat agent (with hand-offs) through an [`AgentRunner`].
pub struct AgentStrategy {
    runner: Arc<dyn AgentRunner>,
}

impl AgentStrategy {
    #[must_use]
    pub fn new(runner: Arc<dyn AgentRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ReplyStrategy for AgentStrategy {
    fn name(&self) -> &str {
        "primary"
    }

    async fn reply(&self, prompt: &str, email: &str) -> Result<StrategyReply, ProviderError> {
        let context = RunContext {
            email: email.to_string(),
        };
        let output = self.runner.run(prompt, &context).await?;
        Ok(StrategyReply {
            text: output.final_output,
            agent: Some(output.agent),
            handoff: output.handoff,
        })
    }
}

/// One direct provider call: no tools, minimal effort, not stored.
pub struct DirectStrategy {
    provider: Arc<dyn Provider>,
    instructions: String,
}

impl DirectStrategy {
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>, instructions: &str) -> Self {
        Self {
            provider,
            instructions: instructions.to_string(),
        }
    }
}

#[async_trait]
impl ReplyStrategy for DirectStrategy {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn reply(&self, prompt: &str, _email: &str) -> Result<StrategyReply, ProviderError> {
        let response = self
            .provider
            .invoke(&self.instructions, prompt, &InvokeOptions::quick_reply())
            .await?;
        let text = response
            .output_text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::EmptyOutput {
                agent: "fallback".to_string(),
            })?;
        Ok(StrategyReply {
            text,
            agent: None,
            handoff: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub meta: Meta,
}

/// Turns a transcript into one assistant reply.
pub struct ChatOrchestrator {
    strategies: Vec<Arc<dyn ReplyStrategy>>,
    prompts: Arc<PromptSet>,
    images: Option<Arc<dyn ImageProvider>>,
}

impl ChatOrchestrator {
    #[must_use]
    pub fn new(
        strategies: Vec<Arc<dyn ReplyStrategy>>,
        prompts: Arc<PromptSet>,
        images: Option<Arc<dyn ImageProvider>>,
    ) -> Self {
        Self {
            strategies,
            prompts,
            images,
        }
    }

    /// The standard cascade: the hand-off runner over the chat agent and its
    /// sub-agents, then a direct provider call.
    #[must_use]
    pub fn standard(
        provider: Arc<dyn Provider>,
        prompts: Arc<PromptSet>,
        images: Option<Arc<dyn ImageProvider>>,
    ) -> Self {
        let chat_agent = AgentDefinition::new(
            "chat",
            &prompts.assistant_name,
            &prompts.chat.instructions,
        );
        let sub_agents = prompts
            .sub_agents
            .iter()
            .map(|s| {
                AgentDefinition::new(&s.key, &s.name, &s.instructions)
                    .with_description(&s.description)
                    .with_output_schema(s.output_schema.clone())
            })
            .collect();
        let runner = HandoffRunner::new(Arc::clone(&provider), chat_agent, sub_agents);
        let primary: Arc<dyn ReplyStrategy> = Arc::new(AgentStrategy::new(Arc::new(runner)));
        let fallback: Arc<dyn ReplyStrategy> =
            Arc::new(DirectStrategy::new(provider, &prompts.chat.instructions));
        Self::new(vec![primary, fallback], prompts, images)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.strategies.is_empty()
    }

    /// Reply to `history`. Never fails: exhaustion yields an empty reply with
    /// the causes in `meta.failures` and `meta.error`.
    pub async fn respond(&self, email: &str, history: &[ChatTurn]) -> ChatReply {
        let transcript = render_transcript(history, &self.prompts.assistant_name);
        let prompt = self.prompts.render_chat_prompt(&transcript);

        let mut meta = Meta::new();
        meta.insert("prompt".to_string(), prompt.clone().into());
        meta.insert("transcript".to_string(), transcript.into());

        let mut failures = Vec::new();
        let mut causes = Vec::new();
        let mut reply = None;
        for strategy in &self.strategies {
            match strategy.reply(&prompt, email).await {
                Ok(answer) => {
                    meta.insert("provider".to_string(), strategy.name().into());
                    if let Some(agent) = &answer.agent {
                        meta.insert("agent".to_string(), agent.as_str().into());
                    }
                    if let Some(handoff) = &answer.handoff {
                        meta.insert("handoff".to_string(), handoff.as_str().into());
                    }
                    reply = Some(answer.text);
                    break;
                }
                Err(e) => {
                    tracing::warn!(strategy = strategy.name(), email, error = %e, "reply strategy failed");
                    causes.push(format!("{}: {e}", strategy.name()));
                    failures.push(serde_json::json!({
                        "strategy": strategy.name(),
                        "error": e.to_string(),
                    }));
                }
            }
        }

        if !failures.is_empty() {
            meta.insert("failures".to_string(), serde_json::Value::Array(failures));
        }

        let Some(reply) = reply else {
            tracing::error!(email, "every reply strategy failed");
            let error = if causes.is_empty() {
                "no reply strategy configured".to_string()
            } else {
                causes.join("; ")
            };
            meta.insert("error".to_string(), error.into());
            return ChatReply {
                reply: String::new(),
                meta,
            };
        };

        if let Some(directive) = extract_directive(&reply) {
            attach_image(self.images.as_deref(), &directive, &mut meta).await;
        }

        ChatReply { reply, meta }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatStart {
    pub session_id: String,
    pub agent_ready: bool,
    pub first_reply: Option<String>,
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatStatus {
    pub session_id: String,
    pub history: Vec<ChatTurn>,
    pub last_assistant: Option<String>,
}

/// Session-aware chat: start, send, status.
#[derive(Clone)]
pub struct ChatService {
    orchestrator: Arc<ChatOrchestrator>,
    sessions: Arc<dyn SessionStore>,
    store: Option<Arc<dyn RecordStore>>,
    prompts: Arc<PromptSet>,
}

impl ChatService {
    #[must_use]
    pub fn new(
        orchestrator: Arc<ChatOrchestrator>,
        sessions: Arc<dyn SessionStore>,
        store: Option<Arc<dyn RecordStore>>,
        prompts: Arc<PromptSet>,
    ) -> Self {
        Self {
            orchestrator,
            sessions,
            store,
            prompts,
        }
    }

    /// Open a session and produce the greeting.
    ///
    /// The greeting is the reply to a hidden user turn carrying the prior
    /// brief (when the datastore has one). The hidden turn is kept in the
    /// transcript; the greeting is kept only when non-empty.
    pub async fn start(&self, email: &Email) -> ChatStart {
        let session_id = self.sessions.create().await;

        let mut airtable = Meta::new();
        airtable.insert("enabled".to_string(), self.store.is_some().into());
        let mut brief = None;
        if let Some(store) = &self.store {
            match store.find_by_identity(email.as_str()).await {
                Ok(record) => {
                    brief = record.as_ref().and_then(|r| prior_brief(r, store.as_ref()));
                    airtable.insert(
                        "record_id".to_string(),
                        record.map(|r| r.id).into(),
                    );
                    airtable.insert("has_brief".to_string(), brief.is_some().into());
                }
                Err(e) => {
                    tracing::warn!(email = %email, error = %e, "prior brief lookup failed");
                    airtable.insert("error".to_string(), e.to_string().into());
                }
            }
        }

        let greeting = self
            .prompts
            .render_greeting(email.as_str(), email.domain(), brief.as_ref());
        let hidden = ChatTurn::user(greeting);

        let ChatReply { reply, meta: reply_meta } = match self.sessions.lock_turn(&session_id).await
        {
            Ok(_guard) => {
                let answer = self
                    .orchestrator
                    .respond(email.as_str(), std::slice::from_ref(&hidden))
                    .await;
                let mut turns = vec![hidden];
                if !answer.reply.is_empty() {
                    turns.push(ChatTurn::assistant(answer.reply.clone()));
                }
                if let Err(e) = self.sessions.append(&session_id, turns).await {
                    tracing::warn!(%session_id, error = %e, "session vanished during greeting");
                }
                answer
            }
            Err(e) => ChatReply {
                reply: String::new(),
                meta: Meta::from_iter([("error".to_string(), e.to_string().into())]),
            },
        };

        let mut meta = reply_meta;
        if let Some(cause) = meta.get("error").and_then(serde_json::Value::as_str) {
            let message = format!("prefetch_greeting_failed: {cause}");
            meta.insert("error".to_string(), message.into());
        }
        meta.insert("airtable".to_string(), serde_json::Value::Object(airtable));

        tracing::info!(%session_id, email = %email, greeted = !reply.is_empty(), "chat session started");
        ChatStart {
            session_id,
            agent_ready: self.orchestrator.is_ready(),
            first_reply: Some(reply),
            meta,
        }
    }

    /// Process one user message. Turns on the same session are serialised;
    /// the transcript gains `[user, assistant]` only after the reply exists.
    ///
    /// # Errors
    ///
    /// Returns [`SessionNotFound`] for unknown or expired sessions; the
    /// transcript is not touched.
    pub async fn send(
        &self,
        session_id: &str,
        email: &Email,
        message: &str,
    ) -> Result<ChatReply, SessionNotFound> {
        let _guard = self.sessions.lock_turn(session_id).await?;
        let mut history = self.sessions.get(session_id).await?;
        history.push(ChatTurn::user(message));

        let mut answer = self.orchestrator.respond(email.as_str(), &history).await;
        answer.meta.insert(
            "_debug".to_string(),
            serde_json::json!({ "history": history, "email": email.as_str() }),
        );

        self.sessions
            .append(
                session_id,
                vec![ChatTurn::user(message), ChatTurn::assistant(answer.reply.clone())],
            )
            .await?;
        Ok(answer)
    }

    /// # Errors
    ///
    /// Returns [`SessionNotFound`] for unknown or expired sessions.
    pub async fn status(&self, session_id: &str) -> Result<ChatStatus, SessionNotFound> {
        let history = self.sessions.get(session_id).await?;
        let last_assistant = history
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.content.clone());
        Ok(ChatStatus {
            session_id: session_id.to_string(),
            history,
            last_assistant,
        })
    }
}

/// The brief stored on `record`: the full-response field if it holds a JSON
/// object, otherwise any string field that looks like a brief.
fn prior_brief(record: &Record, store: &dyn RecordStore) -> Option<serde_json::Value> {
    let fields = store.field_map();
    let primary = record
        .string_field(&[fields.full_response.as_str(), fields.full_response_name.as_str()])
        .and_then(parse_object);
    primary.or_else(|| {
        record
            .fields
            .values()
            .filter_map(serde_json::Value::as_str)
            .filter(|v| v.contains("\"general_info\"") && v.contains("\"products\""))
            .find_map(parse_object)
    })
}

fn parse_object(text: &str) -> Option<serde_json::Value> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .filter(serde_json::Value::is_object)
}
