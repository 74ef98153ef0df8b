//! Orchestration for Markit: the brief pipeline, the parallel fan-out, chat
//! sessions with a reply-strategy cascade, and inline media directives.

pub mod brief;
pub mod chat;
pub mod fanout;
pub mod media;
pub mod session;

pub use brief::{AirtableStatus, BriefError, BriefOutcome, BriefService, GenerationResult};
pub use chat::{
    AgentStrategy, ChatOrchestrator, ChatReply, ChatService, ChatStart, ChatStatus,
    DirectStrategy, ReplyStrategy, StrategyReply,
};
pub use fanout::{run_all, FanOutResult, FanOutTask, TaskOutcome};
pub use media::{extract_directive, MediaDirective};
pub use session::{InMemorySessionStore, SessionNotFound, SessionStore};
