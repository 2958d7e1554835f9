pub mod chat;
pub mod coordinator;
pub mod error;
pub mod mutation;
pub mod query;
pub mod requests;
pub mod retention;

pub use chat::{ChatReply, ChatRequest, ChatService};
pub use coordinator::{SessionCoordinator, SessionSlot};
pub use error::EngineError;
pub use mutation::MutationEngine;
pub use query::{ListLimits, SessionQueryService};
pub use retention::{start_retention_task, sweep_once, RetentionPolicy};
