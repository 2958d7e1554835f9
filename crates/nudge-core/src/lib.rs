pub mod errors;
pub mod events;
pub mod ids;
pub mod provider;
pub mod rollups;
pub mod session;

pub use errors::{DomainError, GatewayError};
pub use events::{CardAction, FeedbackType, NewCardInteraction, NewMessage, Role, SessionEvent, SpinAction};
pub use ids::{NudgeId, SessionId};
pub use provider::{ChatTurn, Completion, CompletionProvider, Nudge, NudgeProvider, NudgeSourceError};
pub use rollups::SessionRollups;
pub use session::{Session, SessionMetadata, SessionStats, Transition};
