use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, Instrument};

use nudge_core::{
    FeedbackType, NewCardInteraction, NewMessage, Session, SessionEvent, SessionId,
    SessionMetadata, SpinAction, Transition,
};
use nudge_store::SessionStore;

use crate::coordinator::SessionCoordinator;
use crate::error::EngineError;

/// Applies one event at a time to a stored session.
///
/// Each call takes the session's slot, reads the current value, applies the
/// event and writes the result back before releasing the slot. Once the slot
/// is held the read-apply-write runs on its own task, so a caller that goes
/// away mid-write cannot leave the slot released with a write in flight.
pub struct MutationEngine {
    store: Arc<dyn SessionStore>,
    coordinator: Arc<SessionCoordinator>,
}

impl MutationEngine {
    pub fn new(store: Arc<dyn SessionStore>, coordinator: Arc<SessionCoordinator>) -> Self {
        Self { store, coordinator }
    }

    #[instrument(skip(self, metadata))]
    pub async fn create_session(
        &self,
        owner_id: Option<String>,
        metadata: SessionMetadata,
    ) -> Result<Session, EngineError> {
        let session = Session::create(owner_id, metadata, Utc::now());
        self.store
            .insert(session.clone())
            .await
            .map_err(|e| log_failure(session.session_id(), "create", e.into()))?;
        info!(session_id = %session.session_id(), "session created");
        Ok(session)
    }

    pub async fn add_message(&self, id: &SessionId, message: NewMessage) -> Result<Session, EngineError> {
        self.apply(id, SessionEvent::MessageAdded(message)).await
    }

    pub async fn set_feedback(
        &self,
        id: &SessionId,
        message_index: i64,
        feedback: FeedbackType,
    ) -> Result<Session, EngineError> {
        self.apply(
            id,
            SessionEvent::FeedbackSet {
                message_index,
                feedback,
            },
        )
        .await
    }

    pub async fn add_spin_interaction(
        &self,
        id: &SessionId,
        message_index: i64,
        action: SpinAction,
    ) -> Result<Session, EngineError> {
        self.apply(
            id,
            SessionEvent::SpinRecorded {
                message_index,
                action,
            },
        )
        .await
    }

    pub async fn add_card_interaction(
        &self,
        id: &SessionId,
        card: NewCardInteraction,
    ) -> Result<Session, EngineError> {
        self.apply(id, SessionEvent::CardRecorded(card)).await
    }

    pub async fn add_scratchpad_snapshot(&self, id: &SessionId, text: String) -> Result<Session, EngineError> {
        self.apply(id, SessionEvent::ScratchpadCaptured { text }).await
    }

    /// Idempotent: ending an ended session returns it unchanged.
    pub async fn end_session(&self, id: &SessionId) -> Result<Session, EngineError> {
        self.apply(id, SessionEvent::Ended).await
    }

    /// Apply one event under the session's slot and return the resulting session.
    #[instrument(skip(self, event), fields(session_id = %id, event = event.kind()))]
    pub async fn apply(&self, id: &SessionId, event: SessionEvent) -> Result<Session, EngineError> {
        let slot = self.coordinator.acquire(id).await?;

        let store = Arc::clone(&self.store);
        let task_id = id.clone();
        let outcome = tokio::spawn(
            async move {
                let _slot = slot;
                read_apply_write(store.as_ref(), &task_id, event).await
            }
            .instrument(tracing::Span::current()),
        )
        .await
        .map_err(|e| EngineError::Storage(e.into()))?;

        outcome.map_err(|e| log_failure(id, "apply", e))
    }
}

async fn read_apply_write(
    store: &dyn SessionStore,
    id: &SessionId,
    event: SessionEvent,
) -> Result<Session, EngineError> {
    let current = store.get(id).await?;
    match current.value.apply(event, Utc::now())? {
        Transition::Applied(next) => {
            let version = store.replace(next.clone(), current.version).await?;
            debug!(version, "session updated");
            Ok(next)
        }
        Transition::Unchanged(same) => {
            debug!("event was a no-op");
            Ok(same)
        }
    }
}

fn log_failure(id: &SessionId, op: &'static str, e: EngineError) -> EngineError {
    if e.is_caller_error() {
        debug!(session_id = %id, op, error = %e, "rejected");
    } else {
        error!(session_id = %id, op, kind = e.error_kind(), error = %e, "session operation failed");
    }
    e
}
