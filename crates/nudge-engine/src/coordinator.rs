//! Per-session serialization.
//!
//! Every mutation of a session runs while holding that session's slot, an
//! async mutex looked up by id. The map holds only weak references, so a
//! slot lives exactly as long as someone holds or awaits it. Different ids
//! never share a slot and there is no global lock on the mutation path.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use nudge_core::SessionId;

use crate::error::EngineError;

/// Dead entries are pruned once the map grows past this many.
const PRUNE_THRESHOLD: usize = 128;

/// Exclusive right to mutate one session. Released on drop.
#[derive(Debug)]
pub struct SessionSlot {
    _guard: OwnedMutexGuard<()>,
}

pub struct SessionCoordinator {
    slots: DashMap<SessionId, Weak<Mutex<()>>>,
    wait: Duration,
}

impl SessionCoordinator {
    /// `wait` bounds how long [`acquire`](Self::acquire) queues before giving up.
    pub fn new(wait: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            wait,
        }
    }

    fn slot(&self, id: &SessionId) -> Arc<Mutex<()>> {
        if self.slots.len() > PRUNE_THRESHOLD {
            self.slots.retain(|_, weak| weak.strong_count() > 0);
        }

        let mut entry = self.slots.entry(id.clone()).or_default();
        if let Some(existing) = entry.upgrade() {
            return existing;
        }
        let lock = Arc::new(Mutex::new(()));
        *entry = Arc::downgrade(&lock);
        lock
    }

    /// Wait for the session's slot.
    ///
    /// Waiters are served in arrival order. Returns `Busy` after the
    /// configured wait; dropping the returned future before it resolves
    /// leaves the queue without side effects.
    pub async fn acquire(&self, id: &SessionId) -> Result<SessionSlot, EngineError> {
        let lock = self.slot(id);
        match tokio::time::timeout(self.wait, lock.lock_owned()).await {
            Ok(guard) => Ok(SessionSlot { _guard: guard }),
            Err(_) => {
                debug!(session_id = %id, waited = ?self.wait, "session slot wait timed out");
                Err(EngineError::Busy {
                    session_id: id.clone(),
                    waited: self.wait,
                })
            }
        }
    }

    /// Sessions that currently have a live slot (held or awaited).
    pub fn live_slots(&self) -> usize {
        self.slots.iter().filter(|e| e.value().strong_count() > 0).count()
    }
}
