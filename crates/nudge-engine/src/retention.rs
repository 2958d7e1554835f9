use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use nudge_store::SessionStore;

use crate::error::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_for: chrono::Duration,
    pub interval: Duration,
}

impl RetentionPolicy {
    pub fn new(retention_days: u32, interval: Duration) -> Self {
        Self {
            keep_for: chrono::Duration::days(i64::from(retention_days)),
            interval,
        }
    }
}

/// Delete sessions that ended, and were last touched, before `now - keep_for`.
///
/// Ended sessions accept no further events, so this never races a mutation.
pub async fn sweep_once(
    store: &dyn SessionStore,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<usize, EngineError> {
    let cutoff = now - policy.keep_for;
    Ok(store.delete_ended_before(cutoff).await?)
}

/// Run [`sweep_once`] every `policy.interval` until `cancel` fires.
pub fn start_retention_task(
    store: Arc<dyn SessionStore>,
    policy: RetentionPolicy,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(policy.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match sweep_once(store.as_ref(), &policy, Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "expired sessions removed"),
                Err(e) => error!(error = %e, "retention sweep failed"),
            }
        }
    })
}
