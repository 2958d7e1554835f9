use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use nudge_core::{ChatTurn, Completion, CompletionProvider, GatewayError};

#[derive(Clone, Debug)]
pub struct ReliableConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReliableConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Wraps a provider and retries retryable failures with exponential backoff.
///
/// A `retry_after` hint from a rate-limit response replaces the computed
/// delay (still capped at `max_delay`).
pub struct ReliableProvider<P: CompletionProvider> {
    inner: P,
    config: ReliableConfig,
    total_retries: AtomicU64,
}

impl<P: CompletionProvider> ReliableProvider<P> {
    pub fn new(inner: P, config: ReliableConfig) -> Self {
        Self {
            inner,
            config,
            total_retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: P) -> Self {
        Self::new(inner, ReliableConfig::default())
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    fn retry_delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        let computed = self
            .config
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        suggested.unwrap_or(computed).min(self.config.max_delay)
    }
}

#[async_trait]
impl<P: CompletionProvider> CompletionProvider for ReliableProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, turns: &[ChatTurn]) -> Result<Completion, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(turns).await {
                Ok(c) => return Ok(c),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let suggested = match &e {
                        GatewayError::RateLimited { retry_after } => *retry_after,
                        _ => None,
                    };
                    let delay = self.retry_delay(attempt, suggested);
                    warn!(
                        attempt = attempt + 1,
                        max = self.config.max_retries,
                        kind = e.error_kind(),
                        delay_ms = delay.as_millis() as u64,
                        "retrying completion"
                    );
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
