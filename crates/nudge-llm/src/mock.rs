use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use nudge_core::{ChatTurn, Completion, CompletionProvider, GatewayError};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    Reply(Completion),
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Reply(Completion {
            content: text.to_string(),
            tokens_used: 0,
            model: "mock".into(),
        })
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence.
///
/// Once the script runs out, every further call fails with `InvalidRequest`.
pub struct MockProvider {
    responses: Vec<MockResponse>,
    call_count: AtomicUsize,
    last_turns: Mutex<Vec<ChatTurn>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            call_count: AtomicUsize::new(0),
            last_turns: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Turns passed to the most recent call.
    pub fn last_turns(&self) -> Vec<ChatTurn> {
        self.last_turns.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, turns: &[ChatTurn]) -> Result<Completion, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_turns.lock() = turns.to_vec();

        let mut response = self
            .responses
            .get(idx)
            .cloned()
            .ok_or_else(|| GatewayError::InvalidRequest(format!("no mock response for call {idx}")))?;
        loop {
            match response {
                MockResponse::Reply(c) => return Ok(c),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(d, inner) => {
                    tokio::time::sleep(d).await;
                    response = *inner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nudge_core::Role;

    #[tokio::test(start_paused = true)]
    async fn scripted_sequence() {
        let mock = MockProvider::new(vec![
            MockResponse::text("first"),
            MockResponse::delayed(Duration::from_secs(2), MockResponse::text("second")),
        ]);
        let turns = [ChatTurn::new(Role::User, "hi")];
        assert_eq!(mock.complete(&turns).await.unwrap().content, "first");

        let started = tokio::time::Instant::now();
        assert_eq!(mock.complete(&turns).await.unwrap().content, "second");
        assert!(started.elapsed() >= Duration::from_secs(2));

        assert!(mock.complete(&turns).await.is_err());
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.last_turns()[0].content, "hi");
    }
}
