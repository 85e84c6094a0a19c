use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{Completion, CompletionProvider, CompletionRequest};
use crate::error::CompletionError;

/// Canned provider for tests and local runs.
///
/// Replies with a fixed text, optionally after a delay, or with a fixed
/// error. Counts calls so tests can assert the provider was never reached.
pub struct MockCompletionProvider {
    name: String,
    reply: Result<String, CompletionError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockCompletionProvider {
    pub fn replying(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: Ok(text.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: impl Into<String>, error: CompletionError) -> Self {
        Self {
            name: name.into(),
            reply: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map(|text| Completion {
            text,
            finish_reason: Some("stop".to_string()),
            usage: None,
        })
    }
}
