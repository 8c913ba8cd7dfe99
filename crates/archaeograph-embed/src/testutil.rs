//! Test embedders (enabled by the `test-utils` feature).

use crate::embedder::{EmbedError, Embedder, HashEmbedder};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// [`HashEmbedder`] that records every text it is asked to embed, and can be
/// told to fail after a number of calls.
#[derive(Default)]
pub struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    fail_after: Option<usize>,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed `n` times, then return an API error on every call.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| n >= limit) {
            return Err(EmbedError::Api("503: service unavailable".to_string()));
        }
        self.texts.lock().push(text.to_string());
        self.inner.embed(text).await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
