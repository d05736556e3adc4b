//! Scripted in-memory backend for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BatchBackend, ChatBackend};
use crate::errors::BackendError;
use crate::model::{SamplingParams, TurnContext};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Text(String),
    Transient(String),
    Rejected(String),
    Fatal(String),
}

/// Backend double that replays a script of replies, then falls back to a
/// fixed response (or a fatal error when none is configured). Counts calls
/// so tests can assert on no-op fast paths.
pub struct FakeBackend {
    script: Mutex<VecDeque<FakeReply>>,
    fallback: Option<String>,
    calls: AtomicUsize,
}

impl FakeBackend {
    /// Replies with `text` on every call.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replays `replies` in order; further calls fail fatally.
    pub fn script(replies: Vec<FakeReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(FakeReply::Text(text)) => Ok(text),
            Some(FakeReply::Transient(msg)) => Err(BackendError::Transient(msg)),
            Some(FakeReply::Rejected(msg)) => Err(BackendError::Rejected(msg)),
            Some(FakeReply::Fatal(msg)) => Err(BackendError::Fatal(anyhow::anyhow!(msg))),
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(BackendError::Fatal(anyhow::anyhow!(
                    "fake backend script exhausted"
                ))),
            },
        }
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn request(
        &self,
        _ctx: &TurnContext<'_>,
        _params: &SamplingParams,
    ) -> Result<String, BackendError> {
        self.next_reply()
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

#[async_trait]
impl BatchBackend for FakeBackend {
    async fn batch_request(
        &self,
        contexts: &[TurnContext<'_>],
        _params: &SamplingParams,
    ) -> anyhow::Result<Vec<String>> {
        contexts
            .iter()
            .map(|_| self.next_reply().map_err(anyhow::Error::from))
            .collect()
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
