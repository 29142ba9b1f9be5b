use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use vanet_core::backend::{InstructionBackend, InstructionRequest};
use vanet_core::errors::BackendError;

/// Scripted reply for one backend call.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return this instruction text.
    Text(String),
    /// Fail with this error.
    Error(BackendError),
    /// Wait a duration, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// `inner`, resolved after `delay`.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Replays a script of replies, one per call, and records each request.
///
/// Once the script runs out, the last response repeats when built with
/// [`MockBackend::always`]; otherwise further calls fail.
pub struct MockBackend {
    responses: Vec<MockResponse>,
    repeat_last: bool,
    call_count: AtomicUsize,
    requests: Mutex<Vec<InstructionRequest>>,
}

impl MockBackend {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            repeat_last: false,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `response`.
    pub fn always(response: MockResponse) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![response])
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<InstructionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl InstructionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &InstructionRequest) -> Result<String, BackendError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let response = match self.responses.get(idx) {
            Some(r) => r,
            None if self.repeat_last && !self.responses.is_empty() => {
                &self.responses[self.responses.len() - 1]
            }
            None => {
                return Err(BackendError::InvalidRequest(format!(
                    "mock script exhausted at call {idx}"
                )))
            }
        };

        play(response).await
    }
}

// Nested delays are walked in a loop; async fns cannot recurse without boxing.
async fn play(response: &MockResponse) -> Result<String, BackendError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Text(text) => return Ok(text.clone()),
            MockResponse::Error(e) => return Err(e.clone()),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(*duration).await;
                current = inner;
            }
        }
    }
}
