//! Scripted transport for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;

use super::{HttpTransport, TransportError, TransportRequest, TransportResponse};

/// One scripted step for the mock transport.
pub enum MockStep {
    Respond(TransportResponse),
    Fail(TransportError),
}

/// Transport that replays a scripted sequence of responses and records
/// every request it receives, with timestamps for pacing assertions.
///
/// Once the script is exhausted, further requests get an HTTP 200 with an
/// empty JSON object body.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockStep>>,
    requests: Mutex<Vec<(Instant, TransportRequest)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response with the given status and body.
    pub fn respond(&self, status: u16, body: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .push_back(MockStep::Respond(TransportResponse {
                status,
                body: body.to_string(),
            }));
        self
    }

    /// Queues a transport-level failure.
    pub fn fail(&self, error: TransportError) -> &Self {
        self.script.lock().unwrap().push_back(MockStep::Fail(error));
        self
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// URLs of all received requests, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.url.clone())
            .collect()
    }

    /// Instants at which requests were received, in order.
    pub fn request_instants(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push((Instant::now(), request));

        match self.script.lock().unwrap().pop_front() {
            Some(MockStep::Respond(response)) => Ok(response),
            Some(MockStep::Fail(error)) => Err(error),
            None => Ok(TransportResponse {
                status: 200,
                body: "{}".to_string(),
            }),
        }
    }
}
