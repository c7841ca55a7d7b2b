//! Scripted transport for tests and offline runs
//!
//! Replies are scripted per URL. Each exchange consumes the next scripted
//! reply for its URL; the last one is repeated once the script runs out. URLs
//! with no script get the default reply (404 with an empty body).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::app::models::Headers;
use crate::errors::{ClientResult, TransportError, TransportResult};

use super::config::ClientProfile;
use super::factory::TransportFactory;
use super::transport::{Transport, TransportRequest, TransportResponse};

/// One scripted outcome
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(TransportResponse),
    Error(TransportError),
}

impl MockReply {
    /// 200 with `body`
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        MockReply::Response(TransportResponse::new(status, Headers::new(), body))
    }

    pub fn error(error: TransportError) -> Self {
        MockReply::Error(error)
    }

    /// Add a response header; no effect on error replies
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let MockReply::Response(response) = &mut self {
            response.headers.append(name, value);
        }
        self
    }
}

/// In-memory [`Transport`]
#[derive(Debug)]
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<MockReply>>>,
    default_reply: Mutex<MockReply>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_reply: Mutex::new(MockReply::status(404, Vec::new())),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every exchange by `delay` before replying
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(Some(delay));
        self
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Append a reply to the script for `url`
    pub fn respond(&self, url: &str, reply: MockReply) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Reply used for URLs without a script
    pub fn set_default(&self, reply: MockReply) {
        *self.default_reply.lock() = reply;
    }

    /// Total exchanges attempted
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Exchanges attempted against `url`
    pub fn calls_to(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }

    /// Every request received, in arrival order
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    fn next_reply(&self, url: &str) -> MockReply {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(url) {
            Some(script) if script.len() > 1 => script
                .pop_front()
                .unwrap_or_else(|| self.default_reply.lock().clone()),
            Some(script) => script
                .front()
                .cloned()
                .unwrap_or_else(|| self.default_reply.lock().clone()),
            None => self.default_reply.lock().clone(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &TransportRequest) -> TransportResult<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(&request.url) {
            MockReply::Response(response) => Ok(response),
            MockReply::Error(error) => Err(error),
        }
    }
}

/// Factory handing the same [`MockTransport`] to every profile
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    transport: Arc<MockTransport>,
    profiles: Mutex<Vec<ClientProfile>>,
}

impl MockTransportFactory {
    pub fn new(transport: Arc<MockTransport>) -> Self {
        Self {
            transport,
            profiles: Mutex::new(Vec::new()),
        }
    }

    pub fn transport(&self) -> &Arc<MockTransport> {
        &self.transport
    }

    /// Profiles clients were requested for
    pub fn profiles(&self) -> Vec<ClientProfile> {
        self.profiles.lock().clone()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, profile: &ClientProfile) -> ClientResult<Arc<dyn Transport>> {
        self.profiles.lock().push(profile.clone());
        let transport: Arc<dyn Transport> = self.transport.clone();
        Ok(transport)
    }
}
