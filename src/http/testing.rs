//! In-memory transport and sleeper for exercising the request pipeline without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::retry::Sleeper;
use super::{HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Debug, Clone)]
enum Outcome {
    Respond { status: u16, body: String },
    Network(String),
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct Reply {
    outcome: Outcome,
    delay: Duration,
}

impl Reply {
    pub fn json(status: u16, value: Value) -> Self {
        Self::text(status, &value.to_string())
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            outcome: Outcome::Respond {
                status,
                body: body.to_string(),
            },
            delay: Duration::ZERO,
        }
    }

    pub fn network(msg: &str) -> Self {
        Self {
            outcome: Outcome::Network(msg.to_string()),
            delay: Duration::ZERO,
        }
    }

    pub fn rejected(msg: &str) -> Self {
        Self {
            outcome: Outcome::Rejected(msg.to_string()),
            delay: Duration::ZERO,
        }
    }

    /// Hold the reply back for `delay` of real time.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Replies are served per URL in order; the last reply for a URL repeats.
/// Unknown URLs get a 404.
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<HttpRequest>>,
    released: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn route(self, url: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into_iter().collect());
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    /// Incremented once when the transport is dropped.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.released.clone()
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Reply::text(404, "no route"),
        }
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = self.next_reply(&request.url);
        self.requests.lock().unwrap().push(request);

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        match reply.outcome {
            Outcome::Respond { status, body } => Ok(HttpResponse { status, body }),
            Outcome::Network(msg) => Err(TransportError::Network(msg)),
            Outcome::Rejected(msg) => Err(TransportError::Request(msg)),
        }
    }
}

/// Records requested backoff instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}
