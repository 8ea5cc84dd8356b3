//! Transport layer abstraction for remote profile calls.

use crate::error::{SyncError, SyncResult};
use parking_lot::{Condvar, Mutex};
use pushprofile_protocol::{RemoteRequest, RemoteResponse};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A profile transport performs one remote call.
///
/// The engine never builds raw HTTP; it hands the transport a structured
/// request. Base-URL resolution, headers and retries of transient failures
/// belong to the implementation.
pub trait ProfileTransport: Send + Sync {
    /// Sends `request` and returns the decoded reply.
    fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse>;
}

impl<T: ProfileTransport + ?Sized> ProfileTransport for Arc<T> {
    fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        (**self).send(request)
    }
}

impl<T: ProfileTransport + ?Sized> ProfileTransport for Box<T> {
    fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        (**self).send(request)
    }
}

/// A transport that is never reachable.
#[derive(Debug, Default)]
pub struct OfflineTransport {
    attempts: AtomicUsize,
}

impl OfflineTransport {
    /// Creates an offline transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sends attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ProfileTransport for OfflineTransport {
    fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SyncError::HostUnreachable(format!(
            "offline: {}",
            request.kind.label()
        )))
    }
}

/// A scripted reply of a [`FixtureTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureReply {
    /// 2xx with an optional JSON body.
    Ok(Option<Value>),
    /// The host could not be reached.
    HostUnreachable,
    /// The request timed out.
    Timeout,
    /// Non-2xx with a service exception.
    Server {
        /// HTTP status.
        status: u16,
        /// Service error id.
        message_id: String,
        /// Service error text.
        text: String,
    },
}

impl FixtureReply {
    /// 2xx carrying `body`.
    pub fn body(body: Value) -> Self {
        Self::Ok(Some(body))
    }

    /// 2xx without a body.
    pub fn empty() -> Self {
        Self::Ok(None)
    }

    /// Non-2xx reply.
    pub fn server(status: u16, message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Server {
            status,
            message_id: message_id.into(),
            text: text.into(),
        }
    }

    fn into_result(self) -> SyncResult<RemoteResponse> {
        match self {
            FixtureReply::Ok(body) => Ok(RemoteResponse { body }),
            FixtureReply::HostUnreachable => Err(SyncError::HostUnreachable("fixture".into())),
            FixtureReply::Timeout => Err(SyncError::Timeout),
            FixtureReply::Server {
                status,
                message_id,
                text,
            } => Err(SyncError::Server {
                status,
                message_id,
                text,
            }),
        }
    }
}

#[derive(Default)]
struct Script {
    queued: HashMap<&'static str, VecDeque<FixtureReply>>,
    defaults: HashMap<&'static str, FixtureReply>,
}

/// A deterministic transport replaying scripted replies per endpoint.
///
/// Endpoints are named by [`pushprofile_protocol::RequestKind::label`]. A
/// queued reply is used once; after the queue runs dry the endpoint's default
/// reply is used. Every request is recorded before it waits on the gate, so
/// a test can pause the transport, observe which request is in flight, and
/// release it.
#[derive(Default)]
pub struct FixtureTransport {
    script: Mutex<Script>,
    requests: Mutex<Vec<RemoteRequest>>,
    recorded: Condvar,
    paused: Mutex<bool>,
    gate: Condvar,
}

impl FixtureTransport {
    /// Creates a transport with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a one-shot reply for `endpoint`.
    pub fn push_reply(&self, endpoint: &'static str, reply: FixtureReply) {
        self.script
            .lock()
            .queued
            .entry(endpoint)
            .or_default()
            .push_back(reply);
    }

    /// Sets the reply used once the queue for `endpoint` is empty.
    pub fn set_default(&self, endpoint: &'static str, reply: FixtureReply) {
        self.script.lock().defaults.insert(endpoint, reply);
    }

    /// All requests seen so far, in order.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests sent to `endpoint`.
    pub fn request_count(&self, endpoint: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.kind.label() == endpoint)
            .count()
    }

    /// Endpoint labels of all requests, in order.
    pub fn endpoints(&self) -> Vec<&'static str> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.kind.label())
            .collect()
    }

    /// Blocks sends until [`Self::resume`] is called.
    pub fn pause(&self) {
        *self.paused.lock() = true;
    }

    /// Releases blocked sends.
    pub fn resume(&self) {
        *self.paused.lock() = false;
        self.gate.notify_all();
    }

    /// Waits until at least `count` requests were recorded.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut requests = self.requests.lock();
        while requests.len() < count {
            if self.recorded.wait_until(&mut requests, deadline).timed_out() {
                return requests.len() >= count;
            }
        }
        true
    }

    fn next_reply(&self, endpoint: &'static str) -> Option<FixtureReply> {
        let mut script = self.script.lock();
        if let Some(reply) = script.queued.get_mut(endpoint).and_then(VecDeque::pop_front) {
            return Some(reply);
        }
        script.defaults.get(endpoint).cloned()
    }
}

impl ProfileTransport for FixtureTransport {
    fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        self.requests.lock().push(request.clone());
        self.recorded.notify_all();

        {
            let mut paused = self.paused.lock();
            while *paused {
                self.gate.wait(&mut paused);
            }
        }

        let endpoint = request.kind.label();
        match self.next_reply(endpoint) {
            Some(reply) => reply.into_result(),
            None => Err(SyncError::Protocol(format!("no fixture reply for {endpoint}"))),
        }
    }
}
