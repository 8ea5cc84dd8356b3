//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so the engine can run
//! on any HTTP library. `HttpTransport` owns everything above raw I/O:
//! URLs, headers, JSON bodies, status mapping, base-URL failover and the
//! bounded retry of transient failures.

use crate::base_url::BaseUrlResolver;
use crate::config::{RetryConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::transport::ProfileTransport;
use pushprofile_protocol::{Method, RemoteRequest, RemoteResponse, ServiceException};
use pushprofile_storage::PersistenceBackend;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the authorizing installation id.
pub const PUSH_REGISTRATION_ID_HEADER: &str = "pushregistrationid";

/// A fully built HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Encoded JSON body.
    pub body: Option<Vec<u8>>,
    /// Request timeout.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Returns the first header named `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A response without a body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string().into_bytes(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Classified failure of an HTTP exchange that produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpFailure {
    /// DNS resolution failed.
    CannotFindHost(String),
    /// The TCP/TLS connection could not be established.
    CannotConnectToHost(String),
    /// The request timed out.
    TimedOut,
    /// Anything else.
    Other(String),
}

impl From<HttpFailure> for SyncError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::CannotFindHost(message) | HttpFailure::CannotConnectToHost(message) => {
                SyncError::HostUnreachable(message)
            }
            HttpFailure::TimedOut => SyncError::Timeout,
            HttpFailure::Other(message) => SyncError::UnknownError(message),
        }
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Executes one request.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, HttpFailure>;
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, HttpFailure> {
        (**self).execute(request)
    }
}

/// HTTP-based profile transport.
pub struct HttpTransport<C: HttpClient> {
    client: C,
    resolver: BaseUrlResolver,
    retry: RetryConfig,
    timeout: Duration,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(client: C, resolver: BaseUrlResolver, retry: RetryConfig, timeout: Duration) -> Self {
        Self {
            client,
            resolver,
            retry,
            timeout,
        }
    }

    /// Creates a transport from `config`, persisting redirects in `backend`.
    pub fn from_config(
        config: &SyncConfig,
        client: C,
        backend: Arc<dyn PersistenceBackend>,
    ) -> SyncResult<Self> {
        let resolver = BaseUrlResolver::with_persistence(config.base_url.clone(), backend)?;
        Ok(Self::new(
            client,
            resolver,
            config.retry.clone(),
            config.request_timeout,
        ))
    }

    /// The base-URL resolver.
    pub fn resolver(&self) -> &BaseUrlResolver {
        &self.resolver
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn build(&self, request: &RemoteRequest) -> SyncResult<HttpRequest> {
        let mut headers = vec![
            (
                "Authorization".to_string(),
                format!("App {}", request.application_code),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if let Some(auth) = request.auth_push_registration_id() {
            headers.push((PUSH_REGISTRATION_ID_HEADER.to_string(), auth.to_string()));
        }

        let body = match &request.body {
            Some(body) => Some(serde_json::to_vec(body).map_err(|e| SyncError::Codec(e.to_string()))?),
            None => None,
        };

        Ok(HttpRequest {
            method: request.method(),
            url: format!("{}{}", self.resolver.resolve(), request.path()),
            headers,
            body,
            timeout: self.timeout,
        })
    }

    fn attempt(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        let http_request = self.build(request)?;
        debug!(method = http_request.method.as_str(), url = %http_request.url, "sending request");

        let response = self.client.execute(&http_request).map_err(SyncError::from)?;
        self.resolver.on_response(&response.headers);
        map_response(response)
    }
}

impl<C: HttpClient> ProfileTransport for HttpTransport<C> {
    fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        let attempts = self.retry.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(request) {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let retryable = self.resolver.on_failure(&err);
                    if !retryable || attempt >= attempts {
                        return Err(err);
                    }
                    warn!(
                        endpoint = request.kind.label(),
                        attempt,
                        error = %err,
                        "transient failure, retrying"
                    );
                    if !self.retry.retry_delay.is_zero() {
                        std::thread::sleep(self.retry.retry_delay);
                    }
                }
            }
        }
    }
}

fn map_response(response: HttpResponse) -> SyncResult<RemoteResponse> {
    if (200..300).contains(&response.status) {
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(RemoteResponse::empty());
        }
        let body: Value = serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Protocol(format!("invalid response body: {e}")))?;
        return Ok(RemoteResponse::with_body(body));
    }

    let exception = serde_json::from_slice::<Value>(&response.body)
        .ok()
        .and_then(|body| ServiceException::from_body(&body))
        .unwrap_or_else(|| {
            ServiceException::new(String::new(), String::from_utf8_lossy(&response.body).into_owned())
        });

    Err(SyncError::Server {
        status: response.status,
        message_id: exception.message_id,
        text: exception.text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct TestClient {
        replies: Mutex<VecDeque<Result<HttpResponse, HttpFailure>>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl TestClient {
        fn reply(&self, reply: Result<HttpResponse, HttpFailure>) {
            self.replies.lock().push_back(reply);
        }

        fn urls(&self) -> Vec<String> {
            self.seen.lock().iter().map(|r| r.url.clone()).collect()
        }
    }

    impl HttpClient for TestClient {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, HttpFailure> {
            self.seen.lock().push(request.clone());
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(HttpFailure::Other("no reply scripted".into())))
        }
    }

    fn transport(retry: RetryConfig) -> HttpTransport<TestClient> {
        HttpTransport::new(
            TestClient::default(),
            BaseUrlResolver::new("https://initial.com"),
            retry,
            Duration::from_secs(20),
        )
    }

    fn get_user() -> RemoteRequest {
        RemoteRequest::get_user("app-code", "A").unwrap()
    }

    #[test]
    fn builds_headers_url_and_body() {
        let transport = transport(RetryConfig::default());
        transport.client().reply(Ok(HttpResponse::json(200, &json!({}))));

        let request = RemoteRequest::set_other_primary("app-code", "A", "B", true).unwrap();
        transport.send(&request).unwrap();

        let seen = transport.client().seen.lock()[0].clone();
        assert_eq!(seen.method, Method::Patch);
        assert_eq!(seen.url, "https://initial.com/mobile/5/appinstance/A/user/appinstance/B");
        assert_eq!(seen.header("authorization"), Some("App app-code"));
        assert_eq!(seen.header(PUSH_REGISTRATION_ID_HEADER), Some("A"));
        assert_eq!(seen.header("content-type"), Some("application/json"));
        assert_eq!(seen.body, Some(br#"{"isPrimary":true}"#.to_vec()));
        assert_eq!(seen.timeout, Duration::from_secs(20));
    }

    #[test]
    fn redirect_header_moves_following_requests() {
        let transport = transport(RetryConfig::default());
        let client = transport.client();
        client.reply(Ok(HttpResponse::json(200, &json!({})).with_header("newbaseurl", "https://new.com")));
        client.reply(Ok(HttpResponse::json(200, &json!({}))));

        transport.send(&get_user()).unwrap();
        transport.send(&get_user()).unwrap();

        assert_eq!(
            client.urls(),
            vec![
                "https://initial.com/mobile/6/appinstance/A/user",
                "https://new.com/mobile/6/appinstance/A/user",
            ]
        );
        assert_eq!(transport.resolver().resolve(), "https://new.com");
    }

    #[test]
    fn cannot_find_host_resets_and_retries_once() {
        let transport = transport(RetryConfig::default());
        transport.resolver().on_response(&[("newbaseurl".into(), "https://new.com".into())]);
        let client = transport.client();
        client.reply(Err(HttpFailure::CannotFindHost("new.com".into())));
        client.reply(Ok(HttpResponse::json(200, &json!({"firstName": "Luke"}))));

        let response = transport.send(&get_user()).unwrap();

        assert_eq!(response.body, Some(json!({"firstName": "Luke"})));
        assert_eq!(
            client.urls(),
            vec![
                "https://new.com/mobile/6/appinstance/A/user",
                "https://initial.com/mobile/6/appinstance/A/user",
            ]
        );
    }

    #[test]
    fn second_transient_failure_is_surfaced() {
        let transport = transport(RetryConfig::default());
        let client = transport.client();
        client.reply(Err(HttpFailure::CannotConnectToHost("refused".into())));
        client.reply(Err(HttpFailure::CannotFindHost("dns".into())));
        client.reply(Ok(HttpResponse::empty(200)));

        let err = transport.send(&get_user()).unwrap_err();
        assert!(matches!(err, SyncError::HostUnreachable(_)));
        assert_eq!(client.urls().len(), 2);
    }

    #[test]
    fn timeout_retries_without_reset() {
        let transport = transport(RetryConfig::default());
        transport.resolver().on_response(&[("newbaseurl".into(), "https://new.com".into())]);
        let client = transport.client();
        client.reply(Err(HttpFailure::TimedOut));
        client.reply(Ok(HttpResponse::empty(200)));

        assert_eq!(transport.send(&get_user()).unwrap(), RemoteResponse::empty());
        assert!(client.urls().iter().all(|url| url.starts_with("https://new.com")));
    }

    #[test]
    fn no_retry_config_makes_one_attempt() {
        let transport = transport(RetryConfig::no_retry());
        transport.client().reply(Err(HttpFailure::TimedOut));
        transport.client().reply(Ok(HttpResponse::empty(200)));

        assert!(matches!(transport.send(&get_user()), Err(SyncError::Timeout)));
        assert_eq!(transport.client().urls().len(), 1);
    }

    #[test]
    fn server_error_is_not_retried() {
        let transport = transport(RetryConfig::default());
        let exception = ServiceException::new("INVALID_PHONE", "phone is invalid");
        transport
            .client()
            .reply(Ok(HttpResponse::json(400, &exception.to_body())));

        let err = transport.send(&get_user()).unwrap_err();
        match err {
            SyncError::Server {
                status,
                message_id,
                text,
            } => {
                assert_eq!(status, 400);
                assert_eq!(message_id, "INVALID_PHONE");
                assert_eq!(text, "phone is invalid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.client().urls().len(), 1);
    }

    #[test]
    fn redirect_on_error_response_is_followed() {
        let transport = transport(RetryConfig::default());
        transport.client().reply(Ok(
            HttpResponse::json(503, &json!({})).with_header("newbaseurl", "https://new.com")
        ));

        assert!(transport.send(&get_user()).is_err());
        assert_eq!(transport.resolver().resolve(), "https://new.com");
    }

    #[test]
    fn bodyless_success_is_empty_response() {
        let transport = transport(RetryConfig::default());
        transport.client().reply(Ok(HttpResponse::empty(204)));
        assert_eq!(transport.send(&get_user()).unwrap(), RemoteResponse::empty());
    }

    #[test]
    fn bodyless_failure_is_server_error() {
        let transport = transport(RetryConfig::default());
        transport.client().reply(Ok(HttpResponse::empty(503)));
        assert!(matches!(
            transport.send(&get_user()),
            Err(SyncError::Server { status: 503, .. })
        ));
        assert_eq!(transport.client().urls().len(), 1);
    }

    #[test]
    fn invalid_success_body_is_protocol_error() {
        let transport = transport(RetryConfig::default());
        transport.client().reply(Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: b"not json".to_vec(),
        }));

        assert!(matches!(transport.send(&get_user()), Err(SyncError::Protocol(_))));
    }
}
