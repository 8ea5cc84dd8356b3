//! Decoded transport replies.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// A successful reply from the remote service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteResponse {
    /// Decoded JSON body, if the reply carried one.
    pub body: Option<Value>,
}

impl RemoteResponse {
    /// A reply without a body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A reply carrying `body`.
    pub fn with_body(body: Value) -> Self {
        Self { body: Some(body) }
    }

    /// Decodes the body into `T`.
    ///
    /// `what` names the expected payload in the error when the body is absent.
    pub fn decode<T: DeserializeOwned>(&self, what: &'static str) -> ProtocolResult<T> {
        match &self.body {
            Some(body) if !body.is_null() => Ok(serde_json::from_value(body.clone())?),
            _ => Err(ProtocolError::MissingBody(what)),
        }
    }
}

/// Error payload the remote service attaches to non-2xx replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceException {
    /// Machine-readable error id.
    pub message_id: String,
    /// Human-readable message.
    pub text: String,
}

impl ServiceException {
    /// Creates an exception.
    pub fn new(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            text: text.into(),
        }
    }

    /// Extracts `requestError.serviceException` from a reply body.
    pub fn from_body(body: &Value) -> Option<Self> {
        let exception = body.get("requestError")?.get("serviceException")?;
        let field = |name: &str| {
            exception
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Some(Self {
            message_id: field("messageId"),
            text: field("text"),
        })
    }

    /// Encodes the exception in the service's error envelope.
    pub fn to_body(&self) -> Value {
        json!({
            "requestError": {
                "serviceException": {
                    "messageId": self.message_id,
                    "text": self.text,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;

    #[test]
    fn decode_reads_body() {
        let response = RemoteResponse::with_body(json!({"firstName": "Luke"}));
        let user: User = response.decode("user").unwrap();
        assert_eq!(user.first_name.as_deref(), Some("Luke"));
    }

    #[test]
    fn decode_without_body_fails() {
        let err = RemoteResponse::empty().decode::<User>("user").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingBody("user")));
    }

    #[test]
    fn service_exception_envelope() {
        let exception = ServiceException::new("USER_MERGE_INTERRUPTED", "merge interrupted");
        let body = exception.to_body();

        assert_eq!(
            body["requestError"]["serviceException"]["messageId"],
            json!("USER_MERGE_INTERRUPTED")
        );
        assert_eq!(ServiceException::from_body(&body), Some(exception));
        assert_eq!(ServiceException::from_body(&json!({"other": 1})), None);
    }
}
