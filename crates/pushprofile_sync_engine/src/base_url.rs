//! Base-URL selection and failover.

use crate::dirty::{decode, encode};
use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use pushprofile_storage::PersistenceBackend;
use std::sync::Arc;
use tracing::{info, warn};

/// Response header carrying a redirect to a new base URL.
pub const NEW_BASE_URL_HEADER: &str = "newbaseurl";

/// Storage key of the persisted dynamic base URL.
pub const DYNAMIC_BASE_URL_KEY: &str = "dynamic_base_url";

/// Tracks the configured base URL and the one the server redirected to.
pub struct BaseUrlResolver {
    original: String,
    dynamic: RwLock<Option<String>>,
    backend: Option<Arc<dyn PersistenceBackend>>,
}

impl BaseUrlResolver {
    /// Creates an in-memory resolver starting at `original`.
    pub fn new(original: impl Into<String>) -> Self {
        let original = original.into();
        Self {
            dynamic: RwLock::new(Some(original.clone())),
            original,
            backend: None,
        }
    }

    /// Creates a resolver that restores and persists the dynamic URL.
    pub fn with_persistence(
        original: impl Into<String>,
        backend: Arc<dyn PersistenceBackend>,
    ) -> SyncResult<Self> {
        let original = original.into();
        let dynamic = match backend.load(DYNAMIC_BASE_URL_KEY)? {
            Some(bytes) => decode::<String>(&bytes)?,
            None => original.clone(),
        };

        Ok(Self {
            original,
            dynamic: RwLock::new(Some(dynamic)),
            backend: Some(backend),
        })
    }

    /// The configured base URL.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The base URL the next request should use.
    pub fn resolve(&self) -> String {
        self.dynamic
            .read()
            .clone()
            .unwrap_or_else(|| self.original.clone())
    }

    /// Follows a redirect header, if the response carries one.
    ///
    /// Returns true if the dynamic URL changed. A missing header changes
    /// nothing.
    pub fn on_response(&self, headers: &[(String, String)]) -> bool {
        let redirect = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(NEW_BASE_URL_HEADER))
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty());

        let Some(redirect) = redirect else {
            return false;
        };
        if self.dynamic.read().as_deref() == Some(redirect) {
            return false;
        }

        info!(base_url = redirect, "following base url redirect");
        self.set(redirect.to_string());
        true
    }

    /// Reacts to a failed request.
    ///
    /// Host-unreachable failures reset the dynamic URL to the original.
    /// Returns true if the request may be retried once more.
    pub fn on_failure(&self, error: &SyncError) -> bool {
        match error {
            SyncError::HostUnreachable(_) => {
                if self.resolve() != self.original {
                    warn!(base_url = %self.original, "host unreachable, resetting to original base url");
                }
                self.reset();
                true
            }
            other => other.is_retryable(),
        }
    }

    /// Forces the dynamic URL back to the original.
    pub fn reset(&self) {
        self.set(self.original.clone());
    }

    fn set(&self, url: String) {
        if let Some(backend) = &self.backend {
            let stored = encode(&url).and_then(|bytes| Ok(backend.archive(DYNAMIC_BASE_URL_KEY, &bytes)?));
            if let Err(err) = stored {
                warn!(error = %err, "failed to persist dynamic base url");
            }
        }
        *self.dynamic.write() = Some(url);
    }
}
