//! State shared by every operation.

use crate::config::SyncConfig;
use crate::dirty::DirtyStateStore;
use crate::error::{SyncError, SyncResult};
use crate::transport::ProfileTransport;
use pushprofile_protocol::{RemoteRequest, RemoteResponse};
use tracing::{debug, warn};

/// Everything an operation may touch: configuration, local state and the
/// transport. Owned by the service and handed to the queue worker.
pub struct SyncContext {
    config: SyncConfig,
    store: DirtyStateStore,
    transport: Box<dyn ProfileTransport>,
}

impl SyncContext {
    /// Creates a context.
    pub fn new(config: SyncConfig, store: DirtyStateStore, transport: impl ProfileTransport + 'static) -> Self {
        Self {
            config,
            store,
            transport: Box::new(transport),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The current/dirty snapshots.
    pub fn store(&self) -> &DirtyStateStore {
        &self.store
    }

    /// The application code requests are signed with.
    pub fn application_code(&self) -> &str {
        &self.config.application_code
    }

    /// The current device's registration id, or `NoRegistration`.
    pub fn require_registration(&self) -> SyncResult<String> {
        self.store.push_registration_id().ok_or_else(|| {
            warn!("current installation has no push registration id");
            SyncError::NoRegistration
        })
    }

    /// Sends a request through the transport.
    pub fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        let endpoint = request.kind.label();
        debug!(endpoint, "remote call");
        let result = self.transport.send(request);
        if let Err(err) = &result {
            warn!(endpoint, error = %err, "remote call failed");
        }
        result
    }
}
