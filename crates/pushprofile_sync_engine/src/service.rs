//! The public entry point.

use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::dirty::DirtyStateStore;
use crate::error::SyncResult;
use crate::http::{HttpClient, HttpTransport};
use crate::operations::{
    DepersonalizeCurrent, DepersonalizeOther, FetchUser, Operation, Personalize, SetPrimary, SyncOutcome,
    UpdateInstallation, UpdateUser,
};
use crate::queue::{Completion, OperationPriority, OperationQueue, QueueStats};
use crate::transport::ProfileTransport;
use pushprofile_protocol::{
    DepersonalizationStatus, Installation, InternalData, Location, User, UserAttributes, UserIdentity,
};
use pushprofile_storage::PersistenceBackend;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// User and installation data service.
///
/// Writes go to the dirty layers immediately and are synced by operations on
/// a single queue; every call that talks to the server returns a
/// [`Completion`]. Reads (`resolve_user`, `is_changed`, ...) never wait for
/// the queue.
pub struct UserDataService {
    context: Arc<SyncContext>,
    queue: OperationQueue<SyncContext>,
}

impl UserDataService {
    /// Opens the local state in `backend` and starts the queue.
    pub fn new(
        config: SyncConfig,
        backend: Arc<dyn PersistenceBackend>,
        transport: impl ProfileTransport + 'static,
    ) -> SyncResult<Self> {
        let store = DirtyStateStore::open(backend)?;
        let thread_name = config.queue_thread_name.clone();
        let context = Arc::new(SyncContext::new(config, store, transport));
        let queue = OperationQueue::start(Arc::clone(&context), &thread_name)?;
        info!(
            registered = context.store().push_registration_id().is_some(),
            "user data service started"
        );
        Ok(Self { context, queue })
    }

    /// Like [`Self::new`] with an [`HttpTransport`] over `client`.
    pub fn with_http_client<C: HttpClient + 'static>(
        config: SyncConfig,
        backend: Arc<dyn PersistenceBackend>,
        client: C,
    ) -> SyncResult<Self> {
        let transport = HttpTransport::from_config(&config, client, Arc::clone(&backend))?;
        Self::new(config, backend, transport)
    }

    /// The shared context.
    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// The user with local edits applied.
    pub fn resolve_user(&self) -> User {
        (*self.context.store().user().dirty()).clone()
    }

    /// The last server-confirmed user.
    pub fn current_user(&self) -> User {
        (*self.context.store().user().current()).clone()
    }

    /// The current installation with local edits applied.
    pub fn resolve_installation(&self) -> Installation {
        (*self.context.store().installation().dirty()).clone()
    }

    /// Local bookkeeping.
    pub fn internal_data(&self) -> InternalData {
        (*self.context.store().internal().current()).clone()
    }

    /// Returns true if the user or the installation has unsynced edits.
    pub fn is_changed(&self) -> bool {
        self.context.store().is_changed()
    }

    /// Sets or clears the primary flag of `push_registration_id`.
    pub fn set_primary(&self, push_registration_id: &str, make_primary: bool) -> Completion<Vec<Installation>> {
        self.submit(SetPrimary::new(push_registration_id, make_primary))
    }

    /// Depersonalizes another installation of the user.
    pub fn depersonalize_other(&self, push_registration_id: &str) -> Completion<Vec<Installation>> {
        self.submit(DepersonalizeOther::new(push_registration_id))
    }

    /// Stores `user` as the dirty user and syncs it.
    pub fn save(&self, user: User) -> Completion<SyncOutcome> {
        debug!("saving user");
        if let Err(err) = self.context.store().user().archive_dirty(user) {
            return Completion::ready(Err(err));
        }
        self.submit(UpdateUser)
    }

    /// Edits the dirty user in place and syncs it.
    pub fn update_user(&self, edit: impl FnOnce(&mut User)) -> Completion<SyncOutcome> {
        if let Err(err) = self.context.store().user().modify_dirty(edit) {
            return Completion::ready(Err(err));
        }
        self.submit(UpdateUser)
    }

    /// Associates `identity` with the current device.
    pub fn personalize(
        &self,
        force_depersonalize: bool,
        identity: UserIdentity,
        attributes: Option<UserAttributes>,
    ) -> Completion<()> {
        self.submit(Personalize {
            force_depersonalize,
            identity,
            attributes,
        })
    }

    /// Reads the user from the server.
    pub fn fetch_user(&self) -> Completion<User> {
        self.submit(FetchUser)
    }

    /// Retries a pending depersonalization, then syncs installation and user.
    pub fn sync_with_server(&self) -> Completion<SyncOutcome> {
        self.queue
            .submit("sync_with_server", OperationPriority::Normal, |ctx: &SyncContext| {
                let internal = ctx.store().internal().current();
                if internal.depersonalization_status == DepersonalizationStatus::Pending {
                    let status = DepersonalizeCurrent.execute(ctx)?;
                    if status != DepersonalizationStatus::Success {
                        debug!(?status, "depersonalization unconfirmed, skipping sync");
                        return Ok(SyncOutcome::UpToDate);
                    }
                }

                let installation = UpdateInstallation.execute(ctx);
                let user = UpdateUser.execute(ctx);
                match (installation, user) {
                    (Ok(installation), Ok(user)) => Ok(installation.merge(user)),
                    (Err(err), _) | (Ok(_), Err(err)) => Err(err),
                }
            })
    }

    /// Syncs the current installation only.
    pub fn sync_installation(&self) -> Completion<SyncOutcome> {
        self.submit(UpdateInstallation)
    }

    /// Records the platform push token and syncs the installation.
    pub fn did_register_push_token(&self, token: &str) -> Completion<SyncOutcome> {
        let stored = self.context.store().installation().modify_dirty(|installation| {
            if installation.push_service_token.as_deref() != Some(token) {
                installation.push_service_token = Some(token.to_string());
            }
        });
        if let Err(err) = stored {
            return Completion::ready(Err(err));
        }
        self.submit(UpdateInstallation)
    }

    /// Depersonalizes the current device.
    ///
    /// Runs ahead of queued syncs. Local identity data is wiped before
    /// anything is sent, so this always succeeds offline; the completion
    /// reports whether the server confirmed.
    pub fn depersonalize(&self) -> Completion<DepersonalizationStatus> {
        self.queue
            .submit("depersonalize", OperationPriority::VeryHigh, |ctx: &SyncContext| {
                wipe_local(ctx)?;
                ctx.store().internal().modify_all(|data| {
                    data.depersonalization_status = DepersonalizationStatus::Pending;
                })?;
                DepersonalizeCurrent.execute(ctx)
            })
    }

    /// Wipes the current identity locally. Never touches the network.
    ///
    /// The wipe runs on the queue, after any operation already in flight,
    /// so a late server reply cannot restore the old identity.
    pub fn logout(&self) -> Completion<()> {
        self.queue
            .submit("logout", OperationPriority::VeryHigh, |ctx: &SyncContext| {
                wipe_local(ctx)?;
                ctx.store()
                    .internal()
                    .modify_all(|data| data.depersonalize_fail_counter = 0)?;
                info!("logged out");
                Ok(())
            })
    }

    /// Persists the application badge count.
    pub fn set_badge_number(&self, badge_number: i64) -> SyncResult<()> {
        self.context
            .store()
            .internal()
            .modify_all(|data| data.badge_number = badge_number)
    }

    /// Persists the last known location.
    pub fn set_location(&self, location: Location) -> SyncResult<()> {
        self.context
            .store()
            .internal()
            .modify_all(|data| data.location = Some(location))
    }

    /// Queue counters.
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Waits until the queue has nothing queued or running.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.queue.wait_idle(timeout)
    }

    /// Cancels queued operations and stops the queue.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    fn submit<O: Operation>(&self, operation: O) -> Completion<O::Output> {
        self.queue.submit_operation(operation)
    }
}

fn wipe_local(ctx: &SyncContext) -> SyncResult<()> {
    let store = ctx.store();
    store.user().reset()?;
    store.installation().modify_all(|installation| {
        installation.is_primary_device = false;
        installation.application_user_id = None;
        installation.custom_attributes = None;
    })?;
    debug!("local identity wiped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::transport::{FixtureReply, FixtureTransport, OfflineTransport};
    use pushprofile_storage::InMemoryBackend;
    use serde_json::json;

    fn service(transport: impl ProfileTransport + 'static) -> UserDataService {
        UserDataService::new(SyncConfig::new("app"), Arc::new(InMemoryBackend::new()), transport).unwrap()
    }

    fn register(service: &UserDataService, id: &str) {
        let installation = Installation {
            application_user_id: Some("app-user".into()),
            is_primary_device: true,
            ..Installation::with_registration(id)
        };
        let fingerprint = installation.system_data_fingerprint();
        service.context().store().installation().archive_all(installation).unwrap();
        service
            .context()
            .store()
            .internal()
            .modify_all(|data| data.system_data_hash = fingerprint)
            .unwrap();
    }

    #[test]
    fn logout_works_offline() {
        let transport = Arc::new(OfflineTransport::new());
        let service = service(Arc::clone(&transport));
        register(&service, "A");
        service
            .context()
            .store()
            .user()
            .archive_all(User {
                external_user_id: Some("ext".into()),
                ..User::default()
            })
            .unwrap();

        service.logout().wait().unwrap();

        assert_eq!(service.resolve_user(), User::default());
        let installation = service.resolve_installation();
        assert!(installation.has_registration("A"));
        assert!(!installation.is_primary_device);
        assert!(installation.application_user_id.is_none());
        assert!(!service.is_changed());
        assert_eq!(transport.attempts(), 0);
    }

    #[test]
    fn logout_waits_for_in_flight_sync() {
        let transport = Arc::new(FixtureTransport::new());
        transport.set_default("patch_user", FixtureReply::empty());
        let service = service(Arc::clone(&transport));
        register(&service, "A");
        service
            .context()
            .store()
            .user()
            .archive_all(User {
                external_user_id: Some("luke".into()),
                first_name: Some("Luke".into()),
                ..User::default()
            })
            .unwrap();

        transport.pause();
        let update = service.update_user(|user| user.last_name = Some("Skywalker".into()));
        assert!(transport.wait_for_requests(1, Duration::from_secs(5)));
        let logout = service.logout();
        transport.resume();

        assert_eq!(update.wait().unwrap(), SyncOutcome::Synced);
        logout.wait().unwrap();

        assert_eq!(service.current_user(), User::default());
        assert_eq!(service.resolve_user(), User::default());
        assert!(!service.is_changed());
        assert_eq!(service.sync_with_server().wait().unwrap(), SyncOutcome::UpToDate);
        assert_eq!(transport.request_count("patch_user"), 1);
    }

    #[test]
    fn update_user_edits_then_syncs() {
        let transport = Arc::new(FixtureTransport::new());
        transport.set_default("patch_user", FixtureReply::empty());
        let service = service(Arc::clone(&transport));
        register(&service, "A");

        let outcome = service
            .update_user(|user| user.tags = Some(["vip".to_string()].into_iter().collect()))
            .wait()
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Synced);
        assert_eq!(transport.requests()[0].body, Some(json!({"tags": ["vip"]})));
        assert!(!service.is_changed());
    }

    #[test]
    fn push_token_triggers_registration() {
        let transport = Arc::new(FixtureTransport::new());
        transport.set_default("post_instance", FixtureReply::body(json!({"pushRegId": "NEW", "pushServiceToken": "tok"})));
        let service = service(Arc::clone(&transport));

        let outcome = service.did_register_push_token("tok").wait().unwrap();

        assert_eq!(outcome, SyncOutcome::Synced);
        assert_eq!(service.context().store().push_registration_id().as_deref(), Some("NEW"));
    }

    #[test]
    fn depersonalize_wipes_then_confirms() {
        let transport = Arc::new(FixtureTransport::new());
        transport.set_default("depersonalize", FixtureReply::empty());
        let service = service(Arc::clone(&transport));
        register(&service, "A");

        let status = service.depersonalize().wait().unwrap();

        assert_eq!(status, DepersonalizationStatus::Success);
        assert_eq!(service.internal_data().depersonalization_status, DepersonalizationStatus::Success);
        assert!(!service.resolve_installation().is_primary_device);
    }

    #[test]
    fn pending_depersonalization_is_retried_by_sync() {
        let transport = Arc::new(FixtureTransport::new());
        transport.push_reply("depersonalize", FixtureReply::HostUnreachable);
        transport.set_default("depersonalize", FixtureReply::empty());
        let service = service(Arc::clone(&transport));
        register(&service, "A");

        assert_eq!(service.depersonalize().wait().unwrap(), DepersonalizationStatus::Pending);
        assert_eq!(service.internal_data().depersonalize_fail_counter, 1);

        assert_eq!(service.sync_with_server().wait().unwrap(), SyncOutcome::UpToDate);
        assert_eq!(service.internal_data().depersonalization_status, DepersonalizationStatus::Success);
        assert_eq!(transport.request_count("depersonalize"), 2);
    }

    #[test]
    fn local_bookkeeping_is_persisted() {
        let service = service(OfflineTransport::new());
        service.set_badge_number(5).unwrap();
        service
            .set_location(Location {
                latitude: 45.8,
                longitude: 15.97,
            })
            .unwrap();

        let data = service.internal_data();
        assert_eq!(data.badge_number, 5);
        assert!(data.location.is_some());
    }

    #[test]
    fn shutdown_cancels_later_submissions() {
        let service = service(OfflineTransport::new());
        service.shutdown();
        assert!(matches!(service.fetch_user().wait(), Err(SyncError::Cancelled)));
    }
}
