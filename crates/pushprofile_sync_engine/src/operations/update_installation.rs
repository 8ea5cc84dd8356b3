use super::{Operation, SyncOutcome};
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use pushprofile_protocol::{Delta, Installation, RemoteRequest};
use serde_json::Value;
use tracing::{debug, info};

/// Syncs the current device's installation.
///
/// A registered installation sends its Dirty Delta, plus every system-data
/// field whenever the system-data fingerprint moved since the last
/// acknowledged sync. An unregistered installation with a push token posts
/// its full snapshot and adopts the server's reply, including the assigned
/// registration id.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateInstallation;

impl Operation for UpdateInstallation {
    type Output = SyncOutcome;

    fn name(&self) -> &'static str {
        "update_installation"
    }

    fn execute(self, ctx: &SyncContext) -> SyncResult<SyncOutcome> {
        let (current, sent) = ctx.store().installation().layers();
        match current.push_registration_id.as_deref() {
            Some(id) => patch(ctx, id, &current, &sent),
            None => register(ctx, &sent),
        }
    }
}

fn patch(ctx: &SyncContext, id: &str, current: &Installation, sent: &Installation) -> SyncResult<SyncOutcome> {
    let mut delta = Delta::between(current, sent, Installation::LOCAL_ONLY_FIELDS)?;
    let fingerprint = sent.system_data_fingerprint();
    let system_data_changed = fingerprint != ctx.store().internal().current().system_data_hash;
    if system_data_changed {
        for (field, value) in sent.system_data() {
            delta.insert_if_absent(field, value);
        }
    }
    if delta.is_empty() {
        debug!("installation is up to date");
        return Ok(SyncOutcome::UpToDate);
    }

    let fields = delta.len();
    let request = RemoteRequest::patch_instance(ctx.application_code(), id, delta)?;
    ctx.send(&request)?;

    ctx.store().installation().commit(sent.clone())?;
    if system_data_changed {
        ctx.store()
            .internal()
            .modify_all(|internal| internal.system_data_hash = fingerprint)?;
    }
    info!(fields, system_data_changed, "installation synced");
    Ok(SyncOutcome::Synced)
}

fn register(ctx: &SyncContext, sent: &Installation) -> SyncResult<SyncOutcome> {
    if sent.push_service_token.is_none() {
        debug!("no push token yet, nothing to register");
        return Ok(SyncOutcome::UpToDate);
    }

    let mut body = serde_json::to_value(sent).map_err(|e| SyncError::Codec(e.to_string()))?;
    if let Value::Object(map) = &mut body {
        map.retain(|_, value| !value.is_null());
    }
    let request = RemoteRequest::post_instance(ctx.application_code(), body)?;
    let registered: Installation = ctx.send(&request)?.decode("installation")?;
    let Some(id) = registered.push_registration_id.clone() else {
        return Err(SyncError::Protocol("registration reply has no pushRegId".into()));
    };

    let fingerprint = sent.system_data_fingerprint();
    ctx.store().installation().archive_all(registered)?;
    ctx.store()
        .internal()
        .modify_all(|internal| internal.system_data_hash = fingerprint)?;
    info!(push_registration_id = %id, "installation registered");
    Ok(SyncOutcome::Synced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::test_support::{context, registered};
    use crate::transport::FixtureReply;
    use serde_json::json;

    #[test]
    fn unregistered_without_token_is_up_to_date() {
        let (ctx, transport) = context();
        assert_eq!(UpdateInstallation.execute(&ctx).unwrap(), SyncOutcome::UpToDate);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn registration_posts_snapshot_and_adopts_reply() {
        let (ctx, transport) = context();
        transport.set_default(
            "post_instance",
            FixtureReply::body(json!({"pushRegId": "NEW", "pushServiceToken": "tok"})),
        );
        ctx.store()
            .installation()
            .modify_dirty(|installation| installation.push_service_token = Some("tok".into()))
            .unwrap();

        assert_eq!(UpdateInstallation.execute(&ctx).unwrap(), SyncOutcome::Synced);

        let request = &transport.requests()[0];
        let body = request.body.as_ref().unwrap();
        assert_eq!(body["pushServiceToken"], json!("tok"));
        assert!(body.get("pushRegId").is_none());
        assert_eq!(ctx.store().push_registration_id().as_deref(), Some("NEW"));
        assert!(!ctx.store().installation().is_changed());
        assert_ne!(ctx.store().internal().current().system_data_hash, 0);
    }

    #[test]
    fn registration_reply_without_id_is_rejected() {
        let (ctx, transport) = context();
        transport.set_default("post_instance", FixtureReply::body(json!({"pushServiceToken": "tok"})));
        ctx.store()
            .installation()
            .modify_dirty(|installation| installation.push_service_token = Some("tok".into()))
            .unwrap();

        assert!(matches!(UpdateInstallation.execute(&ctx), Err(SyncError::Protocol(_))));
        assert!(ctx.store().push_registration_id().is_none());
    }

    #[test]
    fn registered_sends_delta_only() {
        let (ctx, transport) = registered("A");
        transport.set_default("patch_instance", FixtureReply::empty());
        ctx.store()
            .installation()
            .modify_dirty(|installation| installation.is_primary_device = true)
            .unwrap();

        assert_eq!(UpdateInstallation.execute(&ctx).unwrap(), SyncOutcome::Synced);
        assert_eq!(transport.requests()[0].body, Some(json!({"isPrimary": true})));
        assert_eq!(UpdateInstallation.execute(&ctx).unwrap(), SyncOutcome::UpToDate);
    }

    #[test]
    fn changed_system_data_is_sent_in_full() {
        let (ctx, transport) = registered("A");
        transport.set_default("patch_instance", FixtureReply::empty());
        ctx.store()
            .installation()
            .modify_dirty(|installation| installation.os_version = Some("18.0".into()))
            .unwrap();

        UpdateInstallation.execute(&ctx).unwrap();

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["osVersion"], json!("18.0"));
        assert!(body.get("sdkVersion").is_some());
        assert!(body.get("notificationsEnabled").is_some());

        let expected = ctx.store().installation().current().system_data_fingerprint();
        assert_eq!(ctx.store().internal().current().system_data_hash, expected);
    }

    #[test]
    fn stale_fingerprint_resends_system_data() {
        let (ctx, transport) = registered("A");
        transport.set_default("patch_instance", FixtureReply::empty());
        ctx.store()
            .internal()
            .modify_all(|internal| internal.system_data_hash = 0)
            .unwrap();

        assert_eq!(UpdateInstallation.execute(&ctx).unwrap(), SyncOutcome::Synced);
        assert_eq!(UpdateInstallation.execute(&ctx).unwrap(), SyncOutcome::UpToDate);
        assert_eq!(transport.request_count("patch_instance"), 1);
    }

    #[test]
    fn failure_keeps_dirty_and_fingerprint() {
        let (ctx, transport) = registered("A");
        transport.set_default("patch_instance", FixtureReply::HostUnreachable);
        let before = ctx.store().internal().current().system_data_hash;
        ctx.store()
            .installation()
            .modify_dirty(|installation| installation.device_name = Some("phone".into()))
            .unwrap();

        assert!(UpdateInstallation.execute(&ctx).is_err());
        assert!(ctx.store().installation().is_changed());
        assert_eq!(ctx.store().internal().current().system_data_hash, before);
    }
}
