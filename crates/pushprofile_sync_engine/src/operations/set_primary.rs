use super::{Operation, UpdateInstallation};
use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::reconcile::apply_primary_switch;
use pushprofile_protocol::{Installation, RemoteRequest};
use tracing::info;

/// Sets or clears the primary flag of one of the user's installations.
///
/// For the current device the flag goes through the dirty installation and an
/// inline [`UpdateInstallation`]. Any other device is patched on behalf of the
/// current one, and the current device loses the flag if another one takes
/// it. On success the cached installation list is reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPrimary {
    /// Target installation.
    pub push_registration_id: String,
    /// New value of the flag.
    pub make_primary: bool,
}

impl SetPrimary {
    /// Creates the operation.
    pub fn new(push_registration_id: impl Into<String>, make_primary: bool) -> Self {
        Self {
            push_registration_id: push_registration_id.into(),
            make_primary,
        }
    }
}

impl Operation for SetPrimary {
    type Output = Vec<Installation>;

    fn name(&self) -> &'static str {
        "set_primary"
    }

    fn execute(self, ctx: &SyncContext) -> SyncResult<Vec<Installation>> {
        let target = self.push_registration_id.as_str();
        let make_primary = self.make_primary;

        if ctx.store().push_registration_id().as_deref() == Some(target) {
            ctx.store()
                .installation()
                .modify_dirty(|installation| installation.is_primary_device = make_primary)?;
            UpdateInstallation.execute(ctx)?;
        } else {
            let auth = ctx.require_registration()?;
            let request = RemoteRequest::set_other_primary(ctx.application_code(), &auth, target, make_primary)?;
            ctx.send(&request)?;
            if make_primary {
                ctx.store()
                    .installation()
                    .modify_all(|installation| installation.is_primary_device = false)?;
            }
        }

        ctx.store().user().modify_all(|user| {
            if let Some(list) = &user.installations {
                user.installations = Some(apply_primary_switch(list, target, make_primary));
            }
        })?;
        info!(push_registration_id = target, make_primary, "primary device updated");
        Ok(ctx.store().user().dirty().installations.clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::operations::test_support::{context, registered, with_installations};
    use crate::transport::FixtureReply;
    use pushprofile_testkit::fixtures::installation;
    use serde_json::json;

    fn flags(list: &[Installation]) -> Vec<(&str, bool)> {
        list.iter()
            .map(|i| (i.push_registration_id.as_deref().unwrap_or(""), i.is_primary_device))
            .collect()
    }

    #[test]
    fn other_device_is_patched_on_behalf_of_current() {
        let (ctx, transport) = registered("A");
        transport.set_default("patch_other_instance", FixtureReply::empty());
        with_installations(&ctx, vec![installation("A", true), installation("B", false)]);

        let list = SetPrimary::new("B", true).execute(&ctx).unwrap();

        assert_eq!(flags(&list), vec![("A", false), ("B", true)]);
        let request = &transport.requests()[0];
        assert_eq!(request.auth_push_registration_id(), Some("A"));
        assert_eq!(request.body, Some(json!({"isPrimary": true})));
        assert!(!ctx.store().user().is_changed());
    }

    #[test]
    fn current_device_loses_flag_to_other() {
        let (ctx, transport) = registered("A");
        transport.set_default("patch_other_instance", FixtureReply::empty());
        ctx.store()
            .installation()
            .modify_all(|installation| installation.is_primary_device = true)
            .unwrap();

        SetPrimary::new("B", true).execute(&ctx).unwrap();

        assert!(!ctx.store().installation().current().is_primary_device);
        assert!(!ctx.store().installation().dirty().is_primary_device);
    }

    #[test]
    fn current_device_goes_through_update_installation() {
        let (ctx, transport) = registered("A");
        transport.set_default("patch_instance", FixtureReply::empty());
        with_installations(&ctx, vec![installation("A", false), installation("B", true)]);

        let list = SetPrimary::new("A", true).execute(&ctx).unwrap();

        assert_eq!(flags(&list), vec![("A", true), ("B", false)]);
        assert_eq!(transport.endpoints(), vec!["patch_instance"]);
        assert!(ctx.store().installation().current().is_primary_device);
        assert!(!ctx.store().installation().is_changed());
    }

    #[test]
    fn without_registration_fails_before_network() {
        let (ctx, transport) = context();
        with_installations(&ctx, vec![installation("B", false)]);

        let err = SetPrimary::new("B", true).execute(&ctx).unwrap_err();
        assert!(matches!(err, SyncError::NoRegistration));
        assert!(transport.requests().is_empty());
        assert!(!ctx.store().user().dirty().installations.as_ref().unwrap()[0].is_primary_device);
    }

    #[test]
    fn invalid_target_is_unknown_error() {
        let (ctx, transport) = registered("A");
        let err = SetPrimary::new("B C", true).execute(&ctx).unwrap_err();
        assert!(matches!(err, SyncError::UnknownError(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn server_failure_leaves_list_unchanged() {
        let (ctx, transport) = registered("A");
        transport.set_default("patch_other_instance", FixtureReply::server(403, "FORBIDDEN", "no"));
        with_installations(&ctx, vec![installation("A", true), installation("B", false)]);

        assert!(SetPrimary::new("B", true).execute(&ctx).is_err());
        let user = ctx.store().user().dirty();
        assert_eq!(flags(user.installations.as_ref().unwrap()), vec![("A", true), ("B", false)]);
    }
}
