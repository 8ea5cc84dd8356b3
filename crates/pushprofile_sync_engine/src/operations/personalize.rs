use super::Operation;
use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::queue::OperationPriority;
use pushprofile_protocol::{RemoteRequest, User, UserAttributes, UserIdentity};
use tracing::info;

/// Associates an identity with the current device.
///
/// The identity and attributes land in the dirty user first, so a failed
/// call leaves them queued for the next attempt. On success the server's
/// user replaces both layers, and the reply's entry for this device updates
/// the installation's primary flag and application user id.
#[derive(Debug, Clone, PartialEq)]
pub struct Personalize {
    /// Depersonalize a previous identity first.
    pub force_depersonalize: bool,
    /// Identity to associate.
    pub identity: UserIdentity,
    /// Optional descriptive attributes.
    pub attributes: Option<UserAttributes>,
}

impl Operation for Personalize {
    type Output = ();

    fn name(&self) -> &'static str {
        "personalize"
    }

    fn priority(&self) -> OperationPriority {
        OperationPriority::VeryHigh
    }

    fn execute(self, ctx: &SyncContext) -> SyncResult<()> {
        let auth = ctx.require_registration()?;

        ctx.store().user().modify_dirty(|user| {
            user.apply_identity(&self.identity);
            if let Some(attributes) = &self.attributes {
                user.apply_attributes(attributes);
            }
        })?;

        let request = RemoteRequest::personalize(
            ctx.application_code(),
            &auth,
            self.force_depersonalize,
            &self.identity,
            self.attributes.as_ref(),
        )?;
        let user: User = ctx.send(&request)?.decode("user")?;
        let own = user
            .installation(&auth)
            .map(|installation| (installation.is_primary_device, installation.application_user_id.clone()));

        ctx.store().user().archive_all(user)?;
        if let Some((is_primary, application_user_id)) = own {
            ctx.store().installation().modify_all(|installation| {
                installation.is_primary_device = is_primary;
                installation.application_user_id = application_user_id.clone();
            })?;
        }
        info!(force_depersonalize = self.force_depersonalize, "personalized");
        Ok(())
    }
}
