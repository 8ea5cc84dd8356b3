use super::Operation;
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::queue::OperationPriority;
use crate::reconcile::apply_device_removal;
use pushprofile_protocol::{DepersonalizationStatus, Installation, RemoteRequest};
use tracing::{info, warn};

/// Depersonalizes another installation of the same user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepersonalizeOther {
    /// Installation to depersonalize.
    pub push_registration_id: String,
}

impl DepersonalizeOther {
    /// Creates the operation.
    pub fn new(push_registration_id: impl Into<String>) -> Self {
        Self {
            push_registration_id: push_registration_id.into(),
        }
    }
}

impl Operation for DepersonalizeOther {
    type Output = Vec<Installation>;

    fn name(&self) -> &'static str {
        "depersonalize_other"
    }

    fn priority(&self) -> OperationPriority {
        OperationPriority::VeryHigh
    }

    fn execute(self, ctx: &SyncContext) -> SyncResult<Vec<Installation>> {
        let target = self.push_registration_id.as_str();
        if ctx.store().push_registration_id().as_deref() == Some(target) {
            warn!("current installation must be depersonalized through logout");
            return Err(SyncError::CantLogoutCurrentRegistration);
        }
        let auth = ctx.require_registration()?;

        let request = RemoteRequest::depersonalize_other(ctx.application_code(), &auth, target)?;
        ctx.send(&request)?;

        ctx.store().user().modify_all(|user| {
            if let Some(list) = &user.installations {
                user.installations = Some(apply_device_removal(list, target));
            }
        })?;
        info!(push_registration_id = target, "installation depersonalized");
        Ok(ctx.store().user().dirty().installations.clone().unwrap_or_default())
    }
}

/// Confirms a depersonalization of the current device with the server.
///
/// Local data is wiped before this runs. A failed call bumps the fail
/// counter and the status stays `pending` until the configured limit is
/// reached, then turns `failure`. The resulting status is returned either
/// way; the remote error is only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepersonalizeCurrent;

impl Operation for DepersonalizeCurrent {
    type Output = DepersonalizationStatus;

    fn name(&self) -> &'static str {
        "depersonalize"
    }

    fn priority(&self) -> OperationPriority {
        OperationPriority::VeryHigh
    }

    fn execute(self, ctx: &SyncContext) -> SyncResult<DepersonalizationStatus> {
        let internal = ctx.store().internal();
        let Some(auth) = ctx.store().push_registration_id() else {
            internal.modify_all(|data| data.depersonalization_succeeded())?;
            info!("no registration, local depersonalization is final");
            return Ok(DepersonalizationStatus::Success);
        };

        let request = RemoteRequest::depersonalize(ctx.application_code(), &auth)?;
        match ctx.send(&request) {
            Ok(_) => {
                internal.modify_all(|data| data.depersonalization_succeeded())?;
                info!("depersonalization confirmed");
            }
            Err(err) => {
                let max = ctx.config().max_depersonalize_failures;
                internal.modify_all(|data| data.depersonalization_failed(max))?;
                warn!(
                    error = %err,
                    failures = internal.current().depersonalize_fail_counter,
                    "depersonalization not confirmed"
                );
            }
        }
        Ok(internal.current().depersonalization_status)
    }
}
