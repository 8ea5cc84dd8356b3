use super::{Operation, SyncOutcome};
use crate::context::SyncContext;
use crate::error::SyncResult;
use pushprofile_protocol::{Delta, RemoteRequest, User};
use tracing::{debug, info};

/// Sends the user's Dirty Delta and commits what was sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateUser;

impl Operation for UpdateUser {
    type Output = SyncOutcome;

    fn name(&self) -> &'static str {
        "update_user"
    }

    fn execute(self, ctx: &SyncContext) -> SyncResult<SyncOutcome> {
        let slot = ctx.store().user();
        let (current, sent) = slot.layers();
        let delta = Delta::between(&*current, &*sent, User::LOCAL_ONLY_FIELDS)?;
        if delta.is_empty() {
            debug!("user is up to date");
            return Ok(SyncOutcome::UpToDate);
        }

        let auth = ctx.require_registration()?;
        let fields = delta.len();
        let request = RemoteRequest::patch_user(ctx.application_code(), &auth, delta)?;
        ctx.send(&request)?;

        slot.commit((*sent).clone())?;
        info!(fields, "user synced");
        Ok(SyncOutcome::Synced)
    }
}
