use super::Operation;
use crate::context::SyncContext;
use crate::error::SyncResult;
use pushprofile_protocol::{RemoteRequest, User};
use tracing::info;

/// Reads the user from the server and rebases unsynced edits onto it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchUser;

impl Operation for FetchUser {
    type Output = User;

    fn name(&self) -> &'static str {
        "fetch_user"
    }

    fn execute(self, ctx: &SyncContext) -> SyncResult<User> {
        let auth = ctx.require_registration()?;
        let request = RemoteRequest::get_user(ctx.application_code(), &auth)?;
        let remote: User = ctx.send(&request)?.decode("user")?;

        let resolved = ctx.store().user().rebase(remote)?;
        info!("user fetched");
        Ok((*resolved).clone())
    }
}
