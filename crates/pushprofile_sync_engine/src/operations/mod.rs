//! The operations the queue runs against a [`SyncContext`].
//!
//! Every operation checks its local preconditions before touching the dirty
//! layers or the network, so a `NoRegistration` or
//! `CantLogoutCurrentRegistration` rejection leaves no trace.

mod depersonalize;
mod fetch_user;
mod personalize;
mod set_primary;
mod update_installation;
mod update_user;

pub use depersonalize::{DepersonalizeCurrent, DepersonalizeOther};
pub use fetch_user::FetchUser;
pub use personalize::Personalize;
pub use set_primary::SetPrimary;
pub use update_installation::UpdateInstallation;
pub use update_user::UpdateUser;

use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::queue::{Completion, OperationPriority, OperationQueue};

/// Result of a background sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing needed to be sent.
    UpToDate,
    /// Local edits were accepted by the server.
    Synced,
}

impl SyncOutcome {
    /// `Synced` if either side synced.
    pub fn merge(self, other: SyncOutcome) -> SyncOutcome {
        if self == SyncOutcome::Synced || other == SyncOutcome::Synced {
            SyncOutcome::Synced
        } else {
            SyncOutcome::UpToDate
        }
    }
}

/// A unit of work executed exclusively on the queue.
pub trait Operation: Send + 'static {
    /// Value delivered to the caller on success.
    type Output: Send + 'static;

    /// Name used in logs and queue introspection.
    fn name(&self) -> &'static str;

    /// Scheduling priority.
    fn priority(&self) -> OperationPriority {
        OperationPriority::Normal
    }

    /// Runs the operation.
    fn execute(self, ctx: &SyncContext) -> SyncResult<Self::Output>;
}

impl OperationQueue<SyncContext> {
    /// Queues `operation` at its own priority.
    pub fn submit_operation<O: Operation>(&self, operation: O) -> Completion<O::Output> {
        self.submit(operation.name(), operation.priority(), move |ctx| operation.execute(ctx))
    }
}
