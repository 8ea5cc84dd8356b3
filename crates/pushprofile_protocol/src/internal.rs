//! Process-local bookkeeping that is never part of the public profile.

use serde::{Deserialize, Serialize};

/// State of the current device's depersonalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepersonalizationStatus {
    /// No depersonalization has been attempted.
    #[default]
    Undefined,
    /// Local data is wiped; the server has not confirmed yet.
    Pending,
    /// The server confirmed the depersonalization.
    Success,
    /// Retries are exhausted.
    Failure,
}

/// Last known device location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Bookkeeping kept next to the profile snapshots.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InternalData {
    /// Fingerprint of the last system data the server acknowledged.
    pub system_data_hash: i64,
    /// Depersonalization status of the current device.
    pub depersonalization_status: DepersonalizationStatus,
    /// Consecutive failed depersonalization attempts.
    pub depersonalize_fail_counter: u32,
    /// Application badge count.
    pub badge_number: i64,
    /// Last known location.
    pub location: Option<Location>,
}

impl InternalData {
    /// Records a confirmed depersonalization.
    pub fn depersonalization_succeeded(&mut self) {
        self.depersonalization_status = DepersonalizationStatus::Success;
        self.depersonalize_fail_counter = 0;
    }

    /// Records a failed depersonalization attempt.
    ///
    /// The status stays `Pending` until `max_failures` attempts have failed.
    pub fn depersonalization_failed(&mut self, max_failures: u32) {
        self.depersonalize_fail_counter = self.depersonalize_fail_counter.saturating_add(1);
        self.depersonalization_status = if self.depersonalize_fail_counter >= max_failures {
            DepersonalizationStatus::Failure
        } else {
            DepersonalizationStatus::Pending
        };
    }
}
