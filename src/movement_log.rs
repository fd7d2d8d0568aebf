use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An append-only record that car `car_id` is known to be at `branch_id`
/// starting at `at`.
///
/// Entries are written only by out-of-core provisioning (the car's first
/// entry) and by the Dispatcher on every successful reservation — never
/// modified in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarBranchLogEntry {
    pub car_id: i64,
    pub branch_id: i64,
    pub at: DateTime<Utc>,
}
