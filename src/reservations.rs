use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A committed assignment of a car to a pickup/return window.
///
/// Created only by the Dispatcher. May be cancelled (deleted) by
/// out-of-core administration, which must also remove the two
/// movement-log entries whose timestamps equal `start_time`/`end_time`.
///
/// Two reservations conflict — closed intervals — iff
/// `a.start_time <= b.end_time AND a.end_time >= b.start_time`; this rule
/// is enforced at the SQL layer by `reservations_repo::overlapping_conn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub car_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub pickup_branch_id: i64,
    pub return_branch_id: i64,
}
