use chrono::Duration;

/// Fleet-wide average speed used to convert a distance into a transfer time.
///
/// A process-wide constant rather than per-car or per-route data — the
/// original design's simplification, carried forward unchanged.
pub const CAR_SPEED_KMH: i64 = 80;

/// A directed edge `(from_branch, to_branch, distance_km)`.
///
/// Directionality is preserved even though symmetric entries are typically
/// populated in practice; nothing in this crate infers `(b, a)` from `(a, b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distance {
    pub from_branch: i64,
    pub to_branch: i64,
    pub distance_km: i32,
}

/// Converts a distance in kilometers into a transfer time at `CAR_SPEED_KMH`.
pub fn transfer_time_for_distance_km(distance_km: i32) -> Duration {
    // distance_km / CAR_SPEED hours, expressed in whole seconds.
    let seconds = (distance_km as i64 * 3600) / CAR_SPEED_KMH;
    Duration::seconds(seconds)
}
