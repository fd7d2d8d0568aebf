use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Error kinds surfaced at the booking boundary.
///
/// Validation errors are raised before any write. `NoCarAvailable` is raised
/// only after the Availability Engine has been fully consulted. `Conflict`
/// and `Timeout` occur only inside a transaction and always imply a
/// rollback. Batch mode maps any single-request failure to a whole-batch
/// failure of the same kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// `start_time` is not strictly in the future, or `end_time <= start_time`.
    InvalidTime(String),
    /// Pickup or return city was not found among known branches.
    UnknownBranch(String),
    /// No distance is defined between two branches the algorithm needs to traverse.
    NoRoute,
    /// `transfer_time(pickup, return) > duration`.
    InsufficientDuration,
    /// The Availability Engine produced no acceptable candidate.
    NoCarAvailable,
    /// A uniqueness or serialization conflict forced rollback. Caller may retry.
    Conflict,
    /// The request's deadline elapsed before commit.
    Timeout,
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::InvalidTime(msg) => write!(f, "invalid_time: {msg}"),
            DispatchError::UnknownBranch(city) => write!(f, "unknown_branch: {city}"),
            DispatchError::NoRoute => write!(f, "no_route"),
            DispatchError::InsufficientDuration => write!(f, "insufficient_duration"),
            DispatchError::NoCarAvailable => write!(f, "no_car_available"),
            DispatchError::Conflict => write!(f, "conflict"),
            DispatchError::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            DispatchError::InvalidTime(_) => (StatusCode::BAD_REQUEST, "invalid_time"),
            DispatchError::UnknownBranch(_) => (StatusCode::BAD_REQUEST, "unknown_branch"),
            DispatchError::InsufficientDuration => {
                (StatusCode::BAD_REQUEST, "insufficient_duration")
            }
            DispatchError::NoRoute => (StatusCode::UNPROCESSABLE_ENTITY, "no_route"),
            DispatchError::NoCarAvailable => (StatusCode::CONFLICT, "no_car_available"),
            DispatchError::Conflict => (StatusCode::CONFLICT, "conflict"),
            DispatchError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        };

        let body = Json(json!({
            "error": kind,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
