pub mod cars;
pub mod reservations;

pub use cars::*;
pub use reservations::*;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

/// Standard wrapper for single resource responses.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Standard wrapper for list responses.
#[derive(Debug, Serialize)]
pub struct DataListResponse<T> {
    pub data: Vec<T>,
}

/// Consistent JSON error body for handler-level failures that never reach
/// the Dispatcher (bad path parameters, missing resources).
pub fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(json!({ "errors": message })))
}
