use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::dispatch::ReservationRequest;
use crate::reservations::Reservation;
use crate::reservations_repo::ReservationsRepository;
use crate::web::AppState;

use super::{DataListResponse, DataResponse, json_error};

#[derive(Debug, Deserialize)]
pub struct ReservationRequestBody {
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub pickup_city: String,
    pub return_city: String,
}

impl From<ReservationRequestBody> for ReservationRequest {
    fn from(body: ReservationRequestBody) -> Self {
        ReservationRequest {
            start_time: body.start_time,
            duration_minutes: body.duration_minutes,
            pickup_city: body.pickup_city,
            return_city: body.return_city,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReservationView {
    pub id: Uuid,
    pub car_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub pickup_branch_id: i64,
    pub return_branch_id: i64,
}

impl From<Reservation> for ReservationView {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            car_id: r.car_id,
            start_time: r.start_time,
            end_time: r.end_time,
            pickup_branch_id: r.pickup_branch_id,
            return_branch_id: r.return_branch_id,
        }
    }
}

/// `POST /reservations`: dispatch a single request.
pub async fn create_reservation(
    State(state): State<AppState>,
    Json(body): Json<ReservationRequestBody>,
) -> impl IntoResponse {
    match state.dispatcher.reserve_one(body.into()).await {
        Ok(reservation) => Json(DataResponse {
            data: ReservationView::from(reservation),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// `POST /reservations/batch`: atomic all-or-nothing dispatch of several
/// requests, applying the nearest-branch rule per request.
pub async fn create_reservations_batch(
    State(state): State<AppState>,
    Json(bodies): Json<Vec<ReservationRequestBody>>,
) -> impl IntoResponse {
    let reqs = bodies.into_iter().map(ReservationRequest::from).collect();

    match state.dispatcher.reserve_batch(reqs).await {
        Ok(reservations) => Json(DataListResponse {
            data: reservations.into_iter().map(ReservationView::from).collect(),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// `GET /reservations/upcoming`: all reservations with `start_time > now`,
/// ascending by `start_time`.
pub async fn list_upcoming_reservations(State(state): State<AppState>) -> impl IntoResponse {
    let repo = ReservationsRepository::new(state.pool);
    match repo.upcoming().await {
        Ok(reservations) => Json(DataListResponse {
            data: reservations.into_iter().map(ReservationView::from).collect(),
        })
        .into_response(),
        Err(e) => {
            error!("failed to list upcoming reservations: {}", e);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to list upcoming reservations",
            )
            .into_response()
        }
    }
}

/// `DELETE /reservations/{id}`: cancel a reservation and its two
/// matching movement-log entries.
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.dispatcher.cancel(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => json_error(StatusCode::NOT_FOUND, "reservation not found").into_response(),
        Err(err) => err.into_response(),
    }
}
