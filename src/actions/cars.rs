use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::branches_repo::BranchesRepository;
use crate::cars_repo::CarsRepository;
use crate::movement_log_repo::MovementLogRepository;
use crate::web::AppState;

use super::{DataResponse, json_error};

#[derive(Debug, Serialize)]
pub struct CarLocationView {
    pub car_number: String,
    pub branch_id: i64,
    pub city: String,
}

#[derive(Debug, Deserialize)]
pub struct CarLocationQuery {
    pub at: Option<DateTime<Utc>>,
}

/// `GET /cars/{car_number}/location?at=<rfc3339>`: the car's branch as of
/// `at` (defaulting to now), derived from the movement log (spec.md §3's
/// `current_branch_of(car, at_time)`).
pub async fn get_car_location(
    State(state): State<AppState>,
    Path(car_number): Path<String>,
    Query(query): Query<CarLocationQuery>,
) -> impl IntoResponse {
    let at = query.at.unwrap_or_else(Utc::now);

    let cars_repo = CarsRepository::new(state.pool.clone());
    let movement_log = MovementLogRepository::new(state.pool.clone());
    let branches_repo = BranchesRepository::new(state.pool);

    let car = match cars_repo.get_by_car_number(car_number.clone()).await {
        Ok(Some(car)) => car,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "car not found").into_response(),
        Err(e) => {
            error!("failed to look up car: {}", e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to look up car")
                .into_response();
        }
    };

    let branch_id = match movement_log.latest_branch_before(car.id, at).await {
        Ok(Some(branch_id)) => branch_id,
        Ok(None) => {
            return json_error(
                StatusCode::NOT_FOUND,
                "car has no known location before the requested time",
            )
            .into_response();
        }
        Err(e) => {
            error!("failed to derive car location: {}", e);
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to derive car location",
            )
            .into_response();
        }
    };

    let city = match branches_repo.get_by_id(branch_id).await {
        Ok(Some(branch)) => branch.city,
        Ok(None) => {
            error!("movement log references unknown branch {}", branch_id);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "unknown branch")
                .into_response();
        }
        Err(e) => {
            error!("failed to look up branch: {}", e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to look up branch")
                .into_response();
        }
    };

    Json(DataResponse {
        data: CarLocationView {
            car_number,
            branch_id,
            city,
        },
    })
    .into_response()
}
