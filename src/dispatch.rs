use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use diesel::Connection;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::{info, info_span, warn, Instrument};

use crate::availability::{AvailabilityRequest, all_available, first_available, nearest_branch};
use crate::branches_repo::BranchesRepository;
use crate::db::DbPool;
use crate::distance_repo::DistanceOracle;
use crate::error::DispatchError;
use crate::reservations::Reservation;
use crate::reservations_repo::create_conn;

/// How many times a transaction is retried after a serializable-isolation
/// conflict before surfacing `conflict` to the caller (spec.md §5's "retry
/// up to a small fixed budget").
const MAX_SERIALIZATION_RETRIES: u32 = 3;

/// One requested booking as it arrives at the boundary: an absolute start
/// time, a duration, and the two cities involved.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub pickup_city: String,
    pub return_city: String,
}

/// A request after city names have been resolved to branch ids and the
/// pre-transaction invariants have been checked.
#[derive(Debug, Clone, Copy)]
struct ValidatedRequest {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    pickup_branch_id: i64,
    return_branch_id: i64,
}

/// Opens serializable transactions, consults the Availability Engine, and
/// commits the winning reservation. The sole entry point that ever writes
/// to the Reservation Store or Movement Log.
#[derive(Clone)]
pub struct Dispatcher {
    pool: DbPool,
    branches: BranchesRepository,
    distances: DistanceOracle,
    /// Ambient per-request deadline (spec.md §5). Exceeding it surfaces
    /// `DispatchError::Timeout` instead of waiting indefinitely on a
    /// contended transaction.
    deadline: StdDuration,
}

impl Dispatcher {
    pub fn new(pool: DbPool, deadline: StdDuration) -> Self {
        Self {
            branches: BranchesRepository::new(pool.clone()),
            distances: DistanceOracle::new(pool.clone()),
            pool,
            deadline,
        }
    }

    /// Validates a single request against "now", resolves its cities, and
    /// checks that a transfer between pickup and return fits in the
    /// requested duration — all before any transaction opens.
    async fn validate(&self, req: &ReservationRequest) -> Result<ValidatedRequest, DispatchError> {
        if req.start_time <= Utc::now() {
            return Err(DispatchError::InvalidTime(
                "start_time must be strictly in the future".to_string(),
            ));
        }
        if req.duration_minutes <= 0 {
            return Err(DispatchError::InvalidTime(
                "end_time must be after start_time".to_string(),
            ));
        }
        let end_time = req.start_time + Duration::minutes(req.duration_minutes);

        let pickup = self
            .branches
            .get_by_city(req.pickup_city.clone())
            .await
            .map_err(|_| DispatchError::UnknownBranch(req.pickup_city.clone()))?
            .ok_or_else(|| DispatchError::UnknownBranch(req.pickup_city.clone()))?;

        let return_branch = self
            .branches
            .get_by_city(req.return_city.clone())
            .await
            .map_err(|_| DispatchError::UnknownBranch(req.return_city.clone()))?
            .ok_or_else(|| DispatchError::UnknownBranch(req.return_city.clone()))?;

        let transfer = self
            .distances
            .transfer_time(pickup.id, return_branch.id)
            .await
            .map_err(|_| DispatchError::NoRoute)?
            .ok_or(DispatchError::NoRoute)?;

        if transfer > (end_time - req.start_time) {
            return Err(DispatchError::InsufficientDuration);
        }

        Ok(ValidatedRequest {
            start_time: req.start_time,
            end_time,
            pickup_branch_id: pickup.id,
            return_branch_id: return_branch.id,
        })
    }

    /// `reserve_one(req)`: the single-request dispatch path described in
    /// spec.md §4.5.
    pub async fn reserve_one(&self, req: ReservationRequest) -> Result<Reservation, DispatchError> {
        let span = info_span!(
            "reserve_one",
            pickup = %req.pickup_city,
            return_city = %req.return_city
        );
        async move {
            let validated = self.validate(&req).await?;

            let pool = self.pool.clone();
            let work = tokio::task::spawn_blocking(move || {
                run_with_retries(&pool, MAX_SERIALIZATION_RETRIES, |conn| {
                    let search = AvailabilityRequest {
                        start_time: validated.start_time,
                        end_time: validated.end_time,
                        pickup_branch_id: validated.pickup_branch_id,
                        return_branch_id: validated.return_branch_id,
                    };

                    let Some(candidate) = first_available(conn, &search)? else {
                        return Err(TxError::Rejected(DispatchError::NoCarAvailable));
                    };

                    let reservation = create_conn(
                        conn,
                        candidate.car_id,
                        validated.start_time,
                        validated.end_time,
                        validated.pickup_branch_id,
                        validated.return_branch_id,
                    )?;

                    Ok(reservation)
                })
            });

            let result = match tokio::time::timeout(self.deadline, work).await {
                Ok(join_result) => join_result.map_err(|_| DispatchError::Conflict).and_then(|inner| inner),
                Err(_) => Err(DispatchError::Timeout),
            };

            match result {
                Ok(reservation) => {
                    info!(car_id = reservation.car_id, reservation_id = %reservation.id, "reservation committed");
                    Ok(reservation)
                }
                Err(dispatch_err) => {
                    warn!(error = %dispatch_err, "reservation rejected");
                    Err(dispatch_err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// `reserve_batch(reqs)`: atomic all-or-nothing processing of a list of
    /// requests, sorted ascending by `start_time` and applying the
    /// nearest-branch rule per request (spec.md §4.5).
    pub async fn reserve_batch(
        &self,
        reqs: Vec<ReservationRequest>,
    ) -> Result<Vec<Reservation>, DispatchError> {
        let span = info_span!("reserve_batch", count = reqs.len());
        async move {
            let mut validated = Vec::with_capacity(reqs.len());
            for req in &reqs {
                validated.push(self.validate(req).await?);
            }
            validated.sort_by_key(|v| v.start_time);

            let pool = self.pool.clone();
            let work = tokio::task::spawn_blocking(move || {
                run_with_retries(&pool, MAX_SERIALIZATION_RETRIES, |conn| {
                    let mut reservations = Vec::with_capacity(validated.len());

                    for v in &validated {
                        let search = AvailabilityRequest {
                            start_time: v.start_time,
                            end_time: v.end_time,
                            pickup_branch_id: v.pickup_branch_id,
                            return_branch_id: v.return_branch_id,
                        };

                        let candidates = all_available(conn, &search)?;
                        if candidates.is_empty() {
                            return Err(TxError::Rejected(DispatchError::NoCarAvailable));
                        }

                        let chosen = nearest_branch(conn, &candidates, v.pickup_branch_id)
                            .map_err(TxError::Rejected)?;

                        let reservation = create_conn(
                            conn,
                            chosen.car_id,
                            v.start_time,
                            v.end_time,
                            v.pickup_branch_id,
                            v.return_branch_id,
                        )?;
                        reservations.push(reservation);
                    }

                    Ok(reservations)
                })
            });

            let result = match tokio::time::timeout(self.deadline, work).await {
                Ok(join_result) => join_result.map_err(|_| DispatchError::Conflict).and_then(|inner| inner),
                Err(_) => Err(DispatchError::Timeout),
            };

            match result {
                Ok(reservations) => {
                    info!(count = reservations.len(), "batch committed");
                    Ok(reservations)
                }
                Err(dispatch_err) => {
                    warn!(error = %dispatch_err, "batch rolled back");
                    Err(dispatch_err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Cancels a reservation, removing its two matching movement-log
    /// entries in the same transaction (spec.md §6's cancellation
    /// contract).
    pub async fn cancel(&self, reservation_id: uuid::Uuid) -> Result<bool, DispatchError> {
        let pool = self.pool.clone();
        let work = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|_| DispatchError::Conflict)?;
            conn.transaction(|conn| crate::reservations_repo::cancel_conn(conn, reservation_id))
                .map_err(|_| DispatchError::Conflict)
        });

        match tokio::time::timeout(self.deadline, work).await {
            Ok(join_result) => join_result.map_err(|_| DispatchError::Conflict)?,
            Err(_) => Err(DispatchError::Timeout),
        }
    }
}

/// The error type a transaction closure passed to [`run_with_retries`]
/// returns. Diesel's `Transaction::run` commits on `Ok` and rolls back on
/// any `Err`, so a mid-batch rejection (`Rejected`) must come back as this
/// `Err` variant rather than as an `Ok`-wrapped `DispatchError` — otherwise
/// the writes already made earlier in the same closure would commit
/// alongside the reported failure.
enum TxError {
    /// The Dispatcher's own rejection (no car available, no route, ...).
    /// Never retried — it is not transient.
    Rejected(DispatchError),
    /// A genuine database error, possibly a transient serialization failure.
    Db(DieselError),
}

impl From<DieselError> for TxError {
    fn from(err: DieselError) -> Self {
        TxError::Db(err)
    }
}

/// Runs `f` in a serializable transaction, retrying on serialization
/// failure up to `retries` times. `f` returns `Result<T, TxError>`, so
/// Diesel rolls back the transaction on either variant of `Err` — a
/// rejection never leaves behind partial writes made earlier in the same
/// closure.
fn run_with_retries<T>(
    pool: &DbPool,
    retries: u32,
    mut f: impl FnMut(&mut diesel::PgConnection) -> Result<T, TxError>,
) -> Result<T, DispatchError> {
    let mut conn = pool.get().map_err(|_| DispatchError::Conflict)?;

    for attempt in 0..=retries {
        let outcome = conn
            .build_transaction()
            .serializable()
            .run(|conn| f(conn));

        match outcome {
            Ok(value) => return Ok(value),
            Err(TxError::Rejected(dispatch_err)) => return Err(dispatch_err),
            Err(TxError::Db(err)) if is_serialization_failure(&err) && attempt < retries => {
                warn!(attempt, "serialization failure, retrying");
                continue;
            }
            Err(TxError::Db(_)) => return Err(DispatchError::Conflict),
        }
    }

    Err(DispatchError::Conflict)
}

fn is_serialization_failure(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _)
    )
}
