use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::QueryResult;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::db::DbPool;
use crate::error::DispatchError;
use crate::schema::car_branch_log;

/// `latest_branch_before(car, t)` against an already-open connection, for
/// use inside a Dispatcher transaction alongside Reservation Store queries.
///
/// Returns the branch of the entry for `car_id` with the largest `timestamp`
/// strictly less than `t`, or `None` if the car has no known location
/// before `t` (such cars are excluded from dispatch as if they did not
/// exist).
pub fn latest_branch_before_conn(
    conn: &mut PgConnection,
    car_id: i64,
    t: DateTime<Utc>,
) -> QueryResult<Option<i64>> {
    car_branch_log::table
        .filter(car_branch_log::car_id.eq(car_id))
        .filter(car_branch_log::timestamp.lt(t))
        .order(car_branch_log::timestamp.desc())
        .select(car_branch_log::branch_id)
        .first(conn)
        .optional()
}

/// Appends a movement-log entry within an already-open connection.
/// Idempotent per the `(car, branch, timestamp)` uniqueness constraint —
/// a duplicate insert surfaces as a unique-violation, which callers map to
/// `DispatchError::Conflict`.
pub fn append_conn(
    conn: &mut PgConnection,
    car_id: i64,
    branch_id: i64,
    at: DateTime<Utc>,
) -> QueryResult<()> {
    diesel::insert_into(car_branch_log::table)
        .values((
            car_branch_log::car_id.eq(car_id),
            car_branch_log::branch_id.eq(branch_id),
            car_branch_log::timestamp.eq(at),
        ))
        .execute(conn)?;
    Ok(())
}

/// Deletes the movement-log entry matching `(car_id, branch_id, at)`. Used
/// by the cancellation cleanup contract (spec.md §6): deleting a
/// reservation must also delete its two matching log entries so that
/// location derivation stays sound.
pub fn delete_entry_conn(
    conn: &mut PgConnection,
    car_id: i64,
    branch_id: i64,
    at: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::delete(
        car_branch_log::table
            .filter(car_branch_log::car_id.eq(car_id))
            .filter(car_branch_log::branch_id.eq(branch_id))
            .filter(car_branch_log::timestamp.eq(at)),
    )
    .execute(conn)
}

pub fn is_unique_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

/// Standalone, read/write access to the Movement Log for callers outside a
/// Dispatcher transaction (the `current_branch_of` boundary wrapper, and
/// out-of-core provisioning).
#[derive(Clone)]
pub struct MovementLogRepository {
    pool: DbPool,
}

impl MovementLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn latest_branch_before(
        &self,
        car_id: i64,
        t: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            latest_branch_before_conn(&mut conn, car_id, t).map_err(anyhow::Error::from)
        })
        .await?
    }

    pub async fn append(
        &self,
        car_id: i64,
        branch_id: i64,
        at: DateTime<Utc>,
    ) -> std::result::Result<(), DispatchError> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| anyhow::anyhow!(e))?;
            append_conn(&mut conn, car_id, branch_id, at).map_err(anyhow::Error::from)
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => match e.downcast_ref::<DieselError>() {
                Some(de) if is_unique_violation(de) => Err(DispatchError::Conflict),
                _ => Err(DispatchError::Conflict),
            },
            Err(_join_err) => Err(DispatchError::Conflict),
        }
    }
}
