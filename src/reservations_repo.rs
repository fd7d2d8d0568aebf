use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::QueryResult;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::movement_log_repo::{append_conn, delete_entry_conn};
use crate::reservations::Reservation;
use crate::schema::reservations;

#[derive(Queryable, Selectable)]
#[diesel(table_name = reservations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ReservationRow {
    id: Uuid,
    car_id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    pickup_branch_id: i64,
    return_branch_id: i64,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Reservation {
            id: row.id,
            car_id: row.car_id,
            start_time: row.start_time,
            end_time: row.end_time,
            pickup_branch_id: row.pickup_branch_id,
            return_branch_id: row.return_branch_id,
        }
    }
}

/// `overlapping(start, end)`: all reservations `r` with
/// `r.start_time <= end AND r.end_time >= start`.
pub fn overlapping_conn(
    conn: &mut PgConnection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> QueryResult<Vec<Reservation>> {
    reservations::table
        .filter(reservations::start_time.le(end))
        .filter(reservations::end_time.ge(start))
        .select(ReservationRow::as_select())
        .load(conn)
        .map(|rows| rows.into_iter().map(Reservation::from).collect())
}

/// `next_after(t, car)`: the reservation for `car` with smallest
/// `start_time > t`, or `None`.
pub fn next_after_conn(
    conn: &mut PgConnection,
    car_id: i64,
    t: DateTime<Utc>,
) -> QueryResult<Option<Reservation>> {
    reservations::table
        .filter(reservations::car_id.eq(car_id))
        .filter(reservations::start_time.gt(t))
        .order(reservations::start_time.asc())
        .select(ReservationRow::as_select())
        .first(conn)
        .optional()
        .map(|opt| opt.map(Reservation::from))
}

/// `previous_before(t, car)`: the reservation for `car` with largest
/// `end_time < t`, or `None`.
pub fn previous_before_conn(
    conn: &mut PgConnection,
    car_id: i64,
    t: DateTime<Utc>,
) -> QueryResult<Option<Reservation>> {
    reservations::table
        .filter(reservations::car_id.eq(car_id))
        .filter(reservations::end_time.lt(t))
        .order(reservations::end_time.desc())
        .select(ReservationRow::as_select())
        .first(conn)
        .optional()
        .map(|opt| opt.map(Reservation::from))
}

/// `active_at(t, car)`: reservations for `car` with `start_time <= t <= end_time`.
pub fn active_at_conn(
    conn: &mut PgConnection,
    car_id: i64,
    t: DateTime<Utc>,
) -> QueryResult<Vec<Reservation>> {
    reservations::table
        .filter(reservations::car_id.eq(car_id))
        .filter(reservations::start_time.le(t))
        .filter(reservations::end_time.ge(t))
        .select(ReservationRow::as_select())
        .load(conn)
        .map(|rows| rows.into_iter().map(Reservation::from).collect())
}

/// Inserts a reservation and, in the same connection (so the same
/// transaction the Dispatcher opened), appends the two Movement Log
/// entries spec.md §3 requires: one at `start_time` with `pickup_branch`,
/// one at `end_time` with `return_branch`.
#[allow(clippy::too_many_arguments)]
pub fn create_conn(
    conn: &mut PgConnection,
    car_id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    pickup_branch_id: i64,
    return_branch_id: i64,
) -> QueryResult<Reservation> {
    let row: ReservationRow = diesel::insert_into(reservations::table)
        .values((
            reservations::car_id.eq(car_id),
            reservations::start_time.eq(start_time),
            reservations::end_time.eq(end_time),
            reservations::pickup_branch_id.eq(pickup_branch_id),
            reservations::return_branch_id.eq(return_branch_id),
        ))
        .returning(ReservationRow::as_select())
        .get_result(conn)?;

    append_conn(conn, car_id, pickup_branch_id, start_time)?;
    append_conn(conn, car_id, return_branch_id, end_time)?;

    Ok(Reservation::from(row))
}

/// Deletes a reservation and its two matching movement-log entries in one
/// connection — the cancellation cleanup contract of spec.md §6.
pub fn cancel_conn(conn: &mut PgConnection, reservation_id: Uuid) -> QueryResult<bool> {
    let row: Option<ReservationRow> = reservations::table
        .filter(reservations::id.eq(reservation_id))
        .select(ReservationRow::as_select())
        .first(conn)
        .optional()?;

    let Some(row) = row else {
        return Ok(false);
    };

    delete_entry_conn(conn, row.car_id, row.pickup_branch_id, row.start_time)?;
    delete_entry_conn(conn, row.car_id, row.return_branch_id, row.end_time)?;

    diesel::delete(reservations::table.filter(reservations::id.eq(reservation_id))).execute(conn)?;

    Ok(true)
}

/// Persistent, connection-pooled façade over the Reservation Store for
/// read-side callers outside a Dispatcher transaction.
#[derive(Clone)]
pub struct ReservationsRepository {
    pool: DbPool,
}

impl ReservationsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// `upcoming()`: all reservations with `start_time > now`, ascending by
    /// `start_time`.
    pub async fn upcoming(&self) -> Result<Vec<Reservation>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let now = Utc::now();
            reservations::table
                .filter(reservations::start_time.gt(now))
                .order(reservations::start_time.asc())
                .select(ReservationRow::as_select())
                .load(&mut conn)
                .map(|rows| rows.into_iter().map(Reservation::from).collect())
                .map_err(anyhow::Error::from)
        })
        .await?
    }

    /// `active_at(t, car)`: reservations for `car` active at `t`.
    pub async fn active_at(&self, car_id: i64, t: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            active_at_conn(&mut conn, car_id, t).map_err(anyhow::Error::from)
        })
        .await?
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Reservation>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            reservations::table
                .filter(reservations::id.eq(id))
                .select(ReservationRow::as_select())
                .first(&mut conn)
                .optional()
                .map(|opt| opt.map(Reservation::from))
                .map_err(anyhow::Error::from)
        })
        .await?
    }

    /// Cancels a reservation, cleaning up its movement-log entries in the
    /// same transaction.
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                cancel_conn(conn, id).map_err(anyhow::Error::from)
            })
        })
        .await?
    }
}
