use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Duration;
use diesel::prelude::*;
use diesel::QueryResult;
use moka::sync::Cache;

use crate::db::DbPool;
use crate::distance::{CAR_SPEED_KMH, Distance, transfer_time_for_distance_km};
use crate::schema::distances;

/// Read-mostly lookup over the `distances` table.
///
/// Distances change rarely and are mutated out-of-core, so the hot path is
/// cached with a short TTL rather than hitting Postgres on every lookup —
/// the caching strategy spec.md's concurrency section explicitly permits.
#[derive(Clone)]
pub struct DistanceOracle {
    pool: DbPool,
    cache: Cache<(i64, i64), i32>,
}

impl DistanceOracle {
    pub fn new(pool: DbPool) -> Self {
        let cache = Cache::builder()
            .time_to_live(StdDuration::from_secs(30))
            .max_capacity(10_000)
            .build();
        Self { pool, cache }
    }

    /// `distance_km(a, b)`: `Some(0)` if `a == b`, `Some(km)` for a known
    /// directed edge, `None` if no such edge exists ("unknown").
    pub async fn distance_km(&self, from_branch: i64, to_branch: i64) -> Result<Option<i32>> {
        if from_branch == to_branch {
            return Ok(Some(0));
        }

        if let Some(km) = self.cache.get(&(from_branch, to_branch)) {
            return Ok(Some(km));
        }

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            distances::table
                .filter(distances::from_branch.eq(from_branch))
                .filter(distances::to_branch.eq(to_branch))
                .select(distances::distance_km)
                .first::<i32>(&mut conn)
                .optional()
        })
        .await??;

        if let Some(km) = result {
            self.cache.insert((from_branch, to_branch), km);
        }

        Ok(result)
    }

    /// `transfer_time(a, b)`: zero duration if `a == b`, else
    /// `distance_km(a, b) / CAR_SPEED`, or `None` if the distance is unknown.
    pub async fn transfer_time(&self, from_branch: i64, to_branch: i64) -> Result<Option<Duration>> {
        let km = self.distance_km(from_branch, to_branch).await?;
        Ok(km.map(transfer_time_for_distance_km))
    }

    pub async fn insert(&self, distance: &Distance) -> Result<()> {
        let pool = self.pool.clone();
        let model = NewDistance {
            from_branch: distance.from_branch,
            to_branch: distance.to_branch,
            distance_km: distance.distance_km,
        };

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            diesel::insert_into(distances::table)
                .values(&model)
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        self.cache
            .insert((distance.from_branch, distance.to_branch), distance.distance_km);

        Ok(())
    }
}

#[derive(Insertable)]
#[diesel(table_name = distances)]
struct NewDistance {
    from_branch: i64,
    to_branch: i64,
    distance_km: i32,
}

/// Connection-scoped `distance_km`, for use inside the Dispatcher's
/// transaction where the Availability Engine cannot await the async,
/// cache-backed [`DistanceOracle`].
pub fn distance_km_conn(
    conn: &mut PgConnection,
    from_branch: i64,
    to_branch: i64,
) -> QueryResult<Option<i32>> {
    if from_branch == to_branch {
        return Ok(Some(0));
    }

    distances::table
        .filter(distances::from_branch.eq(from_branch))
        .filter(distances::to_branch.eq(to_branch))
        .select(distances::distance_km)
        .first::<i32>(conn)
        .optional()
}

/// Connection-scoped `transfer_time`.
pub fn transfer_time_conn(
    conn: &mut PgConnection,
    from_branch: i64,
    to_branch: i64,
) -> QueryResult<Option<Duration>> {
    Ok(distance_km_conn(conn, from_branch, to_branch)?.map(transfer_time_for_distance_km))
}

#[allow(dead_code)]
const _ASSERT_SPEED_POSITIVE: () = assert!(CAR_SPEED_KMH > 0);
