use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::cars::{Car, NewCar};
use crate::db::DbPool;
use crate::schema::cars;

#[derive(Queryable, Selectable)]
#[diesel(table_name = cars)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct CarRow {
    id: i64,
    car_number: String,
    make: String,
    model: String,
    provisioned_at: DateTime<Utc>,
}

impl From<CarRow> for Car {
    fn from(row: CarRow) -> Self {
        Car {
            id: row.id,
            car_number: row.car_number,
            make: row.make,
            model: row.model,
            provisioned_at: row.provisioned_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = cars)]
struct NewCarRow {
    car_number: String,
    make: String,
    model: String,
    provisioned_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CarsRepository {
    pool: DbPool,
}

impl CarsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Car>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            cars::table
                .filter(cars::id.eq(id))
                .select(CarRow::as_select())
                .first(&mut conn)
                .optional()
                .map(|opt| opt.map(Car::from))
                .map_err(anyhow::Error::from)
        })
        .await?
    }

    pub async fn get_by_car_number(&self, car_number: String) -> Result<Option<Car>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            cars::table
                .filter(cars::car_number.eq(car_number))
                .select(CarRow::as_select())
                .first(&mut conn)
                .optional()
                .map(|opt| opt.map(Car::from))
                .map_err(anyhow::Error::from)
        })
        .await?
    }

    pub async fn list(&self) -> Result<Vec<Car>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            cars::table
                .select(CarRow::as_select())
                .load(&mut conn)
                .map(|rows| rows.into_iter().map(Car::from).collect())
                .map_err(anyhow::Error::from)
        })
        .await?
    }

    /// Provisions a new car and writes its first movement-log entry at
    /// `home_branch_id`. This is the out-of-core "car creation" step spec.md
    /// §3 describes — exposed here as seed tooling (see [`crate::commands`]),
    /// not as a general admin API.
    pub async fn provision(
        &self,
        new_car: NewCar,
        home_branch_id: i64,
        provisioned_at: DateTime<Utc>,
    ) -> Result<Car> {
        use crate::schema::car_branch_log;

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            conn.transaction::<_, anyhow::Error, _>(|conn| {
                let row = diesel::insert_into(cars::table)
                    .values(NewCarRow {
                        car_number: new_car.car_number,
                        make: new_car.make,
                        model: new_car.model,
                        provisioned_at,
                    })
                    .returning(CarRow::as_select())
                    .get_result(conn)?;

                diesel::insert_into(car_branch_log::table)
                    .values((
                        car_branch_log::car_id.eq(row.id),
                        car_branch_log::branch_id.eq(home_branch_id),
                        car_branch_log::timestamp.eq(provisioned_at),
                    ))
                    .execute(conn)?;

                Ok(Car::from(row))
            })
        })
        .await?
    }
}
