use anyhow::Result;
use diesel::prelude::*;

use crate::branches::Branch;
use crate::db::DbPool;
use crate::schema::branches;

#[derive(Queryable, Selectable)]
#[diesel(table_name = branches)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct BranchRow {
    id: i64,
    city: String,
}

impl From<BranchRow> for Branch {
    fn from(row: BranchRow) -> Self {
        Branch {
            id: row.id,
            city: row.city,
        }
    }
}

#[derive(Clone)]
pub struct BranchesRepository {
    pool: DbPool,
}

impl BranchesRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Resolves a city name to a branch. The core's only entry point for
    /// translating boundary input (a city string) into a branch identity.
    pub async fn get_by_city(&self, city: String) -> Result<Option<Branch>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            branches::table
                .filter(branches::city.eq(city))
                .select(BranchRow::as_select())
                .first(&mut conn)
                .optional()
                .map(|opt| opt.map(Branch::from))
                .map_err(anyhow::Error::from)
        })
        .await?
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Branch>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            branches::table
                .filter(branches::id.eq(id))
                .select(BranchRow::as_select())
                .first(&mut conn)
                .optional()
                .map(|opt| opt.map(Branch::from))
                .map_err(anyhow::Error::from)
        })
        .await?
    }

    pub async fn create(&self, city: String) -> Result<Branch> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let row = diesel::insert_into(branches::table)
                .values(branches::city.eq(city))
                .returning(BranchRow::as_select())
                .get_result(&mut conn)?;
            Ok::<Branch, anyhow::Error>(Branch::from(row))
        })
        .await?
    }
}
