//! Isolated test database helper.
//!
//! Each `TestDatabase` creates a unique Postgres database, runs migrations,
//! and drops the database again when it goes out of scope, so integration
//! tests can run concurrently without interfering with each other's
//! reservations.

use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

type PgPool = Pool<ConnectionManager<PgConnection>>;

pub struct TestDatabase {
    db_name: String,
    pool: PgPool,
    admin_url: String,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/fleetdispatch_test".to_string());

        let (admin_url, db_name) = Self::generate_database_info(&base_url)?;

        Self::create_database(&admin_url, &db_name)
            .await
            .context("failed to create test database")?;

        let test_db_url = Self::build_database_url(&base_url, &db_name);

        Self::run_migrations(&test_db_url)
            .await
            .context("failed to run migrations")?;

        let manager = ConnectionManager::<PgConnection>::new(&test_db_url);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .with_context(|| format!("failed to create connection pool for {db_name}"))?;

        Ok(TestDatabase {
            db_name,
            pool,
            admin_url,
        })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    #[allow(dead_code)]
    pub fn name(&self) -> &str {
        &self.db_name
    }

    fn generate_database_info(base_url: &str) -> Result<(String, String)> {
        use rand::Rng;
        let random_bytes: u64 = rand::rng().next_u64();
        let suffix = format!("{random_bytes:016x}");

        let db_name = format!("fleetdispatch_test_{suffix}");

        let admin_url = base_url
            .replace("/fleetdispatch_test", "/postgres")
            .replace("/fleetdispatch_test_template", "/postgres");

        Ok((admin_url, db_name))
    }

    fn build_database_url(base_url: &str, db_name: &str) -> String {
        base_url
            .replace("/fleetdispatch_test", &format!("/{db_name}"))
            .replace("/fleetdispatch_test_template", &format!("/{db_name}"))
    }

    async fn create_database(admin_url: &str, db_name: &str) -> Result<()> {
        use diesel::Connection;

        let admin_url = admin_url.to_string();
        let db_name = db_name.to_string();

        tokio::task::spawn_blocking(move || {
            let mut conn = PgConnection::establish(&admin_url)
                .context("failed to connect to PostgreSQL for database creation")?;

            let create_sql = format!("CREATE DATABASE \"{db_name}\"");
            diesel::sql_query(&create_sql)
                .execute(&mut conn)
                .with_context(|| format!("failed to create database '{db_name}'"))?;

            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("database creation task panicked")?
    }

    async fn run_migrations(db_url: &str) -> Result<()> {
        use diesel::Connection;

        let db_url = db_url.to_string();

        tokio::task::spawn_blocking(move || {
            let mut conn = PgConnection::establish(&db_url)
                .context("failed to connect to test database for migrations")?;
            conn.run_pending_migrations(MIGRATIONS)
                .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("migration task panicked")?
    }

    fn cleanup(&self) {
        use diesel::Connection;
        use std::panic::AssertUnwindSafe;

        let db_name = self.db_name.clone();
        let admin_url = self.admin_url.clone();

        let result = std::panic::catch_unwind(AssertUnwindSafe(move || {
            let mut conn = PgConnection::establish(&admin_url).ok()?;
            let drop_sql = format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)");
            diesel::sql_query(&drop_sql).execute(&mut conn).ok()
        }));

        if result.is_err() {
            eprintln!(
                "Warning: failed to drop test database '{}'. You may need to manually clean up: DROP DATABASE {};",
                self.db_name, self.db_name
            );
        }
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        self.cleanup();
    }
}
