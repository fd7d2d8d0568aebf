use std::time::Duration;

/// Process configuration loaded from the environment.
///
/// Loaded with `dotenvy::dotenv()` + `std::env::var`, the same pattern the
/// rest of this service's ambient stack uses — no config-file format is
/// introduced beyond environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub request_deadline: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set in environment variables"))?;

        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:1337".to_string());

        let request_deadline_secs = std::env::var("REQUEST_DEADLINE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5);

        Ok(Self {
            database_url,
            bind_addr,
            request_deadline: Duration::from_secs(request_deadline_secs),
        })
    }
}
