use clap::{Parser, Subcommand};
use fleetdispatch::commands::{SeedCommand, handle_seed};
use fleetdispatch::config::Config;
use fleetdispatch::db::build_pool;
use fleetdispatch::log_format::TargetFirstFormat;
use fleetdispatch::web::start_web_server;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fleetdispatch-server", about = "Fleet reservation dispatch service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve,
    /// Out-of-core fleet administration (branches, cars, distances).
    Seed {
        #[command(subcommand)]
        command: SeedCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .event_format(TargetFirstFormat)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let pool = build_pool(&config.database_url)?;

    let cli = Cli::parse();
    match cli.command {
        Command::Serve => start_web_server(&config.bind_addr, pool, config.request_deadline).await?,
        Command::Seed { command } => handle_seed(pool, command).await?,
    }

    Ok(())
}
