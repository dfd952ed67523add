//! F3 data CLI - Main entry point.
//!
//! Applies migrations and runs smoke checks against the configured database.

use clap::{Parser, Subcommand};
use f3_data_models::db::run_migrations;
use f3_data_models::models::OrgType;
use f3_data_models::{DatabaseSettings, DbManager, RawQuery, SessionProvider};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "f3-data", about = "F3 data model and access layer", version)]
struct Cli {
    #[command(flatten)]
    database: DatabaseSettings,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "F3_LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "F3_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply the schema and seed migrations
    Migrate,
    /// Check connectivity and report the server version
    Ping,
    /// List the org types
    OrgTypes,
}

/// Initialize the tracing subscriber for logging.
fn init_tracing(log_level: &str, json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

async fn run(command: Command, provider: Arc<SessionProvider>) -> f3_data_models::DbResult<()> {
    match command {
        Command::Migrate => {
            let pool = provider.get_engine().await?;
            run_migrations(&pool).await?;
        }
        Command::Ping => {
            let manager = DbManager::new(provider.clone());
            manager
                .execute_sql_query(&RawQuery::new("SELECT 1 AS ok"))
                .await?;
            let pool = provider.get_engine().await?;
            let version = pool.server_version().await?;
            println!("{}: {}", pool.db_type(), version);
        }
        Command::OrgTypes => {
            let manager = DbManager::new(provider);
            for org_type in manager.find_records::<OrgType>(&[]).await? {
                println!("{}\t{}", org_type.id, org_type.name);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; the environment may already be set
    dotenvy::dotenv().ok();

    let Cli {
        database,
        log_level,
        json_logs,
        command,
    } = Cli::parse();

    init_tracing(&log_level, json_logs);

    info!(
        url = %database.redacted_url(),
        "Starting f3-data v{}",
        env!("CARGO_PKG_VERSION")
    );

    let provider = Arc::new(SessionProvider::new(database));
    let result = run(command, provider.clone()).await;
    provider.dispose().await;

    if let Err(e) = result {
        error!(
            error = %e,
            suggestion = e.suggestion().unwrap_or_default(),
            "Command failed"
        );
        return Err(e.into());
    }

    Ok(())
}
