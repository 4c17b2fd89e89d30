//! One complete seed run.

use chseed_core::{
    ClickHouseClient, Config, Macros, Result, RetryPolicy, SeedError, SqlDirRunner, connect,
    list_sql_files, materialize, redact_endpoint, seed, to_interval_literal,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const BANNER: &str = "========================================";

/// Connects, materializes the schema templates and seeds them.
///
/// Returns the number of attempts the seed took. The materialized directory
/// is removed on every exit path. Errors are returned unlogged, apart from
/// the per-attempt history of an exhausted seed.
///
/// # Errors
/// Any connection, TLS, TTL, templating or seeding failure, or
/// [`SeedError::Cancelled`] when `cancel` fires first.
pub async fn run(config: &Config, cancel: &CancellationToken) -> Result<u32> {
    info!("{}", BANNER);
    info!("Running ClickHouse schema seed...");
    info!("{}", BANNER);
    info!("Target database: {}", config.database);
    info!("Endpoint: {}", redact_endpoint(&config.endpoint));
    info!("Schema directory: {}", config.schema_dir.display());

    let client = connect(config).await?;

    tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(SeedError::Cancelled),
        pinged = client.ping() => pinged?,
    }
    info!("Successfully connected to ClickHouse at {}", client.target());

    let ttl = to_interval_literal(&config.tables_ttl)?;
    let ttl = ttl.to_string();
    info!("Tables TTL: {} -> {}", config.tables_ttl, ttl);

    info!("Preparing SQL files with database: {}", config.database);
    let schema = materialize(
        &config.schema_dir,
        &Macros {
            database: &config.database,
            tables_ttl: &ttl,
        },
    )?;

    match list_sql_files(schema.path()) {
        Ok(files) => {
            for name in files {
                info!("  - {}", name);
            }
        }
        Err(e) => warn!("WARNING: Failed to list SQL files: {}", e),
    }

    let runner = SqlDirRunner::new(client);
    let policy = RetryPolicy::with_max_attempts(config.max_attempts);
    let attempts = match seed(&runner, schema.path(), policy, cancel).await {
        Ok(attempts) => attempts,
        Err(e) => {
            if let SeedError::Seed { history, .. } = &e {
                for attempt in history {
                    error!("  attempt {}: {}", attempt.attempt, attempt.error);
                }
            }
            error!("{}", BANNER);
            return Err(e);
        }
    };

    info!("{}", BANNER);
    info!("Schema seed completed successfully");
    info!("{}", BANNER);

    schema.close()?;
    Ok(attempts)
}
