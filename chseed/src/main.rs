//! Idempotent ClickHouse schema seeding tool.
//!
//! Applies a directory of SQL templates to a ClickHouse server, substituting
//! the target database and table retention first. Safe to run on every
//! deployment: statements are expected to be idempotent and no version table
//! is kept.
//!
//! # Security Guarantees
//! - The password is read from the environment only, never from arguments
//! - Credentials are never logged
//! - Rendered templates live in a private temporary directory that is removed
//!   on exit

use chseed::{Cli, error_chain, run};
use chseed_core::{Config, ProcessEnv, logging::init_logging};
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::resolve(&ProcessEnv::capture(), cli.schema_dir.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling seed");
                cancel.cancel();
            }
        }
    });

    match run(&config, &cancel).await {
        Ok(attempts) => {
            info!("Seed succeeded after {} attempt(s)", attempts);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Schema seed failed: {}", error_chain(&e));
            ExitCode::FAILURE
        }
    }
}
