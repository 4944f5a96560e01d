//! Bring up the database, cache and search connections, then hold them until
//! SIGINT or SIGTERM.
use std::process::ExitCode;

use lifecycle::{ShutdownOutcome, ShutdownSignal};
use tracing::{error, info};

use ironarchive_server::config::Config;
use ironarchive_server::error::ServerError;
use ironarchive_server::orchestrator::Orchestrator;
use ironarchive_server::{connectors, logging};

async fn run() -> Result<ShutdownOutcome, ServerError> {
    let config = Config::load()?;
    logging::init(&config.log_level(), config.log_format())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port(),
        email_storage_path = %config.email_storage_path().display(),
        "IronArchive server starting..."
    );

    // Trap signals before connecting, so an early SIGTERM is not lost
    let signals = ShutdownSignal::install()?;

    let orchestrator = Orchestrator::new(
        connectors::from_config(&config),
        config.shutdown_timeout(),
    );
    let outcome = orchestrator
        .run(&config.bind(), async move { signals.recv().await.to_string() })
        .await?;

    Ok(outcome)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        // A shutdown that overran its deadline still completed
        Ok(_) => ExitCode::SUCCESS,
        Err(e @ (ServerError::Config(_) | ServerError::Logging(_))) => {
            // No subscriber to report through yet
            eprintln!("{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "IronArchive server failed to start");
            ExitCode::FAILURE
        }
    }
}
