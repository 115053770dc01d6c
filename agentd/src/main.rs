use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info};

use agentd::{Agent, config};

/// Stop is bounded: if the components fail to wind down in time the
/// process aborts rather than hang with leaked handles.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "agentd", version, about = "OVS policy agent")]
struct Cli {
    /// Path of the agent configuration file
    #[arg(short, long, env = "AGENTD_CONFIG")]
    config: PathBuf,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let level = cli
        .log_level
        .as_deref()
        .or(config.log.level.as_deref())
        .unwrap_or("info");
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let agent = Agent::new(&config);
    if let Err(err) = agent.start().await {
        error!(%err, "could not start agent");
        return ExitCode::FAILURE;
    }

    wait_for_shutdown_signal().await;
    info!("shutting down");

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, agent.stop())
        .await
        .is_err()
    {
        error!("shutdown did not complete in time, aborting");
        std::process::abort();
    }
    ExitCode::SUCCESS
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            error!(%err, "could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}
