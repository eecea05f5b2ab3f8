//! # ag-daemon
//!
//! AgentGuard control-plane daemon.
//!
//! Loads configuration (TOML file + AGENTGUARD_* environment overrides),
//! validates it, and serves the HTTP API. Exits non-zero when the
//! configuration cannot be honored, before any listener opens.
//!
//! ## Usage
//!
//! ```text
//! agentguard --config /etc/agentguard.toml
//! AGENTGUARD_PORT=9000 agentguard
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ag_gateway::{AppContext, Config, SystemClock};
use ag_store::{GuardStore, MemoryStore};

/// How often the revocation sweeper runs, and how long expired
/// tombstones linger past natural expiry before deletion.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const SWEEP_GRACE_SECONDS: i64 = 60;

/// AgentGuard control plane.
#[derive(Parser)]
#[command(name = "agentguard", about = "Identity and authorization control plane for autonomous agents")]
struct Cli {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides config).
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("agentguard: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Err(e) = config.validate() {
        eprintln!("agentguard: {}", e);
        return ExitCode::FAILURE;
    }

    init_tracing(&config);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let store: Arc<dyn GuardStore> = Arc::new(MemoryStore::new());
        let ctx = Arc::new(AppContext::new(config, store, Arc::new(SystemClock))?);

        spawn_revocation_sweeper(Arc::clone(&ctx));

        tracing::info!("starting agentguard");
        ag_gateway::serve(ctx).await?;
        tracing::info!("agentguard shut down");
        Ok(())
    })
}

/// Periodically delete revocation tombstones whose natural expiry (plus
/// grace) has passed. Rows that have not expired are never touched.
fn spawn_revocation_sweeper(ctx: Arc<AppContext>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let cutoff = ctx.clock.now() - chrono::Duration::seconds(SWEEP_GRACE_SECONDS);
            match ctx.store.sweep_revocations(cutoff).await {
                Ok(swept) if swept > 0 => {
                    tracing::info!(swept, "swept expired revocations");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "revocation sweep failed");
                }
            }
        }
    });
}

fn init_tracing(config: &Config) {
    // Logs go to stderr; stdout stays clean for tooling.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
