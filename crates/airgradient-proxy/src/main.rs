//! AirGradient proxy - background poller, archive, and HTTP API.
//!
//! Run with: `cargo run -p airgradient-proxy -- --config proxy.toml`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use airgradient_proxy::{AppState, Config, DeviceClient, Poller, WindowAverager, api};
use airgradient_store::{ArchiveQuery, Store};

/// AirGradient proxy - polls a monitor, archives averages, serves them over HTTP.
#[derive(Parser, Debug)]
#[command(name = "airgradient-proxy")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Write the process id to this file while running.
    #[arg(long, global = true)]
    pidfile: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proxy in the foreground (default behavior).
    Run,

    /// Print every archived record as one JSON object per line.
    Dump,

    /// Fetch two snapshots from the monitor and check they are usable.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    match args.command {
        Some(Command::Dump) => dump(&config),
        Some(Command::Check) => check(&config).await,
        Some(Command::Run) | None => {
            let _pidfile = match &args.pidfile {
                Some(path) => Some(PidFile::create(path)?),
                None => None,
            };
            run_server(config).await
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    Ok(config)
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let level = if config.logging.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("airgradient_proxy={}", level).parse()?)
                .add_directive(format!("airgradient_store={}", level).parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    info!("Starting {} {}", config.service_name, env!("CARGO_PKG_VERSION"));
    info!("Device: {}:{}", config.device.host, config.device.port);
    info!(
        "Poll every {}s (offset {}s), archive every {}s",
        config.poller.poll_interval_secs,
        config.poller.poll_offset_secs,
        config.poller.archive_interval_secs
    );

    // Open the archive
    let store = Store::open(&config.storage.path)?;
    if let Some(last) = store.latest_timestamp() {
        info!("Archive ends at {}", last);
    }

    let state = AppState::new(store, &config.poller);

    // Start the background poller
    let client = DeviceClient::new(&config.device)?;
    let poller = Poller::new(client, Arc::clone(&state), &config.poller);
    let poller_task = tokio::spawn(poller.run());

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(config.server.bind.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Starting server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the current tick finish before exiting.
    state.poller.signal_stop();
    poller_task.await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

fn dump(config: &Config) -> anyhow::Result<()> {
    let store = Store::open(&config.storage.path)?;
    let records = store.query(&ArchiveQuery::all())?;

    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    info!("Dumped {} records", records.len());
    Ok(())
}

async fn check(config: &Config) -> anyhow::Result<()> {
    if let Some(e) = config.device.validate().into_iter().next() {
        anyhow::bail!("Invalid configuration: {}", e);
    }

    match check_device(config).await {
        Ok(()) => {
            println!("PASSED");
            Ok(())
        }
        Err(e) => {
            println!("FAILED: {:#}", e);
            Err(e)
        }
    }
}

async fn check_device(config: &Config) -> anyhow::Result<()> {
    let client = DeviceClient::new(&config.device)?;
    println!("Fetching {}", client.url());

    let first = client.fetch().await.context("First fetch failed")?;
    // A different second for the second snapshot.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let second = client.fetch().await.context("Second fetch failed")?;

    println!("{}", serde_json::to_string_pretty(&first)?);
    println!("{}", serde_json::to_string_pretty(&second)?);

    anyhow::ensure!(
        second.measurement_time > first.measurement_time,
        "Snapshots were not stamped in order"
    );

    let mut averager = WindowAverager::new();
    averager.add(&first);
    averager.add(&second);
    let average = averager
        .flush(second.measurement_time)
        .context("Averaging two snapshots produced no record")?;
    println!("{}", serde_json::to_string_pretty(&average)?);

    Ok(())
}

/// Removes the pid file when dropped.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn create(path: &Path) -> anyhow::Result<Self> {
        std::fs::write(path, format!("{}\n", std::process::id()))
            .with_context(|| format!("Failed to write pid file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
