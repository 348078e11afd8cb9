//! linkstated - network link state cache daemon.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use linkstate::config::BusKind;
use linkstate::service::dbus::DbusService;
use linkstate::{ChangeNotifier, CloseHandle, Config, QueryService, Store};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "linkstated",
    version,
    about = "Network link state daemon: caches links, addresses and routes and serves them over D-Bus"
)]
struct Cli {
    /// Config file (YAML, or JSON with a .json extension).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve on the session bus instead of the system bus.
    #[arg(long)]
    session: bool,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Validate the configuration, print it and exit.
    #[arg(long)]
    check: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.session {
        config.bus = BusKind::Session;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(cli.log_level.into())
                .from_env_lossy(),
        )
        .init();

    let config = load_config(&cli)?;
    if cli.check {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let store = Store::new();
    let reader = store.reader();
    let close = CloseHandle::new();

    let mut service = DbusService::start(config.bus, &config.bus_name, QueryService::new(reader.clone()))
        .await
        .with_context(|| format!("cannot serve {} on the {:?} bus", config.bus_name, config.bus))?;
    let notifier = ChangeNotifier::new(reader, config.notify.coalesce_window());

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let shutdown = close.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("SIGINT received"),
            _ = terminate.recv() => info!("SIGTERM received"),
        }
        shutdown.close();
    });

    info!(groups = ?config.groups, "starting");
    tokio::select! {
        result = linkstate::sync::run(&config, store, close) => {
            result.context("netlink event source failed")?;
        }
        result = service.forward(notifier) => {
            result.context("D-Bus service stopped")?;
        }
    }

    info!("stopped");
    Ok(())
}
