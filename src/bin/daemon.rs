use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use host_health::{
    actors::Supervisor,
    config::{Config, read_config_file},
    monitors::SystemProvider,
    recovery::SystemctlRemediation,
    util::{get_config_path, get_default_config_path},
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (falls back to $HOST_HEALTH_CONFIG, then ./host-health.json)
    #[arg(short, long)]
    file: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Explicit log level, overrides -v
    #[arg(long)]
    log_level: Option<LevelFilter>,

    /// Do not start the HTTP/WebSocket adapter
    #[arg(long)]
    no_api: bool,
}

fn init(args: &Args) {
    let level = args.log_level.unwrap_or(match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    });

    let filter = filter::Targets::new().with_targets(vec![
        ("host_health", level),
        ("host_health_daemon", level),
        ("status_change", level),
        ("tower_http", level.min(LevelFilter::DEBUG)),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let path = args
        .file
        .clone()
        .or_else(get_config_path)
        .unwrap_or_else(|| get_default_config_path().to_string());
    info!("loading configuration from {path}");

    let config = read_config_file(&path)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {path}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    init(&args);
    trace!("started with args: {args:?}");

    let config = load_config(&args)?;

    let provider = Arc::new(SystemProvider::new(
        config.monitoring.disk.path.clone(),
        config.monitoring.service.name.clone(),
    ));
    let supervisor = Supervisor::start(&config, provider, Arc::new(SystemctlRemediation::new()))?;

    #[cfg(feature = "api")]
    if !args.no_api {
        use host_health::api::{ApiState, spawn_api_server};

        let state = ApiState::new(supervisor.registry(), supervisor.hub());
        spawn_api_server(config.api.bind_addr, state)
            .await
            .context("failed to start the API server")?;
    }

    info!("{} is running, press Ctrl-C to stop", config.app_name);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutting down");
    supervisor.shutdown().await;

    Ok(())
}
