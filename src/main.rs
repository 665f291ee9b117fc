use anyhow::{Context, Result};
use async_channel::Receiver;
use clap::Parser;
use roomctl_core::{AppConfig, LogFormat, LoggingConfig};
use roomctl_discovery::{
    DiscoveryCoordinator, MdnsTransport, PanelCommand, PresentationDispatcher,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// roomctl - discovers room device controllers and keeps one active per room
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long, env = "ROOMCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Seconds between status reports (0 disables them)
    #[arg(long, default_value_t = 60)]
    status_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_config_builder(path)
            .with_context(|| format!("Failed to load config file: {:?}", path))?,
        None => AppConfig::default(),
    };

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = LogFormat::Json;
    }

    config.validate().context("Invalid configuration")?;
    init_tracing(&config.logging)?;

    info!(categories = config.categories.len(), "Starting roomctl");
    for category in &config.categories {
        info!(
            service_type = category.service_type(),
            display_name = category.display_name(),
            "Watching category"
        );
    }

    let (presentation, panels) = PresentationDispatcher::new();
    let coordinator = Arc::new(
        DiscoveryCoordinator::from_config(
            &config,
            Arc::new(presentation),
            MdnsTransport::connector(),
        )
        .context("Failed to create discovery coordinator")?,
    );

    coordinator
        .start()
        .context("Failed to start discovery; no usable network interface?")?;

    let host = tokio::spawn(run_panel_host(panels));
    let status = (args.status_interval > 0).then(|| {
        tokio::spawn(report_status(
            Arc::clone(&coordinator),
            Duration::from_secs(args.status_interval),
        ))
    });

    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    info!("Shutting down");
    coordinator.stop();
    if let Some(status) = status {
        status.abort();
    }
    host.abort();

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    logging.parse_level()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(logging.file_line)
        .with_line_number(logging.file_line);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(())
}

/// Stands in for a UI thread: owns the panel set and applies queued commands
async fn run_panel_host(panels: Receiver<PanelCommand>) {
    let mut attached: HashMap<Uuid, String> = HashMap::new();

    while let Ok(command) = panels.recv().await {
        match command {
            PanelCommand::Attach {
                display_name,
                control,
            } => {
                info!(
                    panel = %display_name,
                    target = ?control.target(),
                    "Panel attached"
                );
                attached.insert(control.id(), display_name);
            }
            PanelCommand::Detach { control } => match attached.remove(&control.id()) {
                Some(display_name) => info!(panel = %display_name, "Panel detached"),
                None => warn!(id = %control.id(), "Detach for unknown panel"),
            },
            PanelCommand::RegisterChoice {
                display_name,
                instance_name,
            } => {
                info!(panel = %display_name, choice = %instance_name, "Choice registered");
            }
            PanelCommand::UnregisterChoice {
                display_name,
                instance_name,
            } => {
                info!(panel = %display_name, choice = %instance_name, "Choice withdrawn");
            }
        }
    }

    debug!("Panel host stopped");
}

async fn report_status(coordinator: Arc<DiscoveryCoordinator>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        for snapshot in coordinator.snapshots() {
            match serde_json::to_string(&snapshot) {
                Ok(json) => debug!(status = %json, "Category status"),
                Err(e) => warn!(error = %e, "Failed to serialize category status"),
            }
            info!(
                category = %snapshot.display_name,
                active = snapshot.initialized,
                current = ?snapshot.current,
                instances = snapshot.instances.len(),
                "Category status"
            );
        }
    }
}
