//! AlertMate - emergency alert core, command-line host
//!
//! # Usage
//!
//! ```bash
//! # Watch accelerometer samples (JSON lines) and dispatch on a shake trigger
//! sensor-feed | alertmate monitor --lat 12.97 --lon 77.59
//!
//! # One-shot alert through the fallback chain
//! alertmate send --lat 12.97 --lon 77.59
//!
//! # Is the rescue gateway reachable?
//! alertmate probe-gateway
//!
//! # Print alerts arriving from the backend and the radio mesh
//! alertmate listen
//! ```
//!
//! # Environment Variables
//!
//! - `ALERTMATE_CONFIG`: Path to the TOML config (default: ./alertmate.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use alertmate::config::{self, AlertConfig, CONFIG_ENV_VAR};
use alertmate::dispatch::{
    AlertDispatcher, AlertMonitor, JsonLinesSource, MonitorEvent, ReplaySource, StaticLocation,
};
use alertmate::inbound::InboundAlertRouter;
use alertmate::transport::mesh::{host_radio, MeshRadio};
use alertmate::transport::{
    AlertTransport, CloudChannel, CloudTransport, GatewayClient, GatewayTransport, MeshTransport,
    RadioMeshClient,
};
use alertmate::types::{AccelerationSample, GeoPoint, TriggerContext};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "alertmate")]
#[command(about = "Multi-transport emergency alert core")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config (overrides the normal search order)
    #[arg(short, long, env = CONFIG_ENV_VAR, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed accelerometer samples to the shake detector and dispatch on trigger
    Monitor {
        #[command(flatten)]
        position: PositionArgs,

        /// Replay samples from a JSON-lines file instead of stdin
        #[arg(long, value_name = "FILE")]
        replay: Option<PathBuf>,

        /// Delay between replayed samples in milliseconds (0 = no delay)
        #[arg(long, default_value = "0")]
        delay_ms: u64,
    },
    /// Send one alert immediately through the fallback chain
    Send {
        #[command(flatten)]
        position: PositionArgs,
    },
    /// Check whether the rescue gateway is online
    ProbeGateway,
    /// Print alerts arriving over the cloud channel and the radio mesh
    Listen,
    /// Load, validate and print the effective configuration
    CheckConfig,
}

#[derive(clap::Args, Debug)]
struct PositionArgs {
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Horizontal accuracy in metres
    #[arg(long)]
    accuracy: Option<f64>,
}

impl PositionArgs {
    fn point(&self) -> Result<GeoPoint> {
        let mut point = GeoPoint::new(self.lat, self.lon);
        if let Some(accuracy) = self.accuracy {
            point = point.with_accuracy(accuracy);
        }
        anyhow::ensure!(
            point.is_valid(),
            "Position {}, {} is outside valid WGS84 ranges",
            self.lat,
            self.lon
        );
        Ok(point)
    }
}

// ============================================================================
// Transport Wiring
// ============================================================================

struct Transports {
    mesh: Arc<RadioMeshClient<Box<dyn MeshRadio>>>,
    cloud: Arc<CloudChannel>,
    dispatcher: AlertDispatcher,
}

/// Build mesh → gateway → cloud and start the cloud channel.
async fn build_transports(config: &AlertConfig) -> Result<Transports> {
    let mesh = Arc::new(RadioMeshClient::new(host_radio().await));
    let gateway = GatewayClient::new(&config.gateway).context("Failed to build gateway client")?;
    let cloud = Arc::new(CloudChannel::spawn(&config.cloud));

    if !config.subject.id.is_empty() {
        cloud.register(&config.subject.id).await?;
    }

    let chain: Vec<Box<dyn AlertTransport>> = vec![
        Box::new(MeshTransport::new(Arc::clone(&mesh), &config.mesh)),
        Box::new(GatewayTransport::new(gateway, &config.gateway)),
        Box::new(CloudTransport::new(Arc::clone(&cloud), &config.cloud)),
    ];
    let dispatcher = AlertDispatcher::new(chain, &config.dispatch);
    info!(
        worst_case_ms = dispatcher.worst_case().as_millis() as u64,
        "Transport chain ready: {:?}",
        dispatcher.transports()
    );

    Ok(Transports {
        mesh,
        cloud,
        dispatcher,
    })
}

async fn shutdown_transports(mesh: &RadioMeshClient<Box<dyn MeshRadio>>, cloud: &CloudChannel) {
    mesh.disconnect().await;
    cloud.shutdown().await;
}

// ============================================================================
// Commands
// ============================================================================

async fn run_monitor(
    config: &AlertConfig,
    position: &PositionArgs,
    replay: Option<PathBuf>,
    delay_ms: u64,
    cancel: CancellationToken,
) -> Result<()> {
    let location = StaticLocation(position.point()?);
    let Transports {
        mesh,
        cloud,
        dispatcher,
    } = build_transports(config).await?;

    let (events_tx, mut events_rx) = mpsc::channel(config::defaults::MONITOR_EVENT_QUEUE);
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            report_monitor_event(&event);
        }
    });

    let monitor = AlertMonitor::new(
        &config.trigger,
        config.subject.clone(),
        dispatcher,
        location,
        events_tx,
    );

    let stats = match replay {
        Some(path) => {
            let samples = load_samples(&path)?;
            info!("📊 {} samples queued for replay", samples.len());
            let mut source = ReplaySource::new(samples, delay_ms);
            monitor.run(&mut source, cancel).await
        }
        None => {
            info!("📥 Input: stdin (JSON accelerometer samples)");
            let mut source = JsonLinesSource::stdin();
            monitor.run(&mut source, cancel).await
        }
    };

    printer.await.ok();
    info!(
        "Processed {} samples, {} triggers, {} dispatches, {} dropped",
        stats.samples, stats.triggers, stats.dispatches, stats.dropped
    );
    shutdown_transports(&mesh, &cloud).await;
    Ok(())
}

fn report_monitor_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::TriggerFired(t) => info!("📳 Trigger fired ({} pulses)", t.pulses),
        MonitorEvent::TriggerDropped(_) => warn!("Trigger ignored: alert already in progress"),
        MonitorEvent::LocationUnavailable(_) => error!("No location available; alert not sent"),
        MonitorEvent::Progress(p) => info!("{p:?}"),
        MonitorEvent::Dispatched(result) => {
            if result.delivered() {
                info!("✅ {}", result.summary());
            } else {
                error!("❌ {}", result.summary());
            }
        }
        MonitorEvent::DispatchCancelled { attempts } => {
            warn!("Alert cancelled after {} attempt(s)", attempts.len())
        }
    }
}

fn load_samples(path: &std::path::Path) -> Result<Vec<AccelerationSample>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read samples from {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}: bad sample on line {}", path.display(), i + 1))
        })
        .collect()
}

async fn run_send(config: &AlertConfig, position: &PositionArgs, cancel: CancellationToken) -> Result<()> {
    let point = position.point()?;
    let Transports {
        mesh,
        cloud,
        dispatcher,
    } = build_transports(config).await?;

    let ctx = TriggerContext::new(config.subject.clone(), point);
    let outcome = dispatcher.dispatch(&ctx, &cancel).await;
    shutdown_transports(&mesh, &cloud).await;

    match outcome {
        Ok(result) => {
            for attempt in &result.attempts {
                info!(
                    "  {:<8} {:>6}ms  {:?}",
                    attempt.transport.to_string(),
                    attempt.elapsed_ms,
                    attempt.outcome
                );
            }
            anyhow::ensure!(result.delivered(), "{}", result.summary());
            info!("✅ {}", result.summary());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_probe_gateway(config: &AlertConfig) -> Result<()> {
    let client = GatewayClient::new(&config.gateway)?;
    info!("Probing rescue gateway at {}", client.base_url());

    if client.check_online().await {
        info!("✅ Gateway online");
        info!("{}", client.connection_report().await);
        Ok(())
    } else {
        anyhow::bail!(
            "Gateway not reachable. Connect to \"{}\" WiFi first.",
            client.network_name()
        )
    }
}

async fn run_listen(config: &AlertConfig, cancel: CancellationToken) -> Result<()> {
    let mesh = RadioMeshClient::new(host_radio().await);
    let cloud = CloudChannel::spawn(&config.cloud);
    if !config.subject.id.is_empty() {
        cloud.register(&config.subject.id).await?;
    }

    let (alerts_tx, mut alerts_rx) = mpsc::channel(config::defaults::CLOUD_INBOUND_BUFFER);
    let router = tokio::spawn(InboundAlertRouter::new().run(
        cloud.subscribe(),
        alerts_tx,
        cancel.clone(),
    ));

    // Mesh is optional here: listen on it only if the peripheral is around
    let mut mesh_messages = match mesh
        .discover(config.mesh.role, config.mesh.discover_timeout())
        .await
    {
        Ok(peer) => match mesh.connect(&peer).await {
            Ok(_) => mesh.take_messages(),
            Err(e) => {
                warn!("Mesh connect failed: {}", e);
                None
            }
        },
        Err(e) => {
            info!("Mesh not available: {}", e);
            None
        }
    };
    let mut mesh_router = InboundAlertRouter::new();

    info!("👂 Listening for alerts (Ctrl+C to stop)");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            routed = alerts_rx.recv() => match routed {
                Some(routed) => info!("{} | {}", routed.notification.title, routed.notification.body),
                None => break,
            },
            text = async {
                match mesh_messages.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => match text {
                Some(text) => match mesh_router.route_mesh_text(&text) {
                    Some(routed) => info!("[mesh] {} | {}", routed.notification.title, routed.notification.body),
                    None => info!("[mesh] {}", text),
                },
                None => mesh_messages = None,
            },
        }
    }

    let stats = router.await.unwrap_or_default();
    info!(
        "Router: {} received, {} routed, {} ignored",
        stats.received, stats.routed, stats.ignored
    );
    mesh.disconnect().await;
    cloud.shutdown().await;
    Ok(())
}

fn run_check_config(config: &AlertConfig) -> Result<()> {
    config.validate()?;
    println!("{}", config.to_toml()?);
    info!(
        "Configuration valid; worst-case dispatch {}s",
        config.worst_case_dispatch().as_secs()
    );
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let alert_config = match &args.config {
        Some(path) => AlertConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AlertConfig::load(),
    };
    config::init(alert_config);
    let config = config::get();

    if config.subject.id.is_empty() && !matches!(args.command, Command::CheckConfig) {
        warn!("subject.id is empty; alerts will not identify the sender");
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, shutting down...");
        shutdown_token.cancel();
    });

    match args.command {
        Command::Monitor {
            position,
            replay,
            delay_ms,
        } => run_monitor(config, &position, replay, delay_ms, cancel_token).await,
        Command::Send { position } => run_send(config, &position, cancel_token).await,
        Command::ProbeGateway => run_probe_gateway(config).await,
        Command::Listen => run_listen(config, cancel_token).await,
        Command::CheckConfig => run_check_config(config),
    }
}
