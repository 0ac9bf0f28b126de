//! Subcommand implementations

use aircoord_attack::{Orchestrator, ProcessLauncher, StoreHopperControl};
use aircoord_capture::{
    Analyzer, AnalyzerConfig, AnalyzerVariant, ChannelHopper, HopperHandle, JsonLinesSource,
};
use aircoord_core::{
    AttackMode, Channel, Config, Error, IwRadio, MacAddr, RadioInterface, Result, Target,
};
use aircoord_store::{keys, MemoryStore, RemoteStore, StateClient, StateStore, StoreServer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::args::{Cli, Commands};

/// Load the configuration and run the selected subcommand
pub async fn run_command(cli: Cli) -> Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    match cli.command {
        Commands::StoreServer { listen } => store_server(&config, listen).await,
        Commands::Orchestrate { no_hopper } => orchestrate(&config, no_hopper).await,
        Commands::Hop { channels, dwell_ms } => {
            if !channels.is_empty() {
                config.hopper.channels = channels;
            }
            if let Some(dwell_ms) = dwell_ms {
                config.hopper.dwell_ms = dwell_ms;
            }
            config.validate()?;
            hop(&config).await
        }
        Commands::Analyze {
            flood,
            channel,
            frames,
            once,
        } => analyze(&config, flood, channel, frames, once).await,
        Commands::SetMode {
            mode,
            channel,
            bssid,
        } => set_mode(&config, mode, channel, bssid).await,
        Commands::Status { json } => status(&config, json).await,
    }
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn connect(config: &Config) -> StateClient {
    let store = RemoteStore::new(config.store.address.as_str())
        .with_connect_timeout(config.store.connect_timeout());
    StateClient::new(Arc::new(store))
}

fn spawn_hopper(config: &Config, state: StateClient) -> Result<(HopperHandle, JoinHandle<()>)> {
    let interface = RadioInterface::new(config.primary_interface(), Box::new(IwRadio::new()));
    let mut hopper = ChannelHopper::new(
        interface,
        config.hopper.channels.clone(),
        config.hopper.dwell(),
    )?
    .with_state(state);
    let handle = hopper.handle();
    let task = tokio::spawn(async move { hopper.run().await });
    Ok((handle, task))
}

async fn store_server(config: &Config, listen: Option<String>) -> Result<()> {
    let addr = listen.unwrap_or_else(|| config.store.address.clone());
    let server = StoreServer::new(MemoryStore::new());

    tokio::select! {
        result = server.run(&addr) => result,
        _ = shutdown_signal() => {
            info!(keys = server.store().len(), "Store server shutting down");
            Ok(())
        }
    }
}

async fn orchestrate(config: &Config, no_hopper: bool) -> Result<()> {
    for kind in config.missing_worker_commands() {
        warn!(kind = %kind, "No command configured, this worker will never start");
    }

    let state = connect(config);
    let launcher = Arc::new(ProcessLauncher::from_config(config));
    let control = Box::new(StoreHopperControl::new(state.clone()));
    let mut orchestrator = Orchestrator::new(config, state.clone(), launcher, control);

    let hopper = if no_hopper {
        None
    } else {
        Some(spawn_hopper(config, state)?)
    };

    let shutdown = orchestrator.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        shutdown.shutdown();
    });

    orchestrator.run().await;

    if let Some((handle, task)) = hopper {
        handle.stop();
        if let Err(e) = task.await {
            warn!(error = %e, "Hopper task failed");
        }
    }
    Ok(())
}

async fn hop(config: &Config) -> Result<()> {
    let (handle, task) = spawn_hopper(config, connect(config))?;
    shutdown_signal().await;
    handle.stop();
    task.await
        .map_err(|e| Error::Interrupted(format!("hopper task failed: {}", e)))
}

async fn analyze(
    config: &Config,
    flood: bool,
    channel: Option<Channel>,
    frames: Option<PathBuf>,
    once: bool,
) -> Result<()> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match frames {
        Some(path) if path != Path::new("-") => {
            let file = tokio::fs::File::open(&path).await.map_err(|e| {
                Error::FrameSource(format!("cannot open {}: {}", path.display(), e))
            })?;
            Box::new(BufReader::new(file))
        }
        _ => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let variant = if flood {
        AnalyzerVariant::FloodSniffer
    } else {
        AnalyzerVariant::Normal
    };
    let analyzer_config = AnalyzerConfig {
        interfaces: config.interfaces.clone(),
        default_liveness_ttl: config.liveness.default_ttl(),
        record_ttl: config.liveness.record_ttl(),
        channel_filter: channel,
        ..Default::default()
    };

    let mut analyzer = Analyzer::new(
        variant,
        analyzer_config,
        connect(config),
        JsonLinesSource::new(reader),
    );
    let handle = analyzer.handle();
    let (stop_tx, mut stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        handle.stop();
        let _ = stop_tx.send(true);
    });

    analyzer.run().await;

    // Supervised analyzers must not exit on their own
    if !once && !*stop_rx.borrow() {
        info!("Frame source ended, waiting for shutdown");
        let _ = stop_rx.changed().await;
    }
    Ok(())
}

async fn set_mode(
    config: &Config,
    mode: AttackMode,
    channel: Option<Channel>,
    bssid: Option<MacAddr>,
) -> Result<()> {
    let state = connect(config);

    // Target first so the orchestrator never sees TARGETED without one
    match channel {
        Some(channel) => state.set_target(Target::new(channel, bssid)).await?,
        None if mode == AttackMode::Targeted => {
            return Err(Error::config("TARGETED requires --channel"));
        }
        None => {}
    }
    state.set_attack_mode(mode).await?;

    println!("Requested {}", mode);
    Ok(())
}

/// Snapshot of the coordination state
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Raw `current_attack_mode` value
    pub requested: Option<String>,
    pub enacted: Option<AttackMode>,
    pub locked_channel: Option<Channel>,
    pub target: Option<Target>,
    pub live_channels: Vec<Channel>,
    pub radio_channels: BTreeMap<String, Option<Channel>>,
    pub access_points: usize,
    pub clients: usize,
    pub probe_candidates: Vec<MacAddr>,
}

impl StatusReport {
    pub async fn collect(state: &StateClient, interfaces: &[String]) -> Result<Self> {
        let target = match state.target().await {
            Ok(target) => target,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Stored target is unusable");
                None
            }
        };

        let mut radio_channels = BTreeMap::new();
        for interface in interfaces {
            radio_channels.insert(interface.clone(), state.radio_channel(interface).await?);
        }

        Ok(Self {
            requested: state.store().get(keys::CURRENT_ATTACK_MODE).await?,
            enacted: state.enacted_mode().await?,
            locked_channel: state.locked_channel().await?,
            target,
            live_channels: state.live_channels().await?,
            radio_channels,
            access_points: state.access_points().await?.len(),
            clients: state.clients().await?.len(),
            probe_candidates: state.probe_candidates().await?,
        })
    }

    pub fn format(&self) -> String {
        fn show<T: ToString>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        fn join<T: ToString>(values: &[T]) -> String {
            if values.is_empty() {
                return "-".to_string();
            }
            values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        }

        let mut out = String::new();
        out.push_str(&format!("Requested mode:   {}\n", show(&self.requested)));
        out.push_str(&format!("Enacted mode:     {}\n", show(&self.enacted)));
        out.push_str(&format!("Channel lock:     {}\n", show(&self.locked_channel)));
        out.push_str(&format!("Target:           {}\n", show(&self.target)));
        out.push_str(&format!("Live channels:    {}\n", join(&self.live_channels)));
        for (interface, channel) in &self.radio_channels {
            out.push_str(&format!("Radio {:<10} {}\n", interface, show(channel)));
        }
        out.push_str(&format!("Access points:    {}\n", self.access_points));
        out.push_str(&format!("Clients:          {}\n", self.clients));
        out.push_str(&format!(
            "Probe candidates: {}\n",
            join(&self.probe_candidates)
        ));
        out
    }
}

async fn status(config: &Config, json: bool) -> Result<()> {
    let state = connect(config);
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        StatusReport::collect(&state, &config.interfaces),
    )
    .await
    .map_err(|_| Error::StoreUnavailable(config.store.address.clone()))??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.format());
    }
    Ok(())
}
