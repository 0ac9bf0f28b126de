//! Orchestrator control loop
//!
//! One task owns the `Orchestrator` and with it every worker handle. Each
//! tick it:
//!
//! 1. reads `current_attack_mode` (and the target for TARGETED)
//! 2. on a change, stops the old worker set, moves the hopper lock and
//!    starts the new set
//! 3. restarts dead workers of the enacted set
//! 4. re-arms liveness keys that lost their expiry
//! 5. watches channel liveness for stalls and lost targets
//!
//! Store failures abort the tick; the next tick simply tries again.

use aircoord_capture::HopperHandle;
use aircoord_core::config::{LivenessConfig, OrchestratorConfig};
use aircoord_core::{
    AttackMode, Channel, Config, Error, Result, Target, WorkerLauncher, WorkerSpec, WorkerStatus,
};
use aircoord_store::{KeyTtl, StateClient};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::registry::ModeTable;
use crate::supervisor::Supervisor;

/// How often liveness windows are republished
const WINDOW_REPUBLISH_INTERVAL: Duration = Duration::from_secs(30);

/// Pins and releases the channel hopper
#[async_trait]
pub trait HopperControl: Send + Sync {
    async fn force_channel(&self, channel: Channel) -> Result<()>;
    async fn unforce_channel(&self) -> Result<()>;
}

/// Hopper control through the store's `current_channel` lock key
pub struct StoreHopperControl {
    state: StateClient,
}

impl StoreHopperControl {
    pub fn new(state: StateClient) -> Self {
        Self { state }
    }
}

#[async_trait]
impl HopperControl for StoreHopperControl {
    async fn force_channel(&self, channel: Channel) -> Result<()> {
        self.state.lock_channel(channel).await
    }

    async fn unforce_channel(&self) -> Result<()> {
        self.state.unlock_channel().await
    }
}

#[async_trait]
impl HopperControl for HopperHandle {
    async fn force_channel(&self, channel: Channel) -> Result<()> {
        HopperHandle::force_channel(self, channel);
        Ok(())
    }

    async fn unforce_channel(&self) -> Result<()> {
        HopperHandle::unforce_channel(self);
        Ok(())
    }
}

/// The worker set currently in force
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enacted {
    pub mode: AttackMode,
    pub target: Option<Target>,
    pub specs: Vec<WorkerSpec>,
    /// `enacted_attack_mode` has been written for this enactment
    pub mirrored: bool,
}

/// Everything the control loop remembers between ticks
#[derive(Debug, Default)]
pub struct OrchestratorState {
    pub enacted: Option<Enacted>,
    /// First tick without any live channel
    stalled_since: Option<Instant>,
    stall_warned: bool,
    /// First tick the target channel was not live
    target_lost_since: Option<Instant>,
    windows_published_at: Option<Instant>,
    /// Last requested-mode problem reported, to avoid repeating it every tick
    last_warning: Option<String>,
}

impl OrchestratorState {
    pub fn mode(&self) -> Option<AttackMode> {
        self.enacted.as_ref().map(|e| e.mode)
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Mode enacted after the tick
    pub mode: Option<AttackMode>,
    pub started: Vec<WorkerSpec>,
    pub stopped: Vec<WorkerSpec>,
    pub restarted: Vec<WorkerSpec>,
    /// Liveness keys whose expiry was re-armed
    pub rearmed: usize,
    /// The lost target made the orchestrator request NORMAL
    pub reverted: bool,
}

impl TickReport {
    /// No worker churn and nothing re-armed or reverted
    pub fn is_quiet(&self) -> bool {
        self.started.is_empty()
            && self.stopped.is_empty()
            && self.restarted.is_empty()
            && self.rearmed == 0
            && !self.reverted
    }
}

/// Requests the control loop to exit
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// The mode-switching control loop
pub struct Orchestrator {
    interface: String,
    hop_channels: Vec<Channel>,
    settings: OrchestratorConfig,
    liveness: LivenessConfig,
    state: StateClient,
    hopper: Box<dyn HopperControl>,
    modes: ModeTable,
    supervisor: Supervisor,
    inner: OrchestratorState,
    shutdown: ShutdownHandle,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        state: StateClient,
        launcher: Arc<dyn WorkerLauncher>,
        hopper: Box<dyn HopperControl>,
    ) -> Self {
        Self {
            interface: config.primary_interface().to_string(),
            hop_channels: config.hopper.channels.clone(),
            settings: config.orchestrator.clone(),
            liveness: config.liveness.clone(),
            state,
            hopper,
            modes: ModeTable::from_config(config),
            supervisor: Supervisor::new(launcher, config.orchestrator.stop_grace()),
            inner: OrchestratorState::default(),
            shutdown: ShutdownHandle::default(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.inner
    }

    pub async fn worker_statuses(&mut self) -> Vec<WorkerStatus> {
        self.supervisor.statuses().await
    }

    /// Tick until shut down, then stop every worker
    pub async fn run(&mut self) {
        info!(
            interface = %self.interface,
            tick_ms = self.settings.tick_interval_ms,
            "Orchestrator started"
        );

        while !self.shutdown.is_shutdown() {
            match self.tick().await {
                Ok(report) if !report.is_quiet() => {
                    info!(
                        mode = ?report.mode,
                        started = report.started.len(),
                        stopped = report.stopped.len(),
                        restarted = report.restarted.len(),
                        rearmed = report.rearmed,
                        reverted = report.reverted,
                        "Tick"
                    );
                }
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Store unavailable, retrying next tick");
                }
                Err(e) => {
                    error!(error = %e, "Tick failed, retrying next tick");
                }
            }
            tokio::time::sleep(self.settings.tick_interval()).await;
        }

        self.shutdown_workers().await;
    }

    /// Stop all workers and release the hopper
    pub async fn shutdown_workers(&mut self) {
        info!("Orchestrator shutting down");
        if let Err(e) = self.supervisor.stop_all().await {
            error!(error = %e, "Some workers did not stop");
        }
        if let Err(e) = self.hopper.unforce_channel().await {
            warn!(error = %e, "Failed to release hopper lock");
        }
    }

    /// One pass of the control loop
    pub async fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();

        let requested = self.requested_mode().await?;
        let (mode, target) = self.resolve_target(requested).await?;

        let changed = match &self.inner.enacted {
            Some(enacted) => enacted.mode != mode || enacted.target != target,
            None => true,
        };
        if changed {
            report.stopped = self.transition(mode, target).await?;
        }

        let Some(specs) = self.inner.enacted.as_ref().map(|e| e.specs.clone()) else {
            return Ok(report);
        };
        // Workers that refused to stop during a transition are retried here
        let leftovers = self.supervisor.stop_except(&specs).await;
        report.stopped.extend(leftovers);

        let ensured = self.supervisor.ensure_running(&specs).await;
        report.started = ensured.started;
        report.restarted = ensured.restarted;

        if ensured.failed.is_empty() {
            self.mirror_enacted().await?;
        }

        report.rearmed = self.configure_ttls().await?;
        report.reverted = self.watch_liveness().await?;
        report.mode = self.inner.mode();
        Ok(report)
    }

    /// The mode the store asks for.
    ///
    /// A missing key is initialised to NORMAL; an unreadable one leaves the
    /// enacted mode in place.
    async fn requested_mode(&mut self) -> Result<AttackMode> {
        match self.state.attack_mode().await {
            Ok(Some(mode)) => Ok(mode),
            Ok(None) => {
                info!("No attack mode requested, initialising to NORMAL");
                self.state.set_attack_mode(AttackMode::Normal).await?;
                Ok(AttackMode::Normal)
            }
            Err(Error::InvalidMode(raw)) => {
                self.warn_once(format!("Ignoring unknown attack mode '{}'", raw));
                Ok(self.inner.mode().unwrap_or_default())
            }
            Err(e) => Err(e),
        }
    }

    /// Attach the target to TARGETED; without a usable target the enacted
    /// mode stays
    async fn resolve_target(&mut self, mode: AttackMode) -> Result<(AttackMode, Option<Target>)> {
        if mode != AttackMode::Targeted {
            return Ok((mode, None));
        }

        let problem = match self.state.target().await {
            Ok(Some(target)) => return Ok((mode, Some(target))),
            Ok(None) => "TARGETED requested without target_channel".to_string(),
            Err(
                e @ (Error::InvalidChannel(_) | Error::InvalidMac(_) | Error::Protocol(_)),
            ) => {
                format!("TARGETED requested with an unusable target: {}", e)
            }
            Err(e) => return Err(e),
        };
        self.warn_once(problem);

        Ok(match &self.inner.enacted {
            Some(enacted) => (enacted.mode, enacted.target),
            None => (AttackMode::Normal, None),
        })
    }

    fn warn_once(&mut self, message: String) {
        if self.inner.last_warning.as_deref() != Some(message.as_str()) {
            warn!("{}", message);
            self.inner.last_warning = Some(message);
        } else {
            debug!("{}", message);
        }
    }

    /// Switch the worker set; returns the specs that were stopped
    async fn transition(
        &mut self,
        mode: AttackMode,
        target: Option<Target>,
    ) -> Result<Vec<WorkerSpec>> {
        let from = self.inner.mode();
        let specs = self.modes.specs_for(mode, target.as_ref(), &self.interface);
        info!(from = ?from, to = %mode, target = ?target.map(|t| t.to_string()), "Mode transition");

        let stopped = self.supervisor.stop_except(&specs).await;

        match target {
            Some(target) if !mode.hops() => self.hopper.force_channel(target.channel).await?,
            _ => self.hopper.unforce_channel().await?,
        }

        self.inner.enacted = Some(Enacted {
            mode,
            target,
            specs,
            mirrored: false,
        });
        self.inner.last_warning = None;
        self.inner.target_lost_since = None;
        self.inner.stalled_since = None;
        self.inner.stall_warned = false;

        Ok(stopped)
    }

    /// Publish the enacted mode once its whole worker set is running
    async fn mirror_enacted(&mut self) -> Result<()> {
        let Some(enacted) = self.inner.enacted.as_mut() else {
            return Ok(());
        };
        if enacted.mirrored {
            return Ok(());
        }
        self.state.set_enacted_mode(enacted.mode).await?;
        enacted.mirrored = true;
        info!(mode = %enacted.mode, workers = enacted.specs.len(), "Mode enacted");
        Ok(())
    }

    /// Publish per-channel liveness windows and give liveness keys without
    /// an expiry their window back. Returns how many keys were re-armed.
    pub async fn configure_ttls(&mut self) -> Result<usize> {
        let now = Instant::now();
        let due = self
            .inner
            .windows_published_at
            .map_or(true, |at| now.duration_since(at) >= WINDOW_REPUBLISH_INTERVAL);
        if due {
            for channel in &self.hop_channels {
                self.state
                    .publish_liveness_window(*channel, self.liveness.ttl_for(*channel))
                    .await?;
            }
            self.inner.windows_published_at = Some(now);
            debug!(channels = self.hop_channels.len(), "Published liveness windows");
        }

        let mut rearmed = 0;
        for (channel, ttl) in self.state.liveness_ttls().await? {
            let window = self.liveness.ttl_for(channel);
            let stale = match ttl {
                KeyTtl::Persistent => true,
                KeyTtl::Expires(remaining) => remaining > window,
                KeyTtl::Missing => false,
            };
            if stale && self.state.rearm_liveness(channel, window).await? {
                debug!(channel = %channel, window_secs = window.as_secs(), "Re-armed liveness key");
                rearmed += 1;
            }
        }
        Ok(rearmed)
    }

    /// Stall warning and revert-to-NORMAL. Returns whether NORMAL was
    /// requested.
    async fn watch_liveness(&mut self) -> Result<bool> {
        let Some(enacted) = self.inner.enacted.clone() else {
            return Ok(false);
        };
        let live = self.state.live_channels().await?;
        let now = Instant::now();

        if enacted.mode.hops() && live.is_empty() {
            let since = *self.inner.stalled_since.get_or_insert(now);
            if let Some(limit) = self.settings.stall_warning() {
                if !self.inner.stall_warned && now.duration_since(since) >= limit {
                    warn!(
                        secs = now.duration_since(since).as_secs(),
                        "No channel observed, hopper or analyzer may be stalled"
                    );
                    self.inner.stall_warned = true;
                }
            }
        } else {
            if self.inner.stall_warned {
                info!(live = live.len(), "Channel observations resumed");
            }
            self.inner.stalled_since = None;
            self.inner.stall_warned = false;
        }

        let (AttackMode::Targeted, Some(target), Some(timeout)) =
            (enacted.mode, enacted.target, self.settings.target_timeout())
        else {
            return Ok(false);
        };

        if live.contains(&target.channel) {
            self.inner.target_lost_since = None;
            return Ok(false);
        }
        let since = *self.inner.target_lost_since.get_or_insert(now);
        if now.duration_since(since) < timeout {
            return Ok(false);
        }

        warn!(
            target = %target,
            secs = timeout.as_secs(),
            "Target channel silent, reverting to NORMAL"
        );
        self.state.set_attack_mode(AttackMode::Normal).await?;
        self.inner.target_lost_since = None;
        Ok(true)
    }
}
