//! Configuration shared by every aircoord process
//!
//! All processes read the same TOML file so the orchestrator, the hopper
//! and the analyzers agree on store address, channel set and TTL windows.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{AttackMode, Channel, Error, Result, WorkerKind};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Monitor-mode interfaces, first one is the primary
    #[serde(default = "default_interfaces")]
    pub interfaces: Vec<String>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub hopper: HopperConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Command line for each worker kind
    #[serde(default = "default_workers")]
    pub workers: BTreeMap<WorkerKind, WorkerCommand>,

    #[serde(default)]
    pub modes: ModesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interfaces: default_interfaces(),
            store: StoreConfig::default(),
            hopper: HopperConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            liveness: LivenessConfig::default(),
            workers: default_workers(),
            modes: ModesConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or the first default location that exists,
    /// or fall back to built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let paths = [
            PathBuf::from("/etc/aircoord/config.toml"),
            PathBuf::from("aircoord.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Reject configurations the control loops cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.interfaces.is_empty() {
            return Err(Error::config("at least one interface is required"));
        }
        if self.hopper.channels.is_empty() {
            return Err(Error::config("hopper.channels must not be empty"));
        }
        if self.hopper.dwell_ms == 0 {
            return Err(Error::config("hopper.dwell_ms must be greater than zero"));
        }
        if self.orchestrator.tick_interval_ms == 0 {
            return Err(Error::config(
                "orchestrator.tick_interval_ms must be greater than zero",
            ));
        }
        if self.liveness.default_ttl_secs == 0 {
            return Err(Error::config(
                "liveness.default_ttl_secs must be greater than zero",
            ));
        }
        for (key, ttl) in &self.liveness.per_channel {
            if let Err(e) = key.parse::<Channel>() {
                return Err(Error::config(format!(
                    "liveness.per_channel key '{}' is not a channel: {}",
                    key, e
                )));
            }
            if *ttl == 0 {
                return Err(Error::config(format!(
                    "liveness.per_channel.{} must be greater than zero",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Worker kinds some mode needs but no command is configured for
    pub fn missing_worker_commands(&self) -> Vec<WorkerKind> {
        let mut missing: Vec<WorkerKind> = AttackMode::ALL
            .iter()
            .flat_map(|mode| self.modes.kinds(*mode).iter().copied())
            .filter(|kind| !self.workers.contains_key(kind))
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Primary monitor interface
    pub fn primary_interface(&self) -> &str {
        self.interfaces.first().map(String::as_str).unwrap_or("wlan0mon")
    }
}

fn default_interfaces() -> Vec<String> {
    vec!["wlan0mon".to_string()]
}

fn default_workers() -> BTreeMap<WorkerKind, WorkerCommand> {
    let mut workers = BTreeMap::new();
    workers.insert(
        WorkerKind::Analyzer,
        WorkerCommand::new("aircoord", &["analyze"]),
    );
    workers.insert(
        WorkerKind::FloodSniffer,
        WorkerCommand::new("aircoord", &["analyze", "--flood"]),
    );
    workers
}

/// Where the shared state store lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Address of the store server
    #[serde(default = "default_store_address")]
    pub address: String,

    /// Connect timeout for the remote store client
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            address: default_store_address(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_store_address() -> String {
    "127.0.0.1:6390".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

/// Channel hopper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopperConfig {
    /// Channels to cycle through, in order
    #[serde(default = "Channel::default_hop_set")]
    pub channels: Vec<Channel>,

    /// Time spent on each channel
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
}

impl Default for HopperConfig {
    fn default() -> Self {
        Self {
            channels: Channel::default_hop_set(),
            dwell_ms: default_dwell_ms(),
        }
    }
}

impl HopperConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

fn default_dwell_ms() -> u64 {
    250
}

/// Orchestrator control loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Sleep between control loop ticks
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// How long a worker gets to exit after SIGTERM before it is killed
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Revert TARGETED to NORMAL after the target channel has been silent
    /// this long (0 disables)
    #[serde(default = "default_target_timeout_secs")]
    pub target_timeout_secs: u64,

    /// Warn when no channel has been live for this long while hopping
    /// (0 disables)
    #[serde(default = "default_stall_warning_secs")]
    pub stall_warning_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            target_timeout_secs: default_target_timeout_secs(),
            stall_warning_secs: default_stall_warning_secs(),
        }
    }
}

impl OrchestratorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn target_timeout(&self) -> Option<Duration> {
        (self.target_timeout_secs > 0).then(|| Duration::from_secs(self.target_timeout_secs))
    }

    pub fn stall_warning(&self) -> Option<Duration> {
        (self.stall_warning_secs > 0).then(|| Duration::from_secs(self.stall_warning_secs))
    }
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_stop_grace_ms() -> u64 {
    3000
}

fn default_target_timeout_secs() -> u64 {
    120
}

fn default_stall_warning_secs() -> u64 {
    30
}

/// TTL windows for liveness keys and observation records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Liveness window for channels without an override
    #[serde(default = "default_liveness_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Per-channel liveness window overrides, keyed by channel number
    #[serde(default)]
    pub per_channel: HashMap<String, u64>,

    /// How long an AP or client record survives without a sighting
    #[serde(default = "default_record_ttl_secs")]
    pub record_ttl_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_liveness_ttl_secs(),
            per_channel: HashMap::new(),
            record_ttl_secs: default_record_ttl_secs(),
        }
    }
}

impl LivenessConfig {
    /// Liveness window for `channel`
    pub fn ttl_for(&self, channel: Channel) -> Duration {
        let secs = self
            .per_channel
            .iter()
            .find(|(key, _)| key.parse::<Channel>().ok() == Some(channel))
            .map_or(self.default_ttl_secs, |(_, secs)| *secs);
        Duration::from_secs(secs)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }
}

fn default_liveness_ttl_secs() -> u64 {
    10
}

fn default_record_ttl_secs() -> u64 {
    300
}

/// Program and fixed arguments for a worker kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Which worker kinds run in which mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModesConfig {
    #[serde(default = "default_normal_kinds")]
    pub normal: Vec<WorkerKind>,
    #[serde(default = "default_targeted_kinds")]
    pub targeted: Vec<WorkerKind>,
    #[serde(default = "default_beacon_flood_kinds")]
    pub beacon_flood: Vec<WorkerKind>,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            normal: default_normal_kinds(),
            targeted: default_targeted_kinds(),
            beacon_flood: default_beacon_flood_kinds(),
        }
    }
}

impl ModesConfig {
    pub fn kinds(&self, mode: AttackMode) -> &[WorkerKind] {
        match mode {
            AttackMode::Normal => &self.normal,
            AttackMode::Targeted => &self.targeted,
            AttackMode::BeaconFlood => &self.beacon_flood,
        }
    }
}

fn default_normal_kinds() -> Vec<WorkerKind> {
    vec![
        WorkerKind::GenericAttack,
        WorkerKind::BeaconFloodAttack,
        WorkerKind::Analyzer,
    ]
}

fn default_targeted_kinds() -> Vec<WorkerKind> {
    vec![
        WorkerKind::WepAttack,
        WorkerKind::AuthenticationAttack,
        WorkerKind::Analyzer,
    ]
}

fn default_beacon_flood_kinds() -> Vec<WorkerKind> {
    vec![WorkerKind::BeaconFloodAttack, WorkerKind::FloodSniffer]
}
