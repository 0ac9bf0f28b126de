//! Worker traits and types
//!
//! Attack modules and analyzers are opaque long-running processes. The
//! orchestrator only ever starts them, stops them and asks whether they are
//! still alive, so that is all the `Worker` trait exposes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use crate::{Channel, Error, MacAddr, Result};

/// Kind of supervised worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    GenericAttack,
    BeaconFloodAttack,
    WepAttack,
    AuthenticationAttack,
    /// Passive analyzer publishing APs, clients and channel liveness
    Analyzer,
    /// Analyzer variant that replaces the normal one during a beacon flood
    FloodSniffer,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 6] = [
        WorkerKind::GenericAttack,
        WorkerKind::BeaconFloodAttack,
        WorkerKind::WepAttack,
        WorkerKind::AuthenticationAttack,
        WorkerKind::Analyzer,
        WorkerKind::FloodSniffer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::GenericAttack => "generic_attack",
            WorkerKind::BeaconFloodAttack => "beacon_flood_attack",
            WorkerKind::WepAttack => "wep_attack",
            WorkerKind::AuthenticationAttack => "authentication_attack",
            WorkerKind::Analyzer => "analyzer",
            WorkerKind::FloodSniffer => "flood_sniffer",
        }
    }

    /// Attack modules, as opposed to the passive analyzers
    pub fn is_attack(&self) -> bool {
        !matches!(self, WorkerKind::Analyzer | WorkerKind::FloodSniffer)
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WorkerKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::WorkerNotFound(s.to_string()))
    }
}

/// Arguments a worker process is started with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StartArgs {
    /// Monitor interface the worker operates on
    pub interface: String,
    /// Fixed channel, when the mode pins one
    pub channel: Option<Channel>,
    /// Target access point, when the mode has one
    pub bssid: Option<MacAddr>,
}

impl StartArgs {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            channel: None,
            bssid: None,
        }
    }

    pub fn with_channel(mut self, channel: Option<Channel>) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_bssid(mut self, bssid: Option<MacAddr>) -> Self {
        self.bssid = bssid;
        self
    }

    /// Command line flags appended to the configured worker program
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["--interface".to_string(), self.interface.clone()];
        if let Some(channel) = self.channel {
            args.push("--channel".to_string());
            args.push(channel.to_string());
        }
        if let Some(bssid) = self.bssid {
            args.push("--bssid".to_string());
            args.push(bssid.to_string());
        }
        args
    }
}

/// What to run: a worker kind plus its start arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub kind: WorkerKind,
    pub args: StartArgs,
}

impl WorkerSpec {
    pub fn new(kind: WorkerKind, args: StartArgs) -> Self {
        Self { kind, args }
    }
}

impl fmt::Display for WorkerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.args.interface)?;
        if let Some(channel) = self.args.channel {
            write!(f, " ch{}", channel)?;
        }
        if let Some(bssid) = self.args.bssid {
            write!(f, " {}", bssid)?;
        }
        Ok(())
    }
}

/// Start/stop/liveness capability every worker implements
#[async_trait]
pub trait Worker: Send + Sync {
    /// Start the worker. Starting a worker that is alive is a no-op.
    async fn start(&mut self) -> Result<()>;

    /// Ask the worker to exit, forcing it after `grace` has elapsed
    async fn stop(&mut self, grace: Duration) -> Result<()>;

    /// Is the worker still running?
    ///
    /// Takes `&mut self` because checking a child process reaps it.
    async fn is_alive(&mut self) -> bool;

    /// OS process id, if the worker is a live process
    fn pid(&self) -> Option<u32>;
}

/// Builds workers from specs
///
/// The orchestrator only knows specs; the launcher decides what a spec
/// turns into (a subprocess in production, a fake in tests).
pub trait WorkerLauncher: Send + Sync {
    fn create(&self, spec: &WorkerSpec) -> Result<Box<dyn Worker>>;
}

/// Snapshot of a supervised worker
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub id: uuid::Uuid,
    pub spec: WorkerSpec,
    pub pid: Option<u32>,
    pub alive: bool,
    /// How many times the worker has been started
    pub starts: u32,
    pub started_at: Option<SystemTime>,
}

/// Handle to a supervised worker
///
/// Owned by exactly one supervisor; dropping the handle does not kill the
/// process, `stop` has to be called explicitly.
pub struct WorkerHandle {
    /// Handle ID (UUID v7 for time-ordered tracking)
    pub id: uuid::Uuid,
    pub spec: WorkerSpec,
    worker: Box<dyn Worker>,
    starts: u32,
    started_at: Option<SystemTime>,
}

impl WorkerHandle {
    pub fn new(spec: WorkerSpec, worker: Box<dyn Worker>) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            spec,
            worker,
            starts: 0,
            started_at: None,
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.spec.kind
    }

    /// Start (or restart) the worker
    pub async fn start(&mut self) -> Result<()> {
        self.worker.start().await?;
        self.starts += 1;
        self.started_at = Some(SystemTime::now());
        Ok(())
    }

    /// Stop the worker
    pub async fn stop(&mut self, grace: Duration) -> Result<()> {
        self.worker.stop(grace).await
    }

    /// Is the worker process alive?
    pub async fn is_alive(&mut self) -> bool {
        self.worker.is_alive().await
    }

    /// Number of successful starts
    pub fn starts(&self) -> u32 {
        self.starts
    }

    /// Current status snapshot
    pub async fn status(&mut self) -> WorkerStatus {
        let alive = self.is_alive().await;
        WorkerStatus {
            id: self.id,
            spec: self.spec.clone(),
            pid: self.worker.pid(),
            alive,
            starts: self.starts,
            started_at: self.started_at,
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("pid", &self.worker.pid())
            .field("starts", &self.starts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in WorkerKind::ALL {
            assert_eq!(kind.as_str().parse::<WorkerKind>().unwrap(), kind);
        }
        assert!("deauth".parse::<WorkerKind>().is_err());
        assert!(WorkerKind::WepAttack.is_attack());
        assert!(!WorkerKind::FloodSniffer.is_attack());
    }

    #[test]
    fn test_start_args_cli_flags() {
        let args = StartArgs::new("wlan0mon");
        assert_eq!(args.to_cli_args(), vec!["--interface", "wlan0mon"]);

        let args = StartArgs::new("wlan1mon")
            .with_channel(Some(Channel::new(6).unwrap()))
            .with_bssid(Some(MacAddr([0, 0x11, 0x22, 0x33, 0x44, 0x55])));
        assert_eq!(
            args.to_cli_args(),
            vec![
                "--interface",
                "wlan1mon",
                "--channel",
                "6",
                "--bssid",
                "00:11:22:33:44:55"
            ]
        );
    }

    #[test]
    fn test_spec_equality_includes_args() {
        let a = WorkerSpec::new(WorkerKind::Analyzer, StartArgs::new("wlan0mon"));
        let b = WorkerSpec::new(
            WorkerKind::Analyzer,
            StartArgs::new("wlan0mon").with_channel(Some(Channel::new(6).unwrap())),
        );
        assert_ne!(a, b);
        assert_eq!(b.to_string(), "analyzer@wlan0mon ch6");
    }
}
