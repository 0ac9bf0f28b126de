//! Subprocess workers
//!
//! This module provides the `ProcessWorker`, which runs one worker spec as a
//! child process, and the `ProcessLauncher` that builds them from the
//! configured worker commands.
//!
//! Stopping escalates: SIGTERM first, then SIGKILL once the grace period
//! runs out.

use aircoord_core::config::WorkerCommand;
use aircoord_core::{Config, Error, Result, Worker, WorkerKind, WorkerLauncher, WorkerSpec};
use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// A worker running as a child process
pub struct ProcessWorker {
    spec: WorkerSpec,
    command: WorkerCommand,
    child: Option<Child>,
}

impl ProcessWorker {
    pub fn new(spec: WorkerSpec, command: WorkerCommand) -> Self {
        Self {
            spec,
            command,
            child: None,
        }
    }

    /// Full argument vector passed to the program
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.command.args.clone();
        argv.extend(self.spec.args.to_cli_args());
        argv
    }

    fn kind(&self) -> WorkerKind {
        self.spec.kind
    }

    /// Reap the child if it has exited; true while it is still running
    fn poll_child(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!(spec = %self.spec, status = %status, "Worker exited");
                self.child = None;
                false
            }
            Err(e) => {
                error!(spec = %self.spec, error = %e, "Failed to query worker");
                self.child = None;
                false
            }
        }
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn start(&mut self) -> Result<()> {
        if self.poll_child() {
            debug!(spec = %self.spec, "Worker already running");
            return Ok(());
        }

        let argv = self.argv();
        debug!(spec = %self.spec, program = %self.command.program, args = ?argv, "Spawning worker");

        let child = Command::new(&self.command.program)
            .args(&argv)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::worker(
                    self.kind(),
                    format!("failed to spawn {}: {}", self.command.program, e),
                )
            })?;

        info!(spec = %self.spec, pid = ?child.id(), "Worker started");
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self, grace: Duration) -> Result<()> {
        if !self.poll_child() {
            return Ok(());
        }
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(pid) = child.id() {
            debug!(spec = %self.spec, pid, "Sending SIGTERM");
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(spec = %self.spec, pid, error = %e, "SIGTERM failed");
            }
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(spec = %self.spec, status = %status, "Worker stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::worker(self.kind(), format!("wait failed: {}", e))),
            Err(_) => {
                warn!(
                    spec = %self.spec,
                    grace_ms = grace.as_millis() as u64,
                    "Worker ignored SIGTERM, killing"
                );
                child
                    .kill()
                    .await
                    .map_err(|e| Error::worker(self.kind(), format!("kill failed: {}", e)))
            }
        }
    }

    async fn is_alive(&mut self) -> bool {
        self.poll_child()
    }

    fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.id())
    }
}

/// Builds `ProcessWorker`s from the `[workers]` configuration table
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    commands: BTreeMap<WorkerKind, WorkerCommand>,
}

impl ProcessLauncher {
    pub fn new(commands: BTreeMap<WorkerKind, WorkerCommand>) -> Self {
        Self { commands }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.workers.clone())
    }

    pub fn command(&self, kind: WorkerKind) -> Option<&WorkerCommand> {
        self.commands.get(&kind)
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn create(&self, spec: &WorkerSpec) -> Result<Box<dyn Worker>> {
        let command = self.commands.get(&spec.kind).ok_or_else(|| {
            Error::WorkerNotFound(format!("no command configured for {}", spec.kind))
        })?;
        Ok(Box::new(ProcessWorker::new(spec.clone(), command.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircoord_core::{Channel, StartArgs};

    fn spec(kind: WorkerKind) -> WorkerSpec {
        WorkerSpec::new(kind, StartArgs::new("wlan0mon"))
    }

    #[test]
    fn test_argv_appends_start_args() {
        let spec = WorkerSpec::new(
            WorkerKind::WepAttack,
            StartArgs::new("wlan0mon")
                .with_channel(Some(Channel::new(6).unwrap()))
                .with_bssid(Some("00:11:22:33:44:55".parse().unwrap())),
        );
        let worker = ProcessWorker::new(spec, WorkerCommand::new("wep-attack", &["--quiet"]));
        assert_eq!(
            worker.argv(),
            vec![
                "--quiet",
                "--interface",
                "wlan0mon",
                "--channel",
                "6",
                "--bssid",
                "00:11:22:33:44:55"
            ]
        );
    }

    #[tokio::test]
    async fn test_start_is_alive_stop() {
        // sh ignores the appended flags after -c's script
        let command = WorkerCommand::new("sh", &["-c", "sleep 30", "worker"]);
        let mut worker = ProcessWorker::new(spec(WorkerKind::GenericAttack), command);

        assert!(!worker.is_alive().await);
        worker.start().await.unwrap();
        assert!(worker.is_alive().await);
        let pid = worker.pid();
        assert!(pid.is_some());

        // Starting again keeps the same process
        worker.start().await.unwrap();
        assert_eq!(worker.pid(), pid);

        worker.stop(Duration::from_secs(5)).await.unwrap();
        assert!(!worker.is_alive().await);
        assert_eq!(worker.pid(), None);
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let command = WorkerCommand::new("sh", &["-c", "trap '' TERM; sleep 30", "worker"]);
        let mut worker = ProcessWorker::new(spec(WorkerKind::BeaconFloodAttack), command);
        worker.start().await.unwrap();
        // Give the shell time to install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = std::time::Instant::now();
        worker.stop(Duration::from_millis(300)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(!worker.is_alive().await);
    }

    #[tokio::test]
    async fn test_exited_worker_is_not_alive() {
        let command = WorkerCommand::new("sh", &["-c", "exit 3", "worker"]);
        let mut worker = ProcessWorker::new(spec(WorkerKind::Analyzer), command);
        worker.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!worker.is_alive().await);
        // Stopping a dead worker is fine
        worker.stop(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure_is_worker_error() {
        let command = WorkerCommand::new("/nonexistent/aircoord-worker", &[]);
        let mut worker = ProcessWorker::new(spec(WorkerKind::WepAttack), command);
        assert!(matches!(
            worker.start().await,
            Err(Error::Worker {
                kind: WorkerKind::WepAttack,
                ..
            })
        ));
    }

    #[test]
    fn test_launcher_requires_command() {
        let launcher = ProcessLauncher::from_config(&Config::default());
        assert!(launcher.create(&spec(WorkerKind::Analyzer)).is_ok());
        assert!(matches!(
            launcher.create(&spec(WorkerKind::WepAttack)),
            Err(Error::WorkerNotFound(_))
        ));
    }
}
