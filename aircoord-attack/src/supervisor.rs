//! Worker supervisor
//!
//! The `Supervisor` exclusively owns every worker handle the orchestrator
//! starts. It provides:
//!
//! - Idempotent "make these specs run" with restart of dead workers
//! - Stopping everything outside a keep-set
//! - Status snapshots
//! - Graceful shutdown

use aircoord_core::{Error, Result, WorkerHandle, WorkerLauncher, WorkerSpec, WorkerStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What `ensure_running` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureReport {
    /// Specs started for the first time
    pub started: Vec<WorkerSpec>,
    /// Specs whose worker had died and was started again
    pub restarted: Vec<WorkerSpec>,
    /// Specs that could not be started this time
    pub failed: Vec<WorkerSpec>,
}

/// Owner of all running workers
pub struct Supervisor {
    launcher: Arc<dyn WorkerLauncher>,
    workers: HashMap<WorkerSpec, WorkerHandle>,
    stop_grace: Duration,
    shutting_down: bool,
}

impl Supervisor {
    pub fn new(launcher: Arc<dyn WorkerLauncher>, stop_grace: Duration) -> Self {
        Self {
            launcher,
            workers: HashMap::new(),
            stop_grace,
            shutting_down: false,
        }
    }

    /// Make every spec in `specs` run, starting missing or dead workers.
    ///
    /// Failures are logged and reported; the next call retries them.
    pub async fn ensure_running(&mut self, specs: &[WorkerSpec]) -> EnsureReport {
        let mut report = EnsureReport::default();
        if self.shutting_down {
            return report;
        }

        for spec in specs {
            if !self.workers.contains_key(spec) {
                match self.launcher.create(spec) {
                    Ok(worker) => {
                        self.workers
                            .insert(spec.clone(), WorkerHandle::new(spec.clone(), worker));
                    }
                    Err(e) => {
                        error!(spec = %spec, error = %e, "Cannot create worker");
                        report.failed.push(spec.clone());
                        continue;
                    }
                }
            }
            let Some(handle) = self.workers.get_mut(spec) else {
                continue;
            };

            if handle.is_alive().await {
                continue;
            }

            let first_start = handle.starts() == 0;
            if !first_start {
                warn!(spec = %spec, starts = handle.starts(), "Worker died, restarting");
            }
            match handle.start().await {
                Ok(()) if first_start => report.started.push(spec.clone()),
                Ok(()) => report.restarted.push(spec.clone()),
                Err(e) => {
                    error!(spec = %spec, error = %e, "Worker failed to start, retrying next tick");
                    report.failed.push(spec.clone());
                }
            }
        }

        report
    }

    /// Stop and forget every worker whose spec is not in `keep`.
    ///
    /// A worker that fails to stop stays owned so a later call retries.
    pub async fn stop_except(&mut self, keep: &[WorkerSpec]) -> Vec<WorkerSpec> {
        let doomed: Vec<WorkerSpec> = self
            .workers
            .keys()
            .filter(|spec| !keep.contains(spec))
            .cloned()
            .collect();

        let mut stopped = Vec::new();
        for spec in doomed {
            if self.stop(&spec).await.is_ok() {
                stopped.push(spec);
            }
        }
        stopped
    }

    /// Stop one worker
    pub async fn stop(&mut self, spec: &WorkerSpec) -> Result<()> {
        let Some(handle) = self.workers.get_mut(spec) else {
            return Err(Error::WorkerNotFound(spec.to_string()));
        };

        debug!(id = %handle.id, spec = %spec, "Stopping worker");
        match handle.stop(self.stop_grace).await {
            Ok(()) => {
                self.workers.remove(spec);
                info!(spec = %spec, "Worker stopped");
                Ok(())
            }
            Err(e) => {
                error!(spec = %spec, error = %e, "Failed to stop worker");
                Err(e)
            }
        }
    }

    /// Stop all workers and refuse new starts
    pub async fn stop_all(&mut self) -> Result<()> {
        info!(count = self.workers.len(), "Stopping all workers");
        self.shutting_down = true;

        let stopped = self.stop_except(&[]).await;
        if self.workers.is_empty() {
            info!(count = stopped.len(), "All workers stopped");
            Ok(())
        } else {
            Err(Error::Interrupted(format!(
                "Failed to stop {} workers",
                self.workers.len()
            )))
        }
    }

    /// Status of every owned worker
    pub async fn statuses(&mut self) -> Vec<WorkerStatus> {
        let mut statuses = Vec::with_capacity(self.workers.len());
        for handle in self.workers.values_mut() {
            statuses.push(handle.status().await);
        }
        statuses.sort_by_key(|status| status.spec.kind);
        statuses
    }

    /// Specs of workers that are currently alive
    pub async fn alive_specs(&mut self) -> Vec<WorkerSpec> {
        let mut alive = Vec::new();
        for (spec, handle) in self.workers.iter_mut() {
            if handle.is_alive().await {
                alive.push(spec.clone());
            }
        }
        alive.sort_by_key(|spec| spec.kind);
        alive
    }

    pub fn owns(&self, spec: &WorkerSpec) -> bool {
        self.workers.contains_key(spec)
    }

    /// Number of owned workers, alive or not
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
