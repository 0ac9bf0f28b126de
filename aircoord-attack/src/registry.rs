//! Mode table
//!
//! Maps each attack mode to the worker specs that must run while it is
//! enacted. The kinds per mode come from the `[modes]` configuration; the
//! arguments depend on the mode and, for TARGETED, on the target.

use aircoord_core::config::ModesConfig;
use aircoord_core::{AttackMode, Config, StartArgs, Target, WorkerKind, WorkerSpec};
use tracing::debug;

/// Static mode to worker-set table
#[derive(Debug, Clone, Default)]
pub struct ModeTable {
    modes: ModesConfig,
}

impl ModeTable {
    pub fn new(modes: ModesConfig) -> Self {
        Self { modes }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.modes.clone())
    }

    /// Worker kinds active in `mode`
    pub fn kinds(&self, mode: AttackMode) -> &[WorkerKind] {
        self.modes.kinds(mode)
    }

    /// Worker specs for `mode` on `interface`.
    ///
    /// In TARGETED mode attack workers get the target channel and BSSID and
    /// analyzers are narrowed to the target channel. Other modes pass only
    /// the interface.
    pub fn specs_for(
        &self,
        mode: AttackMode,
        target: Option<&Target>,
        interface: &str,
    ) -> Vec<WorkerSpec> {
        let target = target.filter(|_| mode == AttackMode::Targeted);

        let specs: Vec<WorkerSpec> = self
            .kinds(mode)
            .iter()
            .map(|&kind| {
                let args = StartArgs::new(interface);
                let args = match target {
                    Some(target) if kind.is_attack() => args
                        .with_channel(Some(target.channel))
                        .with_bssid(target.bssid),
                    Some(target) => args.with_channel(Some(target.channel)),
                    None => args,
                };
                WorkerSpec::new(kind, args)
            })
            .collect();

        debug!(mode = %mode, count = specs.len(), "Resolved worker set");
        specs
    }

    /// Every kind any mode may run
    pub fn all_kinds(&self) -> Vec<WorkerKind> {
        let mut kinds: Vec<WorkerKind> = AttackMode::ALL
            .iter()
            .flat_map(|mode| self.kinds(*mode).iter().copied())
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}
