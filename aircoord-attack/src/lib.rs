//! Attack worker orchestration for aircoord
//!
//! This crate turns the requested attack mode into a running set of worker
//! processes. It includes:
//!
//! - `ModeTable`: which worker specs belong to which mode
//! - `Supervisor`: sole owner of the worker handles, restarts dead workers
//! - `ProcessLauncher`: runs workers as child processes
//! - `Orchestrator`: the control loop reading the store and enacting modes
//!
//! # Example
//!
//! ```no_run
//! use aircoord_attack::{Orchestrator, ProcessLauncher, StoreHopperControl};
//! use aircoord_core::Config;
//! use aircoord_store::{RemoteStore, StateClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = RemoteStore::new(config.store.address.as_str())
//!         .with_connect_timeout(config.store.connect_timeout());
//!     let state = StateClient::new(Arc::new(store));
//!     let launcher = Arc::new(ProcessLauncher::from_config(&config));
//!     let hopper = Box::new(StoreHopperControl::new(state.clone()));
//!
//!     let mut orchestrator = Orchestrator::new(&config, state, launcher, hopper);
//!     orchestrator.run().await;
//!     Ok(())
//! }
//! ```

pub mod executor;
pub mod orchestrator;
pub mod registry;
pub mod supervisor;

pub use executor::{ProcessLauncher, ProcessWorker};
pub use orchestrator::{
    Enacted, HopperControl, Orchestrator, OrchestratorState, ShutdownHandle, StoreHopperControl,
    TickReport,
};
pub use registry::ModeTable;
pub use supervisor::{EnsureReport, Supervisor};
