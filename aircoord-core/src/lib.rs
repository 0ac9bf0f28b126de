//! aircoord core library
//!
//! This crate provides the fundamental types, traits, configuration and
//! error handling shared by the aircoord coordination processes: the store,
//! the channel hopper, the analyzers and the orchestrator.

pub mod config;
pub mod error;
pub mod frame;
pub mod interface;
pub mod mode;
pub mod observation;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use frame::{FrameInfo, FrameKind};
pub use interface::{IwRadio, Radio, RadioInterface};
pub use mode::{AttackMode, Target};
pub use observation::{AccessPoint, Client};
pub use types::*;
pub use worker::{
    StartArgs, Worker, WorkerHandle, WorkerKind, WorkerLauncher, WorkerSpec, WorkerStatus,
};
