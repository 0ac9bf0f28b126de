//! Observation workers for aircoord
//!
//! This crate holds the two workers that touch the air:
//!
//! - **Channel hopper**: cycles a monitor interface through its channel list,
//!   honouring an in-process force and the store's channel lock
//! - **Analyzer**: turns frame metadata into access point, client, liveness
//!   and probe candidate records in the shared store
//! - **Statistics**: counters shared by both workers
//!
//! ## Example
//!
//! ```no_run
//! use aircoord_capture::{Analyzer, AnalyzerConfig, AnalyzerVariant, JsonLinesSource};
//! use aircoord_store::{RemoteStore, StateClient};
//! use std::sync::Arc;
//! use tokio::io::BufReader;
//!
//! # async fn example() {
//! let state = StateClient::new(Arc::new(RemoteStore::new("127.0.0.1:6390")));
//! let source = JsonLinesSource::new(BufReader::new(tokio::io::stdin()));
//! let mut analyzer = Analyzer::new(AnalyzerVariant::Normal, AnalyzerConfig::default(), state, source);
//! analyzer.run().await;
//! # }
//! ```

pub mod analyzer;
pub mod hopper;
pub mod source;
pub mod stats;

// Re-export main types
pub use analyzer::{Analyzer, AnalyzerConfig, AnalyzerHandle, AnalyzerVariant};
pub use hopper::{ChannelHopper, HopperHandle};
pub use source::{FrameSource, JsonLinesSource};
pub use stats::{ActivityStats, StatsAccumulator};
