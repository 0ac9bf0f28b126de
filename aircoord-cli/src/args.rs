//! CLI argument parsing
//!
//! One binary serves every aircoord process: the store server, the
//! orchestrator, the hopper, both analyzer variants, and the operator
//! commands that poke the store.

use aircoord_core::{AttackMode, Channel, Config, MacAddr};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "aircoord")]
#[command(version, about = "Wireless attack orchestration and channel coordination", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Store server address, overrides the configuration
    #[arg(short = 's', long, global = true, value_name = "HOST:PORT")]
    pub store: Option<String>,

    /// Monitor interface, overrides the primary configured interface
    #[arg(short = 'I', long, global = true)]
    pub interface: Option<String>,

    /// Verbose output (-v, -vv, -vvv for increasing verbosity)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the shared state store over TCP
    StoreServer {
        /// Listen address (defaults to the configured store address)
        #[arg(short, long, value_name = "HOST:PORT")]
        listen: Option<String>,
    },

    /// Run the orchestrator control loop
    Orchestrate {
        /// Do not run a channel hopper in this process
        #[arg(long)]
        no_hopper: bool,
    },

    /// Run the channel hopper on its own
    Hop {
        /// Channels to cycle through (comma separated)
        #[arg(long, value_delimiter = ',', value_name = "CH,CH,...")]
        channels: Vec<Channel>,

        /// Dwell time per channel in milliseconds
        #[arg(long, value_name = "MS")]
        dwell_ms: Option<u64>,
    },

    /// Run an analyzer over newline-delimited JSON frames
    Analyze {
        /// Run the flood sniffer variant (beacon activity only)
        #[arg(long)]
        flood: bool,

        /// Only analyze frames from this channel
        #[arg(long)]
        channel: Option<Channel>,

        /// Read frames from this file or FIFO instead of stdin
        #[arg(long, value_name = "FILE")]
        frames: Option<PathBuf>,

        /// Exit when the frame source ends instead of waiting for a signal
        #[arg(long)]
        once: bool,
    },

    /// Request an attack mode
    SetMode {
        /// NORMAL, TARGETED or BEACON_FLOOD
        #[arg(value_name = "MODE")]
        mode: AttackMode,

        /// Target channel (required for TARGETED)
        #[arg(long)]
        channel: Option<Channel>,

        /// Target access point
        #[arg(long, requires = "channel")]
        bssid: Option<MacAddr>,
    },

    /// Show requested and enacted state from the store
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Default log filter for the verbosity count
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Apply command-line overrides to a loaded configuration.
    ///
    /// Worker commands that re-invoke `aircoord` get the same `--config` and
    /// `--store` so spawned workers talk to the same store.
    pub fn apply(&self, config: &mut Config) {
        if let Some(store) = &self.store {
            config.store.address = store.clone();
        }
        if let Some(interface) = &self.interface {
            match config.interfaces.first_mut() {
                Some(primary) => *primary = interface.clone(),
                None => config.interfaces.push(interface.clone()),
            }
        }

        let mut inherited = Vec::new();
        if let Some(path) = &self.config {
            inherited.push("--config".to_string());
            inherited.push(path.display().to_string());
        }
        if self.store.is_some() {
            inherited.push("--store".to_string());
            inherited.push(config.store.address.clone());
        }
        if inherited.is_empty() {
            return;
        }
        for command in config.workers.values_mut() {
            if command.program == "aircoord" {
                command.args.extend(inherited.iter().cloned());
            }
        }
    }
}
