//! Shared state store for aircoord
//!
//! Every coordination process reads and writes the same small set of keys:
//! the requested attack mode, the hopper lock, per-channel liveness and the
//! observation records. The store can live in-process (`MemoryStore`) or
//! behind a `StoreServer` reached through `RemoteStore`.
//!
//! # Security Warning
//!
//! The store server speaks plain text and accepts writes from anyone who
//! can reach it. Bind it to loopback or a trusted management network.

pub mod client;
pub mod keys;
mod memory;
pub mod protocol;
mod remote;
pub mod server;
mod store;

pub use client::StateClient;
pub use memory::MemoryStore;
pub use protocol::{Command, CommandParser, Reply};
pub use remote::RemoteStore;
pub use server::StoreServer;
pub use store::{KeyTtl, StateStore};
