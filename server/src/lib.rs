//! Core of a ZooKeeper-compatible coordination service replicated with Raft:
//! snapshot persistence for the in-memory tables and the per-node commit
//! processor that orders client requests on top of the consensus log.

pub mod error;
pub mod processor;
pub mod queue;
pub mod request;
pub mod settings;
pub mod snapshot;
pub mod store;
