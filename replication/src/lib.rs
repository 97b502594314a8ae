//! Replication scheduling: per tick, per viewer, decide what to send.
//!
//! This crate ties the spatial index, the entity arena, and the
//! per-viewer tracker together. Each tick the [`ReplicationScheduler`]
//! diffs world state against every viewer's believed state and emits an
//! ordered batch of enter, update, leave, and destroy notices. The
//! [`Shard`] wraps the whole stack behind one tick-driven surface.
//!
//! Nothing here performs network I/O. Batches are handed back to the
//! caller; encoding and transmission belong to the session layer.

mod batch;
mod config;
mod dirty;
mod scheduler;
mod shard;

pub use batch::{Notice, TickOutput, ViewerBatch};
pub use config::ReplicationConfig;
pub use dirty::mark_changed;
pub use scheduler::{InterestRegion, ReplicationScheduler};
pub use shard::Shard;
