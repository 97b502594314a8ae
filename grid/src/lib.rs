//! Chunked spatial index for the scry visibility engine.
//!
//! Maps world positions to fixed-size chunks and answers "what entities
//! are near this rectangle" without touching the rest of the world. The
//! chunk table is the source of truth for spatial membership; the
//! extended-bounds registry and global overrides are acceleration paths
//! layered over the same membership.
//!
//! # Design Principles
//!
//! - **Sparse by default** - chunks are hash-keyed by `(map, x, y)`, not
//!   a dense array, because world extents are unbounded.
//! - **Deferred eviction** - empty chunks are retired at end of tick,
//!   never mid-query, and never while a viewer still references them.
//! - **Boundary validation** - invalid input is rejected and logged at
//!   this API, not absorbed into the table.

mod config;
mod index;

pub use config::GridConfig;
pub use index::SpatialIndex;
