//! Shared vocabulary types for the scry visibility engine.
//!
//! Every other crate in the workspace speaks in terms of these types:
//! identifiers for entities, maps, and viewers, the logical tick clock,
//! 2D geometry for interest regions, chunk coordinates, and visibility
//! masks.
//!
//! # Design Principles
//!
//! - **Newtypes everywhere** - identifiers never mix, ticks never mix
//!   with counts.
//! - **No behavior** - this crate holds data definitions and pure math
//!   only; all stateful structures live upstream.

mod chunk;
mod geom;
mod mask;
mod types;

pub use chunk::{ChunkCoord, ChunkKey};
pub use geom::{Rect, Vec2};
pub use mask::VisMask;
pub use types::{EntityId, MapId, Tick, ViewerId};
