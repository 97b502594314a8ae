//! Entity arena and hierarchical visibility for the scry engine.
//!
//! The arena is the engine's stand-in for the host game's
//! entity/component substrate: stable never-reused identities, absolute
//! 2D transforms, parent links forming a forest per map, last-modified
//! tick watermarks, and tombstoned deletion. Mutations are buffered as
//! [`WorldEvent`]s and drained once per tick by the replication driver,
//! so nothing downstream observes a half-applied change.
//!
//! # Design Principles
//!
//! - **Arena, not pointers** - parents are ids, cycles are rejected at
//!   reparent time, and a bounded ancestor walk treats a cycle that
//!   slipped through as a consistency error rather than a hang.
//! - **Explicit event queue** - no callbacks fire during mutation;
//!   ordering is whatever the queue says it is.

mod arena;
mod error;
mod events;
mod visibility;

pub use arena::{EntityRecord, EntityTable, MAX_PARENT_DEPTH};
pub use error::{WorldError, WorldResult};
pub use events::WorldEvent;

#[cfg(test)]
mod tests {
    use super::*;
    use base::{MapId, Tick, Vec2};

    #[test]
    fn public_api_exports() {
        let mut table = EntityTable::new();
        let id = table
            .spawn(MapId::new(1), Vec2::new(0.0, 0.0), None, Tick::new(1))
            .unwrap();
        assert!(table.is_live(id));
        let _: WorldResult<()> = Ok(());
        let _ = MAX_PARENT_DEPTH;
    }
}
