//! Buffered world mutation events.

use base::{EntityId, MapId, Vec2};

/// One buffered mutation, drained in order once per tick by the
/// replication driver, which applies it to the spatial index and routes
/// it through dirty propagation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldEvent {
    /// A new entity appeared.
    Spawned {
        entity: EntityId,
        map: MapId,
        position: Vec2,
    },
    /// An entity's origin moved.
    Moved { entity: EntityId, position: Vec2 },
    /// An entity changed parents.
    Reparented {
        entity: EntityId,
        parent: Option<EntityId>,
    },
    /// An entity's own visibility mask changed.
    MaskChanged { entity: EntityId },
    /// Some other replicated attribute changed.
    Changed { entity: EntityId },
    /// An entity was marked deleted (tombstoned).
    Deleted { entity: EntityId },
}

impl WorldEvent {
    /// The entity the event concerns.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::Spawned { entity, .. }
            | Self::Moved { entity, .. }
            | Self::Reparented { entity, .. }
            | Self::MaskChanged { entity }
            | Self::Changed { entity }
            | Self::Deleted { entity } => *entity,
        }
    }
}
