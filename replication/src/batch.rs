//! Per-viewer delta batches produced by the scheduler.

use base::{EntityId, Tick, ViewerId};

/// One entity-level notice inside a viewer's batch.
///
/// The session layer turns these into wire payloads. `Entered` asks for
/// a full state snapshot, `Updated` for the fields changed since the
/// recorded watermark, `Left` and `Destroyed` carry no state at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The viewer learns about this entity for the first time (or again
    /// after having left). Full state must be sent. The parent, when
    /// present, is guaranteed to appear earlier in the same batch or to
    /// be already known to the viewer.
    Entered {
        entity: EntityId,
        parent: Option<EntityId>,
    },
    /// The viewer knows the entity; send fields changed after `since`.
    Updated { entity: EntityId, since: Tick },
    /// The entity dropped out of range or out of the viewer's channels.
    /// It still exists.
    Left { entity: EntityId },
    /// The entity was deleted from the world.
    Destroyed { entity: EntityId },
}

impl Notice {
    /// The entity this notice is about.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::Entered { entity, .. }
            | Self::Updated { entity, .. }
            | Self::Left { entity }
            | Self::Destroyed { entity } => *entity,
        }
    }
}

/// Ordered notices for one viewer for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerBatch {
    pub viewer: ViewerId,
    pub notices: Vec<Notice>,
}

impl ViewerBatch {
    /// Returns `true` if there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

/// Everything one scheduler pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutput {
    pub tick: Tick,
    /// One batch per active viewer, in viewer order. Batches with no
    /// notices are included so callers can observe quiet ticks.
    pub batches: Vec<ViewerBatch>,
}

impl TickOutput {
    /// Looks up the batch for `viewer`, if it was active this tick.
    #[must_use]
    pub fn batch_for(&self, viewer: ViewerId) -> Option<&ViewerBatch> {
        self.batches.iter().find(|batch| batch.viewer == viewer)
    }
}
