//! Error types for world-arena operations.

use std::fmt;

use base::EntityId;

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;

/// Consistency errors surfaced by the entity arena.
///
/// These indicate bugs in the calling layer, never normal control flow;
/// the replication scheduler logs them and skips the offending entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldError {
    /// The entity does not exist or has been tombstoned.
    UnknownEntity { entity: EntityId },

    /// A parent link points at a missing or deleted entity.
    DanglingParent { entity: EntityId, parent: EntityId },

    /// A reparent would make an entity its own ancestor.
    ParentCycle { entity: EntityId, parent: EntityId },

    /// An ancestor walk exceeded the depth bound; the tree is corrupt.
    ParentChainTooDeep { entity: EntityId, depth: usize },

    /// A child may not live on a different map than its parent.
    MapMismatch { entity: EntityId, parent: EntityId },
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEntity { entity } => {
                write!(f, "entity {} does not exist", entity.raw())
            }
            Self::DanglingParent { entity, parent } => {
                write!(
                    f,
                    "entity {} has dangling parent {}",
                    entity.raw(),
                    parent.raw()
                )
            }
            Self::ParentCycle { entity, parent } => {
                write!(
                    f,
                    "reparenting entity {} under {} would create a cycle",
                    entity.raw(),
                    parent.raw()
                )
            }
            Self::ParentChainTooDeep { entity, depth } => {
                write!(
                    f,
                    "ancestor chain of entity {} exceeds depth bound {}",
                    entity.raw(),
                    depth
                )
            }
            Self::MapMismatch { entity, parent } => {
                write!(
                    f,
                    "entity {} and parent {} are on different maps",
                    entity.raw(),
                    parent.raw()
                )
            }
        }
    }
}

impl std::error::Error for WorldError {}
