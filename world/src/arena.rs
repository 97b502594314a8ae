//! The entity arena: records, lifecycle, and the parent forest.

use std::collections::BTreeMap;

use base::{EntityId, MapId, Tick, Vec2, VisMask};

use crate::error::{WorldError, WorldResult};
use crate::events::WorldEvent;

/// Upper bound on ancestor-chain walks. A legitimate tree never gets
/// close; exceeding it means the parent links are corrupt.
pub const MAX_PARENT_DEPTH: usize = 128;

/// One entity's replicated state.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    map: MapId,
    position: Vec2,
    rotation: f32,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    pub(crate) own_mask: Option<VisMask>,
    pub(crate) last_modified: Tick,
    deleted_at: Option<Tick>,
}

impl EntityRecord {
    /// The map this entity lives on.
    #[must_use]
    pub fn map(&self) -> MapId {
        self.map
    }

    /// Absolute world position of the entity's origin.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Rotation in radians.
    #[must_use]
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Parent entity, or `None` for the map root.
    #[must_use]
    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Child entities, in spawn order.
    #[must_use]
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Tick of the last replicated-attribute change.
    #[must_use]
    pub fn last_modified(&self) -> Tick {
        self.last_modified
    }

    /// The tick this entity was tombstoned, if any.
    #[must_use]
    pub fn deleted_at(&self) -> Option<Tick> {
        self.deleted_at
    }

    /// Returns `true` if the entity is not tombstoned.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// The arena of all entities on one shard.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    entities: BTreeMap<EntityId, EntityRecord>,
    next_id: u64,
    events: Vec<WorldEvent>,
}

impl EntityTable {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
            events: Vec::new(),
        }
    }

    /// Number of records, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the arena holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Looks up a record, tombstoned or not.
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&entity)
    }

    /// Returns `true` if the entity exists and is not tombstoned.
    #[must_use]
    pub fn is_live(&self, entity: EntityId) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(EntityRecord::is_live)
    }

    /// All entity ids, in id order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Spawns an entity at `position`, optionally under a parent.
    ///
    /// The parent must be live and on the same map. The returned id is
    /// never reused, even after deletion.
    pub fn spawn(
        &mut self,
        map: MapId,
        position: Vec2,
        parent: Option<EntityId>,
        tick: Tick,
    ) -> WorldResult<EntityId> {
        let entity = EntityId::new(self.next_id);
        if let Some(parent_id) = parent {
            let record = self.live_record(parent_id).map_err(|_| {
                WorldError::DanglingParent {
                    entity,
                    parent: parent_id,
                }
            })?;
            if record.map != map {
                return Err(WorldError::MapMismatch {
                    entity,
                    parent: parent_id,
                });
            }
        }

        self.next_id += 1;
        self.entities.insert(
            entity,
            EntityRecord {
                map,
                position,
                rotation: 0.0,
                parent,
                children: Vec::new(),
                own_mask: None,
                last_modified: tick,
                deleted_at: None,
            },
        );
        if let Some(parent_id) = parent {
            if let Some(record) = self.entities.get_mut(&parent_id) {
                record.children.push(entity);
            }
        }
        self.events.push(WorldEvent::Spawned {
            entity,
            map,
            position,
        });
        Ok(entity)
    }

    /// Moves an entity's origin.
    pub fn set_position(&mut self, entity: EntityId, position: Vec2, tick: Tick) -> WorldResult<()> {
        let record = self.live_record_mut(entity)?;
        record.position = position;
        record.last_modified = record.last_modified.max(tick);
        self.events.push(WorldEvent::Moved { entity, position });
        Ok(())
    }

    /// Sets an entity's rotation. Replicated, but irrelevant to chunk
    /// assignment.
    pub fn set_rotation(&mut self, entity: EntityId, rotation: f32, tick: Tick) -> WorldResult<()> {
        let record = self.live_record_mut(entity)?;
        record.rotation = rotation;
        record.last_modified = record.last_modified.max(tick);
        self.events.push(WorldEvent::Changed { entity });
        Ok(())
    }

    /// Marks some other replicated attribute as changed.
    pub fn mark_changed(&mut self, entity: EntityId, tick: Tick) -> WorldResult<()> {
        let record = self.live_record_mut(entity)?;
        record.last_modified = record.last_modified.max(tick);
        self.events.push(WorldEvent::Changed { entity });
        Ok(())
    }

    /// Moves an entity (and implicitly its subtree) under a new parent,
    /// or to the map root with `None`.
    ///
    /// Rejects cycles by walking the prospective ancestor chain before
    /// touching anything.
    pub fn reparent(
        &mut self,
        entity: EntityId,
        new_parent: Option<EntityId>,
        tick: Tick,
    ) -> WorldResult<()> {
        let map = self.live_record(entity)?.map;
        if let Some(parent_id) = new_parent {
            let parent_record =
                self.live_record(parent_id)
                    .map_err(|_| WorldError::DanglingParent {
                        entity,
                        parent: parent_id,
                    })?;
            if parent_record.map != map {
                return Err(WorldError::MapMismatch {
                    entity,
                    parent: parent_id,
                });
            }
            self.check_no_cycle(entity, parent_id)?;
        }

        let old_parent = self.live_record(entity)?.parent;
        if old_parent == new_parent {
            return Ok(());
        }
        if let Some(old_id) = old_parent {
            if let Some(record) = self.entities.get_mut(&old_id) {
                record.children.retain(|child| *child != entity);
            }
        }
        if let Some(new_id) = new_parent {
            if let Some(record) = self.entities.get_mut(&new_id) {
                record.children.push(entity);
            }
        }
        let record = self.live_record_mut(entity)?;
        record.parent = new_parent;
        record.last_modified = record.last_modified.max(tick);
        self.events.push(WorldEvent::Reparented {
            entity,
            parent: new_parent,
        });
        Ok(())
    }

    /// Tombstones an entity and its whole subtree. A live child may
    /// never reference a dead parent, so deletion is transitive.
    ///
    /// Records stay queryable (as tombstones) until
    /// [`Self::cull_tombstones`] runs on a later tick, giving the
    /// scheduler one tick to emit destroy notices.
    pub fn mark_deleted(&mut self, entity: EntityId, tick: Tick) -> WorldResult<()> {
        let record = self
            .entities
            .get(&entity)
            .ok_or(WorldError::UnknownEntity { entity })?;
        if !record.is_live() {
            return Ok(());
        }

        // detach the subtree root from its live parent
        if let Some(parent_id) = record.parent {
            if let Some(parent) = self.entities.get_mut(&parent_id) {
                parent.children.retain(|child| *child != entity);
            }
        }

        let mut stack = vec![entity];
        while let Some(current) = stack.pop() {
            let Some(record) = self.entities.get_mut(&current) else {
                log::error!(
                    "delete of entity {} reached dangling child {}",
                    entity.raw(),
                    current.raw()
                );
                continue;
            };
            if !record.is_live() {
                continue;
            }
            record.deleted_at = Some(tick);
            record.last_modified = record.last_modified.max(tick);
            stack.extend(record.children.iter().rev().copied());
            self.events.push(WorldEvent::Deleted { entity: current });
        }
        Ok(())
    }

    /// Physically removes tombstones older than `now`, freeing their
    /// identities' records (the ids themselves are never reissued).
    pub fn cull_tombstones(&mut self, now: Tick) {
        self.entities
            .retain(|_, record| record.deleted_at.map_or(true, |deleted| deleted >= now));
    }

    /// Drains the buffered mutation events in order.
    pub fn take_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn live_record(&self, entity: EntityId) -> WorldResult<&EntityRecord> {
        self.entities
            .get(&entity)
            .filter(|record| record.is_live())
            .ok_or(WorldError::UnknownEntity { entity })
    }

    pub(crate) fn live_record_mut(&mut self, entity: EntityId) -> WorldResult<&mut EntityRecord> {
        self.entities
            .get_mut(&entity)
            .filter(|record| record.is_live())
            .ok_or(WorldError::UnknownEntity { entity })
    }

    pub(crate) fn push_event(&mut self, event: WorldEvent) {
        self.events.push(event);
    }

    /// Walks up from `candidate_parent`; finding `entity` on the way up
    /// means the reparent would close a loop.
    fn check_no_cycle(&self, entity: EntityId, candidate_parent: EntityId) -> WorldResult<()> {
        let mut current = Some(candidate_parent);
        let mut depth = 0;
        while let Some(ancestor) = current {
            if ancestor == entity {
                return Err(WorldError::ParentCycle {
                    entity,
                    parent: candidate_parent,
                });
            }
            depth += 1;
            if depth > MAX_PARENT_DEPTH {
                return Err(WorldError::ParentChainTooDeep { entity, depth });
            }
            current = self
                .entities
                .get(&ancestor)
                .and_then(|record| record.parent);
        }
        Ok(())
    }
}
