//! The chunk table and its query/maintenance operations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use base::{ChunkCoord, ChunkKey, EntityId, MapId, Rect, Tick, Vec2};

use crate::config::GridConfig;

/// One chunk's live state: contained entities, last-modified tick, and
/// the number of viewers currently referencing it.
#[derive(Debug, Clone, Default)]
struct Chunk {
    entities: BTreeSet<EntityId>,
    modified: Tick,
    pins: u32,
}

/// Chunked 2D index over entity origins.
///
/// Exclusively owns the chunk table. Entities keep only a weak
/// back-reference (their current [`ChunkKey`], stored here in
/// `locations`) used for fast removal.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    config: GridConfig,
    chunks: HashMap<ChunkKey, Chunk>,
    locations: HashMap<EntityId, ChunkKey>,
    /// Union-of-bounds registry for entities whose visibility reach
    /// exceeds a chunk; consulted by every overlapping query.
    extended: BTreeMap<EntityId, (MapId, Rect)>,
    /// Entities sent to everyone regardless of position.
    globals: BTreeSet<EntityId>,
    /// Chunks that went empty this tick, retired by `process_evictions`.
    pending_evictions: Vec<ChunkKey>,
}

impl SpatialIndex {
    /// Creates an index. An invalid chunk size is replaced with the
    /// default and logged; a broken config must not poison every
    /// coordinate computation afterwards.
    #[must_use]
    pub fn new(config: GridConfig) -> Self {
        let config = if config.is_valid() {
            config
        } else {
            log::error!(
                "invalid grid config (chunk_size {}), falling back to default",
                config.chunk_size
            );
            GridConfig {
                chunk_size: GridConfig::default().chunk_size,
                ..config
            }
        };
        Self {
            config,
            chunks: HashMap::new(),
            locations: HashMap::new(),
            extended: BTreeMap::new(),
            globals: BTreeSet::new(),
            pending_evictions: Vec::new(),
        }
    }

    /// The configured chunk side length.
    #[must_use]
    pub fn chunk_size(&self) -> f32 {
        self.config.chunk_size
    }

    /// Number of live chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns `true` if no entities are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Inserts an entity at `position`, creating its chunk if absent.
    ///
    /// No-op (logged) if the entity is already tracked; callers must use
    /// [`Self::move_to`] for position changes. No-op (logged) for
    /// non-finite positions.
    pub fn insert(&mut self, entity: EntityId, map: MapId, position: Vec2, tick: Tick) {
        if !position.is_finite() {
            log::error!(
                "rejecting insert of entity {} at non-finite position ({}, {})",
                entity.raw(),
                position.x,
                position.y
            );
            return;
        }
        if let Some(existing) = self.locations.get(&entity) {
            log::warn!(
                "insert of already-tracked entity {} (in chunk {:?}); use move_to",
                entity.raw(),
                existing.coord
            );
            return;
        }

        let key = self.key_at(map, position);
        let chunk = self.chunks.entry(key).or_default();
        chunk.entities.insert(entity);
        chunk.modified = chunk.modified.max(tick);
        self.locations.insert(entity, key);
    }

    /// Moves a tracked entity to `new_position` on its current map.
    ///
    /// No-op if the chunk coordinate is unchanged (attribute-change tick
    /// refreshes go through dirty propagation, not here). Untracked
    /// entities are rejected and logged; a missed insert elsewhere must
    /// not be papered over here.
    pub fn move_to(&mut self, entity: EntityId, new_position: Vec2, tick: Tick) {
        if !new_position.is_finite() {
            log::error!(
                "rejecting move of entity {} to non-finite position ({}, {})",
                entity.raw(),
                new_position.x,
                new_position.y
            );
            return;
        }
        let Some(&old_key) = self.locations.get(&entity) else {
            log::error!("move of untracked entity {}", entity.raw());
            return;
        };

        let new_key = self.key_at(old_key.map, new_position);
        if new_key == old_key {
            return;
        }

        self.remove_from_chunk(entity, old_key, tick);
        let chunk = self.chunks.entry(new_key).or_default();
        chunk.entities.insert(entity);
        chunk.modified = chunk.modified.max(tick);
        self.locations.insert(entity, new_key);
    }

    /// Removes an entity from the index along with its extended bounds
    /// and global override. Idempotent: removal races with cleanup, so
    /// an already-absent entity is a silent no-op.
    pub fn remove(&mut self, entity: EntityId, tick: Tick) {
        self.extended.remove(&entity);
        self.globals.remove(&entity);
        if let Some(key) = self.locations.remove(&entity) {
            self.remove_from_chunk(entity, key, tick);
        }
    }

    /// Bumps the modified tick of the chunk holding `entity`. Returns
    /// the chunk key, or `None` if the entity is not tracked.
    pub fn touch(&mut self, entity: EntityId, tick: Tick) -> Option<ChunkKey> {
        let key = *self.locations.get(&entity)?;
        self.touch_chunk(key, tick);
        Some(key)
    }

    /// Bumps a chunk's modified tick to `max(current, tick)`.
    pub fn touch_chunk(&mut self, key: ChunkKey, tick: Tick) {
        if let Some(chunk) = self.chunks.get_mut(&key) {
            chunk.modified = chunk.modified.max(tick);
        }
    }

    /// A chunk's last-modified tick, if the chunk exists.
    #[must_use]
    pub fn chunk_tick(&self, key: ChunkKey) -> Option<Tick> {
        self.chunks.get(&key).map(|chunk| chunk.modified)
    }

    /// Entities currently in a chunk, in id order.
    pub fn chunk_entities(&self, key: ChunkKey) -> impl Iterator<Item = EntityId> + '_ {
        self.chunks
            .get(&key)
            .into_iter()
            .flat_map(|chunk| chunk.entities.iter().copied())
    }

    /// The chunk an entity currently occupies.
    #[must_use]
    pub fn location_of(&self, entity: EntityId) -> Option<ChunkKey> {
        self.locations.get(&entity).copied()
    }

    /// Marks a chunk as referenced by a viewer, blocking eviction.
    pub fn pin_chunk(&mut self, key: ChunkKey) {
        if let Some(chunk) = self.chunks.get_mut(&key) {
            chunk.pins += 1;
        }
    }

    /// Releases one viewer reference; an empty unpinned chunk becomes
    /// eligible for eviction at end of tick.
    pub fn unpin_chunk(&mut self, key: ChunkKey) {
        if let Some(chunk) = self.chunks.get_mut(&key) {
            chunk.pins = chunk.pins.saturating_sub(1);
            if chunk.pins == 0 && chunk.entities.is_empty() {
                self.pending_evictions.push(key);
            }
        }
    }

    /// Existing chunks overlapping `rect`, with their modified ticks,
    /// in coordinate order.
    #[must_use]
    pub fn query_chunks(&self, map: MapId, rect: &Rect) -> Vec<(ChunkKey, Tick)> {
        if !rect.is_finite() {
            log::error!("rejecting chunk query over non-finite rect");
            return Vec::new();
        }
        let mut out = Vec::new();
        for coord in ChunkCoord::covering(rect, self.config.chunk_size) {
            let key = ChunkKey::new(map, coord);
            if let Some(chunk) = self.chunks.get(&key) {
                out.push((key, chunk.modified));
            }
        }
        out
    }

    /// All entities in chunks overlapping `rect`, plus extended-bounds
    /// entities intersecting it, in id order. Chunk-granular: callers
    /// needing exactness intersect against actual entity bounds.
    #[must_use]
    pub fn query_rect(&self, map: MapId, rect: &Rect) -> Vec<EntityId> {
        if !rect.is_finite() {
            log::error!("rejecting rect query over non-finite rect");
            return Vec::new();
        }
        let mut found = BTreeSet::new();
        for coord in ChunkCoord::covering(rect, self.config.chunk_size) {
            if let Some(chunk) = self.chunks.get(&ChunkKey::new(map, coord)) {
                found.extend(chunk.entities.iter().copied());
            }
        }
        for entity in self.extended_in(map, rect) {
            found.insert(entity);
        }
        if found.len() > self.config.query_warn_threshold {
            log::warn!(
                "rect query on map {} returned {} candidates (threshold {}); consider larger chunks or a smaller radius",
                map.raw(),
                found.len(),
                self.config.query_warn_threshold
            );
        }
        found.into_iter().collect()
    }

    /// Registers (or widens) an entity's extended visibility bounds.
    /// Multiple registrations union together; a map change resets the
    /// rect outright.
    pub fn set_extended_bounds(&mut self, entity: EntityId, map: MapId, bounds: Rect) {
        if !bounds.is_finite() {
            log::error!(
                "rejecting non-finite extended bounds for entity {}",
                entity.raw()
            );
            return;
        }
        match self.extended.get_mut(&entity) {
            Some((existing_map, existing)) if *existing_map == map => {
                *existing = existing.union(&bounds);
            }
            _ => {
                self.extended.insert(entity, (map, bounds));
            }
        }
    }

    /// Drops an entity's extended bounds.
    pub fn clear_extended_bounds(&mut self, entity: EntityId) {
        self.extended.remove(&entity);
    }

    /// Extended-bounds entities on `map` whose bounds intersect `rect`,
    /// in id order.
    #[must_use]
    pub fn extended_in(&self, map: MapId, rect: &Rect) -> Vec<EntityId> {
        self.extended
            .iter()
            .filter(|(_, (entity_map, bounds))| *entity_map == map && bounds.intersects(rect))
            .map(|(entity, _)| *entity)
            .collect()
    }

    /// Marks an entity as always sent to every viewer.
    pub fn set_global(&mut self, entity: EntityId) {
        self.globals.insert(entity);
    }

    /// Clears an entity's global-override flag.
    pub fn clear_global(&mut self, entity: EntityId) {
        self.globals.remove(&entity);
    }

    /// Entities flagged as global overrides, in id order.
    pub fn globals(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.globals.iter().copied()
    }

    /// Retires chunks that went empty and have no viewer references.
    /// Called once per tick, after all queries for the tick completed.
    pub fn process_evictions(&mut self) {
        let pending = std::mem::take(&mut self.pending_evictions);
        for key in pending {
            let evict = self
                .chunks
                .get(&key)
                .is_some_and(|chunk| chunk.entities.is_empty() && chunk.pins == 0);
            if evict {
                self.chunks.remove(&key);
            }
        }
    }

    fn key_at(&self, map: MapId, position: Vec2) -> ChunkKey {
        ChunkKey::new(map, ChunkCoord::at(position, self.config.chunk_size))
    }

    fn remove_from_chunk(&mut self, entity: EntityId, key: ChunkKey, tick: Tick) {
        if let Some(chunk) = self.chunks.get_mut(&key) {
            chunk.entities.remove(&entity);
            chunk.modified = chunk.modified.max(tick);
            if chunk.entities.is_empty() && chunk.pins == 0 {
                self.pending_evictions.push(key);
            }
        }
    }
}
