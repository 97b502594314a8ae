//! Per-viewer bookkeeping: what each viewer has already been told.
//!
//! The tracker remembers, for every viewer, which chunks it has been
//! brought up to date on (and through which tick) and which entities it
//! currently knows about. The replication scheduler consults it to
//! decide between enter, update, and leave notices; nothing here looks
//! at world state.

use std::collections::BTreeMap;

use base::{ChunkKey, EntityId, Tick, ViewerId};

#[derive(Debug, Clone, Default)]
struct ViewerState {
    /// Chunk -> last world tick this viewer was synced through.
    known_chunks: BTreeMap<ChunkKey, Tick>,
    /// Entity -> tick of the last state this viewer received for it.
    known_entities: BTreeMap<EntityId, Tick>,
}

/// Tracks known chunks and entities for every connected viewer.
#[derive(Debug, Clone, Default)]
pub struct ViewerTracker {
    viewers: BTreeMap<ViewerId, ViewerState>,
}

impl ViewerTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked viewers.
    #[must_use]
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Returns `true` if `viewer` is tracked.
    #[must_use]
    pub fn contains(&self, viewer: ViewerId) -> bool {
        self.viewers.contains_key(&viewer)
    }

    /// Starts tracking a viewer with empty knowledge. Re-adding an
    /// existing viewer is a no-op and keeps its state.
    pub fn add_viewer(&mut self, viewer: ViewerId) {
        self.viewers.entry(viewer).or_default();
    }

    /// Drops a viewer and all its knowledge.
    pub fn drop_viewer(&mut self, viewer: ViewerId) {
        self.viewers.remove(&viewer);
    }

    /// The tick `viewer` was last synced through for `chunk`, if it has
    /// seen the chunk at all.
    #[must_use]
    pub fn chunk_seen_tick(&self, viewer: ViewerId, chunk: ChunkKey) -> Option<Tick> {
        self.viewers.get(&viewer)?.known_chunks.get(&chunk).copied()
    }

    /// Records that `viewer` has been synced through `tick` for
    /// `chunk`. Seen ticks only move forward.
    pub fn record_chunk_seen(&mut self, viewer: ViewerId, chunk: ChunkKey, tick: Tick) {
        let Some(state) = self.viewers.get_mut(&viewer) else {
            return;
        };
        let seen = state.known_chunks.entry(chunk).or_insert(tick);
        *seen = (*seen).max(tick);
    }

    /// Forgets `chunk` for `viewer`, forcing a full resync if the chunk
    /// ever comes back into range.
    pub fn forget_chunk(&mut self, viewer: ViewerId, chunk: ChunkKey) {
        if let Some(state) = self.viewers.get_mut(&viewer) {
            state.known_chunks.remove(&chunk);
        }
    }

    /// Chunks `viewer` currently has sync state for, in key order.
    pub fn known_chunks(&self, viewer: ViewerId) -> impl Iterator<Item = ChunkKey> + '_ {
        self.viewers
            .get(&viewer)
            .into_iter()
            .flat_map(|state| state.known_chunks.keys().copied())
    }

    /// The last state tick `viewer` received for `entity`, if known.
    #[must_use]
    pub fn entity_seen_tick(&self, viewer: ViewerId, entity: EntityId) -> Option<Tick> {
        self.viewers
            .get(&viewer)?
            .known_entities
            .get(&entity)
            .copied()
    }

    /// Records that `viewer` received `entity` state through `tick`.
    pub fn record_entity_seen(&mut self, viewer: ViewerId, entity: EntityId, tick: Tick) {
        let Some(state) = self.viewers.get_mut(&viewer) else {
            return;
        };
        let seen = state.known_entities.entry(entity).or_insert(tick);
        *seen = (*seen).max(tick);
    }

    /// Forgets `entity` for `viewer`. The next time the entity is in
    /// view it is treated as newly entered.
    pub fn forget_entity(&mut self, viewer: ViewerId, entity: EntityId) {
        if let Some(state) = self.viewers.get_mut(&viewer) {
            state.known_entities.remove(&entity);
        }
    }

    /// Entities `viewer` currently knows, in id order.
    pub fn known_entities(&self, viewer: ViewerId) -> impl Iterator<Item = EntityId> + '_ {
        self.viewers
            .get(&viewer)
            .into_iter()
            .flat_map(|state| state.known_entities.keys().copied())
    }
}
