//! One world shard: entity arena, spatial index, viewer tracking, and
//! the scheduler, driven by a single serial tick loop.

use base::{EntityId, MapId, Rect, Tick, Vec2, ViewerId, VisMask};
use grid::{GridConfig, SpatialIndex};
use view::ViewerTracker;
use world::{EntityTable, WorldEvent, WorldResult};

use crate::batch::TickOutput;
use crate::config::ReplicationConfig;
use crate::dirty;
use crate::scheduler::{InterestRegion, ReplicationScheduler};

/// Owns all replication state for one shard. Every mutation is stamped
/// with the upcoming tick and becomes visible to viewers when
/// [`Shard::run_tick`] runs.
#[derive(Debug)]
pub struct Shard {
    world: EntityTable,
    index: SpatialIndex,
    tracker: ViewerTracker,
    scheduler: ReplicationScheduler,
    tick: Tick,
}

impl Shard {
    /// Creates an empty shard at tick zero.
    #[must_use]
    pub fn new(grid: GridConfig, replication: ReplicationConfig) -> Self {
        Self {
            world: EntityTable::new(),
            index: SpatialIndex::new(grid),
            tracker: ViewerTracker::new(),
            scheduler: ReplicationScheduler::new(replication),
            tick: Tick::new(0),
        }
    }

    /// The last completed tick.
    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Read access to the entity arena.
    #[must_use]
    pub fn world(&self) -> &EntityTable {
        &self.world
    }

    /// Read access to the spatial index.
    #[must_use]
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Read access to the viewer tracker.
    #[must_use]
    pub fn tracker(&self) -> &ViewerTracker {
        &self.tracker
    }

    /// The tick mutations made now will be stamped with.
    fn pending(&self) -> Tick {
        self.tick.next()
    }

    /// Spawns an entity; it becomes visible to viewers on the next
    /// [`Self::run_tick`].
    pub fn spawn(
        &mut self,
        map: MapId,
        position: Vec2,
        parent: Option<EntityId>,
    ) -> WorldResult<EntityId> {
        let tick = self.pending();
        self.world.spawn(map, position, parent, tick)
    }

    /// Moves an entity.
    pub fn set_position(&mut self, entity: EntityId, position: Vec2) -> WorldResult<()> {
        let tick = self.pending();
        self.world.set_position(entity, position, tick)
    }

    /// Rotates an entity in place.
    pub fn set_rotation(&mut self, entity: EntityId, rotation: f32) -> WorldResult<()> {
        let tick = self.pending();
        self.world.set_rotation(entity, rotation, tick)
    }

    /// Marks an opaque replicated attribute of the entity as changed.
    pub fn mark_changed(&mut self, entity: EntityId) -> WorldResult<()> {
        let tick = self.pending();
        self.world.mark_changed(entity, tick)
    }

    /// Moves an entity under a new parent (or to the map root).
    pub fn reparent(&mut self, entity: EntityId, parent: Option<EntityId>) -> WorldResult<()> {
        let tick = self.pending();
        self.world.reparent(entity, parent, tick)
    }

    /// Deletes an entity and its subtree. Viewers that knew any of them
    /// receive a destroy notice on the next tick.
    pub fn delete(&mut self, entity: EntityId) -> WorldResult<()> {
        let tick = self.pending();
        self.world.mark_deleted(entity, tick)
    }

    /// Sets an entity's own visibility mask contribution.
    pub fn set_own_mask(&mut self, entity: EntityId, mask: VisMask) -> WorldResult<()> {
        let tick = self.pending();
        self.world.set_own_mask(entity, mask, tick)
    }

    /// Clears an entity's own visibility mask contribution.
    pub fn clear_own_mask(&mut self, entity: EntityId) -> WorldResult<()> {
        let tick = self.pending();
        self.world.clear_own_mask(entity, tick)
    }

    /// Registers (widening on repeat calls) an entity's extended
    /// visibility bounds, for entities relevant beyond their own chunk.
    pub fn set_extended_bounds(&mut self, entity: EntityId, map: MapId, bounds: Rect) {
        self.index.set_extended_bounds(entity, map, bounds);
    }

    /// Drops an entity's extended visibility bounds.
    pub fn clear_extended_bounds(&mut self, entity: EntityId) {
        self.index.clear_extended_bounds(entity);
    }

    /// Marks an entity as relevant to every viewer everywhere.
    pub fn set_global(&mut self, entity: EntityId) {
        self.index.set_global(entity);
    }

    /// Clears an entity's global-override flag.
    pub fn clear_global(&mut self, entity: EntityId) {
        self.index.clear_global(entity);
    }

    /// Connects a viewer with no regions and baseline-only channels.
    pub fn connect_viewer(&mut self, viewer: ViewerId) {
        self.scheduler.connect_viewer(viewer, &mut self.tracker);
    }

    /// Disconnects a viewer; its state is torn down next tick and any
    /// pending deltas are discarded.
    pub fn disconnect_viewer(&mut self, viewer: ViewerId) {
        self.scheduler.disconnect_viewer(viewer);
    }

    /// Replaces a viewer's interest regions.
    pub fn set_viewer_regions(&mut self, viewer: ViewerId, regions: Vec<InterestRegion>) {
        self.scheduler.set_viewer_regions(viewer, regions);
    }

    /// Sets a viewer's channel subscription bits.
    pub fn set_viewer_channels(&mut self, viewer: ViewerId, channels: VisMask) {
        self.scheduler.set_viewer_channels(viewer, channels);
    }

    /// Advances one tick: applies buffered world mutations to the
    /// spatial index, propagates dirtiness, runs the scheduler, then
    /// evicts dead chunks and culls expired tombstones.
    pub fn run_tick(&mut self) -> TickOutput {
        self.tick = self.tick.next();
        let tick = self.tick;
        let fanout = self.scheduler.config().dirty_fanout_limit;

        for event in self.world.take_events() {
            match event {
                WorldEvent::Spawned {
                    entity,
                    map,
                    position,
                } => {
                    self.index.insert(entity, map, position, tick);
                    dirty::mark_changed(&self.world, &mut self.index, entity, tick, fanout);
                }
                WorldEvent::Moved { entity, position } => {
                    self.index.move_to(entity, position, tick);
                    dirty::mark_changed(&self.world, &mut self.index, entity, tick, fanout);
                }
                WorldEvent::Reparented { entity, .. }
                | WorldEvent::MaskChanged { entity }
                | WorldEvent::Changed { entity } => {
                    dirty::mark_changed(&self.world, &mut self.index, entity, tick, fanout);
                }
                WorldEvent::Deleted { entity } => {
                    self.index.remove(entity, tick);
                }
            }
        }

        let output = self
            .scheduler
            .run_tick(tick, &self.world, &mut self.index, &mut self.tracker);

        self.index.process_evictions();
        self.world.cull_tombstones(tick);
        output
    }
}
