//! The per-tick replication scheduler.
//!
//! For every active viewer the scheduler queries the spatial index for
//! chunks inside the viewer's interest regions, skips chunks the viewer
//! is already synced through, classifies every remaining candidate
//! entity as entered, updated, or unchanged, and finally sweeps the
//! viewer's known set for entities that left view or were destroyed.
//!
//! Classification is memoized per viewer per tick and recurses into
//! parents first, which is what guarantees the parent-before-child
//! ordering inside each batch.

use std::collections::{BTreeMap, BTreeSet};

use base::{ChunkKey, EntityId, MapId, Rect, Tick, Vec2, ViewerId, VisMask};
use grid::SpatialIndex;
use view::ViewerTracker;
use world::{EntityTable, MAX_PARENT_DEPTH};

use crate::batch::{Notice, TickOutput, ViewerBatch};
use crate::config::ReplicationConfig;

/// One circular interest region, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterestRegion {
    pub map: MapId,
    pub center: Vec2,
    pub radius: f32,
}

impl InterestRegion {
    fn rect(&self) -> Rect {
        Rect::around(self.center, self.radius)
    }

    fn is_finite(&self) -> bool {
        self.center.is_finite() && self.radius.is_finite() && self.radius >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Closing,
}

#[derive(Debug, Clone)]
struct ViewerEntry {
    phase: Phase,
    regions: Vec<InterestRegion>,
    channels: VisMask,
    /// Chunks this viewer currently holds pinned in the index.
    pinned: BTreeSet<ChunkKey>,
}

impl ViewerEntry {
    fn new() -> Self {
        Self {
            phase: Phase::Active,
            regions: Vec::new(),
            channels: VisMask::NONE,
            pinned: BTreeSet::new(),
        }
    }
}

/// Diffs world state against viewer state, once per tick.
#[derive(Debug, Clone)]
pub struct ReplicationScheduler {
    config: ReplicationConfig,
    viewers: BTreeMap<ViewerId, ViewerEntry>,
}

impl ReplicationScheduler {
    /// Creates a scheduler. An invalid config is replaced by the
    /// default so the tick loop can always make progress.
    #[must_use]
    pub fn new(config: ReplicationConfig) -> Self {
        let config = if config.is_valid() {
            config
        } else {
            log::error!("invalid replication config {config:?}, falling back to defaults");
            ReplicationConfig::default()
        };
        Self {
            config,
            viewers: BTreeMap::new(),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Number of viewers, closing ones included.
    #[must_use]
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Registers a viewer with no regions and no extra channels. A
    /// reconnect before the closing sweep revives the old entry.
    pub fn connect_viewer(&mut self, viewer: ViewerId, tracker: &mut ViewerTracker) {
        let entry = self.viewers.entry(viewer).or_insert_with(ViewerEntry::new);
        entry.phase = Phase::Active;
        tracker.add_viewer(viewer);
    }

    /// Marks a viewer as closing. Its state is torn down at the start
    /// of the next tick and nothing further is emitted for it.
    pub fn disconnect_viewer(&mut self, viewer: ViewerId) {
        if let Some(entry) = self.viewers.get_mut(&viewer) {
            entry.phase = Phase::Closing;
        }
    }

    /// Replaces a viewer's interest regions. Non-finite regions are
    /// dropped individually; the rest still apply.
    pub fn set_viewer_regions(&mut self, viewer: ViewerId, regions: Vec<InterestRegion>) {
        let Some(entry) = self.viewers.get_mut(&viewer) else {
            log::warn!("ignoring regions for unknown viewer {}", viewer.raw());
            return;
        };
        entry.regions = regions
            .into_iter()
            .filter(|region| {
                if region.is_finite() {
                    true
                } else {
                    log::error!(
                        "rejecting non-finite interest region for viewer {}",
                        viewer.raw()
                    );
                    false
                }
            })
            .collect();
    }

    /// Sets the channel bits this viewer is subscribed to. Baseline
    /// entities stay visible regardless.
    pub fn set_viewer_channels(&mut self, viewer: ViewerId, channels: VisMask) {
        if let Some(entry) = self.viewers.get_mut(&viewer) {
            entry.channels = channels;
        } else {
            log::warn!("ignoring channels for unknown viewer {}", viewer.raw());
        }
    }

    /// Runs one scheduling pass at `tick` and returns the per-viewer
    /// batches. Closing viewers are swept first and never appear in the
    /// output.
    pub fn run_tick(
        &mut self,
        tick: Tick,
        world: &EntityTable,
        index: &mut SpatialIndex,
        tracker: &mut ViewerTracker,
    ) -> TickOutput {
        let closing: Vec<ViewerId> = self
            .viewers
            .iter()
            .filter(|(_, entry)| entry.phase == Phase::Closing)
            .map(|(viewer, _)| *viewer)
            .collect();
        for viewer in closing {
            if let Some(entry) = self.viewers.remove(&viewer) {
                for key in entry.pinned {
                    index.unpin_chunk(key);
                }
            }
            tracker.drop_viewer(viewer);
            log::debug!("viewer {} torn down", viewer.raw());
        }

        let budget = self.config.new_entity_budget;
        let mut batches = Vec::with_capacity(self.viewers.len());
        for (&viewer, entry) in &mut self.viewers {
            let notices = run_viewer(viewer, entry, tick, budget, world, index, tracker);
            batches.push(ViewerBatch { viewer, notices });
        }
        TickOutput { tick, batches }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Visible; any needed notice was emitted.
    Sent,
    /// Not visible to this viewer (mask, absence, or hidden parent).
    Hidden,
    /// Over the entry budget this tick; retried next tick.
    Deferred,
    /// Consistency error; skipped this tick, retried next tick.
    Failed,
}

struct ViewerPass<'a> {
    viewer: ViewerId,
    tick: Tick,
    channels: VisMask,
    budget: usize,
    world: &'a EntityTable,
    tracker: &'a mut ViewerTracker,
    memo: BTreeMap<EntityId, Outcome>,
    seen: BTreeSet<EntityId>,
    notices: Vec<Notice>,
    entered: usize,
}

impl ViewerPass<'_> {
    /// Classifies one entity, recursing into its parent first so the
    /// parent's notice lands earlier in the batch.
    fn classify(&mut self, entity: EntityId, depth: usize) -> Outcome {
        if let Some(&outcome) = self.memo.get(&entity) {
            return outcome;
        }
        if depth > MAX_PARENT_DEPTH {
            log::error!(
                "viewer {}: parent chain through entity {} exceeds depth {}",
                self.viewer.raw(),
                entity.raw(),
                MAX_PARENT_DEPTH
            );
            return self.settle(entity, Outcome::Failed);
        }
        let Some(record) = self.world.get(entity) else {
            // Removed between query and processing; the known-set sweep
            // handles any leave notice.
            return self.settle(entity, Outcome::Hidden);
        };
        if !record.is_live() {
            return self.settle(entity, Outcome::Hidden);
        }

        // A child cannot be attached before its parent exists on the
        // viewer's side, so the parent is pulled in even when it sits
        // outside every interest region.
        if let Some(parent) = record.parent() {
            match self.classify(parent, depth + 1) {
                Outcome::Sent => {}
                outcome @ (Outcome::Hidden | Outcome::Deferred | Outcome::Failed) => {
                    return self.settle(entity, outcome);
                }
            }
        }

        let effective = match self.world.effective_mask(entity) {
            Ok(mask) => mask,
            Err(err) => {
                log::error!(
                    "viewer {}: skipping entity {}: {err}",
                    self.viewer.raw(),
                    entity.raw()
                );
                return self.settle(entity, Outcome::Failed);
            }
        };
        if !effective.visible_to(self.channels) {
            return self.settle(entity, Outcome::Hidden);
        }

        match self.tracker.entity_seen_tick(self.viewer, entity) {
            None => {
                if self.entered >= self.budget {
                    return self.settle(entity, Outcome::Deferred);
                }
                self.entered += 1;
                self.notices.push(Notice::Entered {
                    entity,
                    parent: record.parent(),
                });
                self.tracker.record_entity_seen(self.viewer, entity, self.tick);
            }
            Some(seen) => {
                if record.last_modified() > seen {
                    self.notices.push(Notice::Updated { entity, since: seen });
                    self.tracker.record_entity_seen(self.viewer, entity, self.tick);
                }
            }
        }
        self.seen.insert(entity);
        self.settle(entity, Outcome::Sent)
    }

    /// Records the outcome. Deferred and failed entities the viewer
    /// already knows are kept in the seen set so the sweep does not
    /// turn a retry into a leave notice.
    fn settle(&mut self, entity: EntityId, outcome: Outcome) -> Outcome {
        if matches!(outcome, Outcome::Deferred | Outcome::Failed)
            && self.tracker.entity_seen_tick(self.viewer, entity).is_some()
        {
            self.seen.insert(entity);
        }
        self.memo.insert(entity, outcome);
        outcome
    }
}

fn run_viewer(
    viewer: ViewerId,
    entry: &mut ViewerEntry,
    tick: Tick,
    budget: usize,
    world: &EntityTable,
    index: &mut SpatialIndex,
    tracker: &mut ViewerTracker,
) -> Vec<Notice> {
    // Candidate chunks across all regions, with their modified ticks.
    let mut candidates: BTreeMap<ChunkKey, Tick> = BTreeMap::new();
    let mut extended: BTreeSet<EntityId> = BTreeSet::new();
    for region in &entry.regions {
        let rect = region.rect();
        for (key, modified) in index.query_chunks(region.map, &rect) {
            candidates.insert(key, modified);
        }
        extended.extend(index.extended_in(region.map, &rect));
    }

    let mut pass = ViewerPass {
        viewer,
        tick,
        channels: entry.channels,
        budget,
        world,
        tracker: &mut *tracker,
        memo: BTreeMap::new(),
        seen: BTreeSet::new(),
        notices: Vec::new(),
        entered: 0,
    };

    for (&key, &modified) in &candidates {
        if let Some(synced) = pass.tracker.chunk_seen_tick(viewer, key) {
            if synced >= modified {
                // Fully synced chunk: everything in it counts as seen
                // without re-classification.
                pass.seen.extend(index.chunk_entities(key));
                continue;
            }
        }
        let mut clean = true;
        for entity in index.chunk_entities(key) {
            match pass.classify(entity, 0) {
                Outcome::Sent | Outcome::Hidden => {}
                Outcome::Deferred | Outcome::Failed => clean = false,
            }
        }
        // An unclean chunk keeps its stale sync tick and is re-scanned
        // next tick.
        if clean {
            pass.tracker.record_chunk_seen(viewer, key, modified);
        }
    }

    for entity in extended.iter().copied().chain(index.globals()) {
        pass.classify(entity, 0);
    }

    // Sweep: everything the viewer knows that was not accounted for
    // this tick has left view or no longer exists.
    let known: Vec<EntityId> = pass.tracker.known_entities(viewer).collect();
    for entity in known {
        if pass.seen.contains(&entity) {
            continue;
        }
        let gone = world.get(entity).map_or(true, |record| !record.is_live());
        pass.notices.push(if gone {
            Notice::Destroyed { entity }
        } else {
            Notice::Left { entity }
        });
        pass.tracker.forget_entity(viewer, entity);
    }
    let notices = pass.notices;

    // Re-pin to the current candidate set; out-of-range chunks lose
    // their sync state so re-entry does a full resync.
    let desired: BTreeSet<ChunkKey> = candidates.keys().copied().collect();
    for key in desired.difference(&entry.pinned) {
        index.pin_chunk(*key);
    }
    for key in entry.pinned.difference(&desired) {
        index.unpin_chunk(*key);
        tracker.forget_chunk(viewer, *key);
    }
    entry.pinned = desired;

    notices
}
