//! Dirty propagation from entity mutations into chunk modified ticks.

use std::collections::BTreeSet;

use base::{EntityId, Tick};
use grid::SpatialIndex;
use world::EntityTable;

/// Marks `entity`'s chunk (and the chunk of every descendant) modified
/// at `tick`.
///
/// A parent's replicated change can alter what should be sent about its
/// children even when the children themselves did not change, so the
/// fan-out covers the whole subtree. The walk is bounded by
/// `fanout_limit`; hitting the bound means the child links are corrupt
/// and the remainder is skipped with an error log.
pub fn mark_changed(
    world: &EntityTable,
    index: &mut SpatialIndex,
    entity: EntityId,
    tick: Tick,
    fanout_limit: usize,
) {
    let mut visited = BTreeSet::new();
    let mut stack = vec![entity];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            log::error!(
                "dirty fan-out from entity {} revisited entity {}; child links are corrupt",
                entity.raw(),
                current.raw()
            );
            continue;
        }
        if visited.len() > fanout_limit {
            log::error!(
                "dirty fan-out from entity {} exceeded {} entities; skipping the rest",
                entity.raw(),
                fanout_limit
            );
            return;
        }
        // Entities without a chunk (not yet inserted, or already
        // removed) still pass the change down to located descendants.
        index.touch(current, tick);
        if let Some(record) = world.get(current) {
            stack.extend(record.children().iter().copied());
        }
    }
}
