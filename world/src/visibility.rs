//! Visibility masks over the parent forest.
//!
//! An entity's effective mask is the OR of every explicitly-set mask on
//! its ancestor chain, itself included. A chain with no explicit mask
//! anywhere resolves to [`VisMask::ALWAYS`]. Masks are resolved fresh on
//! every call; the chain walk is short and caching it invalidates badly
//! under reparenting.

use base::{EntityId, Tick, VisMask};

use crate::arena::{EntityTable, MAX_PARENT_DEPTH};
use crate::error::{WorldError, WorldResult};
use crate::events::WorldEvent;

impl EntityTable {
    /// Resolves the effective visibility mask for `entity` by walking
    /// its ancestor chain.
    pub fn effective_mask(&self, entity: EntityId) -> WorldResult<VisMask> {
        let mut accumulated = VisMask::NONE;
        let mut current = entity;
        let mut depth = 0;
        loop {
            let record = self.live_record(current).map_err(|_| {
                if current == entity {
                    WorldError::UnknownEntity { entity }
                } else {
                    WorldError::DanglingParent {
                        entity,
                        parent: current,
                    }
                }
            })?;
            if let Some(own) = record.own_mask {
                accumulated = accumulated | own;
            }
            match record.parent() {
                Some(parent) => {
                    depth += 1;
                    if depth > MAX_PARENT_DEPTH {
                        return Err(WorldError::ParentChainTooDeep { entity, depth });
                    }
                    current = parent;
                }
                None => break,
            }
        }
        if accumulated.is_empty() {
            Ok(VisMask::ALWAYS)
        } else {
            Ok(accumulated)
        }
    }

    /// The mask explicitly set on this entity, ignoring ancestors.
    pub fn own_mask(&self, entity: EntityId) -> WorldResult<Option<VisMask>> {
        Ok(self.live_record(entity)?.own_mask)
    }

    /// Sets an explicit mask on `entity`. The change affects the whole
    /// subtree's effective masks, so every descendant is marked changed.
    pub fn set_own_mask(&mut self, entity: EntityId, mask: VisMask, tick: Tick) -> WorldResult<()> {
        self.live_record_mut(entity)?.own_mask = Some(mask);
        self.touch_mask_subtree(entity, tick);
        Ok(())
    }

    /// Removes the explicit mask on `entity`, letting ancestors (or the
    /// baseline) decide again.
    pub fn clear_own_mask(&mut self, entity: EntityId, tick: Tick) -> WorldResult<()> {
        self.live_record_mut(entity)?.own_mask = None;
        self.touch_mask_subtree(entity, tick);
        Ok(())
    }

    /// Bumps watermarks and emits `MaskChanged` for `entity` and every
    /// live descendant, parent before child.
    fn touch_mask_subtree(&mut self, entity: EntityId, tick: Tick) {
        let mut stack = vec![entity];
        while let Some(current) = stack.pop() {
            let Ok(record) = self.live_record_mut(current) else {
                continue;
            };
            record.last_modified = record.last_modified.max(tick);
            let children: Vec<EntityId> = record.children().to_vec();
            stack.extend(children.into_iter().rev());
            self.push_event(WorldEvent::MaskChanged { entity: current });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::{MapId, Vec2};

    const MAP: MapId = MapId::new(1);
    const T1: Tick = Tick::new(1);

    #[test]
    fn unset_chain_resolves_to_baseline() {
        let mut world = EntityTable::new();
        let e = world.spawn(MAP, Vec2::new(0.0, 0.0), None, T1).unwrap();
        assert_eq!(world.effective_mask(e).unwrap(), VisMask::ALWAYS);
    }

    #[test]
    fn child_inherits_parent_mask() {
        let mut world = EntityTable::new();
        let parent = world.spawn(MAP, Vec2::new(0.0, 0.0), None, T1).unwrap();
        let child = world.spawn(MAP, Vec2::new(0.0, 0.0), Some(parent), T1).unwrap();
        world.set_own_mask(parent, VisMask::channel(3), T1).unwrap();
        assert_eq!(world.effective_mask(child).unwrap(), VisMask::channel(3));
    }

    #[test]
    fn chain_masks_accumulate() {
        let mut world = EntityTable::new();
        let parent = world.spawn(MAP, Vec2::new(0.0, 0.0), None, T1).unwrap();
        let child = world.spawn(MAP, Vec2::new(0.0, 0.0), Some(parent), T1).unwrap();
        world.set_own_mask(parent, VisMask::ALWAYS, T1).unwrap();
        world.set_own_mask(child, VisMask::channel(1), T1).unwrap();

        let effective = world.effective_mask(child).unwrap();
        assert_eq!(effective, VisMask::ALWAYS | VisMask::channel(1));

        // Parent carries the baseline bit, so a viewer with only
        // channel 1 sees the parent and the child, while a viewer with
        // no channels sees both through the baseline.
        assert!(world.effective_mask(parent).unwrap().visible_to(VisMask::channel(1)));
        assert!(effective.visible_to(VisMask::channel(1)));
        assert!(effective.visible_to(VisMask::NONE));
    }

    #[test]
    fn clearing_restores_inheritance() {
        let mut world = EntityTable::new();
        let parent = world.spawn(MAP, Vec2::new(0.0, 0.0), None, T1).unwrap();
        let child = world.spawn(MAP, Vec2::new(0.0, 0.0), Some(parent), T1).unwrap();
        world.set_own_mask(parent, VisMask::channel(2), T1).unwrap();
        world.set_own_mask(child, VisMask::channel(4), T1).unwrap();
        world.clear_own_mask(child, T1).unwrap();
        assert_eq!(world.effective_mask(child).unwrap(), VisMask::channel(2));
    }

    #[test]
    fn reparent_changes_effective_mask() {
        let mut world = EntityTable::new();
        let loud = world.spawn(MAP, Vec2::new(0.0, 0.0), None, T1).unwrap();
        let quiet = world.spawn(MAP, Vec2::new(0.0, 0.0), None, T1).unwrap();
        let child = world.spawn(MAP, Vec2::new(0.0, 0.0), Some(loud), T1).unwrap();
        world.set_own_mask(loud, VisMask::channel(1), T1).unwrap();
        world.set_own_mask(quiet, VisMask::channel(2), T1).unwrap();

        assert_eq!(world.effective_mask(child).unwrap(), VisMask::channel(1));
        world.reparent(child, Some(quiet), Tick::new(2)).unwrap();
        assert_eq!(world.effective_mask(child).unwrap(), VisMask::channel(2));
    }

    #[test]
    fn mask_change_touches_descendants() {
        let mut world = EntityTable::new();
        let parent = world.spawn(MAP, Vec2::new(0.0, 0.0), None, T1).unwrap();
        let child = world.spawn(MAP, Vec2::new(0.0, 0.0), Some(parent), T1).unwrap();
        let grandchild = world
            .spawn(MAP, Vec2::new(0.0, 0.0), Some(child), T1)
            .unwrap();
        world.take_events();

        world.set_own_mask(parent, VisMask::channel(5), Tick::new(7)).unwrap();
        for id in [parent, child, grandchild] {
            assert_eq!(world.get(id).unwrap().last_modified(), Tick::new(7));
        }
        let touched: Vec<EntityId> = world
            .take_events()
            .into_iter()
            .filter(|event| matches!(event, WorldEvent::MaskChanged { .. }))
            .map(|event| event.entity())
            .collect();
        assert_eq!(touched, vec![parent, child, grandchild]);
    }

    #[test]
    fn mask_on_tombstone_fails() {
        let mut world = EntityTable::new();
        let e = world.spawn(MAP, Vec2::new(0.0, 0.0), None, T1).unwrap();
        world.mark_deleted(e, Tick::new(2)).unwrap();
        assert!(world.set_own_mask(e, VisMask::channel(1), Tick::new(3)).is_err());
        assert!(world.effective_mask(e).is_err());
    }
}
