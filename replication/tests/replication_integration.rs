//! End-to-end scheduling scenarios through the shard surface.

use base::{MapId, Rect, Tick, Vec2, ViewerId, VisMask};
use grid::GridConfig;
use replication::{InterestRegion, Notice, ReplicationConfig, Shard, TickOutput};

const MAP: MapId = MapId::new(1);
const VIEWER: ViewerId = ViewerId::new(1);

fn shard() -> Shard {
    Shard::new(GridConfig::for_testing(), ReplicationConfig::for_testing())
}

fn region(center: Vec2, radius: f32) -> InterestRegion {
    InterestRegion {
        map: MAP,
        center,
        radius,
    }
}

/// Connects the viewer with a region covering chunk (0, 0) only.
fn connect_origin_viewer(shard: &mut Shard) {
    shard.connect_viewer(VIEWER);
    shard.set_viewer_regions(VIEWER, vec![region(Vec2::new(8.0, 8.0), 7.0)]);
}

fn notices(output: &TickOutput) -> &[Notice] {
    output
        .batch_for(VIEWER)
        .map(|batch| batch.notices.as_slice())
        .unwrap_or(&[])
}

#[test]
fn entity_enters_then_leaves_on_chunk_crossing() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    let a = shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();

    let output = shard.run_tick();
    assert_eq!(
        notices(&output),
        &[Notice::Entered {
            entity: a,
            parent: None
        }]
    );

    // (20, 5) is chunk (1, 0), outside the viewer's region.
    shard.set_position(a, Vec2::new(20.0, 5.0)).unwrap();
    let output = shard.run_tick();
    assert_eq!(notices(&output), &[Notice::Left { entity: a }]);
}

#[test]
fn unchanged_tick_emits_nothing() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();

    let first = shard.run_tick();
    assert_eq!(notices(&first).len(), 1);
    let second = shard.run_tick();
    assert!(notices(&second).is_empty());
    let third = shard.run_tick();
    assert!(notices(&third).is_empty());
}

#[test]
fn in_place_change_emits_update_not_reentry() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    let a = shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();
    let entered_at = shard.run_tick().tick;

    // same chunk, attributes changed
    shard.set_position(a, Vec2::new(6.0, 6.0)).unwrap();
    let output = shard.run_tick();
    assert_eq!(
        notices(&output),
        &[Notice::Updated {
            entity: a,
            since: entered_at
        }]
    );
}

#[test]
fn update_never_precedes_enter() {
    let mut shard = shard();
    let a = shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();
    // entity exists and changes before the viewer ever connects
    shard.run_tick();
    shard.set_position(a, Vec2::new(6.0, 5.0)).unwrap();
    shard.run_tick();

    connect_origin_viewer(&mut shard);
    let output = shard.run_tick();
    assert!(matches!(notices(&output), &[Notice::Entered { entity, .. }] if entity == a));
}

#[test]
fn parent_notice_precedes_child_notice() {
    let mut shard = shard();
    shard.connect_viewer(VIEWER);
    // region spans chunks (0,0) and (1,0); the child's chunk (0,0)
    // is scanned first, the parent sits in (1,0)
    shard.set_viewer_regions(VIEWER, vec![region(Vec2::new(16.0, 8.0), 14.0)]);
    let parent = shard.spawn(MAP, Vec2::new(20.0, 5.0), None).unwrap();
    let child = shard.spawn(MAP, Vec2::new(5.0, 5.0), Some(parent)).unwrap();

    let output = shard.run_tick();
    let batch = notices(&output);
    let parent_at = batch.iter().position(|n| n.entity() == parent).unwrap();
    let child_at = batch.iter().position(|n| n.entity() == child).unwrap();
    assert!(parent_at < child_at);
    assert_eq!(
        batch[child_at],
        Notice::Entered {
            entity: child,
            parent: Some(parent)
        }
    );
}

#[test]
fn out_of_region_parent_is_pulled_in() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    // parent far outside the region, child inside it
    let parent = shard.spawn(MAP, Vec2::new(500.0, 500.0), None).unwrap();
    let child = shard.spawn(MAP, Vec2::new(5.0, 5.0), Some(parent)).unwrap();

    let output = shard.run_tick();
    let batch = notices(&output);
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].entity(), parent);
    assert_eq!(batch[1].entity(), child);
}

#[test]
fn deletion_is_delivered_exactly_once() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    let a = shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();
    shard.run_tick();

    shard.delete(a).unwrap();
    let output = shard.run_tick();
    assert_eq!(notices(&output), &[Notice::Destroyed { entity: a }]);
    let output = shard.run_tick();
    assert!(notices(&output).is_empty());
}

#[test]
fn deletion_reaches_viewer_even_after_chunk_eviction() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    // a global entity far away: its chunk is never pinned by anyone
    let beacon = shard.spawn(MAP, Vec2::new(900.0, 900.0), None).unwrap();
    shard.set_global(beacon);
    shard.run_tick();

    shard.delete(beacon).unwrap();
    let output = shard.run_tick();
    assert_eq!(notices(&output), &[Notice::Destroyed { entity: beacon }]);
}

#[test]
fn leave_then_delete_stays_silent() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    let a = shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();
    shard.run_tick();

    shard.set_position(a, Vec2::new(200.0, 200.0)).unwrap();
    let output = shard.run_tick();
    assert_eq!(notices(&output), &[Notice::Left { entity: a }]);

    // the viewer already forgot the entity; no destroy follows
    shard.delete(a).unwrap();
    let output = shard.run_tick();
    assert!(notices(&output).is_empty());
}

#[test]
fn subtree_deletion_destroys_children_too() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    let parent = shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();
    let child = shard.spawn(MAP, Vec2::new(6.0, 5.0), Some(parent)).unwrap();
    shard.run_tick();

    shard.delete(parent).unwrap();
    let output = shard.run_tick();
    let batch = notices(&output);
    assert_eq!(batch.len(), 2);
    assert!(batch.iter().all(|n| matches!(n, Notice::Destroyed { .. })));
    assert!(batch.iter().any(|n| n.entity() == parent));
    assert!(batch.iter().any(|n| n.entity() == child));
}

#[test]
fn channel_masks_gate_visibility_per_viewer() {
    let mut shard = shard();
    let baseline_viewer = ViewerId::new(1);
    let channel_viewer = ViewerId::new(2);
    for viewer in [baseline_viewer, channel_viewer] {
        shard.connect_viewer(viewer);
        shard.set_viewer_regions(viewer, vec![region(Vec2::new(8.0, 8.0), 7.0)]);
    }
    shard.set_viewer_channels(baseline_viewer, VisMask::channel(0));
    shard.set_viewer_channels(channel_viewer, VisMask::channel(1));

    let p = shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();
    let c = shard.spawn(MAP, Vec2::new(6.0, 5.0), Some(p)).unwrap();
    let restricted = shard.spawn(MAP, Vec2::new(7.0, 5.0), None).unwrap();
    shard.set_own_mask(p, VisMask::channel(0)).unwrap();
    shard.set_own_mask(c, VisMask::channel(1)).unwrap();
    shard.set_own_mask(restricted, VisMask::channel(2)).unwrap();

    let output = shard.run_tick();
    for viewer in [baseline_viewer, channel_viewer] {
        // the baseline bit carries p (and thus c) to every viewer;
        // the channel-2 entity is visible to neither
        let entities: Vec<_> = output
            .batch_for(viewer)
            .unwrap()
            .notices
            .iter()
            .map(Notice::entity)
            .collect();
        assert_eq!(entities, vec![p, c], "viewer {viewer:?}");
    }
}

#[test]
fn narrowing_a_mask_emits_left() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    shard.set_viewer_channels(VIEWER, VisMask::channel(1));
    let a = shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();
    shard.run_tick();

    shard.set_own_mask(a, VisMask::channel(2)).unwrap();
    let output = shard.run_tick();
    assert_eq!(notices(&output), &[Notice::Left { entity: a }]);
}

#[test]
fn entry_budget_defers_to_following_ticks() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    let budget = ReplicationConfig::for_testing().new_entity_budget;
    let total = budget + 2;
    for i in 0..total {
        #[allow(clippy::cast_precision_loss)]
        shard
            .spawn(MAP, Vec2::new(2.0 + i as f32 * 0.1, 5.0), None)
            .unwrap();
    }

    let first = shard.run_tick();
    assert_eq!(notices(&first).len(), budget);
    let second = shard.run_tick();
    assert_eq!(notices(&second).len(), 2);
    let third = shard.run_tick();
    assert!(notices(&third).is_empty());
}

#[test]
fn global_entity_needs_no_region_overlap() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    let beacon = shard.spawn(MAP, Vec2::new(900.0, 900.0), None).unwrap();
    shard.set_global(beacon);

    let output = shard.run_tick();
    assert!(matches!(notices(&output), &[Notice::Entered { entity, .. }] if entity == beacon));
}

#[test]
fn extended_bounds_reach_distant_viewers() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    let broadcaster = shard.spawn(MAP, Vec2::new(200.0, 200.0), None).unwrap();
    shard.set_extended_bounds(
        broadcaster,
        MAP,
        Rect::around(Vec2::new(200.0, 200.0), 300.0),
    );

    let output = shard.run_tick();
    assert!(matches!(notices(&output), &[Notice::Entered { entity, .. }] if entity == broadcaster));
}

#[test]
fn disconnect_discards_pending_deltas() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();
    shard.disconnect_viewer(VIEWER);

    let output = shard.run_tick();
    assert!(output.batch_for(VIEWER).is_none());
    assert!(!shard.tracker().contains(VIEWER));
}

#[test]
fn reentering_a_forgotten_chunk_resyncs_in_full() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    let a = shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();
    shard.run_tick();

    // look away: the chunk drops out of range and is forgotten
    shard.set_viewer_regions(VIEWER, vec![region(Vec2::new(200.0, 200.0), 7.0)]);
    let output = shard.run_tick();
    assert_eq!(notices(&output), &[Notice::Left { entity: a }]);

    // look back: full re-entry, not a delta
    shard.set_viewer_regions(VIEWER, vec![region(Vec2::new(8.0, 8.0), 7.0)]);
    let output = shard.run_tick();
    assert!(matches!(notices(&output), &[Notice::Entered { entity, .. }] if entity == a));
}

#[test]
fn viewers_never_observe_each_other() {
    let mut shard = shard();
    let near = ViewerId::new(1);
    let far = ViewerId::new(2);
    shard.connect_viewer(near);
    shard.connect_viewer(far);
    shard.set_viewer_regions(near, vec![region(Vec2::new(8.0, 8.0), 7.0)]);
    shard.set_viewer_regions(far, vec![region(Vec2::new(500.0, 500.0), 7.0)]);
    shard.spawn(MAP, Vec2::new(5.0, 5.0), None).unwrap();

    let output = shard.run_tick();
    assert_eq!(output.batch_for(near).unwrap().notices.len(), 1);
    assert!(output.batch_for(far).unwrap().notices.is_empty());
}

#[test]
fn tick_numbers_flow_through_output() {
    let mut shard = shard();
    connect_origin_viewer(&mut shard);
    assert_eq!(shard.run_tick().tick, Tick::new(1));
    assert_eq!(shard.run_tick().tick, Tick::new(2));
}
