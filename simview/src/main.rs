use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use base::{EntityId, MapId, Vec2, ViewerId, VisMask};
use clap::Parser;
use grid::GridConfig;
use replication::{InterestRegion, Notice, ReplicationConfig, Shard};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "simview",
    version,
    about = "scry visibility engine simulation harness"
)]
struct Cli {
    /// Number of simulated entities.
    #[arg(long, default_value_t = 256)]
    entities: u32,
    /// Number of connected viewers.
    #[arg(long, default_value_t = 8)]
    viewers: u32,
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 300)]
    ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Interest radius per viewer, in world units.
    #[arg(long, default_value_t = 64.0)]
    radius: f32,
    /// Delete-and-respawn one entity every N ticks.
    #[arg(long)]
    churn_every: Option<u32>,
    /// Output directory for summary.json.
    #[arg(long, default_value = "target/simview")]
    out_dir: PathBuf,
    /// Fail if p95 notices per viewer-tick exceeds this value.
    #[arg(long)]
    max_p95_notices: Option<u64>,
    /// Fail if average notices per viewer-tick exceeds this value.
    #[arg(long)]
    max_avg_notices: Option<u64>,
}

const MAP: MapId = MapId::new(1);
const WORLD_EXTENT: f32 = 512.0;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create output dir {}", cli.out_dir.display()))?;

    let mut rng = Rng::new(cli.seed);
    let mut shard = Shard::new(GridConfig::default(), ReplicationConfig::default());

    let mut entities = init_entities(&mut shard, cli.entities, &mut rng)?;
    let mut viewers = init_viewers(&mut shard, cli.viewers, cli.radius, &mut rng);

    let mut summary = Summary::new(&cli);
    for tick in 1..=cli.ticks {
        step_entities(&mut shard, &mut entities, &mut rng, tick, cli.churn_every)?;
        step_viewers(&mut shard, &mut viewers, cli.radius, &mut rng);

        let start = Instant::now();
        let output = shard.run_tick();
        let elapsed = start.elapsed();
        summary.tick_us.push(elapsed.as_micros() as u64);

        for batch in &output.batches {
            summary.notice_counts.push(batch.notices.len() as u64);
            for notice in &batch.notices {
                match notice {
                    Notice::Entered { .. } => summary.entered_total += 1,
                    Notice::Updated { .. } => summary.updated_total += 1,
                    Notice::Left { .. } => summary.left_total += 1,
                    Notice::Destroyed { .. } => summary.destroyed_total += 1,
                }
            }
        }
    }

    // With mutation stopped the system must settle within one tick and
    // then go completely quiet.
    shard.run_tick();
    let quiet = shard.run_tick();
    let leftover: usize = quiet.batches.iter().map(|batch| batch.notices.len()).sum();
    if leftover > 0 {
        anyhow::bail!("scheduler not quiescent after drain: {leftover} leftover notices");
    }

    summary.chunks_final = shard.index().chunk_count() as u64;
    summary.finalize();
    summary.assert_budgets(cli.max_p95_notices, cli.max_avg_notices)?;
    write_summary_json(&cli.out_dir, &summary)?;
    println!(
        "simview: {} ticks, {} entities, {} viewers | notices/viewer-tick avg {} p95 {} | tick avg {}us p95 {}us",
        summary.ticks,
        summary.entities,
        summary.viewers,
        summary.avg_notices_per_viewer_tick,
        summary.p95_notices_per_viewer_tick,
        summary.avg_tick_us,
        summary.p95_tick_us
    );

    Ok(())
}

fn write_summary_json(out_dir: &Path, summary: &Summary) -> Result<()> {
    let path = out_dir.join("summary.json");
    let contents = serde_json::to_string_pretty(summary).context("serialize summary")?;
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone)]
struct SimEntity {
    id: EntityId,
    position: Vec2,
    velocity: Vec2,
}

#[derive(Debug, Clone)]
struct SimViewer {
    id: ViewerId,
    center: Vec2,
    velocity: Vec2,
}

fn init_entities(shard: &mut Shard, count: u32, rng: &mut Rng) -> Result<Vec<SimEntity>> {
    let mut entities = Vec::with_capacity(count as usize);
    let mut previous: Option<EntityId> = None;
    for idx in 0..count {
        let position = rng.point(WORLD_EXTENT);
        // every eighth entity rides along as a child of the one before
        let parent = if idx % 8 == 7 { previous } else { None };
        let id = shard
            .spawn(MAP, position, parent)
            .context("spawn entity")?;
        if idx % 16 == 3 {
            let bit = (1 + idx % 3) as u8;
            shard.set_own_mask(id, VisMask::channel(bit)).context("set mask")?;
        }
        previous = Some(id);
        entities.push(SimEntity {
            id,
            position,
            velocity: rng.direction(2.0),
        });
    }
    Ok(entities)
}

fn init_viewers(shard: &mut Shard, count: u32, radius: f32, rng: &mut Rng) -> Vec<SimViewer> {
    let mut viewers = Vec::with_capacity(count as usize);
    for idx in 0..count {
        let id = ViewerId::new(idx + 1);
        let center = rng.point(WORLD_EXTENT);
        shard.connect_viewer(id);
        shard.set_viewer_channels(id, VisMask::channel((1 + idx % 3) as u8));
        shard.set_viewer_regions(
            id,
            vec![InterestRegion {
                map: MAP,
                center,
                radius,
            }],
        );
        viewers.push(SimViewer {
            id,
            center,
            velocity: rng.direction(4.0),
        });
    }
    viewers
}

fn step_entities(
    shard: &mut Shard,
    entities: &mut [SimEntity],
    rng: &mut Rng,
    tick: u32,
    churn_every: Option<u32>,
) -> Result<()> {
    for entity in entities.iter_mut() {
        if !shard.world().is_live(entity.id) {
            continue;
        }
        if rng.next_u32() % 16 == 0 {
            entity.velocity = rng.direction(2.0);
        }
        entity.position = wrap(Vec2::new(
            entity.position.x + entity.velocity.x,
            entity.position.y + entity.velocity.y,
        ));
        shard
            .set_position(entity.id, entity.position)
            .context("move entity")?;
    }

    let churn_now = churn_every.is_some_and(|every| every > 0 && tick % every == 0);
    if churn_now && !entities.is_empty() {
        let slot = (rng.next_u32() as usize) % entities.len();
        let victim = entities[slot].id;
        if shard.world().is_live(victim) {
            shard.delete(victim).context("delete entity")?;
        }
        let position = rng.point(WORLD_EXTENT);
        let id = shard.spawn(MAP, position, None).context("respawn entity")?;
        entities[slot] = SimEntity {
            id,
            position,
            velocity: rng.direction(2.0),
        };
    }
    Ok(())
}

fn step_viewers(shard: &mut Shard, viewers: &mut [SimViewer], radius: f32, rng: &mut Rng) {
    for viewer in viewers.iter_mut() {
        if rng.next_u32() % 32 == 0 {
            viewer.velocity = rng.direction(4.0);
        }
        viewer.center = wrap(Vec2::new(
            viewer.center.x + viewer.velocity.x,
            viewer.center.y + viewer.velocity.y,
        ));
        shard.set_viewer_regions(
            viewer.id,
            vec![InterestRegion {
                map: MAP,
                center: viewer.center,
                radius,
            }],
        );
    }
}

fn wrap(position: Vec2) -> Vec2 {
    let wrap_axis = |v: f32| {
        if v > WORLD_EXTENT {
            -WORLD_EXTENT
        } else if v < -WORLD_EXTENT {
            WORLD_EXTENT
        } else {
            v
        }
    };
    Vec2::new(wrap_axis(position.x), wrap_axis(position.y))
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn unit(&mut self) -> f32 {
        (self.next_u32() % 10_000) as f32 / 10_000.0
    }

    fn point(&mut self, extent: f32) -> Vec2 {
        Vec2::new(
            (self.unit() * 2.0 - 1.0) * extent,
            (self.unit() * 2.0 - 1.0) * extent,
        )
    }

    fn direction(&mut self, speed: f32) -> Vec2 {
        Vec2::new(
            (self.unit() * 2.0 - 1.0) * speed,
            (self.unit() * 2.0 - 1.0) * speed,
        )
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    entities: u32,
    viewers: u32,
    ticks: u32,
    seed: u64,
    radius: f32,
    churn_every: Option<u32>,
    entered_total: u64,
    updated_total: u64,
    left_total: u64,
    destroyed_total: u64,
    chunks_final: u64,
    avg_notices_per_viewer_tick: u64,
    p95_notices_per_viewer_tick: u64,
    avg_tick_us: u64,
    p95_tick_us: u64,
    #[serde(skip)]
    notice_counts: Vec<u64>,
    #[serde(skip)]
    tick_us: Vec<u64>,
}

impl Summary {
    fn new(cli: &Cli) -> Self {
        Self {
            entities: cli.entities,
            viewers: cli.viewers,
            ticks: cli.ticks,
            seed: cli.seed,
            radius: cli.radius,
            churn_every: cli.churn_every,
            entered_total: 0,
            updated_total: 0,
            left_total: 0,
            destroyed_total: 0,
            chunks_final: 0,
            avg_notices_per_viewer_tick: 0,
            p95_notices_per_viewer_tick: 0,
            avg_tick_us: 0,
            p95_tick_us: 0,
            notice_counts: Vec::new(),
            tick_us: Vec::new(),
        }
    }

    fn finalize(&mut self) {
        if !self.notice_counts.is_empty() {
            let total: u64 = self.notice_counts.iter().sum();
            self.avg_notices_per_viewer_tick = total / self.notice_counts.len() as u64;
            self.p95_notices_per_viewer_tick = p95(&mut self.notice_counts);
        }
        if !self.tick_us.is_empty() {
            let total: u64 = self.tick_us.iter().sum();
            self.avg_tick_us = total / self.tick_us.len() as u64;
            self.p95_tick_us = p95(&mut self.tick_us);
        }
    }

    fn assert_budgets(&self, max_p95: Option<u64>, max_avg: Option<u64>) -> Result<()> {
        if let Some(max_p95) = max_p95 {
            if self.p95_notices_per_viewer_tick > max_p95 {
                anyhow::bail!(
                    "p95 notices {} exceeds budget {}",
                    self.p95_notices_per_viewer_tick,
                    max_p95
                );
            }
        }
        if let Some(max_avg) = max_avg {
            if self.avg_notices_per_viewer_tick > max_avg {
                anyhow::bail!(
                    "avg notices {} exceeds budget {}",
                    self.avg_notices_per_viewer_tick,
                    max_avg
                );
            }
        }
        Ok(())
    }
}

fn p95(values: &mut [u64]) -> u64 {
    values.sort_unstable();
    let idx = ((values.len() as f64) * 0.95).ceil() as usize;
    let idx = idx.saturating_sub(1).min(values.len() - 1);
    values[idx]
}
