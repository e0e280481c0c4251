//! Chunk streaming: the control loop around the focal point.
//!
//! The `stream_chunks` system runs once per frame on the main thread and
//! owns the chunk lifecycle: it dispatches load/generate jobs to the task
//! pools in distance order, drains completed chunks into the resident map,
//! schedules mesh builds, applies finished meshes under an upload budget,
//! reassigns LODs with hysteresis, and evicts far chunks (saving modified
//! ones first). Worker tasks only ever touch snapshots or chunks that are
//! not yet resident; everything resident is mutated here, on the main
//! thread.
//!
//! The edit path, the 20 Hz fluid clock and the shutdown flush live here
//! too, as their own systems.

use super::mesh::{build_mesh, ChunkSnapshot, MeshData, MeshInput, RawMeshResult, VERTEX_SIZE};
use super::{
    lod_with_hysteresis, packed_key, Chunk, ChunkEntity, ChunkPos, MeshGenerationStats,
    CHUNK_SIZE_I32,
};
use crate::block::{is_lava, BlockId};
use crate::chunk::lod::{LOD_DISTANCES, LOD_REASSIGN_INTERVAL};
use crate::fluid::FluidSim;
use crate::lighting;
use crate::persist::{RegionStore, WorldStoreError};
use crate::world::World;
use crate::worldgen::GenContext;
use bevy::app::AppExit;
use bevy::prelude::*;
use bevy::render::render_asset::RenderAssetUsages;
use bevy::tasks::{AsyncComputeTaskPool, IoTaskPool, Task};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

// Per-frame budgets. Dispatch is split between a near ring (the player's
// immediate surroundings) and the far field.
const NEAR_DISPATCH_BUDGET: usize = 4;
const FAR_DISPATCH_BUDGET: usize = 6;
const NEAR_RING: i32 = 4;
// How many completed load/gen results to integrate per frame.
const COLLECT_BUDGET: usize = 8;
// How many mesh builds to start per frame to avoid sustained queue growth.
const MESH_SCHEDULE_BUDGET: usize = 4;
// How many finished meshes to upload per frame to avoid main-thread stalls.
const MESH_APPLY_BUDGET: usize = 2;
// Remesh requests beyond this are shed, most distant first.
const REMESH_QUEUE_CAP: usize = 512;
const SAVE_RETRY_LIMIT: u8 = 1;

/// Configuration parameters controlling streaming distances and memory.
#[derive(Resource, Clone)]
pub struct StreamingConfig {
    /// Radius (in chunks) to keep resident around the focal point.
    pub render_distance: i32,
    /// Extra distance beyond `render_distance` before a chunk unloads.
    pub unload_margin: i32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { render_distance: 20, unload_margin: 2 }
    }
}

impl StreamingConfig {
    #[must_use]
    pub fn unload_distance(&self) -> i32 {
        self.render_distance + self.unload_margin
    }

    /// Resident cap: the circular footprint plus 10% headroom, clamped.
    #[must_use]
    pub fn max_loaded_chunks(&self) -> usize {
        let r = f64::from(self.render_distance);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cap = (std::f64::consts::PI * r * r * 1.1).ceil() as usize;
        cap.min(2500)
    }
}

/// Shared generation context handed to worker tasks.
#[derive(Resource)]
pub struct GenContextRes(pub Arc<GenContext>);

/// Shared on-disk store handed to worker tasks.
#[derive(Resource)]
pub struct WorldStoreRes(pub Arc<RegionStore>);

/// The 20 Hz world clock driving the fluid simulator. The tick counter is
/// passed explicitly wherever it is needed; nothing reads it globally.
#[derive(Resource)]
pub struct WorldClock {
    pub timer: Timer,
    pub tick: u64,
}

impl Default for WorldClock {
    fn default() -> Self {
        WorldClock { timer: Timer::from_seconds(1.0 / 20.0, TimerMode::Repeating), tick: 0 }
    }
}

/// External block edit request, consumed once per frame by the edit path.
#[derive(Event, Debug, Clone, Copy)]
pub struct BlockEdit {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub id: BlockId,
}

/// Which job currently owns a chunk slot. Per-chunk job ordering is
/// serialized: only one of these may be in flight at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    LoadGen,
    Mesh,
    Save,
}

#[derive(Resource, Default)]
pub struct InFlightJobs {
    pub map: HashMap<u64, JobKind>,
}

/// Result of a load-or-generate worker.
pub struct LoadGenResult {
    pub chunk: Chunk,
    pub from_disk: bool,
    /// Region that produced a format error (logged once per region).
    pub format_error_region: Option<(i32, i32)>,
    pub io_error: Option<String>,
}

/// An in-flight load/generate task with its cancellation epoch.
pub struct ChunkTask {
    pub key: u64,
    pub epoch: u64,
    pub task: Task<LoadGenResult>,
}

/// Holds pending load/generation tasks.
#[derive(Resource, Default)]
pub struct PendingChunks {
    pub tasks: Vec<ChunkTask>,
}

/// An in-flight mesh build.
pub struct MeshTask {
    pub key: u64,
    pub lod: u8,
    pub task: Task<RawMeshResult>,
}

/// Pending mesh build tasks scheduled on the compute pool.
#[derive(Resource, Default)]
pub struct PendingMeshBuilds {
    pub tasks: Vec<MeshTask>,
}

/// An in-flight save. `revision` is the chunk revision the snapshot was
/// taken at; an edit racing the save keeps the chunk modified.
pub struct SaveTask {
    pub key: u64,
    pub revision: u64,
    pub evict_after: bool,
    pub attempt: u8,
    pub task: Task<Result<(), WorldStoreError>>,
}

#[derive(Resource, Default)]
pub struct PendingSaves {
    pub tasks: Vec<SaveTask>,
}

/// Per-slot generation epoch, bumped on eviction so stale worker results
/// are discarded instead of resurrecting unloaded chunks.
#[derive(Resource, Default)]
pub struct GenEpochs {
    pub map: HashMap<u64, u64>,
}

/// Chunks waiting for a mesh rebuild, deduplicated, with load shedding for
/// distant rebuilds under pressure. Saves are never shed.
#[derive(Resource, Default)]
pub struct RemeshQueue {
    queue: VecDeque<u64>,
    set: HashSet<u64>,
    pub dropped_low_priority: u64,
}

impl RemeshQueue {
    /// Request a rebuild for a resident chunk.
    pub fn push(&mut self, world: &World, focal: ChunkPos, key: u64) {
        if !world.chunks.contains_key(&key) || self.set.contains(&key) {
            return;
        }
        if self.queue.len() >= REMESH_QUEUE_CAP
            && ChunkPos::from_key(key).dist(focal) > LOD_DISTANCES[0]
        {
            self.dropped_low_priority += 1;
            return;
        }
        self.set.insert(key);
        self.queue.push_back(key);
    }

    fn pop(&mut self) -> Option<u64> {
        let key = self.queue.pop_front()?;
        self.set.remove(&key);
        Some(key)
    }

    /// Push back an entry that was already accepted once (skips the
    /// pressure checks).
    fn requeue(&mut self, key: u64) {
        if self.set.insert(key) {
            self.queue.push_back(key);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Spawned render entities per chunk, one per pass.
#[derive(Default)]
pub struct ChunkEntry {
    pub opaque: Option<Entity>,
    pub transparent: Option<Entity>,
}

#[derive(Resource, Default)]
pub struct ChunkEntities {
    pub map: HashMap<u64, ChunkEntry>,
}

/// The shared chunk materials, created once at startup.
#[derive(Resource)]
pub struct ChunkMaterials {
    pub opaque: Handle<StandardMaterial>,
    pub transparent: Handle<StandardMaterial>,
}

/// Last focal chunk, for systems that run outside `stream_chunks`.
#[derive(Resource, Default)]
pub struct FocalChunk(pub ChunkPos);

#[derive(Resource, Default)]
pub struct StartupTimer {
    pub elapsed: f32,
    pub startup_complete: bool,
}

/// Lightweight diagnostics so the once-per-second log line stays cheap.
#[derive(Resource, Default)]
pub struct StreamingDiagnostics {
    pub last_log_seconds: f64,
    pub reported_format_regions: HashSet<(i32, i32)>,
}

#[derive(bevy::ecs::system::SystemParam)]
pub struct StreamChunksCtx<'w, 's> {
    pub camera_query: Query<'w, 's, &'static GlobalTransform, With<Camera3d>>,
    pub commands: Commands<'w, 's>,
    pub meshes: ResMut<'w, Assets<Mesh>>,
    pub world: ResMut<'w, World>,
    pub config: Res<'w, StreamingConfig>,
    pub genctx: Res<'w, GenContextRes>,
    pub store: Res<'w, WorldStoreRes>,
    pub pending: ResMut<'w, PendingChunks>,
    pub pending_mesh: ResMut<'w, PendingMeshBuilds>,
    pub pending_saves: ResMut<'w, PendingSaves>,
    pub in_flight: ResMut<'w, InFlightJobs>,
    pub epochs: ResMut<'w, GenEpochs>,
    pub remesh: ResMut<'w, RemeshQueue>,
    pub entities: ResMut<'w, ChunkEntities>,
    pub stats: ResMut<'w, MeshGenerationStats>,
    pub materials: Option<Res<'w, ChunkMaterials>>,
    pub focal: ResMut<'w, FocalChunk>,
    pub startup_timer: ResMut<'w, StartupTimer>,
    pub time: Res<'w, Time>,
    pub diag: ResMut<'w, StreamingDiagnostics>,
    pub frame: Local<'s, u64>,
    pub scan_cache: Local<'s, (i32, Vec<(i32, i32, i32)>)>,
}

/// Main streaming system executed each frame to manage the chunk lifecycle.
#[allow(clippy::needless_pass_by_value)]
pub fn stream_chunks(mut ctx: StreamChunksCtx<'_, '_>) {
    let Ok(camera_transform) = ctx.camera_query.get_single() else { return };
    if ctx.materials.is_none() {
        return;
    }

    if !ctx.startup_timer.startup_complete {
        ctx.startup_timer.elapsed += ctx.time.delta_seconds();
        if ctx.startup_timer.elapsed > 2.0 {
            ctx.startup_timer.startup_complete = true;
        }
    }

    let eye = camera_transform.translation();
    #[allow(clippy::cast_possible_truncation)]
    let focal = ChunkPos::new(
        (eye.x / CHUNK_SIZE_I32 as f32).floor() as i32,
        (eye.z / CHUNK_SIZE_I32 as f32).floor() as i32,
    );
    ctx.focal.0 = focal;
    *ctx.frame += 1;

    dispatch_load_or_gen(&mut ctx, focal);
    collect_completed_chunks(&mut ctx, focal);
    schedule_mesh_builds(&mut ctx);
    apply_finished_meshes(&mut ctx);
    if *ctx.frame % LOD_REASSIGN_INTERVAL == 0 {
        reassign_lods(&mut ctx, focal);
    }
    evict_far_chunks(&mut ctx, focal);
    drain_finished_saves(&mut ctx);
    log_diagnostics(&mut ctx);
}

/// Offsets within the circular render radius, nearest first. Cached until
/// the radius changes.
fn scan_offsets(cache: &mut (i32, Vec<(i32, i32, i32)>), radius: i32) -> &[(i32, i32, i32)] {
    if cache.0 != radius {
        let mut offsets = Vec::new();
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let d2 = dx * dx + dz * dz;
                if d2 <= radius * radius {
                    offsets.push((dx, dz, d2));
                }
            }
        }
        offsets.sort_by_key(|&(_, _, d2)| d2);
        *cache = (radius, offsets);
    }
    &cache.1
}

fn dispatch_load_or_gen(ctx: &mut StreamChunksCtx<'_, '_>, focal: ChunkPos) {
    let mut near_budget = NEAR_DISPATCH_BUDGET;
    // Hold the far field back until the first seconds of churn settle.
    let mut far_budget = if ctx.startup_timer.startup_complete { FAR_DISPATCH_BUDGET } else { 0 };

    let radius = ctx.config.render_distance;
    let io_pool = IoTaskPool::get();

    for &(dx, dz, _) in scan_offsets(&mut ctx.scan_cache, radius) {
        if near_budget == 0 && far_budget == 0 {
            break;
        }
        let pos = ChunkPos::new(focal.x + dx, focal.z + dz);
        let key = pos.key();
        if ctx.world.chunks.contains_key(&key) || ctx.in_flight.map.contains_key(&key) {
            continue;
        }
        let near = dx.abs().max(dz.abs()) <= NEAR_RING;
        let budget = if near { &mut near_budget } else { &mut far_budget };
        if *budget == 0 {
            continue;
        }
        *budget -= 1;

        let epoch = *ctx.epochs.map.get(&key).unwrap_or(&0);
        let store = ctx.store.0.clone();
        let genctx = ctx.genctx.0.clone();
        let task = io_pool.spawn(async move {
            match store.load_chunk(pos) {
                Ok(Some(chunk)) => LoadGenResult {
                    chunk,
                    from_disk: true,
                    format_error_region: None,
                    io_error: None,
                },
                Ok(None) => LoadGenResult {
                    chunk: genctx.generate_chunk(pos),
                    from_disk: false,
                    format_error_region: None,
                    io_error: None,
                },
                Err(e) if e.is_format() => LoadGenResult {
                    chunk: genctx.generate_chunk(pos),
                    from_disk: false,
                    format_error_region: Some((
                        pos.x.div_euclid(crate::persist::region::REGION_SIZE),
                        pos.z.div_euclid(crate::persist::region::REGION_SIZE),
                    )),
                    io_error: None,
                },
                Err(e) => LoadGenResult {
                    chunk: genctx.generate_chunk(pos),
                    from_disk: false,
                    format_error_region: None,
                    io_error: Some(e.to_string()),
                },
            }
        });

        ctx.in_flight.map.insert(key, JobKind::LoadGen);
        ctx.pending.tasks.push(ChunkTask { key, epoch, task });
    }
}

fn collect_completed_chunks(ctx: &mut StreamChunksCtx<'_, '_>, focal: ChunkPos) {
    let mut collected = 0usize;
    let mut i = 0usize;
    while i < ctx.pending.tasks.len() {
        if collected >= COLLECT_BUDGET {
            break;
        }
        if !ctx.pending.tasks[i].task.is_finished() {
            i += 1;
            continue;
        }
        let ChunkTask { key, epoch, mut task } = ctx.pending.tasks.swap_remove(i);
        ctx.in_flight.map.remove(&key);
        let Ok(result) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            futures::executor::block_on(&mut task)
        })) else {
            continue;
        };

        if let Some(region) = result.format_error_region {
            if ctx.diag.reported_format_regions.insert(region) {
                warn!("region r.{}.{} holds corrupt chunk data; regenerating", region.0, region.1);
            }
        }
        if let Some(err) = &result.io_error {
            warn!("chunk load failed ({err}); generated fresh");
        }

        // A stale epoch means the slot was evicted while we worked.
        if *ctx.epochs.map.get(&key).unwrap_or(&0) != epoch {
            continue;
        }

        let mut chunk = result.chunk;
        if chunk.dirty_light {
            lighting::compute_initial_sky_light(&mut chunk);
            lighting::compute_initial_block_light(&mut chunk);
            chunk.dirty_light = false;
        }
        chunk.dirty_mesh = true;
        chunk.lod_level = super::compute_lod_from_dist(chunk.pos.dist(focal));
        let pos = chunk.pos;
        ctx.world.insert(chunk);
        ctx.remesh.push(&ctx.world, focal, key);
        // A fresh border changes the culling of already-meshed neighbours.
        for (dx, dz) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            ctx.remesh.push(&ctx.world, focal, packed_key(pos.x + dx, pos.z + dz));
        }
        collected += 1;
    }
}

fn schedule_mesh_builds(ctx: &mut StreamChunksCtx<'_, '_>) {
    let pool = AsyncComputeTaskPool::get();
    let mut scheduled = 0usize;
    let mut deferred = Vec::new();

    while scheduled < MESH_SCHEDULE_BUDGET {
        let Some(key) = ctx.remesh.pop() else { break };
        let Some(chunk) = ctx.world.chunks.get(&key) else { continue };
        if ctx.in_flight.map.contains_key(&key) {
            // A load or save owns the slot; retry next frame.
            deferred.push(key);
            continue;
        }

        let lod = chunk.lod_level;
        let center = ChunkSnapshot::of(chunk);
        let pos = chunk.pos;
        let neighbours = [(1, 0), (-1, 0), (0, 1), (0, -1)].map(|(dx, dz)| {
            ctx.world.chunks.get(&packed_key(pos.x + dx, pos.z + dz)).map(ChunkSnapshot::of)
        });

        if let Some(c) = ctx.world.chunks.get_mut(&key) {
            c.dirty_mesh = false;
        }

        let task = pool.spawn(async move {
            let input = MeshInput { center, neighbours };
            build_mesh(&input, lod)
        });
        ctx.in_flight.map.insert(key, JobKind::Mesh);
        ctx.pending_mesh.tasks.push(MeshTask { key, lod, task });
        scheduled += 1;
    }

    for key in deferred {
        ctx.remesh.requeue(key);
    }
}

fn apply_finished_meshes(ctx: &mut StreamChunksCtx<'_, '_>) {
    let mut applied = 0usize;
    let mut i = 0usize;
    while i < ctx.pending_mesh.tasks.len() {
        if applied >= MESH_APPLY_BUDGET {
            break;
        }
        if !ctx.pending_mesh.tasks[i].task.is_finished() {
            i += 1;
            continue;
        }
        let MeshTask { key, lod, mut task } = ctx.pending_mesh.tasks.swap_remove(i);
        ctx.in_flight.map.remove(&key);
        let Ok(result) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            futures::executor::block_on(&mut task)
        })) else {
            continue;
        };

        if !ctx.world.chunks.contains_key(&key) {
            continue; // evicted while meshing; discard
        }

        ctx.stats.update_chunk(key, result.triangle_count());
        upload_chunk_mesh(ctx, key, lod, &result);
        applied += 1;
    }
}

/// Cross a finished mesh to the GPU side: create the mesh assets, store the
/// handles on the chunk, and spawn or update the per-pass entities.
fn upload_chunk_mesh(ctx: &mut StreamChunksCtx<'_, '_>, key: u64, lod: u8, result: &RawMeshResult) {
    let Some(materials) = ctx.materials.as_ref() else { return };
    let opaque_mat = materials.opaque.clone();
    let transparent_mat = materials.transparent.clone();

    let Some(chunk) = ctx.world.chunks.get_mut(&key) else { return };
    let pos = chunk.pos;
    let slot = &mut chunk.mesh_handles[lod as usize];
    let entry = ctx.entities.map.entry(key).or_default();

    let origin = Transform::from_xyz(
        (pos.x * CHUNK_SIZE_I32) as f32,
        0.0,
        (pos.z * CHUNK_SIZE_I32) as f32,
    );

    for (data, handle_slot, entity_slot, material) in [
        (&result.opaque, &mut slot.opaque, &mut entry.opaque, opaque_mat),
        (&result.transparent, &mut slot.transparent, &mut entry.transparent, transparent_mat),
    ] {
        if let Some(old) = handle_slot.take() {
            ctx.meshes.remove(&old);
        }
        if data.is_empty() {
            if let Some(entity) = entity_slot.take() {
                ctx.commands.entity(entity).despawn();
            }
            continue;
        }
        let handle = ctx.meshes.add(mesh_from_data(data));
        *handle_slot = Some(handle.clone());
        match entity_slot {
            Some(entity) => {
                ctx.commands.entity(*entity).insert(handle);
            }
            None => {
                let entity = ctx
                    .commands
                    .spawn((
                        MaterialMeshBundle {
                            mesh: handle,
                            material,
                            transform: origin,
                            ..default()
                        },
                        ChunkEntity { chunk_x: pos.x, chunk_z: pos.z },
                    ))
                    .id();
                *entity_slot = Some(entity);
            }
        }
    }
}

fn reassign_lods(ctx: &mut StreamChunksCtx<'_, '_>, focal: ChunkPos) {
    let mut changed = Vec::new();
    for chunk in ctx.world.chunks.values_mut() {
        let next = lod_with_hysteresis(chunk.lod_level, chunk.pos.dist(focal));
        if next != chunk.lod_level {
            chunk.lod_level = next;
            changed.push(chunk.pos.key());
        }
    }
    for key in changed {
        ctx.remesh.push(&ctx.world, focal, key);
    }
}

fn evict_far_chunks(ctx: &mut StreamChunksCtx<'_, '_>, focal: ChunkPos) {
    let unload = ctx.config.unload_distance();
    let max_loaded = ctx.config.max_loaded_chunks();

    let mut by_distance: Vec<(i32, u64)> = ctx
        .world
        .chunks
        .values()
        .map(|c| (c.pos.dist(focal), c.pos.key()))
        .collect();
    by_distance.sort_by_key(|&(d, _)| std::cmp::Reverse(d));

    let mut over_cap = by_distance.len().saturating_sub(max_loaded);
    for (dist, key) in by_distance {
        let out_of_range = dist > unload;
        if !out_of_range && over_cap == 0 {
            break; // sorted far-to-near: nothing further qualifies
        }
        if !out_of_range {
            over_cap -= 1;
        }
        if ctx.in_flight.map.contains_key(&key) {
            continue; // a job owns the slot; revisit next frame
        }

        let modified = ctx.world.chunks.get(&key).is_some_and(|c| c.modified);
        if modified {
            dispatch_save(ctx, key, true);
        } else {
            evict_now(ctx, key);
        }
    }
}

fn dispatch_save(ctx: &mut StreamChunksCtx<'_, '_>, key: u64, evict_after: bool) {
    let Some(chunk) = ctx.world.chunks.get(&key) else { return };
    let revision = chunk.revision;
    let snapshot = chunk.clone();
    let store = ctx.store.0.clone();
    let task = IoTaskPool::get().spawn(async move { store.save_chunk(&snapshot) });
    ctx.in_flight.map.insert(key, JobKind::Save);
    ctx.pending_saves.tasks.push(SaveTask { key, revision, evict_after, attempt: 0, task });
}

fn drain_finished_saves(ctx: &mut StreamChunksCtx<'_, '_>) {
    let mut i = 0usize;
    while i < ctx.pending_saves.tasks.len() {
        if !ctx.pending_saves.tasks[i].task.is_finished() {
            i += 1;
            continue;
        }
        let SaveTask { key, revision, evict_after, attempt, mut task } =
            ctx.pending_saves.tasks.swap_remove(i);
        ctx.in_flight.map.remove(&key);
        let Ok(result) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            futures::executor::block_on(&mut task)
        })) else {
            continue;
        };

        match result {
            Ok(()) => {
                let clean = ctx.world.chunks.get_mut(&key).is_some_and(|chunk| {
                    if chunk.revision == revision {
                        chunk.modified = false;
                        true
                    } else {
                        false // edited mid-save; stays modified for the next save
                    }
                });
                if clean && evict_after {
                    evict_now(ctx, key);
                }
            }
            Err(e) if attempt < SAVE_RETRY_LIMIT => {
                warn!("chunk save failed ({e}); retrying once");
                let Some(chunk) = ctx.world.chunks.get(&key) else { continue };
                let snapshot = chunk.clone();
                let store = ctx.store.0.clone();
                let retry = IoTaskPool::get().spawn(async move { store.save_chunk(&snapshot) });
                ctx.in_flight.map.insert(key, JobKind::Save);
                ctx.pending_saves.tasks.push(SaveTask {
                    key,
                    revision,
                    evict_after,
                    attempt: attempt + 1,
                    task: retry,
                });
            }
            Err(e) => {
                // Surfaced: the chunk stays resident and modified; the
                // shutdown flush will try again.
                let (cx, cz) = super::unpack_key(key);
                error!("chunk ({cx}, {cz}) could not be saved: {e}");
            }
        }
    }
}

fn evict_now(ctx: &mut StreamChunksCtx<'_, '_>, key: u64) {
    let Some(chunk) = ctx.world.remove(key) else { return };
    debug_assert!(!chunk.modified, "evicting a chunk with unsaved changes");
    *ctx.epochs.map.entry(key).or_insert(0) += 1;

    for handles in &chunk.mesh_handles {
        if let Some(h) = &handles.opaque {
            ctx.meshes.remove(h);
        }
        if let Some(h) = &handles.transparent {
            ctx.meshes.remove(h);
        }
    }
    if let Some(entry) = ctx.entities.map.remove(&key) {
        for entity in [entry.opaque, entry.transparent].into_iter().flatten() {
            ctx.commands.entity(entity).despawn();
        }
    }
    ctx.stats.remove_chunk(key);
}

fn log_diagnostics(ctx: &mut StreamChunksCtx<'_, '_>) {
    let now = ctx.time.elapsed_seconds_f64();
    if now - ctx.diag.last_log_seconds < 1.0 {
        return;
    }
    ctx.diag.last_log_seconds = now;
    info!(
        "streaming: resident={} pending_gen={} pending_mesh={} pending_saves={} remesh_queue={} shed={} tris={}",
        ctx.world.chunks.len(),
        ctx.pending.tasks.len(),
        ctx.pending_mesh.tasks.len(),
        ctx.pending_saves.tasks.len(),
        ctx.remesh.len(),
        ctx.remesh.dropped_low_priority,
        ctx.stats.total_triangles(),
    );
}

/// Convert a raw mesh into a renderable `Mesh`: unpack the 12-float vertex
/// stream into position/normal/uv/layer/color attributes. Sky and block
/// light land in the vertex color, AO pre-multiplied.
#[must_use]
pub fn mesh_from_data(data: &MeshData) -> Mesh {
    const FACE_NORMALS: [[f32; 3]; 6] = [
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
        [1.0, 0.0, 0.0],
        [-1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.0, 0.0, -1.0],
    ];

    let count = data.vertex_count();
    let mut positions = Vec::with_capacity(count);
    let mut normals = Vec::with_capacity(count);
    let mut uvs = Vec::with_capacity(count);
    let mut layers: Vec<[f32; 2]> = Vec::with_capacity(count);
    let mut colors = Vec::with_capacity(count);

    for v in data.vertices.chunks_exact(VERTEX_SIZE) {
        positions.push([v[0], v[1], v[2]]);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        normals.push(FACE_NORMALS[(v[3] as usize).min(5)]);
        uvs.push([v[4], v[5]]);
        layers.push([v[6], 0.0]);
        let sun = v[8] * v[7];
        colors.push([sun.max(v[9]), sun.max(v[10]), sun.max(v[11]), 1.0f32]);
    }

    let mut mesh = Mesh::new(
        bevy::render::mesh::PrimitiveTopology::TriangleList,
        RenderAssetUsages::default(),
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_1, layers);
    mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors);
    mesh.insert_indices(bevy::render::mesh::Indices::U32(data.indices.clone()));
    mesh
}

/// Handles of every mesh the renderer should draw for a focal point: one
/// per resident chunk within the radius, per pass, at the chunk's active
/// LOD.
pub fn iter_visible_meshes<'a>(
    world: &'a World,
    focal: ChunkPos,
    radius: i32,
) -> impl Iterator<Item = &'a Handle<Mesh>> + 'a {
    world
        .chunks
        .values()
        .filter(move |c| c.pos.dist(focal) <= radius)
        .flat_map(|c| {
            let handles = &c.mesh_handles[c.lod_level as usize];
            handles.opaque.iter().chain(handles.transparent.iter())
        })
}

// ---------------------------------------------------------------------------
// Edit path, fluid clock, shutdown.
// ---------------------------------------------------------------------------

/// Apply external block edits: write the block, run incremental lighting,
/// notify the fluid simulator, and queue remeshes for every chunk whose
/// content or light changed.
pub fn process_block_edits(
    mut events: EventReader<BlockEdit>,
    mut world: ResMut<World>,
    mut fluid: ResMut<FluidSim>,
    clock: Res<WorldClock>,
    mut remesh: ResMut<RemeshQueue>,
    focal: Res<FocalChunk>,
) {
    for edit in events.read() {
        let BlockEdit { x, y, z, id } = *edit;
        let old = world.get_block(x, y, z);
        if old == id {
            continue;
        }
        let Some(pos) = world.set_block(x, y, z, id) else {
            continue; // unloaded chunk or out-of-bounds Y
        };

        let affected = lighting::update_for_edit(&mut world, x, y, z, old, id);
        fluid.on_block_changed(&world, x, y, z, clock.tick);
        if is_lava(id) {
            fluid.ignite_around(&mut world, x, y, z, clock.tick);
        }

        remesh.push(&world, focal.0, pos.key());
        for key in affected {
            remesh.push(&world, focal.0, key);
        }
    }
}

/// Advance the 20 Hz world clock, step the fluid simulator on each tick,
/// and feed its outputs back into lighting and meshing.
pub fn world_clock_and_fluids(
    time: Res<Time>,
    mut clock: ResMut<WorldClock>,
    mut world: ResMut<World>,
    mut fluid: ResMut<FluidSim>,
    mut remesh: ResMut<RemeshQueue>,
    focal: Res<FocalChunk>,
) {
    clock.timer.tick(time.delta());
    for _ in 0..clock.timer.times_finished_this_tick() {
        clock.tick += 1;
        let tick = clock.tick;
        fluid.tick(&mut world, tick);
    }

    for key in fluid.drain_dirty_chunks() {
        remesh.push(&world, focal.0, key);
    }
    for (x, y, z) in fluid.drain_light_updates() {
        let mut affected = HashSet::new();
        if is_lava(world.get_block(x, y, z)) {
            lighting::on_light_source_placed(&mut world, x, y, z, 15, &mut affected);
        } else {
            lighting::on_light_source_removed(&mut world, x, y, z, &mut affected);
        }
        for key in affected {
            remesh.push(&world, focal.0, key);
        }
    }
}

/// Shutdown flush: every modified chunk is written before the process
/// exits. Generation and meshing tasks are simply dropped.
pub fn flush_saves_on_exit(
    mut exits: EventReader<AppExit>,
    world: Res<World>,
    store: Res<WorldStoreRes>,
) {
    if exits.is_empty() {
        return;
    }
    exits.clear();

    let modified: Vec<&Chunk> = world.chunks.values().filter(|c| c.modified).collect();
    if modified.is_empty() {
        return;
    }
    info!("flushing {} modified chunks before exit", modified.len());
    if let Err(e) = store.0.save_chunks(&modified) {
        error!("world save failed during shutdown: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_offsets_are_circular_and_sorted() {
        let mut cache = (0, Vec::new());
        let offsets = scan_offsets(&mut cache, 8);
        assert!(!offsets.is_empty());
        // Nearest first, all within the circle.
        let mut last = -1;
        for &(dx, dz, d2) in offsets {
            assert!(dx * dx + dz * dz <= 64);
            assert_eq!(d2, dx * dx + dz * dz);
            assert!(d2 >= last);
            last = d2;
        }
        assert_eq!(offsets[0], (0, 0, 0));
        // The square corners are excluded.
        assert!(!offsets.iter().any(|&(dx, dz, _)| dx.abs() == 8 && dz.abs() == 8));
    }

    #[test]
    fn remesh_queue_dedupes_and_sheds_distant_work() {
        let mut world = World::new();
        let focal = ChunkPos::new(0, 0);
        for cx in 0..40 {
            for cz in 0..20 {
                world.insert(Chunk::new(ChunkPos::new(cx, cz)));
            }
        }
        world.insert(Chunk::new(ChunkPos::new(-1, 0)));

        let mut queue = RemeshQueue::default();
        queue.push(&world, focal, packed_key(1, 1));
        queue.push(&world, focal, packed_key(1, 1));
        assert_eq!(queue.len(), 1, "duplicate push collapses");

        queue.push(&world, focal, packed_key(99, 99));
        assert_eq!(queue.len(), 1, "non-resident chunks are ignored");

        // Fill past the cap, then verify distant pushes shed while near
        // ones still land.
        let mut filled = 1;
        'fill: for cx in 0..40 {
            for cz in 0..20 {
                if filled > REMESH_QUEUE_CAP {
                    break 'fill;
                }
                queue.push(&world, focal, packed_key(cx, cz));
                filled += 1;
            }
        }
        let before = queue.len();
        queue.push(&world, focal, packed_key(39, 19)); // distance 39: shed
        assert_eq!(queue.len(), before);
        assert!(queue.dropped_low_priority > 0);
        queue.push(&world, focal, packed_key(-1, 0)); // near: accepted
        assert_eq!(queue.len(), before + 1);
    }

    #[test]
    fn max_loaded_tracks_the_circular_footprint() {
        let small = StreamingConfig { render_distance: 8, unload_margin: 2 };
        assert_eq!(small.max_loaded_chunks(), 222); // ceil(pi * 64 * 1.1)
        let huge = StreamingConfig { render_distance: 64, unload_margin: 2 };
        assert_eq!(huge.max_loaded_chunks(), 2500, "cap applies");
        assert_eq!(small.unload_distance(), 10);
    }

    #[test]
    fn mesh_conversion_preserves_counts() {
        use crate::block::blocks as ids;

        let mut c = Chunk::new(ChunkPos::new(0, 0));
        c.set_block(4, 50, 4, ids::STONE);
        let input =
            MeshInput { center: ChunkSnapshot::of(&c), neighbours: [None, None, None, None] };
        let raw = build_mesh(&input, 0);
        let mesh = mesh_from_data(&raw.opaque);
        assert_eq!(mesh.count_vertices(), 24);
    }
}
