//! Scheduled fluid simulation.
//!
//! A delayed-tick cellular automaton for water and lava, stepped at 20 Hz on
//! the main thread. Cells are scheduled into a packed-position map keyed by
//! due tick; each tick drains a bounded batch in insertion order. Flow
//! prefers directions whose path reaches a drop within a short search depth
//! (edge-seeking), so streams run toward cliffs instead of puddling.
//!
//! The simulator never orchestrates lighting or meshing itself: it records
//! dirty chunks and lava light events, and the stream manager drains both
//! once per tick.

use crate::block::{
    self, blocks, can_fluid_replace, fluid_level, is_flammable, is_fluid, is_fluid_source,
    is_lava, is_water, lava_with_level, water_with_level, BlockId,
};
use crate::chunk::{mark_chunk_span, SEA_LEVEL, WORLD_HEIGHT_I32};
use crate::world::World;
use bevy::prelude::*;
use std::collections::{hash_map::Entry, HashMap, HashSet, VecDeque};

pub const WATER_TICK_DELAY: u64 = 5;
pub const LAVA_SURFACE_DELAY: u64 = 30;
pub const LAVA_UNDERGROUND_DELAY: u64 = 10;

/// Hard cap on cell updates processed per tick.
pub const MAX_UPDATES_PER_TICK: usize = 512;

/// How far horizontal flow scans for a drop-off.
pub const FLOW_SEARCH_DEPTH: i32 = 4;

const HORIZONTAL: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Pack a world cell into 28/28/8 bits (x, z, y). Good for |x|,|z| < 2^27.
#[inline]
#[must_use]
pub fn pack_cell(x: i32, y: i32, z: i32) -> u64 {
    ((x as u64 & 0x0FFF_FFFF) << 36) | ((z as u64 & 0x0FFF_FFFF) << 8) | (y as u64 & 0xFF)
}

/// Invert `pack_cell`, sign-extending the 28-bit fields.
#[inline]
#[must_use]
pub fn unpack_cell(key: u64) -> (i32, i32, i32) {
    let x = (((key >> 36) as i64) << 36 >> 36) as i32;
    let z = ((((key >> 8) & 0x0FFF_FFFF) as i64) << 36 >> 36) as i32;
    let y = (key & 0xFF) as i32;
    (x, y, z)
}

/// The delayed-update fluid scheduler and flow rules.
#[derive(Resource, Default)]
pub struct FluidSim {
    /// Due tick per scheduled cell. Earlier inserts win; later ones are
    /// ignored.
    due: HashMap<u64, u64>,
    /// Scheduled cells in insertion order.
    queue: VecDeque<u64>,
    dirty_chunks: HashSet<u64>,
    light_updates: Vec<(i32, i32, i32)>,
}

impl FluidSim {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a cell for reconsideration at `tick`. An existing earlier
    /// schedule is kept; an existing later one is pulled forward.
    pub fn schedule(&mut self, x: i32, y: i32, z: i32, tick: u64) {
        if !(0..WORLD_HEIGHT_I32).contains(&y) {
            return;
        }
        let key = pack_cell(x, y, z);
        match self.due.entry(key) {
            Entry::Occupied(mut e) => {
                if tick < *e.get() {
                    e.insert(tick);
                }
            }
            Entry::Vacant(e) => {
                e.insert(tick);
                self.queue.push_back(key);
            }
        }
    }

    /// External edit notification: reconsider the cell and its neighbours,
    /// so a broken dam drains on its own time.
    pub fn on_block_changed(&mut self, world: &World, x: i32, y: i32, z: i32, tick: u64) {
        for (dx, dy, dz) in
            [(0, 0, 0), (1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)]
        {
            let (nx, ny, nz) = (x + dx, y + dy, z + dz);
            let id = world.get_block(nx, ny, nz);
            if is_fluid(id) {
                self.schedule(nx, ny, nz, tick + delay_for(id, ny));
            }
        }
    }

    /// Chunks whose blocks changed since the last drain.
    pub fn drain_dirty_chunks(&mut self) -> HashSet<u64> {
        std::mem::take(&mut self.dirty_chunks)
    }

    /// Cells where lava appeared or vanished since the last drain; block
    /// light must be re-evaluated there.
    pub fn drain_light_updates(&mut self) -> Vec<(i32, i32, i32)> {
        std::mem::take(&mut self.light_updates)
    }

    /// Number of cells currently scheduled (diagnostics).
    #[must_use]
    pub fn scheduled_len(&self) -> usize {
        self.queue.len()
    }

    /// Process one world tick: drain up to `MAX_UPDATES_PER_TICK` due cells
    /// in insertion order and run the flow rules on each.
    pub fn tick(&mut self, world: &mut World, current_tick: u64) {
        let mut ready = Vec::new();
        let mut kept = VecDeque::with_capacity(self.queue.len());
        for key in std::mem::take(&mut self.queue) {
            match self.due.get(&key) {
                Some(&t) if t <= current_tick && ready.len() < MAX_UPDATES_PER_TICK => {
                    self.due.remove(&key);
                    ready.push(key);
                }
                Some(_) => kept.push_back(key),
                None => {}
            }
        }
        self.queue = kept;

        for key in ready {
            let (x, y, z) = unpack_cell(key);
            self.update_cell(world, x, y, z, current_tick);
        }
    }

    fn update_cell(&mut self, world: &mut World, x: i32, y: i32, z: i32, tick: u64) {
        let id = world.get_block(x, y, z);
        if !is_fluid(id) {
            return; // stale schedule; the cell changed under us
        }
        let water = is_water(id);

        if is_fluid_source(id) {
            self.spread(world, x, y, z, 0, water, tick);
            return;
        }

        let level = fluid_level(id);
        let new_id = self.effective_id(world, x, y, z, water);
        if new_id != id {
            self.place(world, x, y, z, new_id, tick);
            if is_fluid(new_id) {
                self.schedule(x, y, z, tick + delay_for(new_id, y));
            }
            self.schedule_fluid_neighbours(world, x, y, z, tick);
            if !is_fluid(new_id) {
                return;
            }
        }

        let level = if is_fluid_source(new_id) { 0 } else if is_fluid(new_id) { fluid_level(new_id) } else { level };
        self.spread(world, x, y, z, level, water, tick);
    }

    /// What a flowing cell should currently be: fed from above at level 1,
    /// promoted to a source by two horizontal source neighbours (water
    /// only), otherwise one more than the shallowest same-fluid neighbour,
    /// or air when nothing feeds it.
    fn effective_id(&self, world: &World, x: i32, y: i32, z: i32, water: bool) -> BlockId {
        let above = world.get_block(x, y + 1, z);
        if same_fluid(above, water) {
            return with_level(water, 1);
        }

        let mut sources = 0u32;
        let mut min_neighbour: Option<u8> = None;
        for (dx, dz) in HORIZONTAL {
            let nid = world.get_block(x + dx, y, z + dz);
            if !same_fluid(nid, water) {
                continue;
            }
            if is_fluid_source(nid) {
                sources += 1;
            }
            let l = fluid_level(nid);
            min_neighbour = Some(min_neighbour.map_or(l, |m| m.min(l)));
        }

        if water && sources >= 2 {
            return blocks::WATER_SOURCE; // the infinite-water rule
        }
        match min_neighbour {
            Some(m) if m + 1 <= block::FLUID_LEVELS => with_level(water, m + 1),
            _ => blocks::AIR, // out of range or no feeder
        }
    }

    /// Spread from a fluid cell: downward first, then edge-seeking
    /// horizontal flow while under the per-zone spread limit.
    fn spread(&mut self, world: &mut World, x: i32, y: i32, z: i32, level: u8, water: bool, tick: u64) {
        let below = world.get_block(x, y - 1, z);
        if y > 0 && can_fluid_replace(below) {
            self.place(world, x, y - 1, z, with_level(water, 1), tick);
            self.schedule(x, y - 1, z, tick + delay_for(with_level(water, 1), y - 1));
            return; // falling fluid does not fan out
        }
        if y > 0 && is_fluid(below) && is_water(below) != water {
            self.contact(world, x, y - 1, z, water, below, tick);
        }

        let max_spread = max_spread_for(water, y);
        if level >= max_spread {
            return;
        }
        let next = with_level(water, level + 1);

        for (dx, dz) in self.preferred_directions(world, x, y, z) {
            let (nx, nz) = (x + dx, z + dz);
            let nid = world.get_block(nx, y, nz);
            if can_fluid_replace(nid) {
                self.place(world, nx, y, nz, next, tick);
                self.schedule(nx, y, nz, tick + delay_for(next, y));
            } else if same_fluid(nid, water)
                && !is_fluid_source(nid)
                && fluid_level(nid) > level + 1
            {
                self.place(world, nx, y, nz, next, tick);
                self.schedule(nx, y, nz, tick + delay_for(next, y));
            } else if !water && is_water(nid) {
                // Lava pushing into water quenches into cobblestone.
                self.contact(world, nx, y, nz, water, nid, tick);
            }
        }
    }

    /// Fluid interaction at the target cell. Water onto a lava source makes
    /// obsidian, onto flowing lava cobblestone; lava into water always
    /// cobblestone.
    fn contact(&mut self, world: &mut World, x: i32, y: i32, z: i32, self_is_water: bool, target: BlockId, tick: u64) {
        let product = if self_is_water {
            if is_fluid_source(target) { blocks::OBSIDIAN } else { blocks::COBBLESTONE }
        } else {
            blocks::COBBLESTONE
        };
        self.place(world, x, y, z, product, tick);
        self.schedule_fluid_neighbours(world, x, y, z, tick);
    }

    /// Write a block on behalf of the simulation, recording dirty chunks
    /// and lava light events, and igniting around newly placed lava.
    fn place(&mut self, world: &mut World, x: i32, y: i32, z: i32, id: BlockId, tick: u64) {
        let old = world.get_block(x, y, z);
        if world.set_block(x, y, z, id).is_none() {
            return;
        }
        mark_chunk_span(&mut self.dirty_chunks, x, z);
        if is_lava(old) != is_lava(id) {
            self.light_updates.push((x, y, z));
        }
        if is_lava(id) {
            self.ignite_around(world, x, y, z, tick);
        }
    }

    /// Reschedule any fluid neighbours of a changed cell.
    fn schedule_fluid_neighbours(&mut self, world: &World, x: i32, y: i32, z: i32, tick: u64) {
        for (dx, dy, dz) in [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)] {
            let (nx, ny, nz) = (x + dx, y + dy, z + dz);
            let nid = world.get_block(nx, ny, nz);
            if is_fluid(nid) {
                self.schedule(nx, ny, nz, tick + delay_for(nid, ny));
            }
        }
    }

    /// Newly placed lava burns flammable neighbours with a deterministic
    /// position-hashed chance of roughly one in four.
    pub fn ignite_around(&mut self, world: &mut World, x: i32, y: i32, z: i32, tick: u64) {
        for (dx, dy, dz) in [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)] {
            let (nx, ny, nz) = (x + dx, y + dy, z + dz);
            if !is_flammable(world.get_block(nx, ny, nz)) {
                continue;
            }
            if cell_hash(nx, ny, nz, tick) & 3 == 0 {
                if world.set_block(nx, ny, nz, blocks::AIR).is_some() {
                    mark_chunk_span(&mut self.dirty_chunks, nx, nz);
                }
            }
        }
    }

    /// Pick the horizontal spread directions: the shortest-path directions
    /// that reach a drop within `FLOW_SEARCH_DEPTH`, or all four when no
    /// drop is in sight.
    fn preferred_directions(&self, world: &World, x: i32, y: i32, z: i32) -> Vec<(i32, i32)> {
        let mut dist = [i32::MAX; 4];
        for (i, (dx, dz)) in HORIZONTAL.iter().enumerate() {
            for step in 1..=FLOW_SEARCH_DEPTH {
                let (px, pz) = (x + dx * step, z + dz * step);
                if !can_fluid_replace(world.get_block(px, y, pz)) {
                    break;
                }
                if can_fluid_replace(world.get_block(px, y - 1, pz)) {
                    dist[i] = step;
                    break;
                }
            }
        }

        let best = dist.iter().copied().min().unwrap_or(i32::MAX);
        if best == i32::MAX {
            return HORIZONTAL.to_vec();
        }
        HORIZONTAL
            .iter()
            .zip(dist)
            .filter_map(|(&d, s)| (s == best).then_some(d))
            .collect()
    }
}

#[inline]
fn with_level(water: bool, level: u8) -> BlockId {
    if water { water_with_level(level) } else { lava_with_level(level) }
}

#[inline]
fn same_fluid(id: BlockId, water: bool) -> bool {
    if water { is_water(id) } else { is_lava(id) }
}

/// Per-fluid reconsideration delay; lava is sluggish on the surface and
/// quicker underground.
#[inline]
#[must_use]
pub fn delay_for(id: BlockId, y: i32) -> u64 {
    if is_water(id) {
        WATER_TICK_DELAY
    } else if y >= SEA_LEVEL {
        LAVA_SURFACE_DELAY
    } else {
        LAVA_UNDERGROUND_DELAY
    }
}

#[inline]
fn max_spread_for(water: bool, y: i32) -> u8 {
    if water {
        7
    } else if y >= SEA_LEVEL {
        3
    } else {
        7
    }
}

// Deterministic per-cell-per-tick hash (splitmix-style avalanche).
fn cell_hash(x: i32, y: i32, z: i32, tick: u64) -> u64 {
    let mut s = (x as u32 as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (y as u32 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ (z as u32 as u64).wrapping_mul(0x1656_67B1_9E37_79F9)
        ^ tick.wrapping_mul(0xD6E8_FEB8_6659_FD93);
    s ^= s >> 30;
    s = s.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    s ^= s >> 27;
    s
}
