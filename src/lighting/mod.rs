//! Sky- and block-light propagation.
//!
//! Two 4-bit channels share the chunk's packed light array: sky light
//! (source: the open sky, full-strength down air columns) and block light
//! (source: emissive blocks). Fresh chunks are lit chunk-locally on arrival;
//! after that, every edit goes through the incremental add/remove BFS here,
//! which runs on the main thread and reports the chunks whose cells changed
//! so the stream manager can queue remeshes.
//!
//! The direct-sun column stops at the first attenuating cell (water,
//! leaves); below that the regular BFS carries the light down with the
//! per-step decrement plus attenuation, which keeps the two code paths
//! consistent with each other.

use crate::block::{attenuation, emission, is_opaque, BlockId};
use crate::chunk::{Chunk, CHUNK_SIZE, CHUNK_SIZE_I32, WORLD_HEIGHT, WORLD_HEIGHT_I32};
use crate::world::World;
use std::collections::{HashSet, VecDeque};

const DIRS: [(i32, i32, i32); 6] =
    [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Channel {
    Sky,
    Block,
}

#[inline]
fn read(world: &World, ch: Channel, x: i32, y: i32, z: i32) -> u8 {
    match ch {
        Channel::Sky => world.get_sky_light(x, y, z),
        Channel::Block => world.get_block_light(x, y, z),
    }
}

#[inline]
fn write(world: &mut World, ch: Channel, x: i32, y: i32, z: i32, level: u8, affected: &mut HashSet<u64>) {
    if !world.is_loaded_world(x, z) {
        return;
    }
    match ch {
        Channel::Sky => world.set_sky_light(x, y, z, level),
        Channel::Block => world.set_block_light(x, y, z, level),
    }
    mark_affected(affected, x, z);
}

/// Record the owning chunk of a changed cell, plus any neighbour chunk whose
/// mesh samples this cell across the border.
#[inline]
fn mark_affected(affected: &mut HashSet<u64>, x: i32, z: i32) {
    crate::chunk::mark_chunk_span(affected, x, z);
}

/// The step rule: light entering a neighbour cell. A 15 sky value falls
/// straight down through non-attenuating cells without loss; every other
/// move pays the step cost plus the target's attenuation.
#[inline]
fn stepped(ch: Channel, level: u8, dy: i32, target_att: u8) -> u8 {
    if ch == Channel::Sky && dy == -1 && level == 15 && target_att == 0 {
        15
    } else {
        level.saturating_sub(1 + target_att)
    }
}

// ---------------------------------------------------------------------------
// Initial lighting for a fresh chunk (chunk-local; absent neighbours stay
// dark until they light themselves on arrival).
// ---------------------------------------------------------------------------

/// Cast the sky into a fresh chunk: direct-sun columns from the top, then a
/// BFS flood to fill overhangs and cave mouths.
pub fn compute_initial_sky_light(chunk: &mut Chunk) {
    let mut queue: VecDeque<(usize, usize, usize)> = VecDeque::new();
    for x in 0..CHUNK_SIZE {
        for z in 0..CHUNK_SIZE {
            for y in (0..WORLD_HEIGHT).rev() {
                let id = chunk.get_block(x, y, z);
                if is_opaque(id) || attenuation(id) > 0 {
                    break;
                }
                chunk.set_sky_light(x, y, z, 15);
                queue.push_back((x, y, z));
            }
        }
    }
    flood_chunk(chunk, Channel::Sky, &mut queue);
}

/// Seed and flood block light from the chunk's own emissive cells.
pub fn compute_initial_block_light(chunk: &mut Chunk) {
    let mut queue: VecDeque<(usize, usize, usize)> = VecDeque::new();
    for y in 0..WORLD_HEIGHT {
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let em = emission(chunk.get_block(x, y, z));
                if em > 0 {
                    chunk.set_block_light(x, y, z, em);
                    queue.push_back((x, y, z));
                }
            }
        }
    }
    flood_chunk(chunk, Channel::Block, &mut queue);
}

fn flood_chunk(chunk: &mut Chunk, ch: Channel, queue: &mut VecDeque<(usize, usize, usize)>) {
    while let Some((x, y, z)) = queue.pop_front() {
        let level = match ch {
            Channel::Sky => chunk.get_sky_light(x, y, z),
            Channel::Block => chunk.get_block_light(x, y, z),
        };
        if level == 0 {
            continue;
        }
        for (dx, dy, dz) in DIRS {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            let nz = z as i32 + dz;
            if !(0..CHUNK_SIZE_I32).contains(&nx)
                || !(0..CHUNK_SIZE_I32).contains(&nz)
                || !(0..WORLD_HEIGHT_I32).contains(&ny)
            {
                continue;
            }
            let (nx, ny, nz) = (nx as usize, ny as usize, nz as usize);
            let nid = chunk.get_block(nx, ny, nz);
            if is_opaque(nid) {
                continue;
            }
            let new = stepped(ch, level, dy, attenuation(nid));
            let cur = match ch {
                Channel::Sky => chunk.get_sky_light(nx, ny, nz),
                Channel::Block => chunk.get_block_light(nx, ny, nz),
            };
            if new > cur {
                match ch {
                    Channel::Sky => chunk.set_sky_light(nx, ny, nz, new),
                    Channel::Block => chunk.set_block_light(nx, ny, nz, new),
                }
                queue.push_back((nx, ny, nz));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Incremental updates (world-wide, main thread only).
// ---------------------------------------------------------------------------

fn flood_world(world: &mut World, ch: Channel, queue: &mut VecDeque<(i32, i32, i32)>, affected: &mut HashSet<u64>) {
    while let Some((x, y, z)) = queue.pop_front() {
        let level = read(world, ch, x, y, z);
        if level == 0 {
            continue;
        }
        for (dx, dy, dz) in DIRS {
            let (nx, ny, nz) = (x + dx, y + dy, z + dz);
            if !(0..WORLD_HEIGHT_I32).contains(&ny) || !world.is_loaded_world(nx, nz) {
                continue;
            }
            let nid = world.get_block(nx, ny, nz);
            if is_opaque(nid) {
                continue;
            }
            let new = stepped(ch, level, dy, attenuation(nid));
            if new > read(world, ch, nx, ny, nz) {
                write(world, ch, nx, ny, nz, new, affected);
                queue.push_back((nx, ny, nz));
            }
        }
    }
}

/// Two-phase removal. Cells strictly darker than the light that fed them are
/// zeroed and chased; brighter-or-equal neighbours become re-flood seeds.
fn unlight_world(
    world: &mut World,
    ch: Channel,
    starts: Vec<(i32, i32, i32, u8)>,
    affected: &mut HashSet<u64>,
) -> VecDeque<(i32, i32, i32)> {
    let mut remove_q: VecDeque<(i32, i32, i32, u8)> = starts.into();
    let mut seeds: VecDeque<(i32, i32, i32)> = VecDeque::new();
    while let Some((x, y, z, prior)) = remove_q.pop_front() {
        for (dx, dy, dz) in DIRS {
            let (nx, ny, nz) = (x + dx, y + dy, z + dz);
            if !(0..WORLD_HEIGHT_I32).contains(&ny) || !world.is_loaded_world(nx, nz) {
                continue;
            }
            let nl = read(world, ch, nx, ny, nz);
            if nl == 0 {
                continue;
            }
            let fed_by_us =
                nl < prior || (ch == Channel::Sky && dy == -1 && prior == 15 && nl == 15);
            if fed_by_us {
                write(world, ch, nx, ny, nz, 0, affected);
                remove_q.push_back((nx, ny, nz, nl));
            } else {
                seeds.push_back((nx, ny, nz));
            }
        }
    }
    seeds
}

/// Whether the column strictly above (x, y, z) is pure open sky: no opaque
/// and no attenuating cell all the way up.
fn sun_column_above(world: &World, x: i32, y: i32, z: i32) -> bool {
    for yy in y + 1..WORLD_HEIGHT_I32 {
        let id = world.get_block(x, yy, z);
        if is_opaque(id) || attenuation(id) > 0 {
            return false;
        }
    }
    true
}

/// Sky-channel update after the cell at (x, y, z) became easier to light
/// (block removed or swapped for something clearer). The new block id must
/// already be written to the world.
fn sky_on_cleared(world: &mut World, x: i32, y: i32, z: i32, affected: &mut HashSet<u64>) {
    let mut queue: VecDeque<(i32, i32, i32)> = VecDeque::new();
    if sun_column_above(world, x, y, z) && attenuation(world.get_block(x, y, z)) == 0 {
        write(world, Channel::Sky, x, y, z, 15, affected);
        queue.push_back((x, y, z));
        // The freed column carries direct sun downward until something
        // attenuates or blocks it.
        let mut yy = y - 1;
        while yy >= 0 {
            let id = world.get_block(x, yy, z);
            if is_opaque(id) || attenuation(id) > 0 {
                break;
            }
            write(world, Channel::Sky, x, yy, z, 15, affected);
            queue.push_back((x, yy, z));
            yy -= 1;
        }
    } else {
        let mut best = 0u8;
        for (dx, dy, dz) in DIRS {
            best = best.max(read(world, Channel::Sky, x + dx, y + dy, z + dz));
        }
        let att = attenuation(world.get_block(x, y, z));
        // A 15 directly above pours in at full strength; anything else pays
        // the step cost.
        let new = if att == 0 && read(world, Channel::Sky, x, y + 1, z) == 15 {
            15
        } else {
            best.saturating_sub(1 + att)
        };
        if new > read(world, Channel::Sky, x, y, z) {
            write(world, Channel::Sky, x, y, z, new, affected);
            queue.push_back((x, y, z));
        }
    }
    flood_world(world, Channel::Sky, &mut queue, affected);
}

/// Sky-channel update after the cell at (x, y, z) became harder to light
/// (block placed or swapped for something murkier).
fn sky_on_obstructed(world: &mut World, x: i32, y: i32, z: i32, affected: &mut HashSet<u64>) {
    let prior = read(world, Channel::Sky, x, y, z);
    write(world, Channel::Sky, x, y, z, 0, affected);
    let mut starts = vec![(x, y, z, prior)];

    if prior == 15 {
        // Shadow the direct-sun cells straight below, if any.
        let mut yy = y - 1;
        while yy >= 0 {
            let id = world.get_block(x, yy, z);
            if is_opaque(id) || attenuation(id) > 0 {
                break;
            }
            if read(world, Channel::Sky, x, yy, z) != 15 {
                break;
            }
            write(world, Channel::Sky, x, yy, z, 0, affected);
            starts.push((x, yy, z, 15));
            yy -= 1;
        }
    }

    let mut seeds = unlight_world(world, Channel::Sky, starts, affected);
    flood_world(world, Channel::Sky, &mut seeds, affected);

    // The obstructing cell itself may still admit light (water, leaves).
    let id = world.get_block(x, y, z);
    if !is_opaque(id) {
        sky_on_cleared(world, x, y, z, affected);
    }
}

/// Block-light refill after a cell opened up: pull from the brightest
/// neighbour and flood.
fn block_on_cleared(world: &mut World, x: i32, y: i32, z: i32, affected: &mut HashSet<u64>) {
    let mut best = 0u8;
    for (dx, dy, dz) in DIRS {
        best = best.max(read(world, Channel::Block, x + dx, y + dy, z + dz));
    }
    let att = attenuation(world.get_block(x, y, z));
    let new = best.saturating_sub(1 + att);
    if new > read(world, Channel::Block, x, y, z) {
        write(world, Channel::Block, x, y, z, new, affected);
        let mut queue = VecDeque::from([(x, y, z)]);
        flood_world(world, Channel::Block, &mut queue, affected);
    }
}

/// Block-light removal after an opaque cell displaced lit air.
fn block_on_obstructed(world: &mut World, x: i32, y: i32, z: i32, affected: &mut HashSet<u64>) {
    let prior = read(world, Channel::Block, x, y, z);
    write(world, Channel::Block, x, y, z, 0, affected);
    if prior == 0 {
        return;
    }
    let mut seeds = unlight_world(world, Channel::Block, vec![(x, y, z, prior)], affected);
    flood_world(world, Channel::Block, &mut seeds, affected);
}

/// A light source appeared (or brightened) at (x, y, z).
pub fn on_light_source_placed(world: &mut World, x: i32, y: i32, z: i32, em: u8, affected: &mut HashSet<u64>) {
    if em > read(world, Channel::Block, x, y, z) {
        write(world, Channel::Block, x, y, z, em, affected);
        let mut queue = VecDeque::from([(x, y, z)]);
        flood_world(world, Channel::Block, &mut queue, affected);
    }
}

/// A light source disappeared from (x, y, z): two-phase removal of the
/// light it fed, then re-flood from surviving neighbours.
pub fn on_light_source_removed(world: &mut World, x: i32, y: i32, z: i32, affected: &mut HashSet<u64>) {
    let prior = read(world, Channel::Block, x, y, z);
    write(world, Channel::Block, x, y, z, 0, affected);
    if prior == 0 {
        return;
    }
    let mut seeds = unlight_world(world, Channel::Block, vec![(x, y, z, prior)], affected);
    flood_world(world, Channel::Block, &mut seeds, affected);
}

/// Run both light channels for a block swap at (x, y, z). The new id must
/// already be written to the world. Returns the packed keys of every chunk
/// whose light (or border-visible cells) changed; the caller queues those
/// for remeshing.
#[must_use]
pub fn update_for_edit(world: &mut World, x: i32, y: i32, z: i32, old_id: BlockId, new_id: BlockId) -> HashSet<u64> {
    let mut affected = HashSet::new();
    mark_affected(&mut affected, x, z);

    // Sky channel reacts to opacity/attenuation transitions.
    let old_cost = if is_opaque(old_id) { u8::MAX } else { attenuation(old_id) };
    let new_cost = if is_opaque(new_id) { u8::MAX } else { attenuation(new_id) };
    if new_cost > old_cost {
        sky_on_obstructed(world, x, y, z, &mut affected);
    } else if new_cost < old_cost {
        sky_on_cleared(world, x, y, z, &mut affected);
    }

    // Block-light channel: emission changes first, then obstruction. The
    // same cost model as the sky applies (water and leaves slow block
    // light too).
    let old_em = emission(old_id);
    let new_em = emission(new_id);
    if old_em > 0 && new_em < old_em {
        on_light_source_removed(world, x, y, z, &mut affected);
    }
    if new_cost > old_cost {
        block_on_obstructed(world, x, y, z, &mut affected);
    } else if new_cost < old_cost {
        block_on_cleared(world, x, y, z, &mut affected);
    }
    if new_em > 0 {
        on_light_source_placed(world, x, y, z, new_em, &mut affected);
    }

    affected
}
