//! Feature passes: ore veins, trees, surface decorations.
//!
//! All randomness comes from the chunk-seeded RNG streams, one salt per
//! pass, so feature placement is deterministic and passes stay independent.

use super::{salt, world_x, world_z, GenContext};
use crate::block::{blocks, is_water};
use crate::chunk::{Chunk, CHUNK_SIZE, CHUNK_SIZE_I32, WORLD_HEIGHT};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Pass 5: random-walk ore veins, replacing stone only.
pub(crate) fn ore_veins(chunk: &mut Chunk, ctx: &GenContext) {
    let mut rng = ctx.rng_for(chunk.pos, salt::ORES);
    for ore in &ctx.config.ores {
        for _ in 0..ore.attempts {
            let mut x = rng.gen_range(0..CHUNK_SIZE_I32);
            let mut z = rng.gen_range(0..CHUNK_SIZE_I32);
            let mut y = rng.gen_range(ore.min_y..=ore.max_y);

            for _ in 0..ore.vein_size {
                if (0..CHUNK_SIZE_I32).contains(&x)
                    && (0..CHUNK_SIZE_I32).contains(&z)
                    && (1..WORLD_HEIGHT as i32).contains(&y)
                    && chunk.get_block(x as usize, y as usize, z as usize) == blocks::STONE
                {
                    chunk.set_block(x as usize, y as usize, z as usize, ore.block);
                }
                x += rng.gen_range(-1..=1);
                y += rng.gen_range(-1..=1);
                z += rng.gen_range(-1..=1);
            }
        }
    }
}

/// Pass 6: forest patches. A low-frequency density noise picks 0-4 patches
/// for the chunk; each patch scatters 5-12 tree attempts around its centre,
/// keeping every canopy inside the chunk via the edge margin.
pub(crate) fn trees(chunk: &mut Chunk, ctx: &GenContext) {
    let c = &ctx.config;
    let mut rng = ctx.rng_for(chunk.pos, salt::TREES);

    let cwx = f64::from(world_x(chunk.pos, CHUNK_SIZE / 2));
    let cwz = f64::from(world_z(chunk.pos, CHUNK_SIZE / 2));
    let density = (ctx.forest.sample2(cwx * c.forest_scale, cwz * c.forest_scale) + 1.0) * 0.5;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let patches = (density * 4.0) as i32; // 0..4

    let margin = c.tree_edge_margin;
    for _ in 0..patches {
        let px = rng.gen_range(margin..CHUNK_SIZE_I32 - margin);
        let pz = rng.gen_range(margin..CHUNK_SIZE_I32 - margin);
        let count = rng.gen_range(5..=12);
        for _ in 0..count {
            let tx = px + rng.gen_range(-c.tree_patch_spread..=c.tree_patch_spread);
            let tz = pz + rng.gen_range(-c.tree_patch_spread..=c.tree_patch_spread);
            if tx < margin || tx >= CHUNK_SIZE_I32 - margin || tz < margin || tz >= CHUNK_SIZE_I32 - margin {
                continue;
            }
            try_place_tree(chunk, &mut rng, tx as usize, tz as usize);
        }
    }
}

fn try_place_tree(chunk: &mut Chunk, rng: &mut ChaCha8Rng, x: usize, z: usize) {
    let Some(top) = chunk.column_top(x, z) else { return };
    if chunk.get_block(x, top, z) != blocks::GRASS {
        return;
    }

    let trunk_h: usize = rng.gen_range(4..=6);
    let base = top + 1;
    if base + trunk_h + 3 >= WORLD_HEIGHT {
        return;
    }
    // Clear headroom for the trunk plus canopy.
    for dy in 0..trunk_h + 3 {
        if chunk.get_block(x, base + dy, z) != blocks::AIR {
            return;
        }
    }

    chunk.set_block(x, top, z, blocks::DIRT);
    for dy in 0..trunk_h {
        chunk.set_block(x, base + dy, z, blocks::LOG);
    }

    let crown = base + trunk_h; // first cell above the top log
    place_canopy_square(chunk, rng, x, z, crown - 2, true);
    place_canopy_square(chunk, rng, x, z, crown - 1, false);
    // 3x3 cross.
    for (dx, dz) in [(0i32, 0i32), (1, 0), (-1, 0), (0, 1), (0, -1)] {
        leaf(chunk, x as i32 + dx, crown as i32, z as i32 + dz);
    }
    // Single tip.
    leaf(chunk, x as i32, crown as i32 + 1, z as i32);
}

/// One 5x5 canopy layer; corner cells are randomly dropped on the layer
/// that asks for it.
fn place_canopy_square(chunk: &mut Chunk, rng: &mut ChaCha8Rng, x: usize, z: usize, y: usize, ragged: bool) {
    for dx in -2i32..=2 {
        for dz in -2i32..=2 {
            if ragged && dx.abs() == 2 && dz.abs() == 2 && rng.gen_bool(0.5) {
                continue;
            }
            leaf(chunk, x as i32 + dx, y as i32, z as i32 + dz);
        }
    }
}

fn leaf(chunk: &mut Chunk, x: i32, y: i32, z: i32) {
    if !(0..CHUNK_SIZE_I32).contains(&x) || !(0..CHUNK_SIZE_I32).contains(&z) || y < 0 {
        return;
    }
    let (x, y, z) = (x as usize, y as usize, z as usize);
    if chunk.get_block(x, y, z) == blocks::AIR {
        chunk.set_block(x, y, z, blocks::LEAVES);
    }
}

/// Pass 7: flowers, tall grass, shaded mushrooms and water-side sugar cane.
pub(crate) fn decorations(chunk: &mut Chunk, ctx: &GenContext) {
    let mut rng = ctx.rng_for(chunk.pos, salt::DECOR);

    // Flowers on flat, open grass.
    for _ in 0..6 {
        let x = rng.gen_range(0..CHUNK_SIZE);
        let z = rng.gen_range(0..CHUNK_SIZE);
        if let Some(top) = flat_grass_top(chunk, x, z) {
            let flower = if rng.gen_bool(0.5) { blocks::DANDELION } else { blocks::ROSE };
            chunk.set_block(x, top + 1, z, flower);
        }
    }

    // Tall grass, denser than flowers.
    for _ in 0..12 {
        let x = rng.gen_range(0..CHUNK_SIZE);
        let z = rng.gen_range(0..CHUNK_SIZE);
        if let Some(top) = flat_grass_top(chunk, x, z) {
            chunk.set_block(x, top + 1, z, blocks::TALL_GRASS);
        }
    }

    // Mushrooms want shade: a grass/dirt cell with open air above it but
    // something (canopy) higher in the same column.
    for _ in 0..4 {
        let x = rng.gen_range(0..CHUNK_SIZE);
        let z = rng.gen_range(0..CHUNK_SIZE);
        let Some(col_top) = chunk.column_top(x, z) else { continue };
        let Some(y) = surface_under_cover(chunk, x, z, col_top) else { continue };
        let shroom = if rng.gen_bool(0.5) { blocks::BROWN_MUSHROOM } else { blocks::RED_MUSHROOM };
        chunk.set_block(x, y + 1, z, shroom);
    }

    // Sugar cane beside water.
    for _ in 0..10 {
        let x = rng.gen_range(0..CHUNK_SIZE);
        let z = rng.gen_range(0..CHUNK_SIZE);
        let Some(top) = chunk.column_top(x, z) else { continue };
        let ground = chunk.get_block(x, top, z);
        if !matches!(ground, blocks::GRASS | blocks::SAND | blocks::DIRT) {
            continue;
        }
        if !beside_water(chunk, x, top, z) {
            continue;
        }
        let height = rng.gen_range(1..=3usize);
        for dy in 1..=height {
            if top + dy >= WORLD_HEIGHT || chunk.get_block(x, top + dy, z) != blocks::AIR {
                break;
            }
            chunk.set_block(x, top + dy, z, blocks::SUGAR_CANE);
        }
    }
}

/// Grass column top on terrain with slope <= 1, with air above.
fn flat_grass_top(chunk: &Chunk, x: usize, z: usize) -> Option<usize> {
    let top = chunk.column_top(x, z)?;
    if chunk.get_block(x, top, z) != blocks::GRASS || top + 1 >= WORLD_HEIGHT {
        return None;
    }
    if slope_at(chunk, x, z, top) > 1 {
        return None;
    }
    Some(top)
}

/// Max column-top difference against in-chunk neighbours; columns past the
/// chunk border count as level.
fn slope_at(chunk: &Chunk, x: usize, z: usize, top: usize) -> i32 {
    let mut worst = 0i32;
    for (dx, dz) in [(1i32, 0i32), (-1, 0), (0, 1), (0, -1)] {
        let nx = x as i32 + dx;
        let nz = z as i32 + dz;
        if !(0..CHUNK_SIZE_I32).contains(&nx) || !(0..CHUNK_SIZE_I32).contains(&nz) {
            continue;
        }
        if let Some(ntop) = chunk.column_top(nx as usize, nz as usize) {
            worst = worst.max((top as i32 - ntop as i32).abs());
        }
    }
    worst
}

/// Highest grass/dirt cell with air directly above but cover further up.
fn surface_under_cover(chunk: &Chunk, x: usize, z: usize, col_top: usize) -> Option<usize> {
    (1..col_top).rev().find(|&y| {
        matches!(chunk.get_block(x, y, z), blocks::GRASS | blocks::DIRT)
            && chunk.get_block(x, y + 1, z) == blocks::AIR
    })
}

fn beside_water(chunk: &Chunk, x: usize, y: usize, z: usize) -> bool {
    for (dx, dz) in [(1i32, 0i32), (-1, 0), (0, 1), (0, -1)] {
        let nx = x as i32 + dx;
        let nz = z as i32 + dz;
        if !(0..CHUNK_SIZE_I32).contains(&nx) || !(0..CHUNK_SIZE_I32).contains(&nz) {
            continue;
        }
        if is_water(chunk.get_block(nx as usize, y, nz as usize)) {
            return true;
        }
    }
    false
}
