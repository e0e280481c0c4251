//! Column-shaping passes: base terrain, surface paint, caves, fluid fill.

use super::{world_x, world_z, GenContext};
use crate::block::{blocks, is_water};
use crate::chunk::{Chunk, CHUNK_SIZE, SEA_LEVEL};

/// Pass 1: stone below the terrain height, air above.
pub(crate) fn base_terrain(chunk: &mut Chunk, ctx: &GenContext) {
    for x in 0..CHUNK_SIZE {
        for z in 0..CHUNK_SIZE {
            let h = ctx.terrain_height(world_x(chunk.pos, x), world_z(chunk.pos, z));
            for y in 0..h as usize {
                chunk.set_block(x, y, z, blocks::STONE);
            }
        }
    }
}

/// Pass 2: bedrock floor, then per-column surfacing. Mountains above the
/// threshold stay bare stone; sub-sea columns get the sand/gravel pattern;
/// a sand band hugs sea level; everything else is grass over dirt, the dirt
/// thinning with altitude.
pub(crate) fn surface_paint(chunk: &mut Chunk, ctx: &GenContext) {
    let c = &ctx.config;
    for x in 0..CHUNK_SIZE {
        for z in 0..CHUNK_SIZE {
            chunk.set_block(x, 0, z, blocks::BEDROCK);

            let Some(top) = chunk.column_top(x, z) else { continue };
            let top_i = top as i32;
            if top_i + 1 >= c.mountain_threshold {
                continue; // stone mountain
            }

            let wx = f64::from(world_x(chunk.pos, x));
            let wz = f64::from(world_z(chunk.pos, z));
            let beach = ctx.beach.sample2(wx * c.beach_scale, wz * c.beach_scale);
            let erosion = ctx.erosion.sample2(wx * c.erosion_scale, wz * c.erosion_scale);

            #[allow(clippy::cast_possible_truncation)]
            let mut layers = c.dirt_depth + (erosion * 2.0).round() as i32;
            if top_i > 85 {
                layers -= 2;
            } else if top_i > 75 {
                layers -= 1;
            }
            let layers = layers.max(0);

            let (surface, under) = if top_i < SEA_LEVEL - 1 {
                // Sea floor: sand and gravel patches, dirt elsewhere.
                if beach > c.beach_threshold {
                    (blocks::SAND, blocks::SAND)
                } else if erosion > c.gravel_threshold {
                    (blocks::GRAVEL, blocks::GRAVEL)
                } else {
                    (blocks::DIRT, blocks::DIRT)
                }
            } else if top_i <= SEA_LEVEL + 1 {
                (blocks::SAND, blocks::SAND) // beach band
            } else {
                (blocks::GRASS, blocks::DIRT)
            };

            chunk.set_block(x, top, z, surface);
            for d in 1..=layers {
                let y = top_i - d;
                if y <= 0 {
                    break;
                }
                if chunk.get_block(x, y as usize, z) == blocks::STONE {
                    chunk.set_block(x, y as usize, z, under);
                }
            }
        }
    }
}

/// Pass 3: multi-field cave carving. Two spaghetti systems (the secondary at
/// 0.65x frequency), low-frequency rooms and sparse vertical shafts, all
/// scaled by a depth factor so caves widen with depth and pinch off near the
/// surface. The margin below the painted surface is never carved.
pub(crate) fn carve_caves(chunk: &mut Chunk, ctx: &GenContext) {
    let c = &ctx.config;
    for x in 0..CHUNK_SIZE {
        for z in 0..CHUNK_SIZE {
            let Some(top) = chunk.column_top(x, z) else { continue };
            let surface = top as i32 + 1;
            let max_y = surface - c.cave_surface_margin;

            let wx = f64::from(world_x(chunk.pos, x));
            let wz = f64::from(world_z(chunk.pos, z));

            for y in c.cave_min_y..max_y {
                let yf = f64::from(y);
                let depth_factor = 0.5 + (1.0 - yf / f64::from(surface)) * 0.5;

                // Oblate the spaghetti fields so tunnels run wide, not tall.
                let ys = yf * 0.7;
                let t = c.cave_threshold * depth_factor;
                let limit = t * t * 0.25;

                let s = c.cave_scale;
                let n1 = ctx.cave_a.sample3(wx * s, ys * s, wz * s);
                let n2 = ctx.cave_b.sample3(wx * s, ys * s, wz * s);
                let mut carve = n1 * n1 + n2 * n2 < limit;

                if !carve {
                    let s2 = s * 0.65;
                    let m1 = ctx.cave_c.sample3(wx * s2, ys * s2, wz * s2);
                    let m2 = ctx.cave_d.sample3(wx * s2, ys * s2, wz * s2);
                    carve = m1 * m1 + m2 * m2 < limit;
                }
                if !carve {
                    let r = ctx.room.sample3(wx * c.room_scale, yf * c.room_scale, wz * c.room_scale);
                    carve = r.abs() < c.room_threshold * depth_factor;
                }
                if !carve {
                    // Shafts: near-vertical wells from a slowly varying field.
                    let sh = ctx.shaft.sample3(wx * c.shaft_scale, yf * 0.02, wz * c.shaft_scale);
                    carve = sh.abs() < c.shaft_threshold;
                }

                if carve {
                    let y = y as usize;
                    if chunk.get_block(x, y, z) != blocks::BEDROCK {
                        chunk.set_block(x, y, z, blocks::AIR);
                    }
                }
            }
        }
    }
}

/// Pass 4: walk each column down from sea level, flooding air with water
/// until something other than air or water stops the walk. Fills seas and
/// any cave mouth that opened below sea level.
pub(crate) fn fluid_fill(chunk: &mut Chunk, _ctx: &GenContext) {
    for x in 0..CHUNK_SIZE {
        for z in 0..CHUNK_SIZE {
            for y in (1..SEA_LEVEL as usize).rev() {
                let id = chunk.get_block(x, y, z);
                if id == blocks::AIR {
                    chunk.set_block(x, y, z, blocks::WATER_SOURCE);
                } else if !is_water(id) {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkPos;
    use crate::worldgen::GenConfig;

    fn ctx() -> GenContext {
        GenContext::new(42, GenConfig::default())
    }

    #[test]
    fn base_terrain_is_stone_below_air_above() {
        let ctx = ctx();
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        base_terrain(&mut chunk, &ctx);
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                let h = ctx.terrain_height(x as i32, z as i32) as usize;
                assert_eq!(chunk.get_block(x, h - 1, z), blocks::STONE);
                assert_eq!(chunk.get_block(x, h, z), blocks::AIR);
            }
        }
    }

    #[test]
    fn surface_paint_grass_needs_dirt_below() {
        let ctx = ctx();
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        base_terrain(&mut chunk, &ctx);
        surface_paint(&mut chunk, &ctx);
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                let top = chunk.column_top(x, z).expect("terrain column");
                if chunk.get_block(x, top, z) == blocks::GRASS && top > 1 {
                    let below = chunk.get_block(x, top - 1, z);
                    assert!(
                        below == blocks::DIRT || below == blocks::STONE,
                        "grass over {below}"
                    );
                }
            }
        }
    }

    #[test]
    fn caves_never_break_the_surface_margin() {
        let ctx = ctx();
        let mut chunk = Chunk::new(ChunkPos::new(5, 9));
        base_terrain(&mut chunk, &ctx);
        surface_paint(&mut chunk, &ctx);
        let tops: Vec<usize> = (0..CHUNK_SIZE * CHUNK_SIZE)
            .map(|i| chunk.column_top(i % CHUNK_SIZE, i / CHUNK_SIZE).unwrap())
            .collect();
        carve_caves(&mut chunk, &ctx);
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                let top = tops[z * CHUNK_SIZE + x];
                let margin = ctx.config.cave_surface_margin as usize;
                for y in (top + 1).saturating_sub(margin)..=top {
                    assert_ne!(
                        chunk.get_block(x, y, z),
                        blocks::AIR,
                        "carved inside the surface margin at ({x},{y},{z})"
                    );
                }
            }
        }
    }

    #[test]
    fn fluid_fill_stops_at_solid_ceilings() {
        let ctx = ctx();
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        // A hand-built column: stone floor at 40, air pocket 41..45, stone lid
        // at 46, then air to the sky. Water must not leak under the lid.
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                for y in 0..=40 {
                    chunk.set_block(x, y, z, blocks::STONE);
                }
                chunk.set_block(x, 46, z, blocks::STONE);
            }
        }
        fluid_fill(&mut chunk, &ctx);
        assert_eq!(chunk.get_block(8, 45, 8), blocks::AIR, "water leaked through the lid");
        assert_eq!(chunk.get_block(8, SEA_LEVEL as usize - 1, 8), blocks::WATER_SOURCE);
        assert_eq!(chunk.get_block(8, 47, 8), blocks::WATER_SOURCE);
        assert_eq!(chunk.get_block(8, SEA_LEVEL as usize, 8), blocks::AIR);
    }
}
