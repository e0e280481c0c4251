//! Procedural terrain generation.
//!
//! The world is generated one chunk at a time by an ordered list of passes,
//! each a function over `(chunk, context)`. Passes read and write only the
//! target chunk, so generation is embarrassingly parallel across chunks and
//! can run on the async compute pool. The `GenContext` owns the seed, the
//! tuning config and the shared noise fields; it is built once and shared
//! behind an `Arc` by every generation job.

use crate::chunk::{Chunk, ChunkPos, CHUNK_SIZE, SEA_LEVEL, WORLD_HEIGHT};
use crate::noise::{chunk_rng, CombinedNoise, OctaveNoise, Perlin};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

mod features;
mod terrain;

/// RNG stream salts, one per randomized pass.
pub(crate) mod salt {
    pub const ORES: u64 = 0x01;
    pub const TREES: u64 = 0x02;
    pub const DECOR: u64 = 0x03;
}

/// A single ore type's placement parameters.
#[derive(Clone, Debug)]
pub struct OreSpec {
    pub block: u8,
    pub attempts: u32,
    pub vein_size: u32,
    pub min_y: i32,
    pub max_y: i32,
}

/// Tuning knobs for the generation pipeline. The defaults reproduce the
/// reference terrain character; a malformed configuration fails fatally at
/// context construction.
#[derive(Clone, Debug)]
pub struct GenConfig {
    // Base terrain.
    pub terrain_amplitude: f64,
    pub terrain_scale: f64,
    pub selector_scale: f64,
    pub base_height: f64,

    // Surface paint.
    pub mountain_threshold: i32,
    pub dirt_depth: i32,
    pub beach_scale: f64,
    pub erosion_scale: f64,
    pub beach_threshold: f64,
    pub gravel_threshold: f64,

    // Caves.
    pub cave_min_y: i32,
    pub cave_surface_margin: i32,
    pub cave_scale: f64,
    pub cave_threshold: f64,
    pub room_scale: f64,
    pub room_threshold: f64,
    pub shaft_scale: f64,
    pub shaft_threshold: f64,

    // Features.
    pub ores: Vec<OreSpec>,
    pub forest_scale: f64,
    pub tree_edge_margin: i32,
    pub tree_patch_spread: i32,
}

impl Default for GenConfig {
    fn default() -> Self {
        use crate::block::blocks;
        GenConfig {
            terrain_amplitude: 260.0,
            terrain_scale: 0.013,
            selector_scale: 0.005,
            base_height: 64.0,

            mountain_threshold: 90,
            dirt_depth: 3,
            beach_scale: 0.03,
            erosion_scale: 0.05,
            beach_threshold: 0.06,
            gravel_threshold: 0.09,

            cave_min_y: 5,
            cave_surface_margin: 4,
            cave_scale: 0.05,
            cave_threshold: 0.12,
            room_scale: 0.015,
            room_threshold: 0.06,
            shaft_scale: 0.07,
            shaft_threshold: 0.009,

            ores: vec![
                OreSpec { block: blocks::COAL_ORE, attempts: 20, vein_size: 8, min_y: 1, max_y: 127 },
                OreSpec { block: blocks::IRON_ORE, attempts: 15, vein_size: 6, min_y: 1, max_y: 64 },
                OreSpec { block: blocks::GOLD_ORE, attempts: 4, vein_size: 5, min_y: 1, max_y: 32 },
                OreSpec { block: blocks::DIAMOND_ORE, attempts: 2, vein_size: 4, min_y: 1, max_y: 16 },
            ],
            forest_scale: 0.003,
            tree_edge_margin: 2,
            tree_patch_spread: 5,
        }
    }
}

/// Shared, immutable generation state: seed, config and the noise fields
/// every pass samples. Safe for concurrent evaluation.
pub struct GenContext {
    pub seed: u64,
    pub config: GenConfig,

    pub(crate) terrain_low: CombinedNoise,
    pub(crate) terrain_high: CombinedNoise,
    pub(crate) selector: OctaveNoise,

    pub(crate) beach: OctaveNoise,
    pub(crate) erosion: OctaveNoise,

    pub(crate) cave_a: Perlin,
    pub(crate) cave_b: Perlin,
    pub(crate) cave_c: Perlin,
    pub(crate) cave_d: Perlin,
    pub(crate) room: Perlin,
    pub(crate) shaft: Perlin,

    pub(crate) forest: OctaveNoise,
}

impl GenContext {
    /// Build the context. All noise fields are seeded from a single ChaCha
    /// stream in a fixed order, so a seed fully determines the world.
    ///
    /// # Panics
    /// Asserts the configuration is sane; a malformed config is a
    /// programmer error, not a recoverable condition.
    #[must_use]
    pub fn new(seed: u64, config: GenConfig) -> Self {
        assert!(config.terrain_amplitude > 0.0, "terrain amplitude must be positive");
        assert!(config.terrain_scale > 0.0 && config.selector_scale > 0.0);
        assert!(config.cave_min_y >= 1 && config.cave_surface_margin >= 0);
        assert!(config.dirt_depth >= 0);
        assert!(config.tree_edge_margin >= 2, "tree canopies need two blocks of margin");
        for ore in &config.ores {
            assert!(ore.min_y >= 0 && ore.max_y < WORLD_HEIGHT as i32 && ore.min_y <= ore.max_y);
            assert!(ore.vein_size > 0);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut next = move || -> u64 { rng.r#gen() };

        GenContext {
            terrain_low: CombinedNoise::new(
                OctaveNoise::new(next(), 8),
                OctaveNoise::new(next(), 4),
                8.0,
            ),
            terrain_high: CombinedNoise::new(
                OctaveNoise::new(next(), 8),
                OctaveNoise::new(next(), 4),
                8.0,
            ),
            selector: OctaveNoise::new(next(), 4),
            beach: OctaveNoise::new(next(), 4),
            erosion: OctaveNoise::new(next(), 4),
            cave_a: Perlin::new(next()),
            cave_b: Perlin::new(next()),
            cave_c: Perlin::new(next()),
            cave_d: Perlin::new(next()),
            room: Perlin::new(next()),
            shaft: Perlin::new(next()),
            forest: OctaveNoise::new(next(), 4),
            seed,
            config,
        }
    }

    /// Terrain height for a world column: the Y of the first air block above
    /// the stone fill. Pure, usable for the spawn search without generating.
    #[must_use]
    pub fn terrain_height(&self, wx: i32, wz: i32) -> i32 {
        let c = &self.config;
        let x = f64::from(wx) * c.terrain_scale;
        let z = f64::from(wz) * c.terrain_scale;

        let raw_low = self.terrain_low.sample2(x, z) * c.terrain_amplitude / 6.0 - 4.0;
        let raw_high =
            (self.terrain_high.sample2(x, z) * c.terrain_amplitude / 5.0 + 6.0).max(raw_low);

        let sel = self
            .selector
            .sample2(f64::from(wx) * c.selector_scale, f64::from(wz) * c.selector_scale);
        let mut h = if sel > 0.0 { raw_high } else { raw_low };
        h *= 0.5;
        if h < 0.0 {
            h *= 0.8;
        }

        #[allow(clippy::cast_possible_truncation)]
        let height = (h + c.base_height).floor() as i32;
        height.clamp(1, WORLD_HEIGHT as i32 - 2)
    }

    /// Reproducible RNG stream for one pass over one chunk.
    pub(crate) fn rng_for(&self, pos: ChunkPos, salt: u64) -> ChaCha8Rng {
        chunk_rng(self.seed, pos.x, pos.z, salt)
    }

    /// Run the full pass pipeline on a fresh chunk.
    ///
    /// Pass order is fixed: base terrain, surface paint, cave carving,
    /// fluid fill, ores, trees, decorations. Passes are total functions;
    /// the result is deterministic for (seed, cx, cz).
    #[must_use]
    pub fn generate_chunk(&self, pos: ChunkPos) -> Chunk {
        let mut chunk = Chunk::new(pos);
        terrain::base_terrain(&mut chunk, self);
        terrain::surface_paint(&mut chunk, self);
        terrain::carve_caves(&mut chunk, self);
        terrain::fluid_fill(&mut chunk, self);
        features::ore_veins(&mut chunk, self);
        features::trees(&mut chunk, self);
        features::decorations(&mut chunk, self);
        chunk.reset_after_fill();
        chunk
    }
}

/// World X of a chunk's first column.
#[inline]
pub(crate) fn world_x(pos: ChunkPos, lx: usize) -> i32 {
    pos.x * CHUNK_SIZE as i32 + lx as i32
}

/// World Z of a chunk's first column.
#[inline]
pub(crate) fn world_z(pos: ChunkPos, lz: usize) -> i32 {
    pos.z * CHUNK_SIZE as i32 + lz as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{blocks, is_fluid};

    #[test]
    fn generation_is_deterministic() {
        let ctx_a = GenContext::new(42, GenConfig::default());
        let ctx_b = GenContext::new(42, GenConfig::default());
        let a = ctx_a.generate_chunk(ChunkPos::new(0, 0));
        let b = ctx_b.generate_chunk(ChunkPos::new(0, 0));
        assert_eq!(a.snapshot_blocks(), b.snapshot_blocks());

        let c = GenContext::new(43, GenConfig::default()).generate_chunk(ChunkPos::new(0, 0));
        assert_ne!(a.snapshot_blocks(), c.snapshot_blocks());
    }

    #[test]
    fn terrain_height_stays_in_plausible_band() {
        let ctx = GenContext::new(42, GenConfig::default());
        for i in -64..64 {
            let h = ctx.terrain_height(i * 7, i * -13);
            assert!((1..=126).contains(&h), "height {h} escaped the world column");
        }
        // Seed 42, spawn-ish columns sit in the rolling-hills band.
        let h0 = ctx.terrain_height(0, 0);
        assert!((40..=90).contains(&h0), "origin height {h0} outside expected band");
    }

    #[test]
    fn generated_chunk_respects_the_vertical_frame() {
        let ctx = GenContext::new(7, GenConfig::default());
        let chunk = ctx.generate_chunk(ChunkPos::new(3, -2));
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                assert_eq!(chunk.get_block(x, 0, z), blocks::BEDROCK);
                assert_eq!(chunk.get_block(x, WORLD_HEIGHT - 1, z), blocks::AIR);
            }
        }
        assert!(!chunk.modified, "fresh generation is not an unsaved edit");
    }

    #[test]
    fn seas_fill_to_sea_level() {
        let ctx = GenContext::new(42, GenConfig::default());
        // Scan a few chunks for a sub-sea-level column and check the water
        // column integrity: water from the floor up to sea level - 1.
        for ci in 0..8 {
            let chunk = ctx.generate_chunk(ChunkPos::new(ci, ci * 3));
            for x in 0..CHUNK_SIZE {
                for z in 0..CHUNK_SIZE {
                    let top = chunk.column_top(x, z).unwrap_or(0);
                    if is_fluid(chunk.get_block(x, top, z)) {
                        assert_eq!(top as i32, SEA_LEVEL - 1, "sea surface off level");
                        return;
                    }
                }
            }
        }
        panic!("no sea found in scanned chunks (seed 42 should have oceans)");
    }
}
