//! World storage and block access helpers.
//!
//! The `World` resource owns the resident chunk map, keyed by the packed
//! 64-bit chunk key so hot lookups never allocate position objects. It
//! provides world-coordinate block and light accessors for the external
//! collaborators (physics, edit path, fluid simulator, lighting) and the
//! spawn-point search.
//!
//! Mutation discipline: once a chunk is resident, its arrays are only
//! mutated from the main thread. Workers receive snapshots.

use crate::block::{blocks, BlockId};
use crate::chunk::{packed_key, Chunk, ChunkPos, CHUNK_SIZE_I32, SEA_LEVEL, WORLD_HEIGHT_I32};
use crate::worldgen::GenContext;
use bevy::prelude::*;
use std::collections::HashMap;

/// Eye height added to the spawn block top.
const EYE_OFFSET: f64 = 1.62;

/// The resident chunk map plus world-coordinate accessors.
#[derive(Resource, Default)]
pub struct World {
    pub chunks: HashMap<u64, Chunk>,
}

impl World {
    #[must_use]
    pub fn new() -> Self {
        World { chunks: HashMap::new() }
    }

    /// Whether the chunk at (cx, cz) is resident.
    #[must_use]
    pub fn is_loaded(&self, cx: i32, cz: i32) -> bool {
        self.chunks.contains_key(&packed_key(cx, cz))
    }

    /// Whether the chunk owning world column (x, z) is resident.
    #[inline]
    #[must_use]
    pub fn is_loaded_world(&self, x: i32, z: i32) -> bool {
        self.chunks.contains_key(&ChunkPos::of_world(x, z).key())
    }

    /// Insert a chunk, replacing any previous occupant of its slot.
    pub fn insert(&mut self, chunk: Chunk) {
        self.chunks.insert(chunk.pos.key(), chunk);
    }

    /// Remove and return the chunk with the given packed key.
    pub fn remove(&mut self, key: u64) -> Option<Chunk> {
        self.chunks.remove(&key)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: u64) -> Option<&Chunk> {
        self.chunks.get(&key)
    }

    #[inline]
    pub fn get_mut(&mut self, key: u64) -> Option<&mut Chunk> {
        self.chunks.get_mut(&key)
    }

    /// Split a world coordinate into (chunk key, local x, local z).
    #[inline]
    fn locate(x: i32, z: i32) -> (u64, usize, usize) {
        let pos = ChunkPos::of_world(x, z);
        let lx = x.rem_euclid(CHUNK_SIZE_I32) as usize;
        let lz = z.rem_euclid(CHUNK_SIZE_I32) as usize;
        (pos.key(), lx, lz)
    }

    /// Block id at world coordinates; `AIR` outside the world column or in
    /// an unloaded chunk.
    #[must_use]
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockId {
        if y < 0 || y >= WORLD_HEIGHT_I32 {
            return blocks::AIR;
        }
        let (key, lx, lz) = Self::locate(x, z);
        self.chunks.get(&key).map_or(blocks::AIR, |c| c.get_block(lx, y as usize, lz))
    }

    /// Write a block at world coordinates.
    ///
    /// This is the raw array write: it updates the chunk's dirty/modified
    /// bookkeeping but does not run lighting, fluids or meshing — the
    /// stream manager's edit path owns that orchestration. Returns the
    /// owning chunk position, or `None` when the write was ignored
    /// (out-of-bounds Y or unloaded chunk).
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, id: BlockId) -> Option<ChunkPos> {
        if y < 0 || y >= WORLD_HEIGHT_I32 {
            return None;
        }
        let (key, lx, lz) = Self::locate(x, z);
        self.chunks.get_mut(&key).map(|c| {
            c.set_block(lx, y as usize, lz, id);
            c.pos
        })
    }

    /// Sky light at world coordinates: 15 above the world (open sky), 0
    /// below it or in unloaded chunks.
    #[must_use]
    pub fn get_sky_light(&self, x: i32, y: i32, z: i32) -> u8 {
        if y >= WORLD_HEIGHT_I32 {
            return 15;
        }
        if y < 0 {
            return 0;
        }
        let (key, lx, lz) = Self::locate(x, z);
        self.chunks.get(&key).map_or(0, |c| c.get_sky_light(lx, y as usize, lz))
    }

    pub fn set_sky_light(&mut self, x: i32, y: i32, z: i32, level: u8) {
        if y < 0 || y >= WORLD_HEIGHT_I32 {
            return;
        }
        let (key, lx, lz) = Self::locate(x, z);
        if let Some(c) = self.chunks.get_mut(&key) {
            c.set_sky_light(lx, y as usize, lz, level);
        }
    }

    /// Block light at world coordinates; 0 outside or unloaded.
    #[must_use]
    pub fn get_block_light(&self, x: i32, y: i32, z: i32) -> u8 {
        if y < 0 || y >= WORLD_HEIGHT_I32 {
            return 0;
        }
        let (key, lx, lz) = Self::locate(x, z);
        self.chunks.get(&key).map_or(0, |c| c.get_block_light(lx, y as usize, lz))
    }

    pub fn set_block_light(&mut self, x: i32, y: i32, z: i32, level: u8) {
        if y < 0 || y >= WORLD_HEIGHT_I32 {
            return;
        }
        let (key, lx, lz) = Self::locate(x, z);
        if let Some(c) = self.chunks.get_mut(&key) {
            c.set_block_light(lx, y as usize, lz, level);
        }
    }

    /// Find a spawn position: spiral outward from the origin for the first
    /// column whose terrain surface is a grass top above sea level and
    /// below the mountain line, then stand on it.
    ///
    /// Falls back to the origin column when no candidate is found nearby.
    #[must_use]
    pub fn spawn_point(ctx: &GenContext) -> (f64, f64, f64) {
        const SEARCH_RADIUS: i32 = 128;
        for r in 0..=SEARCH_RADIUS {
            // Ring walk: only cells whose chebyshev distance is exactly r.
            for dx in -r..=r {
                for dz in -r..=r {
                    if dx.abs().max(dz.abs()) != r {
                        continue;
                    }
                    let h = ctx.terrain_height(dx, dz);
                    if h > SEA_LEVEL + 1 && h < ctx.config.mountain_threshold {
                        return (f64::from(dx) + 0.5, f64::from(h) + EYE_OFFSET, f64::from(dz) + 0.5);
                    }
                }
            }
        }
        let h = ctx.terrain_height(0, 0);
        (0.5, f64::from(h) + EYE_OFFSET, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::blocks as ids;
    use crate::worldgen::{GenConfig, GenContext};

    fn world_with_chunk(cx: i32, cz: i32) -> World {
        let mut w = World::new();
        w.insert(Chunk::new(ChunkPos::new(cx, cz)));
        w
    }

    #[test]
    fn world_coordinates_map_into_the_owning_chunk() {
        let mut w = world_with_chunk(-1, 0);
        assert_eq!(w.set_block(-1, 64, 5, ids::STONE), Some(ChunkPos::new(-1, 0)));
        assert_eq!(w.get_block(-1, 64, 5), ids::STONE);
        // Same local cell viewed from the chunk.
        let c = w.get(packed_key(-1, 0)).unwrap();
        assert_eq!(c.get_block(15, 64, 5), ids::STONE);
    }

    #[test]
    fn unloaded_chunks_read_air_and_ignore_writes() {
        let mut w = World::new();
        assert_eq!(w.get_block(100, 64, 100), ids::AIR);
        assert_eq!(w.set_block(100, 64, 100, ids::STONE), None);
        assert_eq!(w.get_sky_light(100, 64, 100), 0);
    }

    #[test]
    fn vertical_bounds_behave_like_open_sky_over_void() {
        let w = world_with_chunk(0, 0);
        assert_eq!(w.get_block(0, -1, 0), ids::AIR);
        assert_eq!(w.get_block(0, 128, 0), ids::AIR);
        assert_eq!(w.get_sky_light(0, 128, 0), 15);
        assert_eq!(w.get_sky_light(0, -1, 0), 0);
        assert_eq!(w.get_block_light(0, 128, 0), 0);
    }

    #[test]
    fn spawn_point_stands_on_dry_land() {
        let ctx = GenContext::new(42, GenConfig::default());
        let (x, y, z) = World::spawn_point(&ctx);
        #[allow(clippy::cast_possible_truncation)]
        let h = ctx.terrain_height(x.floor() as i32, z.floor() as i32);
        assert!(h > SEA_LEVEL + 1, "spawn column under water");
        assert!((y - (f64::from(h) + 1.62)).abs() < 1e-9);
    }
}
