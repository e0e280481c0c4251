//! Block ids and their static properties.
//!
//! Block ids are compact `u8` values baked into the chunk codec and the
//! fluid encoding, so they are compile-time constants rather than a
//! data-driven registry. The property helpers here (`is_solid`,
//! `is_transparent`, `emission`, ...) are the single source of truth for
//! the lighting propagator, the fluid simulator and the mesher.

/// Type used throughout the engine to represent a compact block identifier.
///
/// This is intentionally a `u8` to keep chunk storage memory-efficient.
pub type BlockId = u8;

/// Block id constants. Fluids occupy a contiguous id range: a source id
/// followed by seven flowing ids carrying level 1..7, so
/// `id = source + level` and `level = id - source`.
pub mod blocks {
    use super::BlockId;

    /// The block id used to represent empty space (no block present).
    pub const AIR: BlockId = 0;
    pub const STONE: BlockId = 1;
    pub const GRASS: BlockId = 2;
    pub const DIRT: BlockId = 3;
    pub const BEDROCK: BlockId = 4;
    pub const SAND: BlockId = 5;
    pub const GRAVEL: BlockId = 6;
    pub const LOG: BlockId = 7;
    pub const LEAVES: BlockId = 8;
    pub const PLANKS: BlockId = 9;
    pub const COBBLESTONE: BlockId = 10;
    pub const OBSIDIAN: BlockId = 11;

    pub const COAL_ORE: BlockId = 12;
    pub const IRON_ORE: BlockId = 13;
    pub const GOLD_ORE: BlockId = 14;
    pub const DIAMOND_ORE: BlockId = 15;

    pub const GLOWSTONE: BlockId = 16;

    pub const DANDELION: BlockId = 17;
    pub const ROSE: BlockId = 18;
    pub const TALL_GRASS: BlockId = 19;
    pub const BROWN_MUSHROOM: BlockId = 20;
    pub const RED_MUSHROOM: BlockId = 21;
    pub const SUGAR_CANE: BlockId = 22;

    // Fluid ranges. WATER_SOURCE + 1 ..= WATER_SOURCE + 7 are the flowing
    // water levels, same for lava.
    pub const WATER_SOURCE: BlockId = 32;
    pub const LAVA_SOURCE: BlockId = 40;
}

use blocks::*;

/// Number of flowing levels a fluid id range carries after its source.
pub const FLUID_LEVELS: u8 = 7;

/// True for any id in the water range (source or flowing).
#[inline]
#[must_use]
pub fn is_water(id: BlockId) -> bool {
    (WATER_SOURCE..=WATER_SOURCE + FLUID_LEVELS).contains(&id)
}

/// True for any id in the lava range (source or flowing).
#[inline]
#[must_use]
pub fn is_lava(id: BlockId) -> bool {
    (LAVA_SOURCE..=LAVA_SOURCE + FLUID_LEVELS).contains(&id)
}

/// True for any fluid id.
#[inline]
#[must_use]
pub fn is_fluid(id: BlockId) -> bool {
    is_water(id) || is_lava(id)
}

/// True when `id` is a fluid source cell (level 0).
#[inline]
#[must_use]
pub fn is_fluid_source(id: BlockId) -> bool {
    id == WATER_SOURCE || id == LAVA_SOURCE
}

/// Flow level of a fluid id: 0 for a source, 1..7 for flowing cells.
#[inline]
#[must_use]
pub fn fluid_level(id: BlockId) -> u8 {
    debug_assert!(is_fluid(id));
    if is_water(id) { id - WATER_SOURCE } else { id - LAVA_SOURCE }
}

/// Build a water id from a flow level (0 = source).
#[inline]
#[must_use]
pub fn water_with_level(level: u8) -> BlockId {
    debug_assert!(level <= FLUID_LEVELS);
    WATER_SOURCE + level
}

/// Build a lava id from a flow level (0 = source).
#[inline]
#[must_use]
pub fn lava_with_level(level: u8) -> BlockId {
    debug_assert!(level <= FLUID_LEVELS);
    LAVA_SOURCE + level
}

/// Whether a fluid may flow into (replace) this block.
///
/// Air and the small surface decorations give way to fluids; solid blocks
/// and other fluid cells do not (fluid-into-fluid is handled by the
/// interaction rules in the simulator).
#[inline]
#[must_use]
pub fn can_fluid_replace(id: BlockId) -> bool {
    matches!(
        id,
        AIR | DANDELION | ROSE | TALL_GRASS | BROWN_MUSHROOM | RED_MUSHROOM
    )
}

/// Whether the block occupies its cell as a full collision/render cube.
#[inline]
#[must_use]
pub fn is_solid(id: BlockId) -> bool {
    !matches!(
        id,
        AIR | DANDELION
            | ROSE
            | TALL_GRASS
            | BROWN_MUSHROOM
            | RED_MUSHROOM
            | SUGAR_CANE
    ) && !is_fluid(id)
}

/// Whether light passes through the block at all.
#[inline]
#[must_use]
pub fn is_transparent(id: BlockId) -> bool {
    !is_solid(id) || id == LEAVES
}

/// A block is opaque iff it is solid and not transparent. Opaque cells stop
/// light entirely and have their faces culled against each other.
#[inline]
#[must_use]
pub fn is_opaque(id: BlockId) -> bool {
    is_solid(id) && !is_transparent(id)
}

/// Extra light attenuation for transparent blocks, applied on top of the
/// per-step decrement: water 2, leaves 1, everything else 0.
#[inline]
#[must_use]
pub fn attenuation(id: BlockId) -> u8 {
    if is_water(id) {
        2
    } else if id == LEAVES {
        1
    } else {
        0
    }
}

/// Block-light emission (0..15) of the block itself.
#[inline]
#[must_use]
pub fn emission(id: BlockId) -> u8 {
    if is_lava(id) || id == GLOWSTONE { 15 } else { 0 }
}

/// Blocks lava ignition can burn away.
#[inline]
#[must_use]
pub fn is_flammable(id: BlockId) -> bool {
    matches!(id, LOG | LEAVES | PLANKS)
}

/// Which face of a block a texture lookup refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockFace {
    Top,
    Bottom,
    Side,
}

/// Texture-array layer for a block face, as a stable small integer the
/// shader collaborator indexes with. Most blocks use one layer for all
/// faces; grass and logs differ per face.
#[must_use]
pub fn texture_layer(id: BlockId, face: BlockFace) -> u8 {
    match (id, face) {
        (GRASS, BlockFace::Top) => 0,
        (GRASS, BlockFace::Side) => 1,
        (GRASS, BlockFace::Bottom) => 2, // dirt
        (DIRT, _) => 2,
        (STONE, _) => 3,
        (BEDROCK, _) => 4,
        (SAND, _) => 5,
        (GRAVEL, _) => 6,
        (LOG, BlockFace::Top | BlockFace::Bottom) => 7,
        (LOG, BlockFace::Side) => 8,
        (LEAVES, _) => 9,
        (PLANKS, _) => 10,
        (COBBLESTONE, _) => 11,
        (OBSIDIAN, _) => 12,
        (COAL_ORE, _) => 13,
        (IRON_ORE, _) => 14,
        (GOLD_ORE, _) => 15,
        (DIAMOND_ORE, _) => 16,
        (GLOWSTONE, _) => 17,
        (DANDELION, _) => 18,
        (ROSE, _) => 19,
        (TALL_GRASS, _) => 20,
        (BROWN_MUSHROOM, _) => 21,
        (RED_MUSHROOM, _) => 22,
        (SUGAR_CANE, _) => 23,
        (id, _) if is_water(id) => 24,
        (id, _) if is_lava(id) => 25,
        _ => 3, // unknown ids render as stone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fluid_ranges_are_contiguous() {
        for level in 0..=FLUID_LEVELS {
            assert!(is_water(water_with_level(level)));
            assert!(is_lava(lava_with_level(level)));
            assert_eq!(fluid_level(water_with_level(level)), level);
            assert_eq!(fluid_level(lava_with_level(level)), level);
        }
        assert!(!is_water(blocks::LAVA_SOURCE));
        assert!(!is_lava(blocks::WATER_SOURCE + FLUID_LEVELS));
    }

    #[test]
    fn opacity_follows_solidity_and_transparency() {
        assert!(is_opaque(blocks::STONE));
        assert!(is_opaque(blocks::GRASS));
        assert!(!is_opaque(blocks::AIR));
        assert!(!is_opaque(blocks::LEAVES)); // solid but transparent
        assert!(!is_opaque(blocks::WATER_SOURCE));
        assert!(!is_opaque(blocks::TALL_GRASS));
    }

    #[test]
    fn attenuation_and_emission_tables() {
        assert_eq!(attenuation(blocks::WATER_SOURCE), 2);
        assert_eq!(attenuation(water_with_level(3)), 2);
        assert_eq!(attenuation(blocks::LEAVES), 1);
        assert_eq!(attenuation(blocks::AIR), 0);
        assert_eq!(emission(blocks::LAVA_SOURCE), 15);
        assert_eq!(emission(lava_with_level(2)), 15);
        assert_eq!(emission(blocks::GLOWSTONE), 15);
        assert_eq!(emission(blocks::STONE), 0);
    }

    #[test]
    fn fluids_replace_decorations_but_not_solids() {
        assert!(can_fluid_replace(blocks::AIR));
        assert!(can_fluid_replace(blocks::TALL_GRASS));
        assert!(!can_fluid_replace(blocks::STONE));
        assert!(!can_fluid_replace(blocks::WATER_SOURCE));
        assert!(!can_fluid_replace(blocks::LAVA_SOURCE));
    }
}
