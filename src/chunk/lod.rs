//! LOD selection and hysteresis.
//!
//! Four tiers selected by chebyshev distance from the focal chunk. Upgrades
//! (toward more detail) only happen once the chunk would still qualify two
//! chunks farther out, so a player pacing across a tier boundary does not
//! thrash mesh builds.

use crate::chunk::MAX_LODS;

/// Threshold distances (in chunk units) per LOD tier. For a distance `d`,
/// the first entry `t` with `d <= t` selects the tier.
pub const LOD_DISTANCES: [i32; MAX_LODS] = [12, 14, 17, i32::MAX];

/// How often (in frames) the streaming system re-evaluates LOD assignments.
pub const LOD_REASSIGN_INTERVAL: u64 = 15;

/// Extra distance an upgrade must satisfy before it is applied.
pub const LOD_UPGRADE_HYSTERESIS: i32 = 2;

/// LOD tier for a chunk at the given distance. 0 is the most detailed.
#[must_use]
pub fn compute_lod_from_dist(dist: i32) -> u8 {
    for (i, &t) in LOD_DISTANCES.iter().enumerate() {
        if dist <= t {
            #[allow(clippy::cast_possible_truncation)]
            return i as u8;
        }
    }
    (MAX_LODS - 1) as u8
}

/// Next LOD for a chunk currently at `current`: downgrades apply
/// immediately, upgrades must hold at `dist + LOD_UPGRADE_HYSTERESIS`.
#[must_use]
pub fn lod_with_hysteresis(current: u8, dist: i32) -> u8 {
    let candidate = compute_lod_from_dist(dist);
    if candidate < current && compute_lod_from_dist(dist + LOD_UPGRADE_HYSTERESIS) != candidate {
        return current;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_select_tiers() {
        assert_eq!(compute_lod_from_dist(0), 0);
        assert_eq!(compute_lod_from_dist(12), 0);
        assert_eq!(compute_lod_from_dist(13), 1);
        assert_eq!(compute_lod_from_dist(15), 2);
        assert_eq!(compute_lod_from_dist(18), 3);
        assert_eq!(compute_lod_from_dist(1000), 3);
    }

    #[test]
    fn downgrades_are_immediate() {
        assert_eq!(lod_with_hysteresis(0, 13), 1);
        assert_eq!(lod_with_hysteresis(1, 18), 3);
    }

    #[test]
    fn upgrades_wait_for_the_hysteresis_band() {
        // At distance 12 a chunk qualifies for LOD 0, but 12 + 2 is LOD 1:
        // the upgrade is deferred.
        assert_eq!(lod_with_hysteresis(1, 12), 1);
        assert_eq!(lod_with_hysteresis(1, 10), 0, "well inside the band upgrades");
    }

    #[test]
    fn oscillation_across_a_boundary_does_not_flip() {
        // A chunk bouncing between 12 and 13 settles at LOD 1.
        let mut lod = compute_lod_from_dist(13);
        for dist in [12, 13, 12, 13, 12] {
            lod = lod_with_hysteresis(lod, dist);
        }
        assert_eq!(lod, 1);
    }
}
