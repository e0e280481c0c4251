//! Mesh generation statistics for the streaming diagnostics line.

use bevy::prelude::Resource;
use std::collections::HashMap;

/// Triangle counts per resident chunk, keyed by the packed chunk key.
#[derive(Resource, Default)]
pub struct MeshGenerationStats {
    chunk_triangles: HashMap<u64, usize>,
    total_triangles: usize,
}

impl MeshGenerationStats {
    /// Record (or replace) the triangle count of a chunk's current mesh.
    pub fn update_chunk(&mut self, key: u64, triangles: usize) {
        let old = self.chunk_triangles.insert(key, triangles).unwrap_or(0);
        self.total_triangles = self.total_triangles - old + triangles;
    }

    /// Forget an evicted chunk.
    pub fn remove_chunk(&mut self, key: u64) {
        if let Some(old) = self.chunk_triangles.remove(&key) {
            self.total_triangles -= old;
        }
    }

    #[must_use]
    pub fn total_triangles(&self) -> usize {
        self.total_triangles
    }

    #[must_use]
    pub fn meshed_chunks(&self) -> usize {
        self.chunk_triangles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_follow_updates_and_removals() {
        let mut stats = MeshGenerationStats::default();
        stats.update_chunk(1, 100);
        stats.update_chunk(2, 50);
        stats.update_chunk(1, 70); // re-mesh replaces, not adds
        assert_eq!(stats.total_triangles(), 120);
        assert_eq!(stats.meshed_chunks(), 2);
        stats.remove_chunk(2);
        assert_eq!(stats.total_triangles(), 70);
        stats.remove_chunk(2); // idempotent
        assert_eq!(stats.meshed_chunks(), 1);
    }
}
