//! Region files: 32x32 chunks behind a fixed offset table.
//!
//! Layout: an 8 KB header of 1024 big-endian `(offset, length)` pairs (zero
//! length marks an absent chunk), followed by the concatenated compressed
//! chunk payloads. Writing rewrites the whole file through a sibling temp
//! file and an atomic rename, so a torn write can never corrupt previously
//! saved chunks. The rewrite cost is the accepted v1 policy; the migration
//! path is a slab-allocated payload area with header-only rewrites.

use super::{compress, decode_chunk, decompress, encode_chunk, WorldStoreError};
use crate::chunk::{Chunk, ChunkPos};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Chunks per region along each axis.
pub const REGION_SIZE: i32 = 32;
const SLOT_COUNT: usize = (REGION_SIZE * REGION_SIZE) as usize;
const HEADER_BYTES: usize = SLOT_COUNT * 8;

/// On-disk chunk storage rooted at a save directory.
pub struct RegionStore {
    root: PathBuf,
}

/// All payload slots of one region, still compressed.
type RegionSlots = Vec<Option<Vec<u8>>>;

impl RegionStore {
    /// Open (creating if needed) the region directory under `save_dir`.
    ///
    /// # Errors
    /// Returns `Io` when the directory cannot be created.
    pub fn open(save_dir: &Path) -> Result<Self, WorldStoreError> {
        let root = save_dir.join("region");
        fs::create_dir_all(&root)?;
        Ok(RegionStore { root })
    }

    fn region_path(&self, rx: i32, rz: i32) -> PathBuf {
        self.root.join(format!("r.{rx}.{rz}.region"))
    }

    #[inline]
    fn region_of(pos: ChunkPos) -> (i32, i32) {
        (pos.x.div_euclid(REGION_SIZE), pos.z.div_euclid(REGION_SIZE))
    }

    #[inline]
    fn slot_of(pos: ChunkPos) -> usize {
        let lx = pos.x.rem_euclid(REGION_SIZE) as usize;
        let lz = pos.z.rem_euclid(REGION_SIZE) as usize;
        lz * REGION_SIZE as usize + lx
    }

    /// Load one chunk, `Ok(None)` when the region or slot has nothing.
    ///
    /// # Errors
    /// `Io` on read failures; `BadMagic`, `UnsupportedVersion`,
    /// `LengthMismatch` or `CoordMismatch` when the stored blob is not a
    /// chunk this loader understands (the caller treats those as absent).
    pub fn load_chunk(&self, pos: ChunkPos) -> Result<Option<Chunk>, WorldStoreError> {
        let (rx, rz) = Self::region_of(pos);
        let mut file = match fs::File::open(self.region_path(rx, rz)) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let slot = Self::slot_of(pos);
        file.seek(SeekFrom::Start((slot * 8) as u64))?;
        let offset = file.read_u32::<BigEndian>()?;
        let length = file.read_u32::<BigEndian>()?;
        if length == 0 {
            return Ok(None);
        }

        let mut payload = vec![0u8; length as usize];
        file.seek(SeekFrom::Start(u64::from(offset)))?;
        file.read_exact(&mut payload)?;

        let blob = decompress(&payload)?;
        decode_chunk(&blob, pos).map(Some)
    }

    /// Persist one chunk (full region rewrite).
    ///
    /// # Errors
    /// `Io` when the region cannot be read back, written or renamed.
    pub fn save_chunk(&self, chunk: &Chunk) -> Result<(), WorldStoreError> {
        self.save_chunks(std::slice::from_ref(&chunk))
    }

    /// Persist a batch of chunks, rewriting each affected region once.
    /// Blob compression fans out across the rayon pool.
    ///
    /// # Errors
    /// `Io` when a region file cannot be read back, written or renamed.
    pub fn save_chunks(&self, chunks: &[&Chunk]) -> Result<(), WorldStoreError> {
        let compressed: Vec<(ChunkPos, Vec<u8>)> = chunks
            .par_iter()
            .map(|c| (c.pos, compress(&encode_chunk(c))))
            .collect();

        let mut by_region: HashMap<(i32, i32), Vec<(usize, Vec<u8>)>> = HashMap::new();
        for (pos, payload) in compressed {
            by_region
                .entry(Self::region_of(pos))
                .or_default()
                .push((Self::slot_of(pos), payload));
        }

        for ((rx, rz), updates) in by_region {
            let path = self.region_path(rx, rz);
            let mut slots = self.read_region_slots(&path)?;
            for (slot, payload) in updates {
                slots[slot] = Some(payload);
            }
            self.write_region_slots(&path, &slots)?;
        }
        Ok(())
    }

    /// Read every occupied payload of a region file, compressed as stored.
    fn read_region_slots(&self, path: &Path) -> Result<RegionSlots, WorldStoreError> {
        let mut slots: RegionSlots = vec![None; SLOT_COUNT];
        let mut file = match fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(slots),
            Err(e) => return Err(e.into()),
        };

        let mut header = vec![0u8; HEADER_BYTES];
        file.read_exact(&mut header)?;
        let mut cursor = &header[..];
        let mut table = Vec::with_capacity(SLOT_COUNT);
        for _ in 0..SLOT_COUNT {
            let offset = cursor.read_u32::<BigEndian>()?;
            let length = cursor.read_u32::<BigEndian>()?;
            table.push((offset, length));
        }

        for (slot, &(offset, length)) in table.iter().enumerate() {
            if length == 0 {
                continue;
            }
            let mut payload = vec![0u8; length as usize];
            file.seek(SeekFrom::Start(u64::from(offset)))?;
            file.read_exact(&mut payload)?;
            slots[slot] = Some(payload);
        }
        Ok(slots)
    }

    /// Write a full region image to a temp file and rename it into place.
    fn write_region_slots(&self, path: &Path, slots: &RegionSlots) -> Result<(), WorldStoreError> {
        let tmp = path.with_extension("region.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            let mut offset = HEADER_BYTES as u32;
            for slot in slots {
                match slot {
                    Some(payload) => {
                        file.write_u32::<BigEndian>(offset)?;
                        file.write_u32::<BigEndian>(payload.len() as u32)?;
                        offset += payload.len() as u32;
                    }
                    None => {
                        file.write_u32::<BigEndian>(0)?;
                        file.write_u32::<BigEndian>(0)?;
                    }
                }
            }
            for payload in slots.iter().flatten() {
                file.write_all(payload)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::blocks as ids;
    use crate::worldgen::{GenConfig, GenContext};
    use rand::{Rng, SeedableRng};

    fn store() -> (tempfile::TempDir, RegionStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RegionStore::open(dir.path()).expect("open store");
        (dir, store)
    }

    #[test]
    fn missing_region_and_empty_slot_read_as_absent() {
        let (_dir, store) = store();
        assert!(store.load_chunk(ChunkPos::new(0, 0)).unwrap().is_none());

        store.save_chunk(&Chunk::new(ChunkPos::new(0, 0))).unwrap();
        assert!(store.load_chunk(ChunkPos::new(1, 0)).unwrap().is_none(), "other slots untouched");
    }

    #[test]
    fn edited_chunk_round_trips_through_disk() {
        let (_dir, store) = store();
        let ctx = GenContext::new(42, GenConfig::default());
        let mut chunk = ctx.generate_chunk(ChunkPos::new(7, -3));
        crate::lighting::compute_initial_sky_light(&mut chunk);
        crate::lighting::compute_initial_block_light(&mut chunk);

        // A hundred random edits, like a busy player.
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        let mut edits = Vec::new();
        for _ in 0..100 {
            let (x, y, z) =
                (rng.gen_range(0..16), rng.gen_range(1..127), rng.gen_range(0..16));
            chunk.set_block(x, y, z, ids::PLANKS);
            edits.push((x, y, z));
        }

        store.save_chunk(&chunk).unwrap();
        let loaded = store.load_chunk(ChunkPos::new(7, -3)).unwrap().expect("present");
        for (x, y, z) in edits {
            assert_eq!(loaded.get_block(x, y, z), ids::PLANKS);
        }
        assert_eq!(loaded.snapshot_blocks(), chunk.snapshot_blocks());
        assert_eq!(loaded.snapshot_light(), chunk.snapshot_light());
        assert!(!loaded.modified, "a loaded chunk starts clean");
    }

    #[test]
    fn rewriting_one_slot_preserves_the_others() {
        let (_dir, store) = store();
        let mut a = Chunk::new(ChunkPos::new(2, 2));
        a.set_block(1, 10, 1, ids::GOLD_ORE);
        let mut b = Chunk::new(ChunkPos::new(3, 2));
        b.set_block(2, 20, 2, ids::DIAMOND_ORE);

        store.save_chunk(&a).unwrap();
        store.save_chunk(&b).unwrap();
        // Overwrite `a` with new content; `b` must survive the rewrite.
        a.set_block(1, 10, 1, ids::COAL_ORE);
        store.save_chunk(&a).unwrap();

        let a2 = store.load_chunk(ChunkPos::new(2, 2)).unwrap().unwrap();
        let b2 = store.load_chunk(ChunkPos::new(3, 2)).unwrap().unwrap();
        assert_eq!(a2.get_block(1, 10, 1), ids::COAL_ORE);
        assert_eq!(b2.get_block(2, 20, 2), ids::DIAMOND_ORE);
    }

    #[test]
    fn batch_save_spans_regions() {
        let (_dir, store) = store();
        // Straddle the region border at chunk x = 31 / 32.
        let c1 = Chunk::new(ChunkPos::new(31, 0));
        let c2 = Chunk::new(ChunkPos::new(32, 0));
        let c3 = Chunk::new(ChunkPos::new(-1, -1));
        store.save_chunks(&[&c1, &c2, &c3]).unwrap();
        for pos in [ChunkPos::new(31, 0), ChunkPos::new(32, 0), ChunkPos::new(-1, -1)] {
            assert!(store.load_chunk(pos).unwrap().is_some(), "missing {pos:?}");
        }
    }

    #[test]
    fn negative_chunk_coords_map_into_region_slots() {
        assert_eq!(RegionStore::region_of(ChunkPos::new(-1, -1)), (-1, -1));
        assert_eq!(RegionStore::region_of(ChunkPos::new(-33, 31)), (-2, 0));
        assert_eq!(RegionStore::slot_of(ChunkPos::new(-1, -1)), 31 * 32 + 31);
        assert_eq!(RegionStore::slot_of(ChunkPos::new(32, 0)), 0);
    }
}
