//! World persistence: the chunk codec, region files and the seed lock.
//!
//! One region file holds a 32x32 block of chunks behind a fixed 8 KB offset
//! table; payloads are DEFLATE-compressed chunk blobs. The codec is strict
//! on read — wrong magic, version or lengths are format errors, which the
//! stream manager treats as "chunk absent, regenerate" rather than a crash.

use crate::chunk::{Chunk, ChunkPos, CHUNK_VOLUME};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

pub mod region;
pub use region::RegionStore;

/// "CHNK" tag leading every chunk blob.
pub const CHUNK_MAGIC: u32 = 0x4348_4E4B;

/// Current save-format version. The loader accepts exactly the supported
/// range below.
pub const FORMAT_VERSION: u8 = 1;
const MIN_SUPPORTED_VERSION: u8 = 1;

/// File in the save directory recording the world seed.
pub const GENERATOR_LOCK: &str = "generator.lock";

#[derive(Debug, Error)]
pub enum WorldStoreError {
    #[error("an I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad chunk magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported save format version {0}")]
    UnsupportedVersion(u8),
    #[error("chunk payload length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("chunk blob claims coordinates ({0}, {1})")]
    CoordMismatch(i32, i32),
    #[error("malformed {GENERATOR_LOCK}")]
    MalformedLock,
    #[error("save was created with seed {on_disk}, refusing to open with seed {requested}")]
    SeedMismatch { on_disk: u64, requested: u64 },
}

impl WorldStoreError {
    /// Format errors degrade to "chunk absent"; everything else surfaces.
    #[must_use]
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            WorldStoreError::BadMagic(_)
                | WorldStoreError::UnsupportedVersion(_)
                | WorldStoreError::LengthMismatch { .. }
                | WorldStoreError::CoordMismatch(..)
        )
    }
}

/// Serialize a chunk into its uncompressed blob.
#[must_use]
pub fn encode_chunk(chunk: &Chunk) -> Vec<u8> {
    let blocks = chunk.snapshot_blocks();
    let light = chunk.snapshot_light();
    let mut out = Vec::with_capacity(13 + 2 * (4 + CHUNK_VOLUME));
    out.write_u32::<BigEndian>(CHUNK_MAGIC).expect("vec write is infallible");
    out.write_u8(FORMAT_VERSION).expect("vec write is infallible");
    out.write_i32::<BigEndian>(chunk.pos.x).expect("vec write is infallible");
    out.write_i32::<BigEndian>(chunk.pos.z).expect("vec write is infallible");
    out.write_u32::<BigEndian>(CHUNK_VOLUME as u32).expect("vec write is infallible");
    out.extend_from_slice(&blocks);
    out.write_u32::<BigEndian>(CHUNK_VOLUME as u32).expect("vec write is infallible");
    out.extend_from_slice(&light);
    out
}

/// Parse a chunk blob. The blob must carry the expected magic, a supported
/// version and exact array lengths; `expected_pos` guards against region
/// slot mixups.
///
/// # Errors
/// `BadMagic`, `UnsupportedVersion`, `LengthMismatch` or `CoordMismatch`
/// describe what disqualified the blob; `Io` covers truncated reads.
pub fn decode_chunk(mut bytes: &[u8], expected_pos: ChunkPos) -> Result<Chunk, WorldStoreError> {
    let magic = bytes.read_u32::<BigEndian>()?;
    if magic != CHUNK_MAGIC {
        return Err(WorldStoreError::BadMagic(magic));
    }
    let version = bytes.read_u8()?;
    if !(MIN_SUPPORTED_VERSION..=FORMAT_VERSION).contains(&version) {
        return Err(WorldStoreError::UnsupportedVersion(version));
    }
    let cx = bytes.read_i32::<BigEndian>()?;
    let cz = bytes.read_i32::<BigEndian>()?;
    if (cx, cz) != (expected_pos.x, expected_pos.z) {
        return Err(WorldStoreError::CoordMismatch(cx, cz));
    }

    let block_len = bytes.read_u32::<BigEndian>()? as usize;
    if block_len != CHUNK_VOLUME || bytes.len() < block_len {
        return Err(WorldStoreError::LengthMismatch { expected: CHUNK_VOLUME, got: block_len });
    }
    let (blocks, rest) = bytes.split_at(block_len);
    bytes = rest;

    let light_len = bytes.read_u32::<BigEndian>()? as usize;
    if light_len != CHUNK_VOLUME || bytes.len() != light_len {
        return Err(WorldStoreError::LengthMismatch { expected: CHUNK_VOLUME, got: light_len });
    }

    let mut chunk = Chunk::new(expected_pos);
    chunk.fill_blocks(blocks);
    chunk.fill_light(bytes);
    chunk.reset_after_fill();
    chunk.dirty_light = false; // the stored light is the computed light
    Ok(chunk)
}

/// Verify (or create) the seed lock for a save directory.
///
/// A fresh save writes the lock; an existing save must carry the same seed
/// or opening fails before any other file is touched.
///
/// # Errors
/// `SeedMismatch` when the save belongs to another seed, `MalformedLock`
/// when the lock file is unreadable as a seed, `Io` otherwise.
pub fn check_generator_lock(save_dir: &Path, seed: u64) -> Result<(), WorldStoreError> {
    let path = save_dir.join(GENERATOR_LOCK);
    match fs::read_to_string(&path) {
        Ok(contents) => {
            let on_disk: u64 =
                contents.trim().parse().map_err(|_| WorldStoreError::MalformedLock)?;
            if on_disk != seed {
                return Err(WorldStoreError::SeedMismatch { on_disk, requested: seed });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(save_dir)?;
            let mut f = fs::File::create(&path)?;
            writeln!(f, "{seed}")?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// DEFLATE-compress a blob for storage.
#[must_use]
pub(crate) fn compress(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::DeflateEncoder::new(
        Vec::with_capacity(data.len() / 4),
        flate2::Compression::default(),
    );
    enc.write_all(data).expect("vec-backed encoder write is infallible");
    enc.finish().expect("vec-backed encoder finish is infallible")
}

pub(crate) fn decompress(data: &[u8]) -> Result<Vec<u8>, WorldStoreError> {
    let mut out = Vec::with_capacity(CHUNK_VOLUME * 2 + 32);
    flate2::read::DeflateDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::blocks as ids;
    use crate::worldgen::{GenConfig, GenContext};

    fn sample_chunk() -> Chunk {
        let ctx = GenContext::new(99, GenConfig::default());
        let mut chunk = ctx.generate_chunk(ChunkPos::new(7, -3));
        crate::lighting::compute_initial_sky_light(&mut chunk);
        crate::lighting::compute_initial_block_light(&mut chunk);
        chunk
    }

    #[test]
    fn blob_round_trips_blocks_and_light() {
        let chunk = sample_chunk();
        let decoded = decode_chunk(&encode_chunk(&chunk), chunk.pos).expect("decode");
        assert_eq!(decoded.pos, chunk.pos);
        assert_eq!(decoded.snapshot_blocks(), chunk.snapshot_blocks());
        assert_eq!(decoded.snapshot_light(), chunk.snapshot_light());
        assert!(!decoded.modified);
        assert!(!decoded.dirty_light);
    }

    #[test]
    fn compressed_round_trip_matches() {
        let chunk = sample_chunk();
        let blob = encode_chunk(&chunk);
        let restored = decompress(&compress(&blob)).expect("inflate");
        assert_eq!(restored, blob);
    }

    #[test]
    fn decoder_rejects_corrupted_blobs() {
        let chunk = sample_chunk();
        let good = encode_chunk(&chunk);

        let mut bad_magic = good.clone();
        bad_magic[0] = 0xFF;
        assert!(matches!(
            decode_chunk(&bad_magic, chunk.pos),
            Err(WorldStoreError::BadMagic(_))
        ));

        let mut bad_version = good.clone();
        bad_version[4] = 99;
        assert!(matches!(
            decode_chunk(&bad_version, chunk.pos),
            Err(WorldStoreError::UnsupportedVersion(99))
        ));

        let truncated = &good[..good.len() - 100];
        assert!(decode_chunk(truncated, chunk.pos).is_err());

        assert!(matches!(
            decode_chunk(&good, ChunkPos::new(0, 0)),
            Err(WorldStoreError::CoordMismatch(7, -3))
        ));
    }

    #[test]
    fn format_errors_classify_as_recoverable() {
        assert!(WorldStoreError::BadMagic(1).is_format());
        assert!(WorldStoreError::UnsupportedVersion(9).is_format());
        assert!(!WorldStoreError::SeedMismatch { on_disk: 1, requested: 2 }.is_format());
    }

    #[test]
    fn generator_lock_guards_the_seed() {
        let dir = tempfile::tempdir().expect("tempdir");
        check_generator_lock(dir.path(), 42).expect("fresh save");
        check_generator_lock(dir.path(), 42).expect("same seed reopens");

        let before = fs::read_to_string(dir.path().join(GENERATOR_LOCK)).unwrap();
        let err = check_generator_lock(dir.path(), 43).unwrap_err();
        assert!(matches!(err, WorldStoreError::SeedMismatch { on_disk: 42, requested: 43 }));
        // Refusal must not touch the lock.
        let after = fs::read_to_string(dir.path().join(GENERATOR_LOCK)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn malformed_lock_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(GENERATOR_LOCK), "not a seed\n").unwrap();
        assert!(matches!(
            check_generator_lock(dir.path(), 1),
            Err(WorldStoreError::MalformedLock)
        ));
    }

    #[test]
    fn light_is_preserved_not_recomputed() {
        // A decoded chunk must carry the exact stored nibbles, even if they
        // disagree with what a recompute would produce.
        let mut chunk = Chunk::new(ChunkPos::new(1, 1));
        chunk.set_block(4, 40, 4, ids::STONE);
        chunk.set_sky_light(4, 41, 4, 7);
        chunk.set_block_light(4, 41, 4, 3);
        let decoded = decode_chunk(&encode_chunk(&chunk), chunk.pos).unwrap();
        assert_eq!(decoded.get_sky_light(4, 41, 4), 7);
        assert_eq!(decoded.get_block_light(4, 41, 4), 3);
    }
}
