//! Chunk meshing at four levels of detail.
//!
//! Workers mesh from snapshots (blocks + light of the target chunk and its
//! four side neighbours), never from live chunks, so the main thread can
//! keep editing while a mesh builds. The output is raw primitive arrays —
//! a flat `f32` vertex stream and `u32` indices — handed to the upload
//! queue; no GPU calls happen here.
//!
//! LOD 0 is the full treatment: per-face culling, per-vertex ambient
//! occlusion and smooth 4-sample lighting, with transparent blocks split
//! into their own mesh. LOD 1 keeps the topology but drops AO and smooth
//! sampling. LOD 2 collapses each surface column to one quad; LOD 3 is a
//! single quad per chunk at the dominant surface height.

use super::{block_index, Chunk, ChunkPos, CHUNK_SIZE, CHUNK_SIZE_I32, WORLD_HEIGHT, WORLD_HEIGHT_I32};
use crate::block::{
    blocks, is_fluid, is_opaque, is_solid, is_transparent, is_water, texture_layer, BlockFace,
    BlockId,
};

/// Floats per vertex: position 3, face id 1, uv 2, texture layer 1, ao 1,
/// sky light 1, block-light rgb 3.
pub const VERTEX_SIZE: usize = 12;

/// Warm tint applied to the scalar block-light channel to produce RGB.
const BLOCK_LIGHT_TINT: [f32; 3] = [1.0, 0.82, 0.62];

/// Immutable copy of one chunk's arrays, cheap to hand to a worker.
#[derive(Clone)]
pub struct ChunkSnapshot {
    pub pos: ChunkPos,
    blocks: Vec<u8>,
    light: Vec<u8>,
}

impl ChunkSnapshot {
    #[must_use]
    pub fn of(chunk: &Chunk) -> Self {
        ChunkSnapshot { pos: chunk.pos, blocks: chunk.snapshot_blocks(), light: chunk.snapshot_light() }
    }

    #[inline]
    fn block(&self, x: usize, y: usize, z: usize) -> BlockId {
        if y >= WORLD_HEIGHT {
            return blocks::AIR;
        }
        self.blocks[block_index(x, y, z)]
    }

    #[inline]
    fn sky(&self, x: usize, y: usize, z: usize) -> u8 {
        if y >= WORLD_HEIGHT {
            return 15;
        }
        self.light[block_index(x, y, z)] >> 4
    }

    #[inline]
    fn block_light(&self, x: usize, y: usize, z: usize) -> u8 {
        if y >= WORLD_HEIGHT {
            return 0;
        }
        self.light[block_index(x, y, z)] & 0x0F
    }
}

/// Neighbour slots in `MeshInput`, in +x, -x, +z, -z order.
const EAST: usize = 0;
const WEST: usize = 1;
const SOUTH: usize = 2;
const NORTH: usize = 3;

/// Everything a meshing job needs, detached from the live world.
pub struct MeshInput {
    pub center: ChunkSnapshot,
    pub neighbours: [Option<ChunkSnapshot>; 4],
}

impl MeshInput {
    /// Route a possibly out-of-chunk local coordinate to the right
    /// snapshot. Cells beyond a missing neighbour (or diagonal) read as
    /// absent: `AIR`, full sky, no block light — so boundary faces are
    /// emitted rather than suppressed.
    fn route(&self, x: i32, z: i32) -> Option<(&ChunkSnapshot, usize, usize)> {
        let inside_x = (0..CHUNK_SIZE_I32).contains(&x);
        let inside_z = (0..CHUNK_SIZE_I32).contains(&z);
        match (inside_x, inside_z) {
            (true, true) => Some((&self.center, x as usize, z as usize)),
            (false, true) => {
                let slot = if x < 0 { WEST } else { EAST };
                self.neighbours[slot]
                    .as_ref()
                    .map(|s| (s, x.rem_euclid(CHUNK_SIZE_I32) as usize, z as usize))
            }
            (true, false) => {
                let slot = if z < 0 { NORTH } else { SOUTH };
                self.neighbours[slot]
                    .as_ref()
                    .map(|s| (s, x as usize, z.rem_euclid(CHUNK_SIZE_I32) as usize))
            }
            // Diagonals are not snapshotted; treat as absent.
            (false, false) => None,
        }
    }

    fn block(&self, x: i32, y: i32, z: i32) -> BlockId {
        if y < 0 || y >= WORLD_HEIGHT_I32 {
            return blocks::AIR;
        }
        self.route(x, z).map_or(blocks::AIR, |(s, lx, lz)| s.block(lx, y as usize, lz))
    }

    fn sky(&self, x: i32, y: i32, z: i32) -> u8 {
        if y >= WORLD_HEIGHT_I32 {
            return 15;
        }
        if y < 0 {
            return 0;
        }
        self.route(x, z).map_or(15, |(s, lx, lz)| s.sky(lx, y as usize, lz))
    }

    fn block_light(&self, x: i32, y: i32, z: i32) -> u8 {
        if y < 0 || y >= WORLD_HEIGHT_I32 {
            return 0;
        }
        self.route(x, z).map_or(0, |(s, lx, lz)| s.block_light(lx, y as usize, lz))
    }
}

/// One finished primitive stream: interleaved vertices plus indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub vertex_size: usize,
}

impl MeshData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / self.vertex_size.max(1)
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Work product of one meshing job.
#[derive(Clone, Debug, Default)]
pub struct RawMeshResult {
    pub opaque: MeshData,
    pub transparent: MeshData,
}

impl RawMeshResult {
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.opaque.triangle_count() + self.transparent.triangle_count()
    }
}

/// Growable primitive buffers backing one mesh under construction.
struct MeshBuilder {
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl MeshBuilder {
    fn new() -> Self {
        MeshBuilder { vertices: Vec::with_capacity(1024), indices: Vec::with_capacity(256) }
    }

    /// Push one quad: four 12-float vertices and six indices. `flip`
    /// rotates the triangulation diagonal (used to keep AO gradients
    /// smooth).
    fn quad(&mut self, verts: &[[f32; VERTEX_SIZE]; 4], flip: bool) {
        debug_assert!(u32::try_from(self.vertices.len() / VERTEX_SIZE).is_ok());
        let start = (self.vertices.len() / VERTEX_SIZE) as u32;
        for v in verts {
            self.vertices.extend_from_slice(v);
        }
        if flip {
            self.indices.extend_from_slice(&[start + 1, start + 2, start + 3, start + 1, start + 3, start]);
        } else {
            self.indices.extend_from_slice(&[start, start + 1, start + 2, start, start + 2, start + 3]);
        }
    }

    fn finish(self) -> MeshData {
        MeshData { vertices: self.vertices, indices: self.indices, vertex_size: VERTEX_SIZE }
    }
}

/// Per-face geometry: outward normal, the tangent axes spanning the face,
/// and the face's `BlockFace` for texture lookup. Corner (a, b) of a face
/// sits at `origin + normal_offset + a*t1 + b*t2`.
struct FaceDef {
    normal: [i32; 3],
    t1: [i32; 3],
    t2: [i32; 3],
    tex_face: BlockFace,
}

const FACES: [FaceDef; 6] = [
    // +Y (top)
    FaceDef { normal: [0, 1, 0], t1: [1, 0, 0], t2: [0, 0, 1], tex_face: BlockFace::Top },
    // -Y (bottom)
    FaceDef { normal: [0, -1, 0], t1: [0, 0, 1], t2: [1, 0, 0], tex_face: BlockFace::Bottom },
    // +X
    FaceDef { normal: [1, 0, 0], t1: [0, 0, 1], t2: [0, 1, 0], tex_face: BlockFace::Side },
    // -X
    FaceDef { normal: [-1, 0, 0], t1: [0, 1, 0], t2: [0, 0, 1], tex_face: BlockFace::Side },
    // +Z
    FaceDef { normal: [0, 0, 1], t1: [0, 1, 0], t2: [1, 0, 0], tex_face: BlockFace::Side },
    // -Z
    FaceDef { normal: [0, 0, -1], t1: [1, 0, 0], t2: [0, 1, 0], tex_face: BlockFace::Side },
];

/// Corner parameters (a, b) in emission order; `quad` winds them CCW as
/// seen from outside the face.
const CORNERS: [(i32, i32); 4] = [(0, 0), (1, 0), (1, 1), (0, 1)];

#[inline]
fn add3(p: [i32; 3], q: [i32; 3], s: i32) -> [i32; 3] {
    [p[0] + q[0] * s, p[1] + q[1] * s, p[2] + q[2] * s]
}

/// Build the mesh for a chunk at the given LOD.
#[must_use]
pub fn build_mesh(input: &MeshInput, lod: u8) -> RawMeshResult {
    match lod {
        0 => mesh_detailed(input, true),
        1 => mesh_detailed(input, false),
        2 => mesh_columns(input),
        _ => mesh_slab(input),
    }
}

/// LOD 0/1 face-culled meshing. `smooth` enables AO and 4-sample vertex
/// lighting; without it, faces sample their neighbour cell flatly.
fn mesh_detailed(input: &MeshInput, smooth: bool) -> RawMeshResult {
    let mut opaque = MeshBuilder::new();
    let mut transparent = MeshBuilder::new();

    for y in 0..WORLD_HEIGHT_I32 {
        for z in 0..CHUNK_SIZE_I32 {
            for x in 0..CHUNK_SIZE_I32 {
                let id = input.center.block(x as usize, y as usize, z as usize);
                if id == blocks::AIR {
                    continue;
                }
                if !is_solid(id) && !is_fluid(id) {
                    // Surface decorations render as crossed quads.
                    emit_cross(&mut transparent, input, id, [x, y, z]);
                    continue;
                }
                let into_transparent = is_transparent(id);
                for face in &FACES {
                    let n = add3([x, y, z], face.normal, 1);
                    let nid = input.block(n[0], n[1], n[2]);
                    if culled(id, nid, into_transparent) {
                        continue;
                    }
                    let builder = if into_transparent { &mut transparent } else { &mut opaque };
                    emit_face(builder, input, id, [x, y, z], face, smooth);
                }
            }
        }
    }

    RawMeshResult { opaque: opaque.finish(), transparent: transparent.finish() }
}

/// Whether the face between `id` and its neighbour `nid` is hidden.
fn culled(id: BlockId, nid: BlockId, transparent_pass: bool) -> bool {
    if is_opaque(nid) {
        return true;
    }
    if transparent_pass {
        // Self-culling: no internal faces inside a body of the same kind.
        if is_fluid(id) {
            return is_fluid(nid) && (is_water(id) == is_water(nid));
        }
        return nid == id;
    }
    false
}

fn emit_face(builder: &mut MeshBuilder, input: &MeshInput, id: BlockId, p: [i32; 3], face: &FaceDef, smooth: bool) {
    let layer = f32::from(texture_layer(id, face.tex_face));
    let face_id = face_index(face) as f32;

    // The cell the face opens into; all light is sampled on that side.
    let outside = add3(p, face.normal, 1);
    let flat_sky = f32::from(input.sky(outside[0], outside[1], outside[2])) / 15.0;
    let flat_block = f32::from(input.block_light(outside[0], outside[1], outside[2])) / 15.0;

    let mut verts = [[0.0f32; VERTEX_SIZE]; 4];
    let mut ao = [1.0f32; 4];

    for (i, &(a, b)) in CORNERS.iter().enumerate() {
        // Corner position: base cell corner plus the face offset.
        let mut pos = [p[0] as f32, p[1] as f32, p[2] as f32];
        let positive = face.normal[0] + face.normal[1] + face.normal[2] > 0;
        for axis in 0..3 {
            if positive && face.normal[axis] != 0 {
                pos[axis] += 1.0;
            }
            pos[axis] += (face.t1[axis] * a + face.t2[axis] * b) as f32;
        }

        let (sky, block_l, occ) = if smooth {
            sample_corner(input, outside, face, a, b)
        } else {
            (flat_sky, flat_block, 0)
        };
        ao[i] = 1.0 - occ as f32 * 0.2;

        let v = &mut verts[i];
        v[0] = pos[0];
        v[1] = pos[1];
        v[2] = pos[2];
        v[3] = face_id;
        v[4] = a as f32;
        v[5] = b as f32;
        v[6] = layer;
        v[7] = ao[i];
        v[8] = sky;
        v[9] = block_l * BLOCK_LIGHT_TINT[0];
        v[10] = block_l * BLOCK_LIGHT_TINT[1];
        v[11] = block_l * BLOCK_LIGHT_TINT[2];
    }

    // Flip the quad diagonal when AO is anisotropic, so the interpolated
    // gradient follows the darker corner pair.
    let flip = ao[0] + ao[2] < ao[1] + ao[3];
    builder.quad(&verts, flip);
}

/// Smooth lighting and AO for one face corner: average the four cells
/// around the corner on the outside plane, and count the up-to-three
/// opaque occluders touching the corner.
fn sample_corner(input: &MeshInput, outside: [i32; 3], face: &FaceDef, a: i32, b: i32) -> (f32, f32, u8) {
    let sa = if a == 1 { 1 } else { -1 };
    let sb = if b == 1 { 1 } else { -1 };

    let c0 = outside;
    let c1 = add3(outside, face.t1, sa);
    let c2 = add3(outside, face.t2, sb);
    let c3 = add3(c1, face.t2, sb);

    let side1 = is_opaque(input.block(c1[0], c1[1], c1[2]));
    let side2 = is_opaque(input.block(c2[0], c2[1], c2[2]));
    let corner = is_opaque(input.block(c3[0], c3[1], c3[2]));
    let occ: u8 = if side1 && side2 {
        3
    } else {
        u8::from(side1) + u8::from(side2) + u8::from(corner)
    };

    let mut sky = 0.0f32;
    let mut block_l = 0.0f32;
    for c in [c0, c1, c2, c3] {
        sky += f32::from(input.sky(c[0], c[1], c[2]));
        block_l += f32::from(input.block_light(c[0], c[1], c[2]));
    }
    (sky / (4.0 * 15.0), block_l / (4.0 * 15.0), occ)
}

fn face_index(face: &FaceDef) -> usize {
    FACES
        .iter()
        .position(|f| f.normal == face.normal)
        .unwrap_or(0)
}

/// Two crossed quads for a decoration block, lit flatly from its own cell.
fn emit_cross(builder: &mut MeshBuilder, input: &MeshInput, id: BlockId, p: [i32; 3]) {
    let layer = f32::from(texture_layer(id, BlockFace::Side));
    let sky = f32::from(input.sky(p[0], p[1], p[2])) / 15.0;
    let block_l = f32::from(input.block_light(p[0], p[1], p[2])) / 15.0;
    let (xf, yf, zf) = (p[0] as f32, p[1] as f32, p[2] as f32);

    for (x0, z0, x1, z1) in [(0.0, 0.0, 1.0, 1.0), (0.0, 1.0, 1.0, 0.0)] {
        let corners = [
            [xf + x0, yf, zf + z0],
            [xf + x1, yf, zf + z1],
            [xf + x1, yf + 1.0, zf + z1],
            [xf + x0, yf + 1.0, zf + z0],
        ];
        let mut verts = [[0.0f32; VERTEX_SIZE]; 4];
        for (i, c) in corners.iter().enumerate() {
            let (u, v) = match i {
                0 => (0.0, 0.0),
                1 => (1.0, 0.0),
                2 => (1.0, 1.0),
                _ => (0.0, 1.0),
            };
            verts[i] = [
                c[0], c[1], c[2],
                0.0,
                u, v,
                layer,
                1.0,
                sky,
                block_l * BLOCK_LIGHT_TINT[0],
                block_l * BLOCK_LIGHT_TINT[1],
                block_l * BLOCK_LIGHT_TINT[2],
            ];
        }
        builder.quad(&verts, false);
    }
}

/// LOD 2: one top quad per surface column.
fn mesh_columns(input: &MeshInput) -> RawMeshResult {
    let mut opaque = MeshBuilder::new();
    for z in 0..CHUNK_SIZE {
        for x in 0..CHUNK_SIZE {
            let Some((top, id)) = column_surface(&input.center, x, z) else { continue };
            emit_top_quad(&mut opaque, input, id, x as f32, (top + 1) as f32, z as f32, 1.0);
        }
    }
    RawMeshResult { opaque: opaque.finish(), transparent: MeshData::default() }
}

/// LOD 3: a single chunk-sized quad at the dominant surface elevation.
fn mesh_slab(input: &MeshInput) -> RawMeshResult {
    let mut histogram = [0u16; WORLD_HEIGHT];
    let mut sample: [Option<BlockId>; WORLD_HEIGHT] = [None; WORLD_HEIGHT];
    for z in 0..CHUNK_SIZE {
        for x in 0..CHUNK_SIZE {
            if let Some((top, id)) = column_surface(&input.center, x, z) {
                histogram[top] += 1;
                sample[top].get_or_insert(id);
            }
        }
    }
    let Some(best) = (0..WORLD_HEIGHT).max_by_key(|&y| histogram[y]) else {
        return RawMeshResult::default();
    };
    if histogram[best] == 0 {
        return RawMeshResult::default();
    }

    let mut opaque = MeshBuilder::new();
    let id = sample[best].unwrap_or(blocks::STONE);
    emit_top_quad(&mut opaque, input, id, 0.0, (best + 1) as f32, 0.0, CHUNK_SIZE as f32);
    RawMeshResult { opaque: opaque.finish(), transparent: MeshData::default() }
}

/// Highest non-air block of a column, with its id.
fn column_surface(snap: &ChunkSnapshot, x: usize, z: usize) -> Option<(usize, BlockId)> {
    for y in (0..WORLD_HEIGHT).rev() {
        let id = snap.block(x, y, z);
        if id != blocks::AIR {
            return Some((y, id));
        }
    }
    None
}

fn emit_top_quad(builder: &mut MeshBuilder, input: &MeshInput, id: BlockId, x: f32, y: f32, z: f32, size: f32) {
    let layer = f32::from(texture_layer(id, BlockFace::Top));
    #[allow(clippy::cast_possible_truncation)]
    let sky = f32::from(input.sky(x as i32, y as i32, z as i32)) / 15.0;
    let corners = [
        [x, y, z],
        [x, y, z + size],
        [x + size, y, z + size],
        [x + size, y, z],
    ];
    let mut verts = [[0.0f32; VERTEX_SIZE]; 4];
    for (i, c) in corners.iter().enumerate() {
        let (u, v) = match i {
            0 => (0.0, 0.0),
            1 => (0.0, size),
            2 => (size, size),
            _ => (size, 0.0),
        };
        verts[i] = [c[0], c[1], c[2], 0.0, u, v, layer, 1.0, sky, 0.0, 0.0, 0.0];
    }
    builder.quad(&verts, false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::blocks as ids;
    use crate::lighting::compute_initial_sky_light;

    fn input_for(chunk: &Chunk) -> MeshInput {
        MeshInput { center: ChunkSnapshot::of(chunk), neighbours: [None, None, None, None] }
    }

    fn lit_chunk() -> Chunk {
        let mut c = Chunk::new(ChunkPos::new(0, 0));
        compute_initial_sky_light(&mut c);
        c
    }

    #[test]
    fn empty_chunk_meshes_to_nothing() {
        let c = lit_chunk();
        let mesh = build_mesh(&input_for(&c), 0);
        assert!(mesh.opaque.is_empty());
        assert!(mesh.transparent.is_empty());
    }

    #[test]
    fn lone_block_emits_six_faces() {
        let mut c = lit_chunk();
        c.set_block(8, 64, 8, ids::STONE);
        let mesh = build_mesh(&input_for(&c), 0);
        assert_eq!(mesh.opaque.vertex_count(), 24);
        assert_eq!(mesh.opaque.indices.len(), 36);
        assert_eq!(mesh.opaque.vertex_size, VERTEX_SIZE);
        assert!(mesh.transparent.is_empty());
    }

    #[test]
    fn touching_faces_are_culled() {
        let mut c = lit_chunk();
        c.set_block(8, 64, 8, ids::STONE);
        c.set_block(9, 64, 8, ids::STONE);
        let mesh = build_mesh(&input_for(&c), 0);
        // Two cubes share one hidden pair of faces: 12 - 2 = 10 quads.
        assert_eq!(mesh.opaque.vertex_count(), 40);
        assert_eq!(mesh.opaque.indices.len(), 60);
    }

    #[test]
    fn water_goes_to_the_transparent_pass_and_self_culls() {
        let mut c = lit_chunk();
        c.set_block(4, 60, 4, ids::WATER_SOURCE);
        c.set_block(5, 60, 4, ids::WATER_SOURCE);
        let mesh = build_mesh(&input_for(&c), 0);
        assert!(mesh.opaque.is_empty());
        // Same-fluid neighbours cull their shared faces.
        assert_eq!(mesh.transparent.vertex_count(), 40);
    }

    #[test]
    fn chunk_border_faces_are_emitted_without_neighbours() {
        let mut c = lit_chunk();
        c.set_block(0, 64, 0, ids::STONE);
        let mesh = build_mesh(&input_for(&c), 0);
        // All six faces present even though -x and -z cross the border.
        assert_eq!(mesh.opaque.vertex_count(), 24);
    }

    #[test]
    fn resident_neighbour_culls_the_border_face() {
        let mut c = lit_chunk();
        c.set_block(15, 64, 8, ids::STONE);
        let mut east = Chunk::new(ChunkPos::new(1, 0));
        east.set_block(0, 64, 8, ids::STONE);
        let input = MeshInput {
            center: ChunkSnapshot::of(&c),
            neighbours: [Some(ChunkSnapshot::of(&east)), None, None, None],
        };
        let mesh = build_mesh(&input, 0);
        assert_eq!(mesh.opaque.vertex_count(), 20, "+x face should be culled");
    }

    #[test]
    fn meshing_is_idempotent() {
        let mut c = lit_chunk();
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                for y in 0..40 + (x + z) % 3 {
                    c.set_block(x, y, z, ids::STONE);
                }
            }
        }
        compute_initial_sky_light(&mut c);
        let a = build_mesh(&input_for(&c), 0);
        let b = build_mesh(&input_for(&c), 0);
        assert_eq!(a.opaque, b.opaque);
        assert_eq!(a.transparent, b.transparent);
    }

    #[test]
    fn ao_darkens_inner_corners() {
        let mut c = lit_chunk();
        // Floor plus a wall block: the floor vertices against the wall get
        // occluded, the far ones do not.
        c.set_block(8, 64, 8, ids::STONE);
        c.set_block(9, 65, 8, ids::STONE);
        compute_initial_sky_light(&mut c);
        let mesh = build_mesh(&input_for(&c), 0);

        // Find the top face of the floor block (y == 65 on all corners) and
        // compare AO across its vertices.
        let verts = &mesh.opaque.vertices;
        let mut aos = Vec::new();
        for v in verts.chunks(VERTEX_SIZE) {
            if v[1] == 65.0 && v[3] == 0.0 {
                aos.push((v[0], v[7]));
            }
        }
        assert_eq!(aos.len(), 4, "expected one top face");
        let near_wall: Vec<f32> = aos.iter().filter(|(x, _)| *x == 9.0).map(|(_, a)| *a).collect();
        let far: Vec<f32> = aos.iter().filter(|(x, _)| *x == 8.0).map(|(_, a)| *a).collect();
        assert!(near_wall.iter().all(|&a| a < 1.0), "wall-side corners must be occluded");
        assert!(far.iter().all(|&a| (a - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn lod1_matches_lod0_topology_without_ao() {
        let mut c = lit_chunk();
        c.set_block(8, 64, 8, ids::STONE);
        c.set_block(9, 65, 8, ids::STONE);
        compute_initial_sky_light(&mut c);
        let fine = build_mesh(&input_for(&c), 0);
        let coarse = build_mesh(&input_for(&c), 1);
        assert_eq!(fine.opaque.vertex_count(), coarse.opaque.vertex_count());
        // Every LOD 1 vertex carries neutral AO.
        for v in coarse.opaque.vertices.chunks(VERTEX_SIZE) {
            assert!((v[7] - 1.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn lod2_emits_one_quad_per_column() {
        let mut c = lit_chunk();
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                for y in 0..=50 {
                    c.set_block(x, y, z, ids::STONE);
                }
            }
        }
        compute_initial_sky_light(&mut c);
        let mesh = build_mesh(&input_for(&c), 2);
        assert_eq!(mesh.opaque.vertex_count(), CHUNK_SIZE * CHUNK_SIZE * 4);
        assert!(mesh.transparent.is_empty());
    }

    #[test]
    fn lod3_is_a_single_quad_at_the_dominant_height() {
        let mut c = lit_chunk();
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                let top = if x == 0 { 60 } else { 50 };
                for y in 0..=top {
                    c.set_block(x, y, z, ids::STONE);
                }
            }
        }
        let mesh = build_mesh(&input_for(&c), 3);
        assert_eq!(mesh.opaque.vertex_count(), 4);
        // Dominant height is 50, so the slab sits at 51.
        assert!(mesh.opaque.vertices.chunks(VERTEX_SIZE).all(|v| v[1] == 51.0));
    }
}
