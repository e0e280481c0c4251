use criterion::{black_box, criterion_group, criterion_main, Criterion};

use regolith::chunk::mesh::{build_mesh, ChunkSnapshot, MeshInput};
use regolith::chunk::ChunkPos;
use regolith::lighting::{compute_initial_block_light, compute_initial_sky_light};
use regolith::noise::OctaveNoise;
use regolith::worldgen::{GenConfig, GenContext};

/// Full generation pipeline for one chunk.
fn bench_generate_chunk(c: &mut Criterion) {
    let ctx = GenContext::new(42, GenConfig::default());
    c.bench_function("generate_chunk", |b| {
        b.iter(|| {
            let chunk = ctx.generate_chunk(black_box(ChunkPos::new(3, -7)));
            black_box(chunk.column_top(8, 8));
        })
    });
}

/// Initial sky + block light over a fresh terrain chunk.
fn bench_initial_lighting(c: &mut Criterion) {
    let ctx = GenContext::new(42, GenConfig::default());
    let chunk = ctx.generate_chunk(ChunkPos::new(0, 0));
    c.bench_function("initial_lighting", |b| {
        b.iter(|| {
            let mut fresh = chunk.clone();
            compute_initial_sky_light(&mut fresh);
            compute_initial_block_light(&mut fresh);
            black_box(fresh.get_sky_light(8, 100, 8));
        })
    });
}

/// Detailed (LOD 0) meshing of a lit terrain chunk without neighbours.
fn bench_mesh_lod0(c: &mut Criterion) {
    let ctx = GenContext::new(42, GenConfig::default());
    let mut chunk = ctx.generate_chunk(ChunkPos::new(0, 0));
    compute_initial_sky_light(&mut chunk);
    compute_initial_block_light(&mut chunk);
    let input = MeshInput {
        center: ChunkSnapshot::of(&chunk),
        neighbours: [None, None, None, None],
    };
    c.bench_function("mesh_lod0", |b| {
        b.iter(|| {
            let mesh = build_mesh(black_box(&input), 0);
            black_box(mesh.triangle_count());
        })
    });
}

/// Coarse heightmap meshing (LOD 2), the far-field workhorse.
fn bench_mesh_lod2(c: &mut Criterion) {
    let ctx = GenContext::new(42, GenConfig::default());
    let mut chunk = ctx.generate_chunk(ChunkPos::new(5, 5));
    compute_initial_sky_light(&mut chunk);
    let input = MeshInput {
        center: ChunkSnapshot::of(&chunk),
        neighbours: [None, None, None, None],
    };
    c.bench_function("mesh_lod2", |b| {
        b.iter(|| {
            let mesh = build_mesh(black_box(&input), 2);
            black_box(mesh.triangle_count());
        })
    });
}

/// Raw octave noise sampling, the inner loop of terrain height.
fn bench_octave_noise(c: &mut Criterion) {
    let noise = OctaveNoise::new(42, 8);
    c.bench_function("octave_noise_2d", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for i in 0..256 {
                let x = f64::from(i) * 0.013;
                acc += noise.sample2(black_box(x), black_box(x * 1.7));
            }
            black_box(acc);
        })
    });
}

criterion_group!(
    benches,
    bench_generate_chunk,
    bench_initial_lighting,
    bench_mesh_lod0,
    bench_mesh_lod2,
    bench_octave_noise
);
criterion_main!(benches);
