//! Startup systems: the focal-point camera and the shared chunk materials.
//!
//! The camera here is a stand-in for the real player controller (an
//! external collaborator); streaming only reads its translation.

use bevy::prelude::*;
use regolith::chunk::{ChunkMaterials, GenContextRes};
use regolith::world::World;

/// Spawn the camera at the world spawn point plus a sun-ish directional
/// light so the terrain is visible.
#[allow(clippy::needless_pass_by_value)]
pub fn setup_scene(mut commands: Commands, genctx: Res<GenContextRes>) {
    let (x, y, z) = World::spawn_point(&genctx.0);
    #[allow(clippy::cast_possible_truncation)]
    commands.spawn(Camera3dBundle {
        transform: Transform::from_xyz(x as f32, y as f32, z as f32)
            .looking_to(Vec3::new(0.5, -0.15, 0.5).normalize(), Vec3::Y),
        ..default()
    });

    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            illuminance: 10_000.0,
            shadows_enabled: false,
            ..default()
        },
        transform: Transform::from_rotation(Quat::from_euler(EulerRot::XYZ, -0.9, 0.4, 0.0)),
        ..default()
    });
}

/// Create the two shared chunk materials: one opaque, one alpha-blended
/// for the water/leaves pass.
pub fn setup_chunk_materials(
    mut commands: Commands,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let opaque = materials.add(StandardMaterial {
        perceptual_roughness: 0.9,
        reflectance: 0.05,
        ..default()
    });
    let transparent = materials.add(StandardMaterial {
        perceptual_roughness: 0.6,
        reflectance: 0.1,
        alpha_mode: AlphaMode::Blend,
        base_color: Color::srgba(1.0, 1.0, 1.0, 0.8),
        ..default()
    });
    commands.insert_resource(ChunkMaterials { opaque, transparent });
}
