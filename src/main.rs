use bevy::prelude::*;
use bevy::window::{PresentMode, Window, WindowPlugin};
use clap::Parser;
use regolith::chunk::{
    flush_saves_on_exit, process_block_edits, stream_chunks, world_clock_and_fluids, BlockEdit,
    ChunkEntities, FocalChunk, GenContextRes, GenEpochs, InFlightJobs, MeshGenerationStats,
    PendingChunks, PendingMeshBuilds, PendingSaves, RemeshQueue, StartupTimer, StreamingConfig,
    StreamingDiagnostics, WorldClock, WorldStoreRes,
};
use regolith::fluid::FluidSim;
use regolith::persist::{check_generator_lock, RegionStore};
use regolith::settings::loader as settings_loader;
use regolith::world::World;
use regolith::worldgen::{GenConfig, GenContext};
use std::path::PathBuf;
use std::sync::Arc;

mod app;
use app::{setup_chunk_materials, setup_scene};

/// World streaming engine.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// World seed; must match the save's generator lock.
    #[arg(long)]
    seed: Option<u64>,

    /// Save directory holding the region files and generator lock.
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Streaming radius in chunks.
    #[arg(long)]
    render_distance: Option<i32>,
}

fn main() {
    let args = Args::parse();
    let mut settings = settings_loader::load_settings_from_dir(settings_loader::SETTINGS_DIR);
    let settings_watcher = settings_loader::setup_settings_watcher(settings_loader::SETTINGS_DIR)
        .unwrap_or_else(|_| settings_loader::SettingsWatcher::stub());

    // CLI flags override the settings files.
    if let Some(seed) = args.seed {
        settings.world.seed = seed;
    }
    if let Some(dir) = args.save_dir {
        settings.world.save_dir = dir.display().to_string();
    }
    if let Some(r) = args.render_distance {
        settings.streaming.render_distance = r.max(2);
    }

    let seed = settings.world.seed;
    let save_dir = PathBuf::from(&settings.world.save_dir);
    if let Err(e) = check_generator_lock(&save_dir, seed) {
        eprintln!("cannot open save: {e}");
        std::process::exit(1);
    }
    let store = match RegionStore::open(&save_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cannot open region store: {e}");
            std::process::exit(1);
        }
    };

    let mut app = App::new();

    app.add_plugins(DefaultPlugins.set(WindowPlugin {
        primary_window: Some(Window {
            title: "regolith".to_string(),
            present_mode: PresentMode::AutoNoVsync,
            ..default()
        }),
        ..default()
    }));

    app.insert_resource(StreamingConfig {
        render_distance: settings.streaming.render_distance,
        unload_margin: settings.streaming.unload_margin,
    });
    app.insert_resource(GenContextRes(Arc::new(GenContext::new(seed, GenConfig::default()))));
    app.insert_resource(WorldStoreRes(Arc::new(store)));
    app.insert_resource(World::new());
    app.insert_resource(FluidSim::new());
    app.insert_resource(PendingChunks::default());
    app.insert_resource(PendingMeshBuilds::default());
    app.insert_resource(PendingSaves::default());
    app.insert_resource(InFlightJobs::default());
    app.insert_resource(GenEpochs::default());
    app.insert_resource(RemeshQueue::default());
    app.insert_resource(ChunkEntities::default());
    app.insert_resource(MeshGenerationStats::default());
    app.insert_resource(FocalChunk::default());
    app.insert_resource(StartupTimer::default());
    app.insert_resource(StreamingDiagnostics::default());
    app.insert_resource(WorldClock::default());
    app.insert_resource(settings);
    app.insert_resource(settings_watcher);

    app.add_event::<BlockEdit>();

    app.add_systems(Startup, (setup_scene, setup_chunk_materials));
    app.add_systems(PreUpdate, world_clock_and_fluids);
    app.add_systems(
        Update,
        (
            stream_chunks,
            process_block_edits,
            settings_loader::check_settings_changes,
            settings_loader::sync_streaming_settings,
        ),
    );
    app.add_systems(Last, flush_saves_on_exit);

    app.run();
}
