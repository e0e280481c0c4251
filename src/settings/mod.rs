//! Settings, types and defaults.
//!
//! Settings live in RON files under `data/settings/` and hot-reload through
//! the RON watcher. CLI flags override the file values at startup; the
//! relevant flags for the world core are `--seed`, `--save-dir` and
//! `--render-distance`.

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

pub mod loader;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingSettings {
    #[serde(default = "StreamingSettings::default_render_distance")]
    pub render_distance: i32, // Radius in chunks kept resident around the player.
    #[serde(default = "StreamingSettings::default_unload_margin")]
    pub unload_margin: i32, // Extra chunks beyond the radius before unloading.
}

impl StreamingSettings {
    fn default_render_distance() -> i32 {
        20
    }
    fn default_unload_margin() -> i32 {
        2
    }
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            render_distance: Self::default_render_distance(),
            unload_margin: Self::default_unload_margin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSettings {
    #[serde(default)]
    pub seed: u64, // World seed; the generator lock pins it per save.
    #[serde(default = "WorldSettings::default_save_dir")]
    pub save_dir: String, // Save directory holding regions and the lock file.
}

impl WorldSettings {
    fn default_save_dir() -> String {
        "saves/world".to_string()
    }
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self { seed: 0, save_dir: Self::default_save_dir() }
    }
}

/// Root settings resource.
#[derive(Resource, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub streaming: StreamingSettings,
    #[serde(default)]
    pub world: WorldSettings,
}

impl Settings {
    #[must_use]
    pub fn defaults() -> Self {
        Self::default()
    }
}
