//! Settings loading and hot-reloading.
//!
//! Settings are read from RON files in `data/settings/`; the first file
//! that parses wins, and missing files fall back to defaults. A watcher
//! system reloads at runtime and pushes the streaming values into the
//! live `StreamingConfig`.

use crate::chunk::StreamingConfig;
use crate::ron::{load_ron_files, setup_ron_watcher};
use crate::settings::Settings;
use bevy::prelude::{DetectChanges, Res, ResMut, Resource};

pub const SETTINGS_DIR: &str = "data/settings";

#[derive(Resource)]
pub struct SettingsWatcher(pub crate::ron::RonWatcher);

impl SettingsWatcher {
    #[must_use]
    pub fn stub() -> Self {
        SettingsWatcher(crate::ron::RonWatcher::stub())
    }
}

/// Load settings from a directory; the first parsed file wins, defaults
/// otherwise.
#[must_use]
pub fn load_settings_from_dir(path: &str) -> Settings {
    load_ron_files(path).into_iter().next().unwrap_or_else(Settings::defaults)
}

/// Create the hot-reload watcher for the settings directory.
///
/// # Errors
/// Propagates the `notify` error when the OS watcher cannot be created.
pub fn setup_settings_watcher(path: &str) -> Result<SettingsWatcher, notify::Error> {
    setup_ron_watcher(path).map(SettingsWatcher)
}

/// Reload settings when the watcher fires.
#[allow(clippy::needless_pass_by_value)]
pub fn check_settings_changes(watcher: Res<SettingsWatcher>, mut settings: ResMut<Settings>) {
    if watcher.0.take_changed() {
        bevy::log::info!("settings changed, reloading");
        *settings = load_settings_from_dir(SETTINGS_DIR);
    }
}

/// Keep the streaming config in step with the (possibly hot-reloaded)
/// settings. CLI overrides are applied once at startup by writing them
/// back into the `Settings` resource.
#[allow(clippy::needless_pass_by_value)]
pub fn sync_streaming_settings(settings: Res<Settings>, mut config: ResMut<StreamingConfig>) {
    if !settings.is_changed() {
        return;
    }
    config.render_distance = settings.streaming.render_distance.max(2);
    config.unload_margin = settings.streaming.unload_margin.max(1);
}
