//! RON file loading and a change watcher for hot reload.
//!
//! Settings are plain RON files in a directory; the watcher flips a shared
//! flag when anything under the directory is modified, and the settings
//! loader system re-reads on the next frame.

use bevy::prelude::Resource;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// File-watcher resource for RON hot-reload.
#[derive(Resource)]
pub struct RonWatcher {
    /// Set to `true` when a watched file changes.
    pub changed: Arc<Mutex<bool>>,
    _watcher: Option<RecommendedWatcher>,
}

impl RonWatcher {
    /// A watcher that never fires, for platforms or paths where the OS
    /// watcher cannot be created.
    #[must_use]
    pub fn stub() -> Self {
        RonWatcher { changed: Arc::new(Mutex::new(false)), _watcher: None }
    }

    /// Take the changed flag, resetting it.
    pub fn take_changed(&self) -> bool {
        let mut guard = match self.changed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *guard)
    }
}

/// Load and deserialize every `.ron` file in a directory. Files that fail
/// to parse are skipped with a warning.
#[must_use]
pub fn load_ron_files<T: DeserializeOwned>(path: &str) -> Vec<T> {
    let mut items = Vec::new();
    let Ok(entries) = std::fs::read_dir(path) else { return items };
    for entry in entries.flatten() {
        let p = entry.path();
        if p.extension().is_none_or(|ext| ext != "ron") {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&p) else { continue };
        match ron::from_str::<T>(&content) {
            Ok(item) => items.push(item),
            Err(e) => eprintln!("Failed to parse {}: {e:?}", p.display()),
        }
    }
    items
}

/// Watch a directory for modifications to back hot reload.
///
/// # Errors
/// Returns a `notify::Error` when the OS watcher cannot be created or the
/// path cannot be registered.
pub fn setup_ron_watcher(path: &str) -> Result<RonWatcher, notify::Error> {
    let changed = Arc::new(Mutex::new(false));
    let changed_clone = changed.clone();

    let mut watcher: RecommendedWatcher = Watcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(event.kind, notify::EventKind::Modify(_)) {
                    if let Ok(mut flag) = changed_clone.lock() {
                        *flag = true;
                    }
                }
            }
            Err(e) => eprintln!("Watch error: {e:?}"),
        },
        Config::default(),
    )?;
    watcher.watch(Path::new(path), RecursiveMode::NonRecursive)?;
    Ok(RonWatcher { changed, _watcher: Some(watcher) })
}
