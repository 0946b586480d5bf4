use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{info, warn};

use crate::config::resolve_path;
use crate::state::{AppState, LibraryStatus};
use crate::watch::configure_watcher;
use library::Library;

/// Open the index, converge it with the tree, then hand the library to
/// the serving layer and start the watcher. The walk runs on the
/// blocking pool so request handling never stalls behind it.
pub fn start_index(state: AppState, root: PathBuf) {
    {
        let mut guard = state.library_state.write();
        guard.library = None;
        guard.status = LibraryStatus::Scanning {
            started: SystemTime::now(),
        };
    }
    *state.watcher.write() = None;

    tokio::spawn(async move {
        let db = Arc::clone(&state.db);
        let scan_root = root.clone();
        let result = tokio::task::spawn_blocking(move || {
            let library = Library::open_with_db(scan_root, db)?;
            let summary = library.scan_tree()?;
            let stats = library.stats()?;
            Ok::<_, library::LibraryError>((library, summary, stats))
        })
        .await;

        match result {
            Ok(Ok((library, summary, stats))) => {
                {
                    let mut guard = state.library_state.write();
                    guard.library = Some(library.clone());
                    guard.status = LibraryStatus::Ready(stats.clone());
                }
                info!(
                    "Library ready: {} artists, {} albums, {} tracks ({} added, {} failed)",
                    stats.artists,
                    stats.albums,
                    stats.tracks,
                    summary.added,
                    summary.failures.len()
                );
                configure_watcher(&state, &library, root);
            }
            Ok(Err(err)) => {
                let message = err.to_string();
                let mut guard = state.library_state.write();
                guard.library = None;
                guard.status = LibraryStatus::Error(message.clone());
                warn!("Library scan failed: {}", message);
            }
            Err(err) => {
                let message = err.to_string();
                let mut guard = state.library_state.write();
                guard.library = None;
                guard.status = LibraryStatus::Error(message.clone());
                warn!("Library scan join error: {}", message);
            }
        }
    });
}

pub fn set_library_missing(state: &AppState, path: PathBuf) {
    let mut guard = state.library_state.write();
    guard.library = None;
    guard.status = LibraryStatus::Missing(path);
}

pub fn apply_music_root_update(state: AppState, new_root: &str) -> String {
    let path = resolve_path(&state.config_path, new_root);
    if !path.exists() {
        set_library_missing(&state, path);
        return "Music directory not found.".to_string();
    }
    start_index(state, path);
    "Scanning started.".to_string()
}
