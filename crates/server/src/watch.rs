use std::path::PathBuf;

use library::{is_supported_path, Library};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::state::AppState;

/// One filesystem notification reduced to the store work it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    Ingest(PathBuf),
    Remove(PathBuf),
    /// A rename where only one endpoint is known: ingest if the path
    /// still names a file, remove otherwise.
    Sync(PathBuf),
}

/// Owns the notification subscription and the task draining it. Created
/// after the initial scan, stopped at shutdown; there is no global
/// instance.
pub struct LibraryWatcher {
    watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl LibraryWatcher {
    pub fn start(library: Library, root: PathBuf) -> Result<Self, notify::Error> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let task = tokio::spawn(event_loop(library, rx));
        Ok(Self { watcher, task })
    }

    /// Drop the subscription and wait for the event loop to drain. No
    /// handler fires after this returns.
    pub async fn stop(self) {
        drop(self.watcher);
        if let Err(err) = self.task.await {
            warn!("Watcher loop join error: {}", err);
        }
    }
}

pub fn configure_watcher(state: &AppState, library: &Library, root: PathBuf) {
    let watch_music = state.config.read().watch_music;
    if !watch_music {
        info!("Watcher disabled (watch_music=false)");
        *state.watcher.write() = None;
        return;
    }

    match LibraryWatcher::start(library.clone(), root.clone()) {
        Ok(watcher) => {
            info!("Watching {} for changes", root.display());
            *state.watcher.write() = Some(watcher);
        }
        Err(err) => {
            warn!("Failed to start watcher: {}", err);
            *state.watcher.write() = None;
        }
    }
}

pub async fn stop_watcher(state: &AppState) {
    let watcher = state.watcher.write().take();
    if let Some(watcher) = watcher {
        watcher.stop().await;
        info!("Watcher stopped");
    }
}

async fn event_loop(library: Library, mut rx: UnboundedReceiver<Event>) {
    while let Some(event) = rx.recv().await {
        for action in classify_event(&event) {
            apply_action(&library, action).await;
        }
    }
}

/// Translate a raw notification into targeted single-file operations.
/// Directory events and unsupported extensions produce nothing; data or
/// metadata edits to an already-indexed file are deliberately not
/// re-ingested.
pub fn classify_event(event: &Event) -> Vec<WatchAction> {
    let mut actions = Vec::new();
    match &event.kind {
        EventKind::Create(CreateKind::Folder) => {}
        EventKind::Create(_) => {
            for path in &event.paths {
                if is_supported_path(path) {
                    actions.push(WatchAction::Ingest(path.clone()));
                }
            }
        }
        EventKind::Remove(RemoveKind::Folder) => {}
        EventKind::Remove(_) => {
            for path in &event.paths {
                if is_supported_path(path) {
                    actions.push(WatchAction::Remove(path.clone()));
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both => {
                if let [from, to] = event.paths.as_slice() {
                    if is_supported_path(from) {
                        actions.push(WatchAction::Remove(from.clone()));
                    }
                    // A rename onto an unsupported extension drops the
                    // track from the index.
                    if is_supported_path(to) {
                        actions.push(WatchAction::Ingest(to.clone()));
                    }
                } else {
                    for path in &event.paths {
                        if is_supported_path(path) {
                            actions.push(WatchAction::Sync(path.clone()));
                        }
                    }
                }
            }
            RenameMode::From => {
                for path in &event.paths {
                    if is_supported_path(path) {
                        actions.push(WatchAction::Remove(path.clone()));
                    }
                }
            }
            RenameMode::To => {
                for path in &event.paths {
                    if is_supported_path(path) {
                        actions.push(WatchAction::Ingest(path.clone()));
                    }
                }
            }
            _ => {
                for path in &event.paths {
                    if is_supported_path(path) {
                        actions.push(WatchAction::Sync(path.clone()));
                    }
                }
            }
        },
        EventKind::Modify(_) => {}
        _ => {}
    }
    actions
}

/// Run one action's store mutation to completion. Failures are logged
/// per event and never tear down the loop.
async fn apply_action(library: &Library, action: WatchAction) {
    let (ingest, path) = match action {
        WatchAction::Ingest(path) => (true, path),
        WatchAction::Remove(path) => (false, path),
        WatchAction::Sync(path) => {
            let exists = path.is_file();
            (exists, path)
        }
    };

    let library = library.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        if ingest {
            library
                .ingest_file(&path, None)
                .map(|track| Some(track.file_relpath))
                .map_err(|err| format!("ingest of {} failed: {}", path.display(), err))
        } else {
            library
                .remove_file(&path)
                .map(|_| None)
                .map_err(|err| format!("removal of {} failed: {}", path.display(), err))
        }
    })
    .await;

    match outcome {
        Ok(Ok(Some(relpath))) => info!("Watcher indexed {}", relpath),
        Ok(Ok(None)) => {}
        Ok(Err(message)) => warn!("Watcher event failed: {}", message),
        Err(err) => warn!("Watcher join error: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(Path::new(path).to_path_buf());
        }
        event
    }

    #[test]
    fn created_audio_files_are_ingested() {
        let actions = classify_event(&event(
            EventKind::Create(CreateKind::File),
            &["/music/a/one.mp3"],
        ));
        assert_eq!(
            actions,
            vec![WatchAction::Ingest(Path::new("/music/a/one.mp3").to_path_buf())]
        );
    }

    #[test]
    fn non_audio_and_directory_creates_are_ignored() {
        assert!(classify_event(&event(
            EventKind::Create(CreateKind::File),
            &["/music/a/cover.jpg"],
        ))
        .is_empty());
        assert!(classify_event(&event(
            EventKind::Create(CreateKind::Folder),
            &["/music/a"],
        ))
        .is_empty());
    }

    #[test]
    fn removed_audio_files_are_dropped() {
        let actions = classify_event(&event(
            EventKind::Remove(RemoveKind::File),
            &["/music/a/one.mp3"],
        ));
        assert_eq!(
            actions,
            vec![WatchAction::Remove(Path::new("/music/a/one.mp3").to_path_buf())]
        );
    }

    #[test]
    fn rename_is_remove_then_ingest() {
        let actions = classify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/music/a/old.mp3", "/music/a/new.flac"],
        ));
        assert_eq!(
            actions,
            vec![
                WatchAction::Remove(Path::new("/music/a/old.mp3").to_path_buf()),
                WatchAction::Ingest(Path::new("/music/a/new.flac").to_path_buf()),
            ]
        );
    }

    #[test]
    fn rename_to_unsupported_extension_only_removes() {
        let actions = classify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/music/a/old.mp3", "/music/a/old.bak"],
        ));
        assert_eq!(
            actions,
            vec![WatchAction::Remove(Path::new("/music/a/old.mp3").to_path_buf())]
        );
    }

    #[test]
    fn one_sided_renames_map_to_their_half() {
        let from = classify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/music/a/old.mp3"],
        ));
        assert_eq!(
            from,
            vec![WatchAction::Remove(Path::new("/music/a/old.mp3").to_path_buf())]
        );

        let to = classify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/music/a/new.mp3"],
        ));
        assert_eq!(
            to,
            vec![WatchAction::Ingest(Path::new("/music/a/new.mp3").to_path_buf())]
        );
    }

    #[test]
    fn in_place_modifications_are_a_no_op() {
        assert!(classify_event(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/music/a/one.mp3"],
        ))
        .is_empty());
        assert!(classify_event(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)),
            &["/music/a/one.mp3"],
        ))
        .is_empty());
    }

    #[tokio::test]
    async fn watcher_starts_and_stops_cleanly() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("music");
        fs::create_dir_all(&root).unwrap();
        let library = Library::open(root.clone(), tmp.path().join("index.redb")).unwrap();

        let watcher = LibraryWatcher::start(library, root).unwrap();
        watcher.stop().await;
    }
}
