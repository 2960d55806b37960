// src/watcher.rs
use crate::event::{ChangeEvent, ChangeKind};
use anyhow::{bail, Result};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::Watcher as NotifyWatcherTrait; // To use .watcher() and .cache()
use notify_debouncer_full::{new_debouncer, DebouncedEvent};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};

/// Debounce window; editors often emit several events per save.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Runs the file system watcher in a background thread.
///
/// Folders that do not exist or are not directories are skipped with a
/// warning. Debounced events are converted to [`ChangeEvent`]s and sent on
/// `event_tx`.
///
/// # Errors
///
/// Fails before spawning anything if none of `folders` is a watchable directory.
pub async fn run_watcher(folders: Vec<String>, event_tx: Sender<ChangeEvent>) -> Result<()> {
    let watchable: Vec<PathBuf> = folders
        .iter()
        .map(PathBuf::from)
        .filter(|path| {
            if !path.is_dir() {
                warn!(
                    "[WatcherThread] Path does not exist or is not a directory, skipping: {}",
                    path.display()
                );
                return false;
            }
            true
        })
        .collect();
    if watchable.is_empty() {
        bail!("No folders to watch among {:?}", folders);
    }

    std::thread::spawn(move || {
        let (debouncer_internal_tx, debouncer_internal_rx) = std::sync::mpsc::channel();

        // Create debouncer. It will live as long as this thread.
        let mut debouncer = match new_debouncer(DEBOUNCE, None, debouncer_internal_tx) {
            Ok(d) => d,
            Err(e) => {
                error!("[WatcherThread] Failed to create debouncer: {}", e);
                return;
            }
        };

        for path in &watchable {
            match debouncer
                .watcher()
                .watch(path, notify::RecursiveMode::Recursive)
            {
                Ok(_) => info!("[WatcherThread] Watching folder: {}", path.display()),
                Err(e) => error!(
                    "[WatcherThread] Failed to watch folder {}: {}",
                    path.display(),
                    e
                ),
            }
            debouncer
                .cache()
                .add_root(path, notify::RecursiveMode::Recursive);
        }

        loop {
            match debouncer_internal_rx.recv() {
                Ok(Ok(events)) => {
                    for debounced_event in events {
                        if !handle_debounced_event(&debounced_event, &event_tx) {
                            info!("[WatcherThread] Event receiver dropped. Watcher thread exiting.");
                            return;
                        }
                    }
                }
                Ok(Err(errors)) => {
                    for error in errors {
                        error!("[WatcherThread] Debouncer reported error: {:?}", error);
                    }
                }
                Err(e) => {
                    error!(
                        "[WatcherThread] Debouncer internal channel error: {:?}. Watcher thread exiting.",
                        e
                    );
                    break;
                }
            }
        }
        info!("[WatcherThread] Exiting normally.");
    });

    Ok(())
}

/// Maps a notify event kind onto a [`ChangeKind`]; `None` for kinds the
/// router never cares about (access, metadata-only and so on).
pub fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Create),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Create),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Remove),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => Some(ChangeKind::Rename),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Write),
        EventKind::Remove(_) => Some(ChangeKind::Remove),
        _ => None,
    }
}

/// Sends one debounced event on; returns false once the receiver is gone.
fn handle_debounced_event(debounced_event: &DebouncedEvent, event_tx: &Sender<ChangeEvent>) -> bool {
    let Some(kind) = change_kind(&debounced_event.kind) else {
        debug!(
            "[WatcherThread] Ignored debounced event kind: {:?}",
            debounced_event.kind
        );
        return true;
    };

    // A rename reports [from, to]; the new name is the one worth routing.
    let path = match kind {
        ChangeKind::Rename => debounced_event.paths.last(),
        _ => debounced_event.paths.first(),
    };
    let Some(path) = path else {
        debug!("Received debounced event with no paths: {:?}", debounced_event);
        return true;
    };

    let event = ChangeEvent::new(path.clone(), kind);
    debug!("[WatcherThread] Produced event: {:?}", event);

    // Blocking send: this is a plain std thread.
    event_tx.blocking_send(event).is_ok()
}
