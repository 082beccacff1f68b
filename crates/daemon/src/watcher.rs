// SPDX-License-Identifier: MIT

//! Watcher adapter (C10): bridges the `notify` filesystem watcher into the
//! event coalescer. Grounded in the teacher's own `notify::recommended_watcher`
//! + channel-bridge idiom (`cli/src/output.rs`'s file-tail watcher); event
//! mapping follows `FileMonEventProcessor`'s eight pyinotify kinds
//! (`original_source/src/daemon.py`), approximated onto `notify::EventKind`.

use crate::coalescer::{ChangeKind, Coalescer};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use openduckbill_core::Entry;
use tokio::sync::mpsc;

/// Owns the live `notify` watcher. `RecommendedWatcher`'s own `Drop` tears
/// down the OS-level watch, so dropping this stops monitoring, matching the
/// original's `notifier_handle.stop()` on shutdown.
pub struct FsWatcher {
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Start watching every entry's path (recursively or not, per its flag)
    /// and spawn a task that drains matched events into `coalescer`.
    pub fn start(entries: &[Entry], coalescer: Coalescer) -> Result<Self, notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => {
                tracing::warn!(error = %e, "filesystem watcher reported an error");
            }
        })?;

        for entry in entries {
            let mode = if entry.recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
            watcher.watch(&entry.path, mode)?;
            tracing::info!(path = %entry.path.display(), recursive = entry.recursive, "started monitoring");
        }

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for (kind, path) in translate(event) {
                    coalescer.record(kind, path);
                }
            }
        });

        Ok(Self { watcher })
    }
}

/// Map one `notify` event onto zero or more `(ChangeKind, PathBuf)` coalescer
/// records. A rename event carries two paths (from, to) under `notify`'s
/// tracked-rename mode; both are recorded as their own pyinotify-equivalent
/// kind, same as the original watching both `IN_MOVED_FROM` and
/// `IN_MOVED_TO`.
fn translate(event: Event) -> Vec<(ChangeKind, std::path::PathBuf)> {
    let kind = match event.kind {
        EventKind::Create(CreateKind::Any | CreateKind::File | CreateKind::Folder | CreateKind::Other) => {
            Some(ChangeKind::Create)
        }
        EventKind::Remove(RemoveKind::Any | RemoveKind::File | RemoveKind::Folder | RemoveKind::Other) => {
            Some(ChangeKind::Delete)
        }
        EventKind::Modify(ModifyKind::Data(_)) => Some(ChangeKind::CloseWrite),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(ChangeKind::Attrib),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::MovedFrom),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::MovedTo),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::MoveSelf),
        EventKind::Modify(ModifyKind::Any | ModifyKind::Other) => Some(ChangeKind::Modify),
        _ => None,
    };

    let Some(kind) = kind else { return Vec::new() };
    event.paths.into_iter().map(|p| (kind, p)).collect()
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
