// SPDX-License-Identifier: MIT

//! Event coalescer (C5): merges a burst of filesystem events into a compact
//! (counter, unique-path-set) summary, consumed by the trigger engine.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// The eight pyinotify event kinds the original watches for, carried over so the
/// watcher adapter has a stable target to translate `notify::EventKind` into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    CloseWrite,
    Create,
    Delete,
    Modify,
    MovedFrom,
    MovedTo,
    Attrib,
    MoveSelf,
}

struct State {
    counter: u64,
    modified_paths: HashSet<PathBuf>,
}

/// Shared, mutex-guarded coalescer state. Cheap to clone — every clone shares the
/// same underlying buffer.
#[derive(Clone)]
pub struct Coalescer {
    inner: Arc<Mutex<State>>,
}

/// A point-in-time view of the coalescer, taken without resetting it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub counter: u64,
    pub paths: Vec<PathBuf>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(State {
                counter: 0,
                modified_paths: HashSet::new(),
            })),
        }
    }

    /// Record one observed event. `kind` is accepted for symmetry with the
    /// original's event processor even though every kind is treated identically.
    pub fn record(&self, _kind: ChangeKind, path: PathBuf) {
        let mut state = self.inner.lock();
        state.counter += 1;
        state.modified_paths.insert(path);
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.inner.lock();
        Snapshot {
            counter: state.counter,
            paths: state.modified_paths.iter().cloned().collect(),
        }
    }

    /// Atomically snapshot and reset in one critical section, so no event
    /// ingested between the two can be lost or double-counted.
    pub fn snapshot_and_reset(&self) -> Snapshot {
        let mut state = self.inner.lock();
        let snapshot = Snapshot {
            counter: state.counter,
            paths: state.modified_paths.iter().cloned().collect(),
        };
        state.counter = 0;
        state.modified_paths.clear();
        snapshot
    }
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "coalescer_tests.rs"]
mod tests;
