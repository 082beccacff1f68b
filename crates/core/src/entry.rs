// SPDX-License-Identifier: MIT

//! A single user-declared backup entry.

use std::path::{Path, PathBuf};

/// A source path to back up, with its recursion and filter rules.
///
/// Entries are immutable for the lifetime of the process: the set is built once at
/// startup by [`crate::config::GlobalConfig::load`] and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
    pub recursive: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Entry {
    /// True if `candidate` is `self.path` itself, or (when recursive) any descendant.
    pub fn covers(&self, candidate: &Path) -> bool {
        candidate == self.path || (self.recursive && candidate.starts_with(&self.path))
    }

    /// True if `candidate` is a direct child of `self.path` with no deeper
    /// component — the non-recursive entry's "own level" rule used by the reaper.
    pub fn covers_non_recursive(&self, candidate: &Path) -> bool {
        if candidate == self.path {
            return true;
        }
        match candidate.strip_prefix(&self.path) {
            Ok(rest) => rest.components().count() <= 1,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
