// SPDX-License-Identifier: MIT

//! Reaper (C7): walks the destination tree, classifies each entry against the
//! current schedule, ages out anything unscheduled, and deletes leaves-first.
//!
//! Grounded on `EntryDeletor` (`original_source/src/deletor.py`): that class
//! builds the same three-way classification (scheduled / discontinued /
//! never-scheduled) by regex-matching each destination path against every
//! entry's source path, re-promotes discontinued parents that still contain
//! scheduled descendants, then age-checks and deletes files-before-directories,
//! directories deepest-first. Destination items here are converted back to the
//! source-equivalent absolute path they were mirrored from (undoing the
//! `--relative` copy), which lets classification reuse [`Entry::covers`] and
//! [`Entry::covers_non_recursive`] instead of re-deriving the same rules.

use crate::error::ReaperError;
use openduckbill_core::{Clock, Entry};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Scheduled,
    Discontinued,
    NeverScheduled,
}

/// What happened to a single destination item, for the optional `-s` report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    KeptScheduled,
    DeletedDiscontinued,
    DeletedNeverScheduled,
    KeptTooYoung,
    DeleteFailed(String),
}

#[derive(Debug, Clone, Default)]
pub struct ReaperReport {
    pub outcomes: Vec<(PathBuf, ItemOutcome)>,
}

impl ReaperReport {
    pub fn deleted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::DeletedDiscontinued | ItemOutcome::DeletedNeverScheduled))
            .count()
    }
}

/// Converts a destination path back to the absolute source path it mirrors:
/// strip the destination root, then re-anchor at `/`. This is the inverse of
/// what `--relative` did when the file was copied in.
fn source_equivalent(layout_root: &Path, destination_item: &Path) -> PathBuf {
    let rel = destination_item.strip_prefix(layout_root).unwrap_or(destination_item);
    Path::new("/").join(rel)
}

/// Classify one source-equivalent path against the entry list.
pub fn classify(source_path: &Path, entries: &[Entry]) -> Classification {
    let mut discontinued = false;
    for entry in entries {
        if !source_path.starts_with(&entry.path) {
            continue;
        }
        let scheduled = if entry.recursive {
            true
        } else {
            entry.covers_non_recursive(source_path)
        };
        if scheduled {
            return Classification::Scheduled;
        }
        discontinued = true;
    }
    if discontinued {
        Classification::Discontinued
    } else {
        Classification::NeverScheduled
    }
}

/// Classify every destination item (given as source-equivalent paths already).
pub fn classify_all(source_paths: &[PathBuf], entries: &[Entry]) -> HashMap<PathBuf, Classification> {
    source_paths.iter().map(|p| (p.clone(), classify(p, entries))).collect()
}

/// Re-promote discontinued items whose subtree still contains a scheduled
/// item: don't delete a parent of live content.
pub fn promote_discontinued_with_scheduled_descendants(classifications: &mut HashMap<PathBuf, Classification>) {
    let scheduled: Vec<PathBuf> = classifications
        .iter()
        .filter(|(_, c)| **c == Classification::Scheduled)
        .map(|(p, _)| p.clone())
        .collect();

    for (path, c) in classifications.iter_mut() {
        if *c != Classification::Discontinued {
            continue;
        }
        if scheduled.iter().any(|s| s != path && s.starts_with(path)) {
            *c = Classification::Scheduled;
        }
    }
}

/// Discontinued ∪ never-scheduled, after promotion.
pub fn removable_set(classifications: &HashMap<PathBuf, Classification>) -> Vec<PathBuf> {
    classifications
        .iter()
        .filter(|(_, c)| matches!(c, Classification::Discontinued | Classification::NeverScheduled))
        .map(|(p, _)| p.clone())
        .collect()
}

/// Sort deletable destination paths: files/symlinks/devices first (any
/// order), then directories deepest-first, so each directory is empty by the
/// time it's reached.
pub fn order_for_deletion(items: Vec<(PathBuf, bool)>) -> Vec<PathBuf> {
    let (mut dirs, files): (Vec<_>, Vec<_>) = items.into_iter().partition(|(_, is_dir)| *is_dir);
    dirs.sort_by_key(|(p, _)| std::cmp::Reverse(p.components().count()));
    files.into_iter().map(|(p, _)| p).chain(dirs.into_iter().map(|(p, _)| p)).collect()
}

pub struct Reaper<C: Clock> {
    clock: C,
    retention_secs: u64,
}

impl<C: Clock> Reaper<C> {
    pub fn new(clock: C, retention_secs: u64) -> Self {
        Self { clock, retention_secs }
    }

    /// The reaper's own delay sequence: first run after `sync_interval`, then
    /// doubling each subsequent run until it would exceed `retention_secs`, at
    /// which point it saturates at the prior delay.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let retention = Duration::from_secs(self.retention_secs);
        if current > retention {
            current
        } else {
            current + current
        }
    }

    /// Walk `layout_path`, classify every item, age-check the removable set,
    /// and delete in leaves-first order. Returns a report of every decision
    /// made, for the optional `-s` deletion log.
    pub fn run(&self, layout_path: &Path, entries: &[Entry]) -> Result<ReaperReport, ReaperError> {
        if !layout_path.is_dir() {
            return Err(ReaperError::Walk(
                layout_path.to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "destination layout path is not a directory"),
            ));
        }

        let mut report = ReaperReport::default();

        let walked: Vec<PathBuf> = WalkDir::new(layout_path)
            .min_depth(1)
            .into_iter()
            .filter_map(|res| res.ok())
            .map(|e| e.path().to_path_buf())
            .collect();

        let source_of: HashMap<PathBuf, PathBuf> =
            walked.iter().map(|p| (p.clone(), source_equivalent(layout_path, p))).collect();

        let source_paths: Vec<PathBuf> = source_of.values().cloned().collect();
        let mut classifications = classify_all(&source_paths, entries);
        promote_discontinued_with_scheduled_descendants(&mut classifications);

        let removable_sources = removable_set(&classifications);
        let mut removable_dest: Vec<PathBuf> = Vec::new();
        for dest_path in &walked {
            let src = &source_of[dest_path];
            if removable_sources.contains(src) {
                removable_dest.push(dest_path.clone());
            } else {
                report.outcomes.push((dest_path.clone(), ItemOutcome::KeptScheduled));
            }
        }

        let now = self.clock.epoch_secs();
        let mut deletable: Vec<(PathBuf, bool)> = Vec::new();
        for dest_path in removable_dest {
            let meta = match std::fs::symlink_metadata(&dest_path) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!(path = %dest_path.display(), error = %e, "could not lstat reaper candidate");
                    continue;
                }
            };
            #[cfg(unix)]
            let ctime = {
                use std::os::unix::fs::MetadataExt;
                meta.ctime().max(0) as u64
            };
            #[cfg(not(unix))]
            let ctime = 0u64;

            let age = now.saturating_sub(ctime);
            let src = &source_of[&dest_path];
            let classification = classifications[src];
            if age > self.retention_secs {
                deletable.push((dest_path, meta.is_dir()));
            } else {
                let outcome = match classification {
                    Classification::Discontinued | Classification::NeverScheduled => ItemOutcome::KeptTooYoung,
                    Classification::Scheduled => ItemOutcome::KeptScheduled,
                };
                report.outcomes.push((dest_path, outcome));
            }
        }

        for path in order_for_deletion(deletable) {
            let src = &source_of[&path];
            let was_never_scheduled = matches!(classifications[src], Classification::NeverScheduled);
            match delete_one(&path) {
                Ok(()) => {
                    let outcome = if was_never_scheduled {
                        ItemOutcome::DeletedNeverScheduled
                    } else {
                        ItemOutcome::DeletedDiscontinued
                    };
                    report.outcomes.push((path, outcome));
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "reaper failed to delete item");
                    report.outcomes.push((path, ItemOutcome::DeleteFailed(e.to_string())));
                }
            }
        }

        Ok(report)
    }
}

/// Delete a single destination item. Directory-not-empty (errno 39, ENOTEMPTY)
/// is swallowed: it means a sibling under the same parent failed to delete for
/// an unrelated reason, and re-raising here would just duplicate that error.
fn delete_one(path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        match std::fs::remove_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(39) => Ok(()),
            Err(e) => Err(e),
        }
    } else {
        std::fs::remove_file(path)
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
