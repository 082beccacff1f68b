// SPDX-License-Identifier: MIT

//! Error types produced while loading and validating configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a config file (checked -c override, ./config.yaml, ~/.openduckbill/config.yaml)")]
    NotFound,

    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to parse YAML in {0}: {1}")]
    Parse(PathBuf, #[source] serde_yaml::Error),

    #[error("global.backupmethod must be one of local, nfs, rsync")]
    InvalidBackupMethod,

    #[error("global.syncinterval must be at least 5 seconds")]
    SyncIntervalTooLow,

    #[error("global.commitchanges must be at least 5")]
    CommitThresholdTooLow,

    #[error("no entries configured; at least one `entry` is required")]
    NoEntries,

    #[error("an entry is missing its `name` field")]
    EntryMissingName,

    #[error("entry {name:?} has no path")]
    EntryMissingPath { name: String },

    #[error("entry {first:?} and {second:?} both declare path {path:?}")]
    DuplicateEntryPath {
        first: String,
        second: String,
        path: PathBuf,
    },

    #[error("entry {child:?} path {child_path:?} is nested under recursive entry {parent:?} path {parent_path:?}")]
    NestedUnderRecursiveEntry {
        parent: String,
        parent_path: PathBuf,
        child: String,
        child_path: PathBuf,
    },

    #[error("nfs/local mode requires global.localmount")]
    MissingLocalMount,

    #[error("nfs mode requires global.server and global.remotemount")]
    MissingNfsEndpoint,

    #[error("rsync (remote-shell) mode requires global.server and global.remotemount")]
    MissingRemoteShellEndpoint,
}
