// SPDX-License-Identifier: MIT

//! Error types for the daemon's runtime components.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("failed to run `{0}`: {1}")]
    Spawn(&'static str, #[source] std::io::Error),

    #[error("mount of {0} failed and verification still reports unmounted")]
    MountVerifyFailed(PathBuf),

    #[error("destination layout missing or not writable at {0}")]
    LayoutMissing(PathBuf),

    #[error("failed to create destination layout at {0}: {1}")]
    CreateLayoutFailed(PathBuf, #[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("synchronizer exited with status {0} for entry {1:?}")]
    NonZeroExit(i32, String),

    #[error("synchronizer was terminated by signal {0} for entry {1:?}")]
    Signaled(i32, String),

    #[error("failed to spawn synchronizer for entry {0:?}: {1}")]
    Spawn(String, #[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ReaperError {
    #[error("failed to walk destination tree at {0}: {1}")]
    Walk(PathBuf, #[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("config error: {0}")]
    Config(#[from] openduckbill_core::ConfigError),

    #[error("destination error: {0}")]
    Destination(#[from] DestinationError),

    #[error("required external binary `{0}` was not found on PATH")]
    MissingBinary(&'static str),

    #[error("failed to start filesystem watcher: {0}")]
    WatcherStart(#[source] notify::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
