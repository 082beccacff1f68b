// SPDX-License-Identifier: MIT

//! Config schema: the raw (as-deserialized) shape and the validated, immutable
//! model derived from it.

use crate::entry::Entry;
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_SYNC_INTERVAL: u64 = 300;
const DEFAULT_COMMIT_THRESHOLD: u64 = 64;
const DEFAULT_RETENTION_SECS: u64 = 604_800;
const MIN_SYNC_INTERVAL: u64 = 5;
const MIN_COMMIT_THRESHOLD: u64 = 5;

/// Destination mode. `rsync` in the config file means "remote shell", matching the
/// original's naming (the other two modes also use rsync as the transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMethod {
    Local,
    Nfs,
    Rsync,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RawGlobal {
    pub backupmethod: Option<BackupMethod>,
    pub syncinterval: Option<u64>,
    pub commitchanges: Option<u64>,
    pub maintainprevious: Option<bool>,
    pub retainbackup: Option<bool>,
    pub retentiontime: Option<u64>,
    pub server: Option<String>,
    pub remotemount: Option<String>,
    pub localmount: Option<String>,
    pub sshport: Option<u16>,
    pub sshuser: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RawEntry {
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    pub recursive: Option<bool>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// The as-parsed YAML document, before validation.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RawConfig {
    pub global: RawGlobal,
    pub exclude: Vec<String>,
    pub entry: Vec<RawEntry>,
}

/// Validated, immutable destination/timing configuration.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub backup_method: BackupMethod,
    pub sync_interval_secs: u64,
    pub commit_threshold: u64,
    pub maintain_previous: bool,
    pub retain_backups: bool,
    pub retention_secs: u64,
    pub server: Option<String>,
    pub remote_mount: Option<String>,
    pub local_mount: Option<String>,
    pub ssh_port: u16,
    pub ssh_user: Option<String>,
    pub global_excludes: Vec<String>,
}

impl GlobalConfig {
    /// Validate a raw document into `(GlobalConfig, entries)`. Every defaulting and
    /// range rule from the config file table, and every `Entry` invariant, is
    /// enforced here so neither the watcher nor the job builder need re-check them.
    pub fn from_raw(raw: RawConfig) -> Result<(GlobalConfig, Vec<Entry>), ConfigError> {
        let backup_method = raw.global.backupmethod.ok_or(ConfigError::InvalidBackupMethod)?;

        let sync_interval_secs = raw.global.syncinterval.unwrap_or(DEFAULT_SYNC_INTERVAL);
        if sync_interval_secs < MIN_SYNC_INTERVAL {
            return Err(ConfigError::SyncIntervalTooLow);
        }

        let commit_threshold = raw.global.commitchanges.unwrap_or(DEFAULT_COMMIT_THRESHOLD);
        if commit_threshold < MIN_COMMIT_THRESHOLD {
            return Err(ConfigError::CommitThresholdTooLow);
        }

        let maintain_previous = raw.global.maintainprevious.unwrap_or(false);
        let mut retain_backups = raw.global.retainbackup.unwrap_or(true);
        if matches!(backup_method, BackupMethod::Rsync) || maintain_previous {
            retain_backups = true;
        }
        let retention_secs = raw.global.retentiontime.unwrap_or(DEFAULT_RETENTION_SECS);

        match backup_method {
            BackupMethod::Local | BackupMethod::Nfs => {
                if raw.global.localmount.is_none() {
                    return Err(ConfigError::MissingLocalMount);
                }
                if matches!(backup_method, BackupMethod::Nfs)
                    && (raw.global.server.is_none() || raw.global.remotemount.is_none())
                {
                    return Err(ConfigError::MissingNfsEndpoint);
                }
            }
            BackupMethod::Rsync => {
                if raw.global.server.is_none() || raw.global.remotemount.is_none() {
                    return Err(ConfigError::MissingRemoteShellEndpoint);
                }
            }
        }

        let global = GlobalConfig {
            backup_method,
            sync_interval_secs,
            commit_threshold,
            maintain_previous,
            retain_backups,
            retention_secs,
            server: raw.global.server,
            remote_mount: raw.global.remotemount,
            local_mount: raw.global.localmount,
            ssh_port: raw.global.sshport.unwrap_or(22),
            ssh_user: raw.global.sshuser,
            global_excludes: raw.exclude,
        };

        let entries = validate_entries(raw.entry)?;

        Ok((global, entries))
    }

    /// Resolve, read, parse and validate the config file. Checks `override_path`,
    /// then `./config.yaml`, then `~/.openduckbill/config.yaml`, in that order.
    pub fn load(override_path: Option<&Path>) -> Result<(GlobalConfig, Vec<Entry>, PathBuf), ConfigError> {
        let path = resolve_config_path(override_path)?;
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
        let raw: RawConfig = serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(path.clone(), e))?;
        let (global, entries) = Self::from_raw(raw)?;
        Ok((global, entries, path))
    }
}

/// Picks the first candidate that exists: the `-c` override (if given and it
/// exists), `./config.yaml`, then `~/.openduckbill/config.yaml`.
fn resolve_config_path(override_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(p) = override_path {
        return Ok(p.to_path_buf());
    }

    let cwd_candidate = PathBuf::from("config.yaml");
    if cwd_candidate.is_file() {
        return Ok(cwd_candidate);
    }

    if let Some(home) = dirs::home_dir() {
        let home_candidate = home.join(".openduckbill").join("config.yaml");
        if home_candidate.is_file() {
            return Ok(home_candidate);
        }
    }

    Err(ConfigError::NotFound)
}

fn validate_entries(raw_entries: Vec<RawEntry>) -> Result<Vec<Entry>, ConfigError> {
    if raw_entries.is_empty() {
        return Err(ConfigError::NoEntries);
    }

    let mut entries = Vec::with_capacity(raw_entries.len());
    for raw in raw_entries {
        let name = raw.name.ok_or(ConfigError::EntryMissingName)?;
        let path = raw.path.ok_or_else(|| ConfigError::EntryMissingPath { name: name.clone() })?;

        // A missing or unreadable entry path is non-fatal: skip just this entry,
        // the rest of the config still loads.
        if !path.exists() {
            tracing::warn!(entry = %name, path = %path.display(), "entry path does not exist, skipping");
            continue;
        }
        if let Err(source) = std::fs::metadata(&path) {
            tracing::warn!(entry = %name, path = %path.display(), error = %source, "entry path is not readable, skipping");
            continue;
        }

        entries.push(Entry {
            name,
            path,
            recursive: raw.recursive.unwrap_or(false),
            include: raw.include,
            exclude: raw.exclude,
        });
    }

    if entries.is_empty() {
        return Err(ConfigError::NoEntries);
    }

    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            if entries[i].path == entries[j].path {
                return Err(ConfigError::DuplicateEntryPath {
                    first: entries[i].name.clone(),
                    second: entries[j].name.clone(),
                    path: entries[i].path.clone(),
                });
            }
        }
    }

    for parent in &entries {
        if !parent.recursive {
            continue;
        }
        for child in &entries {
            if child.path != parent.path
                && child.path.starts_with(&parent.path)
            {
                return Err(ConfigError::NestedUnderRecursiveEntry {
                    parent: parent.name.clone(),
                    parent_path: parent.path.clone(),
                    child: child.name.clone(),
                    child_path: child.path.clone(),
                });
            }
        }
    }

    Ok(entries)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
