// SPDX-License-Identifier: MIT

//! Backup job builder (C4): composes the rsync argument vector and runs it.
//!
//! Argument order is load-bearing — it mirrors the upstream backup tool's own
//! composition exactly, since some rsync flags (`--relative` in particular)
//! interact with how the source path is expressed.

use crate::command::CommandRunner;
use crate::destination::Destination;
use crate::error::JobError;
use openduckbill_core::Entry;
use std::path::{Path, PathBuf};

pub struct JobOptions<'a> {
    pub rsync_binary: &'a str,
    pub exclude_file: &'a Path,
    pub dry_run: bool,
    pub maintain_previous: bool,
    pub is_remote: bool,
    pub ssh_path: &'a str,
    pub ssh_port: u16,
}

/// Composes the synchronizer argv for a single entry, optionally narrowed to
/// `source_override` (the incremental path), and runs it via `runner`.
pub async fn run_backup(
    entry: &Entry,
    source_override: Option<&Path>,
    destination: &Destination,
    layout_path: &Path,
    opts: &JobOptions<'_>,
    runner: &CommandRunner,
) -> Result<(), JobError> {
    let argv = build_argv(entry, source_override, destination, layout_path, opts);
    let code = runner.run(&argv).await;
    if code < 0 {
        tracing::warn!(entry = %entry.name, code, "synchronizer terminated by signal");
        return Err(JobError::Signaled(-code, entry.name.clone()));
    }
    if code != 0 {
        tracing::error!(entry = %entry.name, code, "synchronizer exited with a failure");
        return Err(JobError::NonZeroExit(code, entry.name.clone()));
    }
    Ok(())
}

pub fn build_argv(
    entry: &Entry,
    source_override: Option<&Path>,
    destination: &Destination,
    layout_path: &Path,
    opts: &JobOptions<'_>,
) -> Vec<String> {
    let mut argv = Vec::new();

    argv.push(opts.rsync_binary.to_string());
    if opts.dry_run {
        argv.push("--dry-run".into());
    }

    if opts.is_remote {
        argv.push("-e".into());
        argv.push(format!("{} -p {}", opts.ssh_path, opts.ssh_port));
    }

    let mut source = source_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| entry.path.clone());

    if entry.recursive {
        argv.push("-r".into());
    } else {
        if !source.is_file() {
            source = trailing_slash(&source);
        }
        argv.push("-d".into());
    }

    for exc in &entry.exclude {
        if !exc.is_empty() {
            argv.push(format!("--exclude={exc}"));
        }
    }
    for inc in &entry.include {
        if !inc.is_empty() {
            argv.push(format!("--include={inc}"));
        }
    }

    if opts.maintain_previous {
        argv.push("-b".into());
        argv.push("--suffix=.odb~".into());
    } else {
        argv.push("--delete".into());
        argv.push("--delete-after".into());
    }

    argv.push("--relative".into());
    argv.push("--links".into());
    argv.push("--perms".into());
    argv.push("--times".into());
    argv.push("--owner".into());
    argv.push("--group".into());
    argv.push("--devices".into());
    argv.push("--temp-dir=/tmp".into());
    argv.push("--update".into());
    argv.push("--delete-excluded".into());
    argv.push("--force".into());
    argv.push(format!("--exclude-from={}", opts.exclude_file.display()));
    argv.push(source.display().to_string());

    argv.push(destination.destination_arg(layout_path));

    argv
}

fn trailing_slash(path: &Path) -> PathBuf {
    let mut s = path.display().to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    PathBuf::from(s)
}

/// Group modified paths by the entry that covers them, then narrow each group to
/// the longest common directory prefix. Paths not covered by any entry are
/// dropped. A single-path group is returned verbatim (the law's tie-break).
pub fn narrow_paths<'a>(
    modified_paths: &[PathBuf],
    entries: &'a [Entry],
) -> Vec<(&'a Entry, PathBuf)> {
    let mut result = Vec::new();
    for entry in entries {
        let matched: Vec<&Path> = modified_paths
            .iter()
            .filter(|p| p.starts_with(&entry.path))
            .map(PathBuf::as_path)
            .collect();
        if matched.is_empty() {
            continue;
        }
        result.push((entry, common_dir_prefix(&matched)));
    }
    result
}

/// Longest common leading *directory* among a set of paths, compared
/// component-wise (not character-wise). A single-element slice returns that
/// path unchanged.
fn common_dir_prefix(paths: &[&Path]) -> PathBuf {
    if paths.len() == 1 {
        return paths[0].to_path_buf();
    }

    let components: Vec<Vec<std::path::Component>> =
        paths.iter().map(|p| p.components().collect()).collect();
    let min_len = components.iter().map(Vec::len).min().unwrap_or(0);

    let mut common = Vec::new();
    for i in 0..min_len {
        let first = components[0][i];
        if components.iter().all(|c| c[i] == first) {
            common.push(first);
        } else {
            break;
        }
    }

    if common.is_empty() {
        return PathBuf::from("/");
    }
    common.into_iter().collect()
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
