// SPDX-License-Identifier: MIT

//! Materializes the global exclude list into a temp file consumed by the
//! synchronizer via `--exclude-from=`.

use std::io::Write;
use std::path::PathBuf;
use tempfile::Builder;

/// Writes one directive per line: `- <path>/*` for directories, `- <path>`
/// otherwise. Returns the path to the temp file; the caller owns cleanup.
pub fn build_exclude_file(excludes: &[String]) -> std::io::Result<PathBuf> {
    let mut file = Builder::new()
        .prefix("tmp-")
        .suffix(".glbexclude")
        .tempfile()?;

    for raw in excludes {
        let expanded = expand_tilde(raw);
        let normalized = normalize(&expanded);
        if normalized.is_dir() {
            writeln!(file, "- {}/*", normalized.display())?;
        } else {
            writeln!(file, "- {}", normalized.display())?;
        }
    }

    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

fn normalize(path: &std::path::Path) -> PathBuf {
    // PathBuf has no public normpath; component-wise cleanup is enough here since
    // exclude entries are not expected to contain `..`.
    path.components().collect()
}

#[cfg(test)]
#[path = "exclude_tests.rs"]
mod tests;
