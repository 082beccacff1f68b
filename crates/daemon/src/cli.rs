// SPDX-License-Identifier: MIT

//! Command-line surface (C12). Flags mirror the original's `getopt` string
//! `DFRhsnc:` (`original_source/src/logger.py`'s `LogArgManager.GetArgs`)
//! one-to-one; `clap::Parser` replaces manual `getopt` parsing and `-h`
//! usage printing.

use clap::Parser;
use std::path::PathBuf;

/// openduckbill: a continuous, user-level backup daemon.
#[derive(Debug, Parser)]
#[command(name = "openduckbilld", version, about)]
pub struct Cli {
    /// Enable debug mode: verbose logs, captured child stdio
    #[arg(short = 'D')]
    pub debug: bool,

    /// Run in the foreground instead of daemonizing
    #[arg(short = 'F')]
    pub foreground: bool,

    /// Periodically log self resource usage at debug level
    #[arg(short = 'R')]
    pub show_resources: bool,

    /// Dry run: pass --dry-run through to the synchronizer, write nothing
    #[arg(short = 'n')]
    pub dry_run: bool,

    /// Write a per-pass reaper deletion-classification report to a temp file
    #[arg(short = 's')]
    pub show_deleted_files: bool,

    /// Path to the config file (else ./config.yaml, else ~/.openduckbill/config.yaml)
    #[arg(short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
