// SPDX-License-Identifier: MIT

//! `openduckbilld`: entry point. Parses the CLI, loads config, wires up the
//! supervisor, and maps its outcome to a process exit code.
//!
//! Daemonization (fork/detach below the control-loop level) is an external
//! collaborator per spec; `-F` is accepted and threaded through to logging
//! only (foreground mode still determines whether a console handler is
//! attached, mirroring the original's `self.nofork` check in
//! `LogArgManager.GetArgs`), but no fork/session-detach happens here.
//!
//! `anyhow` unifies the two library error types (`ConfigError`,
//! `SupervisorError`) at this one boundary so `main` has a single place to
//! print a cause chain and pick an exit code, instead of matching on both.

use anyhow::Context;
use clap::Parser;
use openduckbill_core::{GlobalConfig, SystemClock};
use openduckbill_daemon::notify_adapter::DesktopNotifyAdapter;
use openduckbill_daemon::supervisor::{Supervisor, SupervisorOptions, SupervisorOutcome};
use openduckbill_daemon::Cli;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let _log_guard = match setup_logging(cli.debug, cli.foreground) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("openduckbilld: failed to initialize logging: {e:#}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start async runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(SupervisorOutcome::ShutdownClean) => {
            tracing::info!("shut down cleanly");
            std::process::ExitCode::SUCCESS
        }
        Ok(SupervisorOutcome::SelfTerminated) => {
            tracing::error!("self-terminated after persistent destination failure");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("fatal startup error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<SupervisorOutcome> {
    let (config, entries, config_path) =
        GlobalConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::info!(path = %config_path.display(), entries = entries.len(), "loaded config");

    let options = SupervisorOptions {
        debug: cli.debug,
        dry_run: cli.dry_run,
        show_resources: cli.show_resources,
        show_deleted_files: cli.show_deleted_files,
    };

    let supervisor = Supervisor::new(config, entries, SystemClock, DesktopNotifyAdapter::new(), options);
    supervisor.run().await.context("supervisor exited with an error")
}

/// Logs to `~/.openduckbill/messages.log` (created if missing), plus stderr
/// when running in the foreground — mirrors the original's `LoggerInit`
/// adding a console handler only in no-fork mode. The file sink and the
/// console sink get independent filters (`-D` raises both to debug; absent
/// `-D` the file floor stays at info while the console stays warn-only), each
/// still overridable by `RUST_LOG` when set.
fn setup_logging(
    debug: bool,
    foreground: bool,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "messages.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    let registry = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(file_filter),
    );

    if foreground {
        let console_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }));
        registry.with(fmt::layer().with_filter(console_filter)).init();
    } else {
        registry.init();
    }

    Ok(guard)
}

fn log_directory() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".openduckbill")
}
