// SPDX-License-Identifier: MIT

//! Supervisor (C8): owns startup, the main control loop, and shutdown.
//!
//! Grounded on `OpenDuckbillMain` (`original_source/src/daemon.py`):
//! `MainInitialize`/`BackupInitialize` for bootstrap, `CreateServerThread`/
//! `BackupServer` for signal installation and the main loop, and
//! `Cleanup`/`PartitionUnavail`/`ShowGuiMsg`/`RemGuiMsg` for the shutdown and
//! notification state machine. The original re-creates its trigger and
//! deletor `threading.Timer`s every time they fire; this translates that into
//! a `tokio::time::Sleep` that gets `reset()` to the (possibly adjusted)
//! delay at the end of each cycle, instead of a fixed-period `interval()`.
//!
//! The original's self-kill path (`os.kill(os.getpid(), signal.SIGUSR1)`,
//! called from a worker thread so the single `Cleanup` signal handler fires
//! uniformly regardless of source) is reproduced with `nix::sys::signal::raise`:
//! the trigger engine's [`TickOutcome::SelfTerminate`] raises `SIGUSR1` against
//! our own process rather than branching around the shutdown path directly, so
//! external and self-inflicted termination funnel through one code path.

use crate::coalescer::{Coalescer, Snapshot};
use crate::command::CommandRunner;
use crate::destination::Destination;
use crate::error::SupervisorError;
use crate::exclude::build_exclude_file;
use crate::job::{self, JobOptions};
use crate::notify_adapter::NotifyAdapter;
use crate::reaper::{Reaper, ReaperReport};
use crate::trigger::{FlushRunner, TickOutcome, TriggerEngine, MAX_WORKERS};
use crate::watcher::FsWatcher;
use async_trait::async_trait;
use openduckbill_core::{BackupMethod, Clock, Entry, GlobalConfig};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};

const RSYNC_BINARY: &str = "rsync";
const SSH_BINARY: &str = "ssh";
const MOUNT_BINARY: &str = "mount";
const UMOUNT_BINARY: &str = "umount";

/// Flags that affect supervisor behavior, one-to-one with the CLI surface
/// (`-n`, `-D`, `-R`, `-s`); `-F`/`-c` are consumed before the supervisor is
/// built and don't need to be threaded further.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupervisorOptions {
    pub debug: bool,
    pub dry_run: bool,
    pub show_resources: bool,
    pub show_deleted_files: bool,
}

/// Why [`Supervisor::run`] returned, surfaced to the CLI for its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    ShutdownClean,
    SelfTerminated,
}

/// Tracks whether a problem notification is currently showing. The desktop
/// adapter has no persistent popup to query (unlike the original's `zenity`
/// child process, whose pid `ShowGuiMsg`/`RemGuiMsg` track directly), so this
/// state lives in the supervisor instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum GuiState {
    #[default]
    None,
    Active,
    Dismissed,
}

impl GuiState {
    fn on_problem(self) -> Self {
        GuiState::Active
    }

    fn on_resolved(self) -> Self {
        match self {
            GuiState::Active => GuiState::Dismissed,
            other => other,
        }
    }

    fn is_active(self) -> bool {
        matches!(self, GuiState::Active)
    }
}

/// A final backup is only attempted on shutdown when there are pending
/// changes, the destination is currently reachable, fewer than the maximum
/// number of flush workers are already in flight, and the shutdown wasn't
/// triggered by the self-kill path — mirrors `Cleanup`'s guard in
/// `original_source/src/daemon.py`.
fn should_final_flush(
    pending_events: bool,
    destination_available: bool,
    live_workers: usize,
    max_workers: usize,
    is_self_kill: bool,
) -> bool {
    pending_events && destination_available && live_workers < max_workers && !is_self_kill
}

/// Drives the real job builder across every matched entry for one coalesced
/// snapshot; this is the trigger engine's [`FlushRunner`] in production.
struct RealFlushRunner {
    entries: Vec<Entry>,
    destination: Arc<Destination>,
    layout_path: PathBuf,
    exclude_file: PathBuf,
    dry_run: bool,
    maintain_previous: bool,
    is_remote: bool,
    ssh_port: u16,
    runner: CommandRunner,
}

#[async_trait]
impl FlushRunner for RealFlushRunner {
    async fn flush(&self, snapshot: Snapshot) {
        let opts = JobOptions {
            rsync_binary: RSYNC_BINARY,
            exclude_file: &self.exclude_file,
            dry_run: self.dry_run,
            maintain_previous: self.maintain_previous,
            is_remote: self.is_remote,
            ssh_path: SSH_BINARY,
            ssh_port: self.ssh_port,
        };

        for (entry, source_override) in job::narrow_paths(&snapshot.paths, &self.entries) {
            if let Err(e) = job::run_backup(
                entry,
                Some(&source_override),
                &self.destination,
                &self.layout_path,
                &opts,
                &self.runner,
            )
            .await
            {
                tracing::error!(entry = %entry.name, error = %e, "flush failed for entry");
            }
        }
    }
}

/// Owns one backup run end to end: bootstrap, serve, shutdown.
pub struct Supervisor<C: Clock, N: NotifyAdapter> {
    config: GlobalConfig,
    entries: Vec<Entry>,
    clock: C,
    notify: N,
    options: SupervisorOptions,
}

impl<C: Clock, N: NotifyAdapter> Supervisor<C, N> {
    pub fn new(config: GlobalConfig, entries: Vec<Entry>, clock: C, notify: N, options: SupervisorOptions) -> Self {
        Self { config, entries, clock, notify, options }
    }

    /// Bootstrap, then serve until a terminating signal arrives.
    ///
    /// Bootstrap order (`MainInitialize` + `BackupInitialize`): validate the
    /// external binaries this config needs, mount/verify/create the
    /// destination layout, build the exclude file, run one sequential full
    /// backup per entry, then hand off to [`Self::serve`].
    pub async fn run(self) -> Result<SupervisorOutcome, SupervisorError> {
        let runner = CommandRunner::new(self.options.debug);
        self.validate_binaries(&runner).await?;

        let destination = Arc::new(Destination::new(&self.config, runner));
        let layout_path = destination.layout_path(&current_user(), &local_hostname());

        if destination.needs_mount().await {
            destination.mount().await?;
        }
        if !destination.verify_layout(&layout_path).await {
            destination.create_layout(&layout_path).await?;
        }

        let exclude_file = build_exclude_file(&self.config.global_excludes)?;

        tracing::info!("completed sanity checks, starting initial backup");
        self.initial_backup(&destination, &layout_path, &exclude_file, &runner).await;

        let outcome = self.serve(destination, layout_path, exclude_file.clone(), runner).await;

        if let Err(e) = std::fs::remove_file(&exclude_file) {
            tracing::error!(error = %e, "failed to remove temporary exclude file");
        } else {
            tracing::warn!("removed temporary exclude file");
        }

        outcome
    }

    async fn validate_binaries(&self, runner: &CommandRunner) -> Result<(), SupervisorError> {
        require_binary(runner, RSYNC_BINARY, "--version").await?;
        require_binary(runner, MOUNT_BINARY, "--version").await?;
        require_binary(runner, UMOUNT_BINARY, "--version").await?;
        if let BackupMethod::Rsync = self.config.backup_method {
            require_binary(runner, SSH_BINARY, "-V").await?;
        }
        Ok(())
    }

    async fn initial_backup(
        &self,
        destination: &Destination,
        layout_path: &Path,
        exclude_file: &Path,
        runner: &CommandRunner,
    ) {
        let opts = JobOptions {
            rsync_binary: RSYNC_BINARY,
            exclude_file,
            dry_run: self.options.dry_run,
            maintain_previous: self.config.maintain_previous,
            is_remote: matches!(self.config.backup_method, BackupMethod::Rsync),
            ssh_path: SSH_BINARY,
            ssh_port: self.config.ssh_port,
        };
        for entry in &self.entries {
            tracing::info!(entry = %entry.name, "performing initial backup");
            if let Err(e) = job::run_backup(entry, None, destination, layout_path, &opts, runner).await {
                tracing::error!(entry = %entry.name, error = %e, "initial backup failed");
            }
        }
    }

    /// The main loop: watcher feeds the coalescer, the trigger engine decides
    /// when to flush on its own self-adjusting cadence, the reaper runs on
    /// its own doubling cadence, and four signals (interrupt, quit, terminate,
    /// user-defined-1) all route to the same shutdown path, distinguished
    /// only by whether the signal was `SIGUSR1` (the original's `signo ==
    /// SIGUSR1` check in `Cleanup`).
    async fn serve(
        self,
        destination: Arc<Destination>,
        layout_path: PathBuf,
        exclude_file: PathBuf,
        runner: CommandRunner,
    ) -> Result<SupervisorOutcome, SupervisorError> {
        let coalescer = Coalescer::new();
        let _watcher = FsWatcher::start(&self.entries, coalescer.clone()).map_err(SupervisorError::WatcherStart)?;

        let sync_interval = Duration::from_secs(self.config.sync_interval_secs);
        let trigger = TriggerEngine::new(
            coalescer.clone(),
            Arc::clone(&destination),
            sync_interval,
            self.config.commit_threshold,
            self.clock.clone(),
        );

        let flush_runner: Arc<dyn FlushRunner> = Arc::new(RealFlushRunner {
            entries: self.entries.clone(),
            destination: Arc::clone(&destination),
            layout_path: layout_path.clone(),
            exclude_file: exclude_file.clone(),
            dry_run: self.options.dry_run,
            maintain_previous: self.config.maintain_previous,
            is_remote: matches!(self.config.backup_method, BackupMethod::Rsync),
            ssh_port: self.config.ssh_port,
            runner,
        });

        // Disabled for remote-shell destinations or when retain_backups is set,
        // matching the original's "not self.retainbackup" / RSYNC exclusion.
        let reaper_enabled =
            !self.config.retain_backups && !matches!(self.config.backup_method, BackupMethod::Rsync);
        let reaper = Reaper::new(self.clock.clone(), self.config.retention_secs);

        let mut sigint = signal(SignalKind::interrupt()).map_err(SupervisorError::Io)?;
        let mut sigquit = signal(SignalKind::quit()).map_err(SupervisorError::Io)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(SupervisorError::Io)?;
        let mut sigusr1 = signal(SignalKind::user_defined1()).map_err(SupervisorError::Io)?;

        let mut gui_state = GuiState::default();

        let tick_sleep = tokio::time::sleep(trigger.current_interval());
        tokio::pin!(tick_sleep);
        let mut reap_delay = sync_interval;
        let reap_sleep = tokio::time::sleep(reap_delay);
        tokio::pin!(reap_sleep);

        let outcome = loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::error!("got SIGINT");
                    break self.shutdown(&coalescer, &destination, &trigger, &flush_runner, &gui_state, false).await;
                }
                _ = sigquit.recv() => {
                    tracing::error!("got SIGQUIT");
                    break self.shutdown(&coalescer, &destination, &trigger, &flush_runner, &gui_state, false).await;
                }
                _ = sigterm.recv() => {
                    tracing::error!("got SIGTERM");
                    break self.shutdown(&coalescer, &destination, &trigger, &flush_runner, &gui_state, false).await;
                }
                _ = sigusr1.recv() => {
                    tracing::error!("got self-terminate signal");
                    break self.shutdown(&coalescer, &destination, &trigger, &flush_runner, &gui_state, true).await;
                }
                () = &mut tick_sleep => {
                    let tick_outcome = trigger.tick(&flush_runner).await;
                    self.handle_tick_outcome(tick_outcome, &mut gui_state).await;
                    if tick_outcome == TickOutcome::SelfTerminate {
                        let _ = nix::sys::signal::raise(nix::sys::signal::Signal::SIGUSR1);
                    }
                    if self.options.show_resources {
                        tracing::debug!(live_workers = trigger.live_workers(), "resource usage snapshot");
                    }
                    tick_sleep.as_mut().reset(tokio::time::Instant::now() + trigger.current_interval());
                }
                () = &mut reap_sleep, if reaper_enabled && !trigger.destination_unavailable() => {
                    match reaper.run(&layout_path, &self.entries) {
                        Ok(report) => {
                            tracing::info!(deleted = report.deleted_count(), "reaper pass complete");
                            if self.options.show_deleted_files {
                                write_reaper_report(&report);
                            }
                        }
                        Err(e) => tracing::error!(error = %e, "reaper pass failed"),
                    }
                    reap_delay = reaper.next_delay(reap_delay);
                    reap_sleep.as_mut().reset(tokio::time::Instant::now() + reap_delay);
                }
            }
        };

        Ok(outcome)
    }

    async fn handle_tick_outcome(&self, outcome: TickOutcome, gui_state: &mut GuiState) {
        match outcome {
            TickOutcome::DestinationUnavailable | TickOutcome::SelfTerminate => {
                *gui_state = gui_state.on_problem();
                let msg = if outcome == TickOutcome::SelfTerminate {
                    "destination unavailable for too long, quitting"
                } else {
                    "won't be able to perform backup"
                };
                if let Err(e) = self.notify.notify("openduckbill", msg).await {
                    tracing::warn!(error = %e, "failed to show problem notification");
                }
            }
            TickOutcome::Flushed | TickOutcome::Idle | TickOutcome::WorkersSaturated => {
                if gui_state.is_active() {
                    self.notify.dismiss().await;
                }
                *gui_state = gui_state.on_resolved();
            }
        }
    }

    async fn shutdown(
        &self,
        coalescer: &Coalescer,
        destination: &Destination,
        trigger: &TriggerEngine<C>,
        flush_runner: &Arc<dyn FlushRunner>,
        gui_state: &GuiState,
        is_self_kill: bool,
    ) -> SupervisorOutcome {
        if gui_state.is_active() {
            self.notify.dismiss().await;
        }

        let snapshot = coalescer.snapshot();
        if snapshot.counter > 0 {
            let destination_available = !destination.needs_mount().await;
            let live_workers = trigger.live_workers();
            if should_final_flush(true, destination_available, live_workers, MAX_WORKERS, is_self_kill) {
                tracing::warn!("please wait while syncing pending changes to the backup partition");
                let snapshot = coalescer.snapshot_and_reset();
                flush_runner.flush(snapshot).await;
            } else if is_self_kill {
                tracing::warn!("there are pending changes, but not syncing since we're self-terminating");
            } else {
                tracing::warn!("there are pending changes, but not performing a final backup");
            }
        }

        tracing::warn!("stopped file monitoring and timers, quitting");
        if is_self_kill {
            SupervisorOutcome::SelfTerminated
        } else {
            SupervisorOutcome::ShutdownClean
        }
    }
}

async fn require_binary(runner: &CommandRunner, name: &'static str, probe_arg: &str) -> Result<(), SupervisorError> {
    if runner.run(&[name.to_string(), probe_arg.to_string()]).await != 0 {
        return Err(SupervisorError::MissingBinary(name));
    }
    Ok(())
}

/// Writes one line per destination item to a temp file, mirroring the
/// original's opt-in `-s` "show deleted files" report.
fn write_reaper_report(report: &ReaperReport) {
    let built = tempfile::Builder::new().prefix("odb-reaper-").suffix(".report").tempfile().and_then(|mut file| {
        for (path, outcome) in &report.outcomes {
            writeln!(file, "{}: {:?}", path.display(), outcome)?;
        }
        file.keep().map_err(|e| e.error)
    });
    match built {
        Ok((_, path)) => tracing::info!(path = %path.display(), "wrote reaper deletion report"),
        Err(e) => tracing::warn!(error = %e, "failed to write reaper deletion report"),
    }
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

fn local_hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
