// SPDX-License-Identifier: MIT

//! External process runner. The rest of the daemon never shells out directly —
//! everything that invokes `rsync`, `mount`, `umount`, or `ssh` goes through here so
//! debug-mode stdio capture and interrupt handling stay in one place.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as TokioCommand;

/// Runs external commands, optionally capturing and logging stdout line-by-line.
#[derive(Clone, Copy, Debug)]
pub struct CommandRunner {
    debug: bool,
}

impl CommandRunner {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// Spawn `argv[0]` with the remaining elements as arguments, wait for it to
    /// exit, and return its exit code. A signal-terminated child reports a negative
    /// code (`-signum`). Failure to spawn at all reports exit code 1, matching the
    /// original's `OSError` handling.
    pub async fn run(&self, argv: &[String]) -> i32 {
        let Some((program, args)) = argv.split_first() else {
            tracing::error!("run() called with an empty argv");
            return 1;
        };

        let mut cmd = TokioCommand::new(program);
        cmd.args(args);

        if self.debug {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(program = %program, error = %e, "failed to spawn command");
                return 1;
            }
        };

        if self.debug {
            // Both streams are piped in debug mode; both must be drained
            // concurrently, or whichever one fills its OS pipe buffer first
            // (~64KB on Linux) blocks the child and `wait()` below never
            // returns. The original (`RunCommandPopen` in
            // `original_source/src/helper.py`) avoids this by merging
            // stderr into stdout (`stderr=subprocess.STDOUT`); tokio has no
            // direct equivalent, so both pipes are drained side by side
            // instead.
            tokio::join!(
                drain_stream("stdout", child.stdout.take()),
                drain_stream("stderr", child.stderr.take()),
            );
        }

        let status = tokio::select! {
            status = child.wait() => status,
            _ = tokio::signal::ctrl_c() => {
                tracing::error!("user interrupt while running command, aborting");
                std::process::exit(1);
            }
        };

        match status {
            Ok(status) => {
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    if let Some(signal) = status.signal() {
                        return -signal;
                    }
                }
                status.code().unwrap_or(1)
            }
            Err(e) => {
                tracing::error!(program = %program, error = %e, "failed to wait on command");
                1
            }
        }
    }
}

/// Drains `stream` line-by-line into `tracing::debug!` until EOF, tagging
/// each line with which stream it came from. A no-op if `stream` is `None`.
async fn drain_stream(label: &'static str, stream: Option<impl AsyncRead + Unpin>) {
    let Some(stream) = stream else {
        return;
    };
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(command_output = %line, stream = label);
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
