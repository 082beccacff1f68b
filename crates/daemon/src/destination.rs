// SPDX-License-Identifier: MIT

//! Destination liveness: mount state, mount/unmount, directory-layout verify/create,
//! parameterized over the three backup methods.

use crate::command::CommandRunner;
use crate::error::DestinationError;
use openduckbill_core::{BackupMethod, GlobalConfig};
use std::path::{Path, PathBuf};

/// Everything the destination driver needs from the validated config, gathered in
/// one place so callers don't thread six optional strings through every method.
pub struct Destination {
    method: BackupMethod,
    local_mount: Option<String>,
    server: Option<String>,
    remote_mount: Option<String>,
    ssh_user: Option<String>,
    ssh_port: u16,
    runner: CommandRunner,
}

impl Destination {
    pub fn new(config: &GlobalConfig, runner: CommandRunner) -> Self {
        Self {
            method: config.backup_method,
            local_mount: config.local_mount.clone(),
            server: config.server.clone(),
            remote_mount: config.remote_mount.clone(),
            ssh_user: config.ssh_user.clone(),
            ssh_port: config.ssh_port,
            runner,
        }
    }

    /// Directory layout `<root>/<user>/__backups__/<host>/` under the destination's
    /// effective root (local mountpoint for local/nfs, remote dir for rsync).
    pub fn layout_path(&self, user: &str, host: &str) -> PathBuf {
        let root = self.effective_root();
        Path::new(&root).join(user).join("__backups__").join(host)
    }

    /// The value callers pass as the rsync destination argument.
    pub fn destination_arg(&self, layout_path: &Path) -> String {
        match self.method {
            BackupMethod::Rsync => {
                let user = self.ssh_user.as_deref().unwrap_or("");
                let server = self.server.as_deref().unwrap_or("");
                format!("{user}@{server}:{}", layout_path.display())
            }
            BackupMethod::Local | BackupMethod::Nfs => layout_path.display().to_string(),
        }
    }

    fn effective_root(&self) -> String {
        match self.method {
            BackupMethod::Rsync => self.remote_mount.clone().unwrap_or_default(),
            BackupMethod::Local | BackupMethod::Nfs => self.local_mount.clone().unwrap_or_default(),
        }
    }

    /// True if the destination partition requires (re)mounting. Local and
    /// remote-shell modes never require a remount; nfs compares the filesystem
    /// backing the local mountpoint against the expected `server:remote_dir`.
    pub async fn needs_mount(&self) -> bool {
        if !matches!(self.method, BackupMethod::Nfs) {
            return false;
        }
        let Some(local_mount) = self.local_mount.as_deref() else {
            return true;
        };
        let expected = format!(
            "{}:{}",
            self.server.as_deref().unwrap_or(""),
            self.remote_mount.as_deref().unwrap_or("")
        );

        let output = tokio::process::Command::new("df")
            .args(["-h", local_mount])
            .output()
            .await;
        let Ok(output) = output else {
            return true;
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        let filesystem = stdout.lines().nth(1).and_then(|line| line.split_whitespace().next());
        match filesystem {
            Some(fs) if fs == expected => false,
            _ => {
                tracing::warn!(local_mount, expected = %expected, "destination not mounted as expected");
                true
            }
        }
    }

    /// Best-effort lazy unmount. Only meaningful for nfs.
    pub async fn unmount(&self) -> i32 {
        if !matches!(self.method, BackupMethod::Nfs) {
            return 0;
        }
        let Some(local_mount) = self.local_mount.clone() else {
            return 0;
        };
        self.runner
            .run(&["umount".into(), "-l".into(), local_mount])
            .await
    }

    /// Mount the partition, always preceded by a best-effort unmount. Relies on a
    /// pre-existing fstab entry rather than passing NFS options explicitly, since
    /// a direct `mount server:remote local` requires root.
    pub async fn mount(&self) -> Result<(), DestinationError> {
        if !matches!(self.method, BackupMethod::Nfs) {
            return Ok(());
        }
        self.unmount().await;

        let Some(local_mount) = self.local_mount.clone() else {
            return Err(DestinationError::LayoutMissing(PathBuf::new()));
        };

        tracing::warn!("mounting NFS backup partition");
        let status = self.runner.run(&["mount".into(), local_mount.clone()]).await;
        if status != 0 {
            tracing::error!("unable to mount partition; check /etc/fstab for a matching entry");
            return Err(DestinationError::Spawn(
                "mount",
                std::io::Error::other("mount command failed"),
            ));
        }

        if self.needs_mount().await {
            tracing::warn!("mount command succeeded but partition still reports unmounted");
            return Err(DestinationError::MountVerifyFailed(PathBuf::from(local_mount)));
        }

        tracing::info!("successfully mounted backup partition");
        Ok(())
    }

    /// Check the destination directory exists (local/nfs) or exists remotely
    /// (rsync, via `ssh ... test -d`).
    pub async fn verify_layout(&self, layout_path: &Path) -> bool {
        match self.method {
            BackupMethod::Rsync => {
                let argv = self.ssh_argv(&["test".into(), "-d".into(), layout_path.display().to_string()]);
                self.runner.run(&argv).await == 0
            }
            BackupMethod::Local | BackupMethod::Nfs => {
                layout_path.is_dir() && is_writable(layout_path)
            }
        }
    }

    /// Create the destination directory structure with owner-only permissions.
    pub async fn create_layout(&self, layout_path: &Path) -> Result<(), DestinationError> {
        match self.method {
            BackupMethod::Rsync => {
                let mkdir = self.ssh_argv(&[
                    "mkdir".into(),
                    "-p".into(),
                    "--mode=0700".into(),
                    layout_path.display().to_string(),
                ]);
                if self.runner.run(&mkdir).await != 0 {
                    return Err(DestinationError::CreateLayoutFailed(
                        layout_path.to_path_buf(),
                        std::io::Error::other("remote mkdir failed"),
                    ));
                }
                tracing::info!("created backup directory structure on rsync server");

                // Tighten permissions on the user-scoped parent two levels up
                // (<root>/<user>), matching the original's extra chmod pass.
                if let Some(user_path) = layout_path.parent().and_then(Path::parent) {
                    let chmod = self.ssh_argv(&[
                        "chmod".into(),
                        "0700".into(),
                        user_path.display().to_string(),
                    ]);
                    let _ = self.runner.run(&chmod).await;
                }
                Ok(())
            }
            BackupMethod::Local | BackupMethod::Nfs => {
                std::fs::create_dir_all(layout_path)
                    .map_err(|e| DestinationError::CreateLayoutFailed(layout_path.to_path_buf(), e))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(layout_path, perms);
                }
                tracing::info!(path = %layout_path.display(), "created backup directory structure");
                Ok(())
            }
        }
    }

    fn ssh_argv(&self, remote_cmd: &[String]) -> Vec<String> {
        let user = self.ssh_user.as_deref().unwrap_or("");
        let server = self.server.as_deref().unwrap_or("");
        let mut argv = vec![
            "ssh".to_string(),
            "-p".to_string(),
            self.ssh_port.to_string(),
            format!("{user}@{server}"),
        ];
        argv.extend(remote_cmd.iter().cloned());
        argv
    }
}

/// Effective-user write check (the real equivalent of the original's
/// `os.access(path, os.W_OK)`), not just the mode's write bits — a
/// world-writable-bit directory owned by another user, or one root can
/// always write to regardless of mode, would be misreported by a
/// permissions-only check.
fn is_writable(path: &Path) -> bool {
    nix::unistd::access(path, nix::unistd::AccessFlags::W_OK).is_ok()
}

#[cfg(test)]
#[path = "destination_tests.rs"]
mod tests;
