//! Host-cache synchronizer
//!
//! Mirrors well-known package-manager caches from the host into the guest
//! over rsync/ssh to speed up provisioning. This is best-effort
//! acceleration; the configured `on_sync_failure` policy decides whether
//! a failure aborts the run or only logs a warning.

use crate::error::{BuildServerError, BuildServerResult};
use crate::orchestration::{ConnectionProfile, VmDriver};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Host-side cache directories worth mirroring, relative to `$HOME`.
/// Only the ones that actually exist are synced.
pub const HOST_CACHE_DIRS: &[&str] = &[".m2", ".gradle/caches/modules-2", ".pip_download_cache"];

/// Guest-side paths that hold stale lock or resolution state after a sync.
/// Gradle treats a copied lock file as held and a copied plugin-resolution
/// cache as authoritative, causing false cache hits on the next provision.
const STALE_GUEST_STATE: &[&str] = &[
    "rm -f ~/.gradle/caches/modules-2/modules-2.lock",
    "rm -rf ~/.gradle/caches/*/plugin-resolution/",
];

/// Mirror each existing host cache directory into the guest
pub async fn sync_host_caches(driver: &dyn VmDriver, home: &Path) -> BuildServerResult<()> {
    let ssh_config = driver.ssh_config().await?;
    let profile = ConnectionProfile::parse(&ssh_config)?;

    for dir in HOST_CACHE_DIRS {
        let host_dir = home.join(dir);
        if !host_dir.is_dir() {
            debug!("Host cache {} not present, skipping", host_dir.display());
            continue;
        }

        info!("Syncing host cache {} into the guest", dir);
        driver.ssh_run(&format!("mkdir -p ~/{}", dir)).await?;
        rsync_mirror(&host_dir, dir, &profile).await?;
    }

    for command in STALE_GUEST_STATE {
        driver.ssh_run(command).await?;
    }

    Ok(())
}

/// Archive-mode, delete-extraneous mirror of one directory into the guest
async fn rsync_mirror(
    host_dir: &Path,
    guest_rel: &str,
    profile: &ConnectionProfile,
) -> BuildServerResult<()> {
    let ssh_command = format!(
        "ssh -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -p {} -i '{}'",
        profile.port,
        profile.identity_file.display()
    );

    // Trailing slashes: sync directory contents, not the directory itself
    let source = format!("{}/", host_dir.display());
    let dest = format!("{}@{}:{}/", profile.user, profile.host, guest_rel);

    debug!("rsync {} -> {}", source, dest);
    let output = Command::new("rsync")
        .args(["-a", "--delete", "-e", &ssh_command, &source, &dest])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| BuildServerError::command_failed(format!("rsync {}", guest_rel), e))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(BuildServerError::command_exec(
            format!("rsync {}", guest_rel),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::{BoxInfo, VmState};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Driver whose ssh-config lacks the Port field
    struct BrokenSshConfigDriver {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VmDriver for BrokenSshConfigDriver {
        async fn status(&self) -> BuildServerResult<VmState> {
            Ok(VmState::Running)
        }
        async fn box_list(&self) -> BuildServerResult<Vec<BoxInfo>> {
            Ok(vec![])
        }
        async fn box_add(
            &self,
            _name: &str,
            _source: &str,
            _provider: &str,
            _version: Option<&str>,
            _force: bool,
        ) -> BuildServerResult<()> {
            Ok(())
        }
        async fn up(&self, _provision: bool) -> BuildServerResult<()> {
            Ok(())
        }
        async fn halt(&self) -> BuildServerResult<()> {
            Ok(())
        }
        async fn destroy(&self) -> BuildServerResult<()> {
            Ok(())
        }
        async fn package(&self, _output: &Path) -> BuildServerResult<()> {
            Ok(())
        }
        async fn ssh_config(&self) -> BuildServerResult<String> {
            Ok("User vagrant\nHostName 127.0.0.1\nIdentityFile /k\n".to_string())
        }
        async fn ssh_run(&self, command: &str) -> BuildServerResult<()> {
            self.calls.lock().unwrap().push(command.to_string());
            Ok(())
        }
        async fn snapshot_list(&self) -> BuildServerResult<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn malformed_ssh_config_is_a_clear_error() {
        let driver = BrokenSshConfigDriver {
            calls: Mutex::new(vec![]),
        };
        let home = tempfile::tempdir().unwrap();
        let err = sync_host_caches(&driver, home.path()).await.unwrap_err();
        assert!(matches!(err, BuildServerError::SshConfigField("Port")));
        // Nothing ran in the guest before the parser rejected the profile
        assert!(driver.calls.lock().unwrap().is_empty());
    }
}
