//! Convergence planner
//!
//! Compares the persisted configuration from the last successful run
//! against the current one and picks reuse, re-provision, or rebuild.
//! Any configuration drift invalidates provisioning determinism, so a
//! changed input always means destroy and rebuild rather than an
//! incremental patch.

use crate::config::Config;
use crate::error::{BuildServerError, BuildServerResult};
use crate::orchestration::VmState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the persisted run state, inside the serve directory
const STATE_FILE: &str = "last-config.json";

/// Resolved convergence action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Configuration unchanged, instance present: leave it alone
    Reuse,
    /// Configuration unchanged but no instance exists: provision a fresh
    /// one without touching the persisted state history
    Reprovision,
    /// No state, or configuration drift: destroy and start over
    Rebuild,
}

/// The last-applied configuration, serialized after each fresh apply.
///
/// Also carries the effective per-run settings the Vagrantfile consumes:
/// `hwvirt` is the probed acceleration mode, not a configuration input,
/// so it is excluded from the drift comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub config: Config,
    #[serde(default)]
    pub hwvirt: bool,
    pub applied_at: DateTime<Utc>,
}

/// Loads, compares and persists run state for the serve directory
pub struct Planner {
    state_path: PathBuf,
}

impl Planner {
    pub fn new(serve_dir: &Path) -> Self {
        Self {
            state_path: serve_dir.join(STATE_FILE),
        }
    }

    /// Path of the persisted state file
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Load the persisted run state, if any
    pub async fn load(&self) -> BuildServerResult<Option<RunState>> {
        if !self.state_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| {
            BuildServerError::io(format!("reading {}", self.state_path.display()), e)
        })?;

        let state: RunState = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    /// Decide the convergence action.
    ///
    /// Pure function of the previous state, the current configuration and
    /// the instance lifecycle state.
    pub fn decide(prev: Option<&Config>, current: &Config, vm_state: VmState) -> Action {
        match prev {
            None => Action::Rebuild,
            Some(prev) if prev != current => Action::Rebuild,
            Some(_) if vm_state == VmState::NotCreated => Action::Reprovision,
            Some(_) => Action::Reuse,
        }
    }

    /// Persist the configuration and effective acceleration mode as the
    /// new run state.
    ///
    /// Only called for fresh applies; a `Reuse` decision never rewrites
    /// the state file.
    pub async fn persist(&self, config: &Config, hwvirt: bool) -> BuildServerResult<()> {
        let state = RunState {
            config: config.clone(),
            hwvirt,
            applied_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&state)?;
        fs::write(&self.state_path, content).await.map_err(|e| {
            BuildServerError::io(format!("writing {}", self.state_path.display()), e)
        })?;

        debug!("Persisted run state to {}", self.state_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_persisted_state_rebuilds() {
        let current = Config::default();
        assert_eq!(
            Planner::decide(None, &current, VmState::NotCreated),
            Action::Rebuild
        );
    }

    #[test]
    fn identical_state_reuses() {
        let prev = Config::default();
        let current = Config::default();
        assert_eq!(
            Planner::decide(Some(&prev), &current, VmState::Running),
            Action::Reuse
        );
        assert_eq!(
            Planner::decide(Some(&prev), &current, VmState::Halted),
            Action::Reuse
        );
    }

    #[test]
    fn one_changed_field_rebuilds() {
        let prev = Config::default();
        let mut current = Config::default();
        current.vm.memory_mb = 4096;
        assert_eq!(
            Planner::decide(Some(&prev), &current, VmState::Running),
            Action::Rebuild
        );
    }

    #[test]
    fn identical_state_without_instance_reprovisions() {
        let prev = Config::default();
        let current = Config::default();
        assert_eq!(
            Planner::decide(Some(&prev), &current, VmState::NotCreated),
            Action::Reprovision
        );
    }

    #[tokio::test]
    async fn state_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let planner = Planner::new(tmp.path());

        assert!(planner.load().await.unwrap().is_none());

        let mut config = Config::default();
        config.vm.cpus = 8;
        planner.persist(&config, true).await.unwrap();

        let state = planner.load().await.unwrap().unwrap();
        assert_eq!(state.config, config);
        assert!(state.hwvirt);
    }

    #[tokio::test]
    async fn snapshot_records_the_acceleration_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let planner = Planner::new(tmp.path());

        planner.persist(&Config::default(), false).await.unwrap();

        // The Vagrantfile reads the snapshot, so the probed mode must be
        // part of the durable document, not just a log line.
        let raw = fs::read_to_string(planner.state_path()).await.unwrap();
        assert!(raw.contains("\"hwvirt\""), "{}", raw);
        let state = planner.load().await.unwrap().unwrap();
        assert!(!state.hwvirt);
    }

    #[tokio::test]
    async fn acceleration_mode_does_not_count_as_drift() {
        let tmp = tempfile::tempdir().unwrap();
        let planner = Planner::new(tmp.path());
        planner.persist(&Config::default(), true).await.unwrap();

        // Same config on a host without hardware virtualization: reuse.
        let state = planner.load().await.unwrap().unwrap();
        let current = Config::default();
        assert_eq!(
            Planner::decide(Some(&state.config), &current, VmState::Halted),
            Action::Reuse
        );
    }

    #[tokio::test]
    async fn corrupt_state_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let planner = Planner::new(tmp.path());
        fs::write(planner.state_path(), b"not json").await.unwrap();
        assert!(planner.load().await.is_err());
    }
}
