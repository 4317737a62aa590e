//! VM driver abstraction
//!
//! Provides a trait for the external virtualization tool so the pipeline
//! can be exercised against a mock in tests. The production implementation
//! shells out to Vagrant.

use crate::error::BuildServerResult;
use async_trait::async_trait;
use std::path::Path;

/// Lifecycle state of the managed VM instance.
///
/// The instance is owned by the external tool; this is a snapshot of its
/// reported state, not something this process controls directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    NotCreated,
    Halted,
    Running,
}

impl VmState {
    /// Map the tool's state string onto the three states the pipeline
    /// distinguishes. Saved/suspended instances count as halted.
    pub fn parse(state: &str) -> Self {
        match state {
            "running" => Self::Running,
            "not_created" | "not created" => Self::NotCreated,
            _ => Self::Halted,
        }
    }
}

/// One entry in the tool's box registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxInfo {
    pub name: String,
    pub provider: String,
    pub version: String,
}

/// Abstract interface to the virtualization tool
#[async_trait]
pub trait VmDriver: Send + Sync {
    /// Current lifecycle state of the instance
    async fn status(&self) -> BuildServerResult<VmState>;

    /// Registered boxes
    async fn box_list(&self) -> BuildServerResult<Vec<BoxInfo>>;

    /// Register a box from a registry name or a local file
    async fn box_add(
        &self,
        name: &str,
        source: &str,
        provider: &str,
        version: Option<&str>,
        force: bool,
    ) -> BuildServerResult<()>;

    /// Bring the instance up, optionally running provisioners
    async fn up(&self, provision: bool) -> BuildServerResult<()>;

    /// Graceful shutdown
    async fn halt(&self) -> BuildServerResult<()>;

    /// Destroy the instance and all its state
    async fn destroy(&self) -> BuildServerResult<()>;

    /// Package the halted instance into a box file
    async fn package(&self, output: &Path) -> BuildServerResult<()>;

    /// The tool's generated SSH connection info text
    async fn ssh_config(&self) -> BuildServerResult<String>;

    /// Run a command inside the guest
    async fn ssh_run(&self, command: &str) -> BuildServerResult<()>;

    /// Snapshot listing, for diagnostics
    async fn snapshot_list(&self) -> BuildServerResult<String>;
}
