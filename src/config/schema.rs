//! Configuration schema for makebuildserver
//!
//! Configuration is a declarative TOML document, `makebuildserver.toml` in
//! the invocation directory. Every option has an explicit default so a
//! missing file is a valid (all-defaults) configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The pinned default basebox name. Digest verification only applies to
/// this box; a custom basebox is accepted unverified.
pub const DEFAULT_BASEBOX: &str = "buildserver/basebox-bullseye64";

/// The pinned version of the default basebox.
pub const DEFAULT_BASEBOX_VERSION: &str = "0.9.1";

/// Providers the digest sets and Vagrantfile support.
pub const SUPPORTED_PROVIDERS: &[&str] = &["virtualbox", "libvirt"];

/// Root configuration structure
///
/// Two configurations are equal iff all option values are equal; the
/// convergence planner relies on this to detect drift.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// VM hardware settings
    pub vm: VmConfig,

    /// Base image identity
    pub basebox: BaseboxConfig,

    /// Artifact cache and host-cache sync settings
    pub cache: CacheConfig,
}

/// VM hardware configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Virtualization provider: "virtualbox" or "libvirt"
    pub provider: String,

    /// CPU cores allocated to the VM
    pub cpus: u32,

    /// Memory in MB allocated to the VM
    pub memory_mb: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            provider: "virtualbox".to_string(),
            cpus: 1,
            memory_mb: 2048,
        }
    }
}

/// Base image identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseboxConfig {
    /// Box name. Anything other than the pinned default is used unverified.
    pub name: String,

    /// Pinned box version. Only valid together with the default box name;
    /// unset means the pinned default version.
    pub version: Option<String>,
}

impl Default for BaseboxConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BASEBOX.to_string(),
            version: None,
        }
    }
}

impl BaseboxConfig {
    /// Whether the configured box is the pinned, digest-verified default
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_BASEBOX
    }

    /// The effective box version
    pub fn effective_version(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_BASEBOX_VERSION)
    }
}

/// What to do when the best-effort host-cache sync fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncFailurePolicy {
    /// Log a warning and continue the run
    #[default]
    Warn,
    /// Fail the whole run
    Abort,
}

/// Artifact cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory for downloaded artifacts; unset means
    /// `~/.cache/makebuildserver`
    pub dir: Option<PathBuf>,

    /// Mirror host-side package-manager caches into the guest
    pub copy_from_host: bool,

    /// Failure policy for the host-cache sync
    pub on_sync_failure: SyncFailurePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            copy_from_host: false,
            on_sync_failure: SyncFailurePolicy::Warn,
        }
    }
}

impl CacheConfig {
    /// The effective cache directory
    pub fn effective_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("makebuildserver")
        })
    }
}
