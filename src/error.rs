//! Error types for makebuildserver
//!
//! All modules use `BuildServerResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for makebuildserver operations
pub type BuildServerResult<T> = Result<T, BuildServerError>;

/// All errors that can occur in makebuildserver
#[derive(Error, Debug)]
pub enum BuildServerError {
    // Environment errors
    #[error("Cannot find a buildserver/ directory here. Run this from the root of your repo checkout.")]
    WrongDirectory,

    #[error("Vagrant not found. Install it from your distribution or https://www.vagrantup.com")]
    VagrantNotFound,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Unsupported provider: {0}. Supported providers: virtualbox, libvirt")]
    UnsupportedProvider(String),

    #[error("No digest set registered for basebox version {0}")]
    UnknownBaseboxVersion(String),

    #[error("basebox.version is pinned but basebox.name '{0}' is not the pinned default box")]
    BaseboxVersionConflict(String),

    // Integrity errors
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Basebox file missing: {0}")]
    BaseboxFileMissing(PathBuf),

    // External tool errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    #[error("vagrant ssh-config output is missing the {0} field")]
    SshConfigField(&'static str),

    #[error("Box '{0}' is not registered after box add")]
    BoxNotRegistered(String),

    #[error("Host cache sync failed: {0}")]
    CacheSync(String),

    // Network errors
    #[error("Download failed for {url}")]
    Download {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl BuildServerError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a download error
    pub fn download(url: impl Into<String>, source: ureq::Error) -> Self {
        Self::Download {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::WrongDirectory => {
                Some("cd into the checkout that contains buildserver/Vagrantfile")
            }
            Self::VagrantNotFound => {
                Some("Install vagrant and the provider plugin for your hypervisor")
            }
            Self::ChecksumMismatch { .. } => {
                Some("The file was deleted; re-run to download a fresh copy")
            }
            Self::BaseboxVersionConflict(_) => {
                Some("Remove basebox.version from the config when using a custom basebox")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = BuildServerError::UnsupportedProvider("vmware".to_string());
        assert!(err.to_string().contains("vmware"));
        assert!(err.to_string().contains("virtualbox"));
    }

    #[test]
    fn checksum_mismatch_has_hint() {
        let err = BuildServerError::ChecksumMismatch {
            path: PathBuf::from("/tmp/gradle.zip"),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(err.hint().is_some());
    }

    #[test]
    fn ssh_config_field_names_field() {
        let err = BuildServerError::SshConfigField("IdentityFile");
        assert!(err.to_string().contains("IdentityFile"));
    }
}
