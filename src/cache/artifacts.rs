//! Declared build-tool artifacts
//!
//! Every artifact the provisioner feeds into the guest is pinned here by
//! URL and SHA-256. Bumping a tool version means changing both fields.

/// A pinned external artifact
#[derive(Debug, Clone, Copy)]
pub struct CachedArtifact {
    /// Source URL; the file name component is the cache file name
    pub url: &'static str,
    /// Expected SHA-256 of the complete file, lowercase hex
    pub sha256: &'static str,
}

impl CachedArtifact {
    /// The file name under the cache directory
    pub fn file_name(&self) -> &'static str {
        self.url.rsplit('/').next().unwrap_or(self.url)
    }
}

/// Artifacts required by the provisioning scripts
pub const CACHE_FILES: &[CachedArtifact] = &[
    CachedArtifact {
        url: "https://services.gradle.org/distributions/gradle-8.7-bin.zip",
        sha256: "544c35d6bd849ae8a5ed0bcea39ba677dc40f49df7d1835561582da2009b961d",
    },
    CachedArtifact {
        url: "https://dl.google.com/android/repository/commandlinetools-linux-11076708_latest.zip",
        sha256: "2d2d50857e4eb553af5a6dc3ad507a17adf43d115264b1afc116f95c92e5e258",
    },
    CachedArtifact {
        url: "https://dl.google.com/android/repository/android-ndk-r26d-linux.zip",
        sha256: "eefeafe7ccf177de7cc01ffefa38a67cf604577aa508dda87c10ec1f0095414b",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_artifacts_declared() {
        assert_eq!(CACHE_FILES.len(), 3);
    }

    #[test]
    fn digests_are_sha256_hex() {
        for artifact in CACHE_FILES {
            assert_eq!(artifact.sha256.len(), 64, "{}", artifact.url);
            assert!(artifact.sha256.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn file_name_is_url_basename() {
        assert_eq!(CACHE_FILES[0].file_name(), "gradle-8.7-bin.zip");
    }
}
