//! Base image digest verification
//!
//! The pinned default basebox ships with a per-provider digest set covering
//! every file of the provider's disk image. The box is trusted only when
//! every registered file verifies; a single mismatch rejects the whole
//! image. A custom basebox opts out of verification entirely.

use crate::cache::file_sha256;
use crate::error::{BuildServerError, BuildServerResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// (filename, sha256) pairs for one provider's on-disk box files
pub type FileDigests = &'static [(&'static str, &'static str)];

/// Digest sets for the pinned default basebox, keyed by (version, provider).
///
/// Every file that composes the provider's disk image must be listed;
/// verification is all-or-nothing.
const BASEBOX_DIGESTS: &[(&str, &str, FileDigests)] = &[
    (
        "0.9.1",
        "virtualbox",
        &[
            (
                "box-disk001.vmdk",
                "c3c4f94dcd233b03b57e92e1a26ab57345dd391362cfdbf2b0d8a87d4a714aad",
            ),
            (
                "box.ovf",
                "9249ee22cdb9713ceb87482e00ccb91564db6d9ed0da4a83b61ba1e7eedd9b2a",
            ),
        ],
    ),
    (
        "0.9.1",
        "libvirt",
        &[(
            "box.img",
            "13e0443f6acad0e909aab43a2e18673a274292b2578b53ca07d1e0ec1fcfcfc4",
        )],
    ),
];

/// Look up the digest set for a (version, provider) pair.
///
/// An unknown version is a configuration error; a known version with no
/// entry for the requested provider means that provider is not supported
/// for this box version.
pub fn digest_set(version: &str, provider: &str) -> BuildServerResult<FileDigests> {
    let version_known = BASEBOX_DIGESTS.iter().any(|(v, _, _)| *v == version);
    if !version_known {
        return Err(BuildServerError::UnknownBaseboxVersion(version.to_string()));
    }

    BASEBOX_DIGESTS
        .iter()
        .find(|(v, p, _)| *v == version && *p == provider)
        .map(|(_, _, files)| *files)
        .ok_or_else(|| BuildServerError::UnsupportedProvider(provider.to_string()))
}

/// Vagrant's directory name for a box: '/' becomes '-VAGRANTSLASH-'
pub fn box_slug(name: &str) -> String {
    name.replace('/', "-VAGRANTSLASH-")
}

/// Verifies the default basebox against its pinned digest set
pub struct BaseboxVerifier {
    boxes_dir: PathBuf,
}

impl BaseboxVerifier {
    /// Point at the local Vagrant box store (honors `VAGRANT_HOME`)
    pub fn new() -> Self {
        let vagrant_home = std::env::var_os("VAGRANT_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".vagrant.d")
            });
        Self {
            boxes_dir: vagrant_home.join("boxes"),
        }
    }

    /// Point at a specific box store directory
    pub fn with_boxes_dir(boxes_dir: PathBuf) -> Self {
        Self { boxes_dir }
    }

    /// Verify the named box against the pinned digest set
    pub fn verify(&self, name: &str, version: &str, provider: &str) -> BuildServerResult<()> {
        let files = digest_set(version, provider)?;
        self.verify_files(name, version, provider, files)
    }

    /// Verify every (filename, digest) pair at its on-disk path.
    ///
    /// All files must verify; no partial trust.
    pub fn verify_files(
        &self,
        name: &str,
        version: &str,
        provider: &str,
        files: &[(&str, &str)],
    ) -> BuildServerResult<()> {
        let box_dir = self
            .boxes_dir
            .join(box_slug(name))
            .join(version)
            .join(provider);

        for (file_name, expected) in files {
            let path = box_dir.join(file_name);
            if !path.is_file() {
                return Err(BuildServerError::BaseboxFileMissing(path));
            }

            debug!("Verifying {}", path.display());
            let actual = file_sha256(&path)?;
            if actual != *expected {
                return Err(BuildServerError::ChecksumMismatch {
                    path,
                    expected: (*expected).to_string(),
                    actual,
                });
            }
        }

        info!("Basebox {} {} ({}) verified", name, version, provider);
        Ok(())
    }

    /// The box store this verifier reads from
    pub fn boxes_dir(&self) -> &Path {
        &self.boxes_dir
    }
}

impl Default for BaseboxVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_BASEBOX_VERSION, SUPPORTED_PROVIDERS};
    use std::fs;

    // sha256 of b"disk contents"
    const DISK_SHA256: &str = "f4703ec51647d6e4d54870dd81cd70037230123201db3899c330872b77ffc0cb";

    fn write_box_file(boxes_dir: &Path, name: &str, file: &str, contents: &[u8]) -> PathBuf {
        let dir = boxes_dir.join(box_slug(name)).join("1.0").join("libvirt");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn pinned_version_has_all_supported_providers() {
        for provider in SUPPORTED_PROVIDERS {
            assert!(digest_set(DEFAULT_BASEBOX_VERSION, provider).is_ok());
        }
    }

    #[test]
    fn unknown_version_is_fatal() {
        let err = digest_set("99.0", "virtualbox").unwrap_err();
        assert!(matches!(err, BuildServerError::UnknownBaseboxVersion(_)));
    }

    #[test]
    fn unknown_provider_for_known_version_is_fatal() {
        let err = digest_set(DEFAULT_BASEBOX_VERSION, "hyperv").unwrap_err();
        assert!(matches!(err, BuildServerError::UnsupportedProvider(_)));
    }

    #[test]
    fn slug_replaces_namespace_slash() {
        assert_eq!(box_slug("me/box"), "me-VAGRANTSLASH-box");
        assert_eq!(box_slug("plainbox"), "plainbox");
    }

    #[test]
    fn all_correct_files_verify() {
        let tmp = tempfile::tempdir().unwrap();
        write_box_file(tmp.path(), "me/box", "box.img", b"disk contents");

        let verifier = BaseboxVerifier::with_boxes_dir(tmp.path().to_path_buf());
        verifier
            .verify_files("me/box", "1.0", "libvirt", &[("box.img", DISK_SHA256)])
            .unwrap();
    }

    #[test]
    fn one_wrong_digest_rejects_the_whole_image() {
        let tmp = tempfile::tempdir().unwrap();
        write_box_file(tmp.path(), "me/box", "box.img", b"disk contents");
        write_box_file(tmp.path(), "me/box", "metadata.json", b"{}");

        let verifier = BaseboxVerifier::with_boxes_dir(tmp.path().to_path_buf());
        let err = verifier
            .verify_files(
                "me/box",
                "1.0",
                "libvirt",
                &[
                    ("box.img", DISK_SHA256),
                    (
                        "metadata.json",
                        "0000000000000000000000000000000000000000000000000000000000000000",
                    ),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, BuildServerError::ChecksumMismatch { .. }));
    }

    #[test]
    fn missing_file_rejects_the_image() {
        let tmp = tempfile::tempdir().unwrap();
        let verifier = BaseboxVerifier::with_boxes_dir(tmp.path().to_path_buf());
        let err = verifier
            .verify_files("me/box", "1.0", "libvirt", &[("box.img", DISK_SHA256)])
            .unwrap_err();
        assert!(matches!(err, BuildServerError::BaseboxFileMissing(_)));
    }
}
