//! Checksum-verified artifact cache
//!
//! Downloads, resumes, and validates the pinned build-tool artifacts
//! before any provisioning proceeds. Every file served from the cache has
//! had its SHA-256 verified against the pinned digest; a mismatch purges
//! the file and fails the run.
//!
//! The cache directory is shared across runs but not across concurrent
//! invocations; there is no locking (single-operator assumption).

pub mod artifacts;

pub use artifacts::{CachedArtifact, CACHE_FILES};

use crate::error::{BuildServerError, BuildServerResult};
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use ureq::Agent;

/// Timeout for the metadata-only HEAD probe. A slow or unreachable mirror
/// degrades to trusting the local file rather than blocking the run.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout for content downloads. The transfer itself is not
/// bounded; artifacts are hundreds of megabytes.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const COPY_BUF_SIZE: usize = 64 * 1024;

/// How to reconcile the local file with the remote artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Keep the local file as-is (probe unavailable or nothing to fetch)
    UseLocal,
    /// Byte-range request starting at the local length
    Resume(u64),
    /// Delete whatever is there and download from scratch
    Restart,
}

/// Decide the fetch strategy from local and remote lengths.
///
/// Only called after the digest short-circuit has already failed, so a
/// length-equal local file is stale or corrupt and gets re-fetched.
pub fn plan_fetch(local_len: Option<u64>, remote_len: Option<u64>) -> FetchPlan {
    match (local_len, remote_len) {
        // Probe failed: availability over freshness, trust what we have.
        (Some(_), None) => FetchPlan::UseLocal,
        (Some(local), Some(remote)) if local > remote => FetchPlan::Restart,
        (Some(local), Some(remote)) if local > 0 && local < remote => FetchPlan::Resume(local),
        _ => FetchPlan::Restart,
    }
}

/// Compute the SHA-256 of a file, streaming, as lowercase hex
pub fn file_sha256(path: &Path) -> BuildServerResult<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| BuildServerError::io(format!("opening {} for hashing", path.display()), e))?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; COPY_BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| BuildServerError::io(format!("reading {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Content-addressed cache of the pinned artifacts
pub struct ArtifactCache {
    dir: PathBuf,
    probe_agent: Agent,
    fetch_agent: Agent,
}

impl ArtifactCache {
    /// Open the cache, creating the directory (mode 0700) if absent
    pub fn open(dir: PathBuf) -> BuildServerResult<Self> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&dir).map_err(|e| {
            BuildServerError::io(format!("creating cache directory {}", dir.display()), e)
        })?;

        let probe_agent = Agent::config_builder()
            .timeout_global(Some(PROBE_TIMEOUT))
            .build()
            .new_agent();
        let fetch_agent = Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .build()
            .new_agent();

        Ok(Self {
            dir,
            probe_agent,
            fetch_agent,
        })
    }

    /// The cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ensure every declared artifact is cached and verified
    pub fn update(&self) -> BuildServerResult<()> {
        for artifact in CACHE_FILES {
            self.ensure(artifact.url, artifact.sha256)?;
        }
        Ok(())
    }

    /// Ensure one artifact is present and verified, returning its local path.
    ///
    /// Fails with a checksum mismatch if, after exhausting resume and
    /// re-download, the local digest still does not match; the corrupt file
    /// is deleted first so the next run starts clean.
    pub fn ensure(&self, url: &str, expected_sha256: &str) -> BuildServerResult<PathBuf> {
        let name = url.rsplit('/').next().unwrap_or(url);
        let local = self.dir.join(name);

        // Verified local copy: no network use at all.
        if local.is_file() && file_sha256(&local)? == expected_sha256 {
            debug!("{} already cached and verified", name);
            return Ok(local);
        }

        let remote_len = self.probe_length(url);
        let local_len = fs::metadata(&local).ok().map(|m| m.len());

        match plan_fetch(local_len, remote_len) {
            FetchPlan::UseLocal => {
                debug!("{}: keeping local copy without re-download", name);
            }
            FetchPlan::Resume(offset) => {
                info!("Resuming {} at byte {}", name, offset);
                self.fetch(url, &local, Some(offset), remote_len)?;
            }
            FetchPlan::Restart => {
                if local.exists() {
                    warn!("{}: local copy unusable, downloading from scratch", name);
                    fs::remove_file(&local).map_err(|e| {
                        BuildServerError::io(format!("removing {}", local.display()), e)
                    })?;
                } else {
                    info!("Downloading {}", name);
                }
                self.fetch(url, &local, None, remote_len)?;
            }
        }

        // The integrity gate: never serve an unverified artifact.
        let actual = file_sha256(&local)?;
        if actual != expected_sha256 {
            let _ = fs::remove_file(&local);
            return Err(BuildServerError::ChecksumMismatch {
                path: local,
                expected: expected_sha256.to_string(),
                actual,
            });
        }

        Ok(local)
    }

    /// Metadata-only probe for the remote content length.
    ///
    /// Any failure here is soft: the caller falls back to trusting the
    /// local file rather than blocking on an unreachable mirror.
    fn probe_length(&self, url: &str) -> Option<u64> {
        match self.probe_agent.head(url).call() {
            Ok(resp) => resp
                .headers()
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok()),
            Err(e) => {
                warn!("HEAD probe failed for {}: {}; trusting local file", url, e);
                None
            }
        }
    }

    /// Download `url` into `local`, appending from `resume_from` if set
    fn fetch(
        &self,
        url: &str,
        local: &Path,
        resume_from: Option<u64>,
        remote_len: Option<u64>,
    ) -> BuildServerResult<()> {
        let mut request = self.fetch_agent.get(url);
        if let Some(offset) = resume_from {
            request = request.header("Range", format!("bytes={}-", offset));
        }

        let response = request
            .call()
            .map_err(|e| BuildServerError::download(url, e))?;

        // A server that ignores the Range header answers 200 with the full
        // body; appending that to the partial file would corrupt it.
        let resumed = resume_from.is_some() && response.status().as_u16() == 206;
        if resume_from.is_some() && !resumed {
            warn!("{} ignored the range request; restarting from scratch", url);
        }
        let mut reader = response.into_body().into_reader();

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(resumed)
            .write(true)
            .truncate(!resumed)
            .open(local)
            .map_err(|e| BuildServerError::io(format!("opening {}", local.display()), e))?;

        let pb = download_progress_bar(local, remote_len, resume_from.filter(|_| resumed));
        let mut buf = [0u8; COPY_BUF_SIZE];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| BuildServerError::io(format!("downloading {}", url), e))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .map_err(|e| BuildServerError::io(format!("writing {}", local.display()), e))?;
            pb.inc(n as u64);
        }
        pb.finish_and_clear();

        Ok(())
    }
}

fn download_progress_bar(
    local: &Path,
    remote_len: Option<u64>,
    resume_from: Option<u64>,
) -> ProgressBar {
    let pb = match remote_len {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:30.cyan}] {bytes}/{total_bytes}")
                    .unwrap()
                    .progress_chars("=> "),
            );
            pb.set_position(resume_from.unwrap_or(0));
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg} {bytes}")
                    .unwrap(),
            );
            pb
        }
    };
    pb.set_message(
        local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    pb
}
