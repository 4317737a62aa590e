//! The provisioning pipeline
//!
//! Sequences the whole run: artifact cache refresh, hardware probe, clean
//! handling, convergence decision, basebox verification, provisioning,
//! host-cache sync, packaging and box registration. Every external
//! command's failure is fatal for the run; an interrupted run leaves the
//! instance wherever the tool left it, to be resolved by the planner on
//! the next invocation.

use crate::basebox::BaseboxVerifier;
use crate::cache::ArtifactCache;
use crate::config::{Config, SyncFailurePolicy};
use crate::error::{BuildServerError, BuildServerResult};
use crate::orchestration::{detect_hwvirt, LogTailer, VagrantCli, VmDriver, VmState};
use crate::plan::{Action, Planner};
use crate::sync;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// The Vagrant working directory, relative to the invocation directory
pub const SERVE_DIR: &str = "buildserver";

/// Logical name the packaged box is registered under
pub const BOX_NAME: &str = "buildserver";

/// Per-invocation options from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub clean: bool,
    pub skip_cache_update: bool,
    pub keep_box_file: bool,
    pub verbose: u8,
}

/// Run the full pipeline with the production Vagrant driver
pub async fn run(opts: &RunOptions, config: &Config) -> BuildServerResult<()> {
    let serve_dir = PathBuf::from(SERVE_DIR);
    if !serve_dir.is_dir() {
        return Err(BuildServerError::WrongDirectory);
    }

    let driver = VagrantCli::new(serve_dir.clone());
    driver.ensure_available().await?;

    run_with_driver(opts, config, &driver, &serve_dir).await
}

/// Run the pipeline against an injected driver (tests use a mock)
pub async fn run_with_driver(
    opts: &RunOptions,
    config: &Config,
    driver: &dyn VmDriver,
    serve_dir: &Path,
) -> BuildServerResult<()> {
    // Artifact cache gates readiness: nothing is provisioned until every
    // declared artifact is verified.
    if opts.skip_cache_update {
        info!("Skipping artifact cache update");
    } else {
        let cache_dir = config.cache.effective_dir();
        tokio::task::spawn_blocking(move || ArtifactCache::open(cache_dir)?.update())
            .await
            .map_err(|e| {
                BuildServerError::io(
                    "artifact cache task",
                    std::io::Error::new(std::io::ErrorKind::Other, e),
                )
            })??;
    }

    // The probed acceleration mode is part of the effective settings the
    // Vagrantfile consumes, so it travels with the persisted snapshot.
    let hwvirt = detect_hwvirt();
    if !hwvirt {
        info!("No hardware virtualization support; using software virtualization");
    }

    let mut vm_state = driver.status().await?;

    // An explicit clean always destroys, regardless of the planner. The
    // tool refuses destructive operations on a live instance, so halt
    // first.
    if opts.clean {
        if vm_state == VmState::Running {
            driver.halt().await?;
        }
        if vm_state != VmState::NotCreated {
            driver.destroy().await?;
            info!("Destroyed the existing VM");
        }
        vm_state = VmState::NotCreated;
    }

    let planner = Planner::new(serve_dir);
    let previous = planner.load().await?;
    let action = Planner::decide(previous.as_ref().map(|s| &s.config), config, vm_state);

    match action {
        Action::Reuse => {
            info!("Configuration unchanged; reusing the existing VM");
        }
        Action::Reprovision => {
            info!("Configuration unchanged but no instance exists; provisioning fresh");
            planner.persist(config, hwvirt).await?;
        }
        Action::Rebuild => {
            info!("Configuration changed or first run; rebuilding from scratch");
            if vm_state == VmState::Running {
                driver.halt().await?;
            }
            if vm_state != VmState::NotCreated {
                driver.destroy().await?;
            }
            planner.persist(config, hwvirt).await?;
        }
    }

    // Never provision onto an unverified base. A custom basebox is the
    // operator's explicit opt-out of digest trust.
    if config.basebox.is_default() {
        let version = config.basebox.effective_version();
        ensure_basebox_registered(driver, config, version).await?;
        BaseboxVerifier::new().verify(&config.basebox.name, version, &config.vm.provider)?;
    } else {
        warn!("Using unverified basebox {}", config.basebox.name);
    }

    {
        // Scoped tail monitor: echoes vagrant.log while provisioning runs,
        // torn down when this block exits on any path.
        let _tailer =
            (opts.verbose >= 1).then(|| LogTailer::spawn(serve_dir.join("vagrant.log")));

        if let Err(e) = driver.up(true).await {
            dump_diagnostics(driver).await;
            return Err(e);
        }
    }

    if config.cache.copy_from_host {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        if let Err(e) = sync::sync_host_caches(driver, &home).await {
            match config.cache.on_sync_failure {
                SyncFailurePolicy::Warn => warn!("Host cache sync failed: {}", e),
                SyncFailurePolicy::Abort => {
                    return Err(BuildServerError::CacheSync(e.to_string()))
                }
            }
        }
    }

    driver.halt().await?;

    let box_file = serve_dir.with_extension("box");
    if box_file.exists() {
        tokio::fs::remove_file(&box_file).await.map_err(|e| {
            BuildServerError::io(format!("removing stale {}", box_file.display()), e)
        })?;
    }
    driver.package(&box_file).await?;

    driver
        .box_add(
            BOX_NAME,
            &box_file.to_string_lossy(),
            &config.vm.provider,
            None,
            true,
        )
        .await?;

    // Re-query the registry: an add that silently failed must not pass.
    let registered = driver
        .box_list()
        .await?
        .iter()
        .any(|b| b.name == BOX_NAME && b.provider == config.vm.provider);
    if !registered {
        return Err(BuildServerError::BoxNotRegistered(BOX_NAME.to_string()));
    }

    if opts.keep_box_file {
        info!("Keeping packaged box file {}", box_file.display());
    } else {
        tokio::fs::remove_file(&box_file)
            .await
            .map_err(|e| BuildServerError::io(format!("removing {}", box_file.display()), e))?;
    }

    info!("Build server box '{}' is ready", BOX_NAME);
    Ok(())
}

/// Make sure the exact versioned basebox is in the registry, fetching and
/// registering it if missing
async fn ensure_basebox_registered(
    driver: &dyn VmDriver,
    config: &Config,
    version: &str,
) -> BuildServerResult<()> {
    let name = &config.basebox.name;
    let provider = &config.vm.provider;

    let present = driver
        .box_list()
        .await?
        .iter()
        .any(|b| &b.name == name && &b.provider == provider && b.version == version);

    if present {
        info!("Basebox {} {} already registered", name, version);
        return Ok(());
    }

    driver
        .box_add(name, name, provider, Some(version), false)
        .await
}

/// Best-effort diagnostic dump after a failed provisioning run
async fn dump_diagnostics(driver: &dyn VmDriver) {
    error!("Provisioning failed; dumping VM state for debugging");
    match driver.status().await {
        Ok(state) => error!("Instance state: {:?}", state),
        Err(e) => warn!("Could not query instance state: {}", e),
    }
    match driver.box_list().await {
        Ok(boxes) => error!("Registered boxes: {:?}", boxes),
        Err(e) => warn!("Could not list boxes: {}", e),
    }
    match driver.snapshot_list().await {
        Ok(snapshots) => error!("Snapshots:\n{}", snapshots),
        Err(e) => warn!("Could not list snapshots: {}", e),
    }
}
