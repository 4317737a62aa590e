//! Orchestration of the external virtualization tool
//!
//! The `VmDriver` trait is the seam between the pipeline and the tool;
//! `VagrantCli` is the production implementation.

mod driver;
pub mod ssh_config;
mod tail;
mod vagrant;

pub use driver::{BoxInfo, VmDriver, VmState};
pub use ssh_config::ConnectionProfile;
pub use tail::LogTailer;
pub use vagrant::VagrantCli;

/// Probe for hardware virtualization support.
///
/// Absence is not fatal, only a performance fallback: the Vagrantfile
/// disables nested acceleration when this reports false.
pub fn detect_hwvirt() -> bool {
    if cfg!(target_os = "linux") {
        match std::fs::read_to_string("/proc/cpuinfo") {
            Ok(cpuinfo) => cpuinfo_has_hwvirt(&cpuinfo),
            Err(_) => false,
        }
    } else {
        false
    }
}

fn cpuinfo_has_hwvirt(cpuinfo: &str) -> bool {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("flags"))
        .any(|line| {
            line.split_whitespace()
                .any(|flag| flag == "vmx" || flag == "svm")
        })
}
