//! makebuildserver - Reproducible Android build-server VM provisioning
//!
//! Converges a Vagrant-managed build-server VM to a declared configuration,
//! verifies every external input against pinned digests, and packages the
//! result as a reusable box.

pub mod basebox;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod orchestration;
pub mod pipeline;
pub mod plan;
pub mod sync;

pub use error::{BuildServerError, BuildServerResult};
