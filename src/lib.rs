//! Rebuild Lane - reproducibility verification for published packages
//!
//! This crate rebuilds published package artifacts (wheels, crates, npm
//! tarballs, Debian packages) from their declared source and instructions,
//! compares them with the upstream originals, and issues signed evidence of
//! the outcome.

pub mod assets;
pub mod attestation;
pub mod cache;
pub mod config;
pub mod http;
pub mod mock;
pub mod pipeline;
pub mod rebuild;
pub mod remote;

pub use pipeline::{
    rebuild_many, rebuild_package, LocalDeps, PipelineError, RebuildDeps, RebuildRequest,
    VerdictRecord,
};
pub use rebuild_protocol as protocol;
pub use rebuild_verdict as verdict;
