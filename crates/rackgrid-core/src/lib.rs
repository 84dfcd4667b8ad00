//! rackgrid-core: types shared by every rackgrid crate.
//!
//! Holds the identifiers, the `JobRequest` submitted through `AddJob`,
//! the per-job-type duration profiles, and the `cluster.toml` parser.

pub mod config;
pub mod types;

pub use config::{ClusterConfig, NotifyConfig, SchedulingConfig};
pub use types::*;
