//! rackgrid placement engine: which pending jobs get which free machines.
//!
//! This crate makes decisions only. It reads a snapshot of candidates and
//! the free set and returns a `PlacementPlan`; the scheduler applies the
//! plan to the machine pool and job registry.
//!
//! # Components
//!
//! - **`duration`**: Expected runtime given the machines actually held
//! - **`placer`**: Strict-priority, FIFO-tie-break grant computation
//! - **`convert`**: Builds placement candidates from registry jobs

pub mod convert;
pub mod duration;
pub mod placer;

pub use convert::{job_to_candidate, jobs_to_candidates};
pub use duration::DurationModel;
pub use placer::{Candidate, Grant, PlacementPlan, PlacementPolicy, compute_placement};
