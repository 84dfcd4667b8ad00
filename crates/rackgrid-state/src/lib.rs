//! rackgrid-state: in-memory cluster state for rackgrid.
//!
//! Two exclusively owned collections:
//!
//! - [`MachinePool`]: every machine and whether it is free or held by a job
//! - [`JobRegistry`]: active jobs, their allocated sets, and a bounded log
//!   of completed jobs
//!
//! Neither type synchronizes internally. The scheduler owns both and is
//! the single writer; all mutation goes through `&mut self`.

pub mod error;
pub mod pool;
pub mod registry;
pub mod types;

pub use error::{StateError, StateResult};
pub use pool::MachinePool;
pub use registry::JobRegistry;
pub use types::*;
