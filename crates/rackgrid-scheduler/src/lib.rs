//! rackgrid-scheduler: event-driven allocation of machines to jobs.
//!
//! Ties the machine pool and job registry (from `rackgrid-state`) to the
//! placement engine (from `rackgrid-placement`). The scheduler:
//!
//! - Admits jobs and validates their parameters
//! - Returns freed machines to the pool and retires finished jobs
//! - Runs a placement pass after every event
//! - Hands resulting allocations to an outbound notifier
//!
//! # Architecture
//!
//! ```text
//! SchedulerHandle (Arc<Mutex<..>>, one event at a time)
//!   ├── Scheduler
//!   │     ├── MachinePool (who owns each machine)
//!   │     ├── JobRegistry (pending / running / completed)
//!   │     └── compute_placement → executor::execute
//!   └── Dispatcher (NotifyAllocation, retried off the lock)
//! ```

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod handle;
pub mod scheduler;
pub mod snapshot;

pub use dispatch::{DeliveryStats, Dispatcher, NotifyFn, NotifyFuture, logging_notifier};
pub use error::{SchedulerError, SchedulerResult};
pub use executor::Allocation;
pub use handle::SchedulerHandle;
pub use scheduler::{ReleaseReport, Scheduler, Trigger};
pub use snapshot::{ClusterSnapshot, JobSummary};
