//! Error types for the machine pool and job registry.

use rackgrid_core::{JobId, MachineId};
use thiserror::Error;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while mutating cluster state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("machine not found: {0}")]
    MachineNotFound(MachineId),

    #[error("machine {machine_id} is already allocated to job {job_id}")]
    MachineUnavailable { machine_id: MachineId, job_id: JobId },

    #[error("machine {0} is not allocated")]
    MachineNotAllocated(MachineId),

    #[error("job {0} is already pending or running")]
    DuplicateJob(JobId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job {0} is no longer pending")]
    JobNotPending(JobId),

    #[error("job {job_id} requested {k} machines, allocation would hold {would_hold}")]
    AllocationExceedsRequest { job_id: JobId, k: u32, would_hold: usize },
}
