//! Scheduler error types.

use rackgrid_core::{JobId, MachineId};
use rackgrid_state::StateError;
use thiserror::Error;

/// Errors surfaced to callers of the allocation API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("job already pending or running: {0}")]
    DuplicateJob(JobId),

    #[error("invalid job parameters: {0}")]
    InvalidJobParameters(String),

    #[error("machine unavailable: {0}")]
    MachineUnavailable(MachineId),

    #[error("machine not allocated: {0}")]
    MachineNotAllocated(MachineId),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("state error: {0}")]
    State(StateError),
}

impl From<StateError> for SchedulerError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::DuplicateJob(id) => SchedulerError::DuplicateJob(id),
            StateError::MachineNotFound(id) => SchedulerError::NotFound(format!("machine {id}")),
            StateError::JobNotFound(id) => SchedulerError::NotFound(format!("job {id}")),
            StateError::MachineUnavailable { machine_id, .. } => {
                SchedulerError::MachineUnavailable(machine_id)
            }
            StateError::MachineNotAllocated(id) => SchedulerError::MachineNotAllocated(id),
            other => SchedulerError::State(other),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
