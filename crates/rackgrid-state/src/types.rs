//! Domain types for the machine pool and job registry.
//!
//! All types are serializable so a snapshot of the cluster can be logged
//! or printed as JSON.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use rackgrid_core::{JobId, JobType, MachineId, Priority};

// ── Machine ───────────────────────────────────────────────────────

/// A single allocatable machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Machine {
    pub id: MachineId,
    /// Index of the rack this machine sits in.
    pub rack: u32,
    pub state: MachineState,
}

/// Whether a machine is free or held by a job.
///
/// The job reference is a lookup key only; the job's allocated set in the
/// registry is the owning side of the relation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MachineState {
    Free,
    Allocated { job_id: JobId },
}

impl Machine {
    pub fn is_free(&self) -> bool {
        matches!(self.state, MachineState::Free)
    }

    pub fn owner(&self) -> Option<JobId> {
        match self.state {
            MachineState::Free => None,
            MachineState::Allocated { job_id } => Some(job_id),
        }
    }
}

/// Free/total machine counts for one rack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RackUsage {
    pub rack: u32,
    pub total: u32,
    pub free: u32,
}

// ── Job ───────────────────────────────────────────────────────────

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
        }
    }
}

/// An active (pending or running) job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    /// Requested machine count.
    pub k: u32,
    pub priority: Priority,
    /// Seconds to finish on exactly `k` machines.
    pub duration: f64,
    /// Seconds to finish with unlimited machines.
    pub floor_duration: f64,
    /// Machines currently held. Never larger than `k`.
    pub allocated: BTreeSet<MachineId>,
    pub state: JobState,
    /// Arrival order, used to break priority ties.
    pub seq: u64,
    pub submitted_at_ms: u64,
    /// Set when the job first receives machines.
    pub started_at_ms: Option<u64>,
    /// Largest allocated-set size the job has held.
    pub peak_allocation: usize,
}

impl Job {
    /// How many more machines the job needs to reach `k`.
    pub fn need(&self) -> u32 {
        self.k.saturating_sub(self.allocated.len() as u32)
    }

    pub fn is_fully_allocated(&self) -> bool {
        self.need() == 0
    }
}

/// Record kept for a job after its last machine was released.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedJob {
    pub id: JobId,
    pub job_type: JobType,
    pub k: u32,
    pub priority: Priority,
    pub duration: f64,
    pub floor_duration: f64,
    pub peak_allocation: usize,
    pub submitted_at_ms: u64,
    /// `None` when the job was withdrawn before it ever ran.
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: u64,
}

impl CompletedJob {
    /// Wall-clock seconds between start and completion.
    pub fn runtime_secs(&self) -> Option<f64> {
        let started = self.started_at_ms?;
        Some(self.completed_at_ms.saturating_sub(started) as f64 / 1000.0)
    }

    /// Seconds spent queued before the first allocation.
    pub fn wait_secs(&self) -> Option<f64> {
        let started = self.started_at_ms?;
        Some(started.saturating_sub(self.submitted_at_ms) as f64 / 1000.0)
    }
}
