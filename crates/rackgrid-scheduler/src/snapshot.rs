//! Point-in-time views of the cluster for logging and inspection.

use serde::{Deserialize, Serialize};

use rackgrid_core::{JobId, JobType, MachineId, Priority};
use rackgrid_placement::DurationModel;
use rackgrid_state::{CompletedJob, Job, JobState, RackUsage};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSnapshot {
    pub machines_total: usize,
    pub machines_free: usize,
    pub racks: Vec<RackUsage>,
    /// Pending jobs in scheduling order.
    pub pending: Vec<JobSummary>,
    /// Running jobs, earliest expected finish first.
    pub running: Vec<JobSummary>,
    pub completed: Vec<CompletedJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub job_id: JobId,
    pub job_type: JobType,
    pub k: u32,
    pub priority: Priority,
    pub state: JobState,
    pub allocated: Vec<MachineId>,
    /// Expected seconds on the current allocation.
    pub expected_secs: Option<f64>,
    pub expected_finish_ms: Option<u64>,
}

impl JobSummary {
    pub fn from_job(job: &Job) -> Self {
        let model = DurationModel::for_job(job);
        let held = job.allocated.len();
        Self {
            job_id: job.id,
            job_type: job.job_type,
            k: job.k,
            priority: job.priority,
            state: job.state,
            allocated: job.allocated.iter().copied().collect(),
            expected_secs: model.expected_secs(held),
            expected_finish_ms: job
                .started_at_ms
                .and_then(|start| model.expected_finish_ms(start, held)),
        }
    }
}

impl ClusterSnapshot {
    pub fn running_job(&self, job_id: JobId) -> Option<&JobSummary> {
        self.running.iter().find(|j| j.job_id == job_id)
    }

    pub fn pending_job(&self, job_id: JobId) -> Option<&JobSummary> {
        self.pending.iter().find(|j| j.job_id == job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn running_job() -> Job {
        Job {
            id: 9,
            job_type: JobType::Unconstrained,
            k: 4,
            priority: 1,
            duration: 10.0,
            floor_duration: 2.0,
            allocated: BTreeSet::from([3, 4]),
            state: JobState::Running,
            seq: 0,
            submitted_at_ms: 1_000,
            started_at_ms: Some(2_000),
            peak_allocation: 2,
        }
    }

    #[test]
    fn summary_uses_current_allocation() {
        let summary = JobSummary::from_job(&running_job());
        // 2 + 8 * 4 / 2
        assert_eq!(summary.expected_secs, Some(18.0));
        assert_eq!(summary.expected_finish_ms, Some(20_000));
        assert_eq!(summary.allocated, vec![3, 4]);
    }

    #[test]
    fn summary_serializes_with_snake_case_fields() {
        let value = serde_json::to_value(JobSummary::from_job(&running_job())).unwrap();
        assert_eq!(value["job_type"], "unconstrained");
        assert_eq!(value["allocated"], serde_json::json!([3, 4]));
        assert_eq!(value["k"], 4);
    }
}
