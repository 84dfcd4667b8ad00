//! JobRegistry: active jobs and their allocated machine sets.
//!
//! Jobs enter as `Pending`, become `Running` when they first hold a
//! machine, and leave the active index once their allocated set is
//! emptied again. Completed jobs are kept in a bounded log.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tracing::{debug, info};

use rackgrid_core::{JobId, JobRequest, MachineId};

use crate::error::{StateError, StateResult};
use crate::types::{CompletedJob, Job, JobState};

const DEFAULT_COMPLETED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct JobRegistry {
    active: HashMap<JobId, Job>,
    completed: VecDeque<CompletedJob>,
    completed_capacity: usize,
    next_seq: u64,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_completed_capacity(DEFAULT_COMPLETED_CAPACITY)
    }

    pub fn with_completed_capacity(completed_capacity: usize) -> Self {
        Self {
            active: HashMap::new(),
            completed: VecDeque::new(),
            completed_capacity,
            next_seq: 0,
        }
    }

    /// Register a new pending job.
    ///
    /// `floor_duration` is passed separately because the request may
    /// leave it to the job type's profile.
    pub fn submit(
        &mut self,
        request: &JobRequest,
        floor_duration: f64,
        now_ms: u64,
    ) -> StateResult<()> {
        if self.active.contains_key(&request.job_id) {
            return Err(StateError::DuplicateJob(request.job_id));
        }

        let job = Job {
            id: request.job_id,
            job_type: request.job_type,
            k: request.k,
            priority: request.priority,
            duration: request.duration,
            floor_duration,
            allocated: BTreeSet::new(),
            state: JobState::Pending,
            seq: self.next_seq,
            submitted_at_ms: now_ms,
            started_at_ms: None,
            peak_allocation: 0,
        };
        self.next_seq += 1;
        self.active.insert(job.id, job);
        debug!(job_id = request.job_id, "job registered");
        Ok(())
    }

    /// Add machines to a job's allocated set.
    ///
    /// The first non-empty allocation moves the job to `Running`.
    pub fn mark_allocated(
        &mut self,
        job_id: JobId,
        machines: &BTreeSet<MachineId>,
        now_ms: u64,
    ) -> StateResult<JobState> {
        let job = self
            .active
            .get_mut(&job_id)
            .ok_or(StateError::JobNotFound(job_id))?;

        let would_hold = job.allocated.union(machines).count();
        if would_hold > job.k as usize {
            return Err(StateError::AllocationExceedsRequest {
                job_id,
                k: job.k,
                would_hold,
            });
        }

        job.allocated.extend(machines.iter().copied());
        job.peak_allocation = job.peak_allocation.max(job.allocated.len());
        if job.state == JobState::Pending && !job.allocated.is_empty() {
            job.state = JobState::Running;
            job.started_at_ms = Some(now_ms);
            info!(job_id, machines = job.allocated.len(), k = job.k, "job running");
        }
        Ok(job.state)
    }

    /// Remove machines from a job's allocated set.
    ///
    /// Returns the completion record when the set becomes empty; the job
    /// is then dropped from the active index.
    pub fn mark_released(
        &mut self,
        job_id: JobId,
        machines: &BTreeSet<MachineId>,
        now_ms: u64,
    ) -> StateResult<Option<CompletedJob>> {
        let job = self
            .active
            .get_mut(&job_id)
            .ok_or(StateError::JobNotFound(job_id))?;

        for id in machines {
            job.allocated.remove(id);
        }

        if job.state == JobState::Running && job.allocated.is_empty() {
            return Ok(self.retire(job_id, now_ms));
        }
        Ok(None)
    }

    /// Drop a job that never received machines.
    pub fn withdraw(&mut self, job_id: JobId, now_ms: u64) -> StateResult<CompletedJob> {
        let job = self.lookup(job_id)?;
        if job.state != JobState::Pending {
            return Err(StateError::JobNotPending(job_id));
        }
        self.retire(job_id, now_ms)
            .ok_or(StateError::JobNotFound(job_id))
    }

    fn retire(&mut self, job_id: JobId, now_ms: u64) -> Option<CompletedJob> {
        let job = self.active.remove(&job_id)?;
        let record = CompletedJob {
            id: job.id,
            job_type: job.job_type,
            k: job.k,
            priority: job.priority,
            duration: job.duration,
            floor_duration: job.floor_duration,
            peak_allocation: job.peak_allocation,
            submitted_at_ms: job.submitted_at_ms,
            started_at_ms: job.started_at_ms,
            completed_at_ms: now_ms,
        };

        if self.completed_capacity > 0 {
            if self.completed.len() == self.completed_capacity {
                self.completed.pop_front();
            }
            self.completed.push_back(record.clone());
        }
        Some(record)
    }

    pub fn lookup(&self, job_id: JobId) -> StateResult<&Job> {
        self.active
            .get(&job_id)
            .ok_or(StateError::JobNotFound(job_id))
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.active.contains_key(&job_id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Active jobs in arrival order.
    pub fn active(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.active.values().collect();
        jobs.sort_by_key(|j| j.seq);
        jobs
    }

    /// Completed jobs, oldest first.
    pub fn completed(&self) -> impl Iterator<Item = &CompletedJob> {
        self.completed.iter()
    }

    /// Jobs still short of `k` machines, ordered by priority then arrival.
    ///
    /// Running jobs are included only when `include_running` is set.
    pub fn candidates(&self, include_running: bool) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self
            .active
            .values()
            .filter(|j| match j.state {
                JobState::Pending => true,
                JobState::Running => include_running && !j.is_fully_allocated(),
                JobState::Completed => false,
            })
            .collect();
        jobs.sort_by_key(|j| (j.priority, j.seq));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackgrid_core::JobType;

    fn request(id: JobId, k: u32, priority: i32) -> JobRequest {
        JobRequest::new(id, JobType::Mpi, k, priority, 10.0, 2.0)
    }

    fn ids(v: &[MachineId]) -> BTreeSet<MachineId> {
        v.iter().copied().collect()
    }

    #[test]
    fn submit_creates_pending_job() {
        let mut reg = JobRegistry::new();
        reg.submit(&request(1, 4, 5), 2.0, 100).unwrap();

        let job = reg.lookup(1).unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.allocated.is_empty());
        assert_eq!(job.submitted_at_ms, 100);
    }

    #[test]
    fn duplicate_active_job_is_rejected() {
        let mut reg = JobRegistry::new();
        reg.submit(&request(1, 4, 5), 2.0, 0).unwrap();

        let err = reg.submit(&request(1, 2, 0), 2.0, 0).unwrap_err();
        assert_eq!(err, StateError::DuplicateJob(1));
        assert_eq!(reg.lookup(1).unwrap().k, 4);
    }

    #[test]
    fn first_allocation_starts_job() {
        let mut reg = JobRegistry::new();
        reg.submit(&request(1, 4, 5), 2.0, 0).unwrap();

        let state = reg.mark_allocated(1, &ids(&[0, 1]), 50).unwrap();
        assert_eq!(state, JobState::Running);
        assert_eq!(reg.lookup(1).unwrap().started_at_ms, Some(50));

        // A top-up keeps the original start time.
        reg.mark_allocated(1, &ids(&[2]), 80).unwrap();
        let job = reg.lookup(1).unwrap();
        assert_eq!(job.started_at_ms, Some(50));
        assert_eq!(job.allocated.len(), 3);
        assert_eq!(job.peak_allocation, 3);
    }

    #[test]
    fn allocation_never_exceeds_k() {
        let mut reg = JobRegistry::new();
        reg.submit(&request(1, 2, 5), 2.0, 0).unwrap();
        reg.mark_allocated(1, &ids(&[0]), 0).unwrap();

        let err = reg.mark_allocated(1, &ids(&[1, 2]), 0).unwrap_err();
        assert!(matches!(err, StateError::AllocationExceedsRequest { would_hold: 3, .. }));
        assert_eq!(reg.lookup(1).unwrap().allocated, ids(&[0]));
    }

    #[test]
    fn releasing_everything_completes_job() {
        let mut reg = JobRegistry::new();
        reg.submit(&request(1, 2, 5), 2.0, 0).unwrap();
        reg.mark_allocated(1, &ids(&[0, 1]), 10).unwrap();

        assert!(reg.mark_released(1, &ids(&[0]), 20).unwrap().is_none());
        assert_eq!(reg.lookup(1).unwrap().state, JobState::Running);

        let done = reg.mark_released(1, &ids(&[1]), 30).unwrap().unwrap();
        assert_eq!(done.id, 1);
        assert_eq!(done.peak_allocation, 2);
        assert_eq!(done.completed_at_ms, 30);
        assert!(!reg.contains(1));
        assert_eq!(reg.completed().count(), 1);
    }

    #[test]
    fn job_id_is_reusable_after_completion() {
        let mut reg = JobRegistry::new();
        reg.submit(&request(1, 1, 5), 2.0, 0).unwrap();
        reg.mark_allocated(1, &ids(&[0]), 0).unwrap();
        reg.mark_released(1, &ids(&[0]), 0).unwrap();

        assert!(reg.submit(&request(1, 1, 5), 2.0, 0).is_ok());
    }

    #[test]
    fn unknown_job_lookups_fail() {
        let mut reg = JobRegistry::new();
        assert_eq!(reg.lookup(3).unwrap_err(), StateError::JobNotFound(3));
        assert_eq!(
            reg.mark_allocated(3, &ids(&[0]), 0).unwrap_err(),
            StateError::JobNotFound(3)
        );
    }

    #[test]
    fn candidates_order_by_priority_then_arrival() {
        let mut reg = JobRegistry::new();
        reg.submit(&request(1, 1, 5), 1.0, 0).unwrap();
        reg.submit(&request(2, 1, 1), 1.0, 0).unwrap();
        reg.submit(&request(3, 1, 5), 1.0, 0).unwrap();
        reg.submit(&request(4, 1, 1), 1.0, 0).unwrap();

        let order: Vec<JobId> = reg.candidates(false).iter().map(|j| j.id).collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn candidates_include_underallocated_running_jobs_on_request() {
        let mut reg = JobRegistry::new();
        reg.submit(&request(1, 4, 0), 1.0, 0).unwrap();
        reg.submit(&request(2, 1, 0), 1.0, 0).unwrap();
        reg.mark_allocated(1, &ids(&[0, 1]), 0).unwrap();
        reg.mark_allocated(2, &ids(&[2]), 0).unwrap();

        assert!(reg.candidates(false).is_empty());
        let topups: Vec<JobId> = reg.candidates(true).iter().map(|j| j.id).collect();
        assert_eq!(topups, vec![1]);
    }

    #[test]
    fn completed_log_is_bounded() {
        let mut reg = JobRegistry::with_completed_capacity(2);
        for id in 0..3 {
            reg.submit(&request(id, 1, 0), 1.0, 0).unwrap();
            reg.withdraw(id, 0).unwrap();
        }
        let kept: Vec<JobId> = reg.completed().map(|c| c.id).collect();
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn withdraw_refuses_running_job() {
        let mut reg = JobRegistry::new();
        reg.submit(&request(1, 2, 0), 1.0, 0).unwrap();
        reg.mark_allocated(1, &ids(&[4]), 0).unwrap();

        assert_eq!(reg.withdraw(1, 0).unwrap_err(), StateError::JobNotPending(1));
        assert!(reg.contains(1));
    }
}
