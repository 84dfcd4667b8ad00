//! Scheduler: the single authority over the machine pool and job registry.
//!
//! The `Scheduler` owns both collections and is the only writer. Every
//! inbound operation (`add_job`, `free_resources`, `complete_job`) commits
//! its state change and then runs one placement pass, returning the
//! allocations that pass produced. Callers are responsible for
//! serializing access; see [`crate::SchedulerHandle`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use rackgrid_core::{
    ClusterConfig, DurationProfile, JobId, JobRequest, JobType, MachineId, epoch_millis,
};
use rackgrid_placement::{DurationModel, PlacementPolicy, compute_placement, jobs_to_candidates};
use rackgrid_state::{CompletedJob, JobRegistry, JobState, MachinePool};

use crate::error::{SchedulerError, SchedulerResult};
use crate::executor::{self, Allocation};
use crate::snapshot::{ClusterSnapshot, JobSummary};

/// What caused a placement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    JobArrived(JobId),
    MachinesFreed(usize),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::JobArrived(id) => write!(f, "job_arrived({id})"),
            Trigger::MachinesFreed(n) => write!(f, "machines_freed({n})"),
        }
    }
}

/// Per-machine outcome of a `free_resources` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReport {
    /// Machines returned to the pool.
    pub released: BTreeSet<MachineId>,
    /// Machines that were already free. Ignored.
    pub already_free: Vec<MachineId>,
    /// IDs that do not name a machine. Rejected.
    pub not_found: Vec<MachineId>,
    /// Jobs whose last machine was released by this call.
    pub completed: Vec<JobId>,
    /// Allocations made by the placement pass that followed.
    pub allocations: Vec<Allocation>,
}

impl ReleaseReport {
    /// The first rejected entry, for transports that surface one error.
    pub fn first_error(&self) -> Option<SchedulerError> {
        if let Some(id) = self.not_found.first() {
            return Some(SchedulerError::NotFound(format!("machine {id}")));
        }
        self.already_free
            .first()
            .map(|&id| SchedulerError::MachineNotAllocated(id))
    }
}

pub struct Scheduler {
    pool: MachinePool,
    registry: JobRegistry,
    profiles: HashMap<JobType, DurationProfile>,
    policy: PlacementPolicy,
}

impl Scheduler {
    /// Create a scheduler with every machine free and no jobs.
    pub fn new(config: &ClusterConfig) -> Self {
        let pool = MachinePool::new(&config.cluster.racks);
        info!(
            machines = pool.len(),
            racks = config.cluster.racks.len(),
            partial_allocation = config.scheduling.partial_allocation,
            "scheduler initialized"
        );
        Self {
            pool,
            registry: JobRegistry::with_completed_capacity(
                config.scheduling.completed_log_capacity,
            ),
            profiles: config.resolved_profiles(),
            policy: PlacementPolicy {
                partial_allocation: config.scheduling.partial_allocation,
            },
        }
    }

    pub fn pool(&self) -> &MachinePool {
        &self.pool
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn policy(&self) -> PlacementPolicy {
        self.policy
    }

    fn profile(&self, job_type: JobType) -> DurationProfile {
        self.profiles
            .get(&job_type)
            .copied()
            .unwrap_or_else(|| DurationProfile::builtin(job_type))
    }

    // ── Allocation API ──────────────────────────────────────────────

    /// Admit a job and run a placement pass.
    ///
    /// Validation happens before the registry is touched, so a rejected
    /// request leaves no trace.
    pub fn add_job(&mut self, request: JobRequest) -> SchedulerResult<Vec<Allocation>> {
        let floor = request.resolved_floor(&self.profile(request.job_type));
        self.validate(&request, floor)?;

        self.registry.submit(&request, floor, epoch_millis())?;
        info!(
            job_id = request.job_id,
            job_type = %request.job_type,
            k = request.k,
            priority = request.priority,
            duration = request.duration,
            floor_duration = floor,
            "job submitted"
        );

        Ok(self.schedule(Trigger::JobArrived(request.job_id)))
    }

    /// Return machines to the pool and run a placement pass.
    ///
    /// Each machine is handled on its own: unknown IDs and machines that
    /// are already free are reported and skipped, the rest are released.
    pub fn free_resources(&mut self, machines: &[MachineId]) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        let mut to_release = BTreeSet::new();

        for &id in machines.iter().collect::<BTreeSet<_>>() {
            match self.pool.owner(id) {
                Ok(Some(_)) => {
                    to_release.insert(id);
                }
                Ok(None) => {
                    warn!(machine_id = id, "machine already free, ignoring");
                    report.already_free.push(id);
                }
                Err(e) => {
                    warn!(machine_id = id, error = %e, "release of unknown machine rejected");
                    report.not_found.push(id);
                }
            }
        }

        if to_release.is_empty() {
            return report;
        }

        self.release_validated(&to_release, &mut report);
        report.allocations = self.schedule(Trigger::MachinesFreed(report.released.len()));
        report
    }

    /// External completion signal: release everything a job holds.
    ///
    /// A job that is still pending is withdrawn instead.
    pub fn complete_job(&mut self, job_id: JobId) -> SchedulerResult<ReleaseReport> {
        let job = self.registry.lookup(job_id)?;
        let state = job.state;
        let held: Vec<MachineId> = job.allocated.iter().copied().collect();
        match state {
            JobState::Pending => {
                let record = self.registry.withdraw(job_id, epoch_millis())?;
                info!(job_id, "pending job withdrawn");
                self.log_completion(&record);
                Ok(ReleaseReport {
                    completed: vec![job_id],
                    ..ReleaseReport::default()
                })
            }
            JobState::Running | JobState::Completed => Ok(self.free_resources(&held)),
        }
    }

    // ── Placement ──────────────────────────────────────────────────

    /// Run one placement pass and commit its grants.
    pub fn schedule(&mut self, trigger: Trigger) -> Vec<Allocation> {
        let free = self.pool.free();
        if free.is_empty() {
            debug!(%trigger, "no free machines, skipping placement");
            return Vec::new();
        }

        let candidates = {
            let jobs = self.registry.candidates(self.policy.partial_allocation);
            jobs_to_candidates(&jobs, &self.profiles)
        };
        if candidates.is_empty() {
            debug!(%trigger, free = free.len(), "no waiting jobs");
            return Vec::new();
        }

        let plan = compute_placement(&candidates, &free, &self.policy);
        let blocked = plan.blocked.len();
        let allocations = executor::execute(plan, &mut self.pool, &mut self.registry, epoch_millis());

        debug!(
            %trigger,
            candidates = candidates.len(),
            allocated = allocations.len(),
            blocked,
            free = self.pool.free_count(),
            "placement pass complete"
        );
        allocations
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn snapshot(&self) -> ClusterSnapshot {
        let mut pending = Vec::new();
        let mut running = Vec::new();
        for job in self.registry.candidates(false) {
            pending.push(JobSummary::from_job(job));
        }
        for job in self.registry.active() {
            if job.state == JobState::Running {
                running.push(JobSummary::from_job(job));
            }
        }
        running.sort_by_key(|j| (j.expected_finish_ms.unwrap_or(u64::MAX), j.job_id));

        ClusterSnapshot {
            machines_total: self.pool.len(),
            machines_free: self.pool.free_count(),
            racks: self.pool.rack_usage(),
            pending,
            running,
            completed: self.registry.completed().cloned().collect(),
        }
    }

    /// Every broken pool/registry invariant, described. Empty when consistent.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for machine in self.pool.machines() {
            let Some(job_id) = machine.owner() else { continue };
            match self.registry.lookup(job_id) {
                Ok(job) if job.allocated.contains(&machine.id) => {}
                Ok(_) => violations.push(format!(
                    "machine {} points at job {job_id}, which does not hold it",
                    machine.id
                )),
                Err(_) => violations.push(format!(
                    "machine {} points at inactive job {job_id}",
                    machine.id
                )),
            }
        }

        for job in self.registry.active() {
            if job.allocated.len() > job.k as usize {
                violations.push(format!(
                    "job {} holds {} machines, requested {}",
                    job.id,
                    job.allocated.len(),
                    job.k
                ));
            }
            for &id in &job.allocated {
                if self.pool.owner(id).ok().flatten() != Some(job.id) {
                    violations.push(format!("job {} lists machine {id} it does not own", job.id));
                }
            }
            let consistent = match job.state {
                JobState::Pending => job.allocated.is_empty(),
                JobState::Running => !job.allocated.is_empty(),
                JobState::Completed => false,
            };
            if !consistent {
                violations.push(format!(
                    "job {} is {} with {} machines",
                    job.id,
                    job.state,
                    job.allocated.len()
                ));
            }
        }

        violations
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn validate(&self, request: &JobRequest, floor: f64) -> SchedulerResult<()> {
        let invalid = |msg: String| Err(SchedulerError::InvalidJobParameters(msg));

        if request.k < 1 {
            return invalid(format!("job {}: k must be at least 1", request.job_id));
        }
        // An elastic job under partial allocation can run on fewer than k.
        let may_run_short =
            self.policy.partial_allocation && self.profile(request.job_type).elastic;
        if !may_run_short && request.k as usize > self.pool.len() {
            return invalid(format!(
                "job {}: k = {} exceeds cluster size {}",
                request.job_id,
                request.k,
                self.pool.len()
            ));
        }
        if !request.duration.is_finite() || !floor.is_finite() {
            return invalid(format!("job {}: durations must be finite", request.job_id));
        }
        if floor < 0.0 {
            return invalid(format!(
                "job {}: floor duration {floor} is negative",
                request.job_id
            ));
        }
        if floor > request.duration {
            return invalid(format!(
                "job {}: floor duration {floor} exceeds duration {}",
                request.job_id, request.duration
            ));
        }
        Ok(())
    }

    /// Release machines already known to be allocated and settle the
    /// affected jobs.
    fn release_validated(&mut self, machines: &BTreeSet<MachineId>, report: &mut ReleaseReport) {
        let by_job = match self.pool.release(machines) {
            Ok(by_job) => by_job,
            Err(e) => {
                error!(machines = ?machines, error = %e, "release failed after validation");
                return;
            }
        };

        let now = epoch_millis();
        for (job_id, ids) in by_job {
            report.released.extend(ids.iter().copied());
            match self.registry.mark_released(job_id, &ids, now) {
                Ok(Some(record)) => {
                    self.log_completion(&record);
                    report.completed.push(job_id);
                }
                Ok(None) => {
                    debug!(job_id, released = ids.len(), "job released part of its machines");
                }
                Err(e) => {
                    error!(job_id, machines = ?ids, error = %e, "released machines had no active owner");
                }
            }
        }
    }

    fn log_completion(&self, record: &CompletedJob) {
        let expected = DurationModel::for_completed(record).expected_secs(record.peak_allocation);
        info!(
            job_id = record.id,
            machines = record.peak_allocation,
            runtime_secs = ?record.runtime_secs(),
            expected_secs = ?expected,
            "job completed"
        );
    }
}
