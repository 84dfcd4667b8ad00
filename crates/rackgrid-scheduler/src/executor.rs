//! Placement executor: applies a PlacementPlan to the cluster state.
//!
//! Each grant is committed as a reservation in the machine pool followed
//! by an update of the job's allocated set. A grant that cannot be
//! committed is dropped and logged; the pool and registry keep their last
//! consistent state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use rackgrid_core::{JobId, MachineId};
use rackgrid_placement::{Grant, PlacementPlan};
use rackgrid_state::{JobRegistry, MachinePool};

/// A committed allocation, sent outward to the job's submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub job_id: JobId,
    pub machines: BTreeSet<MachineId>,
    /// The job received fewer machines than it still needed.
    pub partial: bool,
}

impl From<Grant> for Allocation {
    fn from(grant: Grant) -> Self {
        Self {
            job_id: grant.job_id,
            machines: grant.machines,
            partial: grant.partial,
        }
    }
}

/// Commit every grant in `plan`. Returns the allocations that took effect.
pub fn execute(
    plan: PlacementPlan,
    pool: &mut MachinePool,
    registry: &mut JobRegistry,
    now_ms: u64,
) -> Vec<Allocation> {
    let mut committed = Vec::with_capacity(plan.grants.len());

    for grant in plan.grants {
        if let Err(e) = pool.reserve(&grant.machines, grant.job_id) {
            error!(
                job_id = grant.job_id,
                machines = ?grant.machines,
                error = %e,
                "placement granted a machine that is not free; grant dropped"
            );
            continue;
        }

        if let Err(e) = registry.mark_allocated(grant.job_id, &grant.machines, now_ms) {
            error!(
                job_id = grant.job_id,
                error = %e,
                "registry rejected grant; returning machines to the pool"
            );
            if let Err(e) = pool.release(&grant.machines) {
                error!(job_id = grant.job_id, error = %e, "rollback of reservation failed");
            }
            continue;
        }

        info!(
            job_id = grant.job_id,
            machines = ?grant.machines,
            partial = grant.partial,
            "machines allocated"
        );
        committed.push(Allocation::from(grant));
    }

    committed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackgrid_core::{JobRequest, JobType};
    use rackgrid_state::JobState;

    fn make_plan(grants: Vec<(JobId, Vec<MachineId>)>) -> PlacementPlan {
        PlacementPlan {
            grants: grants
                .into_iter()
                .map(|(job_id, ids)| Grant {
                    job_id,
                    machines: ids.into_iter().collect(),
                    partial: false,
                })
                .collect(),
            blocked: Vec::new(),
        }
    }

    fn setup(jobs: &[(JobId, u32)]) -> (MachinePool, JobRegistry) {
        let pool = MachinePool::new(&[6]);
        let mut registry = JobRegistry::new();
        for &(id, k) in jobs {
            registry
                .submit(&JobRequest::new(id, JobType::Mpi, k, 0, 4.0, 1.0), 1.0, 0)
                .unwrap();
        }
        (pool, registry)
    }

    #[test]
    fn grants_reserve_and_start_jobs() {
        let (mut pool, mut registry) = setup(&[(1, 2), (2, 3)]);
        let plan = make_plan(vec![(1, vec![0, 1]), (2, vec![2, 3, 4])]);

        let committed = execute(plan, &mut pool, &mut registry, 10);

        assert_eq!(committed.len(), 2);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.owner(3).unwrap(), Some(2));
        assert_eq!(registry.lookup(1).unwrap().state, JobState::Running);
        assert_eq!(registry.lookup(2).unwrap().started_at_ms, Some(10));
    }

    #[test]
    fn grant_on_busy_machine_is_dropped() {
        let (mut pool, mut registry) = setup(&[(1, 2), (2, 2)]);
        let plan = make_plan(vec![(1, vec![0, 1]), (2, vec![1, 2])]);

        let committed = execute(plan, &mut pool, &mut registry, 0);

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].job_id, 1);
        assert_eq!(pool.owner(2).unwrap(), None);
        assert_eq!(registry.lookup(2).unwrap().state, JobState::Pending);
    }

    #[test]
    fn grant_for_unknown_job_is_rolled_back() {
        let (mut pool, mut registry) = setup(&[]);
        let plan = make_plan(vec![(9, vec![0, 1])]);

        let committed = execute(plan, &mut pool, &mut registry, 0);

        assert!(committed.is_empty());
        assert_eq!(pool.free_count(), 6);
    }

    #[test]
    fn empty_plan_is_noop() {
        let (mut pool, mut registry) = setup(&[(1, 1)]);
        let committed = execute(PlacementPlan::default(), &mut pool, &mut registry, 0);

        assert!(committed.is_empty());
        assert_eq!(pool.free_count(), 6);
    }
}
