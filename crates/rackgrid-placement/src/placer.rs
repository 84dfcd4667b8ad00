//! Placement engine: assigns free machines to waiting jobs.
//!
//! One pass walks the candidates in priority order (lower number first,
//! arrival order on ties) and, for each, either:
//! 1. grants all `need` machines if enough are free,
//! 2. grants every remaining free machine if partial allocation applies, or
//! 3. records the job as blocked until the next trigger.
//!
//! There is no preemption and a blocked job is not revisited within the
//! same pass. Machines are taken lowest ID first; there is no locality
//! preference.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use rackgrid_core::{JobId, MachineId, Priority};

/// A job waiting for machines, as seen by the placer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub job_id: JobId,
    pub priority: Priority,
    /// Arrival order, breaks priority ties.
    pub seq: u64,
    /// Machines still missing to reach `k`.
    pub need: u32,
    /// Whether the job type accepts fewer machines than requested.
    pub elastic: bool,
}

/// Global switches for a placement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Let a job start on fewer machines than it needs. Only honoured for
    /// candidates whose job-type profile is elastic; non-elastic jobs
    /// (the built-in `mpi` and `gpu` profiles) always wait for all `k`.
    pub partial_allocation: bool,
}

/// Machines granted to one job in a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub job_id: JobId,
    pub machines: BTreeSet<MachineId>,
    /// True when the job received fewer machines than it needed.
    pub partial: bool,
}

/// Outcome of a placement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementPlan {
    /// Grants in the order they were decided.
    pub grants: Vec<Grant>,
    /// Jobs skipped for lack of machines.
    pub blocked: Vec<JobId>,
}

impl PlacementPlan {
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn granted_machines(&self) -> usize {
        self.grants.iter().map(|g| g.machines.len()).sum()
    }
}

/// Compute grants for `candidates` out of the `free` machines.
pub fn compute_placement(
    candidates: &[Candidate],
    free: &BTreeSet<MachineId>,
    policy: &PlacementPolicy,
) -> PlacementPlan {
    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    ordered.sort_by_key(|c| (c.priority, c.seq));

    let mut remaining = free.clone();
    let mut plan = PlacementPlan::default();

    for candidate in ordered {
        let need = candidate.need as usize;
        if need == 0 {
            continue;
        }

        let take = if remaining.len() >= need {
            need
        } else if !remaining.is_empty() && policy.partial_allocation && candidate.elastic {
            remaining.len()
        } else {
            debug!(
                job_id = candidate.job_id,
                need,
                free = remaining.len(),
                "job blocked"
            );
            plan.blocked.push(candidate.job_id);
            continue;
        };

        let machines = take_lowest(&mut remaining, take);
        debug!(
            job_id = candidate.job_id,
            granted = machines.len(),
            need,
            "machines granted"
        );
        plan.grants.push(Grant {
            job_id: candidate.job_id,
            partial: machines.len() < need,
            machines,
        });
    }

    plan
}

fn take_lowest(set: &mut BTreeSet<MachineId>, n: usize) -> BTreeSet<MachineId> {
    let taken: BTreeSet<MachineId> = set.iter().take(n).copied().collect();
    set.retain(|id| !taken.contains(id));
    taken
}
