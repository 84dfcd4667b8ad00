//! Type conversions between registry jobs and placement candidates.

use std::collections::HashMap;

use rackgrid_core::{DurationProfile, JobType};
use rackgrid_state::Job;

use crate::placer::Candidate;

/// Convert a registry [`Job`] to a placement [`Candidate`].
///
/// Elasticity comes from the job type's profile; types missing from
/// `profiles` fall back to the built-in profile.
pub fn job_to_candidate(job: &Job, profiles: &HashMap<JobType, DurationProfile>) -> Candidate {
    let profile = profiles
        .get(&job.job_type)
        .copied()
        .unwrap_or_else(|| DurationProfile::builtin(job.job_type));
    Candidate {
        job_id: job.id,
        priority: job.priority,
        seq: job.seq,
        need: job.need(),
        elastic: profile.elastic,
    }
}

pub fn jobs_to_candidates(
    jobs: &[&Job],
    profiles: &HashMap<JobType, DurationProfile>,
) -> Vec<Candidate> {
    jobs.iter().map(|j| job_to_candidate(j, profiles)).collect()
}
