//! Shared types used across rackgrid crates.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Externally supplied job identifier.
pub type JobId = u64;

/// Dense machine identifier, assigned rack by rack starting at 0.
pub type MachineId = u32;

/// Job priority. Lower numbers are more urgent.
pub type Priority = i32;

/// Category of a job. Selects the duration profile used for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Mpi,
    Gpu,
    Unconstrained,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::Mpi, JobType::Gpu, JobType::Unconstrained];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Mpi => "mpi",
            JobType::Gpu => "gpu",
            JobType::Unconstrained => "unconstrained",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown job type: {0}")]
pub struct ParseJobTypeError(String);

impl FromStr for JobType {
    type Err = ParseJobTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mpi" => Ok(JobType::Mpi),
            "gpu" => Ok(JobType::Gpu),
            "unconstrained" => Ok(JobType::Unconstrained),
            _ => Err(ParseJobTypeError(s.to_string())),
        }
    }
}

/// Duration-model parameters attached to a job type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationProfile {
    /// Whether jobs of this type may start on fewer than `k` machines.
    #[serde(default)]
    pub elastic: bool,
    /// Floor duration as a fraction of the base duration, used when a
    /// submission does not carry its own floor.
    #[serde(default = "default_floor_ratio")]
    pub floor_ratio: f64,
}

fn default_floor_ratio() -> f64 {
    1.0
}

impl DurationProfile {
    /// Built-in profile for a job type when `cluster.toml` does not override it.
    pub fn builtin(job_type: JobType) -> Self {
        match job_type {
            JobType::Mpi | JobType::Gpu => DurationProfile {
                elastic: false,
                floor_ratio: 1.0,
            },
            JobType::Unconstrained => DurationProfile {
                elastic: true,
                floor_ratio: 0.5,
            },
        }
    }
}

/// A job submission as delivered by `AddJob`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: JobId,
    pub job_type: JobType,
    /// Requested machine count.
    pub k: u32,
    pub priority: Priority,
    /// Expected runtime in seconds on exactly `k` machines.
    pub duration: f64,
    /// Runtime in seconds with unlimited machines. Filled from the job
    /// type's profile when absent.
    #[serde(default)]
    pub floor_duration: Option<f64>,
}

impl JobRequest {
    pub fn new(
        job_id: JobId,
        job_type: JobType,
        k: u32,
        priority: Priority,
        duration: f64,
        floor_duration: f64,
    ) -> Self {
        Self {
            job_id,
            job_type,
            k,
            priority,
            duration,
            floor_duration: Some(floor_duration),
        }
    }

    /// Floor duration, falling back to `duration * profile.floor_ratio`.
    pub fn resolved_floor(&self, profile: &DurationProfile) -> f64 {
        self.floor_duration
            .unwrap_or(self.duration * profile.floor_ratio)
    }
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_parses_case_insensitively() {
        assert_eq!("MPI".parse::<JobType>().unwrap(), JobType::Mpi);
        assert_eq!("gpu".parse::<JobType>().unwrap(), JobType::Gpu);
        assert!("fpga".parse::<JobType>().is_err());
    }

    #[test]
    fn job_type_serializes_snake_case() {
        let json = serde_json::to_string(&JobType::Unconstrained).unwrap();
        assert_eq!(json, "\"unconstrained\"");
    }

    #[test]
    fn missing_floor_uses_profile_ratio() {
        let req: JobRequest = serde_json::from_str(
            r#"{"job_id":7,"job_type":"unconstrained","k":2,"priority":0,"duration":8.0}"#,
        )
        .unwrap();
        assert_eq!(req.floor_duration, None);

        let profile = DurationProfile::builtin(JobType::Unconstrained);
        assert_eq!(req.resolved_floor(&profile), 4.0);
    }

    #[test]
    fn explicit_floor_wins_over_profile() {
        let req = JobRequest::new(1, JobType::Mpi, 4, 5, 10.0, 2.0);
        let profile = DurationProfile::builtin(JobType::Mpi);
        assert_eq!(req.resolved_floor(&profile), 2.0);
    }
}
