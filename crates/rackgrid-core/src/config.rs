//! cluster.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::types::{DurationProfile, JobType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub cluster: TopologyConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub profiles: HashMap<JobType, DurationProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Machines per rack. The pool size is the sum.
    pub racks: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Allow elastic jobs to start on fewer machines than requested.
    #[serde(default)]
    pub partial_allocation: bool,
    /// How many completed jobs the registry keeps for inspection.
    #[serde(default = "default_completed_log_capacity")]
    pub completed_log_capacity: usize,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            partial_allocation: false,
            completed_log_capacity: default_completed_log_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before retry `n` is `n * backoff_ms`.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_completed_log_capacity() -> usize {
    1024
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

impl ClusterConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: ClusterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A single-rack cluster with default settings.
    pub fn single_rack(machines: u32) -> Self {
        ClusterConfig {
            cluster: TopologyConfig {
                racks: vec![machines],
            },
            scheduling: SchedulingConfig::default(),
            notify: NotifyConfig::default(),
            profiles: HashMap::new(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cluster.racks.is_empty() {
            anyhow::bail!("cluster.racks must list at least one rack");
        }
        if let Some(idx) = self.cluster.racks.iter().position(|&n| n == 0) {
            anyhow::bail!("cluster.racks[{idx}] has no machines");
        }
        if self.notify.max_attempts == 0 {
            anyhow::bail!("notify.max_attempts must be at least 1");
        }
        for (job_type, profile) in &self.profiles {
            if !(0.0..=1.0).contains(&profile.floor_ratio) {
                anyhow::bail!(
                    "profiles.{job_type}.floor_ratio must be within 0.0..=1.0, got {}",
                    profile.floor_ratio
                );
            }
        }
        Ok(())
    }

    /// Total number of machines across all racks.
    pub fn machine_count(&self) -> u32 {
        self.cluster.racks.iter().sum()
    }

    /// Resolve the duration profile for a job type.
    pub fn profile(&self, job_type: JobType) -> DurationProfile {
        self.profiles
            .get(&job_type)
            .copied()
            .unwrap_or_else(|| DurationProfile::builtin(job_type))
    }

    /// Profiles for every job type, with overrides applied.
    pub fn resolved_profiles(&self) -> HashMap<JobType, DurationProfile> {
        JobType::ALL
            .iter()
            .map(|&t| (t, self.profile(t)))
            .collect()
    }
}
