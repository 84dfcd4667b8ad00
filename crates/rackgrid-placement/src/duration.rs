//! Duration model: expected runtime as a function of allocated machines.
//!
//! A job asks for `k` machines and reports two durations: `D`, the runtime
//! on exactly `k` machines, and `F`, the runtime it approaches as machines
//! are added without bound. The model interpolates linearly in `1/m`:
//!
//! ```text
//! duration(m) = F + (D - F) * k / m
//! ```
//!
//! so `duration(k) = D`, `duration(m) -> F` as `m` grows, and the curve is
//! non-increasing in `m`. With `m < k` the job runs longer than `D`.

use serde::{Deserialize, Serialize};

use rackgrid_state::{CompletedJob, Job};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationModel {
    pub k: u32,
    /// Seconds on exactly `k` machines.
    pub duration: f64,
    /// Asymptotic seconds with unlimited machines.
    pub floor: f64,
}

impl DurationModel {
    pub fn new(k: u32, duration: f64, floor: f64) -> Self {
        Self { k, duration, floor }
    }

    pub fn for_job(job: &Job) -> Self {
        Self::new(job.k, job.duration, job.floor_duration)
    }

    pub fn for_completed(job: &CompletedJob) -> Self {
        Self::new(job.k, job.duration, job.floor_duration)
    }

    /// Expected seconds on `machines` machines. `None` for zero machines.
    pub fn expected_secs(&self, machines: usize) -> Option<f64> {
        if machines == 0 {
            return None;
        }
        // D < F clamps to F.
        let span = (self.duration - self.floor).max(0.0);
        let scaled = span * f64::from(self.k) / machines as f64;
        Some(self.floor + scaled)
    }

    /// Expected completion time in epoch milliseconds.
    pub fn expected_finish_ms(&self, started_at_ms: u64, machines: usize) -> Option<u64> {
        let secs = self.expected_secs(machines)?;
        Some(started_at_ms.saturating_add((secs * 1000.0).round() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_allocation_yields_base_duration() {
        let model = DurationModel::new(4, 10.0, 2.0);
        assert_eq!(model.expected_secs(4), Some(10.0));
    }

    #[test]
    fn fewer_machines_run_longer() {
        let model = DurationModel::new(4, 10.0, 2.0);
        // 2 + 8 * 4 / 2
        assert_eq!(model.expected_secs(2), Some(18.0));
        assert_eq!(model.expected_secs(1), Some(34.0));
    }

    #[test]
    fn more_machines_approach_floor() {
        let model = DurationModel::new(4, 10.0, 2.0);
        assert_eq!(model.expected_secs(8), Some(6.0));
        let far = model.expected_secs(1_000_000).unwrap();
        assert!(far > 2.0 && far < 2.001);
    }

    #[test]
    fn zero_machines_has_no_estimate() {
        let model = DurationModel::new(4, 10.0, 2.0);
        assert_eq!(model.expected_secs(0), None);
        assert_eq!(model.expected_finish_ms(0, 0), None);
    }

    #[test]
    fn monotone_and_bounded_for_all_valid_m() {
        for (k, d, f) in [(1, 5.0, 5.0), (4, 10.0, 2.0), (8, 100.0, 0.0), (16, 3.5, 3.4)] {
            let model = DurationModel::new(k, d, f);
            let mut prev = f64::INFINITY;
            for m in 1..=k as usize {
                let secs = model.expected_secs(m).unwrap();
                assert!(secs <= prev, "k={k} m={m}: {secs} > {prev}");
                assert!(secs >= f, "k={k} m={m}: {secs} below floor {f}");
                prev = secs;
            }
        }
    }

    #[test]
    fn equal_floor_means_no_speedup() {
        let model = DurationModel::new(3, 7.0, 7.0);
        assert_eq!(model.expected_secs(1), Some(7.0));
        assert_eq!(model.expected_secs(3), Some(7.0));
    }

    #[test]
    fn expected_finish_adds_runtime() {
        let model = DurationModel::new(2, 1.5, 1.0);
        assert_eq!(model.expected_finish_ms(10_000, 2), Some(11_500));
    }
}
