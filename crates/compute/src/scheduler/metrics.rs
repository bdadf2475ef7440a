use std::time::Duration;

use serde::Serialize;

use super::types::UnitCompletion;

/// Summary figures for one scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerMetrics {
    pub processors: usize,
    pub units_completed: usize,
    /// Wall (or virtual) time from run start to the last processor exiting.
    pub execution_time_s: f64,
    pub avg_turnaround_ms: f64,
    /// Completed units per second.
    pub throughput: f64,
    /// Busy time over available processor time, in percent.
    pub cpu_utilization: f64,
}

impl SchedulerMetrics {
    /// Derive the run metrics. Every ratio is 0 when its denominator is.
    pub fn compute(
        completions: &[UnitCompletion],
        busy_ms: &[u64],
        processors: usize,
        elapsed: Duration,
    ) -> Self {
        let total_s = elapsed.as_secs_f64();
        let units_completed = completions.len();

        let avg_turnaround_ms = if units_completed == 0 {
            0.0
        } else {
            completions.iter().map(|c| c.turnaround_ms as f64).sum::<f64>()
                / units_completed as f64
        };

        let throughput = if total_s > 0.0 {
            units_completed as f64 / total_s
        } else {
            0.0
        };

        let busy_s = busy_ms.iter().sum::<u64>() as f64 / 1000.0;
        let capacity_s = processors as f64 * total_s;
        let cpu_utilization = if capacity_s > 0.0 {
            busy_s / capacity_s * 100.0
        } else {
            0.0
        };

        Self {
            processors,
            units_completed,
            execution_time_s: total_s,
            avg_turnaround_ms,
            throughput,
            cpu_utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(id: usize, turnaround_ms: u64) -> UnitCompletion {
        UnitCompletion {
            id,
            name: format!("T{id}"),
            burst_time_ms: turnaround_ms,
            processor: 0,
            turnaround_ms,
        }
    }

    #[test]
    fn two_processors_fully_busy() {
        let completions = vec![done(1, 1000), done(2, 2000)];
        let m = SchedulerMetrics::compute(&completions, &[2000, 2000], 2, Duration::from_secs(2));

        assert_eq!(m.units_completed, 2);
        assert_eq!(m.avg_turnaround_ms, 1500.0);
        assert_eq!(m.throughput, 1.0);
        assert!((m.cpu_utilization - 100.0).abs() < 1e-9);
        assert_eq!(m.execution_time_s, 2.0);
    }

    #[test]
    fn half_idle_is_fifty_percent() {
        let m = SchedulerMetrics::compute(&[done(1, 500)], &[500, 0], 2, Duration::from_millis(500));
        assert!((m.cpu_utilization - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_run_has_zero_ratios() {
        let m = SchedulerMetrics::compute(&[], &[0, 0], 2, Duration::ZERO);
        assert_eq!(m.avg_turnaround_ms, 0.0);
        assert_eq!(m.throughput, 0.0);
        assert_eq!(m.cpu_utilization, 0.0);
        assert!(m.throughput.is_finite());
    }
}
