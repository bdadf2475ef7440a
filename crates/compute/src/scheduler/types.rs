use std::time::Duration;

use serde::Serialize;
use threadsim_graph::ScheduleUnit;

use super::metrics::SchedulerMetrics;

/// A schedulable unit as the processors see it.
#[derive(Debug, Clone, Serialize)]
pub struct SimThread {
    pub id: usize,
    pub name: String,
    pub burst_time_ms: u64,
    /// Work still owed, in ms. Never exceeds `burst_time_ms` and only goes
    /// down.
    pub remaining_ms: u64,
    /// Offset at which the last slice of this unit ended.
    #[serde(skip)]
    pub(crate) ready_at: Duration,
}

impl SimThread {
    pub fn new(id: usize, name: impl Into<String>, burst_time_ms: u64) -> Self {
        Self {
            id,
            name: name.into(),
            burst_time_ms,
            remaining_ms: burst_time_ms,
            ready_at: Duration::ZERO,
        }
    }

    pub fn from_unit(unit: &ScheduleUnit) -> Self {
        Self::new(unit.index, unit.label(), unit.burst_time_ms)
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_ms == 0
    }

    /// Length of the next slice under `quantum_ms`.
    pub fn next_slice_ms(&self, quantum_ms: u64) -> u64 {
        self.remaining_ms.min(quantum_ms)
    }

    /// Charge `slice_ms` of work, saturating at zero.
    pub(crate) fn consume(&mut self, slice_ms: u64) {
        self.remaining_ms = self.remaining_ms.saturating_sub(slice_ms);
    }
}

/// One line of the execution log.
#[derive(Debug, Clone, Serialize)]
pub struct SliceRecord {
    /// Offset from the run start at which the slice ended, in ms.
    pub timestamp_ms: u64,
    pub processor: usize,
    pub unit: String,
    pub slice_ms: u64,
    pub remaining_ms: u64,
}

/// A unit that ran to zero remaining time.
#[derive(Debug, Clone, Serialize)]
pub struct UnitCompletion {
    pub id: usize,
    pub name: String,
    pub burst_time_ms: u64,
    pub processor: usize,
    /// Time from the run start to completion, in ms.
    pub turnaround_ms: u64,
}

/// Everything one scheduler run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerReport {
    pub metrics: SchedulerMetrics,
    /// Execution log, in the order slices were recorded.
    pub slices: Vec<SliceRecord>,
    pub completions: Vec<UnitCompletion>,
    /// Busy time per processor, in ms.
    pub busy_ms: Vec<u64>,
    /// Units left with work when the run was shut down.
    pub unfinished: Vec<SimThread>,
}

impl SchedulerReport {
    pub fn is_complete(&self) -> bool {
        self.unfinished.is_empty()
    }
}

pub(crate) fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_never_exceed_remaining() {
        let mut t = SimThread::new(1, "T1", 250);
        assert_eq!(t.next_slice_ms(100), 100);
        t.consume(100);
        t.consume(100);
        assert_eq!(t.next_slice_ms(100), 50);
        t.consume(50);
        assert!(t.is_finished());
        t.consume(10);
        assert_eq!(t.remaining_ms, 0);
    }

    #[test]
    fn zero_burst_is_finished_immediately() {
        let t = SimThread::new(3, "T3", 0);
        assert!(t.is_finished());
        assert_eq!(t.next_slice_ms(100), 0);
    }
}
