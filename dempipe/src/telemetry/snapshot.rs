//! Point-in-time telemetry.

use std::fmt;
use std::time::Duration;

use crate::executor::TaskKind;

/// Per-kind counter values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub split: u64,
    pub interpolate: u64,
    pub merge: u64,
    pub downsample: u64,
}

impl KindCounts {
    pub fn get(&self, kind: TaskKind) -> u64 {
        match kind {
            TaskKind::Split => self.split,
            TaskKind::Interpolate => self.interpolate,
            TaskKind::Merge => self.merge,
            TaskKind::Downsample => self.downsample,
        }
    }

    pub(crate) fn set(&mut self, kind: TaskKind, value: u64) {
        match kind {
            TaskKind::Split => self.split = value,
            TaskKind::Interpolate => self.interpolate = value,
            TaskKind::Merge => self.merge = value,
            TaskKind::Downsample => self.downsample = value,
        }
    }

    pub fn total(&self) -> u64 {
        self.split + self.interpolate + self.merge + self.downsample
    }
}

impl fmt::Display for KindCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "split {} / interpolate {} / merge {} / downsample {}",
            self.split, self.interpolate, self.merge, self.downsample
        )
    }
}

/// Copy of the pipeline counters at one moment.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetrySnapshot {
    pub started: KindCounts,
    pub completed: KindCounts,
    pub failed: KindCounts,
    pub in_progress: usize,
    pub queue_depth: usize,
    pub stalled: usize,
    pub empty_inputs: u64,
    pub merges_emitted: u64,
    pub uptime: Duration,
}

impl TelemetrySnapshot {
    /// Uptime as `HH:MM:SS`.
    pub fn uptime_human(&self) -> String {
        let secs = self.uptime.as_secs();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }

    /// Finished tiles, counted by completed downsample tasks.
    pub fn products_finished(&self) -> u64 {
        self.completed.downsample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_human() {
        let snapshot = TelemetrySnapshot {
            started: KindCounts::default(),
            completed: KindCounts::default(),
            failed: KindCounts::default(),
            in_progress: 0,
            queue_depth: 0,
            stalled: 0,
            empty_inputs: 0,
            merges_emitted: 0,
            uptime: Duration::from_secs(3 * 3600 + 7 * 60 + 9),
        };
        assert_eq!(snapshot.uptime_human(), "03:07:09");
    }

    #[test]
    fn test_kind_counts() {
        let mut counts = KindCounts::default();
        counts.set(TaskKind::Merge, 4);
        counts.set(TaskKind::Split, 1);
        assert_eq!(counts.get(TaskKind::Merge), 4);
        assert_eq!(counts.total(), 5);
        assert!(counts.to_string().contains("merge 4"));
    }
}
