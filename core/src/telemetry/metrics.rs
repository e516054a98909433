use serde::Serialize;
use std::sync::Mutex;

/// Unit outcome counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl MetricsSnapshot {
    pub fn total(&self) -> usize {
        self.completed + self.skipped + self.failed + self.timed_out
    }
}

pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_completed(&self) {
        self.update(|metrics| metrics.completed += 1);
    }

    pub fn record_skipped(&self) {
        self.update(|metrics| metrics.skipped += 1);
    }

    pub fn record_failed(&self) {
        self.update(|metrics| metrics.failed += 1);
    }

    pub fn record_timed_out(&self) {
        self.update(|metrics| metrics.timed_out += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }

    fn update<F: FnOnce(&mut MetricsSnapshot)>(&self, apply: F) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_each_outcome() {
        let recorder = MetricsRecorder::new();
        recorder.record_completed();
        recorder.record_completed();
        recorder.record_skipped();
        recorder.record_timed_out();

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.failed, 0);
        assert_eq!(snapshot.total(), 4);
    }
}
