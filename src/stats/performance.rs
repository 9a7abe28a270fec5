//! Per-command count and timing-percentile sink (spec.md §2 component L,
//! §6 `performanceStorage`). Observes the correlator and OCPP service
//! layer; the actual storage backend (file, remote sink) is an external
//! collaborator per spec.md §1 — this module only aggregates in memory
//! and exposes a snapshot.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CommandStats {
    pub count: u64,
    pub errors: u64,
    durations_ms: Vec<u64>,
}

impl CommandStats {
    fn record(&mut self, duration: Duration, success: bool) {
        self.count += 1;
        if !success {
            self.errors += 1;
        }
        self.durations_ms.push(duration.as_millis() as u64);
    }

    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.durations_ms.is_empty() {
            return None;
        }
        let mut sorted = self.durations_ms.clone();
        sorted.sort_unstable();
        let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted.get(idx.min(sorted.len() - 1)).copied()
    }
}

/// Process-local (station-scoped) performance sink. Enabled per template
/// via `enableStatistics`; when disabled, callers simply skip `record`.
#[derive(Default)]
pub struct PerformanceSink {
    by_action: Mutex<HashMap<String, CommandStats>>,
}

impl PerformanceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, action: &str, duration: Duration, success: bool) {
        let mut guard = self.by_action.lock().expect("performance sink mutex poisoned");
        guard.entry(action.to_string()).or_default().record(duration, success);
    }

    pub fn snapshot(&self) -> HashMap<String, CommandStats> {
        self.by_action.lock().expect("performance sink mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_count_and_errors_per_action() {
        let sink = PerformanceSink::new();
        sink.record("Heartbeat", Duration::from_millis(5), true);
        sink.record("Heartbeat", Duration::from_millis(15), false);
        let snapshot = sink.snapshot();
        let stats = &snapshot["Heartbeat"];
        assert_eq!(stats.count, 2);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn percentile_on_single_sample_returns_that_value() {
        let sink = PerformanceSink::new();
        sink.record("Heartbeat", Duration::from_millis(42), true);
        let snapshot = sink.snapshot();
        assert_eq!(snapshot["Heartbeat"].percentile(95.0), Some(42));
    }
}
