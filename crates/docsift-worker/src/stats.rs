//! Process-lifetime processing statistics.

use crate::pipeline::MessageOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Counters updated as messages finish. Lives inside the pool state lock.
#[derive(Debug, Clone)]
pub struct Statistics {
    processed: u64,
    succeeded: u64,
    failed: u64,
    skipped: u64,
    interrupted: u64,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Point-in-time view of [`Statistics`], logged at shutdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub interrupted: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: f64,
    /// Percent of processed messages that succeeded.
    pub success_rate: f64,
    pub throughput_per_hour: f64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            interrupted: 0,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Count a finished message. Interrupted messages are not "processed".
    pub fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Success { .. } => {
                self.processed += 1;
                self.succeeded += 1;
            }
            MessageOutcome::Skipped(_) => {
                self.processed += 1;
                self.skipped += 1;
            }
            MessageOutcome::Retry(_) | MessageOutcome::Dropped(_) => {
                self.processed += 1;
                self.failed += 1;
            }
            MessageOutcome::Cancelled(_) => self.interrupted += 1,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_after(self.started.elapsed())
    }

    fn snapshot_after(&self, uptime: Duration) -> StatsSnapshot {
        let success_rate = if self.processed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.processed as f64 * 100.0
        };
        let hours = uptime.as_secs_f64() / 3600.0;
        let throughput_per_hour = if hours > 0.0 {
            self.processed as f64 / hours
        } else {
            0.0
        };

        StatsSnapshot {
            processed: self.processed,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            interrupted: self.interrupted,
            started_at: self.started_at,
            uptime_seconds: uptime.as_secs_f64(),
            success_rate,
            throughput_per_hour,
        }
    }
}

impl StatsSnapshot {
    /// Emit the final report as one structured event.
    pub fn log_report(&self) {
        tracing::info!(
            processed = self.processed,
            succeeded = self.succeeded,
            failed = self.failed,
            skipped = self.skipped,
            interrupted = self.interrupted,
            success_rate = format!("{:.1}", self.success_rate),
            throughput_per_hour = format!("{:.1}", self.throughput_per_hour),
            uptime_seconds = self.uptime_seconds,
            "Processing statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;
    use docsift_core::PipelineError;

    #[test]
    fn empty_statistics_have_zero_rates() {
        let snapshot = Statistics::new().snapshot_after(Duration::ZERO);
        assert_eq!(snapshot.processed, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.throughput_per_hour, 0.0);
    }

    #[test]
    fn outcomes_map_to_counters() {
        let mut stats = Statistics::new();
        stats.record(&MessageOutcome::Success { indexed: true });
        stats.record(&MessageOutcome::Success { indexed: false });
        stats.record(&MessageOutcome::Skipped("zip".to_string()));
        stats.record(&MessageOutcome::Retry(PipelineError::DownloadFailed(
            "timeout".to_string(),
        )));
        stats.record(&MessageOutcome::Cancelled(Stage::Downloaded));

        let snapshot = stats.snapshot_after(Duration::from_secs(1800));
        assert_eq!(snapshot.processed, 4);
        assert_eq!(snapshot.succeeded, 2);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.interrupted, 1);
        assert_eq!(snapshot.success_rate, 50.0);
        assert_eq!(snapshot.throughput_per_hour, 8.0);
    }
}
