/*!
 * Metrics Sampler
 * Point-in-time host-wide CPU and memory figures
 */

use crate::core::errors::WardenError;
use crate::core::limits::MIN_CPU_SAMPLE_INTERVAL;
use crate::core::types::Result;
use crate::platform::{CoreTimes, CounterSource};
use crate::reporter::{ErrorKind, ErrorReporter, Provenance};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Host-wide counters as of the most recent query
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SystemMetrics {
    /// Fixed at sampler initialization
    pub num_cores: u32,
    pub total_memory: u64,
    pub used_memory: u64,
    /// Aggregate utilization in percent; meaningful only once
    /// `MIN_CPU_SAMPLE_INTERVAL` has elapsed between samples
    pub cpu_usage: f32,
}

/// Wraps the counter capability; values are refreshed per query, not
/// continuously. The subscriptions live as long as the sampler and are
/// torn down together with it.
pub struct MetricsSampler {
    counters: Arc<dyn CounterSource>,
    reporter: Arc<ErrorReporter>,
    num_cores: u32,
    cpu: Mutex<CpuTracker>,
}

struct CpuTracker {
    sampled_at: Instant,
    times: Vec<CoreTimes>,
    aggregate_pct: f32,
    per_core_pct: Vec<f32>,
}

impl MetricsSampler {
    /// Establish counter subscriptions; fails when they are unavailable,
    /// leaving metrics absent
    pub fn new(counters: Arc<dyn CounterSource>, reporter: Arc<ErrorReporter>) -> Result<Self> {
        let num_cores = counters
            .num_cores()
            .map_err(WardenError::CountersUnavailable)?;
        let times = counters
            .cpu_times()
            .map_err(WardenError::CountersUnavailable)?;
        let per_core_pct = vec![0.0; times.len()];
        Ok(Self {
            counters,
            reporter,
            num_cores,
            cpu: Mutex::new(CpuTracker {
                sampled_at: Instant::now(),
                times,
                aggregate_pct: 0.0,
                per_core_pct,
            }),
        })
    }

    /// Refresh and return the current figures
    ///
    /// CPU utilization is derived from cumulative-time deltas; queries
    /// inside the minimum interval return the previous figure unchanged.
    pub fn sample(&self) -> Result<SystemMetrics> {
        let origin = Provenance::new(module_path!(), "sample");
        let memory = match self.counters.memory() {
            Ok(memory) => memory,
            Err(err) => {
                self.reporter.push(
                    ErrorKind::Internal,
                    origin,
                    format!("memory counters failed: {err}"),
                );
                return Err(err.into());
            }
        };

        let mut tracker = self.cpu.lock();
        if tracker.sampled_at.elapsed() >= MIN_CPU_SAMPLE_INTERVAL {
            match self.counters.cpu_times() {
                Ok(times) => tracker.advance(times),
                Err(err) => {
                    self.reporter.push(
                        ErrorKind::Internal,
                        origin,
                        format!("cpu counters failed: {err}"),
                    );
                    return Err(err.into());
                }
            }
        }
        trace!(
            aggregate = tracker.aggregate_pct,
            per_core = ?tracker.per_core_pct,
            "cpu sampled"
        );

        Ok(SystemMetrics {
            num_cores: self.num_cores,
            total_memory: memory.total,
            used_memory: memory.used,
            cpu_usage: tracker.aggregate_pct,
        })
    }

    #[cfg(test)]
    fn backdate_last_sample(&self, by: std::time::Duration) {
        let mut tracker = self.cpu.lock();
        tracker.sampled_at = Instant::now() - by;
    }
}

impl CpuTracker {
    fn advance(&mut self, times: Vec<CoreTimes>) {
        let mut busy_sum = 0u64;
        let mut total_sum = 0u64;
        let mut per_core_pct = Vec::with_capacity(times.len());
        for (now, prev) in times.iter().zip(self.times.iter()) {
            let busy = now.busy.saturating_sub(prev.busy);
            let total = now.total.saturating_sub(prev.total);
            busy_sum += busy;
            total_sum += total;
            per_core_pct.push(if total == 0 {
                0.0
            } else {
                busy as f32 / total as f32 * 100.0
            });
        }
        if total_sum > 0 {
            self.aggregate_pct = busy_sum as f32 / total_sum as f32 * 100.0;
            self.per_core_pct = per_core_pct;
        }
        self.times = times;
        self.sampled_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::PlatformError;
    use crate::platform::{MemoryCounters, MockCounterSource};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn counters_with_times(runs: Vec<Vec<CoreTimes>>) -> MockCounterSource {
        let mut counters = MockCounterSource::new();
        counters.expect_num_cores().returning(|| Ok(2));
        counters.expect_memory().returning(|| {
            Ok(MemoryCounters {
                total: 1000,
                used: 400,
            })
        });
        let mut runs = runs.into_iter();
        counters
            .expect_cpu_times()
            .returning(move || Ok(runs.next().expect("unexpected extra cpu sample")));
        counters
    }

    fn times(pairs: &[(u64, u64)]) -> Vec<CoreTimes> {
        pairs
            .iter()
            .map(|&(busy, total)| CoreTimes { busy, total })
            .collect()
    }

    #[test]
    fn test_init_fails_when_counters_unavailable() {
        let mut counters = MockCounterSource::new();
        counters.expect_num_cores().returning(|| {
            Err(PlatformError::Syscall {
                op: "read stat",
                detail: "gone".into(),
            })
        });
        let result = MetricsSampler::new(Arc::new(counters), Arc::new(ErrorReporter::new()));
        assert!(matches!(result, Err(WardenError::CountersUnavailable(_))));
    }

    #[test]
    fn test_core_count_fixed_at_init() {
        let counters = counters_with_times(vec![times(&[(0, 0), (0, 0)])]);
        let sampler =
            MetricsSampler::new(Arc::new(counters), Arc::new(ErrorReporter::new())).unwrap();
        assert_eq!(sampler.num_cores, 2);
    }

    #[test]
    fn test_sample_within_interval_reuses_previous_figure() {
        let counters = counters_with_times(vec![times(&[(0, 0), (0, 0)])]);
        let sampler =
            MetricsSampler::new(Arc::new(counters), Arc::new(ErrorReporter::new())).unwrap();

        // Immediately after init the previous figure is the primed zero;
        // the mock would panic if a second cpu_times read happened
        let metrics = sampler.sample().unwrap();
        assert_eq!(metrics.cpu_usage, 0.0);
        assert_eq!(metrics.total_memory, 1000);
        assert_eq!(metrics.used_memory, 400);
    }

    #[test]
    fn test_cpu_usage_from_deltas() {
        let counters = counters_with_times(vec![
            times(&[(100, 1000), (100, 1000)]),
            times(&[(200, 1100), (150, 1100)]),
        ]);
        let sampler =
            MetricsSampler::new(Arc::new(counters), Arc::new(ErrorReporter::new())).unwrap();
        sampler.backdate_last_sample(MIN_CPU_SAMPLE_INTERVAL + Duration::from_millis(10));

        let metrics = sampler.sample().unwrap();
        // 150 busy ticks over 200 total ticks
        assert!((metrics.cpu_usage - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_memory_failure_reported_and_returned() {
        let mut counters = MockCounterSource::new();
        counters.expect_num_cores().returning(|| Ok(1));
        counters
            .expect_cpu_times()
            .returning(|| Ok(vec![CoreTimes::default()]));
        counters.expect_memory().returning(|| {
            Err(PlatformError::Syscall {
                op: "read meminfo",
                detail: "gone".into(),
            })
        });
        let reporter = Arc::new(ErrorReporter::new());
        let sampler = MetricsSampler::new(Arc::new(counters), Arc::clone(&reporter)).unwrap();

        assert!(sampler.sample().is_err());
        assert_eq!(reporter.pop().unwrap().kind, ErrorKind::Internal);
    }
}
