//! Collection-and-emission pass: one cycle per invocation, per-module
//! failure isolation.
//!
//! The supervision loop depends only on the [`CheckModule`] and [`Emitter`]
//! traits; how modules are discovered is the registries' concern
//! ([`checks`], [`emitter`]).

pub mod checks;
pub mod emitter;
pub mod identity;

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::core::errors::Result;
use crate::logger::{ActivityEvent, ActivityLoggerHandle};

/// One pluggable collection module, producing named metric values per cycle.
pub trait CheckModule: Send {
    /// Stable identifier, used in logs and registry lookups.
    fn name(&self) -> &str;

    /// Collect this module's metrics for the current cycle.
    fn collect(&mut self) -> Result<BTreeMap<String, f64>>;
}

/// One emission target receiving the merged payload each cycle.
pub trait Emitter: Send {
    /// Stable identifier, used in logs and registry lookups.
    fn name(&self) -> &str;

    /// Deliver one payload.
    fn emit(&mut self, payload: &MetricPayload) -> Result<()>;
}

/// Merged snapshot handed to every emitter once per cycle.
#[derive(Debug, Clone, Serialize)]
pub struct MetricPayload {
    /// Identity of the collecting host.
    pub host: String,
    /// Collection time (RFC 3339).
    pub collected_at: String,
    /// Metric name → value, merged across all modules.
    pub metrics: BTreeMap<String, f64>,
}

/// Outcome of one cycle. Failed modules are counted, never fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Modules invoked this cycle.
    pub checks_run: usize,
    /// Modules whose collection failed and was isolated.
    pub checks_failed: usize,
    /// Distinct metrics in the merged payload.
    pub metrics_collected: usize,
    /// Emitters whose delivery failed and was isolated.
    pub emitters_failed: usize,
    /// Wall-clock duration of the cycle.
    pub duration_ms: u64,
}

/// Drives one collection-and-emission pass per [`Collector::run_cycle`] call.
pub struct Collector {
    host: String,
    logger: ActivityLoggerHandle,
}

impl Collector {
    /// Create a collector stamping payloads with the given host identity.
    #[must_use]
    pub fn new(host: String, logger: ActivityLoggerHandle) -> Self {
        Self { host, logger }
    }

    /// Run one full cycle: collect from every module, merge, emit to every
    /// target.
    ///
    /// A failing module is logged and skipped so one misbehaving check never
    /// aborts the cycle; likewise for emitters. Only failures outside the
    /// per-module scope (none in the current implementation) would escape as
    /// an `Err`, and the supervision loop deliberately lets those crash the
    /// process.
    #[allow(clippy::unnecessary_wraps)] // the Err path is the loop's crash contract
    pub fn run_cycle(
        &mut self,
        checks: &mut [Box<dyn CheckModule>],
        emitters: &mut [Box<dyn Emitter>],
    ) -> Result<CycleSummary> {
        let cycle_start = Instant::now();
        let mut summary = CycleSummary::default();
        let mut metrics = BTreeMap::new();

        for check in checks.iter_mut() {
            summary.checks_run += 1;
            match check.collect() {
                Ok(values) => metrics.extend(values),
                Err(err) => {
                    summary.checks_failed += 1;
                    self.logger.send(ActivityEvent::CheckFailed {
                        check: check.name().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
        summary.metrics_collected = metrics.len();

        let payload = MetricPayload {
            host: self.host.clone(),
            collected_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            metrics,
        };

        for emitter in emitters.iter_mut() {
            if let Err(err) = emitter.emit(&payload) {
                summary.emitters_failed += 1;
                self.logger.send(ActivityEvent::EmitterFailed {
                    emitter: emitter.name().to_string(),
                    error: err.to_string(),
                });
            }
        }

        summary.duration_ms = u64::try_from(cycle_start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(summary)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{CapturingEmitter, CountingCheck, FailingCheck, FailingEmitter};
    use super::{CheckModule, Collector, Emitter};
    use crate::logger::{LoggerConfig, spawn_logger};
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn test_collector(dir: &std::path::Path) -> Collector {
        let (logger, _join) =
            spawn_logger(LoggerConfig::new(dir.join("activity.jsonl"), false)).unwrap();
        Collector::new("test-host".to_string(), logger)
    }

    #[test]
    fn cycle_merges_metrics_across_modules() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = test_collector(dir.path());

        let mut checks: Vec<Box<dyn CheckModule>> = vec![
            Box::new(CountingCheck {
                name: "alpha".to_string(),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(CountingCheck {
                name: "beta".to_string(),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        ];
        let mut emitters: Vec<Box<dyn Emitter>> = vec![Box::new(CapturingEmitter::default())];

        let summary = collector.run_cycle(&mut checks, &mut emitters).unwrap();
        assert_eq!(summary.checks_run, 2);
        assert_eq!(summary.checks_failed, 0);
        assert_eq!(summary.metrics_collected, 2);
        assert_eq!(summary.emitters_failed, 0);
    }

    #[test]
    fn failing_check_does_not_abort_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = test_collector(dir.path());

        let calls = Arc::new(AtomicUsize::new(0));
        let mut checks: Vec<Box<dyn CheckModule>> = vec![
            Box::new(FailingCheck),
            Box::new(CountingCheck {
                name: "survivor".to_string(),
                calls: Arc::clone(&calls),
            }),
        ];
        let mut emitters: Vec<Box<dyn Emitter>> = vec![Box::new(CapturingEmitter::default())];

        let summary = collector.run_cycle(&mut checks, &mut emitters).unwrap();
        assert_eq!(summary.checks_run, 2);
        assert_eq!(summary.checks_failed, 1);
        // The surviving module still collected and its metric was emitted.
        assert_eq!(summary.metrics_collected, 1);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_emitter_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = test_collector(dir.path());

        let mut checks: Vec<Box<dyn CheckModule>> = vec![Box::new(CountingCheck {
            name: "gamma".to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        })];
        let mut emitters: Vec<Box<dyn Emitter>> = vec![
            Box::new(FailingEmitter),
            Box::new(CapturingEmitter::default()),
        ];

        let summary = collector.run_cycle(&mut checks, &mut emitters).unwrap();
        assert_eq!(summary.emitters_failed, 1);
    }

    #[test]
    fn payload_carries_host_identity_and_merged_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = test_collector(dir.path());

        let mut checks: Vec<Box<dyn CheckModule>> = vec![Box::new(CountingCheck {
            name: "delta".to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        })];
        let (capturing, payloads) = CapturingEmitter::shared();
        let mut emitters: Vec<Box<dyn Emitter>> = vec![Box::new(capturing)];

        collector.run_cycle(&mut checks, &mut emitters).unwrap();
        collector.run_cycle(&mut checks, &mut emitters).unwrap();

        let seen = payloads.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|p| p.host == "test-host"));
        // Second cycle re-collected: the counting check reports 2.0.
        assert_eq!(seen[1].metrics.get("delta"), Some(&2.0));
    }
}
