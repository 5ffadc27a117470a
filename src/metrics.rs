// src/metrics.rs

//! Performance metrics collection and reporting.
//!
//! [`MetricsCollector`] accumulates counters and timings across batches,
//! strategies, and individual queries, and exposes the system state the
//! batch scheduler uses for adaptive sizing. It is a passive recorder:
//! the shrink/grow policy lives in [`crate::pipeline::batch`].
//!
//! All state sits behind one mutex so the collector can be shared across
//! concurrently processed queries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use crate::config::ConfigManager;
use crate::error::Result;
use crate::models::{
    CounterKind, CounterSet, PerformanceStats, QueryStats, StrategyStats, SystemState,
};
use crate::utils::ring::RingBuffer;

/// Number of recent response-time samples kept for the rolling average.
const RESPONSE_WINDOW: usize = 100;

/// Accumulates performance counters and timings for a crawl run.
///
/// Monitoring settings are read from the injected config manager on every
/// report check, so administrative updates take effect immediately.
pub struct MetricsCollector {
    config: Arc<ConfigManager>,
    inner: Mutex<Inner>,
}

struct Inner {
    counters: CounterSet,
    processing_time_ms: u64,
    wait_time_ms: u64,
    response_times: RingBuffer<u64>,
    timed_requests: u64,
    blocked_requests: u64,
    strategies: HashMap<String, StrategyStats>,
    queries: HashMap<String, QueryStats>,
    system_state: SystemState,
    last_report: Instant,
}

impl Inner {
    fn fresh() -> Self {
        Self {
            counters: CounterSet::default(),
            processing_time_ms: 0,
            wait_time_ms: 0,
            response_times: RingBuffer::new(RESPONSE_WINDOW),
            timed_requests: 0,
            blocked_requests: 0,
            strategies: HashMap::new(),
            queries: HashMap::new(),
            system_state: SystemState::default(),
            last_report: Instant::now(),
        }
    }

    fn avg_response_ms(&self) -> f64 {
        if self.response_times.is_empty() {
            0.0
        } else {
            let sum: u64 = self.response_times.iter().sum();
            sum as f64 / self.response_times.len() as f64
        }
    }

    fn block_rate(&self) -> f64 {
        if self.timed_requests == 0 {
            0.0
        } else {
            100.0 * self.blocked_requests as f64 / self.timed_requests as f64
        }
    }

    fn processing_efficiency(&self) -> f64 {
        let total = self.processing_time_ms + self.wait_time_ms;
        if total == 0 {
            0.0
        } else {
            100.0 * self.processing_time_ms as f64 / total as f64
        }
    }
}

impl MetricsCollector {
    pub fn new(config: Arc<ConfigManager>) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::fresh()),
        }
    }

    /// Record an attempt outcome in one of the six counter categories.
    pub fn record_counter(&self, kind: CounterKind, success: bool) {
        self.lock().counters.get_mut(kind).record(success);
    }

    /// Begin timing a request. The returned instant is passed back to
    /// [`record_request_success`](Self::record_request_success) or
    /// [`record_request_failure`](Self::record_request_failure).
    pub fn record_request_start(&self, key: &str, strategy: &str) -> Instant {
        log::debug!("Request start: query='{}' strategy='{}'", key, strategy);
        Instant::now()
    }

    /// Close timing for a successful request.
    pub fn record_request_success(&self, key: &str, strategy: &str, start: Instant) {
        self.close_request(key, strategy, start, true, None);
    }

    /// Close timing for a failed request.
    ///
    /// Errors carrying an HTTP 403 / "Forbidden" signal are additionally
    /// counted as blocked requests.
    pub fn record_request_failure(&self, key: &str, strategy: &str, start: Instant, error: &str) {
        let blocked = is_blocked_error(error);
        self.close_request(key, strategy, start, false, Some(blocked));
        if blocked {
            log::warn!("Blocked request detected for strategy '{}': {}", strategy, error);
        }
    }

    fn close_request(
        &self,
        key: &str,
        strategy: &str,
        start: Instant,
        success: bool,
        blocked: Option<bool>,
    ) {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let mut inner = self.lock();

        inner.counters.time.record(success);
        inner.response_times.push(elapsed_ms);
        inner.timed_requests += 1;
        inner.processing_time_ms += elapsed_ms;
        if blocked == Some(true) {
            inner.blocked_requests += 1;
        }

        let strategy_stats = inner.strategies.entry(strategy.to_string()).or_default();
        strategy_stats.counter.record(success);
        strategy_stats.total_time_ms += elapsed_ms;
        if blocked == Some(true) {
            strategy_stats.blocked += 1;
        }

        let query_stats = inner.queries.entry(key.to_string()).or_default();
        query_stats.counter.record(success);
        query_stats.last_strategy = Some(strategy.to_string());
    }

    /// Accumulate deliberate wait time (backoff, inter-batch sleeps).
    pub fn record_wait(&self, duration: Duration) {
        self.lock().wait_time_ms += duration.as_millis() as u64;
    }

    /// Record batch-control state. The collector does not decide sizing;
    /// it only exposes this for reports and the next scheduling decision.
    pub fn update_system_stats(
        &self,
        consecutive_failures: u32,
        current_batch_size: usize,
        max_consecutive_failures: u32,
    ) {
        let mut inner = self.lock();
        inner.system_state = SystemState {
            consecutive_failures,
            current_batch_size,
            max_consecutive_failures,
        };
    }

    /// Snapshot of everything tracked so far.
    pub fn get_stats(&self) -> PerformanceStats {
        let inner = self.lock();
        PerformanceStats {
            counters: inner.counters,
            processing_time_ms: inner.processing_time_ms,
            wait_time_ms: inner.wait_time_ms,
            avg_response_ms: inner.avg_response_ms(),
            blocked_requests: inner.blocked_requests,
            block_rate: inner.block_rate(),
            success_rate: inner.counters.individual.success_rate(),
            processing_efficiency: inner.processing_efficiency(),
            system_state: inner.system_state,
            strategies: inner.strategies.clone(),
            queries: inner.queries.clone(),
        }
    }

    /// Print a report if real-time monitoring is enabled and the
    /// configured interval has elapsed since the last one. Returns whether
    /// a report was printed.
    pub fn check_report_interval(&self) -> bool {
        let monitoring = self.config.get_config().monitoring;
        if !monitoring.enable_real_time {
            return false;
        }

        let due = {
            let mut inner = self.lock();
            let interval = Duration::from_millis(monitoring.report_interval_ms);
            if inner.last_report.elapsed() >= interval {
                inner.last_report = Instant::now();
                true
            } else {
                false
            }
        };

        if due {
            for line in self.generate_performance_report().lines() {
                log::info!("{}", line);
            }
        }
        due
    }

    /// Human-readable multi-line summary of the current stats.
    pub fn generate_performance_report(&self) -> String {
        let stats = self.get_stats();
        let mut report = String::new();
        let border = "─".repeat(50);

        report.push_str(&format!("{border}\n"));
        report.push_str("  Crawl Performance Report\n");
        report.push_str(&format!("{border}\n"));
        report.push_str(&format!(
            "  Queries:      {}/{} succeeded ({:.1}%)\n",
            stats.counters.individual.total_successes,
            stats.counters.individual.total_attempts,
            stats.counters.individual.success_rate()
        ));
        report.push_str(&format!(
            "  Batches:      {}/{} succeeded ({:.1}%)\n",
            stats.counters.batch.total_successes,
            stats.counters.batch.total_attempts,
            stats.counters.batch.success_rate()
        ));
        report.push_str(&format!(
            "  Fallbacks:    {} runs, {} resolved\n",
            stats.counters.fallback.total_attempts, stats.counters.fallback.total_successes
        ));
        report.push_str(&format!(
            "  Retries:      {} attempts\n",
            stats.counters.retry.total_attempts
        ));
        report.push_str(&format!(
            "  Avg response: {:.0} ms (last {} samples)\n",
            stats.avg_response_ms, RESPONSE_WINDOW
        ));
        report.push_str(&format!(
            "  Blocked:      {} requests ({:.1}%)\n",
            stats.blocked_requests, stats.block_rate
        ));
        report.push_str(&format!(
            "  Time:         {} ms processing, {} ms waiting ({:.1}% efficient)\n",
            stats.processing_time_ms, stats.wait_time_ms, stats.processing_efficiency
        ));
        report.push_str(&format!(
            "  Batch size:   {} (consecutive failures: {}/{})\n",
            stats.system_state.current_batch_size,
            stats.system_state.consecutive_failures,
            stats.system_state.max_consecutive_failures
        ));

        if !stats.strategies.is_empty() {
            report.push_str("  Strategies:\n");
            let mut names: Vec<_> = stats.strategies.keys().collect();
            names.sort();
            for name in names {
                let s = &stats.strategies[name];
                report.push_str(&format!(
                    "    {:<16} {}/{} ({:.1}%), avg {:.0} ms, {} blocked\n",
                    name,
                    s.counter.total_successes,
                    s.counter.total_attempts,
                    s.counter.success_rate(),
                    s.avg_response_ms(),
                    s.blocked
                ));
            }
        }

        report.push_str(&format!("{border}"));
        report
    }

    /// JSON serialization of the full stats snapshot for external
    /// persistence or telemetry.
    pub fn export_metrics(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Export {
            exported_at: String,
            stats: PerformanceStats,
        }

        let export = Export {
            exported_at: Utc::now().to_rfc3339(),
            stats: self.get_stats(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Zero all counters, timers, and per-strategy/query maps.
    pub fn reset(&self) {
        *self.lock() = Inner::fresh();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("metrics lock poisoned")
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(Arc::new(ConfigManager::default()))
    }
}

/// Whether an error message indicates the source actively rejected the
/// request, as opposed to a timeout or parse failure.
fn is_blocked_error(error: &str) -> bool {
    error.contains("403") || error.to_lowercase().contains("forbidden")
}
