//! Performance statistics snapshot types.
//!
//! These are plain data produced by [`crate::metrics::MetricsCollector`];
//! the collector owns all mutation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Attempt/success pair with a zero-safe derived rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub total_attempts: u64,
    pub total_successes: u64,
}

impl Counter {
    /// Success percentage; 0 when no attempts have been recorded.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            100.0 * self.total_successes as f64 / self.total_attempts as f64
        }
    }

    pub fn record(&mut self, success: bool) {
        self.total_attempts += 1;
        if success {
            self.total_successes += 1;
        }
    }
}

/// The six independent counter categories tracked across a crawl run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterSet {
    /// Whole-batch outcomes
    pub batch: Counter,
    /// Individual query outcomes
    pub individual: Counter,
    /// Fallback orchestration runs
    pub fallback: Counter,
    /// Timed request completions
    pub time: Counter,
    /// Retry attempts
    pub retry: Counter,
    /// Strategy reordering optimizations
    pub optimization: Counter,
}

/// Category selector for [`CounterSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    Batch,
    Individual,
    Fallback,
    Time,
    Retry,
    Optimization,
}

impl CounterSet {
    pub fn get_mut(&mut self, kind: CounterKind) -> &mut Counter {
        match kind {
            CounterKind::Batch => &mut self.batch,
            CounterKind::Individual => &mut self.individual,
            CounterKind::Fallback => &mut self.fallback,
            CounterKind::Time => &mut self.time,
            CounterKind::Retry => &mut self.retry,
            CounterKind::Optimization => &mut self.optimization,
        }
    }

    pub fn get(&self, kind: CounterKind) -> Counter {
        match kind {
            CounterKind::Batch => self.batch,
            CounterKind::Individual => self.individual,
            CounterKind::Fallback => self.fallback,
            CounterKind::Time => self.time,
            CounterKind::Retry => self.retry,
            CounterKind::Optimization => self.optimization,
        }
    }
}

/// Batch-control state written by the scheduler, read by reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub consecutive_failures: u32,
    pub current_batch_size: usize,
    pub max_consecutive_failures: u32,
}

/// Per-strategy aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub counter: Counter,
    pub total_time_ms: u64,
    pub blocked: u64,
}

impl StrategyStats {
    /// Mean response time across recorded completions.
    pub fn avg_response_ms(&self) -> f64 {
        if self.counter.total_attempts == 0 {
            0.0
        } else {
            self.total_time_ms as f64 / self.counter.total_attempts as f64
        }
    }
}

/// Per-query aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub counter: Counter,
    /// Strategy that produced the most recent outcome for this query
    pub last_strategy: Option<String>,
}

/// Point-in-time snapshot of everything the collector tracks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceStats {
    pub counters: CounterSet,
    pub processing_time_ms: u64,
    pub wait_time_ms: u64,
    pub avg_response_ms: f64,
    pub blocked_requests: u64,
    pub block_rate: f64,
    pub success_rate: f64,
    pub processing_efficiency: f64,
    pub system_state: SystemState,
    pub strategies: HashMap<String, StrategyStats>,
    pub queries: HashMap<String, QueryStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_zero_safe() {
        assert_eq!(Counter::default().success_rate(), 0.0);
    }

    #[test]
    fn test_success_rate() {
        let mut counter = Counter::default();
        for _ in 0..5 {
            counter.record(false);
        }
        counter.record(true);
        let rate = counter.success_rate();
        assert!((rate - 100.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_counter_set_access() {
        let mut set = CounterSet::default();
        set.get_mut(CounterKind::Retry).record(true);
        assert_eq!(set.retry.total_attempts, 1);
        assert_eq!(set.get(CounterKind::Retry).total_successes, 1);
        assert_eq!(set.batch.total_attempts, 0);
    }

    #[test]
    fn test_avg_response_zero_safe() {
        assert_eq!(StrategyStats::default().avg_response_ms(), 0.0);
    }
}
