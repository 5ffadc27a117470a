// src/pipeline/fallback.rs

//! Ranked multi-strategy fallback orchestration.
//!
//! Holds an ordered list of named source strategies and, per query, runs
//! them in priority order through the retry executor until one yields an
//! acceptable record or all are exhausted. Orchestrator-level failures are
//! reported as result values, never thrown: a batch of N queries always
//! yields exactly N [`FallbackResult`]s.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ConfigManager;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::models::{CounterKind, CrawlConfig, GymRecord, Query};
use crate::pipeline::retry::{RetryExecutor, RetryPolicy};
use crate::utils::ring::RingBuffer;

/// Capacity of the per-query execution history.
const HISTORY_CAPACITY: usize = 10;

/// Minimum confidence for an orchestrator to accept a returned record.
const ACCEPT_CONFIDENCE: f64 = 0.1;

/// Failure tag when no registered strategy is available.
pub const NO_AVAILABLE_STRATEGIES: &str = "no_available_strategies";

/// Failure tag when every available strategy was exhausted.
pub const ALL_STRATEGIES_FAILED: &str = "all_strategies_failed";

/// A named, prioritized data-source adapter.
///
/// Adapters do not need to retry internally; retry is provided by the
/// orchestrator. `execute` may return `Ok(None)` for a clean miss.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Unique strategy name.
    fn name(&self) -> &str;

    /// Lower priority is tried first.
    fn priority(&self) -> i32;

    /// Whether the strategy is currently usable.
    fn is_available(&self) -> bool {
        true
    }

    /// Attempt to produce a record for the query.
    async fn execute(&self, query: &Query) -> Result<Option<GymRecord>>;
}

/// Outcome of one orchestration run for one query. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackResult {
    pub success: bool,
    pub record: Option<GymRecord>,
    /// Name of the strategy that produced the record; empty on failure
    pub strategy_name: String,
    /// Number of strategies tried in this run
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl FallbackResult {
    fn success(record: GymRecord, strategy: &str, attempts: u32, elapsed_ms: u64) -> Self {
        Self {
            success: true,
            record: Some(record),
            strategy_name: strategy.to_string(),
            attempts,
            elapsed_ms,
            error: None,
        }
    }

    fn failure(tag: &str, attempts: u32, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            record: None,
            strategy_name: String::new(),
            attempts,
            elapsed_ms,
            error: Some(tag.to_string()),
        }
    }
}

/// Drives prioritized strategies with retry, validation, and history.
pub struct FallbackOrchestrator {
    /// Sorted ascending by priority; rebuilt and swapped on reorder
    strategies: RwLock<Arc<Vec<Arc<dyn Strategy>>>>,
    /// Operational availability overrides by strategy name
    overrides: Mutex<HashMap<String, bool>>,
    /// Per-query-key ring buffers of past results
    history: Mutex<HashMap<String, RingBuffer<FallbackResult>>>,
    retry: RetryExecutor,
    config: Arc<ConfigManager>,
    metrics: Arc<MetricsCollector>,
}

impl FallbackOrchestrator {
    /// Register the fixed strategy set. Strategies are sorted by ascending
    /// priority; ties keep registration order.
    pub fn new(
        strategies: Vec<Arc<dyn Strategy>>,
        config: Arc<ConfigManager>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let mut sorted = strategies;
        sorted.sort_by_key(|s| s.priority());

        let retry = RetryExecutor::new(RetryPolicy::from_config(&config.get_config()));
        Self {
            strategies: RwLock::new(Arc::new(sorted)),
            overrides: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            retry,
            config,
            metrics,
        }
    }

    /// Run the fallback chain for one query.
    ///
    /// `context` namespaces the retry backoff bookkeeping, so the same
    /// strategy failing for unrelated callers escalates independently.
    /// Never returns an error; failures surface as `success == false`.
    pub async fn execute_fallback(&self, query: &Query, context: &str) -> FallbackResult {
        let started = Instant::now();
        let config = self.config.get_config();
        let key = query.key();

        let available = self.available_strategies();
        if available.is_empty() {
            log::warn!("No available strategies for query '{}'", key);
            let result = FallbackResult::failure(
                NO_AVAILABLE_STRATEGIES,
                0,
                started.elapsed().as_millis() as u64,
            );
            self.metrics.record_counter(CounterKind::Fallback, false);
            self.push_history(&key, result.clone());
            return result;
        }

        // With fallback disabled only the top-priority strategy is tried.
        let candidates: &[Arc<dyn Strategy>] = if config.fallback.enabled {
            &available
        } else {
            &available[..1]
        };

        for (index, strategy) in candidates.iter().enumerate() {
            let attempts = index as u32 + 1;
            let name = strategy.name().to_string();

            self.anti_detection_delay(&config).await;

            let start = self.metrics.record_request_start(&key, &name);
            match self.attempt_strategy(strategy, query, context, &config).await {
                Ok(Some(record)) if is_acceptable(&record) => {
                    self.metrics.record_request_success(&key, &name, start);
                    log::info!(
                        "Strategy '{}' resolved '{}' (confidence {:.2}, attempt {}/{})",
                        name,
                        key,
                        record.confidence,
                        attempts,
                        candidates.len()
                    );
                    let result = FallbackResult::success(
                        record,
                        &name,
                        attempts,
                        started.elapsed().as_millis() as u64,
                    );
                    self.metrics.record_counter(CounterKind::Fallback, true);
                    self.push_history(&key, result.clone());
                    return result;
                }
                Ok(maybe_record) => {
                    // Null or below-threshold record counts as a failed
                    // attempt for this strategy, not an orchestrator error.
                    let reason = match maybe_record {
                        Some(r) => format!("record rejected (confidence {:.2})", r.confidence),
                        None => "no record returned".to_string(),
                    };
                    self.metrics.record_request_failure(&key, &name, start, &reason);
                    log::debug!("Strategy '{}' produced nothing usable for '{}': {}", name, key, reason);
                }
                Err(error) => {
                    // Swallowed at the orchestrator boundary after being
                    // attributed to this strategy.
                    let message = error.to_string();
                    self.metrics.record_request_failure(&key, &name, start, &message);
                    log::warn!("Strategy '{}' failed for '{}': {}", name, key, message);
                }
            }
        }

        let result = FallbackResult::failure(
            ALL_STRATEGIES_FAILED,
            candidates.len() as u32,
            started.elapsed().as_millis() as u64,
        );
        self.metrics.record_counter(CounterKind::Fallback, false);
        self.push_history(&key, result.clone());
        result
    }

    /// One retry-wrapped, timeout-bounded strategy invocation.
    async fn attempt_strategy(
        &self,
        strategy: &Arc<dyn Strategy>,
        query: &Query,
        context: &str,
        config: &CrawlConfig,
    ) -> Result<Option<GymRecord>> {
        let retry_key = format!("{}:{}", context, strategy.name());
        let timeout = Duration::from_millis(config.sources.timeout_ms);
        let metrics = Arc::clone(&self.metrics);

        self.retry
            .execute(&retry_key, || {
                let strategy = Arc::clone(strategy);
                let metrics = Arc::clone(&metrics);
                let query = query.clone();
                async move {
                    let outcome = match tokio::time::timeout(timeout, strategy.execute(&query)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(crate::error::AppError::strategy(
                            strategy.name(),
                            format!("timed out after {:?}", timeout),
                        )),
                    };
                    metrics.record_counter(CounterKind::Retry, outcome.is_ok());
                    outcome
                }
            })
            .await
    }

    /// Re-sort strategies by historical success rate, best first.
    ///
    /// Explicit optimization step; not run automatically after every query
    /// to avoid reordering thrash mid-batch. The new list replaces the old
    /// one under the write lock.
    pub fn reorder_strategies_by_success(&self) {
        let rates = self.strategy_success_rates();
        let current = self.strategies.read().expect("strategy lock poisoned").clone();

        let mut reordered: Vec<Arc<dyn Strategy>> = current.as_ref().clone();
        reordered.sort_by(|a, b| {
            let rate_a = rates.get(a.name()).copied().unwrap_or(0.0);
            let rate_b = rates.get(b.name()).copied().unwrap_or(0.0);
            rate_b.partial_cmp(&rate_a).unwrap_or(std::cmp::Ordering::Equal)
        });

        let changed = reordered
            .iter()
            .zip(current.iter())
            .any(|(a, b)| a.name() != b.name());
        self.metrics.record_counter(CounterKind::Optimization, changed);

        if changed {
            log::info!(
                "Reordered strategies by success rate: [{}]",
                reordered
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        *self.strategies.write().expect("strategy lock poisoned") = Arc::new(reordered);
    }

    /// Force-exclude a strategy regardless of its own availability.
    pub fn disable_strategy(&self, name: &str) {
        self.overrides
            .lock()
            .expect("override lock poisoned")
            .insert(name.to_string(), false);
        log::info!("Strategy '{}' disabled", name);
    }

    /// Force-include a strategy regardless of its own availability.
    pub fn enable_strategy(&self, name: &str) {
        self.overrides
            .lock()
            .expect("override lock poisoned")
            .insert(name.to_string(), true);
        log::info!("Strategy '{}' enabled", name);
    }

    /// Past results for a query key, oldest first.
    pub fn history_for(&self, key: &str) -> Vec<FallbackResult> {
        self.history
            .lock()
            .expect("history lock poisoned")
            .get(key)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of currently registered strategies in attempt order.
    pub fn strategy_order(&self) -> Vec<String> {
        self.strategies
            .read()
            .expect("strategy lock poisoned")
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    fn available_strategies(&self) -> Vec<Arc<dyn Strategy>> {
        let overrides = self.overrides.lock().expect("override lock poisoned");
        self.strategies
            .read()
            .expect("strategy lock poisoned")
            .iter()
            .filter(|s| overrides.get(s.name()).copied().unwrap_or_else(|| s.is_available()))
            .cloned()
            .collect()
    }

    /// Success rate per strategy across all recorded history entries.
    fn strategy_success_rates(&self) -> HashMap<String, f64> {
        let history = self.history.lock().expect("history lock poisoned");
        let mut totals: HashMap<String, (u32, u32)> = HashMap::new();

        for buffer in history.values() {
            for result in buffer.iter() {
                if result.strategy_name.is_empty() {
                    continue;
                }
                let entry = totals.entry(result.strategy_name.clone()).or_insert((0, 0));
                entry.0 += 1;
                if result.success {
                    entry.1 += 1;
                }
            }
        }

        totals
            .into_iter()
            .map(|(name, (attempts, successes))| (name, successes as f64 / attempts as f64))
            .collect()
    }

    fn push_history(&self, key: &str, result: FallbackResult) {
        let mut history = self.history.lock().expect("history lock poisoned");
        history
            .entry(key.to_string())
            .or_insert_with(|| RingBuffer::new(HISTORY_CAPACITY))
            .push(result);
    }

    async fn anti_detection_delay(&self, config: &CrawlConfig) {
        if !config.anti_detection.random_delay {
            return;
        }
        let delay = config.anti_detection.delay_range.sample();
        if delay.is_zero() {
            return;
        }
        self.metrics.record_wait(delay);
        tokio::time::sleep(delay).await;
    }
}

/// Acceptance check applied to records returned by strategies.
fn is_acceptable(record: &GymRecord) -> bool {
    !record.name.trim().is_empty() && record.confidence > ACCEPT_CONFIDENCE
}
