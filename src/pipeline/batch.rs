// src/pipeline/batch.rs

//! Adaptive batch scheduling.
//!
//! Drives the fallback orchestrator over a list of queries in batches,
//! fuses each batch's records, and closes the control loop: batch size
//! shrinks on repeated full failure and grows on sustained success, and
//! the inter-batch delay lengthens when the success rate drops.
//!
//! Policy (bounds from `batch` config, documented in DESIGN.md):
//! - a batch with zero successes increments the consecutive-failure count;
//!   at `max_consecutive_failures` the batch size is halved (clamped to
//!   `min_size`) and the count resets
//! - after 3 consecutive batches at or above `success_rate.target` the
//!   batch size grows by 1 (clamped to `max_size`)
//! - the inter-batch delay is drawn from `low_success_delay_range` when
//!   the batch success rate falls below `low_success_threshold`, else
//!   from `delay_range`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::config::ConfigManager;
use crate::metrics::MetricsCollector;
use crate::models::{CounterKind, DelayRange, GymRecord, Query};
use crate::pipeline::fallback::{FallbackOrchestrator, FallbackResult};
use crate::pipeline::fusion::DataFusionEngine;

/// Consecutive on-target batches required before the size grows by 1.
const GROWTH_STREAK: u32 = 3;

/// Outcome of one processed batch.
#[derive(Debug)]
pub struct BatchReport {
    /// One result per query, in input order
    pub results: Vec<FallbackResult>,
    /// Fused records from this batch's successes, confidence-filtered
    pub records: Vec<GymRecord>,
    /// Success percentage across the batch
    pub success_rate: f64,
}

/// Outcome of a full crawl run.
#[derive(Debug, Default)]
pub struct CrawlSummary {
    pub total_queries: usize,
    pub resolved: usize,
    pub unresolved: usize,
    /// Fused records across all batches
    pub records: Vec<GymRecord>,
}

struct SchedulerState {
    current_batch_size: usize,
    consecutive_failures: u32,
    good_streak: u32,
}

/// Consumer of the orchestration core: sizes batches, paces requests,
/// and feeds system state back into the metrics collector.
pub struct BatchScheduler {
    orchestrator: Arc<FallbackOrchestrator>,
    fusion: DataFusionEngine,
    config: Arc<ConfigManager>,
    metrics: Arc<MetricsCollector>,
    state: Mutex<SchedulerState>,
}

impl BatchScheduler {
    pub fn new(
        orchestrator: Arc<FallbackOrchestrator>,
        config: Arc<ConfigManager>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let snapshot = config.get_config();
        let fusion = DataFusionEngine::from_config(&snapshot);
        let state = SchedulerState {
            current_batch_size: snapshot.batch.initial_size,
            consecutive_failures: 0,
            good_streak: 0,
        };
        metrics.update_system_stats(
            0,
            snapshot.batch.initial_size,
            snapshot.batch.max_consecutive_failures,
        );
        Self {
            orchestrator,
            fusion,
            config,
            metrics,
            state: Mutex::new(state),
        }
    }

    /// Batch size the next batch will use.
    pub fn current_batch_size(&self) -> usize {
        self.lock_state().current_batch_size
    }

    /// Process all queries in adaptively sized batches.
    pub async fn run(&self, queries: Vec<Query>) -> CrawlSummary {
        let mut summary = CrawlSummary {
            total_queries: queries.len(),
            ..CrawlSummary::default()
        };
        let mut all_records: Vec<GymRecord> = Vec::new();
        let mut remaining = queries.as_slice();
        let mut batch_index = 0usize;

        while !remaining.is_empty() {
            let size = self.current_batch_size().min(remaining.len()).max(1);
            let (batch, rest) = remaining.split_at(size);
            remaining = rest;
            batch_index += 1;

            log::info!(
                "Processing batch {} ({} queries, {} remaining)",
                batch_index,
                batch.len(),
                remaining.len()
            );

            let report = self.process_batch(batch).await;
            summary.resolved += report.results.iter().filter(|r| r.success).count();
            all_records.extend(report.records);

            self.metrics.check_report_interval();

            if !remaining.is_empty() {
                let delay = self.pick_inter_batch_delay(report.success_rate);
                if !delay.is_zero() {
                    log::debug!("Sleeping {:?} before next batch", delay);
                    self.metrics.record_wait(delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        summary.unresolved = summary.total_queries - summary.resolved;
        // Cross-batch duplicates collapse in a final merge pass.
        let merged = self.fusion.merge_records(all_records);
        summary.records = self.fusion.filter_by_confidence(merged);
        summary
    }

    /// Process one batch: a result per query, fused batch records, and
    /// the adaptive sizing update.
    pub async fn process_batch(&self, queries: &[Query]) -> BatchReport {
        let config = self.config.get_config();

        let results = if config.sources.parallel && config.sources.max_concurrent > 1 {
            // Bounded concurrency across distinct query keys; each query
            // still runs its own strategies sequentially.
            stream::iter(queries)
                .map(|query| {
                    let orchestrator = Arc::clone(&self.orchestrator);
                    async move {
                        let context = query.key();
                        orchestrator.execute_fallback(query, &context).await
                    }
                })
                .buffered(config.sources.max_concurrent)
                .collect::<Vec<_>>()
                .await
        } else {
            let mut results = Vec::with_capacity(queries.len());
            for query in queries {
                let context = query.key();
                results.push(self.orchestrator.execute_fallback(query, &context).await);
            }
            results
        };

        let successes = results.iter().filter(|r| r.success).count();
        for result in &results {
            self.metrics.record_counter(CounterKind::Individual, result.success);
        }

        let success_rate = if queries.is_empty() {
            0.0
        } else {
            100.0 * successes as f64 / queries.len() as f64
        };
        self.metrics.record_counter(CounterKind::Batch, successes > 0);

        // The orchestrator accepts anything above its low floor; records
        // below fallback.min_confidence are dropped here after fusion.
        let merged = self.fusion.merge_records(
            results
                .iter()
                .filter_map(|r| r.record.clone())
                .collect::<Vec<_>>(),
        );
        let records = self.fusion.filter_by_confidence(merged);

        self.adjust_after_batch(success_rate, &config);
        BatchReport {
            results,
            records,
            success_rate,
        }
    }

    /// Apply the shrink/grow policy and publish the new system state.
    fn adjust_after_batch(&self, success_rate: f64, config: &crate::models::CrawlConfig) {
        let batch = &config.batch;
        let mut state = self.lock_state();

        if success_rate == 0.0 {
            state.consecutive_failures += 1;
            state.good_streak = 0;
            if state.consecutive_failures >= batch.max_consecutive_failures {
                let halved = (state.current_batch_size / 2).max(batch.min_size);
                if halved < state.current_batch_size {
                    log::warn!(
                        "{} consecutive failed batches; shrinking batch size {} -> {}",
                        state.consecutive_failures,
                        state.current_batch_size,
                        halved
                    );
                }
                state.current_batch_size = halved;
                state.consecutive_failures = 0;
            }
        } else {
            state.consecutive_failures = 0;
            if success_rate >= config.success_rate.target {
                state.good_streak += 1;
                if state.good_streak >= GROWTH_STREAK {
                    let grown = (state.current_batch_size + 1).min(batch.max_size);
                    if grown > state.current_batch_size {
                        log::info!(
                            "{} consecutive on-target batches; growing batch size {} -> {}",
                            state.good_streak,
                            state.current_batch_size,
                            grown
                        );
                    }
                    state.current_batch_size = grown;
                    state.good_streak = 0;
                }
            } else {
                state.good_streak = 0;
            }
        }

        self.metrics.update_system_stats(
            state.consecutive_failures,
            state.current_batch_size,
            batch.max_consecutive_failures,
        );
    }

    /// Draw the delay before the next batch from the range matching the
    /// achieved success rate.
    fn pick_inter_batch_delay(&self, success_rate: f64) -> Duration {
        let config = self.config.get_config();
        let range: DelayRange = if success_rate < config.batch.low_success_threshold {
            config.batch.low_success_delay_range
        } else {
            config.batch.delay_range
        };

        range.sample()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().expect("scheduler state lock poisoned")
    }
}
