// src/pipeline/retry.rs

//! Bounded retry with escalating backoff.
//!
//! Wraps a single fallible async operation; strategy-agnostic. Backoff
//! bookkeeping is kept per key so that repeated failures for the same
//! (context, strategy) pair escalate the delay across calls, not just
//! within one call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::Result;
use crate::models::CrawlConfig;

/// Retry bounds and delay scaling.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for the escalated delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Derive the policy from the source settings of a crawl config.
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            max_retries: config.sources.max_retries,
            base_delay_ms: config.sources.delay_ms,
            max_delay_ms: config.batch.low_success_delay_range.max_ms,
        }
    }
}

/// Executes operations with bounded retries and escalating delay.
#[derive(Debug)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    /// Consecutive failures per backoff key, reset on success
    failures: Mutex<HashMap<String, u32>>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Run `op`, retrying up to `max_retries` times on error.
    ///
    /// The delay before each retry doubles with the number of consecutive
    /// failures recorded for `key`, capped at `max_delay_ms`. On success
    /// the key's failure count is cleared; on exhaustion the last error is
    /// returned.
    pub async fn execute<T, F, Fut>(&self, key: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    self.failures.lock().expect("retry lock poisoned").remove(key);
                    return Ok(value);
                }
                Err(error) => {
                    let consecutive = {
                        let mut failures = self.failures.lock().expect("retry lock poisoned");
                        let entry = failures.entry(key.to_string()).or_insert(0);
                        *entry += 1;
                        *entry
                    };

                    if attempt > self.policy.max_retries {
                        return Err(error);
                    }

                    let delay = self.backoff_delay(consecutive);
                    log::warn!(
                        "Attempt {}/{} for '{}' failed: {}. Retrying in {:?}",
                        attempt,
                        self.policy.max_retries + 1,
                        key,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Consecutive failures currently recorded for a key.
    pub fn consecutive_failures(&self, key: &str) -> u32 {
        self.failures
            .lock()
            .expect("retry lock poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Clear all backoff bookkeeping.
    pub fn reset(&self) {
        self.failures.lock().expect("retry lock poisoned").clear();
    }

    fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(10);
        let scaled = self.policy.base_delay_ms.saturating_mul(1 << exponent);
        Duration::from_millis(scaled.min(self.policy.max_delay_ms))
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
