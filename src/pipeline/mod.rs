//! Crawl orchestration pipeline.
//!
//! - `retry`: bounded retry with escalating backoff
//! - `fallback`: prioritized multi-strategy orchestration
//! - `fusion`: confidence-weighted record merging
//! - `batch`: adaptive batch scheduling control loop

pub mod batch;
pub mod fallback;
pub mod fusion;
pub mod retry;

pub use batch::{BatchReport, BatchScheduler, CrawlSummary};
pub use fallback::{FallbackOrchestrator, FallbackResult, Strategy};
pub use fusion::{DataFusionEngine, Fusable, QualityBuckets, SourceStats};
pub use retry::{RetryExecutor, RetryPolicy};
