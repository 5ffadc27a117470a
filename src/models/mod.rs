// src/models/mod.rs

//! Domain models for the crawl engine.
//!
//! This module contains all data structures used throughout the engine,
//! organized by their primary purpose.

mod config;
mod record;
mod stats;

// Re-export all public types
pub use config::{
    AntiDetectionConfig, BatchConfig, CrawlConfig, DelayRange, FallbackConfig, MonitoringConfig,
    SourcesConfig, SuccessRateConfig, ValidationReport,
};
pub use record::{EquipmentRecord, GymRecord, Query};
pub use stats::{
    Counter, CounterKind, CounterSet, PerformanceStats, QueryStats, StrategyStats, SystemState,
};
