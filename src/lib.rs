// src/lib.rs

//! Multi-source crawl orchestration and fusion engine.
//!
//! Assembles gym records from several unreliable, rate-limited sources:
//! prioritized strategies with retry and fallback, confidence-weighted
//! record fusion, and closed-loop performance monitoring that feeds
//! adaptive batch sizing.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod utils;
