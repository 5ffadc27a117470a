//! Crawl engine configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Root crawl configuration.
///
/// Owned by [`crate::config::ConfigManager`]; mutated only through explicit
/// update calls, never by the data path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Default per-request timeout in milliseconds
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Default delay between requests in milliseconds
    #[serde(default = "defaults::delay_ms")]
    pub delay_ms: u64,

    /// Default maximum retry count per operation
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Batch sizing and pacing
    #[serde(default)]
    pub batch: BatchConfig,

    /// Source adapter settings
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Fallback orchestration thresholds
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Anti-detection pacing controls
    #[serde(default)]
    pub anti_detection: AntiDetectionConfig,

    /// Success-rate targets for reporting and pacing decisions
    #[serde(default)]
    pub success_rate: SuccessRateConfig,

    /// Performance monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Batch sizing bounds and inter-batch delay ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Batch size used for the first batch
    #[serde(default = "defaults::initial_size")]
    pub initial_size: usize,

    /// Lower bound for adaptive batch sizing
    #[serde(default = "defaults::min_size")]
    pub min_size: usize,

    /// Upper bound for adaptive batch sizing
    #[serde(default = "defaults::max_size")]
    pub max_size: usize,

    /// Consecutive fully-failed batches before the size is halved
    #[serde(default = "defaults::max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Inter-batch delay range under normal success rates
    #[serde(default = "defaults::delay_range")]
    pub delay_range: DelayRange,

    /// Inter-batch delay range when success falls below the threshold
    #[serde(default = "defaults::low_success_delay_range")]
    pub low_success_delay_range: DelayRange,

    /// Batch success-rate percentage below which the longer delay applies
    #[serde(default = "defaults::low_success_threshold")]
    pub low_success_threshold: f64,
}

/// Source adapter execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Names of enabled source adapters
    #[serde(default = "defaults::enabled_sources")]
    pub enabled: Vec<String>,

    /// Per-strategy execution timeout in milliseconds
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Delay between strategy attempts in milliseconds
    #[serde(default = "defaults::delay_ms")]
    pub delay_ms: u64,

    /// Retry budget per strategy attempt
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Allow concurrent query processing
    #[serde(default)]
    pub parallel: bool,

    /// Maximum concurrent queries when `parallel` is set
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

/// Fallback orchestration thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Whether fallback to lower-priority strategies is enabled
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Minimum confidence for a record to be kept after fusion
    #[serde(default = "defaults::min_confidence")]
    pub min_confidence: f64,

    /// Confidence assigned to records produced by last-resort strategies
    #[serde(default = "defaults::fallback_confidence")]
    pub fallback_confidence: f64,
}

/// Anti-detection pacing controls.
///
/// Sequential execution plus randomized inter-request delay is the primary
/// bot-detection countermeasure; identity rotation is delegated to adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiDetectionConfig {
    /// Insert a random delay before each outbound request
    #[serde(default = "defaults::enabled")]
    pub random_delay: bool,

    /// Range for the random per-request delay
    #[serde(default = "defaults::jitter_range")]
    pub delay_range: DelayRange,

    /// Hint for adapters to rotate their client identity
    #[serde(default)]
    pub rotate_identity: bool,
}

/// Success-rate percentage thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessRateConfig {
    /// Target success rate
    #[serde(default = "defaults::target_rate")]
    pub target: f64,

    /// Rate below which a warning is reported
    #[serde(default = "defaults::warning_rate")]
    pub warning: f64,

    /// Rate below which the run is considered degraded
    #[serde(default = "defaults::critical_rate")]
    pub critical: f64,
}

/// Performance monitoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Print periodic reports while crawling
    #[serde(default = "defaults::enabled")]
    pub enable_real_time: bool,

    /// Minimum milliseconds between periodic reports
    #[serde(default = "defaults::report_interval_ms")]
    pub report_interval_ms: u64,
}

/// An inclusive delay range in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    /// Draw a duration uniformly from the range.
    ///
    /// A zero upper bound means no delay. Inverted bounds sample from the
    /// swapped range rather than panicking; validation reports them, but
    /// unvalidated configs still reach this path.
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        if hi == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

/// Outcome of config validation.
///
/// Collects every violation rather than stopping at the first, so callers
/// can report all problems with a partial update at once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

impl CrawlConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values, collecting every violation.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport {
            is_valid: true,
            errors: Vec::new(),
        };

        if self.timeout_ms == 0 {
            report.push("timeout_ms must be > 0");
        }
        if self.sources.timeout_ms == 0 {
            report.push("sources.timeout_ms must be > 0");
        }
        if self.sources.max_concurrent == 0 {
            report.push("sources.max_concurrent must be > 0");
        }

        let batch = &self.batch;
        if batch.min_size < 1 {
            report.push("batch.min_size must be >= 1");
        }
        if batch.max_size > 100 {
            report.push("batch.max_size must be <= 100");
        }
        if batch.min_size > batch.max_size {
            report.push(format!(
                "batch.min_size ({}) must be <= batch.max_size ({})",
                batch.min_size, batch.max_size
            ));
        }
        if !(1..=50).contains(&batch.initial_size) {
            report.push(format!(
                "batch.initial_size ({}) must be in 1..=50",
                batch.initial_size
            ));
        }
        if batch.initial_size < batch.min_size || batch.initial_size > batch.max_size {
            report.push(format!(
                "batch.initial_size ({}) must be within [{}, {}]",
                batch.initial_size, batch.min_size, batch.max_size
            ));
        }
        for (name, range) in [
            ("batch.delay_range", &batch.delay_range),
            ("batch.low_success_delay_range", &batch.low_success_delay_range),
            ("anti_detection.delay_range", &self.anti_detection.delay_range),
        ] {
            if range.min_ms > range.max_ms {
                report.push(format!("{name}: min_ms must be <= max_ms"));
            }
        }

        for (name, value) in [
            ("batch.low_success_threshold", batch.low_success_threshold),
            ("success_rate.target", self.success_rate.target),
            ("success_rate.warning", self.success_rate.warning),
            ("success_rate.critical", self.success_rate.critical),
        ] {
            if !(0.0..=100.0).contains(&value) {
                report.push(format!("{name} ({value}) must be in [0, 100]"));
            }
        }

        for (name, value) in [
            ("fallback.min_confidence", self.fallback.min_confidence),
            ("fallback.fallback_confidence", self.fallback.fallback_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                report.push(format!("{name} ({value}) must be in [0, 1]"));
            }
        }

        report.is_valid = report.errors.is_empty();
        report
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::timeout_ms(),
            delay_ms: defaults::delay_ms(),
            max_retries: defaults::max_retries(),
            batch: BatchConfig::default(),
            sources: SourcesConfig::default(),
            fallback: FallbackConfig::default(),
            anti_detection: AntiDetectionConfig::default(),
            success_rate: SuccessRateConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_size: defaults::initial_size(),
            min_size: defaults::min_size(),
            max_size: defaults::max_size(),
            max_consecutive_failures: defaults::max_consecutive_failures(),
            delay_range: defaults::delay_range(),
            low_success_delay_range: defaults::low_success_delay_range(),
            low_success_threshold: defaults::low_success_threshold(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled_sources(),
            timeout_ms: defaults::timeout_ms(),
            delay_ms: defaults::delay_ms(),
            max_retries: defaults::max_retries(),
            parallel: false,
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            min_confidence: defaults::min_confidence(),
            fallback_confidence: defaults::fallback_confidence(),
        }
    }
}

impl Default for AntiDetectionConfig {
    fn default() -> Self {
        Self {
            random_delay: defaults::enabled(),
            delay_range: defaults::jitter_range(),
            rotate_identity: false,
        }
    }
}

impl Default for SuccessRateConfig {
    fn default() -> Self {
        Self {
            target: defaults::target_rate(),
            warning: defaults::warning_rate(),
            critical: defaults::critical_rate(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_real_time: defaults::enabled(),
            report_interval_ms: defaults::report_interval_ms(),
        }
    }
}

mod defaults {
    use super::DelayRange;

    pub fn timeout_ms() -> u64 {
        15_000
    }
    pub fn delay_ms() -> u64 {
        1_000
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn enabled() -> bool {
        true
    }

    // Batch defaults
    pub fn initial_size() -> usize {
        5
    }
    pub fn min_size() -> usize {
        1
    }
    pub fn max_size() -> usize {
        20
    }
    pub fn max_consecutive_failures() -> u32 {
        3
    }
    pub fn delay_range() -> DelayRange {
        DelayRange {
            min_ms: 2_000,
            max_ms: 5_000,
        }
    }
    pub fn low_success_delay_range() -> DelayRange {
        DelayRange {
            min_ms: 8_000,
            max_ms: 15_000,
        }
    }
    pub fn low_success_threshold() -> f64 {
        50.0
    }

    // Source defaults
    pub fn enabled_sources() -> Vec<String> {
        vec![
            "naver_map".into(),
            "kakao_map".into(),
            "google_search".into(),
            "web_scrape".into(),
        ]
    }
    pub fn max_concurrent() -> usize {
        1
    }

    // Fallback defaults
    pub fn min_confidence() -> f64 {
        0.5
    }
    pub fn fallback_confidence() -> f64 {
        0.3
    }

    // Anti-detection defaults
    pub fn jitter_range() -> DelayRange {
        DelayRange {
            min_ms: 500,
            max_ms: 2_000,
        }
    }

    // Success-rate defaults
    pub fn target_rate() -> f64 {
        80.0
    }
    pub fn warning_rate() -> f64 {
        60.0
    }
    pub fn critical_rate() -> f64 {
        40.0
    }

    // Monitoring defaults
    pub fn report_interval_ms() -> u64 {
        30_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let report = CrawlConfig::default().validate();
        assert!(report.is_valid, "errors: {:?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_rejects_min_size_above_max_size() {
        let mut config = CrawlConfig::default();
        config.batch.min_size = 30;
        config.batch.max_size = 10;
        config.batch.initial_size = 30;
        let report = config.validate();
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("min_size")));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = CrawlConfig::default();
        config.timeout_ms = 0;
        assert!(!config.validate().is_valid);
    }

    #[test]
    fn test_rejects_initial_size_out_of_bounds() {
        let mut config = CrawlConfig::default();
        config.batch.initial_size = 51;
        config.batch.max_size = 100;
        assert!(!config.validate().is_valid);
    }

    #[test]
    fn test_rejects_percentage_out_of_range() {
        let mut config = CrawlConfig::default();
        config.success_rate.target = 120.0;
        let report = config.validate();
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("success_rate.target")));
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        let mut config = CrawlConfig::default();
        config.fallback.min_confidence = 1.5;
        assert!(!config.validate().is_valid);
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut config = CrawlConfig::default();
        config.timeout_ms = 0;
        config.fallback.min_confidence = -0.1;
        let report = config.validate();
        assert!(report.errors.len() >= 2);
    }

    #[test]
    fn test_sample_swaps_inverted_bounds() {
        let range = DelayRange {
            min_ms: 10,
            max_ms: 5,
        };
        let ms = range.sample().as_millis() as u64;
        assert!((5..=10).contains(&ms));
    }

    #[test]
    fn test_sample_zero_range_means_no_delay() {
        let range = DelayRange {
            min_ms: 0,
            max_ms: 0,
        };
        assert_eq!(range.sample(), Duration::ZERO);
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let config = CrawlConfig::load_or_default("/nonexistent/config.toml");
        assert_eq!(config, CrawlConfig::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "timeout_ms = 5000\n\n[batch]\ninitial_size = 10\nmax_size = 40"
        )
        .unwrap();

        let config = CrawlConfig::load(file.path()).unwrap();
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.batch.initial_size, 10);
        assert_eq!(config.batch.max_size, 40);
        // Unspecified fields fall back to defaults
        assert_eq!(config.batch.min_size, 1);
    }
}
