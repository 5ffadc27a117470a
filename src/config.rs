// src/config.rs

//! Configuration management.
//!
//! [`ConfigManager`] owns the crawl configuration tree and provides
//! dot-path access plus partial deep-merge updates. It is constructed
//! explicitly and injected into the components that read it; there is no
//! ambient global instance.
//!
//! Partial updates merge object-into-object recursively and replace
//! anything else, then the merged tree is validated and the update is
//! rejected atomically if validation fails. The original implementation
//! committed the merge before validation; rejecting up front is a
//! deliberate behavior change (see DESIGN.md).

use std::path::Path;
use std::sync::RwLock;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{CrawlConfig, ValidationReport};

/// Owner of the process-wide crawl configuration.
///
/// Reads are cheap clones; writes go through validation. Guarded by a
/// read-write lock since the data path reads it on every batch while
/// administrative updates are rare.
#[derive(Debug)]
pub struct ConfigManager {
    config: RwLock<CrawlConfig>,
}

impl ConfigManager {
    /// Create a manager owning the given configuration.
    pub fn new(config: CrawlConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Create a manager from a TOML file, falling back to defaults.
    ///
    /// A file that parses but fails validation is also discarded, so a
    /// manager built here always starts from a valid configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let config = CrawlConfig::load_or_default(&path);
        let report = config.validate();
        if report.is_valid {
            return Self::new(config);
        }

        for error in &report.errors {
            log::warn!("Invalid config value: {}", error);
        }
        log::warn!(
            "Config at {:?} failed validation. Using defaults.",
            path.as_ref()
        );
        Self::new(CrawlConfig::default())
    }

    /// Defensive copy of the current configuration.
    pub fn get_config(&self) -> CrawlConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// Look up a single value by dot path, e.g. `"batch.max_size"`.
    ///
    /// Returns `None` when the path does not exist in the tree.
    pub fn get_value(&self, path: &str) -> Option<Value> {
        let tree = serde_json::to_value(self.get_config()).ok()?;
        let mut current = &tree;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Set a single value by dot path.
    ///
    /// Fails if the path does not exist in the schema, the value has the
    /// wrong type, or the resulting configuration is invalid. The stored
    /// configuration is untouched on failure.
    pub fn set_value(&self, path: &str, value: Value) -> Result<()> {
        let mut tree = serde_json::to_value(self.get_config())?;

        let mut current = &mut tree;
        let segments: Vec<&str> = path.split('.').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| AppError::config("empty config path"))?;

        for segment in parents {
            current = current
                .get_mut(*segment)
                .ok_or_else(|| AppError::config(format!("unknown config path: {path}")))?;
        }
        let slot = current
            .get_mut(*last)
            .ok_or_else(|| AppError::config(format!("unknown config path: {path}")))?;
        *slot = value;

        self.commit(tree)
    }

    /// Deep-merge a partial configuration into the current tree.
    ///
    /// For every key: if both the existing and incoming values are objects,
    /// merge recursively; otherwise the incoming value replaces the
    /// existing one. The merged result is validated before being stored.
    pub fn update(&self, partial: Value) -> Result<()> {
        let mut tree = serde_json::to_value(self.get_config())?;
        deep_merge(&mut tree, partial);
        self.commit(tree)
    }

    /// Dry-run validation of a partial update against the current tree.
    pub fn validate(&self, partial: Value) -> ValidationReport {
        let mut tree = match serde_json::to_value(self.get_config()) {
            Ok(tree) => tree,
            Err(e) => {
                return ValidationReport {
                    is_valid: false,
                    errors: vec![e.to_string()],
                };
            }
        };
        deep_merge(&mut tree, partial);

        match serde_json::from_value::<CrawlConfig>(tree) {
            Ok(merged) => merged.validate(),
            Err(e) => ValidationReport {
                is_valid: false,
                errors: vec![format!("partial config has wrong shape: {e}")],
            },
        }
    }

    /// Restore the built-in default configuration.
    pub fn reset_to_default(&self) {
        *self.config.write().expect("config lock poisoned") = CrawlConfig::default();
    }

    /// Deserialize, validate, and store a merged tree atomically.
    fn commit(&self, tree: Value) -> Result<()> {
        let merged: CrawlConfig = serde_json::from_value(tree)
            .map_err(|e| AppError::validation(format!("config has wrong shape: {e}")))?;

        let report = merged.validate();
        if !report.is_valid {
            return Err(AppError::validation(report.errors.join("; ")));
        }

        *self.config.write().expect("config lock poisoned") = merged;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(CrawlConfig::default())
    }
}

/// Merge `incoming` into `base`: objects merge key-by-key recursively,
/// anything else replaces the existing value.
fn deep_merge(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, incoming) => *base = incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_config_is_a_copy() {
        let manager = ConfigManager::default();
        let mut copy = manager.get_config();
        copy.timeout_ms = 1;
        assert_ne!(manager.get_config().timeout_ms, 1);
    }

    #[test]
    fn test_get_value_by_dot_path() {
        let manager = ConfigManager::default();
        let value = manager.get_value("batch.initial_size").unwrap();
        assert_eq!(value, json!(5));
        assert_eq!(manager.get_value("fallback.enabled"), Some(json!(true)));
    }

    #[test]
    fn test_get_value_unknown_path() {
        let manager = ConfigManager::default();
        assert_eq!(manager.get_value("batch.no_such_field"), None);
        assert_eq!(manager.get_value("nope"), None);
    }

    #[test]
    fn test_set_value() {
        let manager = ConfigManager::default();
        manager.set_value("batch.max_size", json!(40)).unwrap();
        assert_eq!(manager.get_config().batch.max_size, 40);
    }

    #[test]
    fn test_set_value_rejects_unknown_path() {
        let manager = ConfigManager::default();
        assert!(manager.set_value("batch.bogus", json!(1)).is_err());
    }

    #[test]
    fn test_set_value_rejects_invalid_result() {
        let manager = ConfigManager::default();
        let before = manager.get_config();
        assert!(manager.set_value("timeout_ms", json!(0)).is_err());
        assert_eq!(manager.get_config(), before);
    }

    #[test]
    fn test_update_deep_merges_objects() {
        let manager = ConfigManager::default();
        manager
            .update(json!({
                "batch": { "initial_size": 8 },
                "fallback": { "min_confidence": 0.6 }
            }))
            .unwrap();

        let config = manager.get_config();
        assert_eq!(config.batch.initial_size, 8);
        assert_eq!(config.fallback.min_confidence, 0.6);
        // Untouched siblings keep their previous values
        assert_eq!(config.batch.max_size, CrawlConfig::default().batch.max_size);
    }

    #[test]
    fn test_update_replaces_non_objects() {
        let manager = ConfigManager::default();
        manager
            .update(json!({ "sources": { "enabled": ["naver_map"] } }))
            .unwrap();
        assert_eq!(manager.get_config().sources.enabled, vec!["naver_map"]);
    }

    #[test]
    fn test_update_rejects_invalid_merge_atomically() {
        let manager = ConfigManager::default();
        let before = manager.get_config();

        let result = manager.update(json!({
            "batch": { "min_size": 30, "max_size": 10 }
        }));
        assert!(result.is_err());
        assert_eq!(manager.get_config(), before);
    }

    #[test]
    fn test_validate_is_a_dry_run() {
        let manager = ConfigManager::default();
        let report = manager.validate(json!({ "timeout_ms": 0 }));
        assert!(!report.is_valid);
        // Nothing was committed
        assert_eq!(manager.get_config(), CrawlConfig::default());
    }

    #[test]
    fn test_validate_accepts_good_partial() {
        let manager = ConfigManager::default();
        let report = manager.validate(json!({ "batch": { "initial_size": 10 } }));
        assert!(report.is_valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_from_file_discards_invalid_values() {
        use std::io::Write;

        // Parses fine but violates the delay-range invariant
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[batch.delay_range]\nmin_ms = 10\nmax_ms = 5").unwrap();

        let manager = ConfigManager::from_file(file.path());
        assert_eq!(manager.get_config(), CrawlConfig::default());
    }

    #[test]
    fn test_from_file_keeps_valid_values() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[batch]\ninitial_size = 10").unwrap();

        let manager = ConfigManager::from_file(file.path());
        assert_eq!(manager.get_config().batch.initial_size, 10);
    }

    #[test]
    fn test_reset_to_default() {
        let manager = ConfigManager::default();
        manager.set_value("batch.max_size", json!(50)).unwrap();
        manager.reset_to_default();
        assert_eq!(manager.get_config(), CrawlConfig::default());
    }
}
