// src/pipeline/fusion.rs

//! Confidence-weighted record fusion.
//!
//! Deduplicates and merges heterogeneous records from multiple sources
//! into canonical entities. Scalar identity fields follow the
//! higher-confidence contributor, optional detail fields are
//! first-non-empty-wins, quantity fields are summed, and the fused source
//! is the comma-joined union of contributors.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{CrawlConfig, EquipmentRecord, GymRecord};
use crate::utils::normalize_key;

/// Quality score at or above which a record is "high" quality.
const HIGH_QUALITY: f64 = 0.8;

/// Quality score at or above which a record is "medium" quality.
const MEDIUM_QUALITY: f64 = 0.5;

/// A record kind that can participate in fusion.
///
/// Implementations supply structural validation, normalization, the dedup
/// key, and the pairwise merge rule for their kind.
pub trait Fusable: Clone {
    /// Structural validity; invalid records are dropped from fusion input.
    fn is_valid(&self) -> bool;

    /// Trim/normalize text and clamp numeric fields.
    fn clean(&mut self);

    /// Case- and whitespace-insensitive grouping key.
    fn dedup_key(&self) -> String;

    /// Merge a later-encountered record of the same key into this one.
    fn merge_from(&mut self, other: &Self);

    /// Record confidence, in [0, 1].
    fn confidence(&self) -> f64;
}

impl Fusable for GymRecord {
    fn is_valid(&self) -> bool {
        GymRecord::is_valid(self)
    }

    fn clean(&mut self) {
        GymRecord::clean(self);
    }

    fn dedup_key(&self) -> String {
        format!("{}-{}", normalize_key(&self.name), normalize_key(&self.address))
    }

    fn merge_from(&mut self, other: &Self) {
        // Identity fields follow the higher-confidence contributor;
        // ties keep the earlier record.
        if other.confidence > self.confidence {
            self.name = other.name.clone();
            self.address = other.address.clone();
        }

        // Detail fields: first non-empty value wins, never overwritten
        // by a later empty one.
        if self.phone.is_none() {
            self.phone = other.phone.clone();
        }
        if !self.has_coordinates() && other.has_coordinates() {
            self.latitude = other.latitude;
            self.longitude = other.longitude;
        }
        if self.hours.is_none() {
            self.hours = other.hours.clone();
        }
        if self.price.is_none() {
            self.price = other.price.clone();
        }
        if self.rating.is_none() {
            self.rating = other.rating;
        }
        if self.facilities.is_empty() {
            self.facilities = other.facilities.clone();
        }
        if self.review_count.is_none() {
            self.review_count = other.review_count;
        }

        self.confidence = self.confidence.max(other.confidence);
        self.source = join_sources(&self.source, &other.source);
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }
}

impl Fusable for EquipmentRecord {
    fn is_valid(&self) -> bool {
        EquipmentRecord::is_valid(self)
    }

    fn clean(&mut self) {
        EquipmentRecord::clean(self);
    }

    fn dedup_key(&self) -> String {
        format!(
            "{}-{}-{}",
            normalize_key(&self.owner_key),
            normalize_key(&self.category),
            normalize_key(&self.name)
        )
    }

    fn merge_from(&mut self, other: &Self) {
        if other.confidence > self.confidence {
            self.category = other.category.clone();
            self.name = other.name.clone();
        }

        // Quantity-like field: summed across contributors, not chosen.
        self.count += other.count;

        self.confidence = self.confidence.max(other.confidence);
        self.source = join_sources(&self.source, &other.source);
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// Comma-join two source strings, deduplicating tokens in encounter order.
fn join_sources(left: &str, right: &str) -> String {
    let mut tokens: Vec<&str> = Vec::new();
    for token in left.split(',').chain(right.split(',')) {
        let token = token.trim();
        if !token.is_empty() && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.join(",")
}

/// Quality classification buckets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityBuckets {
    pub high: Vec<GymRecord>,
    pub medium: Vec<GymRecord>,
    pub low: Vec<GymRecord>,
}

/// Per-source operational statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStats {
    pub count: usize,
    pub avg_confidence: f64,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Deduplicates and merges records, and scores record quality.
#[derive(Debug, Clone, Default)]
pub struct DataFusionEngine {
    /// Minimum fused confidence to survive filtering
    min_confidence: f64,
}

impl DataFusionEngine {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(config.fallback.min_confidence)
    }

    /// Merge records sharing a dedup key into canonical entities.
    ///
    /// Invalid records are silently dropped; the rest are cleaned and
    /// grouped in encounter order. Singleton groups pass through (cleaned)
    /// unchanged. Idempotent on its own output.
    pub fn merge_records<R: Fusable>(&self, records: Vec<R>) -> Vec<R> {
        let mut fused: Vec<R> = Vec::new();
        let mut index_by_key: HashMap<String, usize> = HashMap::new();

        for mut record in records {
            if !record.is_valid() {
                continue;
            }
            record.clean();

            let key = record.dedup_key();
            match index_by_key.get(&key) {
                Some(&index) => fused[index].merge_from(&record),
                None => {
                    index_by_key.insert(key, fused.len());
                    fused.push(record);
                }
            }
        }

        fused
    }

    /// Drop fused records below the configured confidence floor.
    pub fn filter_by_confidence<R: Fusable>(&self, records: Vec<R>) -> Vec<R> {
        records
            .into_iter()
            .filter(|r| r.confidence() >= self.min_confidence)
            .collect()
    }

    /// Field-presence quality score in [0, 1].
    ///
    /// Mandatory fields (name, address, source) weigh 30%; the seven
    /// optional detail fields weigh 70%.
    pub fn quality_score(&self, record: &GymRecord) -> f64 {
        let mandatory = [
            !record.name.trim().is_empty(),
            !record.address.trim().is_empty(),
            !record.source.trim().is_empty(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        let optional = [
            record.phone.is_some(),
            record.has_coordinates(),
            record.hours.is_some(),
            record.price.is_some(),
            record.rating.is_some(),
            !record.facilities.is_empty(),
            record.review_count.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        let score = 0.3 * (mandatory as f64 / 3.0) + 0.7 * (optional as f64 / 7.0);
        score.clamp(0.0, 1.0)
    }

    /// Bucket records into high / medium / low quality.
    pub fn classify_by_quality(&self, records: &[GymRecord]) -> QualityBuckets {
        let mut buckets = QualityBuckets::default();
        for record in records {
            let score = self.quality_score(record);
            if score >= HIGH_QUALITY {
                buckets.high.push(record.clone());
            } else if score >= MEDIUM_QUALITY {
                buckets.medium.push(record.clone());
            } else {
                buckets.low.push(record.clone());
            }
        }
        buckets
    }

    /// Group records by source for operational reporting.
    ///
    /// Multi-source fused records contribute to each of their sources.
    pub fn source_statistics(&self, records: &[GymRecord]) -> HashMap<String, SourceStats> {
        let mut confidence_sums: HashMap<String, f64> = HashMap::new();
        let mut stats: HashMap<String, SourceStats> = HashMap::new();

        for record in records {
            let score = self.quality_score(record);
            for source in record.source.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let entry = stats.entry(source.to_string()).or_default();
                entry.count += 1;
                if score >= HIGH_QUALITY {
                    entry.high += 1;
                } else if score >= MEDIUM_QUALITY {
                    entry.medium += 1;
                } else {
                    entry.low += 1;
                }
                *confidence_sums.entry(source.to_string()).or_default() += record.confidence;
            }
        }

        for (source, entry) in stats.iter_mut() {
            entry.avg_confidence = confidence_sums[source] / entry.count as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(name: &str, address: &str, confidence: f64, source: &str) -> GymRecord {
        GymRecord {
            name: name.into(),
            address: address.into(),
            phone: None,
            latitude: None,
            longitude: None,
            hours: None,
            price: None,
            rating: None,
            facilities: vec![],
            review_count: None,
            source: source.into(),
            confidence,
        }
    }

    fn engine() -> DataFusionEngine {
        DataFusionEngine::new(0.5)
    }

    #[test]
    fn test_merge_two_sources_of_same_gym() {
        let low = make_record("gym x", "seoul", 0.4, "s1");
        let mut high = make_record("Gym X", "Seoul", 0.9, "s2");
        high.phone = Some("02-111".into());

        let fused = engine().merge_records(vec![low, high]);
        assert_eq!(fused.len(), 1);

        let record = &fused[0];
        // Identity fields come from the higher-confidence contributor
        assert_eq!(record.name, "Gym X");
        assert_eq!(record.address, "Seoul");
        assert_eq!(record.phone.as_deref(), Some("02-111"));
        assert_eq!(record.confidence, 0.9);
        assert_eq!(record.source, "s1,s2");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut a = make_record("Gym X", "Seoul", 0.4, "s1");
        a.hours = Some("06-23".into());
        let b = make_record("gym x", "seoul", 0.9, "s2");
        let c = make_record("Other Gym", "Busan", 0.7, "s1");

        let engine = engine();
        let once = engine.merge_records(vec![a, b, c]);
        let twice = engine.merge_records(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_fused_source_contains_each_token_once() {
        let a = make_record("Gym X", "Seoul", 0.5, "s1");
        let b = make_record("gym x", "seoul", 0.6, "s2");
        let c = make_record("GYM X", "SEOUL", 0.7, "s1");

        let fused = engine().merge_records(vec![a, b, c]);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].source, "s1,s2");
        assert_eq!(fused[0].confidence, 0.7);
    }

    #[test]
    fn test_detail_fields_first_non_empty_wins() {
        let mut a = make_record("Gym X", "Seoul", 0.9, "s1");
        a.phone = Some("02-111".into());
        let mut b = make_record("Gym X", "Seoul", 0.5, "s2");
        b.phone = Some("02-999".into());
        b.rating = Some(4.5);

        let fused = engine().merge_records(vec![a, b]);
        let record = &fused[0];
        // Earlier phone kept, missing rating filled in
        assert_eq!(record.phone.as_deref(), Some("02-111"));
        assert_eq!(record.rating, Some(4.5));
    }

    #[test]
    fn test_confidence_tie_keeps_earlier_identity() {
        let a = make_record("Gym X", "Seoul Gangnam", 0.5, "s1");
        let b = make_record("gym x", "seoulgangnam", 0.5, "s2");

        let fused = engine().merge_records(vec![a, b]);
        assert_eq!(fused[0].name, "Gym X");
        assert_eq!(fused[0].address, "Seoul Gangnam");
    }

    #[test]
    fn test_invalid_records_dropped() {
        let valid = make_record("Gym X", "Seoul", 0.6, "s1");
        let no_name = make_record("", "Seoul", 0.6, "s1");
        let bad_confidence = make_record("Gym Y", "Busan", 1.4, "s1");

        let fused = engine().merge_records(vec![no_name, valid, bad_confidence]);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].name, "Gym X");
    }

    #[test]
    fn test_different_gyms_stay_separate() {
        let a = make_record("Gym X", "Seoul", 0.6, "s1");
        let b = make_record("Gym X", "Busan", 0.6, "s1");

        let fused = engine().merge_records(vec![a, b]);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_equipment_counts_are_summed() {
        let a = EquipmentRecord {
            owner_key: "gymx-seoul".into(),
            category: "Cardio".into(),
            name: "Treadmill".into(),
            count: 4,
            source: "s1".into(),
            confidence: 0.6,
        };
        let mut b = a.clone();
        b.count = 3;
        b.source = "s2".into();
        b.confidence = 0.8;

        let fused = engine().merge_records(vec![a, b]);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].count, 7);
        assert_eq!(fused[0].confidence, 0.8);
        assert_eq!(fused[0].source, "s1,s2");
    }

    #[test]
    fn test_filter_by_confidence() {
        let a = make_record("Gym X", "Seoul", 0.9, "s1");
        let b = make_record("Gym Y", "Busan", 0.3, "s2");

        let kept = engine().filter_by_confidence(vec![a, b]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "Gym X");
    }

    #[test]
    fn test_quality_score_mandatory_only() {
        let record = make_record("Gym X", "Seoul", 0.6, "s1");
        let score = engine().quality_score(&record);
        assert!((score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_quality_score_monotonic_in_optional_fields() {
        let engine = engine();
        let mut record = make_record("Gym X", "Seoul", 0.6, "s1");
        let mut previous = engine.quality_score(&record);

        record.phone = Some("02-111".into());
        let with_phone = engine.quality_score(&record);
        assert!(with_phone > previous);
        previous = with_phone;

        record.rating = Some(4.2);
        let with_rating = engine.quality_score(&record);
        assert!(with_rating > previous);
        previous = with_rating;

        record.latitude = Some(37.5);
        record.longitude = Some(127.0);
        assert!(engine.quality_score(&record) > previous);
    }

    #[test]
    fn test_classify_by_quality() {
        let engine = engine();

        let mut high = make_record("Gym X", "Seoul", 0.9, "s1");
        high.phone = Some("02-111".into());
        high.latitude = Some(37.5);
        high.longitude = Some(127.0);
        high.hours = Some("06-23".into());
        high.price = Some("80000".into());
        high.rating = Some(4.5);
        high.facilities = vec!["sauna".into()];
        high.review_count = Some(120);

        let mut medium = make_record("Gym Y", "Busan", 0.7, "s2");
        medium.phone = Some("051-222".into());
        medium.rating = Some(4.0);

        let low = make_record("Gym Z", "Daegu", 0.4, "s3");

        let buckets = engine.classify_by_quality(&[high, medium, low]);
        assert_eq!(buckets.high.len(), 1);
        assert_eq!(buckets.medium.len(), 1);
        assert_eq!(buckets.low.len(), 1);
        assert_eq!(buckets.high[0].name, "Gym X");
        assert_eq!(buckets.low[0].name, "Gym Z");
    }

    #[test]
    fn test_source_statistics() {
        let engine = engine();
        let a = make_record("Gym X", "Seoul", 0.8, "s1");
        let b = make_record("Gym Y", "Busan", 0.4, "s1");
        let mut c = make_record("Gym Z", "Daegu", 0.6, "s1,s2");
        c.phone = Some("02-333".into());

        let stats = engine.source_statistics(&[a, b, c]);
        assert_eq!(stats["s1"].count, 3);
        assert_eq!(stats["s2"].count, 1);
        assert!((stats["s1"].avg_confidence - (0.8 + 0.4 + 0.6) / 3.0).abs() < 1e-9);
        assert!((stats["s2"].avg_confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_singleton_passes_through_cleaned() {
        let mut record = make_record("  Gym   X ", " Seoul ", 0.6, "s1");
        record.rating = Some(9.0);

        let fused = engine().merge_records(vec![record]);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].name, "Gym X");
        assert_eq!(fused[0].rating, Some(5.0));
    }
}
