//! Domain records produced by source strategies and consumed by fusion.

use serde::{Deserialize, Serialize};

use crate::utils::{clamp, normalize_whitespace};

/// A single lookup request: gym name plus optional address hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    pub name: String,

    #[serde(default)]
    pub address: Option<String>,
}

impl Query {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }

    pub fn with_address(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: Some(address.into()),
        }
    }

    /// Stable key for execution history and metrics aggregation.
    pub fn key(&self) -> String {
        match &self.address {
            Some(addr) => format!("{}|{}", self.name, addr),
            None => self.name.clone(),
        }
    }
}

/// A gym record assembled by one source strategy.
///
/// `name`, `address`, `source`, and `confidence` are mandatory; everything
/// else is detail that fusion fills in from whichever source has it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GymRecord {
    pub name: String,
    pub address: String,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    #[serde(default)]
    pub hours: Option<String>,

    #[serde(default)]
    pub price: Option<String>,

    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default)]
    pub facilities: Vec<String>,

    #[serde(default)]
    pub review_count: Option<u32>,

    /// Producing source name; becomes a comma-joined union after fusion
    pub source: String,

    /// Producing strategy's self-assessed reliability, in [0, 1]
    pub confidence: f64,
}

impl GymRecord {
    /// Structural validity: non-empty identity fields, confidence in range.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.address.trim().is_empty()
            && !self.source.trim().is_empty()
            && (0.0..=1.0).contains(&self.confidence)
    }

    /// Normalize text fields and clamp numeric fields to valid ranges.
    pub fn clean(&mut self) {
        self.name = normalize_whitespace(&self.name);
        self.address = normalize_whitespace(&self.address);
        self.source = self.source.trim().to_string();
        self.confidence = clamp(self.confidence, 0.0, 1.0);

        if let Some(lat) = self.latitude {
            self.latitude = Some(clamp(lat, -90.0, 90.0));
        }
        if let Some(lng) = self.longitude {
            self.longitude = Some(clamp(lng, -180.0, 180.0));
        }
        if let Some(rating) = self.rating {
            self.rating = Some(clamp(rating, 0.0, 5.0));
        }
        if let Some(phone) = &self.phone {
            let trimmed = phone.trim();
            self.phone = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        self.facilities.retain(|f| !f.trim().is_empty());
    }

    /// Both coordinates present.
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// An equipment record attached to a gym.
///
/// Item-like entity: deduplicated by owner + category + name, with counts
/// summed across contributing sources rather than chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    /// Dedup key of the owning gym
    pub owner_key: String,
    pub category: String,
    pub name: String,

    #[serde(default = "default_count")]
    pub count: u32,

    pub source: String,
    pub confidence: f64,
}

fn default_count() -> u32 {
    1
}

impl EquipmentRecord {
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.category.trim().is_empty()
            && !self.source.trim().is_empty()
            && (0.0..=1.0).contains(&self.confidence)
    }

    pub fn clean(&mut self) {
        self.owner_key = normalize_whitespace(&self.owner_key);
        self.category = normalize_whitespace(&self.category);
        self.name = normalize_whitespace(&self.name);
        self.source = self.source.trim().to_string();
        self.confidence = clamp(self.confidence, 0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record() -> GymRecord {
        GymRecord {
            name: "Gym X".into(),
            address: "Seoul".into(),
            phone: None,
            latitude: None,
            longitude: None,
            hours: None,
            price: None,
            rating: None,
            facilities: vec![],
            review_count: None,
            source: "s1".into(),
            confidence: 0.8,
        }
    }

    #[test]
    fn test_query_key() {
        assert_eq!(Query::new("Gym X").key(), "Gym X");
        assert_eq!(Query::with_address("Gym X", "Seoul").key(), "Gym X|Seoul");
    }

    #[test]
    fn test_valid_record() {
        assert!(make_record().is_valid());
    }

    #[test]
    fn test_invalid_when_name_empty() {
        let mut record = make_record();
        record.name = "   ".into();
        assert!(!record.is_valid());
    }

    #[test]
    fn test_invalid_when_confidence_out_of_range() {
        let mut record = make_record();
        record.confidence = 1.2;
        assert!(!record.is_valid());
    }

    #[test]
    fn test_clean_clamps_numeric_fields() {
        let mut record = make_record();
        record.latitude = Some(95.0);
        record.longitude = Some(-200.0);
        record.rating = Some(7.5);
        record.clean();
        assert_eq!(record.latitude, Some(90.0));
        assert_eq!(record.longitude, Some(-180.0));
        assert_eq!(record.rating, Some(5.0));
    }

    #[test]
    fn test_clean_drops_empty_phone() {
        let mut record = make_record();
        record.phone = Some("  ".into());
        record.clean();
        assert_eq!(record.phone, None);
    }

    #[test]
    fn test_clean_normalizes_whitespace() {
        let mut record = make_record();
        record.name = "  Gym   X ".into();
        record.clean();
        assert_eq!(record.name, "Gym X");
    }
}
