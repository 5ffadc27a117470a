//! Utility functions and helpers.

pub mod ring;

/// Normalize a string for dedup-key purposes.
///
/// Lowercases, trims, and strips all internal whitespace so that
/// `"Gym X"` and `" gym  x "` produce the same key component.
pub fn normalize_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join("")
        .to_lowercase()
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clamp a float to the given inclusive range.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}
