//! Name-aware ordering
//!
//! Level names are often plain numbers ("4", "41", "51"). Sorting them as
//! text would put "41" before "5", so names that parse as numbers are
//! compared by value and ranked ahead of free-text names, which compare
//! case-insensitively.

use std::cmp::Ordering;

use super::data::{HistoryRecord, ImageRecord, SortOrder};

/// Anything with a sortable name
pub trait Named {
    fn name(&self) -> Option<&str>;
}

impl Named for ImageRecord {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Named for HistoryRecord {
    fn name(&self) -> Option<&str> {
        Some(&self.value.name)
    }
}

/// Sort key: numeric names first (by value), then text (lowercased)
#[derive(Debug, Clone, PartialEq)]
pub enum NameKey {
    Numeric(f64),
    Text(String),
}

impl NameKey {
    pub fn of(name: Option<&str>) -> Self {
        let name = name.unwrap_or_default();
        match parse_number(name) {
            Some(value) => Self::Numeric(value),
            None => Self::Text(name.to_lowercase()),
        }
    }
}

impl Eq for NameKey {}

impl PartialOrd for NameKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NameKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.total_cmp(b),
            (Self::Numeric(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
        }
    }
}

/// Parse a name as a floating-point number
///
/// Surrounding whitespace is ignored; `inf`/`nan` spellings count as numbers.
/// Empty names are text.
pub fn parse_number(name: &str) -> Option<f64> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Order records by name
///
/// Descending is the exact mirror of ascending, so text names come before
/// numeric ones. Records with equal keys keep their input order in both
/// directions.
pub fn sort_by_name<T: Named>(records: Vec<T>, order: SortOrder) -> Vec<T> {
    let mut keyed: Vec<(NameKey, T)> = records
        .into_iter()
        .map(|record| (NameKey::of(record.name()), record))
        .collect();

    // sort_by is stable
    match order {
        SortOrder::Asc => keyed.sort_by(|a, b| a.0.cmp(&b.0)),
        SortOrder::Desc => keyed.sort_by(|a, b| b.0.cmp(&a.0)),
    }

    keyed.into_iter().map(|(_, record)| record).collect()
}
