//! Month keys and their display labels.
//!
//! A [`MonthKey`] is the canonical, sortable `YYYY-MM` identifier of a
//! calendar month. Its short display label (`Jan 2021`) is what interactive
//! selections use, and [`MonthCatalog`] keeps the two in an exact one-to-one
//! mapping for the months present in a dataset.

use std::{collections::HashMap, fmt};

use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;

use crate::error::LookupError;

/// English month names, indexed by `month - 1`. Independent of the locale.
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn month_name(month: u32) -> Option<&'static str> {
    month
        .checked_sub(1)
        .and_then(|idx| MONTH_NAMES.get(idx as usize))
        .copied()
}

/// Resolves a month number from `3`, `03`, `March` or `mar` (case-insensitive).
pub fn parse_month_of_year(value: &str) -> Option<u32> {
    let trimmed = value.trim();
    if let Ok(number) = trimmed.parse::<u32>() {
        return (1..=12).contains(&number).then_some(number);
    }
    MONTH_NAMES
        .iter()
        .position(|name| {
            name.eq_ignore_ascii_case(trimmed) || name[..3].eq_ignore_ascii_case(trimmed)
        })
        .map(|idx| idx as u32 + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_datetime(timestamp: &NaiveDateTime) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn canonical(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn short_label(&self) -> String {
        format!("{} {}", self.abbreviation(), self.year)
    }

    pub fn long_label(&self) -> String {
        format!("{} {}", self.name(), self.year)
    }

    pub fn name(&self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    fn abbreviation(&self) -> &'static str {
        &self.name()[..3]
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Sorted months of a dataset with a bidirectional key/label mapping.
#[derive(Debug, Clone, Default)]
pub struct MonthCatalog {
    keys: Vec<MonthKey>,
    by_label: HashMap<String, usize>,
}

impl MonthCatalog {
    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = MonthKey>,
    {
        let mut keys = keys.into_iter().collect::<Vec<_>>();
        keys.sort_unstable();
        keys.dedup();
        let by_label = keys
            .iter()
            .enumerate()
            .map(|(idx, key)| (key.short_label(), idx))
            .collect();
        Self { keys, by_label }
    }

    pub fn keys(&self) -> &[MonthKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `(canonical_key, display_label)` pairs in ascending month order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.keys
            .iter()
            .map(|key| (key.canonical(), key.short_label()))
            .collect()
    }

    pub fn key_to_label(&self, key: &MonthKey) -> Option<String> {
        self.keys
            .binary_search(key)
            .ok()
            .map(|_| key.short_label())
    }

    pub fn label_to_key(&self, label: &str) -> Result<MonthKey, LookupError> {
        self.position(label).map(|idx| self.keys[idx])
    }

    pub fn position(&self, label: &str) -> Result<usize, LookupError> {
        self.by_label
            .get(label)
            .copied()
            .ok_or_else(|| LookupError::UnknownLabel(label.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn labels_use_fixed_english_names() {
        let key = MonthKey::from_datetime(&at(2021, 9, 30));
        assert_eq!(key.canonical(), "2021-09");
        assert_eq!(key.short_label(), "Sep 2021");
        assert_eq!(key.long_label(), "September 2021");
        assert_eq!(month_name(1), Some("January"));
        assert_eq!(month_name(13), None);
        assert_eq!(month_name(0), None);
    }

    #[test]
    fn parse_month_of_year_accepts_numbers_and_names() {
        assert_eq!(parse_month_of_year("3"), Some(3));
        assert_eq!(parse_month_of_year("03"), Some(3));
        assert_eq!(parse_month_of_year("march"), Some(3));
        assert_eq!(parse_month_of_year("DEC"), Some(12));
        assert_eq!(parse_month_of_year("13"), None);
        assert_eq!(parse_month_of_year("Smarch"), None);
    }

    #[test]
    fn catalog_sorts_and_dedups_keys() {
        let catalog = MonthCatalog::from_keys([
            MonthKey::new(2021, 2).unwrap(),
            MonthKey::new(2020, 12).unwrap(),
            MonthKey::new(2021, 2).unwrap(),
        ]);
        assert_eq!(
            catalog.entries(),
            vec![
                ("2020-12".to_string(), "Dec 2020".to_string()),
                ("2021-02".to_string(), "Feb 2021".to_string()),
            ]
        );
    }

    #[test]
    fn catalog_round_trips_labels() {
        let catalog = MonthCatalog::from_keys((1..=12).map(|m| MonthKey::new(2020, m).unwrap()));
        for key in catalog.keys() {
            let label = catalog.key_to_label(key).expect("label present");
            assert_eq!(catalog.label_to_key(&label).unwrap(), *key);
        }
    }

    #[test]
    fn catalog_rejects_unknown_labels() {
        let catalog = MonthCatalog::from_keys([MonthKey::new(2020, 1).unwrap()]);
        assert_eq!(
            catalog.label_to_key("Feb 2020"),
            Err(LookupError::UnknownLabel("Feb 2020".to_string()))
        );
        assert_eq!(
            catalog.key_to_label(&MonthKey::new(2020, 2).unwrap()),
            None
        );
    }
}
