//! Translation of user-facing selections into predicates over a dataset.
//!
//! A [`FilterSpec`] holds what a user picked: display labels for months and
//! category names per dimension. [`FilterSpec::resolve`] checks every label
//! and category against the dataset and produces a [`ResolvedFilter`] in
//! canonical terms (month keys, category sets), which is what queries
//! evaluate and what cache keys are derived from.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result as AnyResult, anyhow};
use itertools::Itertools;

use crate::{
    dataset::{CleanDataset, CleanRecord},
    error::{LookupError, PipelineError},
    month::{MonthCatalog, MonthKey},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MonthSelection {
    #[default]
    All,
    /// One month by display label, e.g. `Jan 2021`.
    Label(String),
    /// Inclusive span between two display labels, in either order.
    Range(String, String),
    /// A month of the year (1–12) across every year in the dataset.
    CalendarMonth(u32),
}

/// Selects the canonical month keys named by `selection`.
///
/// `Range` covers every key between the two labels' positions in the sorted
/// key list, whichever label comes first. Returns `None` for `All`.
pub fn select_months(
    catalog: &MonthCatalog,
    selection: &MonthSelection,
) -> Result<Option<Vec<MonthKey>>, LookupError> {
    let keys = catalog.keys();
    let selected = match selection {
        MonthSelection::All => return Ok(None),
        MonthSelection::Label(label) => vec![catalog.label_to_key(label)?],
        MonthSelection::Range(start, end) => {
            let a = catalog.position(start)?;
            let b = catalog.position(end)?;
            keys[a.min(b)..=a.max(b)].to_vec()
        }
        MonthSelection::CalendarMonth(month) => {
            if !(1..=12).contains(month) {
                return Err(LookupError::InvalidCalendarMonth(*month));
            }
            keys.iter()
                .filter(|key| key.month() == *month)
                .copied()
                .collect()
        }
    };
    Ok(Some(selected))
}

/// Checks a category selection against the available values.
///
/// An empty selection falls back to the first available value so that the
/// result is never empty.
pub fn select_categories(
    dimension: &str,
    available: &[String],
    requested: &[String],
) -> Result<BTreeSet<String>, LookupError> {
    if requested.is_empty() {
        let first = available
            .first()
            .ok_or_else(|| LookupError::NoCategories(dimension.to_string()))?;
        return Ok(BTreeSet::from([first.clone()]));
    }
    requested
        .iter()
        .map(|value| {
            if available.binary_search(value).is_ok() {
                Ok(value.clone())
            } else {
                Err(LookupError::UnknownCategory {
                    dimension: dimension.to_string(),
                    value: value.clone(),
                })
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Allowed values per dimension. Dimensions not listed are unconstrained.
    pub categories: BTreeMap<String, Vec<String>>,
    pub months: MonthSelection,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, dimension: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .entry(dimension.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn month(mut self, label: &str) -> Self {
        self.months = MonthSelection::Label(label.to_string());
        self
    }

    pub fn month_range(mut self, start: &str, end: &str) -> Self {
        self.months = MonthSelection::Range(start.to_string(), end.to_string());
        self
    }

    pub fn calendar_month(mut self, month: u32) -> Self {
        self.months = MonthSelection::CalendarMonth(month);
        self
    }

    pub fn resolve(&self, dataset: &CleanDataset) -> Result<ResolvedFilter, PipelineError> {
        let mut categories = Vec::with_capacity(self.categories.len());
        for (dimension, requested) in &self.categories {
            let index = dataset.schema().dimension_index(dimension)?;
            let available = dataset.available_categories(dimension)?;
            let allowed = select_categories(dimension, available, requested)?;
            categories.push(CategoryPredicate {
                dimension: dimension.clone(),
                index,
                allowed,
            });
        }
        let months = select_months(dataset.months(), &self.months)?;
        Ok(ResolvedFilter { categories, months })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CategoryPredicate {
    dimension: String,
    index: usize,
    allowed: BTreeSet<String>,
}

/// A filter in canonical terms. Two specs that select the same records, such
/// as a range given in either order, resolve to equal filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFilter {
    /// Ordered by dimension name.
    categories: Vec<CategoryPredicate>,
    /// Sorted; `None` means every month.
    months: Option<Vec<MonthKey>>,
}

impl ResolvedFilter {
    pub fn everything() -> Self {
        Self {
            categories: Vec::new(),
            months: None,
        }
    }

    pub fn months(&self) -> Option<&[MonthKey]> {
        self.months.as_deref()
    }

    pub fn allowed(&self, dimension: &str) -> Option<&BTreeSet<String>> {
        self.categories
            .iter()
            .find(|predicate| predicate.dimension == dimension)
            .map(|predicate| &predicate.allowed)
    }

    pub fn matches(&self, record: &CleanRecord) -> bool {
        if let Some(months) = &self.months
            && months.binary_search(&record.month_key).is_err()
        {
            return false;
        }
        self.categories.iter().all(|predicate| {
            record
                .dimension(predicate.index)
                .is_some_and(|value| predicate.allowed.contains(value))
        })
    }

    pub fn apply<'a>(&self, dataset: &'a CleanDataset) -> Vec<&'a CleanRecord> {
        dataset
            .records()
            .iter()
            .filter(|record| self.matches(record))
            .collect()
    }

    /// Canonical text used as the filter part of cache keys.
    pub fn fingerprint(&self) -> String {
        let categories = self
            .categories
            .iter()
            .map(|p| {
                let allowed = p.allowed.iter().map(|value| format!("{value:?}")).join(",");
                format!("{:?}:[{allowed}]", p.dimension)
            })
            .join(";");
        let months = match &self.months {
            None => "*".to_string(),
            Some(keys) => keys.iter().map(MonthKey::canonical).join(","),
        };
        format!("{{{categories}}}@[{months}]")
    }
}

/// Parses `dimension=value[,value...]`. An empty value list (`dimension=`)
/// requests the default selection for that dimension.
pub fn parse_category_selection(expression: &str) -> AnyResult<(String, Vec<String>)> {
    let trimmed = expression.trim();
    let (dimension, values) = trimmed
        .split_once('=')
        .ok_or_else(|| anyhow!("Selection '{trimmed}' must look like dimension=value[,value]"))?;
    let dimension = dimension.trim();
    if dimension.is_empty() {
        return Err(anyhow!("Selection '{trimmed}' is missing a dimension name"));
    }
    let values = values
        .split(',')
        .map(|v| unquote(v.trim()).to_string())
        .filter(|v| !v.is_empty())
        .collect();
    Ok((dimension.to_string(), values))
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        return &value[1..value.len() - 1];
    }
    value
}
