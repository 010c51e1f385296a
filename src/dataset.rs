//! The validated, normalized dataset every query reads from.
//!
//! [`CleanDataset::build`] runs the whole cleaning pipeline: shape validation,
//! timestamp normalization and month derivation. The result is immutable and
//! carries the [`Diagnostics`] collected on the way so callers can surface
//! dropped rows and coerced values instead of only finding them in the log.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    data::RawRecord,
    error::{ConfigError, PipelineError},
    hash,
    month::{MonthCatalog, MonthKey},
    normalize::TimeNormalizer,
    schema::RecordSchema,
    validate::SchemaValidator,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanRecord {
    pub start_time: NaiveDateTime,
    /// Parallel to [`RecordSchema::secondary_timestamps`].
    pub secondary_times: Vec<Option<NaiveDateTime>>,
    /// Parallel to [`RecordSchema::dimensions`].
    pub dimensions: Vec<Option<String>>,
    /// Parallel to [`RecordSchema::measures`].
    pub measures: Vec<Option<f64>>,
    pub month: u32,
    pub month_name: &'static str,
    pub month_key: MonthKey,
}

impl CleanRecord {
    pub fn dimension(&self, index: usize) -> Option<&str> {
        self.dimensions.get(index).and_then(|v| v.as_deref())
    }

    pub fn measure(&self, index: usize) -> Option<f64> {
        self.measures.get(index).copied().flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DropReason {
    /// A declared field held a sequence or mapping.
    InvalidShape,
    /// The primary timestamp was missing or unparseable.
    UnparseableTimestamp,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::InvalidShape => "invalid shape",
            DropReason::UnparseableTimestamp => "unparseable timestamp",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped: BTreeMap<DropReason, usize>,
    pub invalid_fields: BTreeMap<String, usize>,
    pub null_secondary: BTreeMap<String, usize>,
    pub null_measures: BTreeMap<String, usize>,
    pub missing_dimensions: BTreeMap<String, usize>,
}

impl Diagnostics {
    pub fn record_drop(&mut self, reason: DropReason) {
        self.record_drops(reason, 1);
    }

    pub fn record_drops(&mut self, reason: DropReason, count: usize) {
        if count > 0 {
            *self.dropped.entry(reason).or_insert(0) += count;
        }
    }

    pub fn record_null_secondary(&mut self, field: &str) {
        bump(&mut self.null_secondary, field);
    }

    pub fn record_null_measure(&mut self, field: &str) {
        bump(&mut self.null_measures, field);
    }

    pub fn record_missing_dimension(&mut self, field: &str) {
        bump(&mut self.missing_dimensions, field);
    }

    pub fn dropped(&self, reason: DropReason) -> usize {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }

    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    /// `(check, field, count)` rows for display.
    pub fn render_rows(&self) -> Vec<Vec<String>> {
        let mut rows = vec![
            vec!["rows read".to_string(), String::new(), self.rows_read.to_string()],
            vec!["rows kept".to_string(), String::new(), self.rows_kept.to_string()],
        ];
        for (reason, count) in &self.dropped {
            rows.push(vec![
                format!("dropped: {reason}"),
                String::new(),
                count.to_string(),
            ]);
        }
        for (label, counts) in [
            ("invalid field", &self.invalid_fields),
            ("null timestamp", &self.null_secondary),
            ("null measure", &self.null_measures),
            ("missing dimension", &self.missing_dimensions),
        ] {
            for (field, count) in counts {
                rows.push(vec![label.to_string(), field.clone(), count.to_string()]);
            }
        }
        rows
    }
}

fn bump(counts: &mut BTreeMap<String, usize>, field: &str) {
    *counts.entry(field.to_string()).or_insert(0) += 1;
}

#[derive(Debug, Clone)]
pub struct CleanDataset {
    identity: String,
    schema: RecordSchema,
    records: Vec<CleanRecord>,
    months: MonthCatalog,
    /// Distinct values per dimension, ascending.
    categories: Vec<Vec<String>>,
    diagnostics: Diagnostics,
}

impl CleanDataset {
    /// Validates and normalizes `rows`. `source_identity` names where the rows
    /// came from and, with the schema fingerprint, identifies the dataset in
    /// cache keys.
    pub fn build(
        source_identity: &str,
        schema: RecordSchema,
        rows: Vec<RawRecord>,
    ) -> Result<Self, PipelineError> {
        schema.validate()?;
        let validator = SchemaValidator::new(schema.scalar_fields())?;

        let mut diagnostics = Diagnostics {
            rows_read: rows.len(),
            ..Diagnostics::default()
        };
        let (valid, rejected) = validator.retain_valid(rows);
        let invalid = rejected.values().sum::<usize>();
        diagnostics.record_drops(DropReason::InvalidShape, invalid);
        diagnostics.invalid_fields = rejected;
        if invalid > 0 {
            warn!("Filtered out {invalid} invalid record(s) from {source_identity}");
        }

        let normalizer = TimeNormalizer::new(&schema);
        let records = valid
            .iter()
            .filter_map(|raw| normalizer.normalize(raw, &mut diagnostics))
            .collect::<Vec<_>>();
        let unparseable = diagnostics.dropped(DropReason::UnparseableTimestamp);
        if unparseable > 0 {
            warn!(
                "Dropped {unparseable} record(s) with unparseable '{}' from {source_identity}",
                schema.timestamp
            );
        }
        diagnostics.rows_kept = records.len();

        if records.is_empty() {
            return Err(PipelineError::EmptySource {
                rows_read: diagnostics.rows_read,
                dropped: diagnostics.dropped_total(),
            });
        }

        let months = MonthCatalog::from_keys(records.iter().map(|r| r.month_key));
        let categories: Vec<Vec<String>> = (0..schema.dimensions.len())
            .map(|index| {
                records
                    .iter()
                    .filter_map(|record| record.dimension(index))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect();
        let fingerprint = schema.fingerprint();
        let identity = hash::sha256_hex_parts([source_identity, fingerprint.as_str()]);
        info!(
            "Cleaned {} of {} record(s) spanning {} month(s)",
            diagnostics.rows_kept,
            diagnostics.rows_read,
            months.len()
        );
        debug!("Dataset identity {identity}");
        Ok(Self {
            identity,
            schema,
            records,
            months,
            categories,
            diagnostics,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn records(&self) -> &[CleanRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn months(&self) -> &MonthCatalog {
        &self.months
    }

    /// Distinct non-missing values of `dimension`, ascending.
    pub fn available_categories(&self, dimension: &str) -> Result<&[String], ConfigError> {
        let index = self.schema.dimension_index(dimension)?;
        Ok(&self.categories[index])
    }

    /// `(canonical_key, display_label)` for every month present, ascending.
    pub fn available_months(&self) -> Vec<(String, String)> {
        self.months.entries()
    }

    /// Latest value of a secondary timestamp field, ignoring nulls.
    pub fn latest(&self, field: &str) -> Result<Option<NaiveDateTime>, ConfigError> {
        let index = self.schema.secondary_index(field)?;
        Ok(self
            .records
            .iter()
            .filter_map(|record| record.secondary_times.get(index).copied().flatten())
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value as JsonValue, json};

    fn rows(value: JsonValue) -> Vec<RawRecord> {
        value
            .as_array()
            .expect("array literal")
            .iter()
            .map(|row| row.as_object().cloned().expect("object row"))
            .collect()
    }

    #[test]
    fn one_bad_row_out_of_n_is_reported_once() {
        let dataset = CleanDataset::build(
            "memory",
            RecordSchema::energy(),
            rows(json!([
                {"startTime": "2021-01-01T00:00:00", "productionGroup": "hydro", "quantityKwh": 1},
                {"startTime": "2021-01-01T01:00:00", "productionGroup": ["hydro"], "quantityKwh": 2},
                {"startTime": "2021-01-01T02:00:00", "productionGroup": "wind", "quantityKwh": 3}
            ])),
        )
        .expect("dataset");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.diagnostics().rows_read, 3);
        assert_eq!(dataset.diagnostics().dropped_total(), 1);
        assert_eq!(dataset.diagnostics().dropped(DropReason::InvalidShape), 1);
        assert_eq!(
            dataset.diagnostics().invalid_fields.get("productionGroup"),
            Some(&1)
        );
    }

    #[test]
    fn records_keep_arrival_order() {
        let dataset = CleanDataset::build(
            "memory",
            RecordSchema::energy(),
            rows(json!([
                {"startTime": "2021-02-01T00:00:00", "quantityKwh": 1},
                {"startTime": "2021-01-01T00:00:00", "quantityKwh": 2}
            ])),
        )
        .expect("dataset");
        let measures = dataset
            .records()
            .iter()
            .map(|r| r.measure(0))
            .collect::<Vec<_>>();
        assert_eq!(measures, vec![Some(1.0), Some(2.0)]);
        assert_eq!(
            dataset.available_months(),
            vec![
                ("2021-01".to_string(), "Jan 2021".to_string()),
                ("2021-02".to_string(), "Feb 2021".to_string())
            ]
        );
    }

    #[test]
    fn all_rows_dropped_is_an_empty_source_error() {
        let err = CleanDataset::build(
            "memory",
            RecordSchema::energy(),
            rows(json!([
                {"startTime": "garbage", "quantityKwh": 1},
                {"startTime": ["2021-01-01"], "quantityKwh": 1}
            ])),
        )
        .unwrap_err();
        match err {
            PipelineError::EmptySource { rows_read, dropped } => {
                assert_eq!(rows_read, 2);
                assert_eq!(dropped, 2);
            }
            other => panic!("expected EmptySource, got {other:?}"),
        }
    }

    #[test]
    fn invalid_schema_aborts_before_reading_rows() {
        let mut schema = RecordSchema::energy();
        schema.measures.clear();
        let err = CleanDataset::build("memory", schema, Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::NoMeasures)));
    }

    #[test]
    fn available_categories_are_sorted_and_distinct() {
        let dataset = CleanDataset::build(
            "memory",
            RecordSchema::energy(),
            rows(json!([
                {"startTime": "2021-01-01", "productionGroup": "wind", "quantityKwh": 1},
                {"startTime": "2021-01-01", "productionGroup": "hydro", "quantityKwh": 1},
                {"startTime": "2021-01-01", "productionGroup": "wind", "quantityKwh": 1},
                {"startTime": "2021-01-01", "quantityKwh": 1}
            ])),
        )
        .expect("dataset");
        assert_eq!(
            dataset.available_categories("productionGroup").unwrap(),
            vec!["hydro".to_string(), "wind".to_string()]
        );
        assert!(dataset.available_categories("fuel").is_err());
    }

    #[test]
    fn latest_secondary_timestamp_ignores_nulls() {
        let dataset = CleanDataset::build(
            "memory",
            RecordSchema::energy(),
            rows(json!([
                {"startTime": "2021-01-01", "lastUpdatedTime": "2024-12-20T10:46:00", "quantityKwh": 1},
                {"startTime": "2021-01-02", "lastUpdatedTime": "bogus", "quantityKwh": 1},
                {"startTime": "2021-01-03", "lastUpdatedTime": "2025-01-02T08:00:00", "quantityKwh": 1}
            ])),
        )
        .expect("dataset");
        let latest = dataset.latest("lastUpdatedTime").unwrap().expect("latest");
        assert_eq!(latest.to_string(), "2025-01-02 08:00:00");
        assert_eq!(dataset.diagnostics().null_secondary.get("lastUpdatedTime"), Some(&1));
    }

    #[test]
    fn identity_depends_on_source_and_schema() {
        let data = json!([{"startTime": "2021-01-01", "quantityKwh": 1}]);
        let a = CleanDataset::build("a", RecordSchema::energy(), rows(data.clone())).unwrap();
        let b = CleanDataset::build("b", RecordSchema::energy(), rows(data.clone())).unwrap();
        let a2 = CleanDataset::build("a", RecordSchema::energy(), rows(data)).unwrap();
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), a2.identity());
    }

    #[test]
    fn diagnostics_render_every_counter() {
        let mut diagnostics = Diagnostics {
            rows_read: 4,
            rows_kept: 3,
            ..Diagnostics::default()
        };
        diagnostics.record_drop(DropReason::InvalidShape);
        diagnostics.record_null_measure("quantityKwh");
        let rows = diagnostics.render_rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], vec!["dropped: invalid shape", "", "1"]);
        assert_eq!(rows[3], vec!["null measure", "quantityKwh", "1"]);
    }
}
