//! Timestamp parsing, month derivation and measure coercion.
//!
//! A record whose primary timestamp cannot be parsed is dropped. Secondary
//! timestamps, dimensions and measures that cannot be read become `None` and
//! the record is kept; every such coercion is counted in [`Diagnostics`].

use serde_json::Value as JsonValue;

use crate::{
    data::{RawRecord, category_value, measure_value, timestamp_value},
    dataset::{CleanRecord, Diagnostics, DropReason},
    month::MonthKey,
    schema::RecordSchema,
};

pub struct TimeNormalizer<'a> {
    schema: &'a RecordSchema,
    formats: Vec<&'a str>,
}

impl<'a> TimeNormalizer<'a> {
    pub fn new(schema: &'a RecordSchema) -> Self {
        Self {
            schema,
            formats: schema.timestamp_formats(),
        }
    }

    pub fn normalize(&self, raw: &RawRecord, diagnostics: &mut Diagnostics) -> Option<CleanRecord> {
        let Some(start_time) = timestamp_value(raw.get(&self.schema.timestamp), &self.formats)
        else {
            diagnostics.record_drop(DropReason::UnparseableTimestamp);
            return None;
        };

        let secondary_times = self
            .schema
            .secondary_timestamps
            .iter()
            .map(|field| {
                let value = raw.get(field);
                let parsed = timestamp_value(value, &self.formats);
                if parsed.is_none() && is_present(value) {
                    diagnostics.record_null_secondary(field);
                }
                parsed
            })
            .collect();

        let dimensions = self
            .schema
            .dimensions
            .iter()
            .map(|field| {
                let value = raw.get(field).and_then(category_value);
                if value.is_none() {
                    diagnostics.record_missing_dimension(field);
                }
                value
            })
            .collect();

        let measures = self
            .schema
            .measures
            .iter()
            .map(|field| {
                let value = raw.get(field);
                let parsed = value.and_then(measure_value);
                if parsed.is_none() && is_present(value) {
                    diagnostics.record_null_measure(field);
                }
                parsed
            })
            .collect();

        let month_key = MonthKey::from_datetime(&start_time);
        Some(CleanRecord {
            start_time,
            secondary_times,
            dimensions,
            measures,
            month: month_key.month(),
            month_name: month_key.name(),
            month_key,
        })
    }
}

fn is_present(value: Option<&JsonValue>) -> bool {
    !matches!(value, None | Some(JsonValue::Null))
}
