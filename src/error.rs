//! Error taxonomy for the pipeline.
//!
//! Per-row data-quality problems are not errors; they are absorbed into
//! [`crate::dataset::Diagnostics`]. The types here cover configuration
//! mistakes, bad query parameters, source failures and an empty result after
//! cleaning.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Schema declares no fields")]
    EmptySchema,

    #[error("Schema must name a primary timestamp field")]
    MissingTimestamp,

    #[error("Schema must declare at least one measure field")]
    NoMeasures,

    #[error("Field '{0}' is declared more than once in the schema")]
    DuplicateField(String),

    #[error("Unknown {role} '{name}'")]
    UnknownField { role: &'static str, name: String },

    #[error("Invalid timestamp format '{0}'")]
    InvalidTimestampFormat(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Unknown month label '{0}'")]
    UnknownLabel(String),

    #[error("Unknown value '{value}' for dimension '{dimension}'")]
    UnknownCategory { dimension: String, value: String },

    #[error("Dimension '{0}' has no category values in the dataset")]
    NoCategories(String),

    #[error("Calendar month must be between 1 and 12, got {0}")]
    InvalidCalendarMonth(u32),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Reading {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parsing JSON from {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Parsing CSV from {origin}: {source}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },

    #[error("Decoding {origin}: {message}")]
    Decode { origin: String, message: String },

    #[error("{origin} does not contain an array of records ({found})")]
    Shape { origin: String, found: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("No valid records remain after cleaning ({rows_read} read, {dropped} dropped)")]
    EmptySource { rows_read: usize, dropped: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_errors_render_offending_value() {
        let err = PipelineError::from(LookupError::UnknownLabel("Foo 2020".to_string()));
        assert_eq!(err.to_string(), "Unknown month label 'Foo 2020'");

        let err = LookupError::UnknownCategory {
            dimension: "priceArea".to_string(),
            value: "NO9".to_string(),
        };
        assert!(err.to_string().contains("'NO9'"));
        assert!(err.to_string().contains("'priceArea'"));
    }

    #[test]
    fn empty_source_reports_counts() {
        let err = PipelineError::EmptySource {
            rows_read: 3,
            dropped: 3,
        };
        assert_eq!(
            err.to_string(),
            "No valid records remain after cleaning (3 read, 3 dropped)"
        );
    }
}
