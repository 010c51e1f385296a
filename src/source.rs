//! Record sources: where raw rows come from.
//!
//! File-backed sources read their bytes once when opened, so the identity
//! (origin plus a SHA-256 of the content) and the parsed rows always describe
//! the same snapshot. Reading stdin through `-` works the same way.

use std::{fmt, path::Path};

use clap::ValueEnum;
use encoding_rs::{Encoding, UTF_8};
use log::debug;
use serde_json::Value as JsonValue;

use crate::{
    data::{RawRecord, describe_kind},
    error::SourceError,
    hash,
    io_utils::{self, DEFAULT_CSV_DELIMITER},
};

/// Anything that can hand the pipeline a batch of raw rows.
pub trait RecordSource: Send + Sync {
    /// Deterministic name for the data this source yields. Two sources with
    /// the same identity must yield the same rows.
    fn identity(&self) -> String;

    fn read(&self) -> Result<Vec<RawRecord>, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum SourceFormat {
    Json,
    Jsonl,
    Csv,
}

impl SourceFormat {
    /// Guesses the format from the file extension; unknown extensions and
    /// stdin are treated as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jsonl" | "ndjson") => SourceFormat::Jsonl,
            Some("csv" | "tsv") => SourceFormat::Csv,
            _ => SourceFormat::Json,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceFormat::Json => "json",
            SourceFormat::Jsonl => "jsonl",
            SourceFormat::Csv => "csv",
        })
    }
}

/// Bytes captured from a file or stdin, plus how to decode them. The content
/// digest is taken once on capture.
#[derive(Debug, Clone)]
pub struct RawInput {
    origin: String,
    bytes: Vec<u8>,
    digest: String,
    encoding: &'static Encoding,
}

impl RawInput {
    pub fn from_path(path: &Path, encoding: &'static Encoding) -> Result<Self, SourceError> {
        let origin = if io_utils::is_dash(path) {
            "<stdin>".to_string()
        } else {
            path.display().to_string()
        };
        let bytes = io_utils::read_input_bytes(path).map_err(|source| SourceError::Io {
            origin: origin.clone(),
            source,
        })?;
        debug!("Read {} byte(s) from {origin}", bytes.len());
        Ok(Self::new(origin, bytes, encoding))
    }

    pub fn from_bytes(origin: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(origin.into(), bytes.into(), UTF_8)
    }

    fn new(origin: String, bytes: Vec<u8>, encoding: &'static Encoding) -> Self {
        let digest = hash::sha256_hex(&bytes);
        Self {
            origin,
            bytes,
            digest,
            encoding,
        }
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn identity(&self, format: SourceFormat) -> String {
        format!("{format}:{}#{}", self.origin, self.digest)
    }

    fn text(&self) -> Result<String, SourceError> {
        io_utils::decode_text(&self.bytes, self.encoding).map_err(|err| SourceError::Decode {
            origin: self.origin.clone(),
            message: err.to_string(),
        })
    }
}

/// A JSON array of row objects, or an object carrying that array under
/// `data` or `records`.
#[derive(Debug, Clone)]
pub struct JsonSource {
    input: RawInput,
}

impl JsonSource {
    pub fn new(input: RawInput) -> Self {
        Self { input }
    }
}

impl RecordSource for JsonSource {
    fn identity(&self) -> String {
        self.input.identity(SourceFormat::Json)
    }

    fn read(&self) -> Result<Vec<RawRecord>, SourceError> {
        let origin = self.input.origin();
        let document: JsonValue =
            serde_json::from_str(&self.input.text()?).map_err(|source| SourceError::Json {
                origin: origin.to_string(),
                source,
            })?;
        let rows = match document {
            JsonValue::Array(rows) => rows,
            JsonValue::Object(mut map) => match ["data", "records"]
                .iter()
                .find_map(|key| map.remove(*key))
            {
                Some(JsonValue::Array(rows)) => rows,
                Some(other) => return Err(shape_error(origin, describe_kind(&other))),
                None => return Err(shape_error(origin, "object without 'data' or 'records'")),
            },
            other => return Err(shape_error(origin, describe_kind(&other))),
        };
        rows.into_iter()
            .enumerate()
            .map(|(idx, row)| match row {
                JsonValue::Object(map) => Ok(map),
                other => Err(shape_error(
                    origin,
                    &format!("row {} is {}", idx + 1, describe_kind(&other)),
                )),
            })
            .collect()
    }
}

/// One JSON object per line. Blank lines are skipped.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    input: RawInput,
}

impl JsonLinesSource {
    pub fn new(input: RawInput) -> Self {
        Self { input }
    }
}

impl RecordSource for JsonLinesSource {
    fn identity(&self) -> String {
        self.input.identity(SourceFormat::Jsonl)
    }

    fn read(&self) -> Result<Vec<RawRecord>, SourceError> {
        let text = self.input.text()?;
        let mut rows = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let origin = format!("{} line {}", self.input.origin(), idx + 1);
            match serde_json::from_str::<JsonValue>(line) {
                Ok(JsonValue::Object(map)) => rows.push(map),
                Ok(other) => return Err(shape_error(&origin, describe_kind(&other))),
                Err(source) => return Err(SourceError::Json { origin, source }),
            }
        }
        Ok(rows)
    }
}

/// Header row plus data rows. Every cell is a string; empty cells are null.
#[derive(Debug, Clone)]
pub struct CsvSource {
    input: RawInput,
    delimiter: u8,
}

impl CsvSource {
    pub fn new(input: RawInput, delimiter: u8) -> Self {
        Self { input, delimiter }
    }
}

impl RecordSource for CsvSource {
    fn identity(&self) -> String {
        let delimiter = self.delimiter as char;
        format!("{}|delimiter={delimiter:?}", self.input.identity(SourceFormat::Csv))
    }

    fn read(&self) -> Result<Vec<RawRecord>, SourceError> {
        let origin = self.input.origin();
        let csv_error = |source| SourceError::Csv {
            origin: origin.to_string(),
            source,
        };
        let text = self.input.text()?;
        let mut reader = io_utils::open_csv_reader(text.as_bytes(), self.delimiter);
        let headers = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let row = headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| {
                    let value = if cell.trim().is_empty() {
                        JsonValue::Null
                    } else {
                        JsonValue::String(cell.to_string())
                    };
                    (header.clone(), value)
                })
                .collect::<RawRecord>();
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Rows already in memory, under a caller-chosen identity.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    rows: Vec<RawRecord>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, rows: Vec<RawRecord>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Builds from JSON values, skipping anything that is not an object.
    pub fn from_values(name: impl Into<String>, values: Vec<JsonValue>) -> Self {
        let rows = values
            .into_iter()
            .filter_map(|value| match value {
                JsonValue::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Self::new(name, rows)
    }
}

impl RecordSource for MemorySource {
    fn identity(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn read(&self) -> Result<Vec<RawRecord>, SourceError> {
        Ok(self.rows.clone())
    }
}

/// Opens `path` (or stdin for `-`) as a record source. `format` defaults to
/// the one implied by the extension.
pub fn open_source(
    path: &Path,
    format: Option<SourceFormat>,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> Result<Box<dyn RecordSource>, SourceError> {
    let format = format.unwrap_or_else(|| SourceFormat::from_path(path));
    let input = RawInput::from_path(path, encoding)?;
    debug!("Opening {} as {format}", input.origin());
    Ok(match format {
        SourceFormat::Json => Box::new(JsonSource::new(input)),
        SourceFormat::Jsonl => Box::new(JsonLinesSource::new(input)),
        SourceFormat::Csv => {
            let delimiter = if io_utils::is_dash(path) {
                delimiter.unwrap_or(DEFAULT_CSV_DELIMITER)
            } else {
                io_utils::resolve_input_delimiter(path, delimiter)
            };
            Box::new(CsvSource::new(input, delimiter))
        }
    })
}

fn shape_error(origin: &str, found: &str) -> SourceError {
    SourceError::Shape {
        origin: origin.to_string(),
        found: found.to_string(),
    }
}
