//! Record schema registration.
//!
//! A [`RecordSchema`] is the fixed contract every downstream component works
//! against: which field carries the primary timestamp, which optional
//! timestamps, categorical dimensions and numeric measures are expected. It is
//! registered once at startup (a built-in preset or a YAML file) instead of
//! being discovered from the data.

use std::{collections::HashSet, fmt, fs::File, io::BufReader, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{data::DEFAULT_TIMESTAMP_FORMATS, error::ConfigError, hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    SecondaryTimestamp,
    Dimension,
    Measure,
}

impl FieldRole {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldRole::SecondaryTimestamp => "secondary timestamp",
            FieldRole::Dimension => "dimension",
            FieldRole::Measure => "measure",
        }
    }
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordSchema {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_timestamps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_formats: Option<Vec<String>>,
}

impl RecordSchema {
    /// Elhub hourly production per group and price area.
    pub fn energy() -> Self {
        Self {
            timestamp: "startTime".to_string(),
            secondary_timestamps: vec!["endTime".to_string(), "lastUpdatedTime".to_string()],
            dimensions: vec!["priceArea".to_string(), "productionGroup".to_string()],
            measures: vec!["quantityKwh".to_string()],
            timestamp_formats: None,
        }
    }

    /// Hourly open-meteo weather subset.
    pub fn weather() -> Self {
        Self {
            timestamp: "time".to_string(),
            secondary_timestamps: Vec::new(),
            dimensions: Vec::new(),
            measures: [
                "temperature_2m (°C)",
                "precipitation (mm)",
                "wind_speed_10m (m/s)",
                "wind_gusts_10m (m/s)",
                "wind_direction_10m (°)",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
            timestamp_formats: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: RecordSchema =
            serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        schema
            .validate()
            .with_context(|| format!("Validating schema {path:?}"))?;
        Ok(schema)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing schema YAML")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scalar_fields().is_empty() {
            return Err(ConfigError::EmptySchema);
        }
        if self.timestamp.trim().is_empty() {
            return Err(ConfigError::MissingTimestamp);
        }
        if self.measures.is_empty() {
            return Err(ConfigError::NoMeasures);
        }
        let mut seen = HashSet::new();
        for field in self.scalar_fields() {
            if !seen.insert(field) {
                return Err(ConfigError::DuplicateField(field.to_string()));
            }
        }
        if let Some(formats) = &self.timestamp_formats
            && let Some(bad) = formats.iter().find(|f| f.trim().is_empty())
        {
            return Err(ConfigError::InvalidTimestampFormat(bad.clone()));
        }
        Ok(())
    }

    /// Every declared field in registration order: timestamp, secondary
    /// timestamps, dimensions, then measures.
    pub fn scalar_fields(&self) -> Vec<&str> {
        std::iter::once(self.timestamp.as_str())
            .filter(|name| !name.is_empty())
            .chain(self.secondary_timestamps.iter().map(String::as_str))
            .chain(self.dimensions.iter().map(String::as_str))
            .chain(self.measures.iter().map(String::as_str))
            .collect()
    }


    pub fn dimension_index(&self, name: &str) -> Result<usize, ConfigError> {
        position(&self.dimensions, name, FieldRole::Dimension)
    }

    pub fn measure_index(&self, name: &str) -> Result<usize, ConfigError> {
        position(&self.measures, name, FieldRole::Measure)
    }

    pub fn secondary_index(&self, name: &str) -> Result<usize, ConfigError> {
        position(&self.secondary_timestamps, name, FieldRole::SecondaryTimestamp)
    }

    pub fn timestamp_formats(&self) -> Vec<&str> {
        match &self.timestamp_formats {
            Some(formats) => formats.iter().map(String::as_str).collect(),
            None => DEFAULT_TIMESTAMP_FORMATS.to_vec(),
        }
    }

    /// Stable digest of the registered contract, part of every cache key.
    pub fn fingerprint(&self) -> String {
        let roles = [
            vec![self.timestamp.as_str()],
            self.secondary_timestamps.iter().map(String::as_str).collect(),
            self.dimensions.iter().map(String::as_str).collect(),
            self.measures.iter().map(String::as_str).collect(),
            self.timestamp_formats(),
        ];
        let parts = roles
            .iter()
            .flat_map(|group| group.iter().copied().chain(std::iter::once("\u{1e}")))
            .collect::<Vec<_>>();
        hash::sha256_hex_parts(parts)
    }
}

fn position(fields: &[String], name: &str, role: FieldRole) -> Result<usize, ConfigError> {
    fields
        .iter()
        .position(|field| field == name)
        .ok_or_else(|| ConfigError::UnknownField {
            role: role.as_str(),
            name: name.to_string(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaPreset {
    Energy,
    Weather,
}

impl SchemaPreset {
    pub fn schema(self) -> RecordSchema {
        match self {
            SchemaPreset::Energy => RecordSchema::energy(),
            SchemaPreset::Weather => RecordSchema::weather(),
        }
    }
}

impl FromStr for SchemaPreset {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "energy" | "production" => Ok(SchemaPreset::Energy),
            "weather" | "meteo" => Ok(SchemaPreset::Weather),
            other => Err(anyhow!(
                "Unknown schema preset '{other}' (expected 'energy' or 'weather')"
            )),
        }
    }
}
