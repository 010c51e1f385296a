#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use energy_explorer::{
    query::QueryContext,
    schema::RecordSchema,
    source::{MemorySource, RecordSource, open_source},
};
use encoding_rs::UTF_8;
use serde_json::Value as JsonValue;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Opens a fixture file as a record source with default format detection.
pub fn fixture_source(name: &str) -> Box<dyn RecordSource> {
    open_source(&fixture_path(name), None, None, UTF_8).expect("open fixture")
}

pub fn production_context() -> QueryContext {
    QueryContext::new(fixture_source("production_2020.json"), RecordSchema::energy())
}

pub fn weather_context() -> QueryContext {
    QueryContext::new(fixture_source("weather_2020.csv"), RecordSchema::weather())
}

pub fn memory_context(rows: JsonValue) -> QueryContext {
    let values = rows.as_array().cloned().expect("array of rows");
    QueryContext::new(
        Box::new(MemorySource::from_values("inline", values)),
        RecordSchema::energy(),
    )
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}
