//! Input sources and output sinks for lead collections.

use crate::core::error::{AppError, Result};
use crate::core::models::Record;

use parking_lot::Mutex;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where records come from. Order and field names must be preserved exactly.
pub trait InputSource {
    /// Stable identifier, compared against the destination and stored in checkpoints.
    fn source_id(&self) -> String;

    fn load(&self) -> Result<Vec<Record>>;
}

/// Where the enriched collection goes.
pub trait OutputSink {
    fn destination_id(&self) -> String;

    fn emit(&self, records: &[Record]) -> Result<()>;
}

/// Fails when output would overwrite the input.
pub fn ensure_distinct(source_id: &str, destination_id: &str) -> Result<()> {
    if source_id == destination_id {
        return Err(AppError::SameDestination(source_id.to_string()));
    }
    Ok(())
}

/// Absolute, symlink-resolved form of `path`, usable before the file exists.
pub fn path_identifier(path: &Path) -> String {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical.display().to_string();
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or(absolute.clone())
            .display()
            .to_string(),
        _ => absolute.display().to_string(),
    }
}

/// Parses a lead document: a top-level array, or an object with a `leads` array.
pub fn parse_records(value: Value) -> Result<Vec<Record>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("leads") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AppError::Input(
                    "Expected a JSON array of leads or an object with a 'leads' array".to_string(),
                ))
            }
        },
        _ => {
            return Err(AppError::Input(
                "Expected a JSON array of leads or an object with a 'leads' array".to_string(),
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(Record::from_map(map)),
            other => Err(AppError::Input(format!(
                "Lead #{} is not a JSON object (found {})",
                i,
                type_name(&other)
            ))),
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputSource for JsonFileSource {
    fn source_id(&self) -> String {
        path_identifier(&self.path)
    }

    fn load(&self) -> Result<Vec<Record>> {
        if !self.path.is_file() {
            return Err(AppError::Input(format!(
                "Input file not found or is not a file: {}",
                self.path.display()
            )));
        }
        tracing::debug!("Opening input file: {}", self.path.display());
        let reader = BufReader::new(File::open(&self.path)?);
        let value: Value = serde_json::from_reader(reader)?;
        let records = parse_records(value)?;
        tracing::info!("Loaded {} records from '{}'", records.len(), self.path.display());
        Ok(records)
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for JsonFileSink {
    fn destination_id(&self) -> String {
        path_identifier(&self.path)
    }

    /// Writes a pretty-printed JSON array, creating parent directories.
    fn emit(&self, records: &[Record]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tracing::debug!("Creating output directory: {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        tracing::info!("Wrote {} records to '{}'", records.len(), self.path.display());
        Ok(())
    }
}

/// Records already in memory, identified by a caller-chosen name.
#[derive(Debug, Clone)]
pub struct VecSource {
    id: String,
    records: Vec<Record>,
}

impl VecSource {
    pub fn new(id: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            id: id.into(),
            records,
        }
    }
}

impl InputSource for VecSource {
    fn source_id(&self) -> String {
        self.id.clone()
    }

    fn load(&self) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }
}

/// Keeps the last emitted collection.
#[derive(Debug, Default)]
pub struct VecSink {
    id: String,
    records: Mutex<Vec<Record>>,
}

impl VecSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn take(&self) -> Vec<Record> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl OutputSink for VecSink {
    fn destination_id(&self) -> String {
        self.id.clone()
    }

    fn emit(&self, records: &[Record]) -> Result<()> {
        *self.records.lock() = records.to_vec();
        Ok(())
    }
}
