//! Result sinks.
//!
//! The pipeline hands the finished result set to a sink; where it ends up is
//! the caller's choice.

use crate::models::{ResultDocument, ResultSet, RunMetadata};
use log::info;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors that can occur while writing results.
#[derive(Debug)]
pub enum SinkError {
    /// IO error occurred while writing
    IoError(std::io::Error),

    /// The document could not be serialized
    SerializeError(serde_json::Error),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::IoError(e) => write!(f, "IO error: {}", e),
            SinkError::SerializeError(e) => write!(f, "Failed to serialize results: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::IoError(err)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::SerializeError(err)
    }
}

/// Accepts the results of a run.
pub trait ResultSink {
    fn write(&mut self, results: &ResultSet, metadata: &RunMetadata) -> Result<(), SinkError>;
}

/// Writes the result document as pretty-printed JSON.
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

impl ResultSink for JsonFileSink {
    fn write(&mut self, results: &ResultSet, metadata: &RunMetadata) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let document = ResultDocument {
            requests: results.requests.clone(),
            metadata: metadata.clone(),
        };
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(&self.path, json)?;

        info!("Results written to {}", self.path.display());
        Ok(())
    }
}

/// Keeps result documents in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub documents: Vec<ResultDocument>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for MemorySink {
    fn write(&mut self, results: &ResultSet, metadata: &RunMetadata) -> Result<(), SinkError> {
        self.documents.push(ResultDocument {
            requests: results.requests.clone(),
            metadata: metadata.clone(),
        });
        Ok(())
    }
}
