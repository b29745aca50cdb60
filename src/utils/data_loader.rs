//! CSV loading and saving

use crate::error::{ExoError, Result};
use polars::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// CSV loader for survey exports.
///
/// Archive exports open with `#` comment lines; those are dropped before
/// parsing. Every column is read as a string so mixed or dirty numeric
/// columns survive intact and are coerced later.
pub struct DataLoader {
    comment_prefix: Option<char>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self { comment_prefix: Some('#') }
    }

    /// Parse comment lines as data
    pub fn without_comments(mut self) -> Self {
        self.comment_prefix = None;
        self
    }

    /// Load a CSV file
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();
        let bytes = fs::read(path)
            .map_err(|e| ExoError::DataError(format!("Failed to read {}: {}", path.display(), e)))?;
        let df = self.load_csv_bytes(&bytes)?;
        debug!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "CSV loaded"
        );
        Ok(df)
    }

    /// Parse CSV content held in memory
    pub fn load_csv_bytes(&self, bytes: &[u8]) -> Result<DataFrame> {
        let text = String::from_utf8_lossy(bytes);
        let body: String = match self.comment_prefix {
            Some(prefix) => text
                .lines()
                .filter(|line| !line.trim_start().starts_with(prefix))
                .flat_map(|line| [line, "\n"])
                .collect(),
            None => text.into_owned(),
        };
        if body.trim().is_empty() {
            return Err(ExoError::DataError("CSV input is empty".to_string()));
        }

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(body.into_bytes()))
            .finish()
            .map_err(|e| ExoError::DataError(format!("Failed to parse CSV: {}", e)))
    }
}

/// CSV writer
pub struct DataSaver;

impl DataSaver {
    /// Save to a CSV file
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = fs::File::create(path.as_ref())?;
        CsvWriter::new(&mut file)
            .finish(df)
            .map_err(|e| ExoError::DataError(e.to_string()))
    }

    /// Render a frame as CSV bytes
    pub fn to_csv_bytes(df: &mut DataFrame) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        CsvWriter::new(&mut buffer)
            .finish(df)
            .map_err(|e| ExoError::DataError(e.to_string()))?;
        Ok(buffer)
    }
}
