//! Readers that yield raw sequences in their stored order.

use crate::error::{ErrorCode, PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Column holding sequences in the annotation export
pub const DEFAULT_SEQUENCE_COLUMN: &str = "DNA_Sequence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// CSV with a header row; sequences come from one named column
    Csv,
    /// One sequence per line, blank lines ignored
    Lines,
}

impl SourceFormat {
    /// Pick the format from the file extension
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => SourceFormat::Csv,
            _ => SourceFormat::Lines,
        }
    }
}

pub type SequenceIter = Box<dyn Iterator<Item = Result<String>>>;

/// Open `path` and return a lazy iterator over its sequences
pub fn open_sequences(
    path: &Path,
    format: Option<SourceFormat>,
    column: &str,
) -> Result<SequenceIter> {
    let file = File::open(path).map_err(|e| {
        PipelineError::input_with_code(
            ErrorCode::INPUT_NOT_FOUND,
            "cannot open sequence source",
            Some(path.to_path_buf()),
        )
        .with_source(e)
    })?;

    let format = format.unwrap_or_else(|| SourceFormat::detect(path));
    info!("Reading sequences from {} ({:?})", path.display(), format);

    match format {
        SourceFormat::Csv => csv_sequences(file, column, path.to_path_buf()),
        SourceFormat::Lines => Ok(line_sequences(file, path.to_path_buf())),
    }
}

/// Sequences from the named column of a headed CSV stream
pub fn csv_sequences<R>(reader: R, column: &str, origin: PathBuf) -> Result<SequenceIter>
where
    R: Read + 'static,
{
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader.headers().map_err(|e| {
        PipelineError::input_with_code(
            ErrorCode::INPUT_MALFORMED_RECORD,
            "cannot read CSV header",
            Some(origin.clone()),
        )
        .with_source(e)
    })?;

    let position = headers.iter().position(|h| h == column).ok_or_else(|| {
        PipelineError::input_with_code(
            ErrorCode::INPUT_MISSING_COLUMN,
            format!(
                "column '{}' not found (available: {})",
                column,
                headers.iter().collect::<Vec<_>>().join(", ")
            ),
            Some(origin.clone()),
        )
    })?;
    debug!("Sequence column '{}' at position {}", column, position);

    Ok(Box::new(reader.into_records().map(move |record| {
        let record = record.map_err(|e| {
            PipelineError::input_with_code(
                ErrorCode::INPUT_MALFORMED_RECORD,
                "malformed CSV record",
                Some(origin.clone()),
            )
            .with_source(e)
        })?;
        // Short rows read as an empty sequence, which yields no fragments
        Ok(record.get(position).unwrap_or_default().to_string())
    })))
}

/// Sequences stored one per line
pub fn line_sequences<R>(reader: R, origin: PathBuf) -> SequenceIter
where
    R: Read + 'static,
{
    Box::new(
        BufReader::new(reader)
            .lines()
            .map(move |line| {
                line.map_err(|e| {
                    PipelineError::input_with_code(
                        ErrorCode::INPUT_MALFORMED_RECORD,
                        "cannot read sequence line",
                        Some(origin.clone()),
                    )
                    .with_source(e)
                })
            })
            .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
            .map(|line| line.map(|l| l.trim().to_string())),
    )
}
