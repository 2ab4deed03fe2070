//! Fan-in of per-batch artifacts into one global token multiplicity table.
//!
//! The fold is a plain sum, so artifacts may be merged in any order and
//! partial tables can be merged with each other. Tokens keep the order in
//! which they were first encountered; ranking relies on it for ties.

pub mod vocab;

pub use vocab::VocabularyBuilder;

use crate::artifact::{deserialize_pairs, read_artifact, PosetMultiset};
use crate::error::{helpers::write_failed, ErrorCode, ErrorExt, PipelineError, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Token to total multiplicity, in first-encounter order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenCounts {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl TokenCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` to `token`; empty tokens are ignored
    pub fn add(&mut self, token: &str, count: u64) {
        if token.is_empty() {
            return;
        }
        match self.index.get(token) {
            Some(&slot) => {
                let total = &mut self.entries[slot].1;
                *total = total.saturating_add(count);
            }
            None => {
                self.index.insert(token.to_string(), self.entries.len());
                self.entries.push((token.to_string(), count));
            }
        }
    }

    /// Fold every layer of one artifact
    pub fn merge_multiset(&mut self, pom: &PosetMultiset) {
        for (token, count) in pom.entries() {
            self.add(token, count);
        }
    }

    pub fn merge(&mut self, other: &TokenCounts) {
        for (token, count) in other.iter() {
            self.add(token, count);
        }
    }

    pub fn get(&self, token: &str) -> Option<u64> {
        self.index.get(token).map(|&slot| self.entries[slot].1)
    }

    /// Number of distinct tokens
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the lengths of all distinct tokens, in characters
    pub fn total_token_length(&self) -> usize {
        self.entries
            .iter()
            .map(|(token, _)| token.chars().count())
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries
            .iter()
            .map(|(token, count)| (token.as_str(), *count))
    }
}

impl FromIterator<(String, u64)> for TokenCounts {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut counts = TokenCounts::new();
        for (token, count) in iter {
            counts.add(&token, count);
        }
        counts
    }
}

impl Serialize for TokenCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (token, count) in &self.entries {
            map.serialize_entry(token, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TokenCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pairs: Vec<(String, u64)> = deserialize_pairs(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationSummary {
    pub artifacts: usize,
    pub distinct_tokens: usize,
    pub total_token_length: usize,
}

impl AggregationSummary {
    pub fn log(&self) {
        info!("Merged {} artifacts", self.artifacts);
        info!("Length of dictionary: {}", self.distinct_tokens);
        info!(
            "Cumulative length of all keys in dictionary: {}",
            self.total_token_length
        );
    }
}

/// Reads artifacts from folders (non-recursive `*.json`) or explicit files
pub struct Aggregator {
    sources: Vec<PathBuf>,
}

impl Aggregator {
    pub fn new(sources: Vec<PathBuf>) -> Self {
        Self { sources }
    }

    /// Artifact files of every source, each folder's files sorted by path
    pub fn collect_artifact_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for source in &self.sources {
            if source.is_file() {
                files.push(source.clone());
                continue;
            }
            if !source.is_dir() {
                return Err(PipelineError::artifact_with_code(
                    ErrorCode::ARTIFACT_FOLDER_NOT_FOUND,
                    "artifact source does not exist",
                    Some(source.clone()),
                ));
            }

            let mut found = Vec::new();
            let entries = fs::read_dir(source).map_err(|e| {
                PipelineError::artifact_with_code(
                    ErrorCode::ARTIFACT_FOLDER_NOT_FOUND,
                    "cannot list artifact folder",
                    Some(source.clone()),
                )
                .with_source(e)
            })?;
            for entry in entries {
                let path = entry?.path();
                if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                    found.push(path);
                }
            }
            found.sort();
            debug!("{} artifacts in {}", found.len(), source.display());
            files.extend(found);
        }
        Ok(files)
    }

    /// Fold every artifact into a fresh table. A malformed artifact aborts.
    pub fn aggregate(&self) -> Result<(TokenCounts, AggregationSummary)> {
        let files = self.collect_artifact_files()?;
        let mut counts = TokenCounts::new();
        for file in &files {
            debug!("Merging {}", file.display());
            counts.merge_multiset(&read_artifact(file)?);
        }

        let summary = AggregationSummary {
            artifacts: files.len(),
            distinct_tokens: counts.len(),
            total_token_length: counts.total_token_length(),
        };
        Ok((counts, summary))
    }
}

/// Write the global table as pretty JSON through a temporary sibling
pub fn write_totals(counts: &TokenCounts, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_failed(parent, e))?;
    }
    let json = serde_json::to_string_pretty(counts)
        .to_storage_error(format!("Failed to serialize {}", path.display()))?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json).map_err(|e| write_failed(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| write_failed(path, e))?;
    info!("Wrote token totals to {}", path.display());
    Ok(())
}

/// Read a table previously written by [`write_totals`]
pub fn read_totals(path: &Path) -> Result<TokenCounts> {
    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::artifact_with_code(
            ErrorCode::ARTIFACT_MALFORMED,
            "cannot read token totals",
            Some(path.to_path_buf()),
        )
        .with_source(e)
    })?;
    serde_json::from_str(&content).to_artifact_error(ErrorCode::ARTIFACT_MALFORMED, path)
}
