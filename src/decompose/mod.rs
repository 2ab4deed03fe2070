//! Contract with the external structural-decomposition (ladderpath) routine.
//!
//! The routine itself is opaque. A [`Decomposer`] receives the units of one
//! batch together with the fixed [`LadderpathSettings`] and answers with a
//! [`Decomposition`]: either a result, or the explicit "no result" variant
//! for input the routine judges degenerate. A raised fault is an `Err`.

pub mod command;

pub use command::{CommandDecomposer, DecomposerConfig};

use crate::artifact::PosetMultiset;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Version tag handed to the routine on every call
pub const LADDERPATH_INFO_TAG: &str = "V1.0.0.20240910_Alpha";

/// Fixed configuration of every decomposition call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderpathSettings {
    pub info: String,
    pub estimate_eta: bool,
    pub eta_samples: u32,
    pub eta_scope: String,
}

impl Default for LadderpathSettings {
    fn default() -> Self {
        Self {
            info: LADDERPATH_INFO_TAG.to_string(),
            estimate_eta: false,
            eta_samples: 10,
            eta_scope: "global".to_string(),
        }
    }
}

/// One call of the routine
#[derive(Debug, Clone)]
pub struct DecomposeRequest<'a> {
    pub batch_index: usize,
    pub units: &'a [String],
    pub settings: &'a LadderpathSettings,
    /// Where the routine saves its own full output for this batch
    pub save_file: PathBuf,
}

/// The three scalar summary indices of a decomposition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct LadderIndices {
    pub ladderpath: f64,
    pub order: f64,
    pub size: f64,
}

impl From<[f64; 3]> for LadderIndices {
    fn from([ladderpath, order, size]: [f64; 3]) -> Self {
        Self {
            ladderpath,
            order,
            size,
        }
    }
}

impl From<LadderIndices> for [f64; 3] {
    fn from(indices: LadderIndices) -> Self {
        [indices.ladderpath, indices.order, indices.size]
    }
}

impl fmt::Display for LadderIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ladderpath={}, order={}, size={}",
            self.ladderpath, self.order, self.size
        )
    }
}

/// Successful decomposition, reduced to the two views the pipeline needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderResult {
    pub indices: LadderIndices,
    pub pom: PosetMultiset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    /// The routine judged the batch invalid and produced nothing
    Invalid,
    Ladder(LadderResult),
}

#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, request: DecomposeRequest<'_>) -> Result<Decomposition>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_settings() {
        let settings = LadderpathSettings::default();
        assert_eq!(settings.info, "V1.0.0.20240910_Alpha");
        assert!(!settings.estimate_eta);
        assert_eq!(settings.eta_samples, 10);
        assert_eq!(settings.eta_scope, "global");
    }

    #[test]
    fn test_indices_from_json_array() {
        let indices: LadderIndices = serde_json::from_str("[12.0, 30.5, 0.4]").unwrap();
        assert_eq!(indices.ladderpath, 12.0);
        assert_eq!(indices.order, 30.5);
        assert_eq!(indices.size, 0.4);
        assert_eq!(serde_json::to_string(&indices).unwrap(), "[12.0,30.5,0.4]");
    }
}
