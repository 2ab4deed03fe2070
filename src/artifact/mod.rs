//! Per-batch artifact files: the poset-multiset view of one decomposition,
//! persisted as `{layer: {token: multiplicity}}` JSON.
//!
//! Layers and tokens keep the order in which they appear in the file, so
//! that aggregation sees tokens in a reproducible first-encounter order.

use crate::error::{helpers::write_failed, ErrorCode, ErrorExt, PipelineError, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// File name prefix of per-batch artifacts
pub const ARTIFACT_PREFIX: &str = "pom_data_batch_";

/// Token multiplicities of one layer, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layer {
    pub name: String,
    pub tokens: Vec<(String, u64)>,
}

/// Layered token multiplicities produced for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PosetMultiset {
    pub layers: Vec<Layer>,
}

impl PosetMultiset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer built from `(token, multiplicity)` pairs
    pub fn with_layer<I, S>(mut self, name: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        self.layers.push(Layer {
            name: name.into(),
            tokens: tokens.into_iter().map(|(t, n)| (t.into(), n)).collect(),
        });
        self
    }

    /// Every `(token, multiplicity)` entry across layers, in file order
    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.layers
            .iter()
            .flat_map(|layer| layer.tokens.iter().map(|(t, n)| (t.as_str(), *n)))
    }

    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|layer| layer.tokens.is_empty())
    }
}

/// Ordered `(key, value)` pairs serialized as a JSON object
struct OrderedPairs<'a, V>(&'a [(String, V)]);

impl<V: Serialize> Serialize for OrderedPairs<'_, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Deserializes a JSON object into `(key, value)` pairs, keeping file order
pub(crate) struct PairsVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for PairsVisitor<V> {
    type Value = Vec<(String, V)>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            pairs.push((key, value));
        }
        Ok(pairs)
    }
}

pub(crate) fn deserialize_pairs<'de, D, V>(
    deserializer: D,
) -> std::result::Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    deserializer.deserialize_map(PairsVisitor(PhantomData))
}

struct LayerTokens(Vec<(String, u64)>);

impl<'de> Deserialize<'de> for LayerTokens {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserialize_pairs(deserializer).map(LayerTokens)
    }
}

impl Serialize for PosetMultiset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.layers.len()))?;
        for layer in &self.layers {
            map.serialize_entry(&layer.name, &OrderedPairs(&layer.tokens))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PosetMultiset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let layers: Vec<(String, LayerTokens)> = deserialize_pairs(deserializer)?;
        Ok(PosetMultiset {
            layers: layers
                .into_iter()
                .map(|(name, tokens)| Layer {
                    name,
                    tokens: tokens.0,
                })
                .collect(),
        })
    }
}

/// Artifact path for a batch index
pub fn artifact_path(output_folder: &Path, batch_index: usize) -> PathBuf {
    output_folder.join(format!("{}{}.json", ARTIFACT_PREFIX, batch_index))
}

/// Write an artifact through a `.json.tmp` sibling renamed into place
pub fn write_artifact(path: &Path, pom: &PosetMultiset) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| write_failed(parent, e))?;
    }

    let json = serde_json::to_string_pretty(pom)
        .to_storage_error(format!("Failed to serialize {}", path.display()))?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json).map_err(|e| write_failed(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| write_failed(path, e))?;
    Ok(())
}

/// Read and parse one artifact; any failure is a malformed artifact
pub fn read_artifact(path: &Path) -> Result<PosetMultiset> {
    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::artifact_with_code(
            ErrorCode::ARTIFACT_MALFORMED,
            "cannot read artifact",
            Some(path.to_path_buf()),
        )
        .with_source(e)
    })?;
    serde_json::from_str(&content).to_artifact_error(ErrorCode::ARTIFACT_MALFORMED, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_keeps_file_order() {
        let pom: PosetMultiset =
            serde_json::from_str(r#"{"2": {"GT": 1, "AC": 3}, "10": {"ACGT": 2}}"#).unwrap();

        assert_eq!(pom.layers[0].name, "2");
        assert_eq!(
            pom.entries().collect::<Vec<_>>(),
            vec![("GT", 1), ("AC", 3), ("ACGT", 2)]
        );
    }

    #[test]
    fn test_negative_multiplicity_is_rejected() {
        let parsed: std::result::Result<PosetMultiset, _> =
            serde_json::from_str(r#"{"layer1": {"AC": -1}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_non_object_layer_is_rejected() {
        let parsed: std::result::Result<PosetMultiset, _> =
            serde_json::from_str(r#"{"layer1": ["AC"]}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = artifact_path(dir.path(), 7);
        let pom = PosetMultiset::new()
            .with_layer("0", [("A", 4), ("C", 2)])
            .with_layer("1", [("AC", 2)]);

        write_artifact(&path, &pom).unwrap();

        assert_eq!(path.file_name().unwrap(), "pom_data_batch_7.json");
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(read_artifact(&path).unwrap(), pom);
    }

    #[test]
    fn test_read_malformed_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pom_data_batch_1.json");
        fs::write(&path, "{\"layer1\": {\"AC\": 3,").unwrap();

        let err = read_artifact(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ARTIFACT_MALFORMED);
        assert_eq!(err.exit_code(), 6);
    }
}
