//! Ranked vocabulary from a global token table.

use super::TokenCounts;
use crate::error::{helpers::write_failed, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const DEFAULT_TOP_K: usize = 1000;

/// Keeps the `top_k` most frequent tokens
#[derive(Debug, Clone, Copy)]
pub struct VocabularyBuilder {
    top_k: usize,
}

impl Default for VocabularyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

impl VocabularyBuilder {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    /// Tokens by descending multiplicity. Equal counts keep the order in
    /// which the tokens were first merged.
    pub fn build(&self, counts: &TokenCounts) -> Vec<String> {
        let mut ranked: Vec<(&str, u64)> = counts.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
            .into_iter()
            .take(self.top_k)
            .map(|(token, _)| token.to_string())
            .collect()
    }

    /// Write one token per line
    pub fn write(&self, tokens: &[String], path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| write_failed(parent, e))?;
        }
        let file = File::create(path).map_err(|e| write_failed(path, e))?;
        let mut writer = BufWriter::new(file);
        for token in tokens {
            writeln!(writer, "{}", token).map_err(|e| write_failed(path, e))?;
        }
        writer.flush().map_err(|e| write_failed(path, e))?;

        info!("Wrote {} tokens to {}", tokens.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn counts(pairs: &[(&str, u64)]) -> TokenCounts {
        pairs.iter().map(|(t, n)| (t.to_string(), *n)).collect()
    }

    #[test]
    fn test_ties_keep_first_encounter_order() {
        let table = counts(&[("A", 10), ("B", 10), ("C", 5)]);
        assert_eq!(VocabularyBuilder::new(2).build(&table), vec!["A", "B"]);

        let table = counts(&[("B", 10), ("C", 5), ("A", 10)]);
        assert_eq!(VocabularyBuilder::new(2).build(&table), vec!["B", "A"]);
    }

    #[test]
    fn test_fewer_tokens_than_k() {
        let table = counts(&[("GT", 1), ("AC", 4)]);
        assert_eq!(
            VocabularyBuilder::default().build(&table),
            vec!["AC", "GT"]
        );
        assert!(VocabularyBuilder::new(3).build(&TokenCounts::new()).is_empty());
    }

    #[test]
    fn test_write_one_token_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vocab.txt");
        let tokens = vec!["ACGT".to_string(), "GG".to_string()];

        VocabularyBuilder::default().write(&tokens, &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "ACGT\nGG\n");
    }

    proptest! {
        #[test]
        fn prop_vocab_is_bounded_and_non_increasing(
            entries in prop::collection::vec(("[ACGT]{1,5}", 0u64..50), 0..80),
            top_k in 1usize..40,
        ) {
            let table: TokenCounts = entries.into_iter().collect();
            let vocab = VocabularyBuilder::new(top_k).build(&table);

            prop_assert!(vocab.len() <= top_k);
            prop_assert_eq!(vocab.len(), top_k.min(table.len()));
            let ranks: Vec<u64> = vocab.iter().map(|t| table.get(t).unwrap()).collect();
            prop_assert!(ranks.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}
