//! Cleaning of raw sequences into batching units.
//!
//! A raw sequence is upper-cased and cut at every symbol outside the
//! alphabet. Runs shorter than two symbols are dropped. Runs longer than the
//! batch limit are sliced into limit-sized chunks; the trailing remainder of
//! such a run is kept whatever its length.

use crate::error::{ErrorCode, PipelineError, Result};
use std::collections::VecDeque;

/// Shortest fragment worth decomposing
pub const MIN_FRAGMENT_LENGTH: usize = 2;

/// Set of valid symbols, stored upper-case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: [bool; 128],
    display: String,
}

impl Alphabet {
    /// Nucleotide alphabet `A`, `T`, `C`, `G`
    pub fn dna() -> Self {
        let mut symbols = [false; 128];
        for b in b"ATCG" {
            symbols[*b as usize] = true;
        }
        Self {
            symbols,
            display: "ATCG".to_string(),
        }
    }

    /// Build an alphabet from a string of ASCII symbols
    pub fn parse(symbols: &str) -> Result<Self> {
        let mut table = [false; 128];
        let mut display = String::new();

        for ch in symbols.chars() {
            if !ch.is_ascii() || ch.is_ascii_whitespace() || ch.is_ascii_control() {
                return Err(PipelineError::config_with_code(
                    ErrorCode::CONFIG_INVALID_VALUE,
                    format!("alphabet symbol {:?} is not a printable ASCII character", ch),
                    Some("alphabet"),
                ));
            }
            let upper = ch.to_ascii_uppercase();
            if !table[upper as usize] {
                table[upper as usize] = true;
                display.push(upper);
            }
        }

        if display.is_empty() {
            return Err(PipelineError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                "alphabet must contain at least one symbol",
                Some("alphabet"),
            ));
        }

        Ok(Self {
            symbols: table,
            display,
        })
    }

    /// Whether an already upper-cased symbol belongs to the alphabet
    pub fn contains(&self, ch: char) -> bool {
        ch.is_ascii() && self.symbols[ch as usize]
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::dna()
    }
}

#[derive(Debug, Clone)]
pub struct Fragmenter {
    alphabet: Alphabet,
    max_length: usize,
}

impl Fragmenter {
    pub fn new(alphabet: Alphabet, max_length: usize) -> Self {
        debug_assert!(max_length > 0, "max_length is validated by the config");
        Self {
            alphabet,
            max_length,
        }
    }

    /// Maximal runs of valid symbols, upper-cased, in source order
    pub fn fragments(&self, raw: &str) -> Vec<String> {
        let mut fragments = Vec::new();
        let mut current = String::new();

        for ch in raw.chars() {
            let upper = ch.to_ascii_uppercase();
            if self.alphabet.contains(upper) {
                current.push(upper);
            } else if !current.is_empty() {
                fragments.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            fragments.push(current);
        }

        fragments
    }

    /// Batching units of one raw sequence
    pub fn units(&self, raw: &str) -> Vec<String> {
        let mut units = Vec::new();

        for fragment in self.fragments(raw) {
            if fragment.len() < MIN_FRAGMENT_LENGTH {
                continue;
            }

            if fragment.len() > self.max_length {
                // Fragments hold ASCII only, so byte offsets are char boundaries
                units.extend(
                    fragment
                        .as_bytes()
                        .chunks(self.max_length)
                        .map(|chunk| String::from_utf8_lossy(chunk).into_owned()),
                );
            } else {
                units.push(fragment);
            }
        }

        units
    }
}

/// Flattens a stream of raw sequences into the stream of their units
pub struct UnitStream<I> {
    sequences: I,
    fragmenter: Fragmenter,
    pending: VecDeque<String>,
    sequences_read: usize,
}

impl<I> UnitStream<I>
where
    I: Iterator<Item = Result<String>>,
{
    pub fn new(sequences: I, fragmenter: Fragmenter) -> Self {
        Self {
            sequences,
            fragmenter,
            pending: VecDeque::new(),
            sequences_read: 0,
        }
    }

    /// Number of raw sequences consumed so far
    pub fn sequences_read(&self) -> usize {
        self.sequences_read
    }
}

impl<I> Iterator for UnitStream<I>
where
    I: Iterator<Item = Result<String>>,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(unit) = self.pending.pop_front() {
                return Some(Ok(unit));
            }

            match self.sequences.next()? {
                Ok(raw) => {
                    self.sequences_read += 1;
                    self.pending.extend(self.fragmenter.units(&raw));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
