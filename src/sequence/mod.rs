//! Raw sequence input, fragment cleaning and batch partitioning.
//!
//! Everything here is synchronous and single-pass: sequences are pulled from
//! the source, cleaned into units and grouped into batches on demand.

pub mod batch;
pub mod fragment;
pub mod source;

pub use batch::{Batch, Batcher};
pub use fragment::{Alphabet, Fragmenter, UnitStream, MIN_FRAGMENT_LENGTH};
pub use source::{open_sequences, SequenceIter, SourceFormat, DEFAULT_SEQUENCE_COLUMN};

use crate::error::Result;

/// Batches of a raw sequence stream, built lazily
pub fn batch_sequences<I>(
    sequences: I,
    alphabet: Alphabet,
    max_length: usize,
) -> Batcher<UnitStream<I>>
where
    I: Iterator<Item = Result<String>>,
{
    let fragmenter = Fragmenter::new(alphabet, max_length);
    Batcher::new(UnitStream::new(sequences, fragmenter), max_length)
}
