//! Lazy grouping of units into size-bounded batches.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;

/// Units dispatched together to one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// 1-based, assigned in emission order
    pub index: usize,
    pub units: Vec<String>,
}

impl Batch {
    /// Sum of unit lengths
    pub fn total_length(&self) -> usize {
        self.units.iter().map(String::len).sum()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Groups a unit stream into batches whose total length stays within
/// `max_length`. Consumes its input once; an input error ends the stream.
pub struct Batcher<I> {
    units: I,
    max_length: usize,
    current: Vec<String>,
    current_length: usize,
    next_index: usize,
    finished: bool,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = Result<String>>,
{
    pub fn new(units: I, max_length: usize) -> Self {
        Self {
            units,
            max_length,
            current: Vec::new(),
            current_length: 0,
            next_index: 1,
            finished: false,
        }
    }

    fn take_batch(&mut self) -> Batch {
        let batch = Batch {
            index: self.next_index,
            units: std::mem::take(&mut self.current),
        };
        self.next_index += 1;
        self.current_length = 0;
        batch
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = Result<String>>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match self.units.next() {
                Some(Ok(unit)) => {
                    let unit_length = unit.len();
                    let flushed = if self.current_length + unit_length > self.max_length
                        && !self.current.is_empty()
                    {
                        Some(self.take_batch())
                    } else {
                        None
                    };

                    self.current_length += unit_length;
                    self.current.push(unit);

                    if let Some(batch) = flushed {
                        return Some(Ok(batch));
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    if self.current.is_empty() {
                        return None;
                    }
                    return Some(Ok(self.take_batch()));
                }
            }
        }
    }
}

impl<I> FusedIterator for Batcher<I> where I: Iterator<Item = Result<String>> {}
