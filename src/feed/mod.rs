//! Forward-only source of target sequences for the lane scheduler.
//!
//! A feed hands out one [`TargetSequence`] at a time and is never rewound; searching another
//! query means opening another feed. Sequences arrive already encoded and prefixed with the
//! boundary symbol, so the scheduler never has to know where they came from.

use crate::error::Result;
use crate::r#const::BOUNDARY;
use crate::substitution::encode_symbols;

mod reader;

pub use reader::{FileFeed, RecordFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSequence {
    pub id: u32,
    /// Symbol codes, starting with the boundary symbol
    pub symbols: Vec<u8>,
}

impl TargetSequence {
    /// Wrap already encoded residues, prefixing the boundary symbol
    pub fn from_codes(id: u32, codes: &[u8]) -> Self {
        let mut symbols = Vec::with_capacity(codes.len() + 1);
        symbols.push(BOUNDARY);
        symbols.extend_from_slice(codes);
        Self { id, symbols }
    }

    /// Encode a residue string
    pub fn encode(id: u32, residues: &[u8]) -> Result<Self> {
        let codes = encode_symbols(&id.to_string(), residues)?;
        Ok(Self::from_codes(id, &codes))
    }

    /// Number of residues, not counting the boundary symbol
    pub fn len(&self) -> usize {
        self.symbols.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn residues(&self) -> &[u8] {
        self.symbols.get(1..).unwrap_or(&[])
    }
}

/// Single shared cursor over the target database
pub trait SequenceFeed {
    /// Next sequence, or `None` once the database is exhausted
    fn next_sequence(&mut self) -> Option<TargetSequence>;
}

impl<I: Iterator<Item = TargetSequence>> SequenceFeed for I {
    fn next_sequence(&mut self) -> Option<TargetSequence> {
        self.next()
    }
}

/// Encode `(id, residues)` pairs into an in-memory feed
pub fn feed_from_residues<S: AsRef<[u8]>>(
    records: impl IntoIterator<Item = (u32, S)>,
) -> Result<std::vec::IntoIter<TargetSequence>> {
    let sequences = records
        .into_iter()
        .map(|(id, residues)| TargetSequence::encode(id, residues.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(sequences.into_iter())
}
