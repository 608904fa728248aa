//! Integer substitution tables over the 32-code symbol space and their per-query expansion.
//!
//! Every byte maps to a code with `ch & 31`, so upper and lower case letters share a code and the
//! boundary symbol (`@`) lands on code 0. Row and column 0 of every table hold [`SENTINEL`], which
//! is what lets the boundary symbol wipe a lane clean.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::r#const::{ALPHABET_SIZE, BOUNDARY, SENTINEL};

/// Map a residue byte into the 32-code symbol space
#[inline(always)]
pub fn symbol_code(ch: u8) -> u8 {
    ch & 31
}

/// Encode a residue string into symbol codes.
///
/// Whitespace and the `*` terminator are skipped, any other non-letter byte is rejected so that a
/// malformed stream fails at setup rather than mid-search.
pub fn encode_symbols(record: &str, residues: &[u8]) -> Result<Vec<u8>> {
    let mut codes = Vec::with_capacity(residues.len());
    for (offset, &ch) in residues.iter().enumerate() {
        if ch.is_ascii_alphabetic() {
            codes.push(symbol_code(ch));
        } else if !(ch.is_ascii_whitespace() || ch == b'*') {
            return Err(Error::MalformedSequence {
                record: record.to_string(),
                msg: format!("unexpected byte {:?} at offset {}", ch as char, offset),
            });
        }
    }
    Ok(codes)
}

/// Scoring matrices that resolve to a substitution table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixName {
    Blosum62,
    Pam40,
    Pam120,
    Pam200,
    Pam250,
}

impl MatrixName {
    pub fn score_fn(self) -> fn(u8, u8) -> i32 {
        match self {
            Self::Blosum62 => bio::scores::blosum62,
            Self::Pam40 => bio::scores::pam40,
            Self::Pam120 => bio::scores::pam120,
            Self::Pam200 => bio::scores::pam200,
            Self::Pam250 => bio::scores::pam250,
        }
    }
}

impl FromStr for MatrixName {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "BLOSUM62" => Ok(Self::Blosum62),
            "PAM40" => Ok(Self::Pam40),
            "PAM120" => Ok(Self::Pam120),
            "PAM200" => Ok(Self::Pam200),
            "PAM250" => Ok(Self::Pam250),
            _ => Err(Error::UnknownMatrix(name.to_string())),
        }
    }
}

impl fmt::Display for MatrixName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Blosum62 => "BLOSUM62",
            Self::Pam40 => "PAM40",
            Self::Pam120 => "PAM120",
            Self::Pam200 => "PAM200",
            Self::Pam250 => "PAM250",
        };
        f.write_str(name)
    }
}

/// Validate an alphabet string, returning its upper-cased letters
pub(crate) fn parse_alphabet(alphabet: &str) -> Result<Vec<u8>> {
    if alphabet.is_empty() {
        return Err(Error::InvalidConfig("alphabet is empty".to_string()));
    }
    alphabet
        .bytes()
        .map(|ch| {
            if ch.is_ascii_alphabetic() {
                Ok(ch.to_ascii_uppercase())
            } else {
                Err(Error::InvalidConfig(format!(
                    "alphabet symbol {:?} is not a letter",
                    ch as char
                )))
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionTable {
    grid: [[i16; ALPHABET_SIZE]; ALPHABET_SIZE],
}

impl SubstitutionTable {
    /// Resolve a named matrix over the given live alphabet
    pub fn named(name: &str, alphabet: &str) -> Result<Self> {
        let matrix: MatrixName = name.parse()?;
        Self::from_fn(alphabet, matrix.score_fn())
    }

    /// Build a table from a resolved scoring function over upper case residue letters.
    ///
    /// Codes outside the alphabet score as the lowest value seen among alphabet pairs.
    pub fn from_fn(alphabet: &str, score: impl Fn(u8, u8) -> i32) -> Result<Self> {
        let letters = parse_alphabet(alphabet)?;

        let clamp = |value: i32| value.clamp(SENTINEL as i32 + 1, i16::MAX as i32) as i16;
        let floor = letters
            .iter()
            .flat_map(|&a| letters.iter().map(move |&b| (a, b)))
            .map(|(a, b)| clamp(score(a, b)))
            .min()
            .unwrap_or(0);

        let mut table = Self::filled(floor);
        for &a in &letters {
            for &b in &letters {
                table.set(symbol_code(a), symbol_code(b), clamp(score(a, b)));
            }
        }
        Ok(table)
    }

    /// Build a table from explicit residue pairs, each applied symmetrically
    pub fn from_pairs(default: i16, pairs: &[(u8, u8, i16)]) -> Self {
        let mut table = Self::filled(default);
        for &(a, b, score) in pairs {
            table.set(symbol_code(a), symbol_code(b), score);
            table.set(symbol_code(b), symbol_code(a), score);
        }
        table
    }

    fn filled(value: i16) -> Self {
        let mut grid = [[value; ALPHABET_SIZE]; ALPHABET_SIZE];
        for (code, row) in grid.iter_mut().enumerate() {
            if code == BOUNDARY as usize {
                *row = [SENTINEL; ALPHABET_SIZE];
            }
            row[BOUNDARY as usize] = SENTINEL;
        }
        Self { grid }
    }

    #[inline(always)]
    fn set(&mut self, a: u8, b: u8, score: i16) {
        if a != BOUNDARY && b != BOUNDARY {
            self.grid[a as usize][b as usize] = score;
        }
    }

    /// Score for a pair of symbol codes
    #[inline(always)]
    pub fn score(&self, a: u8, b: u8) -> i16 {
        self.grid[(a & 31) as usize][(b & 31) as usize]
    }

    /// Expand the table against a query, one row per target code
    pub fn expand(&self, query_codes: &[u8]) -> QueryExpansion {
        let query_len = query_codes.len();
        let mut rows = Vec::with_capacity(ALPHABET_SIZE * query_len);
        for target_code in 0..ALPHABET_SIZE as u8 {
            rows.extend(query_codes.iter().map(|&q| self.score(target_code, q)));
        }
        QueryExpansion { rows, query_len }
    }
}

/// `32 x query_len` grid where `row(c)[pos]` scores target code `c` against the query at `pos`
#[derive(Debug, Clone)]
pub struct QueryExpansion {
    rows: Vec<i16>,
    query_len: usize,
}

impl QueryExpansion {
    #[inline(always)]
    pub fn row(&self, target_code: u8) -> &[i16] {
        let start = (target_code & 31) as usize * self.query_len;
        &self.rows[start..start + self.query_len]
    }

    #[inline(always)]
    pub fn get(&self, target_code: u8, pos: usize) -> i16 {
        self.row(target_code)[pos]
    }

    pub fn query_len(&self) -> usize {
        self.query_len
    }

    pub fn is_empty(&self) -> bool {
        self.query_len == 0
    }
}
