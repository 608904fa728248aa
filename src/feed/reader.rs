use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::TargetSequence;
use crate::error::{Error, Result};
use crate::substitution::encode_symbols;

/// On-disk layouts a database may come in. Only this module branches on the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordFormat {
    /// FASTA; ids are assigned from 0 in file order
    Fasta,
    /// One `id<TAB>residues` record per line
    Tabular,
}

impl FromStr for RecordFormat {
    type Err = Error;

    fn from_str(format: &str) -> Result<Self> {
        match format.to_ascii_lowercase().as_str() {
            "fasta" | "fa" => Ok(Self::Fasta),
            "tabular" | "tsv" => Ok(Self::Tabular),
            _ => Err(Error::InvalidConfig(format!(
                "unknown record format: {}",
                format
            ))),
        }
    }
}

/// Feed over a database file. Every record is encoded when the file is opened so a malformed
/// database is rejected before the first dispatch.
#[derive(Debug, Clone)]
pub struct FileFeed {
    sequences: std::vec::IntoIter<TargetSequence>,
    labels: Vec<(u32, String)>,
}

impl FileFeed {
    pub fn open(path: impl AsRef<Path>, format: RecordFormat) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file), format)
    }

    pub fn from_reader<R: BufRead>(reader: R, format: RecordFormat) -> Result<Self> {
        let (sequences, labels) = match format {
            RecordFormat::Fasta => read_fasta(reader)?,
            RecordFormat::Tabular => read_tabular(reader)?,
        };
        log::debug!(
            "Loaded {} {:?} records ({} residues)",
            sequences.len(),
            format,
            sequences.iter().map(TargetSequence::len).sum::<usize>()
        );
        Ok(Self {
            sequences: sequences.into_iter(),
            labels,
        })
    }

    /// Remaining number of sequences
    pub fn remaining(&self) -> usize {
        self.sequences.len()
    }

    /// `(id, record name)` for every record in the file
    pub fn labels(&self) -> &[(u32, String)] {
        &self.labels
    }
}

impl Iterator for FileFeed {
    type Item = TargetSequence;

    fn next(&mut self) -> Option<TargetSequence> {
        self.sequences.next()
    }
}

type Records = (Vec<TargetSequence>, Vec<(u32, String)>);

fn read_fasta<R: BufRead>(reader: R) -> Result<Records> {
    let mut sequences = vec![];
    let mut labels = vec![];
    for (id, record) in bio::io::fasta::Reader::from_bufread(reader)
        .records()
        .enumerate()
    {
        let record = record?;
        let id = id as u32;
        let codes = encode_symbols(record.id(), record.seq())?;
        sequences.push(TargetSequence::from_codes(id, &codes));
        let label = match record.desc() {
            Some(desc) => format!("{} {}", record.id(), desc),
            None => record.id().to_string(),
        };
        labels.push((id, label));
    }
    Ok((sequences, labels))
}

fn read_tabular<R: BufRead>(reader: R) -> Result<Records> {
    let mut sequences = vec![];
    let mut labels = vec![];
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let malformed = |msg: &str| Error::MalformedSequence {
            record: format!("line {}", line_no + 1),
            msg: msg.to_string(),
        };
        let (id, residues) = line
            .split_once('\t')
            .ok_or_else(|| malformed("expected id<TAB>residues"))?;
        let id: u32 = id
            .trim()
            .parse()
            .map_err(|_| malformed("id is not an unsigned integer"))?;

        let codes = encode_symbols(&id.to_string(), residues.as_bytes())?;
        sequences.push(TargetSequence::from_codes(id, &codes));
        labels.push((id, id.to_string()));
    }
    Ok((sequences, labels))
}
