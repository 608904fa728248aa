//! Thresholding of finished lanes into hit records, and the tab-separated link stream they are
//! persisted as between the search and the forest builder.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::SearchConfig;
use crate::error::Result;
use crate::scheduler::LaneResult;

/// One similarity link between a query and a target. Order in a stream is not significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HitRecord {
    pub query_id: u32,
    pub target_id: u32,
    pub score: i32,
    /// 1-based target offset where the best local alignment ends
    pub location: u32,
    /// Target length in residues
    pub length: u32,
}

/// Drops lane results at or below the reporting threshold, and every result that scored nothing
#[derive(Debug, Clone)]
pub struct HitReporter {
    query_id: u32,
    threshold: i16,
    skip_self_hits: bool,
    emitted: usize,
}

impl HitReporter {
    pub fn new(query_id: u32, config: &SearchConfig) -> Self {
        Self {
            query_id,
            threshold: config.reporting_threshold,
            skip_self_hits: config.skip_self_hits,
            emitted: 0,
        }
    }

    pub fn report(&mut self, result: &LaneResult) -> Option<HitRecord> {
        if result.score <= 0
            || result.score <= self.threshold
            || (self.skip_self_hits && result.target_id == self.query_id)
        {
            return None;
        }

        self.emitted += 1;
        Some(HitRecord {
            query_id: self.query_id,
            target_id: result.target_id,
            score: result.score as i32,
            location: result.location,
            length: result.length,
        })
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

/// Destination for hit records
pub trait HitSink {
    fn push_hit(&mut self, hit: HitRecord) -> Result<()>;
}

impl HitSink for Vec<HitRecord> {
    fn push_hit(&mut self, hit: HitRecord) -> Result<()> {
        self.push(hit);
        Ok(())
    }
}

impl<S: HitSink + ?Sized> HitSink for &mut S {
    fn push_hit(&mut self, hit: HitRecord) -> Result<()> {
        (**self).push_hit(hit)
    }
}

/// Writes `query target score location length` lines
pub struct LinkWriter<W: Write> {
    writer: csv::Writer<W>,
    written: usize,
}

impl<W: Write> LinkWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .delimiter(b'\t')
                .has_headers(false)
                .from_writer(writer),
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> HitSink for LinkWriter<W> {
    fn push_hit(&mut self, hit: HitRecord) -> Result<()> {
        self.writer.serialize(hit)?;
        self.written += 1;
        Ok(())
    }
}

/// Reads a link stream back, skipping and counting malformed lines. Only I/O failures are
/// returned as errors.
pub struct LinkReader<R: Read> {
    records: csv::DeserializeRecordsIntoIter<R, HitRecord>,
    skipped: usize,
}

impl<R: Read> LinkReader<R> {
    pub fn new(reader: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(reader);
        Self {
            records: reader.into_deserialize(),
            skipped: 0,
        }
    }

    /// Malformed lines skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: Read> Iterator for LinkReader<R> {
    type Item = Result<HitRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.records.next()? {
                Ok(record) => return Some(Ok(record)),
                Err(err) if err.is_io_error() => return Some(Err(err.into())),
                Err(err) => {
                    self.skipped += 1;
                    log::debug!("Skipping malformed link: {}", err);
                }
            }
        }
    }
}
