//! Seqforest finds pairwise similarity across a large protein collection and folds the links it
//! finds into a maximum-weight spanning forest. The search side scores one query against a whole
//! database with Smith-Waterman, stepping many targets at once in independent lanes and reusing a
//! lane as soon as its target ends, so memory stays linear in the query length no matter how big
//! the database is. The forest side ingests the resulting links one at a time, in any order, and
//! keeps the heaviest acyclic set of edges seen so far without ever rescanning old links.
//!
//! # Example: searching
//!
//! ```rust
//! use seqforest::{HitRecord, SearchConfig, Searcher};
//! use seqforest::feed::feed_from_residues;
//!
//! let searcher = Searcher::new(SearchConfig::default()).unwrap();
//! let feed = feed_from_residues([(1, "MKWVTFISLL"), (2, "PPPPPPPP")]).unwrap();
//!
//! let mut hits: Vec<HitRecord> = vec![];
//! let stats = searcher.search(0, b"KWVTF", feed, &mut hits).unwrap();
//! assert_eq!(stats.targets, 2);
//! assert_eq!(hits[0].target_id, 1);
//! ```
//!
//! # Example: building the forest
//!
//! ```rust
//! use seqforest::forest::SpanningForest;
//!
//! let mut forest = SpanningForest::new();
//! forest.add_link(1, 2, 50, 50, 0, 0);
//! forest.add_link(2, 3, 40, 40, 0, 0);
//! // closes the cycle 1-2-3, evicting the 40 edge
//! forest.add_link(1, 3, 45, 45, 0, 0);
//!
//! assert_eq!(forest.edge_count(), 2);
//! assert_eq!(forest.total_weight(), 95);
//! ```
//!
//! # Example: rendering
//!
//! ```rust
//! use seqforest::ReportConfig;
//! use seqforest::forest::SpanningForest;
//! use seqforest::forest::report::write_tree;
//!
//! let mut forest = SpanningForest::new();
//! forest.add_link(1, 2, 50, 50, 0, 0);
//!
//! let mut out = vec![];
//! let labels = |id: u32| format!("seq{id}");
//! write_tree(&forest, &labels, &ReportConfig::default(), &mut out).unwrap();
//! ```

use serde::{Deserialize, Serialize};

mod r#const;
pub mod error;
pub mod feed;
pub mod forest;
pub mod hits;
pub mod scheduler;
pub mod search;
pub mod smith_waterman;
pub mod substitution;

pub use error::{Error, Result};
pub use forest::{LinkWeighting, SpanningForest};
pub use hits::{HitRecord, HitSink, LinkReader, LinkWriter};
pub use scheduler::TailPolicy;
pub use search::{SearchStats, Searcher};

use r#const::*;
use smith_waterman::Penalties;
use substitution::{MatrixName, parse_alphabet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Scoring matrix name, see [`MatrixName`]
    pub matrix: String,
    /// Residues the matrix is resolved for. Any other letter scores as the matrix minimum.
    pub alphabet: String,
    /// Linear gap penalty, shared by insertions and deletions
    pub gap_penalty: i16,
    /// Penalty on the step that feeds the boundary symbol. Must be large enough to wipe any score
    /// the column may hold.
    pub boundary_penalty: i16,
    /// Number of lanes stepped together, rounded up to a multiple of 16
    pub lanes: usize,
    /// Steps planned on the host and executed per dispatch
    pub steps_per_dispatch: usize,
    /// Hits must score strictly above this to be reported
    pub reporting_threshold: i16,
    pub tail_policy: TailPolicy,
    /// Drop hits of a query against itself
    pub skip_self_hits: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            matrix: DEFAULT_MATRIX.to_string(),
            alphabet: DEFAULT_ALPHABET.to_string(),
            gap_penalty: GAP_PENALTY,
            boundary_penalty: BOUNDARY_PENALTY,
            lanes: DEFAULT_LANES,
            steps_per_dispatch: STEPS_PER_DISPATCH,
            reporting_threshold: REPORTING_THRESHOLD,
            tail_policy: TailPolicy::default(),
            skip_self_hits: true,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        self.matrix.parse::<MatrixName>()?;
        parse_alphabet(&self.alphabet)?;
        self.validate_without_matrix()
    }

    /// Every check of [`SearchConfig::validate`] except the matrix and alphabet
    pub fn validate_without_matrix(&self) -> Result<()> {
        if self.lanes == 0 {
            return Err(Error::InvalidConfig("lanes must be at least 1".into()));
        }
        if self.steps_per_dispatch == 0 {
            return Err(Error::InvalidConfig(
                "steps_per_dispatch must be at least 1".into(),
            ));
        }
        if self.gap_penalty < 0 {
            return Err(Error::InvalidConfig(format!(
                "gap_penalty must not be negative, got {}",
                self.gap_penalty
            )));
        }
        if self.boundary_penalty <= self.gap_penalty {
            return Err(Error::InvalidConfig(format!(
                "boundary_penalty ({}) must exceed gap_penalty ({})",
                self.boundary_penalty, self.gap_penalty
            )));
        }
        Ok(())
    }

    pub fn penalties(&self) -> Penalties {
        Penalties {
            gap: self.gap_penalty,
            boundary: self.boundary_penalty,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// How a hit's score becomes an edge weight
    pub weighting: LinkWeighting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Edges scoring below this are printed as a stub and not descended into
    pub stub_threshold: i32,
    /// Lower bound of the twilight band, inclusive
    pub twilight_low: i32,
    /// Upper bound of the twilight band, inclusive
    pub twilight_high: i32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            stub_threshold: STUB_THRESHOLD,
            twilight_low: TWILIGHT_LOW,
            twilight_high: TWILIGHT_HIGH,
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.twilight_low > self.twilight_high {
            return Err(Error::InvalidConfig(format!(
                "twilight band is inverted: {} > {}",
                self.twilight_low, self.twilight_high
            )));
        }
        Ok(())
    }
}
