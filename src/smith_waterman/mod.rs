//! The [Smith Waterman algorithm](https://en.wikipedia.org/wiki/Smith%E2%80%93Waterman_algorithm) performs local sequence alignment, scoring the best matching substrings of two sequences and never letting a score go negative.
//!
//! Searching a whole protein database with one query means O(query * database) cells, far too many
//! to keep around. We use inter-sequence parallelism instead: one query, `LANES` targets at once,
//! one target symbol per lane per step. A step scans the full query length for every lane and
//! keeps only one score column per lane, written over the previous one. Lanes never wait on each
//! other, so a lane whose target ends is simply handed the next target.
//!
//! ```text
//! query: "HEAG", lanes hold targets "PAW" / "HEAGAWG" / ...
//!
//! step:        1      2      3      4  ...
//! lane 0:     [@]     P      A      W     [@]  <- boundary, next target starts
//! lane 1:     [@]     H      E      A      G  ...
//!
//! per lane, per step, for query row r:
//!   gap   = max(H[r-1] this step, H[r] last step) - penalty
//!   diag  = H[r-1] last step + score(target symbol, query[r])
//!   H[r]  = max(gap, diag, 0)
//! ```
//!
//! Both gap directions share a single linear penalty, which lets them collapse into one running
//! carry down the column. Feeding the boundary symbol swaps the gap penalty for a huge one and
//! every diagonal for the table sentinel, so the column collapses to zero: that is the only reset
//! a lane ever gets.

pub mod lanes;
pub mod reference;

pub use lanes::{Completion, LaneBlock, Penalties};

use crate::r#const::{BOUNDARY, LANES};
use crate::substitution::QueryExpansion;

/// Best local score of a single encoded target against an expanded query, using lane 0 of a
/// fresh block. Returns `(score, location)`.
pub fn local_score(expansion: &QueryExpansion, target: &[u8], penalties: Penalties) -> (i16, u32) {
    let mut block = LaneBlock::new(expansion.query_len());
    let mut batch = Vec::with_capacity(target.len() + 2);
    batch.push([BOUNDARY; LANES]);
    for &symbol in target {
        let mut symbols = [BOUNDARY; LANES];
        symbols[0] = symbol;
        batch.push(symbols);
    }
    // trailing boundary captures the result
    batch.push([BOUNDARY; LANES]);

    let mut completions = vec![];
    block.run(expansion, &batch, penalties, 0, &mut completions);
    completions
        .iter()
        .rev()
        .find(|c| c.lane == 0)
        .map(|c| (c.score, c.location))
        .unwrap_or((0, 0))
}
