use multiversion::multiversion;

use crate::r#const::{BOUNDARY, BOUNDARY_PENALTY, GAP_PENALTY, LANES};
use crate::substitution::QueryExpansion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Penalties {
    /// Linear gap penalty
    pub gap: i16,
    /// Penalty applied on the step that feeds the boundary symbol
    pub boundary: i16,
}

impl Default for Penalties {
    fn default() -> Self {
        Penalties {
            gap: GAP_PENALTY,
            boundary: BOUNDARY_PENALTY,
        }
    }
}

/// Score of the occupant a lane held up to the boundary symbol fed at `step`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub step: u32,
    pub lane: u8,
    pub score: i16,
    /// 1-based target offset where `score` was first reached, 0 when nothing scored
    pub location: u32,
}

/// `LANES` scoring lanes sharing one query. Each lane owns one column of the DP matrix,
/// double-buffered across steps.
#[derive(Debug, Clone)]
pub struct LaneBlock {
    prev: Vec<[i16; LANES]>,
    cur: Vec<[i16; LANES]>,
    /// Substitution scores gathered for the current step, one row per query position
    scores: Vec<[i16; LANES]>,
    cumulative: [i16; LANES],
    best_end: [u32; LANES],
    offset: [u32; LANES],
}

impl LaneBlock {
    pub fn new(query_len: usize) -> Self {
        Self {
            prev: vec![[0; LANES]; query_len],
            cur: vec![[0; LANES]; query_len],
            scores: vec![[0; LANES]; query_len],
            cumulative: [0; LANES],
            best_end: [0; LANES],
            offset: [0; LANES],
        }
    }

    /// Best score seen by each lane since its last boundary symbol
    pub fn cumulative(&self) -> &[i16; LANES] {
        &self.cumulative
    }

    /// Run one step per entry of `batch`, numbering steps from `first_step`. A completion is
    /// pushed for every lane fed the boundary symbol, before the lane is reset.
    pub fn run(
        &mut self,
        expansion: &QueryExpansion,
        batch: &[[u8; LANES]],
        penalties: Penalties,
        first_step: u32,
        completions: &mut Vec<Completion>,
    ) {
        for (step, symbols) in (first_step..).zip(batch) {
            self.step(expansion, symbols, penalties, step, completions);
        }
    }

    #[inline]
    pub fn step(
        &mut self,
        expansion: &QueryExpansion,
        symbols: &[u8; LANES],
        penalties: Penalties,
        step: u32,
        completions: &mut Vec<Completion>,
    ) {
        let mut penalty = [penalties.gap; LANES];
        for (lane, &symbol) in symbols.iter().enumerate() {
            if symbol == BOUNDARY {
                completions.push(Completion {
                    step,
                    lane: lane as u8,
                    score: self.cumulative[lane],
                    location: self.best_end[lane],
                });
                self.cumulative[lane] = 0;
                self.best_end[lane] = 0;
                self.offset[lane] = 0;
                penalty[lane] = penalties.boundary;
            } else {
                self.offset[lane] += 1;
            }
        }

        if self.prev.is_empty() {
            return;
        }

        // Gather the substitution column of every lane's symbol
        for (lane, &symbol) in symbols.iter().enumerate() {
            for (scores, &score) in self.scores.iter_mut().zip(expansion.row(symbol)) {
                scores[lane] = score;
            }
        }

        let best = scan_column(&self.prev, &mut self.cur, &self.scores, &penalty);
        std::mem::swap(&mut self.prev, &mut self.cur);

        for lane in 0..LANES {
            // a saturated column survives the boundary penalty, so the next occupant starts clean
            if symbols[lane] == BOUNDARY {
                for row in self.prev.iter_mut() {
                    row[lane] = 0;
                }
                continue;
            }
            if best[lane] > self.cumulative[lane] {
                self.cumulative[lane] = best[lane];
                self.best_end[lane] = self.offset[lane];
            }
        }
    }
}

/// One column of the recurrence for every lane, returning the best cell per lane
#[multiversion(targets = "simd")]
fn scan_column(
    prev: &[[i16; LANES]],
    cur: &mut [[i16; LANES]],
    scores: &[[i16; LANES]],
    penalty: &[i16; LANES],
) -> [i16; LANES] {
    let mut carry = [0i16; LANES];
    // previous step's score one row up, 0 above the first row
    let mut diag_source = [0i16; LANES];
    let mut best = [0i16; LANES];

    for ((h_prev, h_cur), score) in prev.iter().zip(cur.iter_mut()).zip(scores) {
        for lane in 0..LANES {
            let gap = carry[lane].max(h_prev[lane]).saturating_sub(penalty[lane]);
            let diag = diag_source[lane].saturating_add(score[lane]);
            let h = gap.max(diag).max(0);
            best[lane] = best[lane].max(h);
            h_cur[lane] = h;
            carry[lane] = h;
        }
        diag_source = *h_prev;
    }

    best
}
