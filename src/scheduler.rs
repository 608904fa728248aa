//! Host side of the search: keeps every lane busy with targets pulled from the feed.
//!
//! Each dispatch is planned first: for `steps_per_dispatch` steps, every lane gets its next
//! symbol, and a lane whose target has been fully fed is reloaded on the spot, its next target's
//! boundary symbol taking the step. The lane blocks then execute the whole plan (in parallel with
//! the `parallel` feature) and the completions they captured at boundary symbols are matched back
//! to the targets that finished.

use std::str::FromStr;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::SearchConfig;
use crate::error::Error;
use crate::feed::{SequenceFeed, TargetSequence};
use crate::r#const::{BOUNDARY, LANES};
use crate::smith_waterman::{Completion, LaneBlock, Penalties};
use crate::substitution::QueryExpansion;

/// What happens to lanes still mid-target when the feed runs dry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TailPolicy {
    /// Keep stepping until every occupied lane reaches the end of its target
    #[default]
    Drain,
    /// Stop at the step the feed reports exhaustion, dropping unfinished lanes
    Discard,
}

impl FromStr for TailPolicy {
    type Err = Error;

    fn from_str(policy: &str) -> Result<Self, Error> {
        match policy.to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "discard" => Ok(Self::Discard),
            _ => Err(Error::InvalidConfig(format!("unknown tail policy: {}", policy))),
        }
    }
}

/// Final score of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneResult {
    pub lane: usize,
    pub target_id: u32,
    pub score: i16,
    pub location: u32,
    pub length: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Targets pulled from the feed
    pub targets: usize,
    /// Targets scored to completion
    pub completed: usize,
    pub dispatches: usize,
    pub steps: usize,
    /// Targets dropped mid-sequence by [`TailPolicy::Discard`]
    pub discarded: usize,
}

#[derive(Debug, Clone, Copy)]
struct Occupant {
    target_id: u32,
    length: u32,
}

#[derive(Debug, Default)]
struct Lane {
    occupant: Option<Occupant>,
    symbols: Vec<u8>,
    position: usize,
}

#[derive(Debug, Default)]
struct BlockPlan {
    symbols: Vec<[u8; LANES]>,
    /// One entry per boundary symbol in `symbols`, in step then lane order
    finished: Vec<Option<Occupant>>,
    completions: Vec<Completion>,
}

impl BlockPlan {
    fn clear(&mut self) {
        self.symbols.clear();
        self.finished.clear();
        self.completions.clear();
    }
}

pub struct LaneScheduler<'a, F: SequenceFeed> {
    feed: F,
    expansion: &'a QueryExpansion,
    penalties: Penalties,
    steps_per_dispatch: usize,
    tail_policy: TailPolicy,

    lanes: Vec<Lane>,
    blocks: Vec<LaneBlock>,
    plans: Vec<BlockPlan>,

    step: u32,
    exhausted: bool,
    done: bool,
    stats: SchedulerStats,
}

impl<'a, F: SequenceFeed> LaneScheduler<'a, F> {
    /// Lane count is rounded up to a whole number of blocks
    pub fn new(expansion: &'a QueryExpansion, feed: F, config: &SearchConfig) -> Self {
        let block_count = config.lanes.div_ceil(LANES).max(1);
        Self {
            feed,
            expansion,
            penalties: config.penalties(),
            steps_per_dispatch: config.steps_per_dispatch.max(1),
            tail_policy: config.tail_policy,

            lanes: (0..block_count * LANES).map(|_| Lane::default()).collect(),
            blocks: (0..block_count)
                .map(|_| LaneBlock::new(expansion.query_len()))
                .collect(),
            plans: (0..block_count).map(|_| BlockPlan::default()).collect(),

            step: 0,
            exhausted: false,
            done: false,
            stats: SchedulerStats::default(),
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Score every target in the feed, handing each finished target to `on_finish`
    pub fn run(mut self, mut on_finish: impl FnMut(LaneResult)) -> SchedulerStats {
        while self.dispatch(&mut on_finish) > 0 {}
        self.stats
    }

    /// Plan and execute one dispatch, returning the number of steps it ran
    pub fn dispatch(&mut self, on_finish: &mut impl FnMut(LaneResult)) -> usize {
        let steps = self.plan();
        if steps == 0 {
            return 0;
        }

        let first_step = self.step;
        let expansion = self.expansion;
        let penalties = self.penalties;

        #[cfg(feature = "parallel")]
        self.blocks
            .par_iter_mut()
            .zip(self.plans.par_iter_mut())
            .for_each(|(block, plan)| {
                block.run(
                    expansion,
                    &plan.symbols,
                    penalties,
                    first_step,
                    &mut plan.completions,
                )
            });
        #[cfg(not(feature = "parallel"))]
        self.blocks
            .iter_mut()
            .zip(self.plans.iter_mut())
            .for_each(|(block, plan)| {
                block.run(
                    expansion,
                    &plan.symbols,
                    penalties,
                    first_step,
                    &mut plan.completions,
                )
            });

        let mut completed = 0;
        for (block_idx, plan) in self.plans.iter().enumerate() {
            debug_assert_eq!(plan.finished.len(), plan.completions.len());
            for (occupant, completion) in plan.finished.iter().zip(&plan.completions) {
                let Some(occupant) = occupant else { continue };
                completed += 1;
                on_finish(LaneResult {
                    lane: block_idx * LANES + completion.lane as usize,
                    target_id: occupant.target_id,
                    score: completion.score,
                    location: completion.location,
                    length: occupant.length,
                });
            }
        }

        self.step += steps as u32;
        self.stats.completed += completed;
        self.stats.dispatches += 1;
        self.stats.steps += steps;
        log::debug!(
            "Dispatch {}: {} steps, {} targets finished",
            self.stats.dispatches,
            steps,
            completed
        );

        if self.done && self.tail_policy == TailPolicy::Discard {
            let discarded = self.lanes.iter().filter(|l| l.occupant.is_some()).count();
            if discarded > 0 {
                log::warn!(
                    "Feed exhausted, discarding {} unfinished lanes",
                    discarded
                );
            }
            self.stats.discarded = discarded;
        }

        steps
    }

    fn plan(&mut self) -> usize {
        for plan in &mut self.plans {
            plan.clear();
        }

        let mut steps = 0;
        while steps < self.steps_per_dispatch && !self.done {
            for plan in &mut self.plans {
                plan.symbols.push([BOUNDARY; LANES]);
            }

            let mut stop = false;
            for lane_idx in 0..self.lanes.len() {
                let (block_idx, slot) = (lane_idx / LANES, lane_idx % LANES);
                let lane = &mut self.lanes[lane_idx];

                let symbol = if lane.position < lane.symbols.len() {
                    let symbol = lane.symbols[lane.position];
                    lane.position += 1;
                    symbol
                } else {
                    let finished = lane.occupant.take();
                    self.plans[block_idx].finished.push(finished);

                    let next = if self.exhausted {
                        None
                    } else {
                        self.feed.next_sequence()
                    };
                    match next {
                        Some(target) => {
                            self.stats.targets += 1;
                            Self::load(&mut self.lanes[lane_idx], target);
                        }
                        None => {
                            if !self.exhausted {
                                log::debug!("Feed exhausted at step {}", self.step + steps as u32);
                                self.exhausted = true;
                                stop = self.tail_policy == TailPolicy::Discard;
                            }
                            let lane = &mut self.lanes[lane_idx];
                            lane.symbols.clear();
                            lane.position = 0;
                        }
                    }
                    BOUNDARY
                };

                self.plans[block_idx].symbols[steps][slot] = symbol;
            }
            steps += 1;

            let drained = self.exhausted && self.lanes.iter().all(|l| l.occupant.is_none());
            self.done = stop || drained;
        }

        steps
    }

    fn load(lane: &mut Lane, target: TargetSequence) {
        debug_assert_eq!(target.symbols.first(), Some(&BOUNDARY));
        lane.occupant = Some(Occupant {
            target_id: target.id,
            length: target.len() as u32,
        });
        lane.symbols = target.symbols;
        // the boundary symbol is fed on this step
        lane.position = 1;
    }
}
