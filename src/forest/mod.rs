//! Online maximum-weight spanning forest over similarity links.
//!
//! Every node keeps a single parent pointer plus the data of the edge to that parent. A node is
//! born hanging off node 0 through a virtual edge of weight -1, which marks it as the root of its
//! own component. Adding a link `a - b` finds where the parent chains of `a` and `b` meet, which
//! closes a cycle:
//!
//! ```text
//!            meet
//!           /    \
//!         p1      q1          candidate: a ---- b
//!         |        |
//!         a        b
//! ```
//!
//! If the candidate is the weakest edge on that cycle, it is rejected. Otherwise the weakest edge
//! `W -> parent(W)` is cut, the chain from the endpoint on W's side up to W is reversed so that
//! the endpoint becomes a root of its subtree, and the endpoint is hung off the other endpoint by
//! the candidate. Virtual edges always lose, so two components are merged by any real link.
//!
//! Ingestion order does not change the total weight of the result, only which of several equally
//! heavy edges survive.

use std::collections::HashMap;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::ForestConfig;
use crate::error::Error;
use crate::hits::HitRecord;

pub mod report;

/// Node every parent chain ends at
pub const ROOT: u32 = 0;
/// Weight of the virtual edge from a component root to [`ROOT`]
pub const UNLINKED: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestNode {
    pub parent: u32,
    /// Weight of the edge to `parent`, negative for a component root
    pub score: i32,
    pub raw_score: i32,
    pub location: u32,
    pub length: u32,
}

impl ForestNode {
    const fn unlinked() -> Self {
        ForestNode {
            parent: ROOT,
            score: UNLINKED,
            raw_score: UNLINKED,
            location: 0,
            length: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.score < 0
    }

    fn with_edge_of(parent: u32, edge: &ForestNode) -> Self {
        ForestNode { parent, ..*edge }
    }
}

/// How a hit's score becomes an edge weight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkWeighting {
    #[default]
    Raw,
    /// `score * 100 / length`, favouring links that cover short targets well. Zero length falls
    /// back to the raw score.
    PerHundredResidues,
}

impl LinkWeighting {
    pub fn weight(self, hit: &HitRecord) -> i32 {
        match self {
            Self::Raw => hit.score,
            Self::PerHundredResidues if hit.length == 0 => hit.score,
            Self::PerHundredResidues => (hit.score as i64 * 100 / hit.length as i64) as i32,
        }
    }
}

impl FromStr for LinkWeighting {
    type Err = Error;

    fn from_str(weighting: &str) -> Result<Self, Error> {
        match weighting.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "per-100" | "per-hundred-residues" => Ok(Self::PerHundredResidues),
            _ => Err(Error::InvalidConfig(format!(
                "unknown link weighting: {}",
                weighting
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Joined two components
    Added,
    /// Accepted by evicting a weaker edge `child -> parent` from the cycle it closed
    Replaced { child: u32, parent: u32, score: i32 },
    /// Weakest edge on its cycle, or a self link
    Rejected,
}

/// Link counters. `links_added + links_rejected == links_processed` always holds, and the forest
/// holds `links_added - links_replaced` edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForestStats {
    pub links_processed: usize,
    pub links_added: usize,
    pub links_rejected: usize,
    pub links_replaced: usize,
}

/// Children across real edges, keyed by parent id. Leaves have no entry.
pub type ChildrenMap = HashMap<u32, Vec<u32>>;

/// Node ids are sparse and unbounded, so only nodes some link mentioned are stored
#[derive(Debug, Clone)]
pub struct SpanningForest {
    nodes: HashMap<u32, ForestNode>,
    max_seen_id: u32,
    weighting: LinkWeighting,
    stats: ForestStats,
}

impl Default for SpanningForest {
    fn default() -> Self {
        Self::new()
    }
}

impl SpanningForest {
    pub fn new() -> Self {
        Self::with_config(&ForestConfig::default())
    }

    pub fn with_config(config: &ForestConfig) -> Self {
        SpanningForest {
            nodes: HashMap::new(),
            max_seen_id: 0,
            weighting: config.weighting,
            stats: ForestStats::default(),
        }
    }

    pub fn stats(&self) -> ForestStats {
        self.stats
    }

    /// Highest node id any link has mentioned
    pub fn max_seen_id(&self) -> u32 {
        self.max_seen_id
    }

    pub fn contains(&self, id: u32) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Ids of every node any link has mentioned, ascending
    pub fn node_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.nodes.keys().copied().sorted_unstable()
    }

    pub fn node(&self, id: u32) -> Option<&ForestNode> {
        self.nodes.get(&id)
    }

    /// Node data of an id known to be stored
    fn edge_of(&self, id: u32) -> &ForestNode {
        &self.nodes[&id]
    }

    /// Parent across a real edge, `None` for component roots and unknown nodes
    pub fn parent_of(&self, id: u32) -> Option<u32> {
        self.node(id)
            .filter(|node| !node.is_root())
            .map(|node| node.parent)
    }

    /// Real edges as `(child, node)` pairs, by ascending child id
    pub fn edges(&self) -> impl Iterator<Item = (u32, &ForestNode)> + '_ {
        self.unordered_edges().sorted_unstable_by_key(|(id, _)| *id)
    }

    fn unordered_edges(&self) -> impl Iterator<Item = (u32, &ForestNode)> + '_ {
        self.nodes
            .iter()
            .filter(|(_, node)| !node.is_root())
            .map(|(&id, node)| (id, node))
    }

    pub fn edge_count(&self) -> usize {
        self.unordered_edges().count()
    }

    pub fn total_weight(&self) -> i64 {
        self.unordered_edges().map(|(_, node)| node.score as i64).sum()
    }

    fn touch(&mut self, id: u32) {
        self.nodes.entry(id).or_insert_with(ForestNode::unlinked);
        self.max_seen_id = self.max_seen_id.max(id);
    }

    /// Offer the link `a - b` to the forest
    pub fn add_link(
        &mut self,
        a: u32,
        b: u32,
        score: i32,
        raw_score: i32,
        location: u32,
        length: u32,
    ) -> LinkOutcome {
        self.stats.links_processed += 1;
        self.touch(a);
        self.touch(b);

        if a == b {
            self.stats.links_rejected += 1;
            log::trace!("Rejected self link {}", a);
            return LinkOutcome::Rejected;
        }

        let (path_a, path_b) = self.find_meeting_point(a, b);
        let weakest = self.find_weakest_link_in_cycle(&path_a, &path_b);

        let Some((on_a_side, idx)) = weakest.filter(|&(on_a, idx)| {
            let node = if on_a { path_a[idx] } else { path_b[idx] };
            self.edge_of(node).score < score
        }) else {
            self.stats.links_rejected += 1;
            log::trace!("Rejected {} - {} ({})", a, b, score);
            return LinkOutcome::Rejected;
        };

        // endpoint on the weakest edge's side becomes the child of the other endpoint
        let (chain, child, parent) = if on_a_side {
            (&path_a[..=idx], a, b)
        } else {
            (&path_b[..=idx], b, a)
        };
        let weakest_node = chain[idx];
        let evicted = *self.edge_of(weakest_node);

        self.reverse_chain(chain);
        self.nodes.insert(
            child,
            ForestNode {
                parent,
                score,
                raw_score,
                location,
                length,
            },
        );
        self.stats.links_added += 1;

        if evicted.is_root() {
            log::trace!("Added {} - {} ({})", a, b, score);
            LinkOutcome::Added
        } else {
            self.stats.links_replaced += 1;
            log::trace!(
                "Added {} - {} ({}), evicting {} - {} ({})",
                a,
                b,
                score,
                weakest_node,
                evicted.parent,
                evicted.score
            );
            LinkOutcome::Replaced {
                child: weakest_node,
                parent: evicted.parent,
                score: evicted.score,
            }
        }
    }

    /// Walk both parent chains in lockstep until one reaches a node the other has visited.
    ///
    /// Returns the nodes visited from `a` and from `b`, each ending just before the meeting
    /// point. Node 0 is never recorded; when both walks reach it, it is the meeting point.
    fn find_meeting_point(&self, a: u32, b: u32) -> (Vec<u32>, Vec<u32>) {
        let mut path_a = vec![];
        let mut path_b = vec![];
        let mut seen_a: HashMap<u32, usize> = HashMap::new();
        let mut seen_b: HashMap<u32, usize> = HashMap::new();
        let mut cur_a = Some(a);
        let mut cur_b = Some(b);

        loop {
            if let Some(node) = cur_a {
                if node == ROOT {
                    cur_a = None;
                } else if let Some(&idx) = seen_b.get(&node) {
                    path_b.truncate(idx);
                    return (path_a, path_b);
                } else {
                    seen_a.insert(node, path_a.len());
                    path_a.push(node);
                    cur_a = Some(self.edge_of(node).parent);
                }
            }

            if let Some(node) = cur_b {
                if node == ROOT {
                    cur_b = None;
                } else if let Some(&idx) = seen_a.get(&node) {
                    path_a.truncate(idx);
                    return (path_a, path_b);
                } else {
                    seen_b.insert(node, path_b.len());
                    path_b.push(node);
                    cur_b = Some(self.edge_of(node).parent);
                }
            }

            if cur_a.is_none() && cur_b.is_none() {
                return (path_a, path_b);
            }

            if path_a.len() > self.nodes.len() || path_b.len() > self.nodes.len() {
                panic!(
                    "parent chains from {} and {} never meet: the forest contains a cycle",
                    a, b
                );
            }
        }
    }

    /// First minimum-weight edge along `path_a` then `path_b`, as `(on_a_side, index)`
    fn find_weakest_link_in_cycle(&self, path_a: &[u32], path_b: &[u32]) -> Option<(bool, usize)> {
        let side_a = path_a.iter().enumerate().map(|(idx, &n)| (true, idx, n));
        let side_b = path_b.iter().enumerate().map(|(idx, &n)| (false, idx, n));

        let mut weakest: Option<(bool, usize, i32)> = None;
        for (on_a, idx, node) in side_a.chain(side_b) {
            let score = self.edge_of(node).score;
            if weakest.is_none_or(|(_, _, min)| score < min) {
                weakest = Some((on_a, idx, score));
            }
        }
        weakest.map(|(on_a, idx, _)| (on_a, idx))
    }

    /// Flip every edge along `chain` (endpoint first, weakest node last), dropping the weakest
    /// node's own edge. Each edge keeps its data and moves to the node that is now its child.
    fn reverse_chain(&mut self, chain: &[u32]) {
        for pair in chain.windows(2).rev() {
            let (lower, upper) = (pair[0], pair[1]);
            let flipped = ForestNode::with_edge_of(lower, self.edge_of(lower));
            self.nodes.insert(upper, flipped);
        }
    }

    pub fn ingest(&mut self, hit: &HitRecord) -> LinkOutcome {
        self.add_link(
            hit.query_id,
            hit.target_id,
            self.weighting.weight(hit),
            hit.score,
            hit.location,
            hit.length,
        )
    }

    /// Ingest every hit, returning the counters accumulated by this call
    pub fn ingest_all(&mut self, hits: impl IntoIterator<Item = HitRecord>) -> ForestStats {
        let before = self.stats;
        for hit in hits {
            self.ingest(&hit);
        }

        let delta = ForestStats {
            links_processed: self.stats.links_processed - before.links_processed,
            links_added: self.stats.links_added - before.links_added,
            links_rejected: self.stats.links_rejected - before.links_rejected,
            links_replaced: self.stats.links_replaced - before.links_replaced,
        };
        log::debug!(
            "Ingested {} links: {} added ({} replacing), {} rejected; {} edges, weight {}",
            delta.links_processed,
            delta.links_added,
            delta.links_replaced,
            delta.links_rejected,
            self.edge_count(),
            self.total_weight()
        );
        delta
    }

    /// Children across real edges, each list in ascending id order
    pub fn build_children_map(&self) -> ChildrenMap {
        let mut children = ChildrenMap::new();
        for (id, node) in self.edges() {
            children.entry(node.parent).or_default().push(id);
        }
        children
    }

    /// Component root with the most descendants, ties going to the lowest id
    pub fn find_root(&self) -> Option<u32> {
        let children = self.build_children_map();
        let mut best: Option<(u32, usize)> = None;

        for id in self.node_ids() {
            if !self.edge_of(id).is_root() {
                continue;
            }
            let count = count_descendants(&children, id);
            if best.is_none_or(|(_, most)| count > most) {
                best = Some((id, count));
            }
        }
        best.map(|(id, _)| id)
    }
}

pub(crate) fn children_of(children: &ChildrenMap, id: u32) -> &[u32] {
    children.get(&id).map_or(&[][..], Vec::as_slice)
}

pub(crate) fn count_descendants(children: &ChildrenMap, id: u32) -> usize {
    let mut stack = vec![id];
    let mut count = 0;
    while let Some(node) = stack.pop() {
        let below = children_of(children, node);
        count += below.len();
        stack.extend_from_slice(below);
    }
    count
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;

    fn link(forest: &mut SpanningForest, a: u32, b: u32, score: i32) -> LinkOutcome {
        forest.add_link(a, b, score, score, 0, 0)
    }

    fn assert_acyclic(forest: &SpanningForest) {
        let limit = forest.max_seen_id() as usize + 1;
        for id in forest.node_ids() {
            let mut node = id;
            let mut hops = 0;
            while let Some(parent) = forest.parent_of(node) {
                node = parent;
                hops += 1;
                assert!(hops <= limit, "cycle through node {}", id);
            }
        }
    }

    const SCENARIO: [(u32, u32, i32); 7] = [
        (0, 1, 50),
        (1, 2, 50),
        (2, 3, 50),
        (2, 0, 100),
        (4, 5, 80),
        (3, 4, 10),
        (0, 5, 90),
    ];

    #[test]
    fn test_scenario() {
        let mut forest = SpanningForest::new();
        let outcomes = SCENARIO
            .iter()
            .map(|&(a, b, score)| link(&mut forest, a, b, score))
            .collect::<Vec<_>>();

        assert_eq!(
            outcomes[3],
            LinkOutcome::Replaced {
                child: 2,
                parent: 1,
                score: 50
            }
        );
        assert_eq!(
            outcomes[6],
            LinkOutcome::Replaced {
                child: 4,
                parent: 3,
                score: 10
            }
        );

        let stats = forest.stats();
        assert_eq!(stats.links_processed, 7);
        assert_eq!(stats.links_added, 7);
        assert_eq!(stats.links_replaced, 2);
        assert_eq!(stats.links_rejected, 0);
        assert_eq!(forest.edge_count(), 5);
        assert_eq!(forest.total_weight(), 370);

        assert_eq!(forest.parent_of(1), Some(0));
        assert_eq!(forest.parent_of(2), Some(0));
        assert_eq!(forest.parent_of(3), Some(2));
        assert_eq!(forest.parent_of(4), Some(5));
        assert_eq!(forest.parent_of(5), Some(0));
        // reversed edge keeps the 4 - 5 data
        assert_eq!(forest.node(4).unwrap().score, 80);
        assert_acyclic(&forest);
    }

    #[test]
    fn test_weakest_edge_rejected() {
        let mut forest = SpanningForest::new();
        link(&mut forest, 1, 2, 50);
        link(&mut forest, 2, 3, 40);
        assert_eq!(link(&mut forest, 1, 3, 30), LinkOutcome::Rejected);
        // ties keep the existing edge
        assert_eq!(link(&mut forest, 1, 3, 40), LinkOutcome::Rejected);
        assert_eq!(forest.total_weight(), 90);
    }

    #[test]
    fn test_self_link_rejected() {
        let mut forest = SpanningForest::new();
        assert_eq!(link(&mut forest, 7, 7, 99), LinkOutcome::Rejected);
        assert_eq!(forest.stats().links_rejected, 1);
        assert_eq!(forest.edge_count(), 0);
        assert!(forest.contains(7));
        assert_eq!(forest.max_seen_id(), 7);
    }

    #[test]
    fn test_merging_components_reverses_chain() {
        let mut forest = SpanningForest::new();
        // component 10 <- 11 <- 12
        link(&mut forest, 11, 10, 30);
        link(&mut forest, 12, 11, 20);
        // joining 12 to 20 cuts 10's virtual edge and flips the chain above 12
        assert_eq!(link(&mut forest, 12, 20, 60), LinkOutcome::Added);

        assert_eq!(forest.parent_of(10), Some(11));
        assert_eq!(forest.parent_of(11), Some(12));
        assert_eq!(forest.parent_of(12), Some(20));
        assert_eq!(forest.node(10).unwrap().score, 30);
        assert_eq!(forest.node(11).unwrap().score, 20);

        assert_eq!(forest.edge_count(), 3);
        assert_eq!(forest.total_weight(), 110);
        assert_acyclic(&forest);

        let root_of = |forest: &SpanningForest, mut id: u32| {
            while let Some(parent) = forest.parent_of(id) {
                id = parent;
            }
            id
        };
        assert_eq!(root_of(&forest, 10), root_of(&forest, 20));
    }

    #[test]
    fn test_find_root_counts_descendants() {
        let mut forest = SpanningForest::new();
        link(&mut forest, 1, 2, 10);
        link(&mut forest, 5, 6, 10);
        link(&mut forest, 6, 7, 10);
        link(&mut forest, 7, 8, 10);
        link(&mut forest, 9, 9, 10);

        let root = forest.find_root().unwrap();
        let children = forest.build_children_map();
        assert_eq!(count_descendants(&children, root), 3);
        assert!([5, 6, 7, 8].contains(&root));
    }

    #[test]
    fn test_per_hundred_residues() {
        let mut forest = SpanningForest::with_config(&ForestConfig {
            weighting: LinkWeighting::PerHundredResidues,
        });
        forest.ingest(&HitRecord {
            query_id: 1,
            target_id: 2,
            score: 30,
            location: 5,
            length: 60,
        });
        // both ends are fresh roots, so the query end is hung off the target
        let edge = forest.node(1).unwrap();
        assert_eq!(edge.parent, 2);
        assert_eq!(edge.score, 50);
        assert_eq!(edge.raw_score, 30);
        assert_eq!(edge.location, 5);
        assert_eq!(edge.length, 60);
    }

    #[test]
    fn test_random_links_stay_acyclic() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let mut forest = SpanningForest::new();
            for _ in 0..200 {
                let a = rng.random_range(0..50);
                let b = rng.random_range(0..50);
                link(&mut forest, a, b, rng.random_range(1..1000));
                assert_acyclic(&forest);
            }
            let stats = forest.stats();
            assert_eq!(stats.links_added + stats.links_rejected, stats.links_processed);
            assert_eq!(stats.links_added - stats.links_replaced, forest.edge_count());
        }
    }

    #[test]
    fn test_sparse_ids_stay_sparse() {
        let mut forest = SpanningForest::new();
        assert_eq!(link(&mut forest, 1, 4_000_000_000, 70), LinkOutcome::Added);
        link(&mut forest, u32::MAX, 1, 20);

        assert_eq!(forest.max_seen_id(), u32::MAX);
        assert_eq!(forest.node_ids().collect::<Vec<_>>(), vec![1, 4_000_000_000, u32::MAX]);
        assert!(!forest.contains(2));
        assert_eq!(forest.edge_count(), 2);
        assert_eq!(forest.total_weight(), 90);

        let children = forest.build_children_map();
        let root = forest.find_root().unwrap();
        assert_eq!(count_descendants(&children, root), 2);
        assert_acyclic(&forest);
    }

    /// Weight and edge count of a maximum spanning forest over the non-negative links
    fn kruskal(links: &[(u32, u32, i32)]) -> (i64, usize) {
        fn find(sets: &mut HashMap<u32, u32>, id: u32) -> u32 {
            let up = *sets.entry(id).or_insert(id);
            if up == id {
                return id;
            }
            let top = find(sets, up);
            sets.insert(id, top);
            top
        }

        let mut sets = HashMap::new();
        let (mut weight, mut edges) = (0, 0);
        for &(a, b, score) in links.iter().sorted_by_key(|l| std::cmp::Reverse(l.2)) {
            if score < 0 || a == b {
                continue;
            }
            let (top_a, top_b) = (find(&mut sets, a), find(&mut sets, b));
            if top_a != top_b {
                sets.insert(top_a, top_b);
                weight += score as i64;
                edges += 1;
            }
        }
        (weight, edges)
    }

    #[test]
    fn test_matches_offline_maximum_forest() {
        let mut rng = StdRng::seed_from_u64(23);
        for round in 0..300 {
            let nodes = rng.random_range(2..30);
            // narrow score range for plenty of ties, zeros and negatives
            let links = (0..rng.random_range(1..80))
                .map(|_| {
                    (
                        rng.random_range(0..nodes),
                        rng.random_range(0..nodes),
                        rng.random_range(-3..12),
                    )
                })
                .collect::<Vec<(u32, u32, i32)>>();

            let mut forest = SpanningForest::new();
            for &(a, b, score) in &links {
                link(&mut forest, a, b, score);
            }
            assert_acyclic(&forest);
            assert_eq!(
                (forest.total_weight(), forest.edge_count()),
                kruskal(&links),
                "round {}: {:?}",
                round,
                links
            );
        }
    }

    #[test]
    fn test_order_does_not_change_weight() {
        let mut rng = StdRng::seed_from_u64(11);
        let links = (0..120)
            .map(|_| {
                (
                    rng.random_range(0..30),
                    rng.random_range(0..30),
                    rng.random_range(1..500),
                )
            })
            .collect::<Vec<(u32, u32, i32)>>();

        let build = |links: &[(u32, u32, i32)]| {
            let mut forest = SpanningForest::new();
            for &(a, b, score) in links {
                link(&mut forest, a, b, score);
            }
            forest
        };

        let expected = build(&links);
        let mut shuffled = links.clone();
        for _ in 0..10 {
            shuffled.shuffle(&mut rng);
            let forest = build(&shuffled);
            let stats = forest.stats();
            assert_eq!(stats.links_added + stats.links_rejected, stats.links_processed);
            assert_eq!(forest.total_weight(), expected.total_weight());
            assert_eq!(forest.edge_count(), expected.edge_count());
        }
    }
}
