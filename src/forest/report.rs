//! Text renderings of a [`SpanningForest`]: an indented tree per component and a listing of the
//! edges that fall in the twilight band.
//!
//! ```text
//! 8 seq8
//! ├── 7 seq7 [90]
//! │   └── 6 seq6 [40]
//! └── 3 seq3 [70] ...
//! ```

use std::collections::HashMap;
use std::io::Write;

use itertools::Itertools;

use super::{ChildrenMap, SpanningForest, children_of, count_descendants};
use crate::ReportConfig;
use crate::error::Result;

/// Human readable name of a node
pub trait NodeLabels {
    fn label(&self, id: u32) -> String;
}

impl<F: Fn(u32) -> String> NodeLabels for F {
    fn label(&self, id: u32) -> String {
        self(id)
    }
}

impl NodeLabels for HashMap<u32, String> {
    fn label(&self, id: u32) -> String {
        self.get(&id).cloned().unwrap_or_default()
    }
}

impl NodeLabels for [String] {
    fn label(&self, id: u32) -> String {
        self.get(id as usize).cloned().unwrap_or_default()
    }
}

/// Decides whether the twilight pair `child - parent` is uninteresting
pub trait TwilightFilter {
    fn skip(&self, a: u32, b: u32) -> bool;
}

impl<F: Fn(u32, u32) -> bool> TwilightFilter for F {
    fn skip(&self, a: u32, b: u32) -> bool {
        self(a, b)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
    /// Node lines written inside trees, stubs included
    pub rendered: usize,
    pub stubs: usize,
    /// Trees written, the primary one included
    pub components: usize,
    pub isolated: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwilightSummary {
    pub listed: usize,
    pub suppressed: usize,
}

fn node_text(labels: &(impl NodeLabels + ?Sized), id: u32) -> String {
    let label = labels.label(id);
    if label.is_empty() {
        id.to_string()
    } else {
        format!("{} {}", id, label)
    }
}

/// Write the component with the most descendants first, then every other component, then the
/// nodes that have no edges at all.
pub fn write_tree<L: NodeLabels + ?Sized>(
    forest: &SpanningForest,
    labels: &L,
    config: &ReportConfig,
    out: &mut impl Write,
) -> Result<TreeSummary> {
    let mut children = forest.build_children_map();
    for below in children.values_mut() {
        below.sort_by_key(|&id| (std::cmp::Reverse(forest.edge_of(id).score), id));
    }

    let mut summary = TreeSummary::default();
    let primary = forest.find_root();
    let roots = forest
        .node_ids()
        .filter(|&id| forest.parent_of(id).is_none())
        .collect::<Vec<_>>();

    let (trees, isolated): (Vec<u32>, Vec<u32>) = roots
        .iter()
        .copied()
        .partition(|&id| children.contains_key(&id));
    let others = trees
        .iter()
        .copied()
        .filter(|&id| Some(id) != primary)
        .sorted_by_key(|&id| (std::cmp::Reverse(count_descendants(&children, id)), id));

    for root in primary
        .filter(|&id| children.contains_key(&id))
        .into_iter()
        .chain(others)
    {
        if summary.components > 0 {
            writeln!(out)?;
        }
        write_component(forest, &children, labels, config, root, out, &mut summary)?;
        summary.components += 1;
    }

    if !isolated.is_empty() {
        if summary.components > 0 {
            writeln!(out)?;
        }
        writeln!(out, "Isolated:")?;
        for id in isolated {
            writeln!(out, "{}", node_text(labels, id))?;
            summary.isolated += 1;
        }
    }

    log::debug!(
        "Rendered {} nodes in {} components, {} stubs, {} isolated",
        summary.rendered,
        summary.components,
        summary.stubs,
        summary.isolated
    );
    Ok(summary)
}

fn write_component<L: NodeLabels + ?Sized>(
    forest: &SpanningForest,
    children: &ChildrenMap,
    labels: &L,
    config: &ReportConfig,
    root: u32,
    out: &mut impl Write,
    summary: &mut TreeSummary,
) -> Result<()> {
    writeln!(out, "{}", node_text(labels, root))?;
    summary.rendered += 1;

    // (node, prefix of its line, last among its siblings)
    let mut stack = children_of(children, root)
        .iter()
        .rev()
        .enumerate()
        .map(|(idx, &id)| (id, String::new(), idx == 0))
        .collect::<Vec<_>>();

    while let Some((id, prefix, last)) = stack.pop() {
        let score = forest.edge_of(id).score;
        let glyph = if last { "└── " } else { "├── " };
        let below = children_of(children, id);
        let stub = score < config.stub_threshold;

        write!(out, "{}{}{} [{}]", prefix, glyph, node_text(labels, id), score)?;
        summary.rendered += 1;
        if stub {
            summary.stubs += 1;
            if !below.is_empty() {
                write!(out, " ...")?;
            }
            writeln!(out)?;
            continue;
        }
        writeln!(out)?;

        let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
        stack.extend(
            below
                .iter()
                .rev()
                .enumerate()
                .map(|(idx, &child)| (child, child_prefix.clone(), idx == 0)),
        );
    }
    Ok(())
}

/// List every edge scoring inside the twilight band, strongest first. Pairs the filter skips are
/// collapsed into one count line per run.
pub fn report_twilight<L: NodeLabels + ?Sized>(
    forest: &SpanningForest,
    labels: &L,
    filter: &impl TwilightFilter,
    config: &ReportConfig,
    out: &mut impl Write,
) -> Result<TwilightSummary> {
    let band = config.twilight_low..=config.twilight_high;
    let mut summary = TwilightSummary::default();
    let mut run = 0;

    let edges = forest
        .edges()
        .filter(|(_, node)| band.contains(&node.score))
        .sorted_by_key(|(id, node)| (std::cmp::Reverse(node.score), *id));

    for (id, node) in edges {
        if filter.skip(id, node.parent) {
            summary.suppressed += 1;
            run += 1;
            continue;
        }
        if run > 0 {
            writeln!(out, "  ({} skipped)", run)?;
            run = 0;
        }
        writeln!(
            out,
            "{}\t{}\t{}",
            node.score,
            node_text(labels, id),
            node_text(labels, node.parent)
        )?;
        summary.listed += 1;
    }
    if run > 0 {
        writeln!(out, "  ({} skipped)", run)?;
    }

    writeln!(
        out,
        "{} listed, {} suppressed in [{}, {}]",
        summary.listed,
        summary.suppressed,
        config.twilight_low,
        config.twilight_high
    )?;
    Ok(summary)
}
