//! Recursion analysis on top of the SCC engine.
//!
//! Direct recursion comes straight from the strongly connected components:
//! every member of a recursive cycle gets the cycle's size as its depth.
//! Functions outside any cycle get an indirect depth instead, the longest
//! call chain below them before a path repeats a function.

use std::collections::{BTreeMap, HashSet};

use log::{debug, trace, warn};
use petgraph::graph::NodeIndex;
use regex::Regex;

use crate::config::AnalysisConfig;
use crate::graph_builder::{CallGraph, CfgMap};
use crate::scc::{ids_of, is_cycle, strongly_connected_components};
use crate::types::RecursionDepthInfo;

// Per-node view of the recursive cycles: cycle size and members
struct CycleMembership {
    depth: Vec<usize>,
    members: Vec<Option<Vec<NodeIndex>>>,
}

impl CycleMembership {
    fn compute(graph: &CallGraph) -> Self {
        let mut depth = vec![0; graph.node_count()];
        let mut members = vec![None; graph.node_count()];

        for component in strongly_connected_components(graph) {
            if !is_cycle(graph, &component) {
                continue;
            }
            for &node in &component {
                depth[node.index()] = component.len();
                members[node.index()] = Some(component.clone());
            }
        }

        Self { depth, members }
    }

    fn is_recursive(&self, node: NodeIndex) -> bool {
        self.depth[node.index()] > 0
    }
}

/// Recursion depth information for every function in the function set.
///
/// Pure: node flags are left untouched, see [`mark_recursive_functions`].
pub fn compute_recursion_depth(
    graph: &CallGraph,
    config: &AnalysisConfig,
) -> BTreeMap<String, RecursionDepthInfo> {
    let cycles = CycleMembership::compute(graph);
    let mut result = BTreeMap::new();

    for node in graph.node_indices() {
        let function = graph.node_at(node);
        if !function.is_defined() {
            continue;
        }

        let direct_recursion_depth = cycles.depth[node.index()];
        let cycle_functions = cycles.members[node.index()]
            .as_deref()
            .map(|members| ids_of(graph, members))
            .unwrap_or_default();

        let indirect_recursion_depth = if direct_recursion_depth == 0 {
            let depth = indirect_depth(graph, node, Vec::new(), config.max_indirect_depth);
            if depth >= config.max_indirect_depth {
                debug!(
                    "Indirect depth walk from `{}` hit the cap of {}",
                    function.id, config.max_indirect_depth
                );
            }
            depth
        } else {
            0
        };

        let mut seen = HashSet::new();
        let recursive_callees: Vec<String> = graph
            .callees(node)
            .into_iter()
            .filter(|&callee| cycles.is_recursive(callee) && seen.insert(callee))
            .map(|callee| graph.node_at(callee).id.clone())
            .collect();

        result.insert(
            function.id.clone(),
            RecursionDepthInfo {
                function: function.id.clone(),
                direct_recursion_depth,
                indirect_recursion_depth,
                recursive_callees,
                cycle_functions,
                is_recursive: direct_recursion_depth > 0,
            },
        );
    }

    result
}

// `path` holds the functions above `node`, so its length is the depth so far.
// Each branch gets its own copy; the cap keeps it short.
fn indirect_depth(
    graph: &CallGraph,
    node: NodeIndex,
    mut path: Vec<NodeIndex>,
    cap: usize,
) -> usize {
    let depth = path.len();
    if depth >= cap {
        return cap;
    }
    if path.contains(&node) {
        return depth;
    }
    path.push(node);

    graph.callees(node).into_iter().fold(depth, |deepest, callee| {
        deepest.max(indirect_depth(graph, callee, path.clone(), cap))
    })
}

/// Compute recursion depths and raise `is_recursive` on every function that
/// sits on a recursive cycle.
pub fn mark_recursive_functions(
    graph: &mut CallGraph,
    config: &AnalysisConfig,
) -> BTreeMap<String, RecursionDepthInfo> {
    let depths = compute_recursion_depth(graph, config);

    let mut marked = 0;
    for info in depths.values().filter(|info| info.is_recursive) {
        if let Some(idx) = graph.index_of(&info.function) {
            graph.node_at_mut(idx).is_recursive = true;
            marked += 1;
        }
    }

    debug!("Marked {} recursive functions", marked);
    depths
}

/// Ids of the recursive functions whose CFG ends some path with
/// `return <own name>(...)`.
///
/// The check looks only at the last statement of each non-empty exit block
/// and is textual: a call spelled differently is missed, and matching text
/// inside a string literal is accepted.
pub fn detect_tail_recursion(graph: &CallGraph, cfgs: &CfgMap) -> Vec<String> {
    let cycles = CycleMembership::compute(graph);
    let mut tail_recursive = Vec::new();

    for node in graph.node_indices() {
        let function = graph.node_at(node);
        if !function.is_defined() || !cycles.is_recursive(node) {
            continue;
        }
        let Some(cfg) = cfgs.get(&function.id) else {
            trace!("No CFG for recursive function `{}`", function.id);
            continue;
        };

        let pattern = format!(r"\breturn\s+{}\s*\(", regex::escape(&function.id));
        let tail_call = match Regex::new(&pattern) {
            Ok(regex) => regex,
            Err(err) => {
                warn!("Skipping tail check for `{}`: {}", function.id, err);
                continue;
            }
        };

        let found = cfg
            .exit_blocks()
            .filter_map(|block| block.statements.last())
            .any(|statement| tail_call.is_match(&statement.text));

        if found {
            tail_recursive.push(function.id.clone());
        }
    }

    debug!("Found {} tail-recursive functions", tail_recursive.len());
    tail_recursive
}
