use log::debug;
use petgraph::graph::NodeIndex;

use crate::config::AnalysisConfig;
use crate::externals::classify_external_functions;
use crate::graph_builder::CallGraph;
use crate::recursion::compute_recursion_depth;
use crate::types::{CallGraphStatistics, MostCalledFunction};

/// Aggregate metrics over the whole graph. Recursion and external
/// information is recomputed on every call.
pub fn compute_statistics(graph: &CallGraph, config: &AnalysisConfig) -> CallGraphStatistics {
    let functions: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|&idx| graph.node_at(idx).is_defined())
        .collect();

    let total_functions = functions.len();
    let outgoing: Vec<usize> = functions.iter().map(|&idx| graph.outgoing_count(idx)).collect();
    let average_calls_per_function = if total_functions == 0 {
        0.0
    } else {
        outgoing.iter().sum::<usize>() as f64 / total_functions as f64
    };
    let max_calls_per_function = outgoing.iter().copied().max().unwrap_or(0);

    let depths = compute_recursion_depth(graph, config);
    let recursive: Vec<usize> = depths
        .values()
        .filter(|info| info.is_recursive)
        .map(|info| info.direct_recursion_depth)
        .collect();
    let average_recursion_depth = if recursive.is_empty() {
        0.0
    } else {
        recursive.iter().sum::<usize>() as f64 / recursive.len() as f64
    };

    let statistics = CallGraphStatistics {
        total_functions,
        total_calls: graph.call_count(),
        external_functions: classify_external_functions(graph).len(),
        recursive_functions: recursive.len(),
        average_calls_per_function,
        max_calls_per_function,
        most_called_function: most_called_function(graph),
        deepest_call_chain: deepest_call_chain(graph),
        average_recursion_depth,
    };

    debug!(
        "Statistics: {} functions, {} calls, {} recursive, deepest chain {}",
        statistics.total_functions,
        statistics.total_calls,
        statistics.recursive_functions,
        statistics.deepest_call_chain
    );
    statistics
}

/// Function with the most incoming calls. Ties go to the node registered
/// first; `None` when the graph has no calls.
pub fn most_called_function(graph: &CallGraph) -> Option<MostCalledFunction> {
    let mut ranked: Vec<(NodeIndex, usize)> = graph
        .node_indices()
        .map(|idx| (idx, graph.incoming_count(idx)))
        .filter(|(_, count)| *count > 0)
        .collect();
    // stable sort keeps node order among equal counts
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    ranked.first().map(|&(idx, call_count)| MostCalledFunction {
        name: graph.node_at(idx).id.clone(),
        call_count,
    })
}

/// Length, in calls, of the longest call chain that never revisits a
/// function. Always terminates: an edge back onto the current path is
/// not followed.
pub fn deepest_call_chain(graph: &CallGraph) -> usize {
    let mut memo: Vec<Option<usize>> = vec![None; graph.node_count()];
    let mut on_path = vec![false; graph.node_count()];
    let mut deepest = 0;

    for node in graph.node_indices() {
        deepest = deepest.max(chain_depth(graph, node, &mut on_path, &mut memo));
    }

    deepest
}

// A function on the current path and the best chain found below it so far
struct ChainFrame {
    node: NodeIndex,
    callees: Vec<NodeIndex>,
    next: usize,
    deepest: usize,
}

impl ChainFrame {
    fn new(graph: &CallGraph, node: NodeIndex) -> Self {
        Self {
            node,
            callees: graph.callees(node),
            next: 0,
            deepest: 0,
        }
    }
}

// `on_path` marks exactly the functions of the frames on the work stack: set
// on entry, cleared on exit.
fn chain_depth(
    graph: &CallGraph,
    root: NodeIndex,
    on_path: &mut [bool],
    memo: &mut [Option<usize>],
) -> usize {
    if let Some(depth) = memo[root.index()] {
        return depth;
    }
    on_path[root.index()] = true;
    let mut frames = vec![ChainFrame::new(graph, root)];

    while let Some(frame) = frames.last_mut() {
        if let Some(&callee) = frame.callees.get(frame.next) {
            frame.next += 1;
            if on_path[callee.index()] {
                continue;
            }
            match memo[callee.index()] {
                Some(depth) => frame.deepest = frame.deepest.max(depth + 1),
                None => {
                    on_path[callee.index()] = true;
                    frames.push(ChainFrame::new(graph, callee));
                }
            }
            continue;
        }

        let (node, deepest) = (frame.node, frame.deepest);
        frames.pop();
        memo[node.index()] = Some(deepest);
        on_path[node.index()] = false;

        match frames.last_mut() {
            Some(parent) => parent.deepest = parent.deepest.max(deepest + 1),
            None => return deepest,
        }
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallEdge;
    use pretty_assertions::assert_eq;

    fn build(functions: &[&str], calls: &[(&str, &str)]) -> CallGraph {
        let mut graph = CallGraph::new();
        for f in functions {
            graph.add_function(*f, vec![]).unwrap();
        }
        for (caller, callee) in calls {
            graph.add_call(CallEdge::new(*caller, *callee)).unwrap();
        }
        graph
    }

    #[test]
    fn test_empty_graph() {
        let stats = compute_statistics(&CallGraph::new(), &AnalysisConfig::default());
        assert_eq!(stats, CallGraphStatistics::default());
        assert!(stats.most_called_function.is_none());
    }

    #[test]
    fn test_functions_without_calls() {
        let graph = build(&["a", "b"], &[]);
        let stats = compute_statistics(&graph, &AnalysisConfig::default());

        assert_eq!(stats.total_functions, 2);
        assert_eq!(stats.average_calls_per_function, 0.0);
        assert_eq!(stats.most_called_function, None);
        assert_eq!(stats.deepest_call_chain, 0);
    }

    #[test]
    fn test_mixed_graph() {
        let graph = build(
            &["main", "fact", "a", "b", "log_msg"],
            &[
                ("main", "fact"),
                ("main", "a"),
                ("main", "log_msg"),
                ("main", "printf"),
                ("fact", "fact"),
                ("a", "b"),
                ("b", "a"),
                ("a", "log_msg"),
                ("b", "log_msg"),
                ("log_msg", "printf"),
            ],
        );
        let stats = compute_statistics(&graph, &AnalysisConfig::default());

        assert_eq!(stats.total_functions, 5);
        assert_eq!(stats.total_calls, 10);
        assert_eq!(stats.external_functions, 1);
        assert_eq!(stats.recursive_functions, 3);
        assert_eq!(stats.average_calls_per_function, 2.0);
        assert_eq!(stats.max_calls_per_function, 4);
        assert_eq!(
            stats.most_called_function,
            Some(MostCalledFunction {
                name: "log_msg".to_string(),
                call_count: 3
            })
        );
        // main -> a -> b -> log_msg -> printf
        assert_eq!(stats.deepest_call_chain, 4);
        // (1 + 2 + 2) / 3
        assert!((stats.average_recursion_depth - 5.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_most_called_tie_goes_to_first_registered() {
        let graph = build(&["main", "x", "y"], &[("main", "y"), ("main", "x")]);
        assert_eq!(most_called_function(&graph).unwrap().name, "x");
    }

    #[test]
    fn test_deepest_chain_terminates_on_dense_cycles() {
        let names = ["a", "b", "c", "d"];
        let mut calls = Vec::new();
        for from in names {
            for to in names {
                calls.push((from, to));
            }
        }
        let graph = build(&names, &calls);
        assert_eq!(deepest_call_chain(&graph), 3);
    }

    #[test]
    fn test_deepest_chain_on_a_long_chain() {
        let names: Vec<String> = (0..20_000).map(|i| format!("f{}", i)).collect();
        let mut graph = CallGraph::new();
        for name in &names {
            graph.add_function(name.as_str(), vec![]).unwrap();
        }
        for pair in names.windows(2) {
            graph
                .add_call(CallEdge::new(pair[0].as_str(), pair[1].as_str()))
                .unwrap();
        }

        assert_eq!(deepest_call_chain(&graph), 19_999);
    }

    #[test]
    fn test_shared_callee_is_walked_once_and_reused() {
        let graph = build(
            &["a", "b", "c", "d", "e"],
            &[("a", "b"), ("b", "c"), ("a", "d"), ("d", "c"), ("c", "e")],
        );
        let mut on_path = vec![false; graph.node_count()];
        let mut memo = vec![None; graph.node_count()];
        let c = graph.index_of("c").unwrap();

        assert_eq!(chain_depth(&graph, c, &mut on_path, &mut memo), 1);
        // a -> b -> c -> e, with c answered from the memo
        let a = graph.index_of("a").unwrap();
        assert_eq!(chain_depth(&graph, a, &mut on_path, &mut memo), 3);
        assert!(on_path.iter().all(|marked| !marked));
    }
}
