//! Tarjan's strongly connected components over the call graph.

use log::trace;
use petgraph::graph::NodeIndex;

use crate::graph_builder::CallGraph;

// Mutable state for one run of Tarjan's algorithm, indexed by node index
struct TarjanState {
    next_index: usize,
    indices: Vec<Option<usize>>,
    lowlinks: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<NodeIndex>,
    components: Vec<Vec<NodeIndex>>,
}

// A node whose callees are still being walked
struct Frame {
    node: NodeIndex,
    callees: Vec<NodeIndex>,
    next: usize,
}

impl TarjanState {
    fn new(node_count: usize) -> Self {
        Self {
            next_index: 0,
            indices: vec![None; node_count],
            lowlinks: vec![0; node_count],
            on_stack: vec![false; node_count],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn enter(&mut self, graph: &CallGraph, v: NodeIndex) -> Frame {
        let vi = v.index();
        self.indices[vi] = Some(self.next_index);
        self.lowlinks[vi] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[vi] = true;

        Frame {
            node: v,
            callees: graph.callees(v),
            next: 0,
        }
    }
}

/// Partition every node of the graph into strongly connected components.
///
/// Roots are taken in node order, so the partition and the order of the
/// components are stable for a given graph. Members of each component are
/// sorted by node index.
pub(crate) fn strongly_connected_components(graph: &CallGraph) -> Vec<Vec<NodeIndex>> {
    let mut state = TarjanState::new(graph.node_count());

    for node in graph.node_indices() {
        if state.indices[node.index()].is_none() {
            strong_connect(graph, node, &mut state);
        }
    }

    trace!("Tarjan found {} components", state.components.len());
    state.components
}

// Depth-first walk from `root` on an explicit frame stack, so call chains of
// any length fit.
fn strong_connect(graph: &CallGraph, root: NodeIndex, state: &mut TarjanState) {
    let mut frames = vec![state.enter(graph, root)];

    while let Some(frame) = frames.last_mut() {
        let vi = frame.node.index();

        if let Some(&w) = frame.callees.get(frame.next) {
            frame.next += 1;
            let wi = w.index();
            let seen = state.indices[wi];
            match seen {
                None => frames.push(state.enter(graph, w)),
                Some(w_index) if state.on_stack[wi] => {
                    state.lowlinks[vi] = state.lowlinks[vi].min(w_index);
                }
                Some(_) => {}
            }
            continue;
        }

        let v = frame.node;
        frames.pop();
        if let Some(parent) = frames.last() {
            let pi = parent.node.index();
            state.lowlinks[pi] = state.lowlinks[pi].min(state.lowlinks[vi]);
        }

        // v roots a component: pop it off the stack
        if state.indices[vi] == Some(state.lowlinks[vi]) {
            let mut component = Vec::new();
            while let Some(w) = state.stack.pop() {
                state.on_stack[w.index()] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            component.sort();
            state.components.push(component);
        }
    }
}

/// A component is a recursive cycle when it has several members, or one
/// member that calls itself.
pub(crate) fn is_cycle(graph: &CallGraph, component: &[NodeIndex]) -> bool {
    match component {
        [single] => graph.has_self_loop(*single),
        members => members.len() > 1,
    }
}

/// Components by function id, including trivial single-node ones.
pub fn find_strongly_connected_components(graph: &CallGraph) -> Vec<Vec<String>> {
    strongly_connected_components(graph)
        .into_iter()
        .map(|component| ids_of(graph, &component))
        .collect()
}

/// Only the components that form recursive cycles.
pub fn find_recursive_cycles(graph: &CallGraph) -> Vec<Vec<String>> {
    strongly_connected_components(graph)
        .into_iter()
        .filter(|component| is_cycle(graph, component))
        .map(|component| ids_of(graph, &component))
        .collect()
}

pub(crate) fn ids_of(graph: &CallGraph, nodes: &[NodeIndex]) -> Vec<String> {
    nodes.iter().map(|&idx| graph.node_at(idx).id.clone()).collect()
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

    fn sorted(mut components: Vec<Vec<String>>) -> Vec<Vec<String>> {
        for c in components.iter_mut() {
            c.sort();
        }
        components.sort();
        components
    }

    #[test]
    fn test_every_node_lands_in_exactly_one_component() {
        let graph = build(
            &["a", "b", "c", "d", "e"],
            &[("a", "b"), ("b", "a"), ("c", "d"), ("d", "printf")],
        );

        let components = find_strongly_connected_components(&graph);
        let total: usize = components.iter().map(Vec::len).sum();
        assert_eq!(total, 6);
        assert_eq!(
            sorted(components),
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string()],
                vec!["d".to_string()],
                vec!["e".to_string()],
                vec!["printf".to_string()],
            ]
        );
    }

    #[test]
    fn test_self_loop_is_a_cycle_but_isolated_node_is_not() {
        let graph = build(&["f", "g"], &[("f", "f")]);
        assert_eq!(find_recursive_cycles(&graph), vec![vec!["f".to_string()]]);
    }

    #[test]
    fn test_disconnected_cycles_are_separate() {
        let graph = build(
            &["a", "b", "c", "x", "y"],
            &[("a", "b"), ("b", "c"), ("c", "a"), ("x", "y"), ("y", "x")],
        );

        assert_eq!(
            sorted(find_recursive_cycles(&graph)),
            vec![
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                vec!["x".to_string(), "y".to_string()],
            ]
        );
    }

    #[test]
    fn test_chain_into_cycle_keeps_chain_out() {
        let graph = build(&["main", "a", "b"], &[("main", "a"), ("a", "b"), ("b", "a")]);
        let cycles = find_recursive_cycles(&graph);
        assert_eq!(cycles, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn test_long_chain_does_not_exhaust_the_stack() {
        let mut graph = CallGraph::new();
        for i in 0..200_000 {
            graph.add_function(format!("f{}", i), vec![]).unwrap();
        }
        for i in 1..200_000 {
            graph
                .add_call(CallEdge::new(format!("f{}", i - 1), format!("f{}", i)))
                .unwrap();
        }
        graph.add_call(CallEdge::new("f199999", "f199990")).unwrap();

        let components = find_strongly_connected_components(&graph);
        assert_eq!(components.len(), 199_991);
        let cycles = find_recursive_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 10);
    }
}
