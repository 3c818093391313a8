use std::collections::{HashMap, HashSet};

use crate::analyzer::AnalysisReport;
use crate::config::AnalysisConfig;
use crate::externals::classify_external_functions;
use crate::graph_builder::{CallGraph, CfgMap};
use crate::recursion::{compute_recursion_depth, detect_tail_recursion};

// Visual category of a function node in the exported graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStyle {
    External,
    TailRecursive,
    Recursive,
    HighFanOut,
    Default,
}

impl NodeStyle {
    // (shape, fillcolor, style)
    fn attributes(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            NodeStyle::External => ("box", "lightgrey", "filled,dashed"),
            NodeStyle::TailRecursive => ("doubleoctagon", "lightgreen", "filled"),
            NodeStyle::Recursive => ("octagon", "salmon", "filled"),
            NodeStyle::HighFanOut => ("ellipse", "orange", "filled"),
            NodeStyle::Default => ("ellipse", "lightblue", "filled"),
        }
    }
}

/// Render the call graph as a DOT document.
///
/// Recursion and external status are recomputed here (node flags set by
/// earlier passes are honoured as well). Tail recursion can only be shown
/// when CFGs are supplied.
pub fn format_call_graph_as_dot(
    graph: &CallGraph,
    cfgs: Option<&CfgMap>,
    config: &AnalysisConfig,
) -> String {
    let externals: HashSet<String> = classify_external_functions(graph).into_keys().collect();
    let recursive: HashSet<String> = compute_recursion_depth(graph, config)
        .into_values()
        .filter(|info| info.is_recursive)
        .map(|info| info.function)
        .collect();
    let tail_recursive: HashSet<String> = cfgs
        .map(|cfgs| detect_tail_recursion(graph, cfgs).into_iter().collect())
        .unwrap_or_default();

    let mut output = String::from("digraph CallGraph {\n");

    // Add global styling
    output.push_str("    graph [fontname=\"Arial\", rankdir=TB, splines=true];\n");
    output.push_str("    node [fontname=\"Arial\"];\n");
    output.push_str("    edge [fontname=\"Arial\", color=\"blue\"];\n\n");

    for idx in graph.node_indices() {
        let node = graph.node_at(idx);
        let call_count = graph.outgoing_count(idx);

        let style = if node.is_external || externals.contains(&node.id) {
            NodeStyle::External
        } else if node.is_recursive || recursive.contains(&node.id) {
            if tail_recursive.contains(&node.id) {
                NodeStyle::TailRecursive
            } else {
                NodeStyle::Recursive
            }
        } else if call_count > config.high_fan_out_threshold {
            NodeStyle::HighFanOut
        } else {
            NodeStyle::Default
        };
        let (shape, color, fill) = style.attributes();

        let name = escape_label(&node.id);
        output.push_str(&format!(
            "    \"{}\" [label=\"{}\\n({} calls)\", shape={}, fillcolor=\"{}\", style=\"{}\"];\n",
            name, name, call_count, shape, color, fill
        ));
    }

    if graph.call_count() > 0 {
        output.push('\n');
    }

    // Collapse repeated caller -> callee pairs into one edge
    let mut order: Vec<(&str, &str)> = Vec::new();
    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    for call in graph.calls() {
        let key = (call.caller.as_str(), call.callee.as_str());
        let count = counts.entry(key).or_insert(0);
        if *count == 0 {
            order.push(key);
        }
        *count += 1;
    }

    for (caller, callee) in order {
        let count = counts[&(caller, callee)];
        if count > 1 {
            output.push_str(&format!(
                "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                escape_label(caller),
                escape_label(callee),
                count
            ));
        } else {
            output.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                escape_label(caller),
                escape_label(callee)
            ));
        }
    }

    output.push_str("}\n");
    output
}

fn escape_label(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn format_report_as_json(report: &AnalysisReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BasicBlock, CallEdge, ControlFlowGraph};

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

    fn node_line<'a>(dot: &'a str, name: &str) -> &'a str {
        let prefix = format!("    \"{}\" [", name);
        dot.lines()
            .find(|line| line.starts_with(&prefix))
            .unwrap_or_else(|| panic!("no node line for {}", name))
    }

    #[test]
    fn test_styles_follow_flags() {
        let mut calls = vec![
            ("main", "fact"),
            ("main", "even"),
            ("fact", "fact"),
            ("even", "odd"),
            ("odd", "even"),
        ];
        for callee in ["a", "b", "c", "d", "e", "f"] {
            calls.push(("dispatch", callee));
        }
        let graph = build(&["main", "fact", "even", "odd", "dispatch", "quiet"], &calls);

        let mut cfgs = CfgMap::new();
        cfgs.insert(
            "fact".into(),
            ControlFlowGraph::new(
                "fact",
                vec![BasicBlock::new(0).with_statements(["return fact(n - 1, acc * n)"])],
            ),
        );

        let dot = format_call_graph_as_dot(&graph, Some(&cfgs), &AnalysisConfig::default());

        assert!(node_line(&dot, "fact").contains("fillcolor=\"lightgreen\""));
        assert!(node_line(&dot, "even").contains("fillcolor=\"salmon\""));
        assert!(node_line(&dot, "dispatch").contains("fillcolor=\"orange\""));
        assert!(node_line(&dot, "dispatch").contains("(6 calls)"));
        assert!(node_line(&dot, "quiet").contains("fillcolor=\"lightblue\""));
        // callees outside the function set render as externals
        assert!(node_line(&dot, "a").contains("fillcolor=\"lightgrey\""));
    }

    #[test]
    fn test_fan_out_style_starts_above_threshold() {
        let mut calls = Vec::new();
        for callee in ["a", "b", "c", "d", "e"] {
            calls.push(("at_threshold", callee));
            calls.push(("above_threshold", callee));
        }
        calls.push(("above_threshold", "f"));
        let graph = build(&["at_threshold", "above_threshold"], &calls);

        let dot = format_call_graph_as_dot(&graph, None, &AnalysisConfig::default());
        assert!(node_line(&dot, "at_threshold").contains("(5 calls)"));
        assert!(node_line(&dot, "at_threshold").contains("fillcolor=\"lightblue\""));
        assert!(node_line(&dot, "above_threshold").contains("(6 calls)"));
        assert!(node_line(&dot, "above_threshold").contains("fillcolor=\"orange\""));

        let raised = AnalysisConfig::default().with_high_fan_out_threshold(6);
        let dot = format_call_graph_as_dot(&graph, None, &raised);
        assert!(node_line(&dot, "above_threshold").contains("fillcolor=\"lightblue\""));
    }

    #[test]
    fn test_without_cfgs_recursion_is_general() {
        let graph = build(&["fact"], &[("fact", "fact")]);
        let dot = format_call_graph_as_dot(&graph, None, &AnalysisConfig::default());
        assert!(node_line(&dot, "fact").contains("fillcolor=\"salmon\""));
    }

    #[test]
    fn test_repeated_edges_collapse() {
        let graph = build(
            &["main", "helper"],
            &[("main", "helper"), ("main", "helper"), ("helper", "puts")],
        );
        let dot = format_call_graph_as_dot(&graph, None, &AnalysisConfig::default());

        assert!(dot.contains("    \"main\" -> \"helper\" [label=\"2\"];\n"));
        assert!(dot.contains("    \"helper\" -> \"puts\";\n"));
        assert_eq!(dot.matches("\"main\" -> \"helper\"").count(), 1);
    }

    #[test]
    fn test_quotes_in_names_are_escaped() {
        let graph = build(&["operator\"\""], &[]);
        let dot = format_call_graph_as_dot(&graph, None, &AnalysisConfig::default());
        assert!(dot.contains("\"operator\\\"\\\"\""));
    }
}
