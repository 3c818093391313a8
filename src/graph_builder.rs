use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::derivation::map_parameters_with_derivation;
use crate::error::GraphError;
use crate::types::{CallEdge, ControlFlowGraph, FunctionNode, Parameter, ParameterMapping};

/// Control-flow graphs keyed by function id.
pub type CfgMap = HashMap<String, ControlFlowGraph>;

/// Call graph with function ids interned to petgraph node indices.
///
/// Every id that appears in the graph gets a node, including callees that
/// were never registered through [`CallGraph::add_function`]. Those
/// referenced-only nodes are not part of the function set, but they carry
/// flags like any other node. Edge weights are positions in the flat call
/// list, so the per-function views and the flat list cannot drift apart.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    graph: DiGraph<FunctionNode, usize>,
    node_map: HashMap<String, NodeIndex>,
    calls: Vec<CallEdge>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function defined in the analyzed program.
    pub fn add_function(
        &mut self,
        id: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Result<(), GraphError> {
        let id = id.into();

        if let Some(&idx) = self.node_map.get(&id) {
            let node = &mut self.graph[idx];
            if node.defined {
                return Err(GraphError::DuplicateFunction(id));
            }
            // Seen as a callee first; promote it into the function set
            node.defined = true;
            node.parameters = parameters;
            return Ok(());
        }

        let idx = self.graph.add_node(FunctionNode::new(id.clone(), parameters));
        self.node_map.insert(id, idx);
        Ok(())
    }

    /// Record a call site. The caller must already be registered; an
    /// unregistered callee gets a referenced-only node.
    pub fn add_call(&mut self, edge: CallEdge) -> Result<(), GraphError> {
        let caller_idx = match self.node_map.get(&edge.caller) {
            Some(&idx) if self.graph[idx].defined => idx,
            _ => {
                return Err(GraphError::UnknownCaller {
                    caller: edge.caller,
                    callee: edge.callee,
                });
            }
        };

        let callee_idx = match self.node_map.get(&edge.callee) {
            Some(&idx) => idx,
            None => {
                let idx = self.graph.add_node(FunctionNode::referenced(edge.callee.clone()));
                self.node_map.insert(edge.callee.clone(), idx);
                idx
            }
        };

        let position = self.calls.len();
        self.calls.push(edge);
        self.graph.add_edge(caller_idx, callee_idx, position);
        Ok(())
    }

    /// Functions of the analyzed program, in registration order.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionNode> {
        self.graph
            .node_indices()
            .map(|idx| &self.graph[idx])
            .filter(|node| node.defined)
    }

    pub fn function(&self, id: &str) -> Option<&FunctionNode> {
        self.node(id).filter(|node| node.defined)
    }

    /// Any node, including callees outside the function set.
    pub fn node(&self, id: &str) -> Option<&FunctionNode> {
        self.node_map.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn function_count(&self) -> usize {
        self.functions().count()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// All call edges in insertion order.
    pub fn calls(&self) -> &[CallEdge] {
        &self.calls
    }

    /// Outgoing call edges of `id`, in call-site order.
    pub fn calls_from(&self, id: &str) -> Vec<&CallEdge> {
        self.edges_of(id, Direction::Outgoing)
    }

    /// Incoming call edges of `id`, in call-site order.
    pub fn calls_to(&self, id: &str) -> Vec<&CallEdge> {
        self.edges_of(id, Direction::Incoming)
    }

    fn edges_of(&self, id: &str, direction: Direction) -> Vec<&CallEdge> {
        match self.node_map.get(id) {
            Some(&idx) => self
                .edge_positions(idx, direction)
                .into_iter()
                .map(|position| &self.calls[position])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Map the arguments of `edge` onto the callee's formal parameters.
    /// A callee without a known parameter list yields no mappings.
    pub fn parameter_mappings(&self, edge: &CallEdge) -> Vec<ParameterMapping> {
        match self.node(&edge.callee) {
            Some(callee) => map_parameters_with_derivation(edge, &callee.parameters),
            None => Vec::new(),
        }
    }

    // Index-level accessors used by the analysis passes

    pub(crate) fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        self.graph.node_indices()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub(crate) fn node_at(&self, idx: NodeIndex) -> &FunctionNode {
        &self.graph[idx]
    }

    pub(crate) fn node_at_mut(&mut self, idx: NodeIndex) -> &mut FunctionNode {
        &mut self.graph[idx]
    }

    /// Callee indices of `idx` in call-site order; repeated calls repeat.
    pub(crate) fn callees(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut targets: Vec<(usize, NodeIndex)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| (*edge.weight(), edge.target()))
            .collect();
        targets.sort_by_key(|(position, _)| *position);
        targets.into_iter().map(|(_, target)| target).collect()
    }

    pub(crate) fn outgoing_count(&self, idx: NodeIndex) -> usize {
        self.graph.edges_directed(idx, Direction::Outgoing).count()
    }

    pub(crate) fn incoming_count(&self, idx: NodeIndex) -> usize {
        self.graph.edges_directed(idx, Direction::Incoming).count()
    }

    pub(crate) fn has_self_loop(&self, idx: NodeIndex) -> bool {
        self.graph.find_edge(idx, idx).is_some()
    }

    fn edge_positions(&self, idx: NodeIndex, direction: Direction) -> Vec<usize> {
        let mut positions: Vec<usize> = self
            .graph
            .edges_directed(idx, direction)
            .map(|edge| *edge.weight())
            .collect();
        // petgraph walks adjacency lists newest-first
        positions.sort_unstable();
        positions
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDecl {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// The `{"functions": [...]}` document produced by the CFG exporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CfgDocument {
    #[serde(default)]
    pub functions: Vec<ControlFlowGraph>,
}

/// Input document accepted by the analyzer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisInput {
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub calls: Vec<CallEdge>,
    #[serde(default)]
    pub cfgs: Option<CfgDocument>,
    #[serde(default)]
    pub config: Option<AnalysisConfig>,
}

impl AnalysisInput {
    pub fn from_json(source: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn build_call_graph(&self) -> Result<CallGraph, GraphError> {
        let mut graph = CallGraph::new();

        for function in &self.functions {
            graph.add_function(function.id.clone(), function.parameters.clone())?;
        }
        for call in &self.calls {
            graph.add_call(call.clone())?;
        }

        debug!(
            "Built call graph: {} functions, {} calls",
            graph.function_count(),
            graph.call_count()
        );
        Ok(graph)
    }

    pub fn build_cfg_map(&self) -> Result<CfgMap, GraphError> {
        let mut cfgs = CfgMap::new();

        if let Some(document) = &self.cfgs {
            for cfg in &document.functions {
                validate_cfg(cfg)?;
                cfgs.insert(cfg.name.clone(), cfg.clone());
            }
        }

        Ok(cfgs)
    }
}

/// Reject successor ids that name no block of the same CFG.
pub fn validate_cfg(cfg: &ControlFlowGraph) -> Result<(), GraphError> {
    let ids: HashSet<u32> = cfg.blocks.iter().map(|block| block.id).collect();

    for block in &cfg.blocks {
        if let Some(&missing) = block.successors.iter().find(|s| !ids.contains(s)) {
            warn!("CFG of `{}` references unknown block {}", cfg.name, missing);
            return Err(GraphError::UnknownSuccessor {
                function: cfg.name.clone(),
                block: block.id,
                successor: missing,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BasicBlock;
    use pretty_assertions::assert_eq;

    fn graph_with(functions: &[&str], calls: &[(&str, &str)]) -> CallGraph {
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
    fn test_edge_views_agree() {
        let graph = graph_with(&["main", "a", "b"], &[("main", "a"), ("main", "b"), ("a", "b")]);

        let from_main: Vec<&str> = graph
            .calls_from("main")
            .iter()
            .map(|c| c.callee.as_str())
            .collect();
        assert_eq!(from_main, vec!["a", "b"]);

        let into_b: Vec<&str> = graph.calls_to("b").iter().map(|c| c.caller.as_str()).collect();
        assert_eq!(into_b, vec!["main", "a"]);

        assert_eq!(graph.call_count(), 3);
        assert_eq!(graph.calls_to("main").len(), 0);
    }

    #[test]
    fn test_unregistered_callee_is_not_a_function() {
        let graph = graph_with(&["main"], &[("main", "printf")]);

        assert!(graph.function("printf").is_none());
        assert!(graph.node("printf").is_some());
        assert_eq!(graph.function_count(), 1);
        assert_eq!(graph.calls_to("printf").len(), 1);
    }

    #[test]
    fn test_callee_registered_after_call_is_promoted() {
        let mut graph = graph_with(&["main"], &[("main", "helper")]);
        graph
            .add_function("helper", vec![Parameter::new("x")])
            .unwrap();

        let helper = graph.function("helper").unwrap();
        assert_eq!(helper.parameters.len(), 1);
        assert_eq!(graph.function_count(), 2);
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let mut graph = graph_with(&["main"], &[]);
        let err = graph.add_function("main", vec![]).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateFunction(ref id) if id == "main"));
    }

    #[test]
    fn test_unknown_caller_rejected() {
        let mut graph = graph_with(&["main"], &[]);
        let err = graph.add_call(CallEdge::new("ghost", "main")).unwrap_err();
        assert!(matches!(err, GraphError::UnknownCaller { .. }));
        // a rejected call leaves every edge view untouched
        assert_eq!(graph.call_count(), 0);
        assert!(graph.calls_to("main").is_empty());
        assert!(graph.node("ghost").is_none());
    }

    #[test]
    fn test_cfg_with_dangling_successor_rejected() {
        let cfg = ControlFlowGraph::new(
            "f",
            vec![BasicBlock::new(1).with_successors(vec![7]), BasicBlock::new(0)],
        );
        let err = validate_cfg(&cfg).unwrap_err();
        assert!(matches!(err, GraphError::UnknownSuccessor { successor: 7, .. }));
    }

    #[test]
    fn test_input_document_round_trip_into_graph() {
        let input = AnalysisInput::from_json(
            r#"{
                "functions": [
                    {"id": "main"},
                    {"name": "sq", "parameters": [{"name": "v", "type": "int"}]}
                ],
                "calls": [{"caller": "main", "callee": "sq", "arguments": ["3"]}]
            }"#,
        )
        .unwrap();

        let graph = input.build_call_graph().unwrap();
        assert_eq!(graph.function_count(), 2);
        assert_eq!(
            graph.function("sq").unwrap().parameters[0].type_info.as_deref(),
            Some("int")
        );
        assert!(input.build_cfg_map().unwrap().is_empty());
        assert!(input.config.is_none());
    }
}
