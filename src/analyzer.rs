use std::collections::BTreeMap;

use log::info;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::externals;
use crate::formatters::format_call_graph_as_dot;
use crate::graph_builder::{CallGraph, CfgMap};
use crate::recursion;
use crate::statistics;
use crate::types::{
    CallGraphStatistics, ExternalFunctionInfo, ParameterMapping, RecursionDepthInfo,
};

/// Parameter mappings of one call site.
#[derive(Debug, Clone, Serialize)]
pub struct CallSiteReport {
    pub caller: String,
    pub callee: String,
    pub mappings: Vec<ParameterMapping>,
}

/// Everything one full analysis run produces.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub external_functions: BTreeMap<String, ExternalFunctionInfo>,
    pub recursion: BTreeMap<String, RecursionDepthInfo>,
    pub tail_recursive_functions: Vec<String>,
    pub statistics: CallGraphStatistics,
    pub call_sites: Vec<CallSiteReport>,
}

/// Runs the analysis passes over a call graph with a shared configuration.
///
/// Each method recomputes what it needs, so the read-only ones can be
/// called in any order. The two flag-writing passes only ever set flags to
/// `true` and may be repeated.
#[derive(Debug, Clone, Default)]
pub struct CallGraphAnalyzer {
    config: AnalysisConfig,
}

impl CallGraphAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn identify_external_functions(
        &self,
        graph: &mut CallGraph,
    ) -> BTreeMap<String, ExternalFunctionInfo> {
        externals::identify_external_functions(graph)
    }

    pub fn compute_recursion_depth(
        &self,
        graph: &CallGraph,
    ) -> BTreeMap<String, RecursionDepthInfo> {
        recursion::compute_recursion_depth(graph, &self.config)
    }

    pub fn mark_recursive_functions(
        &self,
        graph: &mut CallGraph,
    ) -> BTreeMap<String, RecursionDepthInfo> {
        recursion::mark_recursive_functions(graph, &self.config)
    }

    pub fn detect_tail_recursion(&self, graph: &CallGraph, cfgs: &CfgMap) -> Vec<String> {
        recursion::detect_tail_recursion(graph, cfgs)
    }

    pub fn compute_statistics(&self, graph: &CallGraph) -> CallGraphStatistics {
        statistics::compute_statistics(graph, &self.config)
    }

    pub fn export_dot(&self, graph: &CallGraph, cfgs: Option<&CfgMap>) -> String {
        format_call_graph_as_dot(graph, cfgs, &self.config)
    }

    /// Run every pass: flag externals, mark recursion, then the read-only
    /// passes and per-call-site parameter mappings.
    pub fn analyze(&self, graph: &mut CallGraph, cfgs: &CfgMap) -> AnalysisReport {
        let external_functions = self.identify_external_functions(graph);
        let recursion = self.mark_recursive_functions(graph);
        let tail_recursive_functions = self.detect_tail_recursion(graph, cfgs);
        let statistics = self.compute_statistics(graph);

        let call_sites = graph
            .calls()
            .iter()
            .map(|call| CallSiteReport {
                caller: call.caller.clone(),
                callee: call.callee.clone(),
                mappings: graph.parameter_mappings(call),
            })
            .collect();

        info!(
            "Analyzed {} functions: {} external, {} recursive, {} tail-recursive",
            statistics.total_functions,
            external_functions.len(),
            statistics.recursive_functions,
            tail_recursive_functions.len()
        );

        AnalysisReport {
            external_functions,
            recursion,
            tail_recursive_functions,
            statistics,
            call_sites,
        }
    }
}
