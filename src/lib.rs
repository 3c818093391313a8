//! Structural analysis of an extracted C/C++ call graph.
//!
//! Given call edges (with argument texts) and optionally per-function
//! control-flow graphs, the crate classifies external callees, finds
//! recursive cycles and their depths, spots textual tail recursion,
//! aggregates graph statistics, exports a DOT rendering, and classifies how
//! each call-site argument is derived from program variables.

pub mod analyzer;
pub mod config;
pub mod derivation;
pub mod error;
pub mod externals;
pub mod formatters;
pub mod graph_builder;
pub mod recursion;
pub mod scc;
pub mod statistics;
pub mod types;
pub mod utils;

pub use analyzer::{AnalysisReport, CallGraphAnalyzer, CallSiteReport};
pub use config::AnalysisConfig;
pub use error::GraphError;
pub use graph_builder::{AnalysisInput, CallGraph, CfgMap};
