use serde::{Deserialize, Serialize};

/// Upper bound on the indirect-recursion walk. Results that reach it mean
/// "at least this deep".
pub const DEFAULT_MAX_INDIRECT_DEPTH: usize = 100;

/// Non-recursive functions with more outgoing calls than this get their own
/// style in the exported graph.
pub const DEFAULT_HIGH_FAN_OUT_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_indirect_depth: usize,
    pub high_fan_out_threshold: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_indirect_depth: DEFAULT_MAX_INDIRECT_DEPTH,
            high_fan_out_threshold: DEFAULT_HIGH_FAN_OUT_THRESHOLD,
        }
    }
}

impl AnalysisConfig {
    pub fn with_max_indirect_depth(mut self, depth: usize) -> Self {
        self.max_indirect_depth = depth;
        self
    }

    pub fn with_high_fan_out_threshold(mut self, threshold: usize) -> Self {
        self.high_fan_out_threshold = threshold;
        self
    }
}
