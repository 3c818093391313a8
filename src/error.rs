use thiserror::Error;

/// Structural problems in caller-supplied graph data.
///
/// The analysis passes themselves never fail; these only surface while a
/// call graph or its control-flow graphs are being assembled.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("function `{0}` is defined more than once")]
    DuplicateFunction(String),
    #[error("call edge from `{caller}` to `{callee}` has a caller outside the function set")]
    UnknownCaller { caller: String, callee: String },
    #[error("block {block} of `{function}` lists unknown successor block {successor}")]
    UnknownSuccessor {
        function: String,
        block: u32,
        successor: u32,
    },
    #[error("failed to parse analysis input: {0}")]
    Parse(#[from] serde_json::Error),
}
