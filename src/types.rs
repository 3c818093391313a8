use serde::{Deserialize, Serialize};

// A formal parameter of a function in the analyzed program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_info: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_info: None,
        }
    }
}

/// A function known to the call graph.
///
/// `is_external` and `is_recursive` are analysis outputs: they start out
/// `false` and are only ever raised to `true` by the flag-writing passes.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionNode {
    pub id: String,
    pub parameters: Vec<Parameter>,
    pub is_external: bool,
    pub is_recursive: bool,
    // false for callees that are referenced by an edge but were never
    // registered as part of the analyzed program
    #[serde(skip)]
    pub(crate) defined: bool,
}

impl FunctionNode {
    pub fn new(id: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            id: id.into(),
            parameters,
            is_external: false,
            is_recursive: false,
            defined: true,
        }
    }

    pub(crate) fn referenced(id: impl Into<String>) -> Self {
        Self {
            defined: false,
            ..Self::new(id, Vec::new())
        }
    }

    /// Whether the function belongs to the analyzed program's function set.
    pub fn is_defined(&self) -> bool {
        self.defined
    }
}

// One call site: caller -> callee with the literal argument texts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl CallEdge {
    pub fn new(caller: impl Into<String>, callee: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            callee: callee.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: SourcePosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<SourcePosition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<SourceRange>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            range: None,
        }
    }
}

// Basic block as emitted by the clang CFG exporter. Successors and
// predecessors hold block ids, not positions in the block list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicBlock {
    pub id: u32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub is_entry: bool,
    #[serde(default)]
    pub is_exit: bool,
    #[serde(default)]
    pub statements: Vec<Statement>,
    #[serde(default)]
    pub successors: Vec<u32>,
    #[serde(default)]
    pub predecessors: Vec<u32>,
}

impl BasicBlock {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            label: format!("B{}", id),
            is_entry: false,
            is_exit: false,
            statements: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    pub fn with_statements<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statements = statements.into_iter().map(Statement::new).collect();
        self
    }

    pub fn with_successors(mut self, successors: Vec<u32>) -> Self {
        self.successors = successors;
        self
    }

    /// A block with no successor edges ends a path through the function.
    pub fn is_exit_block(&self) -> bool {
        self.successors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<BasicBlock>,
}

impl ControlFlowGraph {
    pub fn new(name: impl Into<String>, blocks: Vec<BasicBlock>) -> Self {
        Self {
            name: name.into(),
            blocks,
        }
    }

    pub fn exit_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|block| block.is_exit_block())
    }
}

// Category of a function that is not defined in the analyzed program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalCategory {
    StandardLibrary,    // C standard library
    CppStandardLibrary, // std:: qualified
    Posix,              // POSIX process/thread/socket/io APIs
    SystemCall,         // exec/fork/spawn/system family
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalFunctionInfo {
    pub name: String,
    pub category: ExternalCategory,
    pub description: String,
    pub is_safe: bool,
    // -1 means variadic or unknown
    pub parameter_count: i32,
    pub return_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecursionDepthInfo {
    pub function: String,
    /// Size of the function's recursive SCC, 0 when it is not on a cycle.
    pub direct_recursion_depth: usize,
    /// Longest cycle-free call chain below the function. Saturates at the
    /// configured depth cap, so the cap reads as "at least this deep".
    pub indirect_recursion_depth: usize,
    pub recursive_callees: Vec<String>,
    pub cycle_functions: Vec<String>,
    pub is_recursive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MostCalledFunction {
    pub name: String,
    pub call_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallGraphStatistics {
    pub total_functions: usize,
    pub total_calls: usize,
    pub external_functions: usize,
    pub recursive_functions: usize,
    pub average_calls_per_function: f64,
    pub max_calls_per_function: usize,
    pub most_called_function: Option<MostCalledFunction>,
    pub deepest_call_chain: usize,
    pub average_recursion_depth: f64,
}

// How an actual argument expression is built from program variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationKind {
    Direct,      // x
    Expression,  // a + b, literals
    Composite,   // obj.field, ptr->field
    AddressOf,   // &x
    CallResult,  // foo(y)
    ArrayAccess, // arr[i]
    Dereference, // *ptr
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentDerivation {
    pub kind: DerivationKind,
    pub base: String,
    pub transformations: Vec<String>,
    pub expression: String,
    pub used_variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterMapping {
    pub parameter: String,
    pub argument: String,
    pub derivation: ArgumentDerivation,
    pub position: usize,
}
