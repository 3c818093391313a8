//! Classification of actual arguments at call sites.
//!
//! Each argument expression is run through a fixed-priority chain of
//! pattern testers; the first tester that recognises the text decides the
//! derivation. Structural checks run on a copy of the text with literal
//! contents blanked, so `"a.b"` or `"x+y"` inside quotes never count as
//! member access or arithmetic.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{ArgumentDerivation, CallEdge, DerivationKind, Parameter, ParameterMapping};
use crate::utils::{
    identifiers, is_identifier, is_identifier_char, is_identifier_start, is_keyword, mask_literals,
    matching_close,
};

static CALL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*(?:\s*(?:::|\.|->)\s*[A-Za-z_][A-Za-z0-9_]*)*)\s*\(")
        .expect("call shape pattern")
});

static INDEXED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\[").expect("array access pattern"));

static MEMBER_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(?:\.|->)\s*").expect("member separator pattern"));

static OPERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+*/%<>=!&|^~?]+").expect("operator pattern"));

// What a tester recognised; the caller attaches the original expression
struct PatternMatch {
    kind: DerivationKind,
    base: String,
    transformations: Vec<String>,
    used_variables: Vec<String>,
}

// (trimmed text, same text with literal contents blanked)
type PatternTester = fn(&str, &str) -> Option<PatternMatch>;

const PATTERN_CHAIN: &[PatternTester] = &[
    address_of,
    dereference,
    call_result,
    array_access,
    member_access,
    operator_expression,
    direct_reference,
];

/// Classify how one actual argument is derived from program variables.
pub fn classify_argument(expression: &str) -> ArgumentDerivation {
    let text = expression.trim();
    let masked = mask_literals(text);

    let matched = PATTERN_CHAIN
        .iter()
        .find_map(|tester| tester(text, &masked))
        .unwrap_or_else(|| PatternMatch {
            kind: DerivationKind::Expression,
            base: String::new(),
            transformations: Vec::new(),
            used_variables: identifiers(text),
        });

    ArgumentDerivation {
        kind: matched.kind,
        base: matched.base,
        transformations: matched.transformations,
        expression: expression.to_string(),
        used_variables: matched.used_variables,
    }
}

/// Variable names referenced by `expression`: identifier tokens minus
/// keywords, without duplicates, in first-seen order.
pub fn extract_variables(expression: &str) -> Vec<String> {
    identifiers(expression)
}

fn address_of(text: &str, _masked: &str) -> Option<PatternMatch> {
    let base = text.strip_prefix('&')?.trim();
    Some(PatternMatch {
        kind: DerivationKind::AddressOf,
        base: base.to_string(),
        transformations: vec![String::from("&")],
        used_variables: identifiers(base),
    })
}

fn dereference(text: &str, _masked: &str) -> Option<PatternMatch> {
    let base = text.strip_prefix('*')?.trim();
    Some(PatternMatch {
        kind: DerivationKind::Dereference,
        base: base.to_string(),
        transformations: vec![String::from("*")],
        used_variables: identifiers(base),
    })
}

fn call_result(text: &str, masked: &str) -> Option<PatternMatch> {
    for caps in CALL_SHAPE.captures_iter(masked) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if is_keyword(name.as_str()) || follows_digit(masked, name.start()) {
            continue;
        }

        let open = whole.end() - 1;
        let Some(close) = matching_close(masked, open, '(', ')') else {
            continue;
        };

        // `obj->get(x)`: the method is the base and the receiver root is read too
        let callee: String = text[name.range()].split_whitespace().collect();
        let (receiver, method) = match MEMBER_SEPARATOR.find_iter(&callee).last() {
            Some(separator) => (&callee[..separator.start()], &callee[separator.end()..]),
            None => ("", callee.as_str()),
        };

        let root = MEMBER_SEPARATOR.split(receiver).next().unwrap_or_default();
        let mut used_variables = identifiers(root);
        for variable in identifiers(&text[open + 1..close]) {
            if !used_variables.contains(&variable) {
                used_variables.push(variable);
            }
        }

        return Some(PatternMatch {
            kind: DerivationKind::CallResult,
            base: method.to_string(),
            transformations: vec![format!("{}()", method)],
            used_variables,
        });
    }

    None
}

fn array_access(text: &str, masked: &str) -> Option<PatternMatch> {
    for caps in INDEXED_NAME.captures_iter(masked) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if is_keyword(name.as_str()) || follows_digit(masked, name.start()) {
            continue;
        }

        let mut open = whole.end() - 1;
        let mut indices = Vec::new();
        // m[i][j]: follow every directly chained subscript
        while let Some(close) = matching_close(masked, open, '[', ']') {
            indices.push(text[open + 1..close].trim());
            let after = &masked[close + 1..];
            let skipped = after.len() - after.trim_start().len();
            if !after.trim_start().starts_with('[') {
                break;
            }
            open = close + 1 + skipped;
        }
        if indices.is_empty() {
            continue;
        }

        let base = name.as_str().to_string();
        let mut used_variables = vec![base.clone()];
        for index in &indices {
            for variable in identifiers(index) {
                if !used_variables.contains(&variable) {
                    used_variables.push(variable);
                }
            }
        }

        return Some(PatternMatch {
            kind: DerivationKind::ArrayAccess,
            base,
            transformations: indices.iter().map(|index| format!("[{}]", index)).collect(),
            used_variables,
        });
    }

    None
}

fn member_access(text: &str, masked: &str) -> Option<PatternMatch> {
    let (position, width) = find_member_separator(masked)?;
    let base = text[..position].trim();
    if base.is_empty() {
        return None;
    }

    let chain: Vec<String> = MEMBER_SEPARATOR
        .split(&text[position + width..])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect();

    Some(PatternMatch {
        kind: DerivationKind::Composite,
        base: base.to_string(),
        transformations: chain,
        used_variables: identifiers(base),
    })
}

fn operator_expression(text: &str, masked: &str) -> Option<PatternMatch> {
    let mut operators: Vec<String> = Vec::new();
    for m in OPERATOR.find_iter(masked) {
        if !operators.iter().any(|op| op == m.as_str()) {
            operators.push(m.as_str().to_string());
        }
    }
    if operators.is_empty() {
        return None;
    }

    let used_variables = identifiers(text);
    let base = used_variables
        .first()
        .cloned()
        .unwrap_or_else(|| text.to_string());

    Some(PatternMatch {
        kind: DerivationKind::Expression,
        base,
        transformations: operators,
        used_variables,
    })
}

fn direct_reference(text: &str, _masked: &str) -> Option<PatternMatch> {
    if !is_identifier(text) || is_keyword(text) {
        return None;
    }
    Some(PatternMatch {
        kind: DerivationKind::Direct,
        base: text.to_string(),
        transformations: Vec::new(),
        used_variables: vec![text.to_string()],
    })
}

// First `.` or `->` that separates a member. A `.` inside a numeric
// literal such as `1.5` or `2.f` is not a separator.
fn find_member_separator(masked: &str) -> Option<(usize, usize)> {
    let bytes = masked.as_bytes();

    for (i, c) in masked.char_indices() {
        match c {
            '-' if bytes.get(i + 1) == Some(&b'>') => return Some((i, 2)),
            '.' => {
                let next_starts_name = masked[i + 1..]
                    .chars()
                    .next()
                    .is_some_and(is_identifier_start);
                let token_start = masked[..i]
                    .char_indices()
                    .rev()
                    .take_while(|(_, ch)| is_identifier_char(*ch))
                    .last()
                    .map(|(start, _)| start);
                let numeric = token_start
                    .and_then(|start| masked[start..].chars().next())
                    .is_some_and(|ch| ch.is_ascii_digit());
                if next_starts_name && !numeric {
                    return Some((i, 1));
                }
            }
            _ => {}
        }
    }

    None
}

fn follows_digit(masked: &str, position: usize) -> bool {
    masked[..position]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_digit())
}

impl DerivationKind {
    pub fn is_pointer(&self) -> bool {
        matches!(self, DerivationKind::AddressOf | DerivationKind::Dereference)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, DerivationKind::Composite | DerivationKind::ArrayAccess)
    }

    pub fn is_call(&self) -> bool {
        matches!(self, DerivationKind::CallResult)
    }
}

pub fn is_pointer_derivation(derivation: &ArgumentDerivation) -> bool {
    derivation.kind.is_pointer()
}

pub fn is_composite_derivation(derivation: &ArgumentDerivation) -> bool {
    derivation.kind.is_composite()
}

pub fn is_call_derivation(derivation: &ArgumentDerivation) -> bool {
    derivation.kind.is_call()
}

/// Pair formal parameters with actual arguments by position. Surplus
/// parameters or arguments on either side are ignored.
pub fn map_parameters_with_derivation(
    call: &CallEdge,
    parameters: &[Parameter],
) -> Vec<ParameterMapping> {
    parameters
        .iter()
        .zip(&call.arguments)
        .enumerate()
        .map(|(position, (parameter, argument))| ParameterMapping {
            parameter: parameter.name.clone(),
            argument: argument.clone(),
            derivation: classify_argument(argument),
            position,
        })
        .collect()
}

/// Formal parameter name -> raw argument text.
pub fn map_parameters(call: &CallEdge, parameters: &[Parameter]) -> HashMap<String, String> {
    parameters
        .iter()
        .zip(&call.arguments)
        .map(|(parameter, argument)| (parameter.name.clone(), argument.clone()))
        .collect()
}

/// Every variable the arguments of `call` read, across all positions.
pub fn variables_used_by_call(call: &CallEdge) -> Vec<String> {
    let mut seen = HashSet::new();
    call.arguments
        .iter()
        .flat_map(|argument| classify_argument(argument).used_variables)
        .filter(|variable| seen.insert(variable.clone()))
        .collect()
}
