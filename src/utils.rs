use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier pattern"));

static BARE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("bare identifier pattern"));

// Type names, control flow, storage classes and literal-like keywords of C/C++.
// None of these can name a program variable.
const KEYWORDS: &[&str] = &[
    "auto", "bool", "break", "case", "char", "class", "const", "constexpr", "continue",
    "default", "delete", "do", "double", "else", "enum", "extern", "false", "float", "for",
    "goto", "if", "inline", "int", "long", "mutable", "new", "nullptr", "NULL", "register",
    "return", "short", "signed", "sizeof", "static", "struct", "switch", "this", "true",
    "typedef", "union", "unsigned", "virtual", "void", "volatile", "while",
];

static KEYWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| KEYWORDS.iter().copied().collect());

pub fn is_keyword(token: &str) -> bool {
    KEYWORD_SET.contains(token)
}

pub fn is_identifier(text: &str) -> bool {
    BARE_IDENTIFIER.is_match(text)
}

pub fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Blank out the contents of string and character literals, keeping the
/// quotes and every byte offset intact.
pub fn mask_literals(text: &str) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                    push_blank(&mut masked, c);
                } else if c == '\\' {
                    escaped = true;
                    masked.push(' ');
                } else if c == q {
                    quote = None;
                    masked.push(c);
                } else {
                    push_blank(&mut masked, c);
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                masked.push(c);
            }
        }
    }

    masked
}

fn push_blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

/// Identifier tokens of `text`, first-seen order, keywords and tokens
/// inside literals or numbers dropped.
pub fn identifiers(text: &str) -> Vec<String> {
    let masked = mask_literals(text);
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for m in IDENTIFIER.find_iter(&masked) {
        // `1e5`, `0x1f`, `10u`: the match starts in the middle of a number
        let preceded_by_digit = masked[..m.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit());
        if preceded_by_digit {
            continue;
        }

        let token = m.as_str();
        if is_keyword(token) || !seen.insert(token) {
            continue;
        }
        found.push(token.to_string());
    }

    found
}

/// Byte offset of the bracket closing the one at `open`, if balanced.
pub fn matching_close(text: &str, open: usize, open_ch: char, close_ch: char) -> Option<usize> {
    let mut depth = 0usize;

    for (offset, c) in text[open..].char_indices() {
        if c == open_ch {
            depth += 1;
        } else if c == close_ch {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(open + offset);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identifiers_skip_keywords_and_duplicates() {
        assert_eq!(
            identifiers("(int) x + sizeof(y) * x"),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn identifiers_ignore_literal_contents() {
        assert_eq!(identifiers(r#""count=%d\n", n"#), vec!["n".to_string()]);
        assert_eq!(identifiers("'a' + c"), vec!["c".to_string()]);
        assert!(identifiers("0x1f + 10u").is_empty());
    }

    #[test]
    fn masking_keeps_offsets() {
        let text = r#"f("a.b", x)"#;
        let masked = mask_literals(text);
        assert_eq!(masked.len(), text.len());
        assert_eq!(masked, r#"f("   ", x)"#);
    }

    #[test]
    fn matching_close_handles_nesting() {
        let text = "f(g(a), b) + 1";
        assert_eq!(matching_close(text, 1, '(', ')'), Some(9));
        assert_eq!(matching_close("f(a", 1, '(', ')'), None);
    }
}
