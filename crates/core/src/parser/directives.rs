//! Callout directive detection (`:::note[Title] key="value"` ... `:::`).
//!
//! Recognizes remark-directive-style container syntax at block level and
//! turns it into the structured fields a `Callout` block payload needs,
//! rather than rewriting it to another markup language.

use std::collections::BTreeMap;

/// Parsed representation of a directive opening line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectiveOpening {
    /// Lowercased directive name (note/tip/info/warning/danger/...).
    pub name: String,
    /// Optional title captured from bracket syntax `[...]`.
    pub bracket_title: Option<String>,
    /// Remaining `key="value"` attribute pairs.
    pub attrs: BTreeMap<String, String>,
}

const SUPPORTED_NAMES: &[&str] = &["note", "tip", "info", "warning", "danger", "caution"];

fn is_supported_name(name: &str) -> bool {
    SUPPORTED_NAMES.contains(&name)
}

/// Parse an opening directive line like `:::note[Title]`.
///
/// Returns `None` if the line is not a directive, is indented as code, or
/// names an unsupported callout kind.
pub fn parse_opening_directive(line: &str) -> Option<DirectiveOpening> {
    if is_indented_code_block(line) {
        return None;
    }

    let trimmed = line.trim();
    if !trimmed.starts_with(":::") {
        return None;
    }

    let after_colons = &trimmed[3..];
    let mut chars = after_colons.chars().peekable();

    let mut name = String::new();
    while let Some(&ch) = chars.peek() {
        if ch.is_ascii_alphabetic() {
            name.push(ch.to_ascii_lowercase());
            chars.next();
        } else {
            break;
        }
    }

    if name.is_empty() || !is_supported_name(&name) {
        return None;
    }

    let mut bracket_title = None;
    if let Some(&'[') = chars.peek() {
        chars.next();
        let mut title = String::new();
        for ch in chars.by_ref() {
            if ch == ']' {
                bracket_title = Some(title);
                break;
            }
            title.push(ch);
        }
    }

    let remaining: String = chars.collect();
    let attrs = parse_attrs(remaining.trim());

    Some(DirectiveOpening {
        name,
        bracket_title,
        attrs,
    })
}

/// Whether a line closes an open directive container (a bare `:::`).
pub fn is_closing_directive(line: &str) -> bool {
    line.trim() == ":::"
}

fn is_indented_code_block(line: &str) -> bool {
    let mut col = 0usize;
    for b in line.bytes() {
        match b {
            b' ' => col += 1,
            b'\t' => col += 4 - (col % 4),
            _ => break,
        }
        if col >= 4 {
            return true;
        }
    }
    false
}

/// Tokenize `key="value"` / `key='value'` pairs, respecting quoting.
fn parse_attrs(attrs: &str) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    let tokens = tokenize_attrs(attrs);
    for token in tokens {
        if let Some((key, value)) = token.split_once('=') {
            let value = value.trim_matches(|c| c == '"' || c == '\'');
            result.insert(key.to_string(), value.to_string());
        }
    }
    result
}

fn tokenize_attrs(attrs: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let chars = attrs.char_indices();
    let mut token_start: Option<usize> = None;
    let mut in_quotes = false;
    let mut quote_char = '"';

    for (i, c) in chars {
        match c {
            '"' | '\'' if !in_quotes => {
                if token_start.is_none() {
                    token_start = Some(i);
                }
                in_quotes = true;
                quote_char = c;
            }
            c if c == quote_char && in_quotes => {
                in_quotes = false;
            }
            c if c.is_whitespace() && !in_quotes => {
                if let Some(start) = token_start {
                    let token = &attrs[start..i];
                    if !token.is_empty() {
                        tokens.push(token);
                    }
                    token_start = None;
                }
            }
            _ => {
                if token_start.is_none() {
                    token_start = Some(i);
                }
            }
        }
    }

    if let Some(start) = token_start {
        let token = &attrs[start..];
        if !token.is_empty() {
            tokens.push(token);
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_directive() {
        let d = parse_opening_directive(":::note").unwrap();
        assert_eq!(d.name, "note");
        assert!(d.bracket_title.is_none());
        assert!(d.attrs.is_empty());
    }

    #[test]
    fn parses_bracket_title() {
        let d = parse_opening_directive(":::warning[Heads up]").unwrap();
        assert_eq!(d.name, "warning");
        assert_eq!(d.bracket_title.as_deref(), Some("Heads up"));
    }

    #[test]
    fn parses_attrs() {
        let d = parse_opening_directive(r#":::tip foo="bar" baz='qux'"#).unwrap();
        assert_eq!(d.attrs.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(d.attrs.get("baz").map(String::as_str), Some("qux"));
    }

    #[test]
    fn rejects_unsupported_name() {
        assert!(parse_opening_directive(":::bogus").is_none());
    }

    #[test]
    fn rejects_indented_line() {
        assert!(parse_opening_directive("    :::note").is_none());
    }

    #[test]
    fn recognizes_closing_fence() {
        assert!(is_closing_directive(":::"));
        assert!(is_closing_directive("  :::  "));
        assert!(!is_closing_directive(":::note"));
    }
}
