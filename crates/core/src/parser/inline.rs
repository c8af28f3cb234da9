//! Inline tokenizer with format anticipation (§4.2).
//!
//! Speculatively closes unclosed `*`/`_`/`~~`/`` ` ``/`$`/`$$` delimiters so
//! a still-streaming paragraph renders its emphasis/code/math eagerly. The
//! raw delimiter characters must never leak into an anticipated node's text;
//! if the block finalizes without ever seeing a real closer, the caller
//! (parser/mod.rs) is responsible for retracting the anticipation and
//! re-emitting the delimiter as plain text.

use crate::block::{InlineNode, InlineStatus};
use crate::config::{AnticipationKind, DocPlugins};

/// Parse a run of inline Markdown into a node sequence.
///
/// `finalized` indicates whether the enclosing block is finalized: when
/// `true`, anticipation never applies (there will be no future tick to
/// supply a real closer, so unmatched delimiters fall back to literal text).
pub fn parse_inline(text: &str, plugins: &DocPlugins, finalized: bool) -> Vec<InlineNode> {
    let chars: Vec<char> = text.chars().collect();
    parse_span(&chars, 0, chars.len(), plugins, finalized)
}

fn parse_span(
    chars: &[char],
    mut i: usize,
    end: usize,
    plugins: &DocPlugins,
    finalized: bool,
) -> Vec<InlineNode> {
    let mut nodes = Vec::new();
    let mut buf = String::new();

    macro_rules! flush_text {
        () => {
            if !buf.is_empty() {
                nodes.push(InlineNode::Text {
                    text: std::mem::take(&mut buf),
                });
            }
        };
    }

    while i < end {
        let c = chars[i];
        match c {
            '\\' if i + 1 < end => {
                buf.push(chars[i + 1]);
                i += 2;
            }
            '`' => {
                let run = run_length(chars, i, end, '`');
                if let Some((inner_end, closer_end)) =
                    find_matching_run(chars, i + run, end, '`', run)
                {
                    flush_text!();
                    let text: String = chars[i + run..inner_end].iter().collect();
                    nodes.push(InlineNode::Code {
                        text,
                        status: InlineStatus::Complete,
                    });
                    i = closer_end;
                } else if !finalized {
                    flush_text!();
                    let text: String = chars[i + run..end].iter().collect();
                    nodes.push(InlineNode::Code {
                        text,
                        status: InlineStatus::Anticipated,
                    });
                    i = end;
                } else {
                    buf.push_str(&"`".repeat(run));
                    i += run;
                }
            }
            '$' if plugins.math => {
                let run = run_length(chars, i, end, '$');
                let marker_len = if run >= 2 { 2 } else { 1 };
                if let Some((inner_end, closer_end)) =
                    find_matching_run(chars, i + marker_len, end, '$', marker_len)
                {
                    flush_text!();
                    let text: String = chars[i + marker_len..inner_end].iter().collect();
                    let node = if marker_len == 2 {
                        InlineNode::MathDisplay {
                            text,
                            status: InlineStatus::Complete,
                        }
                    } else {
                        InlineNode::MathInline {
                            text,
                            status: InlineStatus::Complete,
                        }
                    };
                    nodes.push(node);
                    i = closer_end;
                } else if !finalized
                    && plugins.anticipation_enabled_for(AnticipationKind::Math)
                {
                    flush_text!();
                    let text: String = chars[i + marker_len..end].iter().collect();
                    let node = if marker_len == 2 {
                        InlineNode::MathDisplay {
                            text,
                            status: InlineStatus::Anticipated,
                        }
                    } else {
                        InlineNode::MathInline {
                            text,
                            status: InlineStatus::Anticipated,
                        }
                    };
                    nodes.push(node);
                    i = end;
                } else {
                    buf.push_str(&"$".repeat(marker_len));
                    i += marker_len;
                }
            }
            '~' if run_length(chars, i, end, '~') >= 2 => {
                if let Some((inner_end, closer_end)) = find_matching_run(chars, i + 2, end, '~', 2)
                {
                    flush_text!();
                    let children = parse_span(chars, i + 2, inner_end, plugins, finalized);
                    nodes.push(InlineNode::Strike {
                        children,
                        status: InlineStatus::Complete,
                    });
                    i = closer_end;
                } else if !finalized
                    && plugins.anticipation_enabled_for(AnticipationKind::Strike)
                {
                    flush_text!();
                    let children = parse_span(chars, i + 2, end, plugins, finalized);
                    nodes.push(InlineNode::Strike {
                        children,
                        status: InlineStatus::Anticipated,
                    });
                    i = end;
                } else {
                    buf.push_str("~~");
                    i += 2;
                }
            }
            '*' | '_' => {
                let run = run_length(chars, i, end, c);
                let want = if run >= 2 { 2 } else { 1 };
                if let Some((inner_end, closer_end)) = find_matching_run(chars, i + want, end, c, want)
                {
                    flush_text!();
                    let children = parse_span(chars, i + want, inner_end, plugins, finalized);
                    if want == 2 {
                        nodes.push(InlineNode::Strong { children });
                    } else {
                        nodes.push(InlineNode::Em {
                            children,
                            status: InlineStatus::Complete,
                        });
                    }
                    i = closer_end;
                } else if want == 1
                    && !finalized
                    && plugins.anticipation_enabled_for(AnticipationKind::Emphasis)
                {
                    // Anticipation is scoped to single-run `*`/`_` (em); an
                    // unclosed double-run (`**`/`__`, strong) has no
                    // `InlineStatus` to anticipate into and is never
                    // speculatively rendered, regardless of the master
                    // switch.
                    flush_text!();
                    let children = parse_span(chars, i + want, end, plugins, finalized);
                    nodes.push(InlineNode::Em {
                        children,
                        status: InlineStatus::Anticipated,
                    });
                    i = end;
                } else {
                    buf.push_str(&c.to_string().repeat(want));
                    i += want;
                }
            }
            '!' if i + 1 < end && chars[i + 1] == '[' => {
                if let Some((alt, url, title, next)) = parse_link_like(chars, i + 1, end) {
                    flush_text!();
                    nodes.push(InlineNode::Image { url, alt, title });
                    i = next;
                } else {
                    buf.push('!');
                    i += 1;
                }
            }
            '[' if i + 1 < end && chars[i + 1] == '^' => {
                if let Some((label, next)) = parse_footnote_ref(chars, i, end) {
                    flush_text!();
                    nodes.push(InlineNode::FootnoteRef { label, number: None });
                    i = next;
                } else {
                    buf.push('[');
                    i += 1;
                }
            }
            '[' => {
                if let Some((text, url, title, next)) = parse_link_like(chars, i, end) {
                    flush_text!();
                    let children = parse_span(
                        &text.chars().collect::<Vec<_>>(),
                        0,
                        text.chars().count(),
                        plugins,
                        finalized,
                    );
                    nodes.push(InlineNode::Link {
                        url,
                        title,
                        children,
                    });
                    i = next;
                } else {
                    buf.push('[');
                    i += 1;
                }
            }
            '@' if i + 1 < end && (chars[i + 1].is_alphanumeric() || chars[i + 1] == '_') => {
                let start = i + 1;
                let mut j = start;
                while j < end && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '-')
                {
                    j += 1;
                }
                flush_text!();
                let name: String = chars[start..j].iter().collect();
                nodes.push(InlineNode::Mention { name });
                i = j;
            }
            _ => {
                buf.push(c);
                i += 1;
            }
        }
    }

    flush_text!();
    nodes
}

fn run_length(chars: &[char], start: usize, end: usize, ch: char) -> usize {
    let mut n = 0;
    while start + n < end && chars[start + n] == ch {
        n += 1;
    }
    n
}

/// Find a run of `marker_len` consecutive `ch` at or after `from`, within
/// `end`, that is NOT immediately preceded by whitespace-only content (a
/// simplified left-flanking rule). Returns `(inner_end, consumed_end)`.
fn find_matching_run(
    chars: &[char],
    from: usize,
    end: usize,
    ch: char,
    marker_len: usize,
) -> Option<(usize, usize)> {
    let mut i = from;
    while i < end {
        if chars[i] == ch {
            let run = run_length(chars, i, end, ch);
            if run >= marker_len {
                return Some((i, i + marker_len));
            }
            i += run;
        } else {
            i += 1;
        }
    }
    None
}

/// Parse `[text](url "title")` or `![alt](url "title")` starting at the
/// opening `[`. Returns `(text, url, title, next_index)`.
fn parse_link_like(
    chars: &[char],
    bracket_start: usize,
    end: usize,
) -> Option<(String, String, Option<String>, usize)> {
    if chars.get(bracket_start) != Some(&'[') {
        return None;
    }
    let mut depth = 1;
    let mut j = bracket_start + 1;
    let text_start = j;
    while j < end && depth > 0 {
        match chars[j] {
            '[' => depth += 1,
            ']' => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            break;
        }
        j += 1;
    }
    if depth != 0 {
        return None;
    }
    let text_end = j;
    let mut k = j + 1;
    if chars.get(k) != Some(&'(') {
        return None;
    }
    k += 1;
    let url_start = k;
    while k < end && chars[k] != ')' && chars[k] != ' ' && chars[k] != '"' {
        k += 1;
    }
    let url: String = chars[url_start..k].iter().collect();
    let mut title = None;
    if k < end && chars[k] == ' ' {
        while k < end && chars[k] == ' ' {
            k += 1;
        }
        if chars.get(k) == Some(&'"') {
            k += 1;
            let title_start = k;
            while k < end && chars[k] != '"' {
                k += 1;
            }
            title = Some(chars[title_start..k].iter().collect());
            if k < end {
                k += 1;
            }
        }
    }
    if chars.get(k) != Some(&')') {
        return None;
    }
    let text: String = chars[text_start..text_end].iter().collect();
    Some((text, url, title, k + 1))
}

fn parse_footnote_ref(chars: &[char], bracket_start: usize, end: usize) -> Option<(String, usize)> {
    if chars.get(bracket_start) != Some(&'[') || chars.get(bracket_start + 1) != Some(&'^') {
        return None;
    }
    let start = bracket_start + 2;
    let mut j = start;
    while j < end && chars[j] != ']' {
        j += 1;
    }
    if j >= end {
        return None;
    }
    let label: String = chars[start..j].iter().collect();
    if label.is_empty() {
        return None;
    }
    Some((label, j + 1))
}

/// Recursively scan a node sequence for any anticipated span whose text
/// contains a raw delimiter character — the non-leak invariant (§8 property 8).
#[cfg(test)]
fn contains_leaked_delimiter(nodes: &[InlineNode]) -> bool {
    nodes.iter().any(|n| match n {
        InlineNode::Em { children, status } | InlineNode::Strike { children, status } => {
            *status == InlineStatus::Anticipated
                && children.iter().any(|c| {
                    matches!(c, InlineNode::Text { text } if text.contains(['*', '_', '~']))
                })
                || contains_leaked_delimiter(children)
        }
        InlineNode::Code { text, status } if *status == InlineStatus::Anticipated => {
            text.contains('`')
        }
        InlineNode::Strong { children } => contains_leaked_delimiter(children),
        InlineNode::Link { children, .. } => contains_leaked_delimiter(children),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugins() -> DocPlugins {
        DocPlugins::default()
    }

    #[test]
    fn anticipates_unclosed_emphasis() {
        let nodes = parse_inline("This is *italic", &plugins(), false);
        let em = nodes
            .iter()
            .find_map(|n| match n {
                InlineNode::Em { children, status } => Some((children, status)),
                _ => None,
            })
            .expect("expected an em node");
        assert_eq!(*em.1, InlineStatus::Anticipated);
        assert!(matches!(&em.0[0], InlineNode::Text { text } if text == "italic"));
        assert!(!contains_leaked_delimiter(&nodes));
    }

    #[test]
    fn completes_emphasis_when_closer_arrives() {
        let nodes = parse_inline("This is *italic text*", &plugins(), false);
        let em = nodes
            .iter()
            .find_map(|n| match n {
                InlineNode::Em { children, status } => Some((children, status)),
                _ => None,
            })
            .unwrap();
        assert_eq!(*em.1, InlineStatus::Complete);
        assert!(matches!(&em.0[0], InlineNode::Text { text } if text == "italic text"));
    }

    #[test]
    fn finalized_block_does_not_anticipate() {
        let nodes = parse_inline("This is *italic", &plugins(), true);
        assert!(
            nodes
                .iter()
                .any(|n| matches!(n, InlineNode::Text { text } if text.contains('*')))
        );
    }

    #[test]
    fn parses_strong() {
        let nodes = parse_inline("**bold**", &plugins(), false);
        assert!(matches!(&nodes[0], InlineNode::Strong { children } if children.len() == 1));
    }

    #[test]
    fn unclosed_strong_is_never_anticipated() {
        // Strong (`**`/`__`) has no `InlineStatus`; an unclosed run must
        // fall back to literal text on every tick, never render as a
        // confirmed `Strong` node ahead of its closer.
        let nodes = parse_inline("This is **bold", &plugins(), false);
        assert!(!nodes.iter().any(|n| matches!(n, InlineNode::Strong { .. })));
        assert!(
            nodes
                .iter()
                .any(|n| matches!(n, InlineNode::Text { text } if text.contains("**")))
        );
    }

    #[test]
    fn parses_link() {
        let nodes = parse_inline("[text](https://example.com \"t\")", &plugins(), false);
        match &nodes[0] {
            InlineNode::Link { url, title, .. } => {
                assert_eq!(url, "https://example.com");
                assert_eq!(title.as_deref(), Some("t"));
            }
            other => panic!("expected link, got {other:?}"),
        }
    }

    #[test]
    fn parses_footnote_ref() {
        let nodes = parse_inline("See[^1].", &plugins(), false);
        assert!(
            nodes
                .iter()
                .any(|n| matches!(n, InlineNode::FootnoteRef { label, .. } if label == "1"))
        );
    }

    #[test]
    fn math_anticipation_disabled_by_default_flag_still_respects_master_switch() {
        let mut p = plugins();
        p.format_anticipation = false;
        let nodes = parse_inline("$x", &p, false);
        assert!(
            nodes
                .iter()
                .any(|n| matches!(n, InlineNode::Text { text } if text.contains('$')))
        );
    }
}
