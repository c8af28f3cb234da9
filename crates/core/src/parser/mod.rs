//! Incremental block + inline parser (§4.2).
//!
//! Maintains a stable prefix of finalized blocks that is never revisited and
//! re-parses only the bounded tail on every tick. Block ids are derived from
//! absolute byte position in the append-only buffer so they stay stable
//! regardless of how the caller chunks input across ticks (§8 property 1).

pub mod directives;
pub mod fence;
pub mod footnotes;
pub mod inline;
pub mod table;

use crate::block::{Block, BlockKind, BlockPayload, InlineNode, MdxStatus};
use crate::config::DocPlugins;
use crate::error::{ParseDiagnostics, ParseWarning, RecoverableError, SourceLocation};
use crate::external::Sanitizer;
use fence::{FencePhase, FenceState};
use footnotes::FootnoteDef;

/// Output of a single parse tick: the full current block sequence and any
/// diagnostics raised while producing it.
#[derive(Debug, Clone)]
pub struct ParseTick {
    /// Top-level blocks representing the entire document as currently known.
    pub blocks: Vec<Block>,
    /// Warnings and recoverable errors raised while parsing this tick.
    pub diagnostics: ParseDiagnostics,
}

/// Streaming block parser. Owns the append-only buffer and stable-prefix
/// bookkeeping; does not own scheduling or store state.
pub struct BlockParser {
    buffer: String,
    plugins: DocPlugins,
    stable_blocks: Vec<Block>,
    stable_byte_len: usize,
}

impl BlockParser {
    /// Create a parser with the given document plugin configuration.
    pub fn new(plugins: DocPlugins) -> Self {
        Self {
            buffer: String::new(),
            plugins,
            stable_blocks: Vec::new(),
            stable_byte_len: 0,
        }
    }

    /// Append text to the stream. Does not itself produce a tick; call
    /// [`BlockParser::tick`] to reparse.
    pub fn append(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Reset the parser to an empty document.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.stable_blocks.clear();
        self.stable_byte_len = 0;
    }

    /// Reparse the tail and advance the stable prefix as far as is safe.
    pub fn tick(&mut self, sanitizer: &dyn Sanitizer) -> ParseTick {
        self.run(false, sanitizer)
    }

    /// Reparse treating the entire tail as finalized (the `FINALIZE` event):
    /// synthesizes the footnotes block and promotes everything to the
    /// stable prefix.
    pub fn finalize(&mut self, sanitizer: &dyn Sanitizer) -> ParseTick {
        self.run(true, sanitizer)
    }

    fn run(&mut self, force_finalize: bool, sanitizer: &dyn Sanitizer) -> ParseTick {
        let tail = self.buffer[self.stable_byte_len..].to_string();
        let mut diagnostics = ParseDiagnostics::new();
        let mut result = parse_blocks(
            &tail,
            self.stable_byte_len,
            &self.plugins,
            force_finalize,
            sanitizer,
            &mut diagnostics,
        );

        if force_finalize {
            self.stable_blocks.append(&mut result.blocks);
            self.stable_byte_len = self.buffer.len();
        } else {
            // Promote every finalized block except the last tail block: the
            // last block might still be extended by the very next append.
            let promotable = result.block_ends.len().saturating_sub(1);
            let mut promote_upto = 0;
            for i in 0..promotable {
                if result.blocks[i].is_finalized {
                    promote_upto = i + 1;
                } else {
                    break;
                }
            }
            if promote_upto > 0 {
                let remainder = result.blocks.split_off(promote_upto);
                self.stable_blocks.extend(result.blocks);
                self.stable_byte_len += result.block_ends[promote_upto - 1];
                result.blocks = remainder;
            }
        }

        let mut blocks = self.stable_blocks.clone();
        blocks.extend(result.blocks);

        ParseTick {
            blocks,
            diagnostics,
        }
    }
}

struct SplitResult {
    blocks: Vec<Block>,
    /// Byte offset, relative to the start of the parsed text, of the end of
    /// each block in `blocks` (same length as `blocks`).
    block_ends: Vec<usize>,
}

#[allow(clippy::too_many_arguments)]
fn parse_blocks(
    text: &str,
    id_base: usize,
    plugins: &DocPlugins,
    force_finalize: bool,
    sanitizer: &dyn Sanitizer,
    diagnostics: &mut ParseDiagnostics,
) -> SplitResult {
    let lines = collect_lines(text);
    let n = lines.len();
    let mut blocks: Vec<Block> = Vec::new();
    let mut block_ends: Vec<usize> = Vec::new();
    let mut footnote_defs: Vec<FootnoteDef> = Vec::new();

    let mut i = 0usize;
    while i < n {
        let (line, _) = lines[i];
        let is_last = i == n - 1;

        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        if let Some((marker, len)) = fence_opener(line) {
            let (block, consumed, closed) =
                parse_code_block(&lines, i, id_base, marker, len, force_finalize, diagnostics);
            blocks.push(block);
            i += consumed;
            let end = lines[i - 1].1;
            block_ends.push(end);
            let _ = closed;
            continue;
        }

        if plugins.callouts {
            if let Some(opening) = directives::parse_opening_directive(line) {
                let (block, consumed) = parse_callout(
                    &lines,
                    i,
                    id_base,
                    opening,
                    plugins,
                    force_finalize && is_last,
                    force_finalize,
                    sanitizer,
                    diagnostics,
                );
                blocks.push(block);
                i += consumed;
                block_ends.push(lines[i - 1].1);
                continue;
            }
        }

        if plugins.tables && i + 1 < n && table::is_delimiter_row(lines[i + 1].0) {
            let (rows, consumed) = collect_contiguous(&lines, i);
            let line_no = i;
            let finalized = force_finalize || !is_block_at_end(i, consumed, n);
            let id = format!("blk:{}:table", start_offset(id_base, &lines, i));
            let mut warnings = Vec::new();
            if let Some(block) =
                table::parse_table(&rows, plugins, finalized, &id, line_no, &mut warnings)
            {
                for w in warnings {
                    diagnostics.add_warning(w);
                }
                blocks.push(block);
                i += consumed;
                block_ends.push(lines[i - 1].1);
                continue;
            }
        }

        if let Some(rest) = line.trim_start().strip_prefix('>') {
            let _ = rest;
            let (block, consumed) = parse_blockquote(&lines, i, id_base, plugins, force_finalize, sanitizer, diagnostics);
            blocks.push(block);
            i += consumed;
            block_ends.push(lines[i - 1].1);
            continue;
        }

        if is_list_marker(line) {
            let (block, consumed) = parse_list(&lines, i, id_base, plugins, force_finalize);
            blocks.push(block);
            i += consumed;
            block_ends.push(lines[i - 1].1);
            continue;
        }

        if let Some(level) = heading_level(line) {
            let start = start_offset(id_base, &lines, i);
            let text_content = line.trim_start_matches('#').trim();
            let inline = inline::parse_inline(text_content, plugins, true);
            let mut payload = BlockPayload::text(text_content.to_string());
            payload.inline = Some(inline);
            payload.set_meta_num("level", level as f64);
            let mut block = Block::new(format!("blk:{start}:heading"), BlockKind::Heading, payload);
            block.is_finalized = true;
            blocks.push(block);
            i += 1;
            block_ends.push(lines[i - 1].1);
            continue;
        }

        if let Some((label, rest)) = parse_footnote_def_line(line) {
            footnote_defs.push(FootnoteDef {
                label,
                text: rest.to_string(),
            });
            // Footnote definitions are hidden from the visible block sequence
            // until finalize synthesizes the footnotes block, so no entry is
            // pushed to `blocks`/`block_ends` here.
            i += 1;
            continue;
        }

        if plugins.mdx && is_mdx_block_start(line) {
            let (block, consumed) = parse_raw_block(
                &lines,
                i,
                id_base,
                force_finalize,
                BlockKind::Mdx,
                |raw, payload| {
                    payload.set_meta_str("mdxStatus", mdx_status_str(MdxStatus::Pending));
                    let _ = raw;
                },
            );
            blocks.push(block);
            i += consumed;
            block_ends.push(lines[i - 1].1);
            continue;
        }

        if plugins.html && line.trim_start().starts_with('<') {
            let (mut block, consumed) = parse_raw_block(
                &lines,
                i,
                id_base,
                force_finalize,
                BlockKind::Html,
                |_, _| {},
            );
            let sanitized = sanitizer.sanitize(&block.payload.raw);
            block.payload.sanitized_html = Some(sanitized);
            blocks.push(block);
            i += consumed;
            block_ends.push(lines[i - 1].1);
            continue;
        }

        // Default: paragraph. Gather contiguous plain lines.
        let (para_lines, consumed) = collect_contiguous(&lines, i);
        let finalized = force_finalize || !is_block_at_end(i, consumed, n);
        let joined = para_lines.join(" ");
        let start = start_offset(id_base, &lines, i);
        let inline_nodes = inline::parse_inline(&joined, plugins, finalized);
        check_anticipation_leak(&inline_nodes, diagnostics, start);
        let mut payload = BlockPayload::text(joined);
        payload.inline = Some(inline_nodes);
        let mut block = Block::new(format!("blk:{start}:p"), BlockKind::Paragraph, payload);
        block.is_finalized = finalized;
        blocks.push(block);
        i += consumed;
        block_ends.push(lines[i - 1].1);
    }

    // Footnote synthesis is deferred until the whole tail is finalized.
    if force_finalize {
        let ref_order = collect_footnote_refs(&blocks);
        if !ref_order.is_empty() {
            let numbers = footnotes::assign_numbers(&ref_order);
            apply_footnote_numbers(&mut blocks, &numbers);
            let fn_id = format!("blk:{}:footnotes", id_base + text.len());
            if let Some(fn_block) =
                footnotes::synthesize_footnotes_block(&footnote_defs, &numbers, &ref_order, fn_id)
            {
                blocks.push(fn_block);
                block_ends.push(text.len());
            }
        }
    }

    SplitResult { blocks, block_ends }
}

fn mdx_status_str(status: MdxStatus) -> &'static str {
    match status {
        MdxStatus::Pending => "pending",
        MdxStatus::Compiled => "compiled",
        MdxStatus::Error => "error",
    }
}

fn check_anticipation_leak(nodes: &[InlineNode], diagnostics: &mut ParseDiagnostics, line_no: usize) {
    use crate::block::InlineStatus;
    fn has_raw_delim(text: &str) -> bool {
        text.contains('*') || text.contains('_') || text.contains('~') || text.contains('`')
    }
    for node in nodes {
        match node {
            InlineNode::Em { children, status } | InlineNode::Strike { children, status } => {
                if *status == InlineStatus::Anticipated {
                    for c in children {
                        if let InlineNode::Text { text } = c {
                            if has_raw_delim(text) {
                                diagnostics.add_error(RecoverableError::warning(
                                    "anticipated span text contains a raw delimiter",
                                    line_no,
                                    1,
                                ));
                            }
                        }
                    }
                }
                check_anticipation_leak(children, diagnostics, line_no);
            }
            InlineNode::Strong { children } | InlineNode::Link { children, .. } => {
                check_anticipation_leak(children, diagnostics, line_no);
            }
            _ => {}
        }
    }
}

/// Collect lines as `(content_without_newline, end_cursor)` pairs, where
/// `end_cursor` is the byte offset (relative to `text`) just past the line
/// including its trailing newline, if any.
fn collect_lines(text: &str) -> Vec<(&str, usize)> {
    let mut lines = Vec::new();
    let mut cursor = 0usize;
    let bytes = text.as_bytes();
    while cursor < text.len() {
        let rel = bytes[cursor..].iter().position(|b| *b == b'\n');
        match rel {
            Some(pos) => {
                let end = cursor + pos;
                lines.push((&text[cursor..end], end + 1));
                cursor = end + 1;
            }
            None => {
                lines.push((&text[cursor..], text.len()));
                cursor = text.len();
            }
        }
    }
    lines
}

fn start_offset(id_base: usize, lines: &[(&str, usize)], index: usize) -> usize {
    id_base + compute_line_start(lines, index)
}

fn compute_line_start(lines: &[(&str, usize)], index: usize) -> usize {
    if index == 0 {
        0
    } else {
        lines[index - 1].1
    }
}

fn is_block_at_end(start: usize, consumed: usize, total: usize) -> bool {
    start + consumed >= total
}

fn fence_opener(line: &str) -> Option<(char, usize)> {
    let outcome = fence::advance_fence_state(line, FenceState::default());
    if outcome.is_opener {
        outcome.next_state.marker.map(|m| (m, outcome.next_state.length))
    } else {
        None
    }
}

fn parse_code_block(
    lines: &[(&str, usize)],
    start: usize,
    id_base: usize,
    _marker: char,
    _len: usize,
    force_finalize: bool,
    diagnostics: &mut ParseDiagnostics,
) -> (Block, usize, bool) {
    let opener_outcome = fence::advance_fence_state(lines[start].0, FenceState::default());
    let lang = opener_outcome.info_string.clone();
    let mut state = opener_outcome.next_state;
    let mut code_lines = Vec::new();
    let mut idx = start + 1;
    let mut closed = false;
    while idx < lines.len() {
        let outcome = fence::advance_fence_state(lines[idx].0, state);
        if outcome.is_closer {
            closed = true;
            state = outcome.next_state;
            idx += 1;
            break;
        }
        code_lines.push(lines[idx].0.to_string());
        state = outcome.next_state;
        idx += 1;
    }
    let _ = state;

    let finalized = closed || force_finalize;
    if !closed && force_finalize {
        diagnostics.add_warning(ParseWarning::UnclosedCodeFence {
            location: SourceLocation::new(start, 1),
            marker: _marker,
            context: lines[start].0.to_string(),
        });
    }

    let start_byte = compute_line_start(lines, start) + id_base;
    let mut children = Vec::new();
    for (line_idx, text) in code_lines.iter().enumerate() {
        let id = format!("blk:{start_byte}:code::line:{line_idx}");
        let mut payload = BlockPayload::text(text.clone());
        payload.set_meta_num("index", line_idx as f64);
        let mut child = Block::new(id, BlockKind::CodeLine, payload);
        child.is_finalized = finalized;
        children.push(child);
    }

    let raw: String = code_lines.join("\n");
    let mut payload = BlockPayload::text(raw);
    payload.children = children;
    if let Some(lang) = lang {
        payload.set_meta_str("lang", lang);
    }
    let mut block = Block::new(format!("blk:{start_byte}:code"), BlockKind::Code, payload);
    block.is_finalized = finalized;

    (block, idx - start, closed)
}

#[allow(clippy::too_many_arguments)]
fn parse_callout(
    lines: &[(&str, usize)],
    start: usize,
    id_base: usize,
    opening: directives::DirectiveOpening,
    plugins: &DocPlugins,
    _is_last_overall: bool,
    force_finalize: bool,
    sanitizer: &dyn Sanitizer,
    diagnostics: &mut ParseDiagnostics,
) -> (Block, usize) {
    let mut idx = start + 1;
    let mut inner_lines: Vec<&str> = Vec::new();
    let mut closed = false;
    while idx < lines.len() {
        if directives::is_closing_directive(lines[idx].0) {
            closed = true;
            idx += 1;
            break;
        }
        inner_lines.push(lines[idx].0);
        idx += 1;
    }
    let finalized = closed || force_finalize;
    let inner_text = inner_lines.join("\n");
    let start_byte = compute_line_start(lines, start) + id_base;
    let nested = parse_blocks(&inner_text, start_byte, plugins, finalized, sanitizer, diagnostics);

    let mut payload = BlockPayload::text(inner_text);
    payload.children = nested.blocks;
    payload.set_meta_str("calloutKind", opening.name.clone());
    if let Some(title) = opening.bracket_title {
        payload.set_meta_str("title", title);
    }
    for (k, v) in opening.attrs {
        payload.set_meta_str(format!("attr:{k}"), v);
    }
    let mut block = Block::new(format!("blk:{start_byte}:callout"), BlockKind::Callout, payload);
    block.is_finalized = finalized;

    (block, idx - start)
}

fn parse_blockquote(
    lines: &[(&str, usize)],
    start: usize,
    id_base: usize,
    plugins: &DocPlugins,
    force_finalize: bool,
    sanitizer: &dyn Sanitizer,
    diagnostics: &mut ParseDiagnostics,
) -> (Block, usize) {
    let mut idx = start;
    let mut inner_lines: Vec<String> = Vec::new();
    while idx < lines.len() {
        let trimmed = lines[idx].0.trim_start();
        if let Some(rest) = trimmed.strip_prefix('>') {
            inner_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            idx += 1;
        } else {
            break;
        }
    }
    let finalized = force_finalize || idx < lines.len();
    let inner_text = inner_lines.join("\n");
    let start_byte = compute_line_start(lines, start) + id_base;
    let nested = parse_blocks(&inner_text, start_byte, plugins, finalized, sanitizer, diagnostics);

    let mut payload = BlockPayload::text(inner_text);
    payload.children = nested.blocks;
    let mut block = Block::new(
        format!("blk:{start_byte}:blockquote"),
        BlockKind::Blockquote,
        payload,
    );
    block.is_finalized = finalized;

    (block, idx - start)
}

fn is_list_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with("+ ") {
        return true;
    }
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return false;
    }
    trimmed[digits.len()..].starts_with(". ") || trimmed[digits.len()..].starts_with(") ")
}

fn parse_list(
    lines: &[(&str, usize)],
    start: usize,
    id_base: usize,
    plugins: &DocPlugins,
    force_finalize: bool,
) -> (Block, usize) {
    let mut idx = start;
    let mut items: Vec<Block> = Vec::new();
    let start_byte = compute_line_start(lines, start) + id_base;
    while idx < lines.len() && is_list_marker(lines[idx].0) {
        let item_byte = compute_line_start(lines, idx) + id_base;
        let content = strip_list_marker(lines[idx].0);
        let inline = inline::parse_inline(content, plugins, true);
        let mut payload = BlockPayload::text(content.to_string());
        payload.inline = Some(inline);
        payload.set_meta_num("depth", 1.0);
        let mut item = Block::new(format!("blk:{item_byte}:item"), BlockKind::ListItem, payload);
        item.is_finalized = true;
        items.push(item);
        idx += 1;
    }
    let finalized = force_finalize || idx < lines.len();
    let mut payload = BlockPayload::text(String::new());
    payload.children = items;
    payload.set_meta_num("depth", 1.0);
    let mut block = Block::new(format!("blk:{start_byte}:list"), BlockKind::List, payload);
    block.is_finalized = finalized;
    (block, idx - start)
}

fn strip_list_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))
    {
        return rest;
    }
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    let after = &trimmed[digits.len()..];
    after
        .strip_prefix(". ")
        .or_else(|| after.strip_prefix(") "))
        .unwrap_or(trimmed)
}

fn heading_level(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&hashes) && trimmed.as_bytes().get(hashes) == Some(&b' ') {
        Some(hashes)
    } else {
        None
    }
}

fn parse_footnote_def_line(line: &str) -> Option<(String, &str)> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("[^")?;
    let (label, after) = rest.split_once(']')?;
    let after = after.strip_prefix(':')?;
    if label.is_empty() {
        return None;
    }
    Some((label.to_string(), after.trim_start()))
}

fn is_mdx_block_start(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed
        .strip_prefix('<')
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

fn parse_raw_block(
    lines: &[(&str, usize)],
    start: usize,
    id_base: usize,
    force_finalize: bool,
    kind: BlockKind,
    seed: impl FnOnce(&str, &mut BlockPayload),
) -> (Block, usize) {
    let (content_lines, consumed) = collect_contiguous(lines, start);
    let finalized = force_finalize || start + consumed < lines.len();
    let raw = content_lines.join("\n");
    let start_byte = compute_line_start(lines, start) + id_base;
    let mut payload = BlockPayload::text(raw.clone());
    seed(&raw, &mut payload);
    let suffix = match kind {
        BlockKind::Mdx => "mdx",
        BlockKind::Html => "html",
        _ => "raw",
    };
    let mut block = Block::new(format!("blk:{start_byte}:{suffix}"), kind, payload);
    block.is_finalized = finalized;
    (block, consumed)
}

fn collect_contiguous<'a>(lines: &[(&'a str, usize)], start: usize) -> (Vec<&'a str>, usize) {
    let mut idx = start;
    let mut collected = Vec::new();
    while idx < lines.len() && !lines[idx].0.trim().is_empty() {
        collected.push(lines[idx].0);
        idx += 1;
    }
    (collected, idx - start)
}

fn collect_footnote_refs(blocks: &[Block]) -> Vec<String> {
    let mut refs = Vec::new();
    fn walk(nodes: &[InlineNode], refs: &mut Vec<String>) {
        for node in nodes {
            match node {
                InlineNode::FootnoteRef { label, .. } => refs.push(label.clone()),
                InlineNode::Em { children, .. }
                | InlineNode::Strike { children, .. }
                | InlineNode::Strong { children }
                | InlineNode::Link { children, .. } => walk(children, refs),
                _ => {}
            }
        }
    }
    fn walk_block(block: &Block, refs: &mut Vec<String>) {
        if let Some(inline) = &block.payload.inline {
            walk(inline, refs);
        }
        for child in &block.payload.children {
            walk_block(child, refs);
        }
    }
    for block in blocks {
        walk_block(block, &mut refs);
    }
    refs
}

fn apply_footnote_numbers(blocks: &mut [Block], numbers: &std::collections::HashMap<String, u32>) {
    fn rewrite(nodes: &mut [InlineNode], numbers: &std::collections::HashMap<String, u32>) {
        for node in nodes {
            match node {
                InlineNode::FootnoteRef { label, number } => {
                    *number = numbers.get(label).copied();
                }
                InlineNode::Em { children, .. }
                | InlineNode::Strike { children, .. }
                | InlineNode::Strong { children }
                | InlineNode::Link { children, .. } => rewrite(children, numbers),
                _ => {}
            }
        }
    }
    fn rewrite_block(block: &mut Block, numbers: &std::collections::HashMap<String, u32>) {
        if let Some(inline) = &mut block.payload.inline {
            rewrite(inline, numbers);
        }
        for child in &mut block.payload.children {
            rewrite_block(child, numbers);
        }
    }
    for block in blocks.iter_mut() {
        rewrite_block(block, numbers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::NoopSanitizer;

    fn sanitizer() -> NoopSanitizer {
        NoopSanitizer
    }

    #[test]
    fn paragraph_round_trips() {
        let mut parser = BlockParser::new(DocPlugins::default());
        parser.append("Hello world");
        let tick = parser.tick(&sanitizer());
        assert_eq!(tick.blocks.len(), 1);
        assert_eq!(tick.blocks[0].kind, BlockKind::Paragraph);
        assert!(!tick.blocks[0].is_finalized);
    }

    #[test]
    fn paragraph_finalizes_after_blank_line() {
        let mut parser = BlockParser::new(DocPlugins::default());
        parser.append("Hello world\n\nNext");
        let tick = parser.tick(&sanitizer());
        assert!(tick.blocks[0].is_finalized);
        assert!(!tick.blocks[1].is_finalized);
    }

    #[test]
    fn e1_emphasis_anticipation() {
        let mut parser = BlockParser::new(DocPlugins::default());
        parser.append("This is *italic");
        let tick = parser.tick(&sanitizer());
        let inline = tick.blocks[0].payload.inline.as_ref().unwrap();
        let found = inline.iter().any(|n| {
            matches!(n, InlineNode::Em { status, children }
                if *status == crate::block::InlineStatus::Anticipated
                && matches!(&children[0], InlineNode::Text { text } if text == "italic"))
        });
        assert!(found);

        parser.append(" text*");
        let tick = parser.tick(&sanitizer());
        let inline = tick.blocks[0].payload.inline.as_ref().unwrap();
        let found = inline.iter().any(|n| {
            matches!(n, InlineNode::Em { status, children }
                if *status == crate::block::InlineStatus::Complete
                && matches!(&children[0], InlineNode::Text { text } if text == "italic text"))
        });
        assert!(found);
    }

    #[test]
    fn e2_code_streaming() {
        let mut parser = BlockParser::new(DocPlugins::default());
        parser.append("```ts\nconst a=1;\n");
        let tick = parser.tick(&sanitizer());
        let code = tick.blocks.last().unwrap();
        assert_eq!(code.kind, BlockKind::Code);
        assert_eq!(code.payload.children.len(), 1);
        assert_eq!(code.payload.children[0].payload.raw, "const a=1;");

        parser.append("const b=2;\n```");
        let tick = parser.finalize(&sanitizer());
        let code = tick.blocks.last().unwrap();
        assert!(code.is_finalized);
        assert_eq!(code.payload.children.len(), 2);
        assert_eq!(code.payload.children[1].payload.raw, "const b=2;");
    }

    #[test]
    fn e3_footnote_synthesis() {
        let mut parser = BlockParser::new(DocPlugins::default());
        parser.append("See[^1].\n\n[^1]: Note.");
        let tick = parser.tick(&sanitizer());
        assert!(!tick.blocks.iter().any(|b| b.kind == BlockKind::Footnotes));

        let tick = parser.finalize(&sanitizer());
        let fn_block = tick
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Footnotes)
            .expect("footnotes block expected");
        assert_eq!(fn_block.payload.children.len(), 1);
        assert_eq!(fn_block.payload.children[0].payload.meta_str("label"), Some("1"));
    }

    #[test]
    fn heading_and_table_parse() {
        let mut parser = BlockParser::new(DocPlugins::default());
        parser.append("# Title\n\n| a | b |\n| --- | --- |\n| 1 | 2 |\n");
        let tick = parser.finalize(&sanitizer());
        assert!(tick.blocks.iter().any(|b| b.kind == BlockKind::Heading));
        assert!(tick.blocks.iter().any(|b| b.kind == BlockKind::Table));
    }

    #[test]
    fn callout_block_parses() {
        let mut parser = BlockParser::new(DocPlugins::default());
        parser.append(":::note[Heads up]\nBody text\n:::\n");
        let tick = parser.finalize(&sanitizer());
        let callout = tick
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Callout)
            .unwrap();
        assert_eq!(callout.payload.meta_str("calloutKind"), Some("note"));
        assert_eq!(callout.payload.meta_str("title"), Some("Heads up"));
    }

    /// Feed `text` through the parser in the chunks given by `cuts` (sorted
    /// byte offsets, deduplicated and clamped to char boundaries), then
    /// finalize. One tick per chunk.
    fn run_chunked(text: &str, mut cuts: Vec<usize>) -> Vec<Block> {
        cuts.retain(|&i| i > 0 && i < text.len() && text.is_char_boundary(i));
        cuts.sort_unstable();
        cuts.dedup();

        let mut parser = BlockParser::new(DocPlugins::default());
        let mut start = 0;
        for &cut in &cuts {
            parser.append(&text[start..cut]);
            parser.tick(&sanitizer());
            start = cut;
        }
        parser.append(&text[start..]);
        parser.finalize(&sanitizer()).blocks
    }

    proptest::proptest! {
        /// §8 property 1 (tick-rate independence): the final block
        /// sequence after FINALIZE does not depend on how the input was
        /// chunked across ticks, because ids are derived from absolute
        /// byte position rather than tick count.
        #[test]
        fn tick_rate_independence(
            text in "(# [A-Za-z ]{1,12}\n\n)?([A-Za-z0-9 *_`]{0,40}\n\n?){1,4}",
            cuts_a in proptest::collection::vec(0usize..80, 0..6),
            cuts_b in proptest::collection::vec(0usize..80, 0..6),
        ) {
            let one_shot = run_chunked(&text, vec![]);
            let chunked_a = run_chunked(&text, cuts_a);
            let chunked_b = run_chunked(&text, cuts_b);
            proptest::prop_assert_eq!(&one_shot, &chunked_a);
            proptest::prop_assert_eq!(&one_shot, &chunked_b);
        }
    }
}
