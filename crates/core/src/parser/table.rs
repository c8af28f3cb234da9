//! GFM table detection and structural decomposition (§4.2).

use crate::block::{Block, BlockKind, BlockPayload};
use crate::config::DocPlugins;
use crate::error::{ParseWarning, SourceLocation};

/// Column alignment parsed from the delimiter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    /// No alignment specified.
    None,
    /// `:---`.
    Left,
    /// `:---:`.
    Center,
    /// `---:`.
    Right,
}

/// Whether `line` is a GFM table delimiter row (e.g. `| --- | :--: |`).
pub fn is_delimiter_row(line: &str) -> bool {
    let trimmed = line.trim().trim_matches('|');
    if trimmed.is_empty() {
        return false;
    }
    trimmed.split('|').all(|cell| {
        let cell = cell.trim();
        !cell.is_empty()
            && cell.chars().all(|c| c == '-' || c == ':')
            && cell.contains('-')
    })
}

fn parse_alignment_row(line: &str) -> Vec<Align> {
    line.trim()
        .trim_matches('|')
        .split('|')
        .map(|cell| {
            let cell = cell.trim();
            let left = cell.starts_with(':');
            let right = cell.ends_with(':');
            match (left, right) {
                (true, true) => Align::Center,
                (true, false) => Align::Left,
                (false, true) => Align::Right,
                (false, false) => Align::None,
            }
        })
        .collect()
}

fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
    trimmed.split('|').map(|c| c.trim().to_string()).collect()
}

/// Parse a contiguous run of table lines (header, delimiter, body rows)
/// into a `table` Block with `table-header`/`table-body` children.
pub fn parse_table(
    lines: &[&str],
    plugins: &DocPlugins,
    finalized: bool,
    id_prefix: &str,
    line_no: usize,
    warnings: &mut Vec<ParseWarning>,
) -> Option<Block> {
    if lines.len() < 2 || !is_delimiter_row(lines[1]) {
        return None;
    }
    let header_cells = split_row(lines[0]);
    let aligns = parse_alignment_row(lines[1]);
    let expected = header_cells.len();

    let mut header_row_children = Vec::new();
    for (idx, cell) in header_cells.iter().enumerate() {
        let inline = super::inline::parse_inline(cell, plugins, finalized);
        let mut payload = BlockPayload::text(cell.clone());
        payload.inline = Some(inline);
        payload.set_meta_str("align", align_name(aligns.get(idx).copied().unwrap_or(Align::None)));
        let id = format!("{id_prefix}::th:{idx}");
        header_row_children.push(Block::new(id, BlockKind::TableHeaderCell, payload));
    }
    let mut header_row = Block::new(
        format!("{id_prefix}::header-row"),
        BlockKind::TableRow,
        BlockPayload::text(String::new()),
    );
    header_row.payload.children = header_row_children;
    header_row.is_finalized = finalized;

    let mut header = Block::new(
        format!("{id_prefix}::header"),
        BlockKind::TableHeader,
        BlockPayload::text(String::new()),
    );
    header.payload.children = vec![header_row];
    header.is_finalized = finalized;

    let mut body_rows = Vec::new();
    for (row_idx, line) in lines[2..].iter().enumerate() {
        let cells = split_row(line);
        if cells.len() != expected {
            warnings.push(ParseWarning::RaggedTableRow {
                location: SourceLocation::new(line_no + 2 + row_idx, 1),
                expected,
                actual: cells.len(),
            });
        }
        let mut row_children = Vec::new();
        for (idx, cell) in cells.iter().enumerate() {
            let inline = super::inline::parse_inline(cell, plugins, finalized);
            let mut payload = BlockPayload::text(cell.clone());
            payload.inline = Some(inline);
            if let Some(align) = aligns.get(idx) {
                payload.set_meta_str("align", align_name(*align));
            }
            let id = format!("{id_prefix}::row:{row_idx}::cell:{idx}");
            row_children.push(Block::new(id, BlockKind::TableCell, payload));
        }
        let mut row = Block::new(
            format!("{id_prefix}::row:{row_idx}"),
            BlockKind::TableRow,
            BlockPayload::text(String::new()),
        );
        row.payload.children = row_children;
        row.is_finalized = finalized;
        body_rows.push(row);
    }

    let mut body = Block::new(
        format!("{id_prefix}::body"),
        BlockKind::TableBody,
        BlockPayload::text(String::new()),
    );
    body.payload.children = body_rows;
    body.is_finalized = finalized;

    let mut table = Block::new(
        id_prefix.to_string(),
        BlockKind::Table,
        BlockPayload::text(lines.join("\n")),
    );
    table.payload.children = vec![header, body];
    table.is_finalized = finalized;
    Some(table)
}

fn align_name(align: Align) -> &'static str {
    match align {
        Align::None => "none",
        Align::Left => "left",
        Align::Center => "center",
        Align::Right => "right",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_delimiter_row() {
        assert!(is_delimiter_row("| --- | :--: | ---: |"));
        assert!(!is_delimiter_row("| a | b |"));
    }

    #[test]
    fn parses_basic_table() {
        let lines = vec!["| a | b |", "| --- | --- |", "| 1 | 2 |"];
        let mut warnings = Vec::new();
        let table = parse_table(
            &lines,
            &DocPlugins::default(),
            true,
            "tbl:0",
            0,
            &mut warnings,
        )
        .unwrap();
        assert_eq!(table.kind, BlockKind::Table);
        assert_eq!(table.payload.children.len(), 2);
        assert!(warnings.is_empty());
    }

    #[test]
    fn flags_ragged_row() {
        let lines = vec!["| a | b |", "| --- | --- |", "| 1 |"];
        let mut warnings = Vec::new();
        parse_table(&lines, &DocPlugins::default(), true, "tbl:0", 0, &mut warnings).unwrap();
        assert_eq!(warnings.len(), 1);
    }
}
