//! Store invariant enforcement (§4.5): children uniqueness, code-line
//! normalization, and list-depth normalization. Inline-segment field merge
//! and props-immutability-on-no-op live in `merge_props` in `mod.rs` since
//! they act on a single node rather than a subtree shape.

use super::arena::{Arena, NodeId};
use super::Node;
use crate::block::{BlockKind, MetaValue};
use crate::error::MarkflowError;
use crate::external::escape_code_line;
use crate::patch::CodeLine;
use std::collections::{HashMap, HashSet};

/// Re-derive any shape invariant that a structural mutation under `parent`
/// may have disturbed: duplicate children, and list nesting depth.
pub(super) fn renormalize_subtree(
    arena: &mut Arena<Node>,
    id_index: &mut HashMap<String, NodeId>,
    parent: NodeId,
) {
    dedupe_children(arena, id_index, parent);
    renumber_depth_if_list(arena, parent, 0);
}

/// Children uniqueness: every child id appears at most once under a given
/// parent. Duplicates (by logical node id, not arena address) are removed,
/// keeping the first occurrence.
fn dedupe_children(arena: &mut Arena<Node>, id_index: &mut HashMap<String, NodeId>, parent: NodeId) {
    let Some(node) = arena.get(parent) else {
        return;
    };
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    let mut kept = Vec::new();
    for &child in &node.children {
        let Some(child_node) = arena.get(child) else {
            continue;
        };
        if seen.insert(child_node.id.clone()) {
            kept.push(child);
        } else {
            duplicates.push(child);
        }
    }
    if duplicates.is_empty() {
        return;
    }
    if let Some(node) = arena.get_mut(parent) {
        node.children = kept;
    }
    for dup in duplicates {
        if let Some(removed) = arena.remove(dup) {
            id_index.remove(&removed.id);
        }
    }
}

/// List depth: every `list`/`list-item` node carries a `depth` meta field
/// equal to its nesting depth among lists. Walks the whole subtree since a
/// structural change anywhere below can shift depths further down.
fn renumber_depth_if_list(arena: &mut Arena<Node>, id: NodeId, depth: u32) {
    let (kind, children) = match arena.get(id) {
        Some(node) => (node.kind, node.children.clone()),
        None => return,
    };

    let next_depth = match kind {
        BlockKind::List | BlockKind::ListItem => {
            if let Some(node) = arena.get_mut(id) {
                node.meta.insert("depth".to_string(), MetaValue::Num(depth as f64));
            }
            depth + if kind == BlockKind::List { 1 } else { 0 }
        }
        _ => depth,
    };

    for child in children {
        renumber_depth_if_list(arena, child, next_depth);
    }
}

/// `appendLines` (§4.2, §4.5): rebuild the addressed code block's
/// `code-line` children so ids stay `<parent>::line:<i>`, `index` meta
/// matches position, and every line carries a sanitized `html` fallback.
pub(super) fn apply_append_lines(
    arena: &mut Arena<Node>,
    id_index: &mut HashMap<String, NodeId>,
    parent: NodeId,
    start_index: usize,
    lines: &[CodeLine],
) -> Result<bool, MarkflowError> {
    let parent_id = arena
        .get(parent)
        .ok_or_else(|| MarkflowError::StoreInvariant("code block vanished".into()))?
        .id
        .clone();

    let mut existing = arena
        .get(parent)
        .map(|n| n.children.clone())
        .unwrap_or_default();

    let mut changed = false;
    for (offset, line) in lines.iter().enumerate() {
        let index = start_index + offset;
        let html = line
            .html
            .clone()
            .unwrap_or_else(|| escape_code_line(&line.text));
        if let Some(&existing_id) = existing.get(index) {
            let node = arena
                .get_mut(existing_id)
                .ok_or_else(|| MarkflowError::StoreInvariant("code line vanished".into()))?;
            if node.raw != line.text || node.highlighted_html.as_deref() != Some(html.as_str()) {
                node.raw = line.text.clone();
                node.highlighted_html = Some(html);
                node.version += 1;
                changed = true;
            }
        } else {
            let line_id = format!("{parent_id}::line:{index}");
            let mut meta = std::collections::BTreeMap::new();
            meta.insert("index".to_string(), MetaValue::Num(index as f64));
            let node = Node {
                id: line_id.clone(),
                kind: BlockKind::CodeLine,
                is_finalized: false,
                raw: line.text.clone(),
                meta,
                highlighted_html: Some(html),
                sanitized_html: None,
                inline: None,
                mixed_segments: None,
                compiled_mdx_ref: None,
                children: Vec::new(),
                version: 0,
            };
            let node_id = arena.insert(node);
            id_index.insert(line_id, node_id);
            existing.push(node_id);
            changed = true;
        }
    }

    if changed {
        if let Some(node) = arena.get_mut(parent) {
            node.children = existing;
            node.version += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockPayload};
    use crate::store::Store;

    #[test]
    fn list_item_depth_is_assigned() {
        let mut outer = Block::new("list", BlockKind::List, BlockPayload::text(""));
        let mut item = Block::new("list::item:0", BlockKind::ListItem, BlockPayload::text("x"));
        let mut inner_list = Block::new("list::item:0::list", BlockKind::List, BlockPayload::text(""));
        let inner_item = Block::new(
            "list::item:0::list::item:0",
            BlockKind::ListItem,
            BlockPayload::text("y"),
        );
        inner_list.payload.children = vec![inner_item];
        item.payload.children = vec![inner_list];
        outer.payload.children = vec![item];

        let mut store = Store::new();
        store.reset(&[outer]);

        let item = store.get_node("list::item:0").unwrap();
        assert_eq!(item.payload.meta_str("depth"), None);
        match item.payload.meta.get("depth") {
            Some(MetaValue::Num(n)) => assert_eq!(*n, 0.0),
            _ => panic!("expected depth meta"),
        }
        let inner_item = store.get_node("list::item:0::list::item:0").unwrap();
        match inner_item.payload.meta.get("depth") {
            Some(MetaValue::Num(n)) => assert_eq!(*n, 1.0),
            _ => panic!("expected nested depth meta"),
        }
    }
}
