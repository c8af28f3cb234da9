//! Renderer Store (§4.5): owns the authoritative node graph that patch
//! batches mutate, and that a renderer reads back out as `Block` snapshots.

mod arena;
mod normalize;

pub use arena::NodeId;
use arena::Arena;

use crate::block::{Block, BlockKind, CompiledMdxRef, InlineNode, MetaValue, MixedSegment};
use crate::error::MarkflowError;
use crate::patch::{At, Patch, PropMap, PropValue};
use std::collections::{BTreeMap, HashMap};

/// One arena-resident node. Mirrors `BlockPayload`'s fields flattened so
/// `setProps` can merge individual fields without resurrecting the whole
/// typed payload; `children` holds arena addresses rather than inline
/// values (§9's "arena... Parent/child edges are index pairs").
struct Node {
    id: String,
    kind: BlockKind,
    is_finalized: bool,
    raw: String,
    meta: BTreeMap<String, MetaValue>,
    highlighted_html: Option<String>,
    sanitized_html: Option<String>,
    inline: Option<Vec<InlineNode>>,
    mixed_segments: Option<Vec<MixedSegment>>,
    compiled_mdx_ref: Option<CompiledMdxRef>,
    children: Vec<NodeId>,
    version: u64,
}

impl Node {
    fn from_block(block: &Block, children: Vec<NodeId>) -> Self {
        Self {
            id: block.id.clone(),
            kind: block.kind,
            is_finalized: block.is_finalized,
            raw: block.payload.raw.clone(),
            meta: block.payload.meta.clone(),
            highlighted_html: block.payload.highlighted_html.clone(),
            sanitized_html: block.payload.sanitized_html.clone(),
            inline: block.payload.inline.clone(),
            mixed_segments: block.payload.mixed_segments.clone(),
            compiled_mdx_ref: block.payload.compiled_mdx_ref.clone(),
            children,
            version: 0,
        }
    }
}

/// Summary of one `applyPatches` call, reported up to the scheduler for its
/// flush-result history and adaptive-budget p95 sample (§4.6).
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// Ids of every node touched by this batch (deduplicated, patch order).
    pub touched: Vec<String>,
    /// Whether the store's global version advanced (i.e. any real change).
    pub changed: bool,
}

/// The Renderer Store's node graph and public contract.
pub struct Store {
    arena: Arena<Node>,
    root: NodeId,
    id_index: HashMap<String, NodeId>,
    version: u64,
    listeners: Vec<Box<dyn FnMut() + Send>>,
}

impl Store {
    /// Construct an empty store (a root node with no children).
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(Node {
            id: super::diff::ROOT_ID.to_string(),
            kind: BlockKind::Paragraph, // unused placeholder; root is never read as a Block
            is_finalized: false,
            raw: String::new(),
            meta: BTreeMap::new(),
            highlighted_html: None,
            sanitized_html: None,
            inline: None,
            mixed_segments: None,
            compiled_mdx_ref: None,
            children: Vec::new(),
            version: 0,
        });
        let mut id_index = HashMap::new();
        id_index.insert(super::diff::ROOT_ID.to_string(), root);
        Self {
            arena,
            root,
            id_index,
            version: 0,
            listeners: Vec::new(),
        }
    }

    /// Replace the whole document with `blocks`: bumps the store version
    /// and notifies subscribers unconditionally.
    pub fn reset(&mut self, blocks: &[Block]) {
        self.arena.clear();
        self.id_index.clear();
        self.root = self.arena.insert(Node {
            id: super::diff::ROOT_ID.to_string(),
            kind: BlockKind::Paragraph,
            is_finalized: false,
            raw: String::new(),
            meta: BTreeMap::new(),
            highlighted_html: None,
            sanitized_html: None,
            inline: None,
            mixed_segments: None,
            compiled_mdx_ref: None,
            children: Vec::new(),
            version: 0,
        });
        self.id_index.insert(super::diff::ROOT_ID.to_string(), self.root);

        let child_ids: Vec<NodeId> = blocks.iter().map(|b| self.insert_subtree(b)).collect();
        self.arena.get_mut(self.root).unwrap().children = child_ids;
        normalize::renormalize_subtree(&mut self.arena, &mut self.id_index, self.root);
        self.version += 1;
        self.notify();
    }

    fn insert_subtree(&mut self, block: &Block) -> NodeId {
        let child_ids: Vec<NodeId> = block
            .payload
            .children
            .iter()
            .map(|c| self.insert_subtree(c))
            .collect();
        let node = Node::from_block(block, child_ids);
        let id = node.id.clone();
        let node_id = self.arena.insert(node);
        self.id_index.insert(id, node_id);
        node_id
    }

    fn remove_subtree(&mut self, id: NodeId) {
        if let Some(node) = self.arena.remove(id) {
            self.id_index.remove(&node.id);
            for child in node.children {
                self.remove_subtree(child);
            }
        }
    }

    fn resolve(&self, at: &At) -> Result<NodeId, MarkflowError> {
        let key = at.node_id.as_ref().unwrap_or(&at.block_id);
        self.id_index
            .get(key)
            .copied()
            .ok_or_else(|| MarkflowError::patch_apply(format!("unknown node id `{key}`"), 0, 0))
    }

    /// Apply a batch of patches in order. Coalescing is the caller's
    /// responsibility (§4.4); this only enforces store invariants and
    /// versioning.
    ///
    /// §7(d): a patch apply mismatch (missing target, bad index) is logged
    /// and the offending patch is dropped; the rest of the batch still
    /// applies. Only a `StoreInvariant`/`InternalError` — genuine structural
    /// corruption rather than a stale/bad address — aborts the remainder of
    /// the batch.
    pub fn apply_patches(&mut self, patches: &[Patch]) -> Result<ApplyOutcome, MarkflowError> {
        let mut touched = Vec::new();
        let mut changed = false;

        for patch in patches {
            match self.apply_one(patch) {
                Ok(did_change) => {
                    changed |= did_change;
                    if did_change {
                        touched.push(patch.at().node_id.clone().unwrap_or_else(|| patch.at().block_id.clone()));
                    }
                }
                Err(err @ MarkflowError::PatchApply { .. }) => {
                    log::warn!("store: dropping patch at {:?}: {err}", patch.at());
                }
                Err(err) => return Err(err),
            }
        }

        if changed {
            self.version += 1;
            self.notify();
        }
        Ok(ApplyOutcome { touched, changed })
    }

    fn apply_one(&mut self, patch: &Patch) -> Result<bool, MarkflowError> {
        match patch {
            Patch::InsertChild { at, index, node } => {
                let parent = self.resolve(at)?;
                let child_id = self.insert_subtree(&node.block);
                if let Some(props) = &node.props {
                    self.merge_props(child_id, props)?;
                }
                let parent_node = self
                    .arena
                    .get_mut(parent)
                    .ok_or_else(|| MarkflowError::StoreInvariant("parent vanished".into()))?;
                let idx = (*index).min(parent_node.children.len());
                parent_node.children.insert(idx, child_id);
                normalize::renormalize_subtree(&mut self.arena, &mut self.id_index, parent);
                Ok(true)
            }
            Patch::DeleteChild { at, index } => {
                let parent = self.resolve(at)?;
                let removed = {
                    let parent_node = self
                        .arena
                        .get_mut(parent)
                        .ok_or_else(|| MarkflowError::StoreInvariant("parent vanished".into()))?;
                    if *index >= parent_node.children.len() {
                        return Ok(false);
                    }
                    parent_node.children.remove(*index)
                };
                self.remove_subtree(removed);
                normalize::renormalize_subtree(&mut self.arena, &mut self.id_index, parent);
                Ok(true)
            }
            Patch::ReplaceChild { at, index, node } => {
                let parent = self.resolve(at)?;
                let new_child = self.insert_subtree(&node.block);
                if let Some(props) = &node.props {
                    self.merge_props(new_child, props)?;
                }
                let old = {
                    let parent_node = self
                        .arena
                        .get_mut(parent)
                        .ok_or_else(|| MarkflowError::StoreInvariant("parent vanished".into()))?;
                    let idx = (*index).min(parent_node.children.len().saturating_sub(1));
                    std::mem::replace(&mut parent_node.children[idx], new_child)
                };
                self.remove_subtree(old);
                normalize::renormalize_subtree(&mut self.arena, &mut self.id_index, parent);
                Ok(true)
            }
            Patch::SetProps { at, props } => {
                let node_id = self.resolve(at)?;
                self.merge_props(node_id, props)
            }
            Patch::SetPropsBatch { entries } => {
                let mut any = false;
                for (at, props) in entries {
                    let node_id = self.resolve(at)?;
                    any |= self.merge_props(node_id, props)?;
                }
                Ok(any)
            }
            Patch::Reorder { at, from, to, count } => {
                let parent = self.resolve(at)?;
                let parent_node = self
                    .arena
                    .get_mut(parent)
                    .ok_or_else(|| MarkflowError::StoreInvariant("parent vanished".into()))?;
                if *from + *count > parent_node.children.len() {
                    return Err(MarkflowError::patch_apply(
                        "reorder range out of bounds",
                        0,
                        0,
                    ));
                }
                let run: Vec<NodeId> = parent_node.children.drain(*from..*from + *count).collect();
                let to = (*to).min(parent_node.children.len());
                for (offset, id) in run.into_iter().enumerate() {
                    parent_node.children.insert(to + offset, id);
                }
                Ok(true)
            }
            Patch::Finalize { at } => {
                let node_id = self.resolve(at)?;
                let node = self
                    .arena
                    .get_mut(node_id)
                    .ok_or_else(|| MarkflowError::StoreInvariant("node vanished".into()))?;
                if node.is_finalized {
                    return Ok(false);
                }
                node.is_finalized = true;
                node.version += 1;
                Ok(true)
            }
            Patch::AppendLines { at, start_index, lines } => {
                let parent = self.resolve(at)?;
                normalize::apply_append_lines(&mut self.arena, &mut self.id_index, parent, *start_index, lines)
            }
            Patch::SetHtml { at, html, sanitized, block } => {
                let node_id = self.resolve(at)?;
                let node = self
                    .arena
                    .get_mut(node_id)
                    .ok_or_else(|| MarkflowError::StoreInvariant("node vanished".into()))?;
                let changed = node.raw != *html || node.sanitized_html.as_deref() != sanitized.as_deref();
                node.raw = html.clone();
                node.sanitized_html = sanitized.clone();
                if changed {
                    node.version += 1;
                }
                if let Some(block) = block {
                    self.replace_block_payload(node_id, block)?;
                }
                Ok(true)
            }
        }
    }

    fn replace_block_payload(&mut self, node_id: NodeId, block: &Block) -> Result<(), MarkflowError> {
        let new_children: Vec<NodeId> = block
            .payload
            .children
            .iter()
            .map(|c| self.insert_subtree(c))
            .collect();
        let old_children = {
            let node = self
                .arena
                .get_mut(node_id)
                .ok_or_else(|| MarkflowError::StoreInvariant("node vanished".into()))?;
            node.raw = block.payload.raw.clone();
            node.meta = block.payload.meta.clone();
            node.highlighted_html = block.payload.highlighted_html.clone();
            node.sanitized_html = block.payload.sanitized_html.clone();
            node.inline = block.payload.inline.clone();
            node.mixed_segments = block.payload.mixed_segments.clone();
            node.compiled_mdx_ref = block.payload.compiled_mdx_ref.clone();
            node.is_finalized = block.is_finalized;
            node.version += 1;
            std::mem::replace(&mut node.children, new_children)
        };
        for child in old_children {
            self.remove_subtree(child);
        }
        Ok(())
    }

    /// Shallow-merge `props` onto a node (§4.5 inline-segment and
    /// props-immutability-on-no-op rules). Returns whether anything changed.
    fn merge_props(&mut self, node_id: NodeId, props: &PropMap) -> Result<bool, MarkflowError> {
        if let Some(PropValue::Block(block)) = props.get("block") {
            self.replace_block_payload(node_id, block)?;
            return Ok(true);
        }

        let node = self
            .arena
            .get_mut(node_id)
            .ok_or_else(|| MarkflowError::StoreInvariant("node vanished".into()))?;
        let mut changed = false;
        for (key, value) in props {
            let field_changed = match key.as_str() {
                "raw" | "text" => set_string_field(&mut node.raw, value),
                "html" => set_option_field(&mut node.highlighted_html, value),
                "sanitizedHtml" => set_option_field(&mut node.sanitized_html, value),
                _ => {
                    let existing = node.meta.get(key);
                    let new_meta = match value {
                        PropValue::Unset => None,
                        PropValue::Str(s) => Some(MetaValue::Str(s.clone())),
                        PropValue::Num(n) => Some(MetaValue::Num(*n)),
                        PropValue::Bool(b) => Some(MetaValue::Bool(*b)),
                        PropValue::Block(_) => None,
                    };
                    if existing != new_meta.as_ref() {
                        match new_meta {
                            Some(v) => node.meta.insert(key.clone(), v),
                            None => node.meta.remove(key),
                        };
                        true
                    } else {
                        false
                    }
                }
            };
            changed |= field_changed;
        }
        if changed {
            node.version += 1;
        }
        Ok(changed)
    }

    /// Top-level blocks in document order.
    pub fn get_blocks(&self) -> Vec<Block> {
        let root = self.arena.get(self.root).expect("root always present");
        root.children
            .iter()
            .filter_map(|id| self.resolve_block(*id))
            .collect()
    }

    /// Reconstruct a single node's subtree as a `Block`, if it exists.
    pub fn get_node(&self, id: &str) -> Option<Block> {
        let node_id = *self.id_index.get(id)?;
        self.resolve_block(node_id)
    }

    /// Reconstructed child blocks of `id`, if it exists.
    pub fn get_children(&self, id: &str) -> Option<Vec<Block>> {
        let node_id = *self.id_index.get(id)?;
        let node = self.arena.get(node_id)?;
        Some(
            node.children
                .iter()
                .filter_map(|c| self.resolve_block(*c))
                .collect(),
        )
    }

    fn resolve_block(&self, id: NodeId) -> Option<Block> {
        let node = self.arena.get(id)?;
        let children: Vec<Block> = node
            .children
            .iter()
            .filter_map(|c| self.resolve_block(*c))
            .collect();
        let mut payload = crate::block::BlockPayload::text(node.raw.clone());
        payload.meta = node.meta.clone();
        payload.highlighted_html = node.highlighted_html.clone();
        payload.sanitized_html = node.sanitized_html.clone();
        payload.inline = node.inline.clone();
        payload.mixed_segments = node.mixed_segments.clone();
        payload.compiled_mdx_ref = node.compiled_mdx_ref.clone();
        payload.children = children;
        Some(Block {
            id: node.id.clone(),
            kind: node.kind,
            is_finalized: node.is_finalized,
            payload,
        })
    }

    /// Current store version, bumped once per commit with a net change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Register a listener notified after a commit that changed the store.
    pub fn subscribe(&mut self, listener: Box<dyn FnMut() + Send>) {
        self.listeners.push(listener);
    }

    fn notify(&mut self) {
        for listener in &mut self.listeners {
            listener();
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn set_string_field(field: &mut String, value: &PropValue) -> bool {
    match value {
        PropValue::Str(s) if field != s => {
            *field = s.clone();
            true
        }
        PropValue::Unset if !field.is_empty() => {
            field.clear();
            true
        }
        _ => false,
    }
}

fn set_option_field(field: &mut Option<String>, value: &PropValue) -> bool {
    match value {
        PropValue::Str(s) if field.as_deref() != Some(s.as_str()) => {
            *field = Some(s.clone());
            true
        }
        PropValue::Unset if field.is_some() => {
            *field = None;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockPayload;

    fn block(id: &str, raw: &str) -> Block {
        Block::new(id, BlockKind::Paragraph, BlockPayload::text(raw))
    }

    #[test]
    fn reset_populates_get_blocks() {
        let mut store = Store::new();
        store.reset(&[block("a", "hi")]);
        let blocks = store.get_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].payload.raw, "hi");
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn insert_child_adds_block() {
        let mut store = Store::new();
        store.reset(&[]);
        let patches = vec![Patch::InsertChild {
            at: At::block(super::super::diff::ROOT_ID),
            index: 0,
            node: crate::patch::NodeSpec {
                block: block("a", "hi"),
                props: None,
            },
        }];
        let outcome = store.apply_patches(&patches).unwrap();
        assert!(outcome.changed);
        assert_eq!(store.get_blocks().len(), 1);
    }

    #[test]
    fn unresolvable_patch_is_dropped_without_aborting_the_batch() {
        // §7(d): a patch apply mismatch (missing target) is logged and the
        // offending patch dropped; later patches in the same batch still
        // apply.
        let mut store = Store::new();
        store.reset(&[block("a", "hi")]);
        let mut props = PropMap::new();
        props.insert("raw".into(), PropValue::Str("bye".into()));
        let patches = vec![
            Patch::SetProps {
                at: At::block("does-not-exist"),
                props: PropMap::new(),
            },
            Patch::SetProps {
                at: At::block("a"),
                props,
            },
        ];
        let outcome = store.apply_patches(&patches).unwrap();
        assert!(outcome.changed);
        assert_eq!(store.get_node("a").unwrap().payload.raw, "bye");
    }

    #[test]
    fn set_props_no_op_does_not_bump_version() {
        let mut store = Store::new();
        store.reset(&[block("a", "hi")]);
        let before = store.version();
        let mut props = PropMap::new();
        props.insert("raw".into(), PropValue::Str("hi".into()));
        let outcome = store
            .apply_patches(&[Patch::SetProps {
                at: At::block("a"),
                props,
            }])
            .unwrap();
        assert!(!outcome.changed);
        assert_eq!(store.version(), before);
    }

    #[test]
    fn set_props_changed_value_bumps_version() {
        let mut store = Store::new();
        store.reset(&[block("a", "hi")]);
        let before = store.version();
        let mut props = PropMap::new();
        props.insert("raw".into(), PropValue::Str("bye".into()));
        let outcome = store
            .apply_patches(&[Patch::SetProps {
                at: At::block("a"),
                props,
            }])
            .unwrap();
        assert!(outcome.changed);
        assert_eq!(store.version(), before + 1);
        assert_eq!(store.get_node("a").unwrap().payload.raw, "bye");
    }

    #[test]
    fn delete_child_removes_block_and_descendants() {
        let mut store = Store::new();
        let mut parent = block("p", "");
        parent.payload.children = vec![block("p::c0", "x")];
        store.reset(&[parent]);
        assert!(store.get_node("p::c0").is_some());
        store
            .apply_patches(&[Patch::DeleteChild {
                at: At::block("root"),
                index: 0,
            }])
            .unwrap();
        assert!(store.get_node("p").is_none());
        assert!(store.get_node("p::c0").is_none());
    }

    #[test]
    fn finalize_sets_flag_once() {
        let mut store = Store::new();
        store.reset(&[block("a", "hi")]);
        let outcome = store
            .apply_patches(&[Patch::Finalize { at: At::block("a") }])
            .unwrap();
        assert!(outcome.changed);
        assert!(store.get_node("a").unwrap().is_finalized);
        let outcome2 = store
            .apply_patches(&[Patch::Finalize { at: At::block("a") }])
            .unwrap();
        assert!(!outcome2.changed);
    }

    #[test]
    fn reorder_moves_contiguous_run() {
        let mut store = Store::new();
        store.reset(&[block("a", "A"), block("b", "B"), block("c", "C")]);
        store
            .apply_patches(&[Patch::Reorder {
                at: At::block("root"),
                from: 2,
                to: 0,
                count: 1,
            }])
            .unwrap();
        let ids: Vec<String> = store.get_blocks().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn append_lines_normalizes_code_children() {
        let mut store = Store::new();
        store.reset(&[Block::new("code", BlockKind::Code, BlockPayload::text(""))]);
        store
            .apply_patches(&[Patch::AppendLines {
                at: At::block("code"),
                start_index: 0,
                lines: vec![
                    crate::patch::CodeLine {
                        index: 0,
                        text: "a".into(),
                        html: None,
                    },
                    crate::patch::CodeLine {
                        index: 1,
                        text: "b".into(),
                        html: None,
                    },
                ],
            }])
            .unwrap();
        let children = store.get_children("code").unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].id, "code::line:0");
        assert_eq!(children[1].id, "code::line:1");
    }

    /// Renders a block subtree as `<id> [<kind>] depth=<n>` lines, indented
    /// by nesting depth; used to snapshot the committed tree shape rather
    /// than asserting on individual fields one at a time.
    fn render_tree(blocks: &[Block], indent: usize, out: &mut String) {
        for block in blocks {
            let depth = match block.payload.meta.get("depth") {
                Some(MetaValue::Num(n)) => Some(*n as i64),
                _ => None,
            };
            out.push_str(&"  ".repeat(indent));
            out.push_str(&block.id);
            out.push_str(&format!(" [{:?}]", block.kind));
            if let Some(d) = depth {
                out.push_str(&format!(" depth={d}"));
            }
            out.push('\n');
            render_tree(&block.payload.children, indent + 1, out);
        }
    }

    #[test]
    fn list_tree_shape_snapshot() {
        let mut inner_item = block("list::item:0::sub::item:0", "nested");
        inner_item.kind = BlockKind::ListItem;
        let mut inner_list = block("list::item:0::sub", "");
        inner_list.kind = BlockKind::List;
        inner_list.payload.children = vec![inner_item];

        let mut item0 = block("list::item:0", "first");
        item0.kind = BlockKind::ListItem;
        item0.payload.children = vec![inner_list];

        let mut item1 = block("list::item:1", "second");
        item1.kind = BlockKind::ListItem;

        let mut outer = block("list", "");
        outer.kind = BlockKind::List;
        outer.payload.children = vec![item0, item1];

        let mut store = Store::new();
        store.reset(&[outer]);

        let mut rendered = String::new();
        render_tree(&store.get_blocks(), 0, &mut rendered);

        insta::assert_snapshot!(rendered, @r###"
        list [List] depth=0
          list::item:0 [ListItem] depth=0
            list::item:0::sub [List] depth=1
              list::item:0::sub::item:0 [ListItem] depth=1
          list::item:1 [ListItem] depth=0
        "###);
    }

    #[test]
    fn code_block_tree_shape_snapshot_after_append_lines() {
        let mut store = Store::new();
        store.reset(&[Block::new("code", BlockKind::Code, BlockPayload::text(""))]);
        store
            .apply_patches(&[Patch::AppendLines {
                at: At::block("code"),
                start_index: 0,
                lines: vec![
                    crate::patch::CodeLine {
                        index: 0,
                        text: "const a = 1;".into(),
                        html: None,
                    },
                    crate::patch::CodeLine {
                        index: 1,
                        text: "const b = 2;".into(),
                        html: None,
                    },
                ],
            }])
            .unwrap();

        let mut rendered = String::new();
        render_tree(&store.get_blocks(), 0, &mut rendered);

        insta::assert_snapshot!(rendered, @r###"
        code [Code]
          code::line:0 [CodeLine]
          code::line:1 [CodeLine]
        "###);
    }
}
