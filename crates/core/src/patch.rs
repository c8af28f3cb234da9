//! Patch vocabulary (§3, §4.1): the typed value set describing every
//! mutation a diff batch may make against the store's node graph.

use crate::block::Block;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Address of a patch target.
///
/// `block_id` is always present; `node_id` addresses a sub-block node
/// (e.g. a `code-line`) when the patch targets something other than the
/// block's own root node; `index_path` addresses siblings positionally
/// when structural recursion (list items, table rows) requires it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct At {
    /// Id of the block this patch concerns.
    pub block_id: String,
    /// Id of a sub-block node, when not targeting the block's root node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Positional path through nested structural children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index_path: Vec<usize>,
}

impl At {
    /// Address a block's own root node.
    pub fn block(block_id: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            node_id: None,
            index_path: Vec::new(),
        }
    }

    /// Address a specific sub-block node (e.g. a code line).
    pub fn node(block_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            node_id: Some(node_id.into()),
            index_path: Vec::new(),
        }
    }
}

/// A prop value carried by `setProps`/`setPropsBatch`.
///
/// `Unset` is the explicit delete marker (`undefined` in the spec's
/// vocabulary): shallow-merge semantics treat it as "remove this field".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    /// Explicit field deletion.
    Unset,
    /// String scalar.
    Str(String),
    /// Numeric scalar.
    Num(f64),
    /// Boolean scalar.
    Bool(bool),
    /// A whole embedded Block snapshot (the `block` key, §3).
    Block(Box<Block>),
}

/// Ordered map of prop field name to value, for `setProps`.
pub type PropMap = BTreeMap<String, PropValue>;

/// One line of a code block, as addressed by `appendLines` (§3, §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeLine {
    /// 0-based line index.
    pub index: usize,
    /// Raw line text.
    pub text: String,
    /// Highlighted HTML, if already available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// A subtree to be inserted by `insertChild`/`replaceChild`.
///
/// Kept minimal: the store materializes full node records (version,
/// children, props) from a Block snapshot plus positional metadata; the
/// patch itself only needs to carry the snapshot and an optional prop seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// The Block snapshot to embed at the new node.
    pub block: Block,
    /// Initial props to seed on the new node, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<PropMap>,
}

/// One structural or prop mutation against the store (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Patch {
    /// Insert a subtree as a new child.
    InsertChild {
        /// Target parent.
        at: At,
        /// Index to insert at.
        index: usize,
        /// The subtree to insert.
        node: NodeSpec,
    },
    /// Remove a child.
    DeleteChild {
        /// Target parent.
        at: At,
        /// Index to remove.
        index: usize,
    },
    /// Remove and insert atomically.
    ReplaceChild {
        /// Target parent.
        at: At,
        /// Index to replace.
        index: usize,
        /// Replacement subtree.
        node: NodeSpec,
    },
    /// Shallow-merge props onto a node.
    SetProps {
        /// Target node.
        at: At,
        /// Fields to merge; `PropValue::Unset` deletes a field.
        props: PropMap,
    },
    /// Ordered vector of `SetProps`, applied in sequence.
    SetPropsBatch {
        /// Entries applied in order.
        entries: Vec<(At, PropMap)>,
    },
    /// Move a contiguous run of siblings.
    Reorder {
        /// Target parent.
        at: At,
        /// Starting index of the run being moved.
        from: usize,
        /// Destination index.
        to: usize,
        /// Number of contiguous siblings moved (>= 1).
        count: usize,
    },
    /// Mark a block finalized.
    Finalize {
        /// Target block.
        at: At,
    },
    /// Code-block specialization: insert/overwrite `code-line` children.
    AppendLines {
        /// Target code block.
        at: At,
        /// 0-based index of the first line in `lines`.
        start_index: usize,
        /// Lines to insert or overwrite.
        lines: Vec<CodeLine>,
    },
    /// Replace a raw-HTML block's inner HTML.
    SetHtml {
        /// Target block.
        at: At,
        /// Raw HTML as received.
        html: String,
        /// Pre-sanitized HTML, if the caller already sanitized.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sanitized: Option<String>,
        /// Updated Block snapshot, if derived metadata changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block: Option<Box<Block>>,
    },
}

impl Patch {
    /// The `at` address this patch targets, for batching/ordering decisions.
    pub fn at(&self) -> &At {
        match self {
            Patch::InsertChild { at, .. }
            | Patch::DeleteChild { at, .. }
            | Patch::ReplaceChild { at, .. }
            | Patch::SetProps { at, .. }
            | Patch::Reorder { at, .. }
            | Patch::Finalize { at }
            | Patch::AppendLines { at, .. }
            | Patch::SetHtml { at, .. } => at,
            Patch::SetPropsBatch { entries } => &entries[0].0,
        }
    }

    /// Whether this patch is "heavy" (large payload / whole-block carrying)
    /// for the purposes of scheduler priority derivation (§4.6).
    pub fn is_heavy(&self) -> bool {
        match self {
            Patch::SetHtml { .. } => true,
            Patch::SetProps { props, .. } => {
                props.values().any(|v| matches!(v, PropValue::Block(_)))
            }
            Patch::SetPropsBatch { entries } => entries
                .iter()
                .any(|(_, props)| props.values().any(|v| matches!(v, PropValue::Block(_)))),
            _ => false,
        }
    }
}

/// A batch of patches produced by one diff pass, tagged with a transaction id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchBatch {
    /// Monotonically increasing transaction id.
    pub tx: u64,
    /// Ordered patches; apply top-down as emitted.
    pub patches: Vec<Patch>,
}

impl PatchBatch {
    /// Build a new batch.
    pub fn new(tx: u64, patches: Vec<Patch>) -> Self {
        Self { tx, patches }
    }

    /// Whether this batch carries no patches.
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockKind, BlockPayload};

    #[test]
    fn at_block_has_no_node_id() {
        let at = At::block("b1");
        assert_eq!(at.block_id, "b1");
        assert!(at.node_id.is_none());
    }

    #[test]
    fn finalize_patch_is_light() {
        let patch = Patch::Finalize {
            at: At::block("b1"),
        };
        assert!(!patch.is_heavy());
    }

    #[test]
    fn set_html_patch_is_heavy() {
        let patch = Patch::SetHtml {
            at: At::block("b1"),
            html: "<p>x</p>".into(),
            sanitized: None,
            block: None,
        };
        assert!(patch.is_heavy());
    }

    #[test]
    fn set_props_with_block_is_heavy() {
        let block = Block::new("b1", BlockKind::Paragraph, BlockPayload::text("x"));
        let mut props = PropMap::new();
        props.insert("block".into(), PropValue::Block(Box::new(block)));
        let patch = Patch::SetProps {
            at: At::block("b1"),
            props,
        };
        assert!(patch.is_heavy());
    }

    #[test]
    fn set_props_without_block_is_light() {
        let mut props = PropMap::new();
        props.insert("depth".into(), PropValue::Num(1.0));
        let patch = Patch::SetProps {
            at: At::block("b1"),
            props,
        };
        assert!(!patch.is_heavy());
    }
}
