//! Footnote cross-referencing, synthesized only on finalize (§4.2).
//!
//! Numbering is deferred until the entire tail is finalized: renumbering a
//! live stream as later definitions arrive would make previously-rendered
//! numbers jump around, so the spec freezes on first synthesis.

use crate::block::{Block, BlockKind, BlockPayload};
use std::collections::{BTreeMap, HashMap};

/// A parsed footnote definition (`[^label]: text`), not yet numbered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootnoteDef {
    /// Raw label as written (`"1"` in `[^1]`).
    pub label: String,
    /// Definition body text.
    pub text: String,
}

/// Assign 1-based numbers to footnote labels in order of first appearance.
///
/// `ref_order` is the sequence of labels as encountered scanning inline
/// `footnote-ref` nodes top-to-bottom; duplicates reuse the first number.
pub fn assign_numbers(ref_order: &[String]) -> HashMap<String, u32> {
    let mut numbers = HashMap::new();
    let mut next = 1u32;
    for label in ref_order {
        numbers.entry(label.clone()).or_insert_with(|| {
            let n = next;
            next += 1;
            n
        });
    }
    numbers
}

/// Build the synthesized `footnotes` block enumerating referenced
/// definitions in appearance order (§3, §4.2).
///
/// Definitions that exist but were never referenced are omitted, per
/// "enumerates referenced definitions in appearance order".
pub fn synthesize_footnotes_block(
    defs: &[FootnoteDef],
    numbers: &HashMap<String, u32>,
    ref_order: &[String],
    id: impl Into<String>,
) -> Option<Block> {
    if ref_order.is_empty() {
        return None;
    }
    let by_label: BTreeMap<&str, &FootnoteDef> =
        defs.iter().map(|d| (d.label.as_str(), d)).collect();

    let mut seen = std::collections::HashSet::new();
    let mut children = Vec::new();
    for label in ref_order {
        if !seen.insert(label.clone()) {
            continue;
        }
        let Some(number) = numbers.get(label) else {
            continue;
        };
        let Some(def) = by_label.get(label.as_str()) else {
            continue;
        };
        let mut payload = BlockPayload::text(def.text.clone());
        payload.set_meta_str("label", label.clone());
        payload.set_meta_num("number", f64::from(*number));
        let child_id = format!("{}::footnote:{}", def.label, number);
        let mut child = Block::new(child_id, BlockKind::FootnoteDef, payload);
        child.is_finalized = true;
        children.push(child);
    }

    if children.is_empty() {
        return None;
    }

    let mut payload = BlockPayload::text(String::new());
    payload.children = children;
    let mut block = Block::new(id.into(), BlockKind::Footnotes, payload);
    block.is_finalized = true;
    Some(block)
}
