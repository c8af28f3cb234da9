//! Diff Engine (§4.3): compares a previous block sequence against a new one
//! and emits the ordered patch list that transforms a store holding the
//! former into the latter.
//!
//! The sequence-alignment core is a longest-common-subsequence table over
//! block ids, the same shape as a text-level LCS diff generalized to
//! block-id equality instead of line equality.

use crate::block::Block;
use crate::patch::{At, CodeLine, NodeSpec, Patch, PropMap, PropValue};

/// The synthetic parent id addressing the document's top-level block list
/// (§3: "a distinguished root node holds top-level blocks in document order").
pub const ROOT_ID: &str = "root";

/// Diff the previous and new top-level block sequences.
pub fn diff_document(old: &[Block], new: &[Block]) -> Vec<Patch> {
    diff_sequence(ROOT_ID, old, new)
}

/// One step of a sequence alignment, indexing into the old/new slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    /// Ids matched at `(old_index, new_index)`.
    Match(usize, usize),
    /// Present only in `old`, at `old_index`.
    Removed(usize),
    /// Present only in `new`, at `new_index`.
    Added(usize),
}

/// LCS-by-id alignment of two block sequences (generalized from textual
/// LCS diffing to id-keyed sequence diffing).
fn align_by_id(old: &[Block], new: &[Block]) -> Vec<Align> {
    let m = old.len();
    let n = new.len();
    let mut table = vec![vec![0u32; n + 1]; m + 1];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            table[i][j] = if old[i].id == new[j].id {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < m && j < n {
        if old[i].id == new[j].id {
            ops.push(Align::Match(i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            ops.push(Align::Removed(i));
            i += 1;
        } else {
            ops.push(Align::Added(j));
            j += 1;
        }
    }
    while i < m {
        ops.push(Align::Removed(i));
        i += 1;
    }
    while j < n {
        ops.push(Align::Added(j));
        j += 1;
    }
    ops
}

/// Diff two block sequences that share a common parent (`parent_id`): the
/// document root for top-level blocks, or a structural block's own id for
/// its children (list items, table rows/cells, blockquote content).
fn diff_sequence(parent_id: &str, old: &[Block], new: &[Block]) -> Vec<Patch> {
    if let Some(reorder) = try_reorder(parent_id, old, new) {
        return reorder;
    }

    let ops = align_by_id(old, new);
    let mut matched_patches = Vec::new();
    let mut deletes: Vec<usize> = Vec::new();
    let mut inserts: Vec<usize> = Vec::new();

    for op in ops {
        match op {
            Align::Match(oi, ni) => {
                matched_patches.extend(diff_matched(parent_id, &old[oi], &new[ni]));
            }
            Align::Removed(oi) => deletes.push(oi),
            Align::Added(ni) => inserts.push(ni),
        }
    }

    let mut patches = Vec::new();
    // Deletes apply before inserts at the same path; later indices first so
    // earlier deletions don't invalidate subsequent indices.
    deletes.sort_unstable_by(|a, b| b.cmp(a));
    for idx in deletes {
        patches.push(Patch::DeleteChild {
            at: At::block(parent_id.to_string()),
            index: idx,
        });
    }
    inserts.sort_unstable();
    for idx in inserts {
        patches.push(Patch::InsertChild {
            at: At::block(parent_id.to_string()),
            index: idx,
            node: NodeSpec {
                block: new[idx].clone(),
                props: None,
            },
        });
    }
    patches.extend(matched_patches);
    patches
}

/// Detect a pure reorder: same id multiset, different order, explainable as
/// moving one contiguous run. Falls back to `None` (caller uses delete+insert)
/// per §9's open question allowing that fallback for non-contiguous moves.
fn try_reorder(parent_id: &str, old: &[Block], new: &[Block]) -> Option<Vec<Patch>> {
    if old.len() != new.len() {
        return None;
    }
    let old_ids: Vec<&str> = old.iter().map(|b| b.id.as_str()).collect();
    let new_ids: Vec<&str> = new.iter().map(|b| b.id.as_str()).collect();
    if old_ids == new_ids {
        // Identical order: still need payload-level diffs, handled by the
        // caller's normal match path. Signal "no reorder needed" distinctly
        // by returning None so diff_sequence proceeds with matches only.
        return None;
    }
    let mut old_sorted = old_ids.clone();
    let mut new_sorted = new_ids.clone();
    old_sorted.sort_unstable();
    new_sorted.sort_unstable();
    if old_sorted != new_sorted {
        return None;
    }

    // Find the contiguous run in `old` whose removal-and-reinsertion
    // produces `new`. Try every (from, count, to) triple cheaply bounded by
    // typical batch sizes; document trees are small per tick.
    let n = old.len();
    for count in 1..=n {
        for from in 0..=(n - count) {
            let run = &old_ids[from..from + count];
            let mut remainder: Vec<&str> = Vec::with_capacity(n - count);
            remainder.extend_from_slice(&old_ids[..from]);
            remainder.extend_from_slice(&old_ids[from + count..]);
            for to in 0..=remainder.len() {
                let mut candidate = remainder.clone();
                for (k, id) in run.iter().enumerate() {
                    candidate.insert(to + k, id);
                }
                if candidate == new_ids {
                    let mut patches = vec![Patch::Reorder {
                        at: At::block(parent_id.to_string()),
                        from,
                        to,
                        count,
                    }];
                    // Payload may still have changed on the moved/untouched
                    // blocks; diff those too, matched by id post-move.
                    for new_block in new {
                        if let Some(old_block) = old.iter().find(|b| b.id == new_block.id) {
                            patches.extend(diff_matched(parent_id, old_block, new_block));
                        }
                    }
                    return Some(patches);
                }
            }
        }
    }
    None
}

/// Diff two blocks known to share an id: emit `setProps`/`finalize` for the
/// block's own payload, then recurse into structural children.
fn diff_matched(parent_id: &str, old: &Block, new: &Block) -> Vec<Patch> {
    let mut patches = Vec::new();
    let at = block_at(parent_id, &new.id);

    let shallow_old = shallow(old);
    let shallow_new = shallow(new);
    let payload_changed = shallow_old != shallow_new;
    let finalized_transitioned = !old.is_finalized && new.is_finalized;

    if finalized_transitioned && !payload_changed {
        patches.push(Patch::Finalize { at: at.clone() });
    } else if payload_changed {
        let mut props = PropMap::new();
        props.insert(
            "block".to_string(),
            PropValue::Block(Box::new(new.clone())),
        );
        patches.push(Patch::SetProps {
            at: at.clone(),
            props,
        });
    }

    if old.kind == crate::block::BlockKind::Code && new.kind == crate::block::BlockKind::Code {
        patches.extend(diff_code_lines(&new.id, old, new));
    } else if !old.payload.children.is_empty() || !new.payload.children.is_empty() {
        patches.extend(diff_sequence(&new.id, &old.payload.children, &new.payload.children));
    }

    patches
}

/// Code-block specialization (§4.3, §4.2): trailing-only growth emits one
/// `appendLines`; interior changes (e.g. a highlight arriving) emit `setProps`
/// on the affected line ids instead.
fn diff_code_lines(block_id: &str, old: &Block, new: &Block) -> Vec<Patch> {
    let old_lines = &old.payload.children;
    let new_lines = &new.payload.children;
    let mut patches = Vec::new();

    let common = old_lines.len().min(new_lines.len());
    let mut interior_changed = Vec::new();
    for i in 0..common {
        if old_lines[i].payload != new_lines[i].payload {
            interior_changed.push(i);
        }
    }

    if new_lines.len() > old_lines.len() {
        let appended: Vec<CodeLine> = new_lines[old_lines.len()..]
            .iter()
            .enumerate()
            .map(|(offset, b)| CodeLine {
                index: old_lines.len() + offset,
                text: b.payload.raw.clone(),
                html: b.payload.highlighted_html.clone(),
            })
            .collect();
        patches.push(Patch::AppendLines {
            at: At::block(block_id.to_string()),
            start_index: old_lines.len(),
            lines: appended,
        });
    }

    for i in interior_changed {
        let mut props = PropMap::new();
        props.insert(
            "text".to_string(),
            PropValue::Str(new_lines[i].payload.raw.clone()),
        );
        if let Some(html) = &new_lines[i].payload.highlighted_html {
            props.insert("html".to_string(), PropValue::Str(html.clone()));
        }
        patches.push(Patch::SetProps {
            at: At::node(block_id.to_string(), new_lines[i].id.clone()),
            props,
        });
    }

    patches
}

fn block_at(parent_id: &str, block_id: &str) -> At {
    if parent_id == ROOT_ID {
        At::block(block_id.to_string())
    } else {
        At::node(parent_id.to_string(), block_id.to_string())
    }
}

/// A block's payload compared without descending into structural children
/// (those are diffed recursively and separately).
#[derive(PartialEq)]
struct ShallowPayload<'a> {
    raw: &'a str,
    meta: &'a std::collections::BTreeMap<String, crate::block::MetaValue>,
    highlighted_html: &'a Option<String>,
    sanitized_html: &'a Option<String>,
    inline: &'a Option<Vec<crate::block::InlineNode>>,
    mixed_segments: &'a Option<Vec<crate::block::MixedSegment>>,
    compiled_mdx_ref: &'a Option<crate::block::CompiledMdxRef>,
}

fn shallow(block: &Block) -> ShallowPayload<'_> {
    ShallowPayload {
        raw: &block.payload.raw,
        meta: &block.payload.meta,
        highlighted_html: &block.payload.highlighted_html,
        sanitized_html: &block.payload.sanitized_html,
        inline: &block.payload.inline,
        mixed_segments: &block.payload.mixed_segments,
        compiled_mdx_ref: &block.payload.compiled_mdx_ref,
    }
}
