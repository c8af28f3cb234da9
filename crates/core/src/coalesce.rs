//! Patch coalescing (§4.4): folds a raw diff-engine patch list down before it
//! reaches the scheduler, so a burst of per-keystroke diffs collapses to the
//! handful of mutations the store actually needs to apply.
//!
//! Folding rules, in order:
//! 1. Consecutive `setProps` at the same `at` merge into one (later fields win).
//! 2. A `setProps` immediately followed by `finalize` at the same `at` merges
//!    into a single `setProps`: the trailing `finalize` is folded into the
//!    pending `setProps`'s embedded `block` snapshot by setting
//!    `block.is_finalized = true`, and the now-redundant `finalize` patch is
//!    dropped. If the `setProps` carries no `block` snapshot to mark, the
//!    pair is left adjacent instead.
//! 3. Contiguous `appendLines` runs on the same block merge into one.
//! 4. An `insertChild` immediately followed by a `setProps` targeting the
//!    freshly inserted node folds the props into the `node.props` seed.
//! 5. Three or more `setProps` against *different* targets in the same batch
//!    convert to one `setPropsBatch`.

use crate::patch::{At, Patch, PropMap, PropValue};
use std::time::Duration;

/// Coalesce one diff batch's patches in place, returning the folded list.
pub fn coalesce(patches: Vec<Patch>) -> Vec<Patch> {
    let merged = merge_adjacent(patches);
    let merged = fold_insert_then_set_props(merged);
    batch_set_props(merged)
}

/// Wall-clock/size measurements taken while coalescing one batch, fed to the
/// Scheduler's rolling p95 sample for the adaptive budget (§4.4, §4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoalesceMetrics {
    /// Wall-clock time spent coalescing.
    pub duration: Duration,
    /// Number of patches before coalescing.
    pub input_len: usize,
    /// Number of patches after coalescing.
    pub output_len: usize,
}

impl CoalesceMetrics {
    /// Duration in milliseconds, as the scheduler's p95 sample expects.
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// Coalesce while measuring the duration, matching the Store/Scheduler
/// contract in §4.4 ("The coalescer measures its own wall time").
pub fn coalesce_with_metrics(patches: Vec<Patch>) -> (Vec<Patch>, CoalesceMetrics) {
    let input_len = patches.len();
    let start = std::time::Instant::now();
    let out = coalesce(patches);
    let duration = start.elapsed();
    let metrics = CoalesceMetrics {
        duration,
        input_len,
        output_len: out.len(),
    };
    (out, metrics)
}

fn same_target(a: &At, b: &At) -> bool {
    a.block_id == b.block_id && a.node_id == b.node_id && a.index_path == b.index_path
}

/// Whether `patch` merged into the tail of `out` in place (rules 1-3).
fn try_merge_into_tail(out: &mut [Patch], patch: &Patch) -> bool {
    let Some(last) = out.last_mut() else {
        return false;
    };
    match (last, patch) {
        (Patch::SetProps { at: prev_at, props: prev_props }, Patch::SetProps { at, props })
            if same_target(prev_at, at) =>
        {
            for (key, value) in props {
                prev_props.insert(key.clone(), value.clone());
            }
            true
        }
        (Patch::SetProps { at: prev_at, props: prev_props }, Patch::Finalize { at })
            if same_target(prev_at, at) =>
        {
            // Rule 2: fold the trailing `finalize` into the pending
            // `setProps`'s embedded block snapshot, rather than leaving a
            // redundant `finalize` patch behind. Only safe when the
            // `setProps` actually carries a `block` snapshot to mark, since
            // a field-only `setProps` has nowhere to record finalization.
            match prev_props.get_mut("block") {
                Some(PropValue::Block(block)) => {
                    block.is_finalized = true;
                    true
                }
                _ => false,
            }
        }
        (
            Patch::AppendLines { at: prev_at, lines: prev_lines, .. },
            Patch::AppendLines { at, start_index, lines },
        ) if prev_at.block_id == at.block_id
            && prev_at.node_id == at.node_id
            && prev_lines.last().map(|l| l.index + 1) == Some(*start_index) =>
        {
            prev_lines.extend(lines.iter().cloned());
            true
        }
        _ => false,
    }
}

/// Rules 1-3: merge patches that are adjacent in the batch and target the
/// same address.
fn merge_adjacent(patches: Vec<Patch>) -> Vec<Patch> {
    let mut out: Vec<Patch> = Vec::with_capacity(patches.len());
    for patch in patches {
        if try_merge_into_tail(&mut out, &patch) {
            continue;
        }
        out.push(patch);
    }
    out
}

/// Rule 4: `insertChild` immediately followed by `setProps` on the node it
/// just created folds the props into the insert's seed.
fn fold_insert_then_set_props(patches: Vec<Patch>) -> Vec<Patch> {
    let mut out: Vec<Patch> = Vec::with_capacity(patches.len());
    let mut iter = patches.into_iter().peekable();
    while let Some(patch) = iter.next() {
        match patch {
            Patch::InsertChild { at, index, mut node } => {
                if let Some(Patch::SetProps { at: set_at, .. }) = iter.peek() {
                    if set_at.block_id == node.block.id && set_at.node_id.is_none() {
                        if let Some(Patch::SetProps { props, .. }) = iter.next() {
                            let seed = node.props.get_or_insert_with(PropMap::new);
                            for (k, v) in props {
                                seed.insert(k, v);
                            }
                        }
                    }
                }
                out.push(Patch::InsertChild { at, index, node });
            }
            other => out.push(other),
        }
    }
    out
}

/// Rule 5: three or more `setProps` against distinct targets convert to a
/// single `setPropsBatch`, reducing per-patch dispatch overhead.
fn batch_set_props(patches: Vec<Patch>) -> Vec<Patch> {
    let set_props_count = patches
        .iter()
        .filter(|p| matches!(p, Patch::SetProps { .. }))
        .count();
    if set_props_count < 3 {
        return patches;
    }

    let mut entries = Vec::new();
    let mut rest = Vec::new();
    for patch in patches {
        match patch {
            Patch::SetProps { at, props } => entries.push((at, props)),
            other => rest.push(other),
        }
    }
    if !entries.is_empty() {
        rest.push(Patch::SetPropsBatch { entries });
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockKind, BlockPayload};
    use crate::patch::{CodeLine, NodeSpec};

    fn set_props(block_id: &str, key: &str, value: &str) -> Patch {
        let mut props = PropMap::new();
        props.insert(key.to_string(), PropValue::Str(value.to_string()));
        Patch::SetProps {
            at: At::block(block_id),
            props,
        }
    }

    #[test]
    fn merges_consecutive_set_props_same_target() {
        let patches = vec![
            set_props("a", "raw", "hel"),
            set_props("a", "raw", "hello"),
        ];
        let out = coalesce(patches);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Patch::SetProps { props, .. } => {
                assert_eq!(props.get("raw"), Some(&PropValue::Str("hello".into())));
            }
            _ => panic!("expected SetProps"),
        }
    }

    #[test]
    fn does_not_merge_different_targets() {
        let patches = vec![set_props("a", "raw", "x"), set_props("b", "raw", "y")];
        let out = coalesce(patches);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn merges_set_props_then_finalize_into_block_snapshot() {
        let mut block = Block::new("a", BlockKind::Paragraph, BlockPayload::text("hello"));
        block.is_finalized = false;
        let mut props = PropMap::new();
        props.insert("block".to_string(), PropValue::Block(Box::new(block)));
        let patches = vec![
            Patch::SetProps {
                at: At::block("a"),
                props,
            },
            Patch::Finalize { at: At::block("a") },
        ];
        let out = coalesce(patches);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Patch::SetProps { props, .. } => match props.get("block") {
                Some(PropValue::Block(block)) => assert!(block.is_finalized),
                _ => panic!("expected block snapshot"),
            },
            _ => panic!("expected SetProps"),
        }
    }

    #[test]
    fn leaves_set_props_and_finalize_adjacent_without_block_snapshot() {
        let patches = vec![set_props("a", "raw", "x"), Patch::Finalize { at: At::block("a") }];
        let out = coalesce(patches);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn merges_contiguous_append_lines() {
        let patches = vec![
            Patch::AppendLines {
                at: At::block("code"),
                start_index: 0,
                lines: vec![CodeLine {
                    index: 0,
                    text: "a".into(),
                    html: None,
                }],
            },
            Patch::AppendLines {
                at: At::block("code"),
                start_index: 1,
                lines: vec![CodeLine {
                    index: 1,
                    text: "b".into(),
                    html: None,
                }],
            },
        ];
        let out = coalesce(patches);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Patch::AppendLines { lines, .. } => assert_eq!(lines.len(), 2),
            _ => panic!("expected AppendLines"),
        }
    }

    #[test]
    fn folds_insert_then_set_props_into_seed() {
        let block = Block::new("b1", BlockKind::Paragraph, BlockPayload::text("x"));
        let insert = Patch::InsertChild {
            at: At::block("root"),
            index: 0,
            node: NodeSpec {
                block: block.clone(),
                props: None,
            },
        };
        let patches = vec![insert, set_props("b1", "raw", "x")];
        let out = coalesce(patches);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Patch::InsertChild { node, .. } => {
                assert!(node.props.as_ref().unwrap().contains_key("raw"));
            }
            _ => panic!("expected InsertChild"),
        }
    }

    #[test]
    fn converts_three_or_more_distinct_set_props_to_batch() {
        let patches = vec![
            set_props("a", "raw", "1"),
            set_props("b", "raw", "2"),
            set_props("c", "raw", "3"),
        ];
        let out = coalesce(patches);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Patch::SetPropsBatch { .. }));
    }

    #[test]
    fn leaves_small_batches_unconverted() {
        let patches = vec![set_props("a", "raw", "1"), set_props("b", "raw", "2")];
        let out = coalesce(patches);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn coalesce_with_metrics_reports_input_and_output_len() {
        let patches = vec![
            set_props("a", "raw", "hel"),
            set_props("a", "raw", "hello"),
        ];
        let (out, metrics) = coalesce_with_metrics(patches);
        assert_eq!(out.len(), 1);
        assert_eq!(metrics.input_len, 2);
        assert_eq!(metrics.output_len, 1);
        assert!(metrics.duration_ms() >= 0.0);
    }
}
