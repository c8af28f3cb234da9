//! Fenced-code-block boundary detection.
//!
//! Tracks fence open/close state line by line so the block parser can
//! decide, for each incoming line, whether it belongs to an in-progress
//! code block or starts/ends one.

/// Fence parsing phases tracked across lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FencePhase {
    /// Not currently inside a fence.
    #[default]
    Outside,
    /// Within fence contents.
    InsideFence,
}

/// Current fence state (phase, marker, indent, and length).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceState {
    /// Current fence phase.
    pub phase: FencePhase,
    /// Fence marker character (` or ~).
    pub marker: Option<char>,
    /// Leading whitespace count captured at opening.
    pub indent: usize,
    /// Length of the opening fence (number of ` or ~ characters).
    pub length: usize,
}

impl Default for FenceState {
    fn default() -> Self {
        FenceState {
            phase: FencePhase::Outside,
            marker: None,
            indent: 0,
            length: 0,
        }
    }
}

/// Outcome of processing a single line for fence state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineParseOutcome {
    /// State to carry into the next line.
    pub next_state: FenceState,
    /// Whether this line is fence content (inside a code block).
    pub inside_fence: bool,
    /// Whether this line is the opening fence marker line.
    pub is_opener: bool,
    /// Whether this line is the closing fence marker line.
    pub is_closer: bool,
    /// Info string from the opener line (e.g. the language tag), if any.
    pub info_string: Option<String>,
}

/// Advance fence state based on a single line of text.
pub fn advance_fence_state(line: &str, state: FenceState) -> LineParseOutcome {
    let (visual_indent, byte_offset) = leading_whitespace_info(line);
    let after_indent = &line[byte_offset..];

    let mut next_state = state;
    let mut inside_fence = matches!(state.phase, FencePhase::InsideFence);
    let mut is_opener = false;
    let mut is_closer = false;
    let mut info_string = None;

    if matches!(state.phase, FencePhase::Outside) && visual_indent <= 3 {
        if let Some((marker, length)) = detect_fence_marker_with_length(after_indent) {
            next_state = FenceState {
                phase: FencePhase::InsideFence,
                marker: Some(marker),
                indent: visual_indent,
                length,
            };
            inside_fence = true;
            is_opener = true;
            info_string = extract_info_string(after_indent, length);
        }
    } else if matches!(state.phase, FencePhase::InsideFence)
        && visual_indent <= 3
        && is_closing_fence(after_indent)
    {
        if let Some((marker, closer_len)) = detect_fence_marker_with_length(after_indent)
            && Some(marker) == state.marker
            && closer_len >= state.length
        {
            next_state = FenceState::default();
            inside_fence = true;
            is_closer = true;
        }
    }

    LineParseOutcome {
        next_state,
        inside_fence,
        is_opener,
        is_closer,
        info_string,
    }
}

/// Returns (visual_columns, byte_offset) for leading whitespace.
/// Visual columns expand tabs to 4-column boundaries per CommonMark.
fn leading_whitespace_info(line: &str) -> (usize, usize) {
    let mut col = 0;
    let mut bytes = 0;
    for b in line.bytes() {
        match b {
            b' ' => {
                col += 1;
                bytes += 1;
            }
            b'\t' => {
                col += 4 - (col % 4);
                bytes += 1;
            }
            _ => break,
        }
    }
    (col, bytes)
}

fn detect_fence_marker_with_length(after_indent: &str) -> Option<(char, usize)> {
    let mut chars = after_indent.chars();
    let first = chars.next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let run_len = 1 + chars.take_while(|c| *c == first).count();
    if run_len >= 3 {
        Some((first, run_len))
    } else {
        None
    }
}

fn is_closing_fence(after_indent: &str) -> bool {
    let mut chars = after_indent.chars();
    let first = match chars.next() {
        Some(c) if c == '`' || c == '~' => c,
        _ => return false,
    };
    let mut count = 1;
    for c in chars.by_ref() {
        if c == first {
            count += 1;
        } else {
            return count >= 3 && c.is_whitespace() && chars.all(|c| c.is_whitespace());
        }
    }
    count >= 3
}

fn extract_info_string(after_indent: &str, marker_len: usize) -> Option<String> {
    let rest = after_indent.chars().skip(marker_len).collect::<String>();
    let trimmed = rest.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_closes_backtick_fence() {
        let start = advance_fence_state("```ts", FenceState::default());
        assert!(start.inside_fence);
        assert!(start.is_opener);
        assert_eq!(start.info_string.as_deref(), Some("ts"));
        assert!(matches!(start.next_state.phase, FencePhase::InsideFence));

        let inner = advance_fence_state("const a=1;", start.next_state);
        assert!(inner.inside_fence);
        assert!(!inner.is_opener);

        let end = advance_fence_state("```", inner.next_state);
        assert!(end.is_closer);
        assert!(matches!(end.next_state.phase, FencePhase::Outside));
    }

    #[test]
    fn deeply_indented_fence_not_opened() {
        let outcome = advance_fence_state("    ```js", FenceState::default());
        assert!(!outcome.inside_fence);
        assert!(matches!(outcome.next_state.phase, FencePhase::Outside));
    }

    #[test]
    fn four_backtick_fence_contains_three_backtick() {
        let start = advance_fence_state("````markdown", FenceState::default());
        assert_eq!(start.next_state.length, 4);

        let inner_open = advance_fence_state("```js", start.next_state);
        assert!(!inner_open.is_closer);
        assert!(matches!(
            inner_open.next_state.phase,
            FencePhase::InsideFence
        ));

        let outer_close = advance_fence_state("````", inner_open.next_state);
        assert!(outer_close.is_closer);
        assert!(matches!(outer_close.next_state.phase, FencePhase::Outside));
    }

    #[test]
    fn mismatched_marker_does_not_close() {
        let start = advance_fence_state("~~~ts", FenceState::default());
        let still_inside = advance_fence_state("```", start.next_state);
        assert!(!still_inside.is_closer);
        assert!(matches!(
            still_inside.next_state.phase,
            FencePhase::InsideFence
        ));
    }

    #[test]
    fn requires_three_markers_to_open() {
        let outcome = advance_fence_state("``", FenceState::default());
        assert!(!outcome.inside_fence);
    }

    #[test]
    fn longer_fence_closes_shorter_opener() {
        let start = advance_fence_state("```", FenceState::default());
        let inner = advance_fence_state("content", start.next_state);
        let close = advance_fence_state("`````", inner.next_state);
        assert!(close.is_closer);
    }
}
