//! Feature flags and scheduler configuration (§6).

use serde::{Deserialize, Serialize};

/// Which dispatch strategy the commit scheduler uses (§4.6, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Smallest latency; drains on the next microtask-equivalent tick.
    Microtask,
    /// One commit per frame; smoothest for animated view layers.
    Raf,
    /// Fallback timer-based dispatch when neither of the above is available.
    Timeout,
}

/// MDX compile mode requested at `INIT` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdxCompileMode {
    /// Compile on the same host process, synchronously from the caller's view.
    Server,
    /// Dispatch compilation to a worker-like executor.
    Worker,
}

/// Document-level plugin flags recognized at `INIT` (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocPlugins {
    /// Enable footnote parsing and synthesized `footnotes` block on finalize.
    pub footnotes: bool,
    /// Enable inline/block HTML with sanitization (disabled = treat as text).
    pub html: bool,
    /// Enable MDX detection + external compile requests.
    pub mdx: bool,
    /// Enable GFM tables.
    pub tables: bool,
    /// Enable callout blocks (`:::note`).
    pub callouts: bool,
    /// Enable `$...$` and `$$...$$` math.
    pub math: bool,
    /// Enable speculative inline closing ("format anticipation").
    ///
    /// Per §6, anticipation defaults off for math unless explicitly enabled
    /// per-kind; see [`DocPlugins::anticipation_enabled_for`].
    pub format_anticipation: bool,
}

impl Default for DocPlugins {
    fn default() -> Self {
        Self {
            footnotes: true,
            html: true,
            mdx: true,
            tables: true,
            callouts: true,
            math: true,
            format_anticipation: true,
        }
    }
}

/// The inline delimiter kinds anticipation can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnticipationKind {
    /// `*em*` / `_em_`.
    Emphasis,
    /// `**strong**`.
    Strong,
    /// `~~strike~~`.
    Strike,
    /// `` `code` ``.
    Code,
    /// `$...$` / `$$...$$`.
    Math,
}

impl DocPlugins {
    /// Whether format anticipation applies to a given delimiter kind.
    ///
    /// Math anticipation is gated by the master `format_anticipation` flag
    /// AND requires `math` itself to be enabled, since an anticipated math
    /// span with math disabled has no destination node type.
    pub fn anticipation_enabled_for(&self, kind: AnticipationKind) -> bool {
        if !self.format_anticipation {
            return false;
        }
        match kind {
            AnticipationKind::Math => self.math,
            _ => true,
        }
    }
}

/// Scheduler tuning knobs (§4.6, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerOptions {
    /// Wall-clock budget, per flush, for draining the high-priority queue.
    pub frame_budget_ms: f64,
    /// Wall-clock budget, per flush, for draining the low-priority queue
    /// after the high-priority queue is exhausted or budget remains.
    pub low_priority_frame_budget_ms: f64,
    /// Max high-priority batches drained per flush.
    pub max_batches_per_flush: usize,
    /// Max low-priority batches drained per flush.
    pub max_low_priority_batches_per_flush: usize,
    /// Pending-depth threshold that triggers a synchronous flush on enqueue.
    pub urgent_queue_threshold: usize,
    /// Dispatch strategy.
    pub batch: DispatchMode,
    /// Number of flush results retained by `getHistory`.
    pub history_limit: usize,
    /// Automatically switch microtask -> rAF after quiescence.
    pub adaptive_switch: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            frame_budget_ms: 8.0,
            low_priority_frame_budget_ms: 4.0,
            max_batches_per_flush: 16,
            max_low_priority_batches_per_flush: 8,
            urgent_queue_threshold: 64,
            batch: DispatchMode::Microtask,
            history_limit: 50,
            adaptive_switch: false,
        }
    }
}

/// Adaptive-budget activation threshold (§4.6): p95 above this halves caps.
pub const ADAPTIVE_ACTIVATE_THRESHOLD_MS: f64 = 6.0;
/// Adaptive-budget deactivation threshold (§4.6): p95 below this restores caps.
pub const ADAPTIVE_DEACTIVATE_THRESHOLD_MS: f64 = 4.0;

/// Top-level document configuration, assembled from an `INIT` message (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentConfig {
    /// Languages to prewarm the highlighter for.
    #[serde(default)]
    pub prewarm_langs: Vec<String>,
    /// Document-level plugin flags.
    #[serde(default)]
    pub doc_plugins: DocPlugins,
    /// MDX compile mode.
    #[serde(default = "default_mdx_compile_mode")]
    pub mdx_compile_mode: MdxCompileMode,
    /// Scheduler tuning knobs.
    #[serde(default)]
    pub scheduler: SchedulerOptions,
}

fn default_mdx_compile_mode() -> MdxCompileMode {
    MdxCompileMode::Server
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            prewarm_langs: Vec::new(),
            doc_plugins: DocPlugins::default(),
            mdx_compile_mode: default_mdx_compile_mode(),
            scheduler: SchedulerOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_anticipation_requires_math_enabled() {
        let mut plugins = DocPlugins::default();
        plugins.math = false;
        assert!(!plugins.anticipation_enabled_for(AnticipationKind::Math));
        assert!(plugins.anticipation_enabled_for(AnticipationKind::Emphasis));
    }

    #[test]
    fn anticipation_master_switch_disables_all() {
        let mut plugins = DocPlugins::default();
        plugins.format_anticipation = false;
        assert!(!plugins.anticipation_enabled_for(AnticipationKind::Emphasis));
        assert!(!plugins.anticipation_enabled_for(AnticipationKind::Code));
    }

    #[test]
    fn default_scheduler_options_are_sane() {
        let opts = SchedulerOptions::default();
        assert!(opts.frame_budget_ms > opts.low_priority_frame_budget_ms);
        assert_eq!(opts.batch, DispatchMode::Microtask);
    }
}
