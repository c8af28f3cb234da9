//! Commit Scheduler (§4.6): sits between the diff engine's patch batches and
//! the Store, applying them under a per-frame time budget across two
//! priority classes with adaptive throttling.
//!
//! §9 Design Notes: the three dispatch strategies (microtask/rAF/timeout)
//! have no meaning inside a library with no event loop of its own, so they
//! are modeled as a [`DispatchMode`](crate::config::DispatchMode) the host
//! records for its own use; the actual "schedule one work unit" primitive is
//! [`Scheduler::pump`], which the host's event loop (a GUI frame callback, a
//! tokio task, a synchronous CLI loop) calls at whatever cadence the chosen
//! mode implies.

use crate::coalesce::{coalesce_with_metrics, CoalesceMetrics};
use crate::config::{
    SchedulerOptions, ADAPTIVE_ACTIVATE_THRESHOLD_MS, ADAPTIVE_DEACTIVATE_THRESHOLD_MS,
};
use crate::error::MarkflowError;
use crate::patch::Patch;
use crate::store::Store;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Priority class a batch is dispatched under (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Light patches: typical `setProps`, small `insertChild` subtrees.
    High,
    /// Heavy patches: `setHTML`, or `setProps`/`setPropsBatch` carrying a
    /// whole embedded `Block` snapshot.
    Low,
}

/// Derive a batch's priority from its patch kinds, when the caller hasn't
/// classified it explicitly (§4.6: "If the caller has not classified, the
/// scheduler derives priority from patch kinds").
pub fn derive_priority(patches: &[Patch]) -> Priority {
    if patches.iter().any(Patch::is_heavy) {
        Priority::Low
    } else {
        Priority::High
    }
}

/// Request passed to [`Scheduler::enqueue`].
pub struct EnqueueRequest {
    /// Transaction id this batch corresponds to.
    pub tx: u64,
    /// The patches to enqueue.
    pub patches: Vec<Patch>,
    /// Explicit priority; `None` lets the scheduler derive one.
    pub priority: Option<Priority>,
    /// Whether `patches` has already been coalesced by the caller.
    pub coalesced: bool,
    /// Coalescing metrics, when `coalesced` is true and the caller measured
    /// them itself.
    pub metrics: Option<CoalesceMetrics>,
}

impl EnqueueRequest {
    /// Build a request that lets the scheduler derive priority and do its
    /// own coalescing.
    pub fn new(tx: u64, patches: Vec<Patch>) -> Self {
        Self {
            tx,
            patches,
            priority: None,
            coalesced: false,
            metrics: None,
        }
    }
}

struct QueuedBatch {
    tx: u64,
    patches: Vec<Patch>,
    priority: Priority,
    coalesced: bool,
    metrics: Option<CoalesceMetrics>,
    received_at: Instant,
}

/// Outcome of applying one queued batch, part of a [`FlushResult`].
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Transaction id of the applied batch.
    pub tx: u64,
    /// Priority class the batch was drained under.
    pub priority: Priority,
    /// Patch count before coalescing.
    pub patch_count: usize,
    /// Patch count actually applied to the store (post-coalescing).
    pub applied_patch_count: usize,
    /// Wall-clock time spent applying this batch (coalescing + store apply).
    pub duration_ms: f64,
    /// Time this batch sat in queue before being applied.
    pub queue_delay_ms: f64,
    /// Coalescing metrics for this batch, if coalescing ran.
    pub coalescing_metrics: Option<CoalesceMetrics>,
}

/// Adaptive budget state reported in a [`FlushResult`] (§4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveBudgetState {
    /// Whether the halved caps are currently in effect.
    pub active: bool,
    /// Effective high-priority batch cap for this flush.
    pub high_batch_cap: usize,
    /// Effective low-priority batch cap for this flush.
    pub low_batch_cap: usize,
    /// Rolling p95 of coalescing duration (ms) that drove this state.
    pub coalescing_duration_p95_ms: f64,
}

/// Summary of one scheduler-driven commit (§4.6 "Flush result").
#[derive(Debug, Clone)]
pub struct FlushResult {
    /// Per-batch outcomes, in application order.
    pub batches: Vec<BatchResult>,
    /// Total patches across all batches, pre-coalescing.
    pub total_patches: usize,
    /// Total patches actually applied, post-coalescing.
    pub total_applied_patches: usize,
    /// Total wall-clock duration of this flush.
    pub total_duration_ms: f64,
    /// Combined queue size (high + low) remaining after this flush.
    pub remaining_queue_size: usize,
    /// Combined queue size (high + low) before this flush began.
    pub queue_depth_before: usize,
    /// Adaptive budget state after this flush.
    pub adaptive_budget_state: AdaptiveBudgetState,
}

/// Two-priority, budget-bounded commit scheduler (§4.6).
pub struct Scheduler {
    config: SchedulerOptions,
    high: VecDeque<QueuedBatch>,
    low: VecDeque<QueuedBatch>,
    paused: bool,
    history: VecDeque<FlushResult>,
    coalescing_samples: VecDeque<f64>,
    adaptive_active: bool,
    flush_listeners: Vec<Box<dyn FnMut(&FlushResult) + Send>>,
}

/// How many rolling samples feed the adaptive-budget p95 (§4.6).
const ADAPTIVE_SAMPLE_WINDOW: usize = 20;

impl Scheduler {
    /// Construct a scheduler with the given tuning options.
    pub fn new(config: SchedulerOptions) -> Self {
        Self {
            config,
            high: VecDeque::new(),
            low: VecDeque::new(),
            paused: false,
            history: VecDeque::new(),
            coalescing_samples: VecDeque::new(),
            adaptive_active: false,
            flush_listeners: Vec::new(),
        }
    }

    /// Total pending batches across both queues.
    pub fn pending_depth(&self) -> usize {
        self.high.len() + self.low.len()
    }

    /// `enqueue({patches, meta})` (§4.6): adds a batch, deriving priority
    /// from patch kinds if the caller didn't classify it. If pending depth
    /// crosses `urgentQueueThreshold`, attempts an immediate synchronous
    /// flush (bounded by `frameBudgetMs`) before returning.
    pub fn enqueue(
        &mut self,
        req: EnqueueRequest,
        store: &mut Store,
    ) -> Result<Option<FlushResult>, MarkflowError> {
        if req.patches.is_empty() {
            return Ok(None);
        }
        let priority = req.priority.unwrap_or_else(|| derive_priority(&req.patches));
        let batch = QueuedBatch {
            tx: req.tx,
            patches: req.patches,
            priority,
            coalesced: req.coalesced,
            metrics: req.metrics,
            received_at: Instant::now(),
        };
        match priority {
            Priority::High => self.high.push_back(batch),
            Priority::Low => self.low.push_back(batch),
        }

        if !self.paused && self.pending_depth() >= self.config.urgent_queue_threshold {
            return self.pump(store).map(Some);
        }
        Ok(None)
    }

    /// `flushAll()` (§4.6): drain both queues ignoring budget and batch caps.
    pub fn flush_all(&mut self, store: &mut Store) -> Result<FlushResult, MarkflowError> {
        self.dispatch(store, None, None, None, None)
    }

    /// `pump()`: one dispatch, bounded by the configured frame budgets and
    /// batch caps (halved when the adaptive budget is active). Returns
    /// `None` if the scheduler is paused or both queues are empty.
    pub fn pump(&mut self, store: &mut Store) -> Result<Option<FlushResult>, MarkflowError> {
        if self.paused || self.pending_depth() == 0 {
            return Ok(None);
        }
        let high_budget = Duration::from_secs_f64(self.config.frame_budget_ms / 1000.0);
        let low_budget = Duration::from_secs_f64(self.config.low_priority_frame_budget_ms / 1000.0);
        let (high_cap, low_cap) = self.effective_caps();
        self.dispatch(
            store,
            Some(high_budget),
            Some(low_budget),
            Some(high_cap),
            Some(low_cap),
        )
        .map(Some)
    }

    fn effective_caps(&self) -> (usize, usize) {
        if self.adaptive_active {
            (
                (self.config.max_batches_per_flush / 2).max(1),
                (self.config.max_low_priority_batches_per_flush / 2).max(1),
            )
        } else {
            (
                self.config.max_batches_per_flush,
                self.config.max_low_priority_batches_per_flush,
            )
        }
    }

    fn dispatch(
        &mut self,
        store: &mut Store,
        high_budget: Option<Duration>,
        low_budget: Option<Duration>,
        high_cap: Option<usize>,
        low_cap: Option<usize>,
    ) -> Result<FlushResult, MarkflowError> {
        let queue_depth_before = self.pending_depth();
        let high_cap = high_cap.unwrap_or(usize::MAX);
        let low_cap = low_cap.unwrap_or(usize::MAX);
        let flush_start = Instant::now();
        let mut batches = Vec::new();
        let mut total_patches = 0;
        let mut total_applied_patches = 0;

        self.drain_queue(
            store,
            QueueSide::High,
            high_budget,
            high_cap,
            &mut batches,
            &mut total_patches,
            &mut total_applied_patches,
        )?;
        self.drain_queue(
            store,
            QueueSide::Low,
            low_budget,
            low_cap,
            &mut batches,
            &mut total_patches,
            &mut total_applied_patches,
        )?;

        let total_duration_ms = flush_start.elapsed().as_secs_f64() * 1000.0;
        let adaptive_budget_state = AdaptiveBudgetState {
            active: self.adaptive_active,
            high_batch_cap: high_cap,
            low_batch_cap: low_cap,
            coalescing_duration_p95_ms: self.p95_sample(),
        };
        let result = FlushResult {
            batches,
            total_patches,
            total_applied_patches,
            total_duration_ms,
            remaining_queue_size: self.pending_depth(),
            queue_depth_before,
            adaptive_budget_state,
        };

        self.history.push_back(result.clone());
        while self.history.len() > self.config.history_limit {
            self.history.pop_front();
        }
        self.notify_listeners(&result);

        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn drain_queue(
        &mut self,
        store: &mut Store,
        side: QueueSide,
        budget: Option<Duration>,
        cap: usize,
        out: &mut Vec<BatchResult>,
        total_patches: &mut usize,
        total_applied_patches: &mut usize,
    ) -> Result<(), MarkflowError> {
        let started = Instant::now();
        let mut drained = 0usize;
        loop {
            if drained >= cap {
                break;
            }
            if let Some(budget) = budget {
                if started.elapsed() >= budget {
                    break;
                }
            }
            let Some(batch) = (match side {
                QueueSide::High => self.high.pop_front(),
                QueueSide::Low => self.low.pop_front(),
            }) else {
                break;
            };

            let batch_start = Instant::now();
            let queue_delay_ms = batch_start.duration_since(batch.received_at).as_secs_f64() * 1000.0;
            let patch_count = batch.patches.len();

            let (to_apply, coalescing_metrics) = if batch.coalesced {
                (batch.patches, batch.metrics)
            } else {
                let (coalesced, metrics) = coalesce_with_metrics(batch.patches);
                (coalesced, Some(metrics))
            };
            if let Some(metrics) = coalescing_metrics {
                self.record_coalescing_sample(metrics.duration_ms());
            }

            let applied_patch_count = to_apply.len();
            match store.apply_patches(&to_apply) {
                Ok(_) => {}
                Err(err) => {
                    log::error!("scheduler: batch tx={} failed to apply: {err}", batch.tx);
                }
            }

            let duration_ms = batch_start.elapsed().as_secs_f64() * 1000.0;
            *total_patches += patch_count;
            *total_applied_patches += applied_patch_count;
            out.push(BatchResult {
                tx: batch.tx,
                priority: batch.priority,
                patch_count,
                applied_patch_count,
                duration_ms,
                queue_delay_ms,
                coalescing_metrics,
            });
            drained += 1;
        }
        Ok(())
    }

    fn record_coalescing_sample(&mut self, duration_ms: f64) {
        self.coalescing_samples.push_back(duration_ms);
        while self.coalescing_samples.len() > ADAPTIVE_SAMPLE_WINDOW {
            self.coalescing_samples.pop_front();
        }
        let p95 = self.p95_sample();
        if !self.adaptive_active && p95 > ADAPTIVE_ACTIVATE_THRESHOLD_MS {
            self.adaptive_active = true;
        } else if self.adaptive_active && p95 < ADAPTIVE_DEACTIVATE_THRESHOLD_MS {
            self.adaptive_active = false;
        }
    }

    fn p95_sample(&self) -> f64 {
        if self.coalescing_samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.coalescing_samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.saturating_sub(1).min(sorted.len() - 1);
        sorted[idx]
    }

    /// `awaitIdle()`: both queues empty (there is no in-flight async commit
    /// in this single-threaded, pump-driven design, so this reduces to a
    /// queue-emptiness check per §4.6/§5).
    pub fn is_idle(&self) -> bool {
        self.pending_depth() == 0
    }

    /// `pause()`: stop future dispatches, retaining queued batches.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// `resume()`: allow dispatches again.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// `restart()` (§5 cancellation): discard both queues. Does not reset
    /// adaptive-budget state or history, which remain meaningful diagnostics
    /// across a restart.
    pub fn restart(&mut self) {
        self.high.clear();
        self.low.clear();
    }

    /// `addFlushListener(listener)`: receives a flush result after each
    /// commit. A listener that panics is caught and isolated (§4.6, §7e).
    pub fn add_flush_listener(&mut self, listener: Box<dyn FnMut(&FlushResult) + Send>) {
        self.flush_listeners.push(listener);
    }

    fn notify_listeners(&mut self, result: &FlushResult) {
        for listener in &mut self.flush_listeners {
            let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(result);
            }));
            if caught.is_err() {
                log::error!("scheduler: flush listener panicked; isolating");
            }
        }
    }

    /// `getHistory(limit?)`: recent flush results, most recent last.
    pub fn get_history(&self, limit: Option<usize>) -> Vec<&FlushResult> {
        let all: Vec<&FlushResult> = self.history.iter().collect();
        match limit {
            Some(n) if n < all.len() => all[all.len() - n..].to_vec(),
            _ => all,
        }
    }

    /// Whether the adaptive budget is currently halving batch caps.
    pub fn adaptive_active(&self) -> bool {
        self.adaptive_active
    }

    /// Feed a coalescing duration sample directly, bypassing a real flush.
    /// Exists so callers outside this module can exercise the adaptive
    /// hysteresis in tests without driving a full scheduler/store cycle.
    #[cfg(test)]
    pub(crate) fn record_coalescing_sample_for_test(&mut self, duration_ms: f64) {
        self.record_coalescing_sample(duration_ms);
    }
}

enum QueueSide {
    High,
    Low,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockKind, BlockPayload};
    use crate::patch::{At, NodeSpec, PropMap, PropValue};

    fn set_props_patch(id: &str) -> Patch {
        let mut props = PropMap::new();
        props.insert("raw".into(), PropValue::Str("x".into()));
        Patch::SetProps {
            at: At::block(id),
            props,
        }
    }

    fn insert_patch(id: &str, index: usize) -> Patch {
        Patch::InsertChild {
            at: At::block(crate::diff::ROOT_ID),
            index,
            node: NodeSpec {
                block: Block::new(id, BlockKind::Paragraph, BlockPayload::text("x")),
                props: None,
            },
        }
    }

    #[test]
    fn light_patches_derive_high_priority() {
        let patches = vec![insert_patch("a", 0)];
        assert_eq!(derive_priority(&patches), Priority::High);
    }

    #[test]
    fn set_html_derives_low_priority() {
        let patches = vec![Patch::SetHtml {
            at: At::block("a"),
            html: "<p>x</p>".into(),
            sanitized: None,
            block: None,
        }];
        assert_eq!(derive_priority(&patches), Priority::Low);
    }

    #[test]
    fn flush_all_drains_both_queues() {
        let mut store = Store::new();
        store.reset(&[]);
        let mut scheduler = Scheduler::new(SchedulerOptions::default());
        scheduler
            .enqueue(EnqueueRequest::new(1, vec![insert_patch("a", 0)]), &mut store)
            .unwrap();
        scheduler
            .enqueue(
                EnqueueRequest::new(
                    2,
                    vec![Patch::SetHtml {
                        at: At::block("a"),
                        html: "<p>y</p>".into(),
                        sanitized: None,
                        block: None,
                    }],
                ),
                &mut store,
            )
            .unwrap();
        assert_eq!(scheduler.pending_depth(), 2);
        let result = scheduler.flush_all(&mut store).unwrap();
        assert_eq!(result.batches.len(), 2);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn pause_retains_queue_without_dispatch() {
        let mut store = Store::new();
        store.reset(&[]);
        let mut scheduler = Scheduler::new(SchedulerOptions::default());
        scheduler.pause();
        scheduler
            .enqueue(EnqueueRequest::new(1, vec![insert_patch("a", 0)]), &mut store)
            .unwrap();
        assert_eq!(scheduler.pending_depth(), 1);
        let result = scheduler.pump(&mut store).unwrap();
        assert!(result.is_none());
        assert_eq!(scheduler.pending_depth(), 1);
        scheduler.resume();
        let result = scheduler.pump(&mut store).unwrap();
        assert!(result.is_some());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn restart_discards_queues() {
        let mut store = Store::new();
        store.reset(&[]);
        let mut scheduler = Scheduler::new(SchedulerOptions::default());
        scheduler
            .enqueue(EnqueueRequest::new(1, vec![insert_patch("a", 0)]), &mut store)
            .unwrap();
        scheduler.restart();
        assert!(scheduler.is_idle());
    }

    #[test]
    fn urgent_threshold_triggers_synchronous_flush() {
        let mut store = Store::new();
        store.reset(&[]);
        let mut opts = SchedulerOptions::default();
        opts.urgent_queue_threshold = 1;
        let mut scheduler = Scheduler::new(opts);
        let result = scheduler
            .enqueue(EnqueueRequest::new(1, vec![insert_patch("a", 0)]), &mut store)
            .unwrap();
        assert!(result.is_some());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn adaptive_budget_activates_and_deactivates_with_hysteresis() {
        let mut scheduler = Scheduler::new(SchedulerOptions::default());
        for _ in 0..6 {
            scheduler.record_coalescing_sample(8.0);
        }
        assert!(scheduler.adaptive_active());
        let (high_cap, low_cap) = scheduler.effective_caps();
        assert_eq!(high_cap, scheduler.config.max_batches_per_flush / 2);
        assert_eq!(low_cap, scheduler.config.max_low_priority_batches_per_flush / 2);

        for _ in 0..6 {
            scheduler.record_coalescing_sample(2.0);
        }
        assert!(!scheduler.adaptive_active());
    }

    #[test]
    fn get_history_respects_limit() {
        let mut store = Store::new();
        store.reset(&[]);
        let mut scheduler = Scheduler::new(SchedulerOptions::default());
        for i in 0..3u64 {
            scheduler
                .enqueue(
                    EnqueueRequest::new(i, vec![insert_patch(&format!("a{i}"), 0)]),
                    &mut store,
                )
                .unwrap();
            scheduler.flush_all(&mut store).unwrap();
        }
        let history = scheduler.get_history(Some(2));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn flush_listener_panic_is_isolated() {
        let mut store = Store::new();
        store.reset(&[]);
        let mut scheduler = Scheduler::new(SchedulerOptions::default());
        scheduler.add_flush_listener(Box::new(|_result| {
            panic!("boom");
        }));
        scheduler
            .enqueue(EnqueueRequest::new(1, vec![insert_patch("a", 0)]), &mut store)
            .unwrap();
        let result = scheduler.flush_all(&mut store);
        assert!(result.is_ok());
    }
}
