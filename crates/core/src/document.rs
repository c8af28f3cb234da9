//! `Document` (§9 Design Notes: "a Document value owns the parser state,
//! diff cursor, store, and scheduler"). This is the single entry point a
//! host (the `markflow-napi`/`markflow-wasm` adapters, or any other caller)
//! drives: it accepts the command vocabulary from §6 and returns the event
//! vocabulary from §6, wiring the Block Parser, Diff Engine, Patch
//! Coalescer, Renderer Store, and Commit Scheduler together exactly as the
//! control flow in spec.md §2 describes.

use crate::block::{Block, BlockKind, MdxStatus};
use crate::config::{DocPlugins, DocumentConfig, MdxCompileMode};
use crate::diff::diff_document;
use crate::error::{ErrorPhase, ParseDiagnostics};
use crate::external::{Collaborators, HighlightRequest};
use crate::frontmatter::{extract_frontmatter, FrontmatterExtraction};
use crate::parser::BlockParser;
use crate::patch::{At, Patch, PatchBatch, PropMap, PropValue};
use crate::scheduler::{EnqueueRequest, FlushResult, Scheduler};
use crate::store::Store;
use serde::{Deserialize, Serialize};

/// Parser input vocabulary (§6): `{type:"INIT"|"APPEND"|"FINALIZE"|
/// "SET_CREDITS"|"RESET", ...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentCommand {
    /// `{type:"INIT", initialContent, prewarmLangs[], docPlugins, mdx}`.
    Init(Box<InitCommand>),
    /// `{type:"APPEND", text}`.
    Append {
        /// Text appended to the stream.
        text: String,
    },
    /// `{type:"FINALIZE"}`.
    Finalize,
    /// `{type:"SET_CREDITS", credits:0..1}`: a throttling hint for the host
    /// (e.g. remaining render-budget share); stored but not interpreted by
    /// the core pipeline itself.
    SetCredits {
        /// New credits value, clamped to `[0, 1]` on application.
        credits: f32,
    },
    /// `{type:"RESET"}`.
    Reset,
}

/// Payload of `DocumentCommand::Init`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitCommand {
    /// Initial document content, consumed before the first tick.
    #[serde(default)]
    pub initial_content: String,
    /// Languages to prewarm the highlighter for (forwarded to the host;
    /// the core does not itself warm anything since highlighting is an
    /// external collaborator).
    #[serde(default)]
    pub prewarm_langs: Vec<String>,
    /// Document-level plugin flags.
    #[serde(default)]
    pub doc_plugins: DocPlugins,
    /// MDX compile mode.
    #[serde(default = "default_mdx_compile_mode")]
    pub mdx_compile_mode: MdxCompileMode,
}

fn default_mdx_compile_mode() -> MdxCompileMode {
    MdxCompileMode::Server
}

impl Default for InitCommand {
    fn default() -> Self {
        Self {
            initial_content: String::new(),
            prewarm_langs: Vec::new(),
            doc_plugins: DocPlugins::default(),
            mdx_compile_mode: MdxCompileMode::Server,
        }
    }
}

/// Parser output vocabulary (§6): `{type:"INITIALIZED"|"PATCH"|"RESET"|
/// "METRICS"|"ERROR", ...}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentEvent {
    /// `{type:"INITIALIZED", blocks[]}`.
    Initialized {
        /// Full block sequence after consuming the initial content.
        blocks: Vec<Block>,
    },
    /// `{type:"PATCH", tx, patches[], metrics?}`.
    Patch(PatchBatch),
    /// `{type:"RESET"}`.
    Reset,
    /// `{type:"METRICS", metrics}`.
    Metrics(EngineMetrics),
    /// `{type:"ERROR", phase, blockId?, error, meta?}`.
    Error {
        /// Pipeline phase the error originated in.
        phase: ErrorPhase,
        /// Block id the error concerns, if any.
        block_id: Option<String>,
        /// Human-readable error message.
        error: String,
    },
}

/// Diagnostic snapshot reported after a flush (§6 `METRICS`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineMetrics {
    /// Monotonically increasing tick counter.
    pub tick_count: u64,
    /// Current store version.
    pub store_version: u64,
    /// Combined scheduler queue depth at the time of the snapshot.
    pub scheduler_pending: usize,
    /// Whether the adaptive budget is currently halving batch caps.
    pub adaptive_active: bool,
}

/// Ties the Block Parser, Diff Engine, Patch Coalescer, Renderer Store, and
/// Commit Scheduler together into the single stateful value a host drives
/// (§9 Design Notes). Holds no threads of its own; the host calls
/// [`Document::pump`] at whatever cadence its event loop implies (§5).
pub struct Document {
    parser: BlockParser,
    store: Store,
    scheduler: Scheduler,
    collaborators: Collaborators,
    config: DocumentConfig,
    previous_blocks: Vec<Block>,
    tx_counter: u64,
    tick_count: u64,
    credits: f32,
    frontmatter: Option<FrontmatterExtraction>,
}

impl Document {
    /// Construct a `Document` with the given configuration and external
    /// collaborators (highlighter, sanitizer, MDX compiler).
    pub fn new(config: DocumentConfig, collaborators: Collaborators) -> Self {
        let parser = BlockParser::new(config.doc_plugins.clone());
        Self {
            parser,
            store: Store::new(),
            scheduler: Scheduler::new(config.scheduler.clone()),
            collaborators,
            config,
            previous_blocks: Vec::new(),
            tx_counter: 0,
            tick_count: 0,
            credits: 1.0,
            frontmatter: None,
        }
    }

    /// Drive the document with one command, returning the events it produced.
    pub fn handle(&mut self, cmd: DocumentCommand) -> Vec<DocumentEvent> {
        match cmd {
            DocumentCommand::Init(init) => self.handle_init(*init),
            DocumentCommand::Append { text } => self.handle_append(text),
            DocumentCommand::Finalize => self.handle_finalize(),
            DocumentCommand::SetCredits { credits } => {
                self.credits = credits.clamp(0.0, 1.0);
                Vec::new()
            }
            DocumentCommand::Reset => self.handle_reset(),
        }
    }

    fn handle_init(&mut self, init: InitCommand) -> Vec<DocumentEvent> {
        self.config.doc_plugins = init.doc_plugins.clone();
        self.config.mdx_compile_mode = init.mdx_compile_mode;
        self.config.prewarm_langs = init.prewarm_langs;
        self.parser = BlockParser::new(self.config.doc_plugins.clone());
        self.store = Store::new();
        self.scheduler = Scheduler::new(self.config.scheduler.clone());
        self.previous_blocks = Vec::new();
        self.tx_counter = 0;
        self.tick_count = 0;

        self.frontmatter = extract_frontmatter(&init.initial_content).ok();
        let body_start = self
            .frontmatter
            .as_ref()
            .map(|f| f.body_start)
            .unwrap_or(0);
        let body = &init.initial_content[body_start.min(init.initial_content.len())..];

        self.parser.append(body);
        let tick = self.parser.tick(self.collaborators.sanitizer.as_ref());
        let mut blocks = tick.blocks;
        self.compile_pending_mdx(&mut blocks);
        self.tick_count += 1;
        self.previous_blocks = blocks.clone();
        self.store.reset(&blocks);

        let mut events = vec![DocumentEvent::Initialized { blocks }];
        events.extend(self.diagnostics_to_events(tick.diagnostics));
        events
    }

    fn handle_append(&mut self, text: String) -> Vec<DocumentEvent> {
        self.parser.append(&text);
        let tick = self.parser.tick(self.collaborators.sanitizer.as_ref());
        let mut blocks = tick.blocks;
        self.compile_pending_mdx(&mut blocks);
        self.tick_count += 1;

        let mut events = self.diagnostics_to_events(tick.diagnostics);
        if let Some(event) = self.diff_and_enqueue(blocks) {
            events.push(event);
        }
        events
    }

    fn handle_finalize(&mut self) -> Vec<DocumentEvent> {
        let tick = self.parser.finalize(self.collaborators.sanitizer.as_ref());
        let mut blocks = tick.blocks;
        self.compile_pending_mdx(&mut blocks);
        self.tick_count += 1;

        let mut events = self.diagnostics_to_events(tick.diagnostics);
        if let Some(event) = self.diff_and_enqueue(blocks) {
            events.push(event);
        }
        match self.scheduler.flush_all(&mut self.store) {
            Ok(_) => {}
            Err(err) => events.push(DocumentEvent::Error {
                phase: ErrorPhase::Scheduler,
                block_id: None,
                error: err.to_string(),
            }),
        }
        events.push(DocumentEvent::Metrics(self.metrics_snapshot()));
        events
    }

    fn handle_reset(&mut self) -> Vec<DocumentEvent> {
        self.parser.reset();
        self.store = Store::new();
        self.scheduler = Scheduler::new(self.config.scheduler.clone());
        self.previous_blocks = Vec::new();
        self.tx_counter = 0;
        self.tick_count = 0;
        self.frontmatter = None;
        vec![DocumentEvent::Reset]
    }

    fn diff_and_enqueue(&mut self, blocks: Vec<Block>) -> Option<DocumentEvent> {
        let patches = diff_document(&self.previous_blocks, &blocks);
        self.previous_blocks = blocks;
        if patches.is_empty() {
            return None;
        }
        self.tx_counter += 1;
        let batch = PatchBatch::new(self.tx_counter, patches.clone());
        let req = EnqueueRequest::new(self.tx_counter, patches);
        if let Err(err) = self.scheduler.enqueue(req, &mut self.store) {
            log::error!("document: enqueue failed: {err}");
        }
        Some(DocumentEvent::Patch(batch))
    }

    fn diagnostics_to_events(&self, diagnostics: ParseDiagnostics) -> Vec<DocumentEvent> {
        diagnostics
            .errors
            .into_iter()
            .map(|err| DocumentEvent::Error {
                phase: ErrorPhase::Parse,
                block_id: None,
                error: err.to_string(),
            })
            .collect()
    }

    /// Synchronously compiles every `mdx`-kind block (recursively, including
    /// nested structural children) still pending compilation, stamping
    /// `meta.mdxStatus`/`compiledMdxRef` in place before the diff pass sees
    /// them (§4.2 "MDX detection", §6 MDX compile interface).
    fn compile_pending_mdx(&mut self, blocks: &mut [Block]) {
        if !self.config.doc_plugins.mdx {
            return;
        }
        for block in blocks {
            self.compile_pending_mdx_one(block);
        }
    }

    fn compile_pending_mdx_one(&mut self, block: &mut Block) {
        if block.kind == BlockKind::Mdx && block.payload.meta_str("mdxStatus") == Some("pending") {
            match self
                .collaborators
                .mdx_compiler
                .compile(&block.id, &block.payload.raw)
            {
                Ok(response) => {
                    block
                        .payload
                        .set_meta_str("mdxStatus", mdx_status_str(MdxStatus::Compiled));
                    block.payload.compiled_mdx_ref = Some(crate::block::CompiledMdxRef {
                        id: response.id,
                    });
                }
                Err(failure) => {
                    block
                        .payload
                        .set_meta_str("mdxStatus", mdx_status_str(MdxStatus::Error));
                    block.payload.set_meta_str("mdxError", failure.message);
                }
            }
        }
        for child in &mut block.payload.children {
            self.compile_pending_mdx_one(child);
        }
    }

    /// Pull-based highlight requests (§6): every `code-line` child lacking
    /// highlighted HTML, across every `code` block currently known.
    pub fn take_highlight_requests(&self) -> Vec<HighlightRequest> {
        let mut requests = Vec::new();
        for block in &self.previous_blocks {
            collect_highlight_requests(block, &mut requests);
        }
        requests
    }

    /// Apply a highlighter response: builds the `setProps` patch addressing
    /// the code-line node and enqueues it as its own (high-priority) batch.
    pub fn apply_highlight_response(&mut self, request: &HighlightRequest, html: String) {
        let patch = self.collaborators.highlighter.to_patch(request, html);
        self.tx_counter += 1;
        let req = EnqueueRequest::new(self.tx_counter, vec![patch]);
        if let Err(err) = self.scheduler.enqueue(req, &mut self.store) {
            log::error!("document: highlight response enqueue failed: {err}");
        }
    }

    /// Apply an MDX compiler response, when `mdx_compile_mode` is `Worker`
    /// and compilation happened out of process rather than synchronously
    /// in [`Document::compile_pending_mdx`].
    pub fn apply_mdx_response(&mut self, block_id: &str, compiled_id: String) {
        let mut props = PropMap::new();
        props.insert(
            "mdxStatus".into(),
            PropValue::Str(mdx_status_str(MdxStatus::Compiled).into()),
        );
        props.insert(
            "block".into(),
            match self.store.get_node(block_id) {
                Some(mut block) => {
                    block.payload.compiled_mdx_ref =
                        Some(crate::block::CompiledMdxRef { id: compiled_id });
                    block
                        .payload
                        .set_meta_str("mdxStatus", mdx_status_str(MdxStatus::Compiled));
                    PropValue::Block(Box::new(block))
                }
                None => return,
            },
        );
        self.tx_counter += 1;
        let patch = Patch::SetProps {
            at: At::block(block_id),
            props,
        };
        let req = EnqueueRequest::new(self.tx_counter, vec![patch]);
        if let Err(err) = self.scheduler.enqueue(req, &mut self.store) {
            log::error!("document: mdx response enqueue failed: {err}");
        }
    }

    /// Drive one scheduler dispatch under its configured budgets (§4.6,
    /// §5's suspension point "between scheduler dispatches").
    pub fn pump(&mut self) -> Option<FlushResult> {
        self.scheduler
            .pump(&mut self.store)
            .expect("scheduler dispatch never fails: apply errors are logged, not propagated")
    }

    /// Drain both scheduler queues immediately, ignoring budget.
    pub fn flush_all(&mut self) -> FlushResult {
        self.scheduler
            .flush_all(&mut self.store)
            .expect("scheduler dispatch never fails: apply errors are logged, not propagated")
    }

    /// Whether both scheduler queues are empty.
    pub fn await_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Pause scheduler dispatches.
    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    /// Resume scheduler dispatches.
    pub fn resume(&mut self) {
        self.scheduler.resume();
    }

    /// Top-level blocks currently committed to the store.
    pub fn get_blocks(&self) -> Vec<Block> {
        self.store.get_blocks()
    }

    /// A single committed node, reconstructed as a `Block`.
    pub fn get_node(&self, id: &str) -> Option<Block> {
        self.store.get_node(id)
    }

    /// Children of a committed node, reconstructed as `Block`s.
    pub fn get_children(&self, id: &str) -> Option<Vec<Block>> {
        self.store.get_children(id)
    }

    /// Current store version.
    pub fn store_version(&self) -> u64 {
        self.store.version()
    }

    /// Subscribe to post-commit store notifications (§4.5, §6 view
    /// subscription).
    pub fn subscribe(&mut self, listener: Box<dyn FnMut() + Send>) {
        self.store.subscribe(listener);
    }

    /// Parsed frontmatter, if the initial content carried any (§9 ambient
    /// supplement). `None` before `INIT` or when there was no frontmatter.
    pub fn frontmatter(&self) -> Option<&serde_json::Value> {
        self.frontmatter.as_ref().map(|f| &f.value)
    }

    fn metrics_snapshot(&self) -> EngineMetrics {
        EngineMetrics {
            tick_count: self.tick_count,
            store_version: self.store.version(),
            scheduler_pending: self.scheduler.pending_depth(),
            adaptive_active: self.scheduler.adaptive_active(),
        }
    }
}

fn mdx_status_str(status: MdxStatus) -> &'static str {
    match status {
        MdxStatus::Pending => "pending",
        MdxStatus::Compiled => "compiled",
        MdxStatus::Error => "error",
    }
}

fn collect_highlight_requests(block: &Block, out: &mut Vec<HighlightRequest>) {
    if block.kind == BlockKind::Code {
        let lang = block.payload.meta_str("lang").map(|s| s.to_string());
        for line in &block.payload.children {
            if line.payload.highlighted_html.is_none() {
                let index = line
                    .payload
                    .meta
                    .get("index")
                    .and_then(|v| match v {
                        crate::block::MetaValue::Num(n) => Some(*n as usize),
                        _ => None,
                    })
                    .unwrap_or(0);
                out.push(HighlightRequest {
                    block_id: block.id.clone(),
                    line_index: index,
                    text: line.payload.raw.clone(),
                    lang: lang.clone(),
                });
            }
        }
    }
    for child in &block.payload.children {
        collect_highlight_requests(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::InlineNode;
    use crate::config::DocumentConfig;

    fn doc() -> Document {
        Document::new(DocumentConfig::default(), Collaborators::default())
    }

    fn init(d: &mut Document, content: &str) -> Vec<DocumentEvent> {
        d.handle(DocumentCommand::Init(Box::new(InitCommand {
            initial_content: content.to_string(),
            ..InitCommand::default()
        })))
    }

    fn first_paragraph_inline(blocks: &[Block]) -> &Vec<InlineNode> {
        blocks
            .iter()
            .find(|b| b.kind == BlockKind::Paragraph)
            .and_then(|b| b.payload.inline.as_ref())
            .expect("paragraph with inline content")
    }

    /// E1: emphasis anticipation then completion.
    #[test]
    fn e1_emphasis_anticipation_then_completion() {
        let mut d = doc();
        init(&mut d, "");
        d.handle(DocumentCommand::Append {
            text: "This is *italic".into(),
        });
        d.flush_all();
        let blocks = d.get_blocks();
        let inline = first_paragraph_inline(&blocks);
        let em = inline
            .iter()
            .find(|n| matches!(n, InlineNode::Em { .. }))
            .expect("anticipated em node");
        match em {
            InlineNode::Em { children, status } => {
                assert_eq!(*status, crate::block::InlineStatus::Anticipated);
                match &children[0] {
                    InlineNode::Text { text } => {
                        assert_eq!(text, "italic");
                        assert!(!text.contains('*'));
                    }
                    _ => panic!("expected text child"),
                }
            }
            _ => unreachable!(),
        }

        d.handle(DocumentCommand::Append {
            text: " text*".into(),
        });
        d.flush_all();
        let blocks = d.get_blocks();
        let inline = first_paragraph_inline(&blocks);
        let em = inline
            .iter()
            .find(|n| matches!(n, InlineNode::Em { .. }))
            .expect("completed em node");
        match em {
            InlineNode::Em { children, status } => {
                assert_eq!(*status, crate::block::InlineStatus::Complete);
                match &children[0] {
                    InlineNode::Text { text } => assert_eq!(text, "italic text"),
                    _ => panic!("expected text child"),
                }
            }
            _ => unreachable!(),
        }
    }

    /// E2: code streaming emits `appendLines` for new lines only.
    #[test]
    fn e2_code_streaming_appends_only_new_lines() {
        let mut d = doc();
        init(&mut d, "");
        let events = d.handle(DocumentCommand::Append {
            text: "```ts\nconst a=1;\n".into(),
        });
        let patch_batches: Vec<&PatchBatch> = events
            .iter()
            .filter_map(|e| match e {
                DocumentEvent::Patch(b) => Some(b),
                _ => None,
            })
            .collect();
        assert!(!patch_batches.is_empty());
        d.flush_all();
        let blocks = d.get_blocks();
        let code = blocks.iter().find(|b| b.kind == BlockKind::Code).unwrap();
        assert_eq!(code.payload.children.len(), 1);
        assert_eq!(code.payload.children[0].payload.raw, "const a=1;");

        let events2 = d.handle(DocumentCommand::Append {
            text: "const b=2;\n```".into(),
        });
        let has_append_lines = events2.iter().any(|e| match e {
            DocumentEvent::Patch(b) => b
                .patches
                .iter()
                .any(|p| matches!(p, Patch::AppendLines { start_index, .. } if *start_index == 1)),
            _ => false,
        });
        assert!(has_append_lines, "expected appendLines starting at index 1");
        d.flush_all();
        let blocks = d.get_blocks();
        let code = blocks.iter().find(|b| b.kind == BlockKind::Code).unwrap();
        assert_eq!(code.payload.children.len(), 2);
        assert_eq!(code.payload.children[0].payload.raw, "const a=1;");
        assert_eq!(code.payload.children[1].payload.raw, "const b=2;");
        assert!(code.is_finalized);
    }

    /// E3: footnote synthesis only happens on finalize.
    #[test]
    fn e3_footnote_synthesis_on_finalize() {
        let mut d = doc();
        init(&mut d, "");
        d.handle(DocumentCommand::Append {
            text: "See[^1].\n\n[^1]: Note.".into(),
        });
        d.flush_all();
        let blocks = d.get_blocks();
        assert!(
            !blocks.iter().any(|b| b.kind == BlockKind::Footnotes),
            "footnotes block must not exist before finalize"
        );

        d.handle(DocumentCommand::Finalize);
        d.flush_all();
        let blocks = d.get_blocks();
        let footnotes = blocks
            .iter()
            .find(|b| b.kind == BlockKind::Footnotes)
            .expect("footnotes block after finalize");
        assert_eq!(footnotes.payload.children.len(), 1);

        let paragraph = blocks
            .iter()
            .find(|b| b.kind == BlockKind::Paragraph)
            .unwrap();
        let inline = paragraph.payload.inline.as_ref().unwrap();
        let footnote_ref = inline
            .iter()
            .find(|n| matches!(n, InlineNode::FootnoteRef { .. }))
            .unwrap();
        match footnote_ref {
            InlineNode::FootnoteRef { number, .. } => assert_eq!(*number, Some(1)),
            _ => unreachable!(),
        }
    }

    /// E4: reorder patch applied directly through the store.
    #[test]
    fn e4_reorder_patch_preserves_depth() {
        let mut d = doc();
        init(&mut d, "");
        d.flush_all();
        let a = Block::new("a", BlockKind::Paragraph, crate::block::BlockPayload::text("A"));
        let b = Block::new("b", BlockKind::Paragraph, crate::block::BlockPayload::text("B"));
        let c = Block::new("c", BlockKind::Paragraph, crate::block::BlockPayload::text("C"));
        d.store.reset(&[a, b, c]);
        d.store
            .apply_patches(&[Patch::Reorder {
                at: At::block(crate::diff::ROOT_ID),
                from: 2,
                to: 0,
                count: 1,
            }])
            .unwrap();
        let ids: Vec<String> = d.get_blocks().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    /// E5: duplicate-prevention on insert.
    #[test]
    fn e5_duplicate_insert_keeps_first() {
        let mut d = doc();
        init(&mut d, "");
        d.store.reset(&[]);
        let dup = Block::new("x", BlockKind::Paragraph, crate::block::BlockPayload::text("1"));
        let dup2 = Block::new("x", BlockKind::Paragraph, crate::block::BlockPayload::text("2"));
        d.store
            .apply_patches(&[
                Patch::InsertChild {
                    at: At::block(crate::diff::ROOT_ID),
                    index: 0,
                    node: crate::patch::NodeSpec {
                        block: dup,
                        props: None,
                    },
                },
                Patch::InsertChild {
                    at: At::block(crate::diff::ROOT_ID),
                    index: 1,
                    node: crate::patch::NodeSpec {
                        block: dup2,
                        props: None,
                    },
                },
            ])
            .unwrap();
        let blocks = d.get_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].payload.raw, "1");
    }

    /// E6: adaptive activation/deactivation hysteresis via Document-level flushes.
    #[test]
    fn e6_adaptive_activation_round_trip() {
        let mut d = doc();
        init(&mut d, "");
        for i in 0..6u32 {
            d.scheduler.record_coalescing_sample_for_test(8.0);
            let _ = i;
        }
        assert!(d.scheduler.adaptive_active());
        for _ in 0..6 {
            d.scheduler.record_coalescing_sample_for_test(2.0);
        }
        assert!(!d.scheduler.adaptive_active());
    }

    #[test]
    fn set_credits_clamps_to_unit_range() {
        let mut d = doc();
        d.handle(DocumentCommand::SetCredits { credits: 2.0 });
        assert_eq!(d.credits, 1.0);
        d.handle(DocumentCommand::SetCredits { credits: -1.0 });
        assert_eq!(d.credits, 0.0);
    }

    #[test]
    fn reset_clears_store_and_tx_counter() {
        let mut d = doc();
        init(&mut d, "hello");
        d.flush_all();
        assert!(!d.get_blocks().is_empty());
        d.handle(DocumentCommand::Reset);
        assert!(d.get_blocks().is_empty());
        assert_eq!(d.tx_counter, 0);
    }

    #[test]
    fn frontmatter_is_extracted_and_excluded_from_body() {
        let mut d = doc();
        init(&mut d, "---\ntitle: Hi\n---\n# Body");
        d.flush_all();
        assert_eq!(
            d.frontmatter()
                .and_then(|v| v.get("title"))
                .and_then(|v| v.as_str()),
            Some("Hi")
        );
        let blocks = d.get_blocks();
        assert!(blocks.iter().any(|b| b.kind == BlockKind::Heading));
    }
}
