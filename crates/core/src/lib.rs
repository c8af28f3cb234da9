//! `markflow-core`: a streaming Markdown/MDX incremental rendering engine.
//!
//! Drives a parse -> diff -> coalesce -> commit pipeline (§1-§9): a
//! [`parser::BlockParser`] turns appended text into a block tree, the
//! [`diff`] module turns two block trees into a [`patch::Patch`] list, the
//! [`coalesce`] module folds a batch of those down before it reaches the
//! [`scheduler::Scheduler`], which applies them against a [`store::Store`]
//! under a time budget. [`document::Document`] wires all of this into the
//! single value a host drives.

pub mod block;
pub mod coalesce;
pub mod config;
pub mod diff;
pub mod document;
pub mod error;
pub mod external;
pub mod frontmatter;
pub mod parser;
pub mod patch;
pub mod scheduler;
pub mod store;

pub use block::{Block, BlockKind, BlockPayload, InlineNode, InlineStatus, MdxStatus};
pub use coalesce::{coalesce, coalesce_with_metrics, CoalesceMetrics};
pub use config::{DocPlugins, DocumentConfig, MdxCompileMode, SchedulerOptions};
pub use diff::diff_document;
pub use document::{Document, DocumentCommand, DocumentEvent, EngineMetrics, InitCommand};
pub use error::{ErrorPhase, MarkflowError, ParseDiagnostics};
pub use external::{
    Collaborators, HighlightRequest, Highlighter, LolHtmlSanitizer, MdxCompileFailure,
    MdxCompileResponse, MdxCompiler, MdxjsCompiler, NoopHighlighter, NoopSanitizer, Sanitizer,
};
pub use patch::{At, CodeLine, NodeSpec, Patch, PatchBatch, PropMap, PropValue};
pub use scheduler::{
    AdaptiveBudgetState, BatchResult, EnqueueRequest, FlushResult, Priority, Scheduler,
};
pub use store::Store;
