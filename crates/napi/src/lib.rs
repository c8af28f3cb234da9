#![deny(missing_docs)]
//! Node.js bindings over `markflow-core`'s streaming `Document` state
//! machine.
//!
//! Every call crosses the FFI boundary as JSON rather than as hand-mapped
//! `#[napi(object)]` structs: `Document`'s command/event vocabulary (§6) is
//! already a tagged-union shape `markflow_core::document` derives
//! `Serialize`/`Deserialize` for, so `MarkflowDocument::handle` just forwards
//! the JSON a JS caller sends and returns the JSON the events serialize to.

use markflow_core::{
    Collaborators, Document, DocumentCommand, DocumentConfig, DocumentEvent, HighlightRequest,
};
use napi::bindgen_prelude::*;
use napi_derive::napi;

fn to_js<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|err| Error::from_reason(format!("serialize error: {err}")))
}

fn events_to_js(events: Vec<DocumentEvent>) -> Result<serde_json::Value> {
    to_js(&events)
}

/// A single streaming document, driven by JSON-encoded commands and
/// reporting JSON-encoded events (markflow-core's `Document`, §9).
///
/// Constructed with the default collaborator set (`NoopHighlighter`,
/// `LolHtmlSanitizer`, `MdxjsCompiler`). A real syntax highlighter lives on
/// the Node side of the boundary: it round-trips through
/// `takeHighlightRequests`/`applyHighlightResponse` rather than through the
/// `Highlighter` trait, since JS highlighters are rarely synchronous.
#[napi]
pub struct MarkflowDocument {
    inner: Document,
}

#[napi]
impl MarkflowDocument {
    /// Construct a document. `config`, if given, is the JSON encoding of
    /// `DocumentConfig` (all fields optional, camelCase keys).
    #[napi(constructor)]
    pub fn new(config: Option<serde_json::Value>) -> Result<Self> {
        let config: DocumentConfig = match config {
            Some(value) => serde_json::from_value(value)
                .map_err(|err| Error::from_reason(format!("invalid config: {err}")))?,
            None => DocumentConfig::default(),
        };
        Ok(Self {
            inner: Document::new(config, Collaborators::default()),
        })
    }

    /// Drive the document with one JSON-encoded command (§6), returning the
    /// JSON-encoded events it produced.
    #[napi]
    pub fn handle(&mut self, command: serde_json::Value) -> Result<serde_json::Value> {
        let command: DocumentCommand = serde_json::from_value(command)
            .map_err(|err| Error::from_reason(format!("invalid command: {err}")))?;
        events_to_js(self.inner.handle(command))
    }

    /// Drive one scheduler dispatch under its configured time/batch budgets.
    /// Returns `null` when both queues were already empty.
    #[napi]
    pub fn pump(&mut self) -> Result<Option<serde_json::Value>> {
        match self.inner.pump() {
            Some(result) => Ok(Some(to_js(&result)?)),
            None => Ok(None),
        }
    }

    /// Drain both scheduler queues immediately, ignoring budget.
    #[napi(js_name = "flushAll")]
    pub fn flush_all(&mut self) -> Result<serde_json::Value> {
        to_js(&self.inner.flush_all())
    }

    /// Whether both scheduler queues are currently empty.
    #[napi(js_name = "isIdle")]
    pub fn is_idle(&self) -> bool {
        self.inner.await_idle()
    }

    /// Pause scheduler dispatches; enqueued patches keep accumulating.
    #[napi]
    pub fn pause(&mut self) {
        self.inner.pause();
    }

    /// Resume scheduler dispatches after `pause`.
    #[napi]
    pub fn resume(&mut self) {
        self.inner.resume();
    }

    /// Top-level blocks currently committed to the store.
    #[napi(js_name = "getBlocks")]
    pub fn get_blocks(&self) -> Result<serde_json::Value> {
        to_js(&self.inner.get_blocks())
    }

    /// A single committed node, reconstructed as a block, or `null`.
    #[napi(js_name = "getNode")]
    pub fn get_node(&self, id: String) -> Result<Option<serde_json::Value>> {
        match self.inner.get_node(&id) {
            Some(block) => Ok(Some(to_js(&block)?)),
            None => Ok(None),
        }
    }

    /// Children of a committed node, reconstructed as blocks, or `null` if
    /// the node doesn't exist.
    #[napi(js_name = "getChildren")]
    pub fn get_children(&self, id: String) -> Result<Option<serde_json::Value>> {
        match self.inner.get_children(&id) {
            Some(children) => Ok(Some(to_js(&children)?)),
            None => Ok(None),
        }
    }

    /// Current store version, bumped on every commit.
    #[napi(js_name = "storeVersion")]
    pub fn store_version(&self) -> i64 {
        self.inner.store_version() as i64
    }

    /// Pull-based highlight requests outstanding across the current block
    /// tree (one per `code-line` child still lacking highlighted HTML).
    #[napi(js_name = "takeHighlightRequests")]
    pub fn take_highlight_requests(&self) -> Result<serde_json::Value> {
        to_js(&self.inner.take_highlight_requests())
    }

    /// Apply a highlighter response for a request returned earlier by
    /// `takeHighlightRequests` (echoed back verbatim) plus the highlighted
    /// HTML, enqueuing the resulting patch as its own high-priority batch.
    #[napi(js_name = "applyHighlightResponse")]
    pub fn apply_highlight_response(
        &mut self,
        request: serde_json::Value,
        html: String,
    ) -> Result<()> {
        let request: HighlightRequest = serde_json::from_value(request)
            .map_err(|err| Error::from_reason(format!("invalid highlight request: {err}")))?;
        self.inner.apply_highlight_response(&request, html);
        Ok(())
    }

    /// Apply an out-of-process MDX compile response (`mdxCompileMode:
    /// "worker"`).
    #[napi(js_name = "applyMdxResponse")]
    pub fn apply_mdx_response(&mut self, block_id: String, compiled_id: String) {
        self.inner.apply_mdx_response(&block_id, compiled_id);
    }

    /// Parsed YAML frontmatter from the most recent `INIT`, or `null`.
    #[napi]
    pub fn frontmatter(&self) -> Option<serde_json::Value> {
        self.inner.frontmatter().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn init_then_append_round_trips_through_json() {
        let mut doc = MarkflowDocument::new(None).unwrap();
        let events = doc
            .handle(json!({"type": "INIT", "initialContent": "# Hi"}))
            .unwrap();
        assert_eq!(events[0]["type"], "INITIALIZED");

        let events = doc
            .handle(json!({"type": "APPEND", "text": "\n\nMore text."}))
            .unwrap();
        assert!(events.as_array().unwrap().iter().any(|e| e["type"] == "PATCH"));

        doc.flush_all().unwrap();
        let blocks = doc.get_blocks().unwrap();
        assert!(blocks.as_array().unwrap().len() >= 2);
    }

    #[test]
    fn rejects_malformed_command() {
        let mut doc = MarkflowDocument::new(None).unwrap();
        let err = doc.handle(json!({"type": "NOT_A_COMMAND"})).unwrap_err();
        assert!(err.reason.contains("invalid command"));
    }

    #[test]
    fn finalize_reports_metrics_event() {
        let mut doc = MarkflowDocument::new(None).unwrap();
        doc.handle(json!({"type": "INIT", "initialContent": ""}))
            .unwrap();
        let events = doc.handle(json!({"type": "FINALIZE"})).unwrap();
        let events = events.as_array().unwrap();
        assert!(events.iter().any(|e| e["type"] == "METRICS"));
    }
}
