//! Browser/WASM bindings over `markflow-core`'s streaming `Document` state
//! machine.
//!
//! Like the napi crate, every call crosses the FFI boundary as a JSON-shaped
//! value rather than as hand-mapped `#[wasm_bindgen]` structs: `Document`'s
//! command/event vocabulary (§6) already derives `Serialize`/`Deserialize`,
//! so `MarkflowDocument::handle` just forwards the JS value a caller sends
//! (via `serde-wasm-bindgen`) and returns the value the events serialize to.

use markflow_core::{
    Collaborators, Document, DocumentCommand, DocumentConfig, DocumentEvent, HighlightRequest,
};
use wasm_bindgen::prelude::*;

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsError> {
    serde_wasm_bindgen::to_value(value).map_err(|err| JsError::new(&format!("serialize error: {err}")))
}

fn events_to_js(events: Vec<DocumentEvent>) -> Result<JsValue, JsError> {
    to_js(&events)
}

/// A single streaming document, driven by JS-value-encoded commands and
/// reporting JS-value-encoded events (markflow-core's `Document`, §9).
///
/// Constructed with the default collaborator set (`NoopHighlighter`,
/// `LolHtmlSanitizer`, `MdxjsCompiler`). A real syntax highlighter lives on
/// the JS side of the boundary: it round-trips through
/// `takeHighlightRequests`/`applyHighlightResponse` rather than through the
/// `Highlighter` trait, since browser highlighters are rarely synchronous.
#[wasm_bindgen]
pub struct MarkflowDocument {
    inner: Document,
}

#[wasm_bindgen]
impl MarkflowDocument {
    /// Construct a document. `config`, if given, is the JS encoding of
    /// `DocumentConfig` (all fields optional, camelCase keys).
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<MarkflowDocument, JsError> {
        let config: DocumentConfig = if config.is_undefined() || config.is_null() {
            DocumentConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)
                .map_err(|err| JsError::new(&format!("invalid config: {err}")))?
        };
        Ok(Self {
            inner: Document::new(config, Collaborators::default()),
        })
    }

    /// Drive the document with one JS-encoded command (§6), returning the
    /// JS-encoded events it produced.
    #[wasm_bindgen]
    pub fn handle(&mut self, command: JsValue) -> Result<JsValue, JsError> {
        let command: DocumentCommand = serde_wasm_bindgen::from_value(command)
            .map_err(|err| JsError::new(&format!("invalid command: {err}")))?;
        events_to_js(self.inner.handle(command))
    }

    /// Drive one scheduler dispatch under its configured time/batch budgets.
    /// Returns `undefined` when both queues were already empty.
    #[wasm_bindgen]
    pub fn pump(&mut self) -> Result<JsValue, JsError> {
        match self.inner.pump() {
            Some(result) => to_js(&result),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Drain both scheduler queues immediately, ignoring budget.
    #[wasm_bindgen(js_name = flushAll)]
    pub fn flush_all(&mut self) -> Result<JsValue, JsError> {
        to_js(&self.inner.flush_all())
    }

    /// Whether both scheduler queues are currently empty.
    #[wasm_bindgen(js_name = isIdle)]
    pub fn is_idle(&self) -> bool {
        self.inner.await_idle()
    }

    /// Pause scheduler dispatches; enqueued patches keep accumulating.
    #[wasm_bindgen]
    pub fn pause(&mut self) {
        self.inner.pause();
    }

    /// Resume scheduler dispatches after `pause`.
    #[wasm_bindgen]
    pub fn resume(&mut self) {
        self.inner.resume();
    }

    /// Top-level blocks currently committed to the store.
    #[wasm_bindgen(js_name = getBlocks)]
    pub fn get_blocks(&self) -> Result<JsValue, JsError> {
        to_js(&self.inner.get_blocks())
    }

    /// A single committed node, reconstructed as a block, or `undefined`.
    #[wasm_bindgen(js_name = getNode)]
    pub fn get_node(&self, id: String) -> Result<JsValue, JsError> {
        match self.inner.get_node(&id) {
            Some(block) => to_js(&block),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Children of a committed node, reconstructed as blocks, or `undefined`
    /// if the node doesn't exist.
    #[wasm_bindgen(js_name = getChildren)]
    pub fn get_children(&self, id: String) -> Result<JsValue, JsError> {
        match self.inner.get_children(&id) {
            Some(children) => to_js(&children),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Current store version, bumped on every commit.
    #[wasm_bindgen(js_name = storeVersion)]
    pub fn store_version(&self) -> f64 {
        self.inner.store_version() as f64
    }

    /// Pull-based highlight requests outstanding across the current block
    /// tree (one per `code-line` child still lacking highlighted HTML).
    #[wasm_bindgen(js_name = takeHighlightRequests)]
    pub fn take_highlight_requests(&self) -> Result<JsValue, JsError> {
        to_js(&self.inner.take_highlight_requests())
    }

    /// Apply a highlighter response for a request returned earlier by
    /// `takeHighlightRequests` (echoed back verbatim) plus the highlighted
    /// HTML, enqueuing the resulting patch as its own high-priority batch.
    #[wasm_bindgen(js_name = applyHighlightResponse)]
    pub fn apply_highlight_response(&mut self, request: JsValue, html: String) -> Result<(), JsError> {
        let request: HighlightRequest = serde_wasm_bindgen::from_value(request)
            .map_err(|err| JsError::new(&format!("invalid highlight request: {err}")))?;
        self.inner.apply_highlight_response(&request, html);
        Ok(())
    }

    /// Apply an out-of-process MDX compile response (`mdxCompileMode:
    /// "worker"`).
    #[wasm_bindgen(js_name = applyMdxResponse)]
    pub fn apply_mdx_response(&mut self, block_id: String, compiled_id: String) {
        self.inner.apply_mdx_response(&block_id, compiled_id);
    }

    /// Parsed YAML frontmatter from the most recent `INIT`, or `undefined`.
    #[wasm_bindgen]
    pub fn frontmatter(&self) -> Result<JsValue, JsError> {
        match self.inner.frontmatter() {
            Some(value) => to_js(value),
            None => Ok(JsValue::UNDEFINED),
        }
    }
}
