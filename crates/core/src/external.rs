//! External collaborator interfaces (§6): syntax highlighting, HTML
//! sanitization, and MDX compilation live outside the core pipeline. The
//! core only defines the request/response shapes and a narrow trait per
//! collaborator; callers (napi/wasm host adapters) supply real
//! implementations, while the defaults here keep the crate usable
//! standalone.

use crate::patch::{At, Patch, PropMap, PropValue};
use serde::{Deserialize, Serialize};

/// A request for highlighted HTML for one code line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightRequest {
    /// Owning code block id.
    pub block_id: String,
    /// 0-based line index within the code block.
    pub line_index: usize,
    /// Raw line text to highlight.
    pub text: String,
    /// Language tag, if known.
    pub lang: Option<String>,
}

/// Pull-based syntax highlighting collaborator.
///
/// Implementations may be asynchronous in the host adapter; the core only
/// requires a synchronous call returning highlighted HTML (or `None` to
/// leave the line unhighlighted). A worker-backed implementation can poll
/// or block internally, or the host can call back into the `Document` with
/// a `SetProps` patch once a response arrives out of band.
pub trait Highlighter: Send + Sync {
    /// Produce highlighted HTML for one code line, if available now.
    fn highlight(&self, request: &HighlightRequest) -> Option<String>;

    /// Build the `setProps` patch that carries a highlight result back to
    /// the store for the addressed `code-line` node.
    fn to_patch(&self, request: &HighlightRequest, html: String) -> Patch {
        let line_id = format!("{}::line:{}", request.block_id, request.line_index);
        let mut props = PropMap::new();
        props.insert("html".to_string(), PropValue::Str(html));
        Patch::SetProps {
            at: At::node(request.block_id.clone(), line_id),
            props,
        }
    }
}

/// Default no-op highlighter: never produces highlighted HTML. Code lines
/// fall back to an HTML-escaped rendering of their raw text (§4.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHighlighter;

impl Highlighter for NoopHighlighter {
    fn highlight(&self, _request: &HighlightRequest) -> Option<String> {
        None
    }
}

/// Synchronous HTML sanitization collaborator (§6).
///
/// Called by the parser before emitting `setHTML` or populating
/// `payload.sanitized_html`; the store never re-sanitizes.
pub trait Sanitizer: Send + Sync {
    /// Sanitize raw HTML, stripping scripts/handlers/unsafe attributes.
    fn sanitize(&self, raw_html: &str) -> String;
}

/// No-op sanitizer: escapes HTML entirely rather than allowing any markup
/// through. Useful for tests and as a safe default when no real sanitizer
/// is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSanitizer;

impl Sanitizer for NoopSanitizer {
    fn sanitize(&self, raw_html: &str) -> String {
        html_escape::encode_safe(raw_html).into_owned()
    }
}

/// Attributes that carry a URL and must be checked for a `javascript:`
/// scheme (§6: the default sanitizer "rewrites `javascript:` URLs").
const URL_ATTRS: &[&str] = &["href", "src", "action", "formaction", "xlink:href", "background", "poster"];

/// Whether `value` resolves to a `javascript:` scheme, tolerating the
/// whitespace/control-character padding browsers ignore when resolving a
/// URL scheme (e.g. `"jav\tascript:alert(1)"`).
fn is_javascript_url(value: &str) -> bool {
    let stripped: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    stripped.to_ascii_lowercase().starts_with("javascript:")
}

/// HTML sanitizer backed by `lol_html`'s streaming rewriter, stripping
/// `<script>`/`<style>` tags, `on*` event-handler attributes, and
/// `javascript:`-scheme URLs while passing the remaining markup through
/// unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LolHtmlSanitizer;

impl Sanitizer for LolHtmlSanitizer {
    fn sanitize(&self, raw_html: &str) -> String {
        use lol_html::{element, rewrite_str, RewriteStrSettings};

        let result = rewrite_str(
            raw_html,
            RewriteStrSettings {
                element_content_handlers: vec![
                    element!("script, style", |el| {
                        el.remove();
                        Ok(())
                    }),
                    element!("*", |el| {
                        let attrs: Vec<String> = el
                            .attributes()
                            .iter()
                            .map(|a| a.name())
                            .filter(|name| name.starts_with("on"))
                            .collect();
                        for name in attrs {
                            el.remove_attribute(&name);
                        }

                        let js_urls: Vec<String> = el
                            .attributes()
                            .iter()
                            .filter(|a| {
                                URL_ATTRS.contains(&a.name().as_str()) && is_javascript_url(&a.value())
                            })
                            .map(|a| a.name())
                            .collect();
                        for name in js_urls {
                            el.set_attribute(&name, "#").ok();
                        }
                        Ok(())
                    }),
                ],
                ..RewriteStrSettings::new()
            },
        );
        result.unwrap_or_else(|_| html_escape::encode_safe(raw_html).into_owned())
    }
}

/// Outcome of an MDX compile request (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdxCompileResponse {
    /// Opaque compiled module id.
    pub id: String,
    /// Compiled JS/module code, when the caller wants it inline.
    pub code: Option<String>,
    /// Module dependency specifiers referenced by the compiled output.
    pub dependencies: Vec<String>,
}

/// Result of a failed MDX compile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdxCompileFailure {
    /// Human-readable compile error.
    pub message: String,
}

/// MDX compile request/response collaborator (§6).
pub trait MdxCompiler: Send + Sync {
    /// Compile a block's raw MDX source into an opaque module reference.
    fn compile(
        &self,
        block_id: &str,
        raw_mdx: &str,
    ) -> Result<MdxCompileResponse, MdxCompileFailure>;
}

/// `mdxjs`-backed MDX compiler (§9: the teacher's own MDX compilation
/// backend, retargeted from an Astro-JSX pipeline to this trait).
#[derive(Debug, Clone, Default)]
pub struct MdxjsCompiler {
    /// `jsxImportSource` forwarded to `mdxjs::Options`.
    pub jsx_import_source: Option<String>,
}

impl MdxCompiler for MdxjsCompiler {
    fn compile(
        &self,
        block_id: &str,
        raw_mdx: &str,
    ) -> Result<MdxCompileResponse, MdxCompileFailure> {
        let options = mdxjs::Options {
            filepath: Some(format!("{block_id}.mdx")),
            jsx_runtime: Some(mdxjs::JsxRuntime::Automatic),
            jsx_import_source: self.jsx_import_source.clone(),
            parse: mdxjs::MdxParseOptions::gfm(),
            ..Default::default()
        };
        match mdxjs::compile(raw_mdx, &options) {
            Ok(code) => Ok(MdxCompileResponse {
                id: format!("mdx:{block_id}"),
                code: Some(code),
                dependencies: Vec::new(),
            }),
            Err(err) => Err(MdxCompileFailure {
                message: err.to_string(),
            }),
        }
    }
}

/// Bundle of external collaborators a `Document` is wired up with.
///
/// Grouped into one struct so `Document::new` takes a single argument;
/// individual fields default to the no-op/in-process implementations.
pub struct Collaborators {
    /// Syntax highlighter.
    pub highlighter: Box<dyn Highlighter>,
    /// HTML sanitizer.
    pub sanitizer: Box<dyn Sanitizer>,
    /// MDX compiler.
    pub mdx_compiler: Box<dyn MdxCompiler>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            highlighter: Box::new(NoopHighlighter),
            sanitizer: Box::new(LolHtmlSanitizer),
            mdx_compiler: Box::new(MdxjsCompiler::default()),
        }
    }
}

/// Build the `html`-escaped fallback used when no highlighter response is
/// available yet for a code line (§4.5 "raw-text fallback").
pub fn escape_code_line(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sanitizer_escapes() {
        let out = NoopSanitizer.sanitize("<b>hi</b>");
        assert!(!out.contains("<b>"));
    }

    #[test]
    fn lol_html_sanitizer_strips_script() {
        let out = LolHtmlSanitizer.sanitize("<p>hi</p><script>evil()</script>");
        assert!(!out.contains("<script>"));
        assert!(out.contains("<p>hi</p>"));
    }

    #[test]
    fn lol_html_sanitizer_strips_event_handlers() {
        let out = LolHtmlSanitizer.sanitize("<img src=\"x\" onerror=\"evil()\">");
        assert!(!out.contains("onerror"));
    }

    #[test]
    fn lol_html_sanitizer_rewrites_javascript_url_href() {
        let out = LolHtmlSanitizer.sanitize("<a href=\"javascript:alert(1)\">click</a>");
        assert!(!out.to_ascii_lowercase().contains("javascript:"));
        assert!(out.contains("href=\"#\""));
    }

    #[test]
    fn lol_html_sanitizer_rewrites_javascript_url_with_evasion_whitespace() {
        let out = LolHtmlSanitizer.sanitize("<img src=\"jav\tascript:alert(1)\">");
        assert!(!out.to_ascii_lowercase().contains("javascript:alert"));
    }

    #[test]
    fn lol_html_sanitizer_leaves_ordinary_urls_untouched() {
        let out = LolHtmlSanitizer.sanitize("<a href=\"https://example.com\">link</a>");
        assert!(out.contains("href=\"https://example.com\""));
    }

    #[test]
    fn highlighter_builds_set_props_patch() {
        let req = HighlightRequest {
            block_id: "blk:0:code".into(),
            line_index: 0,
            text: "let x = 1;".into(),
            lang: Some("rust".into()),
        };
        let patch = NoopHighlighter.to_patch(&req, "<span>let</span> x = 1;".into());
        match patch {
            Patch::SetProps { at, props } => {
                assert_eq!(at.node_id.as_deref(), Some("blk:0:code::line:0"));
                assert!(props.contains_key("html"));
            }
            _ => panic!("expected SetProps"),
        }
    }

    #[test]
    fn escape_code_line_escapes_html() {
        assert_eq!(escape_code_line("<a>"), "&lt;a&gt;");
    }
}
