//! Block and inline node data model (§3 of the data model).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A finalizable top-level (or structurally nested) document unit.
///
/// Once `is_finalized` is `true`, a block's identity and payload shape no
/// longer change except for late-arriving, content-preserving updates
/// (highlight HTML, compiled MDX reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Opaque, session-stable identifier.
    pub id: String,
    /// Block type.
    pub kind: BlockKind,
    /// Whether the parser considers this block closed.
    pub is_finalized: bool,
    /// Type-dependent payload.
    pub payload: BlockPayload,
}

impl Block {
    /// Create a new, non-finalized block.
    pub fn new(id: impl Into<String>, kind: BlockKind, payload: BlockPayload) -> Self {
        Self {
            id: id.into(),
            kind,
            is_finalized: false,
            payload,
        }
    }

    /// Whether this block's payload-affecting fields differ from `other`.
    ///
    /// Used by the diff engine to decide between emitting `setProps` and
    /// emitting no patch at all (§4.3).
    pub fn payload_differs(&self, other: &Block) -> bool {
        self.payload != other.payload
    }
}

/// The set of block types recognized by the parser (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    /// A paragraph of inline content.
    Paragraph,
    /// ATX or setext heading.
    Heading,
    /// `>` blockquote.
    Blockquote,
    /// Ordered or unordered list.
    List,
    /// A single list item.
    ListItem,
    /// Fenced or indented code block.
    Code,
    /// A single line inside a code block.
    CodeLine,
    /// GFM table.
    Table,
    /// Table header group.
    TableHeader,
    /// Table body group.
    TableBody,
    /// A table row.
    TableRow,
    /// A body table cell.
    TableCell,
    /// A header table cell.
    TableHeaderCell,
    /// Raw block-level HTML.
    Html,
    /// MDX component tag at block level.
    Mdx,
    /// Callout / admonition (`:::note`).
    Callout,
    /// Synthesized footnotes block, emitted only on finalize.
    Footnotes,
    /// A single footnote definition.
    FootnoteDef,
    /// Mixed-content text segment within a paragraph.
    ParagraphText,
    /// Mixed-content HTML segment within a paragraph.
    ParagraphHtml,
    /// Mixed-content MDX segment within a paragraph.
    ParagraphMdx,
    /// Mixed-content text segment within a blockquote.
    BlockquoteText,
    /// Mixed-content HTML segment within a blockquote.
    BlockquoteHtml,
    /// Mixed-content MDX segment within a blockquote.
    BlockquoteMdx,
    /// Mixed-content text segment within a list item.
    ListItemText,
    /// Mixed-content HTML segment within a list item.
    ListItemHtml,
    /// Mixed-content MDX segment within a list item.
    ListItemMdx,
}

/// MDX compilation status tracked on `mdx`-kind blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdxStatus {
    /// Awaiting a response from the MDX compiler.
    Pending,
    /// Compiled successfully; `compiled_ref` holds the module id.
    Compiled,
    /// Compilation failed; `error` holds the message.
    Error,
}

/// Reference to a compiled MDX module, returned opaquely by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledMdxRef {
    /// Opaque module id assigned by the compiler.
    pub id: String,
}

/// Type-dependent block payload (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockPayload {
    /// Raw source text backing this block (always present).
    pub raw: String,
    /// Arbitrary metadata map (`inlineStatus`, `mdxStatus`, `depth`, ...).
    #[serde(default)]
    pub meta: BTreeMap<String, MetaValue>,
    /// Highlighted HTML, populated asynchronously by the Highlighter.
    #[serde(default)]
    pub highlighted_html: Option<String>,
    /// Sanitized HTML, populated by the Sanitizer before display.
    #[serde(default)]
    pub sanitized_html: Option<String>,
    /// Parsed inline node sequence, when this block carries inline content.
    #[serde(default)]
    pub inline: Option<Vec<InlineNode>>,
    /// Ordered mixed-content segments, when Markdown/HTML/MDX interleave.
    #[serde(default)]
    pub mixed_segments: Option<Vec<MixedSegment>>,
    /// Opaque compiled MDX module reference, once compiled.
    #[serde(default)]
    pub compiled_mdx_ref: Option<CompiledMdxRef>,
    /// Nested structural children (list items, table rows/cells, blockquote
    /// content, callout body, footnote entries). Empty for leaf blocks.
    #[serde(default)]
    pub children: Vec<Block>,
}

impl BlockPayload {
    /// Construct a minimal payload carrying only raw text.
    pub fn text(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            meta: BTreeMap::new(),
            highlighted_html: None,
            sanitized_html: None,
            inline: None,
            mixed_segments: None,
            compiled_mdx_ref: None,
            children: Vec::new(),
        }
    }

    /// Get a meta flag as a string, if present.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        match self.meta.get(key) {
            Some(MetaValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Set a string meta field.
    pub fn set_meta_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), MetaValue::Str(value.into()));
    }

    /// Set a boolean meta field.
    pub fn set_meta_bool(&mut self, key: impl Into<String>, value: bool) {
        self.meta.insert(key.into(), MetaValue::Bool(value));
    }

    /// Set a numeric meta field.
    pub fn set_meta_num(&mut self, key: impl Into<String>, value: f64) {
        self.meta.insert(key.into(), MetaValue::Num(value));
    }
}

/// A scalar value stored in a block's `meta` map.
///
/// Kept as a small closed union rather than `serde_json::Value` so inline
/// anticipation/mdx-status bookkeeping stays cheap to clone and compare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// UTF-8 string value.
    Str(String),
    /// Floating point numeric value (depth, number, count).
    Num(f64),
    /// Boolean flag.
    Bool(bool),
}

/// Inline-level node (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InlineNode {
    /// Plain text run.
    Text {
        /// Text content.
        text: String,
    },
    /// `**strong**` emphasis.
    Strong {
        /// Child inline sequence.
        children: Vec<InlineNode>,
    },
    /// `*em*` emphasis.
    Em {
        /// Child inline sequence.
        children: Vec<InlineNode>,
        /// Anticipation/completion status for this span.
        status: InlineStatus,
    },
    /// `~~strike~~`.
    Strike {
        /// Child inline sequence.
        children: Vec<InlineNode>,
        /// Anticipation/completion status for this span.
        status: InlineStatus,
    },
    /// `` `code` ``.
    Code {
        /// Raw code text (never itself interpreted as Markdown).
        text: String,
        /// Anticipation/completion status for this span.
        status: InlineStatus,
    },
    /// `[text](url)`.
    Link {
        /// Destination URL.
        url: String,
        /// Optional title attribute.
        title: Option<String>,
        /// Child inline sequence (link text).
        children: Vec<InlineNode>,
    },
    /// `![alt](url)`.
    Image {
        /// Destination URL.
        url: String,
        /// Alt text.
        alt: String,
        /// Optional title attribute.
        title: Option<String>,
    },
    /// Hard line break.
    Break,
    /// `$...$`.
    MathInline {
        /// Raw TeX-ish source.
        text: String,
        /// Anticipation/completion status for this span.
        status: InlineStatus,
    },
    /// `$$...$$`.
    MathDisplay {
        /// Raw TeX-ish source.
        text: String,
        /// Anticipation/completion status for this span.
        status: InlineStatus,
    },
    /// `[^label]` footnote reference; `number` is assigned on finalize.
    FootnoteRef {
        /// Raw label as written in source.
        label: String,
        /// 1-based display number, assigned only after finalize synthesis.
        number: Option<u32>,
    },
    /// `@mention` style reference.
    Mention {
        /// Mentioned identifier.
        name: String,
    },
    /// Citation reference.
    Citation {
        /// Citation key.
        key: String,
    },
    /// Inline raw HTML fragment.
    Html {
        /// Sanitized HTML string.
        sanitized: String,
    },
}

/// Anticipation state for a speculatively-closed inline span (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InlineStatus {
    /// The closing delimiter has not yet arrived; span is a speculative guess.
    Anticipated,
    /// The closing delimiter arrived; span is final.
    Complete,
}

/// An ordered element of a mixed-content paragraph (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MixedSegment {
    /// A run of ordinary inline Markdown content.
    Text {
        /// Inline node sequence.
        inline: Vec<InlineNode>,
    },
    /// A raw/sanitized HTML fragment.
    Html {
        /// Raw HTML as written.
        raw: String,
        /// Sanitized HTML, once the Sanitizer has run.
        sanitized: Option<String>,
    },
    /// An MDX component fragment.
    Mdx {
        /// Raw MDX source as written.
        raw: String,
        /// Compilation status.
        status: MdxStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_text_has_no_meta() {
        let p = BlockPayload::text("hello");
        assert_eq!(p.raw, "hello");
        assert!(p.meta.is_empty());
    }

    #[test]
    fn payload_differs_detects_raw_change() {
        let a = Block::new("b1", BlockKind::Paragraph, BlockPayload::text("a"));
        let b = Block::new("b1", BlockKind::Paragraph, BlockPayload::text("b"));
        assert!(a.payload_differs(&b));
    }

    #[test]
    fn payload_equal_when_identical() {
        let a = Block::new("b1", BlockKind::Paragraph, BlockPayload::text("a"));
        let b = Block::new("b1", BlockKind::Paragraph, BlockPayload::text("a"));
        assert!(!a.payload_differs(&b));
    }

    #[test]
    fn meta_roundtrip() {
        let mut p = BlockPayload::text("x");
        p.set_meta_str("inlineStatus", "anticipated");
        assert_eq!(p.meta_str("inlineStatus"), Some("anticipated"));
    }
}
