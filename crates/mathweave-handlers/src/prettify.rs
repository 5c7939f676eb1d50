//! Markup prettification collaborator.
//!
//! Prettification is an external concern consumed through the [`Prettifier`]
//! seam: math-root markup in, formatted markup out, errors (if any) genuine.
//! [`TreeFormatter`] is the default implementation: two-space indentation,
//! text-only elements kept on one line, attributes preserved.

use mathweave_core::{Document, NodeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("malformed markup: {0}")]
    Malformed(String),
}

pub trait Prettifier {
    fn prettify(&self, markup: &str) -> Result<String, FormatError>;
}

/// Unit implementation: passthrough.
impl Prettifier for () {
    fn prettify(&self, markup: &str) -> Result<String, FormatError> {
        Ok(markup.to_string())
    }
}

/// Default tree formatter.
#[derive(Clone, Copy, Debug, Default)]
pub struct TreeFormatter;

impl TreeFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl Prettifier for TreeFormatter {
    fn prettify(&self, markup: &str) -> Result<String, FormatError> {
        let doc = Document::from_fragment(markup)
            .map_err(|err| FormatError::Malformed(err.to_string()))?;
        let mut lines = Vec::new();
        for &child in doc.children(doc.root()) {
            format_node(&doc, child, 0, &mut lines);
        }
        Ok(lines.join("\n"))
    }
}

fn open_tag(doc: &Document, el: NodeId) -> String {
    let mut out = String::from("<");
    if let Some(tag) = doc.tag(el) {
        out.push_str(tag);
    }
    for (name, value) in doc.attrs(el) {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(value);
        out.push('"');
    }
    out.push('>');
    out
}

fn format_node(doc: &Document, node: NodeId, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    if doc.text(node).is_some() {
        // serialized form keeps escaping intact
        let text = doc.outer_markup(node);
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(format!("{indent}{trimmed}"));
        }
        return;
    }
    let Some(tag) = doc.tag(node).map(|t| t.to_string()) else {
        return;
    };
    let open = open_tag(doc, node);
    let children = doc.children(node);
    if children.is_empty() {
        lines.push(format!("{indent}{open}</{tag}>"));
        return;
    }
    let text_only = children.iter().all(|&c| doc.text(c).is_some());
    if text_only {
        let inner = doc.inner_markup(node);
        lines.push(format!("{indent}{open}{}</{tag}>", inner.trim()));
        return;
    }
    lines.push(format!("{indent}{open}"));
    for &c in children {
        format_node(doc, c, depth + 1, lines);
    }
    lines.push(format!("{indent}</{tag}>"));
}
