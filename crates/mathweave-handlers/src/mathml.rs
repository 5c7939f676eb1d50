//! Embedded math markup handler.
//!
//! Matches elements whose sole child element is a math root, or whose text
//! content parses as well-formed markup rooted at one. Yields the original
//! markup plus a prettified variant, and materializes the root markup as a
//! hidden export-only source so markup queries see it.

use std::rc::Rc;

use mathweave_core::{
    Document, Handler, HandlerCx, HandlerError, InitDone, MATH_SOURCE_TAG, NodeId, SmolStr,
    SourceData, SourceValueDone, SourcesDone, TYPE_MATHML,
};

use crate::prettify::{Prettifier, TreeFormatter};

/// Recognized math root tag.
pub const MATH_ROOT_TAG: &str = "math";

const KIND_MATHML: &str = "MathML";
/// Provenance attribute value for the materialized export source.
const SOURCE_NAME: &str = "mathml";

/// Whether a markup string is well-formed with a single math root element.
pub fn is_math_fragment(markup: &str) -> bool {
    let Ok(doc) = Document::from_fragment(markup) else {
        return false;
    };
    let root = doc.root();
    let elements = doc.child_elements(root);
    if elements.len() != 1 || doc.tag(elements[0]) != Some(MATH_ROOT_TAG) {
        return false;
    }
    // nothing but whitespace around the root
    doc.children(root)
        .iter()
        .all(|&c| doc.is_element(c) || doc.text(c).is_some_and(|t| t.trim().is_empty()))
}

/// The element's math-root markup: its sole `math` child element, or its text
/// content when that parses as a math fragment.
pub fn math_root_markup(doc: &Document, el: NodeId) -> Option<String> {
    let elements = doc.child_elements(el);
    if elements.len() == 1 && doc.tag(elements[0]) == Some(MATH_ROOT_TAG) {
        return Some(doc.outer_markup(elements[0]));
    }
    let text = doc.inner_text(el);
    let trimmed = text.trim();
    if !trimmed.is_empty() && is_math_fragment(trimmed) {
        return Some(trimmed.to_string());
    }
    None
}

pub struct MathMlHandler {
    prettifier: Rc<dyn Prettifier>,
}

impl MathMlHandler {
    pub fn new() -> Self {
        Self::with_prettifier(Rc::new(TreeFormatter))
    }

    pub fn with_prettifier(prettifier: Rc<dyn Prettifier>) -> Self {
        Self { prettifier }
    }
}

impl Default for MathMlHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for MathMlHandler {
    fn can_handle(&self, doc: &Document, el: NodeId) -> bool {
        math_root_markup(doc, el).is_some()
    }

    fn init(&self, cx: &HandlerCx, el: NodeId, done: InitDone) {
        // materialize the root markup as an export-only source element so
        // markup-eligibility queries cover this item
        let mut doc = cx.doc.borrow_mut();
        if let Some(root) = math_root_markup(&doc, el) {
            let already = doc
                .children(el)
                .iter()
                .any(|&c| doc.attr(c, "name") == Some(SOURCE_NAME));
            if !already {
                let src = doc.create_element(MATH_SOURCE_TAG);
                doc.set_hidden(src, true);
                doc.set_attr(src, "type", TYPE_MATHML);
                doc.set_attr(src, "usage", "norender");
                doc.set_attr(src, "name", SOURCE_NAME);
                doc.set_text_content(src, root);
                doc.append_child(el, src);
            }
        }
        drop(doc);
        done(Ok(()));
    }

    fn sources(&self, cx: &HandlerCx, el: NodeId, done: SourcesDone) {
        let result = {
            let doc = cx.doc.borrow();
            match math_root_markup(&doc, el) {
                None => Ok(Vec::new()),
                Some(root) => match self.prettifier.prettify(&root) {
                    Ok(pretty) => Ok(vec![
                        SourceData {
                            kind: SmolStr::new_static(KIND_MATHML),
                            subtype: Some(SmolStr::new_static("original")),
                            markup: doc.inner_markup(el).trim().to_string(),
                        },
                        SourceData {
                            kind: SmolStr::new_static(KIND_MATHML),
                            subtype: Some(SmolStr::new_static("prettified")),
                            markup: pretty,
                        },
                    ]),
                    Err(err) => Err(HandlerError::Format(err.to_string())),
                },
            }
        };
        done(result);
    }

    fn source_types(&self, doc: &Document, el: NodeId) -> Vec<SmolStr> {
        if math_root_markup(doc, el).is_some() {
            vec![SmolStr::new_static(KIND_MATHML)]
        } else {
            Vec::new()
        }
    }

    fn source_for(&self, cx: &HandlerCx, kind: &str, el: NodeId, done: SourceValueDone) {
        let value = if kind == KIND_MATHML {
            let doc = cx.doc.borrow();
            math_root_markup(&doc, el)
                .map(|root| self.prettifier.prettify(&root).unwrap_or(root))
        } else {
            None
        };
        done(value);
    }
}
