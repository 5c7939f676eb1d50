//! Equation-store handler.
//!
//! Matches elements embedding exactly one pre-rendered math markup script
//! (an externally authored payload, marked by its media type). Yields the
//! payload as the original source, plus a prettified variant when it parses
//! as a math root. Zero or several payloads yield nothing and the item falls
//! back to generic rendering.

use std::rc::Rc;

use mathweave_core::{
    Document, Handler, HandlerCx, HandlerError, MATH_SOURCE_TAG, NodeId, SmolStr, SourceData,
    SourceValueDone, SourcesDone,
};

use crate::mathml::is_math_fragment;
use crate::prettify::{Prettifier, TreeFormatter};

/// Media type marking a pre-rendered math markup payload.
pub const STORE_PAYLOAD_TYPE: &str = "math/mml";

const KIND_MATHML: &str = "MathML";

pub struct EqnStoreHandler {
    prettifier: Rc<dyn Prettifier>,
}

impl EqnStoreHandler {
    pub fn new() -> Self {
        Self::with_prettifier(Rc::new(TreeFormatter))
    }

    pub fn with_prettifier(prettifier: Rc<dyn Prettifier>) -> Self {
        Self { prettifier }
    }

    /// The single embedded payload, if there is exactly one.
    fn payload(doc: &Document, el: NodeId) -> Option<String> {
        let scripts: Vec<_> = doc
            .subtree_elements(el)
            .into_iter()
            .filter(|&n| {
                n != el
                    && doc.tag(n) == Some("script")
                    && doc.attr(n, "type") == Some(STORE_PAYLOAD_TYPE)
            })
            .collect();
        if scripts.len() != 1 {
            if scripts.len() > 1 {
                tracing::warn!(
                    target: "mathweave::store",
                    count = scripts.len(),
                    "ambiguous equation store payload"
                );
            }
            return None;
        }
        Some(doc.inner_text(scripts[0]).trim().to_string())
    }
}

impl Default for EqnStoreHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for EqnStoreHandler {
    fn can_handle(&self, doc: &Document, el: NodeId) -> bool {
        Self::payload(doc, el).is_some()
    }

    fn sources(&self, cx: &HandlerCx, el: NodeId, done: SourcesDone) {
        let result = {
            let doc = cx.doc.borrow();
            match Self::payload(&doc, el) {
                None => Ok(Vec::new()),
                Some(src) => {
                    let mut out = vec![SourceData {
                        kind: SmolStr::new_static(KIND_MATHML),
                        subtype: Some(SmolStr::new_static("original")),
                        markup: src.clone(),
                    }];
                    if is_math_fragment(&src) {
                        match self.prettifier.prettify(&src) {
                            Ok(pretty) => out.push(SourceData {
                                kind: SmolStr::new_static(KIND_MATHML),
                                subtype: Some(SmolStr::new_static("prettified")),
                                markup: pretty,
                            }),
                            Err(err) => {
                                done(Err(HandlerError::Format(err.to_string())));
                                return;
                            }
                        }
                    }
                    Ok(out)
                }
            }
        };
        done(result);
    }

    /// The stored visual rendering sits next to the payload script; copy
    /// everything but the payload (and any source elements).
    fn clone_presentation(&self, doc: &mut Document, from: NodeId, to: NodeId) {
        for c in doc.children(from).to_vec() {
            let is_payload =
                doc.tag(c) == Some("script") && doc.attr(c, "type") == Some(STORE_PAYLOAD_TYPE);
            let is_source = doc.tag(c) == Some(MATH_SOURCE_TAG);
            if !is_payload && !is_source {
                doc.clone_into(c, to);
            }
        }
    }

    fn source_types(&self, doc: &Document, el: NodeId) -> Vec<SmolStr> {
        if Self::payload(doc, el).is_some() {
            vec![SmolStr::new_static(KIND_MATHML)]
        } else {
            Vec::new()
        }
    }

    fn source_for(&self, cx: &HandlerCx, kind: &str, el: NodeId, done: SourceValueDone) {
        let value = if kind == KIND_MATHML {
            let doc = cx.doc.borrow();
            Self::payload(&doc, el)
        } else {
            None
        };
        done(value);
    }
}
