//! Catch-all handler: element contents as plain HTML.

use mathweave_core::{
    Document, Handler, HandlerCx, NodeId, SmolStr, SourceData, SourceValueDone, SourcesDone,
};

const KIND_HTML: &str = "HTML";

/// Accepts every element and yields its existing content as one HTML-typed
/// source. Registered last so probe dispatch can never fail.
pub struct PlainHandler;

impl Handler for PlainHandler {
    fn can_handle(&self, _doc: &Document, _el: NodeId) -> bool {
        true
    }

    fn sources(&self, cx: &HandlerCx, el: NodeId, done: SourcesDone) {
        let markup = cx.doc.borrow().inner_markup(el);
        done(Ok(vec![SourceData {
            kind: SmolStr::new_static(KIND_HTML),
            subtype: None,
            markup,
        }]));
    }

    fn source_types(&self, _doc: &Document, _el: NodeId) -> Vec<SmolStr> {
        vec![SmolStr::new_static(KIND_HTML)]
    }

    fn source_for(&self, cx: &HandlerCx, kind: &str, el: NodeId, done: SourceValueDone) {
        let value = if kind == KIND_HTML {
            Some(cx.doc.borrow().inner_markup(el))
        } else {
            None
        };
        done(value);
    }
}
