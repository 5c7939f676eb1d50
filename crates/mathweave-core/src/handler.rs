//! Handler capability set.
//!
//! A handler is the polymorphic strategy bound to a math item exactly once,
//! at construction. It knows how to discover the item's alternate sources,
//! optionally owns an engine-specific render path, and backs the
//! source-inspection surface consumed by interactive shells.
//!
//! Asynchronous capabilities deliver through one-shot callbacks; the caller's
//! continuation runs on the shared [`Scheduler`](crate::Scheduler) tick that
//! completes the work. Only genuine failures travel through the `Result`s -
//! transient retry conditions are resolved below this surface.

use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::dom::{Document, NodeId};
use crate::error::HandlerError;
use crate::schedule::Scheduler;
use crate::source::SourceData;

/// The host document, shared across the single-threaded runtime.
pub type SharedDocument = Rc<RefCell<Document>>;

/// Completion callback for [`Handler::init`].
pub type InitDone = Box<dyn FnOnce(Result<(), HandlerError>)>;
/// Delivery callback for [`Handler::sources`].
pub type SourcesDone = Box<dyn FnOnce(Result<Vec<SourceData>, HandlerError>)>;
/// Delivery callback for [`Handler::source_for`]; `None` means unavailable.
pub type SourceValueDone = Box<dyn FnOnce(Option<String>)>;

/// Context handed to handler capabilities: the shared host document and the
/// cooperative scheduler driving asynchronous completion.
#[derive(Clone)]
pub struct HandlerCx {
    pub doc: SharedDocument,
    pub scheduler: Scheduler,
}

/// Polymorphic per-item strategy. Default implementations form the base
/// handler: never matches during probing, completes `init` immediately,
/// yields no sources, owns no render path, and clones presentation by
/// deep-copying contents.
pub trait Handler {
    /// Probe dispatch: whether this handler wants the element. Explicit-tag
    /// dispatch bypasses this.
    fn can_handle(&self, _doc: &Document, _el: NodeId) -> bool {
        false
    }

    /// One-time initialization, invoked exactly once after binding. The
    /// completion gates full interactivity, not basic rendering.
    fn init(&self, _cx: &HandlerCx, _el: NodeId, done: InitDone) {
        done(Ok(()));
    }

    /// Discover the element's alternate representations.
    fn sources(&self, _cx: &HandlerCx, _el: NodeId, done: SourcesDone) {
        done(Ok(Vec::new()));
    }

    /// Handler-specific render path. Return `true` when the element was
    /// handled; `false` falls back to the generic render path.
    fn render(&self, _cx: &HandlerCx, _el: NodeId) -> bool {
        false
    }

    /// Copy the element's visual presentation into `to` (zoom targets).
    fn clone_presentation(&self, doc: &mut Document, from: NodeId, to: NodeId) {
        doc.clone_children(from, to);
    }

    /// Display kinds available through [`Handler::source_for`].
    fn source_types(&self, _doc: &Document, _el: NodeId) -> Vec<SmolStr> {
        Vec::new()
    }

    /// Deliver the markup behind one display kind, possibly asynchronously.
    fn source_for(&self, _cx: &HandlerCx, _kind: &str, _el: NodeId, done: SourceValueDone) {
        done(None);
    }
}
