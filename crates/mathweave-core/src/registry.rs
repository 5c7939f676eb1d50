//! Insertion-ordered handler registry.
//!
//! Maps explicit type tags to handlers and keeps a probing priority order for
//! elements that do not declare a tag: the most recently registered handler
//! is probed first. The registry is a plain value owned by the composition
//! root and injected into the runtime; there is no process-global instance.

use std::collections::HashMap;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::dom::{Document, NodeId};
use crate::error::CoreError;
use crate::handler::Handler;

/// The data attribute through which an element declares an explicit tag.
pub const TYPE_TAG_ATTR: &str = "data-type";

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<SmolStr, Rc<dyn Handler>>,
    /// Probing priority, most recently registered first.
    order: Vec<SmolStr>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `tag`, replacing and returning any previous
    /// handler for that tag. The tag moves to top probing priority either way.
    pub fn register(
        &mut self,
        tag: impl Into<SmolStr>,
        handler: Rc<dyn Handler>,
    ) -> Option<Rc<dyn Handler>> {
        let tag = tag.into();
        let previous = self.remove(&tag);
        self.order.insert(0, tag.clone());
        self.handlers.insert(tag, handler);
        previous
    }

    pub fn remove(&mut self, tag: &str) -> Option<Rc<dyn Handler>> {
        if let Some(pos) = self.order.iter().position(|t| t == tag) {
            self.order.remove(pos);
        }
        self.handlers.remove(tag)
    }

    pub fn get(&self, tag: &str) -> Option<Rc<dyn Handler>> {
        self.handlers.get(tag).cloned()
    }

    /// First handler, in priority order, whose `can_handle` accepts the
    /// element.
    pub fn find(&self, doc: &Document, el: NodeId) -> Option<Rc<dyn Handler>> {
        self.order
            .iter()
            .filter_map(|tag| self.handlers.get(tag))
            .find(|handler| handler.can_handle(doc, el))
            .cloned()
    }

    /// Dispatch for one element: explicit tag lookup when declared, probing
    /// otherwise. Fails only on an unknown explicit tag or an exhausted probe.
    pub fn resolve(&self, doc: &Document, el: NodeId) -> Result<Rc<dyn Handler>, CoreError> {
        if let Some(tag) = doc.attr(el, TYPE_TAG_ATTR) {
            return self
                .get(tag)
                .ok_or_else(|| CoreError::UnknownTypeTag(SmolStr::new(tag)));
        }
        self.find(doc, el).ok_or(CoreError::NoMatchingHandler)
    }
}
