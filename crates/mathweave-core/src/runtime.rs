//! Dual-mode element runtime.
//!
//! Binds the math item lifecycle onto the host document in one of two
//! observably equivalent ways, selected once at install time:
//!
//! - **Native**: the document supports custom-element definitions; the item
//!   and source tags are defined and lifecycle reactions recorded by the host
//!   are drained on the scheduler.
//! - **Simulated**: the document has no definition support; a bootstrap walk
//!   upgrades existing elements (recursing into owned sources), and dynamic
//!   inserters call the `manual_*` entry points themselves.
//!
//! Both bindings funnel into the same create/attach behavior, so query
//! results and render behavior agree by construction. A one-shot
//! `initialized` signal fires after bootstrap regardless of the mode.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::dom::{LifecyclePhase, NodeId};
use crate::error::CoreError;
use crate::handler::{HandlerCx, SharedDocument, SourceValueDone};
use crate::item::{self, ItemState, MainMarkup};
use crate::registry::HandlerRegistry;
use crate::schedule::Scheduler;
use crate::source::{self, MATH_ITEM_TAG, MATH_SOURCE_TAG, SourceFilter, TYPE_HTML};

/// Which lifecycle binding is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingMode {
    Native,
    Simulated,
}

/// Composition-root configuration for the runtime.
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    /// Class marking discoverable math elements.
    pub discovery_class: SmolStr,
    /// Display type preferred by the generic render path.
    pub preferred_type: SmolStr,
    /// Force a binding instead of probing the document. Forcing `Native` on a
    /// host without definition support falls back to `Simulated`.
    pub binding: Option<BindingMode>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            discovery_class: SmolStr::new_static("math-ui"),
            preferred_type: SmolStr::new_static(TYPE_HTML),
            binding: None,
        }
    }
}

impl RuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discovery_class(mut self, class: impl Into<SmolStr>) -> Self {
        self.discovery_class = class.into();
        self
    }

    pub fn with_preferred_type(mut self, source_type: impl Into<SmolStr>) -> Self {
        self.preferred_type = source_type.into();
        self
    }

    pub fn with_binding(mut self, binding: BindingMode) -> Self {
        self.binding = Some(binding);
        self
    }
}

struct ItemMap {
    map: HashMap<NodeId, ItemState>,
    next_id: u64,
}

struct Shared {
    doc: SharedDocument,
    scheduler: Scheduler,
    registry: HandlerRegistry,
    options: RuntimeOptions,
    items: RefCell<ItemMap>,
    binding: Cell<BindingMode>,
    installed: Cell<bool>,
    ready: Cell<bool>,
    waiters: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// The runtime: owns item lifecycle state and the active binding.
pub struct MathRuntime {
    shared: Rc<Shared>,
}

impl MathRuntime {
    pub fn new(
        doc: SharedDocument,
        scheduler: Scheduler,
        registry: HandlerRegistry,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            shared: Rc::new(Shared {
                doc,
                scheduler,
                registry,
                options,
                items: RefCell::new(ItemMap {
                    map: HashMap::new(),
                    next_id: 0,
                }),
                binding: Cell::new(BindingMode::Simulated),
                installed: Cell::new(false),
                ready: Cell::new(false),
                waiters: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Select the binding and schedule the bootstrap. Idempotent.
    pub fn install(&self) {
        if self.shared.installed.replace(true) {
            return;
        }
        let native_support = self.shared.doc.borrow().supports_custom_elements();
        let mut mode = self.shared.options.binding.unwrap_or(if native_support {
            BindingMode::Native
        } else {
            BindingMode::Simulated
        });
        if mode == BindingMode::Native && !native_support {
            tracing::warn!(
                target: "mathweave::runtime",
                "native binding requested but the document has no definition support; simulating"
            );
            mode = BindingMode::Simulated;
        }
        self.shared.binding.set(mode);
        tracing::debug!(target: "mathweave::runtime", ?mode, "installing runtime");
        match mode {
            BindingMode::Native => {
                {
                    let mut doc = self.shared.doc.borrow_mut();
                    let weak = Rc::downgrade(&self.shared);
                    let scheduler = self.shared.scheduler.clone();
                    doc.set_reaction_notifier(Rc::new(move || {
                        let weak = weak.clone();
                        scheduler.defer(move || {
                            if let Some(shared) = weak.upgrade() {
                                Shared::drain_reactions(&shared);
                            }
                        });
                    }));
                    doc.define(MATH_ITEM_TAG);
                    doc.define(MATH_SOURCE_TAG);
                }
                let shared = Rc::clone(&self.shared);
                self.shared.scheduler.defer(move || {
                    Shared::drain_reactions(&shared);
                    Shared::scan_discovery(&shared);
                    Shared::fire_ready(&shared);
                });
            }
            BindingMode::Simulated => {
                let shared = Rc::clone(&self.shared);
                self.shared.scheduler.defer(move || {
                    Shared::bootstrap(&shared);
                    Shared::fire_ready(&shared);
                });
            }
        }
    }

    pub fn binding(&self) -> BindingMode {
        self.shared.binding.get()
    }

    /// Whether the one-shot initialization signal has fired.
    pub fn initialized(&self) -> bool {
        self.shared.ready.get()
    }

    /// Run `callback` once the runtime has bootstrapped. Fires on a scheduler
    /// tick when already initialized.
    pub fn on_initialized(&self, callback: impl FnOnce() + 'static) {
        if self.shared.ready.get() {
            self.shared.scheduler.defer(callback);
        } else {
            self.shared.waiters.borrow_mut().push(Box::new(callback));
        }
    }

    pub fn doc(&self) -> SharedDocument {
        Rc::clone(&self.shared.doc)
    }

    pub fn scheduler(&self) -> Scheduler {
        self.shared.scheduler.clone()
    }

    /// Drive the shared event loop until idle.
    pub fn run_until_idle(&self) {
        self.shared.scheduler.run_until_idle();
    }

    /// Manually construct a math item (simulated-binding inserters). With
    /// `deep`, owned source elements are constructed too.
    pub fn manual_create(&self, el: NodeId, deep: bool) -> Result<(), CoreError> {
        Shared::item_create(&self.shared, el, deep)
    }

    /// Manually attach a math item, triggering its first render pass. With
    /// `deep`, owned source elements are attached too.
    pub fn manual_attach(&self, el: NodeId, deep: bool) {
        Shared::item_attach(&self.shared, el, deep);
    }

    /// Manually construct a dynamically inserted source element.
    pub fn manual_source_create(&self, el: NodeId) {
        Shared::source_create(&self.shared, el);
    }

    /// Manually attach a dynamically inserted source element; re-renders the
    /// owning item when the source is render-eligible.
    pub fn manual_source_attach(&self, el: NodeId) {
        Shared::source_attach(&self.shared, el);
    }

    /// Coalesced re-render request: at most one pending render per item.
    pub fn request_render(&self, el: NodeId) {
        Shared::request_render(&self.shared, el);
    }

    /// Immediate render (handler path first, then the generic path).
    pub fn render(&self, el: NodeId) {
        Shared::render_now(&self.shared, el);
    }

    /// Remove non-source content and hide sources.
    pub fn clean(&self, el: NodeId) {
        let mut doc = self.shared.doc.borrow_mut();
        item::clean(&mut doc, el);
    }

    pub fn get_sources(&self, el: NodeId, filter: &SourceFilter) -> Vec<NodeId> {
        let doc = self.shared.doc.borrow();
        item::get_sources(&doc, el, filter)
    }

    pub fn main_markup(&self, el: NodeId) -> Option<MainMarkup> {
        let doc = self.shared.doc.borrow();
        item::main_markup(&doc, el)
    }

    pub fn item_count(&self) -> usize {
        self.shared.items.borrow().map.len()
    }

    pub fn item_id(&self, el: NodeId) -> Option<u64> {
        self.shared.items.borrow().map.get(&el).map(|s| s.id)
    }

    pub fn display_name(&self, el: NodeId) -> Option<String> {
        self.shared
            .items
            .borrow()
            .map
            .get(&el)
            .map(|s| s.display_name.clone())
    }

    /// Whether the item's handler finished initializing (gates menu/focus
    /// interactivity, not rendering).
    pub fn is_interactive(&self, el: NodeId) -> bool {
        self.shared
            .items
            .borrow()
            .map
            .get(&el)
            .map(|s| s.interactive)
            .unwrap_or(false)
    }

    /// Display kinds the bound handler can deliver for this item.
    pub fn source_types(&self, el: NodeId) -> Vec<SmolStr> {
        let handler = match self.handler_for(el) {
            Some(handler) => handler,
            None => return Vec::new(),
        };
        let doc = self.shared.doc.borrow();
        handler.source_types(&doc, el)
    }

    /// Deliver the markup behind one display kind through `done`.
    pub fn source_for(&self, el: NodeId, kind: &str, done: SourceValueDone) {
        match self.handler_for(el) {
            Some(handler) => handler.source_for(&self.shared.cx(), kind, el, done),
            None => done(None),
        }
    }

    /// Copy the item's presentation into `target` (zoom targets).
    pub fn clone_presentation(&self, el: NodeId, target: NodeId) {
        if let Some(handler) = self.handler_for(el) {
            let mut doc = self.shared.doc.borrow_mut();
            handler.clone_presentation(&mut doc, el, target);
        }
    }

    fn handler_for(&self, el: NodeId) -> Option<Rc<dyn crate::handler::Handler>> {
        self.shared
            .items
            .borrow()
            .map
            .get(&el)
            .map(|s| Rc::clone(&s.handler))
    }
}

impl Shared {
    fn cx(&self) -> HandlerCx {
        HandlerCx {
            doc: Rc::clone(&self.doc),
            scheduler: self.scheduler.clone(),
        }
    }

    fn fire_ready(shared: &Rc<Shared>) {
        if shared.ready.replace(true) {
            return;
        }
        tracing::debug!(target: "mathweave::runtime", "runtime initialized");
        let waiters = std::mem::take(&mut *shared.waiters.borrow_mut());
        for waiter in waiters {
            waiter();
        }
    }

    fn drain_reactions(shared: &Rc<Shared>) {
        loop {
            let reactions = shared.doc.borrow_mut().take_reactions();
            if reactions.is_empty() {
                break;
            }
            for reaction in reactions {
                let tag = shared
                    .doc
                    .borrow()
                    .tag(reaction.node)
                    .map(SmolStr::new);
                match (tag.as_deref(), reaction.phase) {
                    (Some(MATH_ITEM_TAG), LifecyclePhase::Created) => {
                        if let Err(err) = Shared::item_create(shared, reaction.node, false) {
                            tracing::warn!(
                                target: "mathweave::runtime",
                                error = %err,
                                "skipping math element"
                            );
                        }
                    }
                    (Some(MATH_ITEM_TAG), LifecyclePhase::Attached) => {
                        Shared::item_attach(shared, reaction.node, false);
                    }
                    (Some(MATH_SOURCE_TAG), LifecyclePhase::Created) => {
                        Shared::source_create(shared, reaction.node);
                    }
                    (Some(MATH_SOURCE_TAG), LifecyclePhase::Attached) => {
                        Shared::source_attach(shared, reaction.node);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Native-binding sweep for class-discovered elements that are not
    /// custom-tagged (definitions do not cover them).
    fn scan_discovery(shared: &Rc<Shared>) {
        let targets = {
            let doc = shared.doc.borrow();
            doc.elements_by_class(shared.options.discovery_class.as_str())
        };
        Shared::upgrade_all(shared, targets);
    }

    /// Simulated-binding walk over all discoverable elements.
    fn bootstrap(shared: &Rc<Shared>) {
        let targets = {
            let doc = shared.doc.borrow();
            doc.subtree_elements(doc.root())
                .into_iter()
                .filter(|&el| {
                    doc.tag(el) == Some(MATH_ITEM_TAG)
                        || doc.has_class(el, shared.options.discovery_class.as_str())
                })
                .collect::<Vec<_>>()
        };
        Shared::upgrade_all(shared, targets);
    }

    fn upgrade_all(shared: &Rc<Shared>, targets: Vec<NodeId>) {
        for el in targets {
            if shared.items.borrow().map.contains_key(&el) {
                continue;
            }
            match Shared::item_create(shared, el, true) {
                Ok(()) => Shared::item_attach(shared, el, true),
                Err(err) => {
                    tracing::warn!(
                        target: "mathweave::runtime",
                        error = %err,
                        "skipping math element"
                    );
                }
            }
        }
    }

    fn item_create(shared: &Rc<Shared>, el: NodeId, deep: bool) -> Result<(), CoreError> {
        if shared.items.borrow().map.contains_key(&el) {
            return Ok(());
        }
        let handler = {
            let doc = shared.doc.borrow();
            shared.registry.resolve(&doc, el)?
        };
        let id = {
            let mut items = shared.items.borrow_mut();
            let id = items.next_id;
            items.next_id += 1;
            items.map.insert(
                el,
                ItemState {
                    id,
                    display_name: format!("Equation {}", id + 1),
                    handler: Rc::clone(&handler),
                    update_pending: false,
                    first_pass: true,
                    interactive: false,
                },
            );
            id
        };
        shared
            .doc
            .borrow_mut()
            .set_attr(el, "id", format!("math-item-{id}"));
        tracing::debug!(target: "mathweave::runtime", id, "math item constructed");

        let weak = Rc::downgrade(shared);
        let cx = shared.cx();
        handler.init(
            &cx,
            el,
            Box::new(move |result| match result {
                Ok(()) => {
                    if let Some(shared) = weak.upgrade() {
                        if let Some(state) = shared.items.borrow_mut().map.get_mut(&el) {
                            state.interactive = true;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        target: "mathweave::runtime",
                        error = %err,
                        "handler init failed; item stays non-interactive"
                    );
                }
            }),
        );

        if deep {
            let sources = {
                let doc = shared.doc.borrow();
                source::source_elements(&doc, el)
            };
            for s in sources {
                Shared::source_create(shared, s);
            }
        }
        Ok(())
    }

    fn item_attach(shared: &Rc<Shared>, el: NodeId, deep: bool) {
        Shared::request_render(shared, el);
        if deep {
            let sources = {
                let doc = shared.doc.borrow();
                source::source_elements(&doc, el)
            };
            for s in sources {
                Shared::source_attach(shared, s);
            }
        }
    }

    fn source_create(shared: &Rc<Shared>, el: NodeId) {
        shared.doc.borrow_mut().set_hidden(el, true);
    }

    fn source_attach(shared: &Rc<Shared>, el: NodeId) {
        let parent = {
            let doc = shared.doc.borrow();
            if source::source_usage(&doc, el).render_eligible() {
                doc.parent(el)
            } else {
                None
            }
        };
        if let Some(parent) = parent {
            if shared.items.borrow().map.contains_key(&parent) {
                Shared::request_render(shared, parent);
            }
        }
    }

    fn request_render(shared: &Rc<Shared>, el: NodeId) {
        {
            let mut items = shared.items.borrow_mut();
            let Some(state) = items.map.get_mut(&el) else {
                tracing::trace!(
                    target: "mathweave::runtime",
                    ?el,
                    "render requested for an unknown item"
                );
                return;
            };
            if state.update_pending {
                return;
            }
            state.update_pending = true;
        }
        let shared = Rc::clone(shared);
        let scheduler = shared.scheduler.clone();
        scheduler.defer(move || {
            let first = {
                let mut items = shared.items.borrow_mut();
                let Some(state) = items.map.get_mut(&el) else {
                    return;
                };
                state.update_pending = false;
                std::mem::replace(&mut state.first_pass, false)
            };
            // An item removed from the document before this tick still runs
            // to completion; the render is simply inert.
            if !shared.doc.borrow().contains(el) {
                return;
            }
            if first {
                let mut doc = shared.doc.borrow_mut();
                item::reveal_preview(&mut doc, el);
            }
            Shared::render_now(&shared, el);
        });
    }

    fn render_now(shared: &Rc<Shared>, el: NodeId) {
        let handler = {
            let items = shared.items.borrow();
            match items.map.get(&el) {
                Some(state) => Rc::clone(&state.handler),
                None => return,
            }
        };
        item::render(
            &shared.cx(),
            &handler,
            el,
            shared.options.preferred_type.as_str(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::handler::Handler;
    use std::cell::Cell;

    /// Catch-all handler that counts its render-path invocations.
    struct CountingHandler {
        renders: Rc<Cell<usize>>,
    }

    impl Handler for CountingHandler {
        fn can_handle(&self, _doc: &Document, _el: NodeId) -> bool {
            true
        }
        fn render(&self, _cx: &HandlerCx, _el: NodeId) -> bool {
            self.renders.set(self.renders.get() + 1);
            true
        }
    }

    const CONTENT: &str = concat!(
        r#"<math-item><math-source type="text/html">one</math-source></math-item>"#,
        r#"<div class="math-ui"><math-source type="text/html">two</math-source></div>"#,
    );

    fn counting_runtime(doc: Document) -> (MathRuntime, Rc<Cell<usize>>) {
        let renders = Rc::new(Cell::new(0));
        let mut registry = HandlerRegistry::new();
        registry.register(
            "counting",
            Rc::new(CountingHandler {
                renders: Rc::clone(&renders),
            }),
        );
        let runtime = MathRuntime::new(
            Rc::new(RefCell::new(doc)),
            Scheduler::new(),
            registry,
            RuntimeOptions::default(),
        );
        (runtime, renders)
    }

    fn parse_into(doc: &mut Document, markup: &str) {
        let root = doc.root();
        doc.append_fragment(root, markup).expect("parse failed");
    }

    #[test]
    fn simulated_bootstrap_upgrades_every_discoverable_element_once() {
        let mut doc = Document::new();
        parse_into(&mut doc, CONTENT);
        let (runtime, renders) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();

        assert_eq!(runtime.binding(), BindingMode::Simulated);
        assert_eq!(runtime.item_count(), 2);
        assert_eq!(renders.get(), 2);
        assert!(runtime.initialized());

        // idempotent install
        runtime.install();
        runtime.run_until_idle();
        assert_eq!(renders.get(), 2);
    }

    #[test]
    fn native_binding_drains_reactions_to_the_same_effect() {
        let mut doc = Document::with_custom_elements();
        parse_into(&mut doc, CONTENT);
        let (runtime, renders) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();

        assert_eq!(runtime.binding(), BindingMode::Native);
        assert_eq!(runtime.item_count(), 2);
        assert_eq!(renders.get(), 2);
    }

    #[test]
    fn bindings_produce_identical_queries_and_source_visibility() {
        let build = |native: bool| {
            let mut doc = if native {
                Document::with_custom_elements()
            } else {
                Document::new()
            };
            parse_into(&mut doc, CONTENT);
            let (runtime, _) = counting_runtime(doc);
            runtime.install();
            runtime.run_until_idle();
            let doc = runtime.doc();
            let doc = doc.borrow();
            let mut snapshot = Vec::new();
            for el in doc
                .subtree_elements(doc.root())
                .iter()
                .copied()
                .filter(|&el| doc.tag(el) == Some(MATH_SOURCE_TAG))
            {
                snapshot.push((source::source_markup(&doc, el), doc.is_hidden(el)));
            }
            snapshot
        };
        assert_eq!(build(true), build(false));
    }

    #[test]
    fn render_requests_coalesce_within_a_tick() {
        let mut doc = Document::new();
        parse_into(&mut doc, CONTENT);
        let (runtime, renders) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();
        let before = renders.get();

        let el = {
            let doc = runtime.doc();
            let ids = doc.borrow().elements_by_tag(MATH_ITEM_TAG);
            ids[0]
        };
        runtime.request_render(el);
        runtime.request_render(el);
        runtime.request_render(el);
        runtime.run_until_idle();
        assert_eq!(renders.get(), before + 1);
    }

    #[test]
    fn first_pass_reveals_preview_sources() {
        let mut doc = Document::new();
        parse_into(
            &mut doc,
            concat!(
                "<math-item>",
                r#"<math-source type="text/html" usage="preview">preview</math-source>"#,
                "</math-item>",
            ),
        );
        let (runtime, _) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();

        let doc = runtime.doc();
        let doc = doc.borrow();
        let src = doc.elements_by_tag(MATH_SOURCE_TAG)[0];
        assert!(!doc.is_hidden(src));
    }

    #[test]
    fn unknown_explicit_tag_skips_only_that_element() {
        let mut doc = Document::new();
        parse_into(
            &mut doc,
            concat!(
                r#"<math-item data-type="missing"></math-item>"#,
                "<math-item></math-item>",
            ),
        );
        let (runtime, _) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();
        assert_eq!(runtime.item_count(), 1);
    }

    #[test]
    fn removed_items_complete_pending_renders_inertly() {
        let mut doc = Document::new();
        parse_into(&mut doc, CONTENT);
        let (runtime, renders) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();
        let before = renders.get();

        let el = {
            let doc = runtime.doc();
            let ids = doc.borrow().elements_by_tag(MATH_ITEM_TAG);
            ids[0]
        };
        runtime.request_render(el);
        {
            let doc = runtime.doc();
            let mut doc = doc.borrow_mut();
            let root = doc.root();
            doc.remove_child(root, el);
        }
        runtime.run_until_idle();
        assert_eq!(renders.get(), before);
    }

    #[test]
    fn dynamic_native_insertion_upgrades_automatically() {
        let doc = Document::with_custom_elements();
        let (runtime, renders) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();
        assert_eq!(runtime.item_count(), 0);

        {
            let doc = runtime.doc();
            let mut doc = doc.borrow_mut();
            let root = doc.root();
            doc.append_fragment(root, "<math-item></math-item>")
                .expect("parse failed");
        }
        runtime.run_until_idle();
        assert_eq!(runtime.item_count(), 1);
        assert_eq!(renders.get(), 1);
    }

    #[test]
    fn initialized_fires_exactly_once_and_late_listeners_still_run() {
        let mut doc = Document::new();
        parse_into(&mut doc, CONTENT);
        let (runtime, _) = counting_runtime(doc);
        let fired = Rc::new(Cell::new(0));
        {
            let fired = Rc::clone(&fired);
            runtime.on_initialized(move || fired.set(fired.get() + 1));
        }
        runtime.install();
        runtime.run_until_idle();
        assert_eq!(fired.get(), 1);

        {
            let fired = Rc::clone(&fired);
            runtime.on_initialized(move || fired.set(fired.get() + 10));
        }
        runtime.run_until_idle();
        assert_eq!(fired.get(), 11);
    }

    #[test]
    fn manual_entry_points_upgrade_dynamic_insertions() {
        let mut doc = Document::new();
        parse_into(&mut doc, CONTENT);
        let (runtime, renders) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();
        let before = renders.get();

        let el = {
            let doc = runtime.doc();
            let mut doc = doc.borrow_mut();
            let root = doc.root();
            doc.append_fragment(
                root,
                "<math-item><math-source>late</math-source></math-item>",
            )
            .expect("parse failed")[0]
        };
        runtime.manual_create(el, true).expect("manual create");
        runtime.manual_attach(el, true);
        runtime.run_until_idle();

        assert_eq!(runtime.item_count(), 3);
        assert_eq!(renders.get(), before + 1);
        let doc = runtime.doc();
        let doc = doc.borrow();
        let src = doc
            .children(el)
            .iter()
            .copied()
            .find(|&c| doc.tag(c) == Some(MATH_SOURCE_TAG))
            .expect("source");
        assert!(doc.is_hidden(src));
    }

    #[test]
    fn manually_attached_sources_rerender_their_item() {
        let mut doc = Document::new();
        parse_into(&mut doc, CONTENT);
        let (runtime, renders) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();
        let before = renders.get();

        let (el, src) = {
            let doc = runtime.doc();
            let mut doc = doc.borrow_mut();
            let el = doc.elements_by_tag(MATH_ITEM_TAG)[0];
            let src = doc.create_element(MATH_SOURCE_TAG);
            doc.set_text_content(src, "dynamic");
            doc.append_child(el, src);
            (el, src)
        };
        runtime.manual_source_create(src);
        runtime.manual_source_attach(src);
        runtime.run_until_idle();

        assert_eq!(renders.get(), before + 1);
        assert!(runtime.item_id(el).is_some());
        let doc = runtime.doc();
        assert!(doc.borrow().is_hidden(src));
    }

    #[test]
    fn immediate_render_and_clean_pass_through() {
        let mut doc = Document::new();
        parse_into(&mut doc, CONTENT);
        let (runtime, renders) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();

        let el = {
            let doc = runtime.doc();
            let ids = doc.borrow().elements_by_tag(MATH_ITEM_TAG);
            ids[0]
        };
        runtime.clean(el);
        {
            let doc = runtime.doc();
            let doc = doc.borrow();
            for &c in doc.children(el) {
                assert!(doc.is_hidden(c));
            }
        }
        let before = renders.get();
        runtime.render(el);
        assert_eq!(renders.get(), before + 1);
    }

    #[test]
    fn display_names_are_positional() {
        let mut doc = Document::new();
        parse_into(&mut doc, CONTENT);
        let (runtime, _) = counting_runtime(doc);
        runtime.install();
        runtime.run_until_idle();
        let items = {
            let doc = runtime.doc();
            let doc = doc.borrow();
            let mut all = doc
                .subtree_elements(doc.root())
                .into_iter()
                .filter(|&el| runtime.item_id(el).is_some())
                .collect::<Vec<_>>();
            all.sort_by_key(|&el| runtime.item_id(el));
            all
        };
        assert_eq!(runtime.display_name(items[0]).as_deref(), Some("Equation 1"));
        assert_eq!(runtime.display_name(items[1]).as_deref(), Some("Equation 2"));
    }
}
