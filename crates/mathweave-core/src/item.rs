//! Math item behavior: source queries, cleaning, and rendering.
//!
//! These functions operate on a container element owning source children.
//! Lifecycle bookkeeping (ids, coalescing flags, handler binding) lives in
//! [`runtime`](crate::runtime); this module is the behavior both runtime
//! bindings delegate to, which is what makes them observably equivalent.

use std::rc::Rc;

use smol_str::SmolStr;

use crate::dom::{Document, NodeId};
use crate::handler::{Handler, HandlerCx};
use crate::source::{
    self, SourceFilter, TYPE_HTML, TYPE_MATHML, TYPE_TEX,
};

/// Tag of the presentation container mounted by render paths. Cleaning
/// removes it along with any other non-source child.
pub const PRESENTATION_TAG: &str = "math-presentation";

/// Markup-export priority for [`main_markup`].
const MARKUP_PREFERENCE: [&str; 3] = [TYPE_MATHML, TYPE_TEX, TYPE_HTML];

/// Per-item lifecycle state tracked by the runtime.
pub struct ItemState {
    /// Monotonically increasing id, stable for the element's lifetime.
    pub id: u64,
    /// Positional display name ("Equation N").
    pub display_name: String,
    /// The one handler bound at construction; never reassigned.
    pub(crate) handler: Rc<dyn Handler>,
    /// Coalescing flag: at most one queued render per item.
    pub(crate) update_pending: bool,
    /// True until the first render pass has run.
    pub(crate) first_pass: bool,
    /// Set once the handler's `init` completed successfully.
    pub(crate) interactive: bool,
}

/// The first markup-eligible source in export priority order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MainMarkup {
    pub source_type: SmolStr,
    pub markup: String,
}

/// Source children matching `filter`, document order.
pub fn get_sources(doc: &Document, item: NodeId, filter: &SourceFilter) -> Vec<NodeId> {
    source::source_elements(doc, item)
        .into_iter()
        .filter(|&s| {
            filter.matches(
                source::source_usage(doc, s),
                source::source_type(doc, s).as_str(),
            )
        })
        .collect()
}

/// First markup-eligible source whose type matches the fixed priority order
/// (MathML over TeX over HTML).
pub fn main_markup(doc: &Document, item: NodeId) -> Option<MainMarkup> {
    for ty in MARKUP_PREFERENCE {
        let found = get_sources(doc, item, &SourceFilter::new().with_markup(true).with_type(ty));
        if let Some(&first) = found.first() {
            return Some(MainMarkup {
                source_type: SmolStr::new_static(ty),
                markup: source::source_markup(doc, first),
            });
        }
    }
    None
}

/// Remove all non-source children, hide source children, and with them any
/// previously mounted presentation. Safe to call when already clean.
pub fn clean(doc: &mut Document, item: NodeId) {
    for c in doc.children(item).to_vec() {
        if source::is_source_element(doc, c) {
            doc.set_hidden(c, true);
        } else {
            doc.remove_child(item, c);
        }
    }
}

/// Clean, then reveal the given sources.
pub fn show_sources(doc: &mut Document, item: NodeId, sources: &[NodeId]) {
    clean(doc, item);
    for &s in sources {
        doc.set_hidden(s, false);
    }
}

/// Clean, then mount and return a fresh presentation container for
/// handler-produced output.
pub fn insert_presentation(doc: &mut Document, item: NodeId) -> NodeId {
    clean(doc, item);
    let mount = doc.create_element(PRESENTATION_TAG);
    doc.append_child(item, mount);
    mount
}

/// First-pass preview: reveal sources excluded from both rendering and
/// markup export (usage `preview`) ahead of the full render.
pub fn reveal_preview(doc: &mut Document, item: NodeId) {
    let previews = get_sources(
        doc,
        item,
        &SourceFilter::new().with_render(false).with_markup(false),
    );
    for s in previews {
        doc.set_hidden(s, false);
    }
}

/// Full render: the bound handler's render path first, then the generic path
/// revealing render-eligible sources of the preferred display type. An
/// element with neither keeps its current content (raw authored markup).
pub fn render(cx: &HandlerCx, handler: &Rc<dyn Handler>, item: NodeId, preferred: &str) {
    if handler.render(cx, item) {
        return;
    }
    let mut doc = cx.doc.borrow_mut();
    let to_show = get_sources(
        &doc,
        item,
        &SourceFilter::new().with_render(true).with_type(preferred),
    );
    if !to_show.is_empty() {
        show_sources(&mut doc, item, &to_show);
    } else {
        tracing::trace!(
            target: "mathweave::item",
            ?item,
            "no render path and no eligible sources; keeping raw content"
        );
    }
}
