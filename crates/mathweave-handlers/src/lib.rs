//! mathweave-handlers: the built-in handler strategies.
//!
//! Each handler is one way of discovering and rendering a math item's
//! sources: reading existing content as-is, recognizing embedded math
//! markup, driving the external typesetting engine, or unwrapping an
//! equation-store payload. [`register_defaults`] wires them into a registry
//! with the catch-all at the lowest probing priority, so dispatch can never
//! fail.

use std::rc::Rc;

use mathweave_core::HandlerRegistry;
use mathweave_typeset::{TypesetEngine, TypesetQueue};

pub mod mathml;
pub mod plain;
pub mod prettify;
pub mod shell;
pub mod store;
pub mod typeset;

pub use mathml::{MathMlHandler, is_math_fragment, math_root_markup};
pub use plain::PlainHandler;
pub use prettify::{FormatError, Prettifier, TreeFormatter};
pub use shell::{SourceDescriptor, SourceInspection};
pub use store::EqnStoreHandler;
pub use typeset::TypesetHandler;

/// Standard registration set. Order matters: later registrations take
/// probing priority, so the catch-all goes first and ends up last in the
/// probe, making dispatch total.
pub fn register_defaults<E: TypesetEngine + 'static>(
    registry: &mut HandlerRegistry,
    queue: &TypesetQueue<E>,
) {
    registry.register("plain-html", Rc::new(PlainHandler));
    registry.register("mml", Rc::new(MathMlHandler::new()));
    registry.register("tex", Rc::new(TypesetHandler::formula(queue.clone())));
    registry.register("typeset-mml", Rc::new(TypesetHandler::markup(queue.clone())));
    registry.register("eqnstore", Rc::new(EqnStoreHandler::new()));
}
