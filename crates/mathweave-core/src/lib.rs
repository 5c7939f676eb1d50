//! mathweave-core: host element model and math item lifecycle.
//!
//! This crate provides:
//! - `Document` - a minimal single-threaded element tree standing in for the host document
//! - source element filtering (`SourceUsage`, `SourceFilter`)
//! - the math item lifecycle (render, clean, source queries, coalesced re-renders)
//! - the dual-mode element runtime (`MathRuntime`) binding that lifecycle onto the
//!   document either through custom-element definitions or a bootstrap walk
//! - the `Handler` capability trait and the insertion-ordered `HandlerRegistry`
//! - the cooperative `Scheduler` every asynchronous step runs on

pub mod dom;
pub mod error;
pub mod handler;
pub mod item;
pub mod registry;
pub mod runtime;
pub mod schedule;
pub mod source;

pub use dom::{Document, LifecyclePhase, NodeId, Reaction};
pub use error::{CoreError, HandlerError};
pub use handler::{Handler, HandlerCx, InitDone, SharedDocument, SourceValueDone, SourcesDone};
pub use item::MainMarkup;
pub use registry::HandlerRegistry;
pub use runtime::{BindingMode, MathRuntime, RuntimeOptions};
pub use schedule::Scheduler;
pub use smol_str::SmolStr;
pub use source::{
    MATH_ITEM_TAG, MATH_SOURCE_TAG, SourceData, SourceFilter, SourceUsage, TYPE_HTML, TYPE_MATHML,
    TYPE_PLAIN, TYPE_TEX,
};
