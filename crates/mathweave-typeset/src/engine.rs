//! External typesetting engine contract.
//!
//! The engine itself is an external collaborator; this crate consumes it
//! through a narrow surface: batch processing with one completion callback,
//! a lookup from an enqueued element to zero-or-one internal render object,
//! and a serialize operation that may ask to be retried after a delay
//! instead of returning.

use std::time::Duration;

use mathweave_core::NodeId;
use mathweave_core::SmolStr;
use thiserror::Error;

/// Genuine engine failures. The transient retry condition is *not* an error;
/// it travels through [`SerializeOutcome::RetryAfter`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("typesetting failed: {0}")]
    Typeset(String),
    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Outcome of one serialize attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializeOutcome {
    /// The serialized markup.
    Ready(String),
    /// Not a failure: attempt again once the given delay has passed.
    RetryAfter(Duration),
}

/// Payload handed to the engine for one element.
#[derive(Debug, Clone)]
pub struct TypesetJob {
    /// The math item this work belongs to; also the engine's lookup handle.
    pub element: NodeId,
    /// Authored notation, tag-case normalized where applicable.
    pub markup: String,
    /// Media type of the authored notation.
    pub source_type: SmolStr,
    /// Block-level display.
    pub display: bool,
}

/// Narrow contract to the external engine. One batch is processed at a time;
/// `done` runs on the shared scheduler once the whole batch has been dealt
/// with.
pub trait TypesetEngine {
    /// Opaque handle to one internal render object.
    type Render: Clone + 'static;

    fn name(&self) -> &'static str {
        "engine"
    }

    /// Typeset a whole batch, then invoke `done` exactly once.
    fn process(&self, batch: Vec<TypesetJob>, done: Box<dyn FnOnce()>);

    /// The internal render object for an element the engine has seen, if any.
    fn lookup(&self, element: NodeId) -> Option<Self::Render>;

    /// One serialize attempt on an internal render object.
    fn serialize(&self, render: &Self::Render) -> Result<SerializeOutcome, EngineError>;

    /// The authored text behind a render object.
    fn original_text(&self, render: &Self::Render) -> String;
}
