//! mathweave-typeset: serialized access to an external typesetting engine.
//!
//! The engine is stateful and single-threaded; callers never talk to it
//! directly. Instead they enqueue work on a [`TypesetQueue`], which batches
//! requests, hands each batch to the engine with a single completion
//! callback, and fires per-request and queue-drained callbacks in order.
//!
//! Reading markup back out of the engine is a retry-capable operation:
//! [`serialize_with_retry`] loops the engine's `RetryAfter` outcome through
//! the shared scheduler until a result or a genuine error arrives.

pub mod engine;
pub mod latex;
pub mod markup;
pub mod queue;
pub mod retry;

pub use engine::{EngineError, SerializeOutcome, TypesetEngine, TypesetJob};
pub use latex::LatexEngine;
pub use markup::lowercase_tag_names;
pub use queue::TypesetQueue;
pub use retry::serialize_with_retry;
