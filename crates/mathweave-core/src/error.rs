//! Error types for the core crate.

use smol_str::SmolStr;
use thiserror::Error;

/// Errors raised by the host element model and the runtime.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An explicit type tag named a handler that is not registered.
    #[error("no handler registered for type tag `{0}`")]
    UnknownTypeTag(SmolStr),
    /// Probe dispatch found no handler willing to take the element.
    #[error("no handler matches the element and no catch-all is registered")]
    NoMatchingHandler,
    /// A markup fragment failed to parse.
    #[error("malformed markup fragment: {0}")]
    MalformedMarkup(String),
}

/// Errors delivered through handler completion callbacks.
///
/// Only genuine failures travel here; the typesetting retry condition is
/// handled below the handler surface and never surfaces as an error.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The external typesetting engine failed.
    #[error("typesetting engine failed: {0}")]
    Engine(String),
    /// The markup formatting collaborator failed.
    #[error("markup formatting failed: {0}")]
    Format(String),
}
