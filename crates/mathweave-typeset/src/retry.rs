//! Serialization-with-retry continuation protocol.
//!
//! The engine's serialize operation may return `RetryAfter(delay)` instead of
//! a result. That is not a failure: the attempt is rescheduled on the shared
//! scheduler after the indicated delay, any number of times, until markup or
//! a genuine error arrives. Callers never observe the retry condition.

use std::rc::Rc;

use mathweave_core::Scheduler;

use crate::engine::{EngineError, SerializeOutcome, TypesetEngine};

/// Delivery callback: serialized markup or a genuine engine error.
pub type SerializeDone = Box<dyn FnOnce(Result<String, EngineError>)>;

/// Drive `serialize` on `render` to completion, looping retry signals through
/// `scheduler` deferrals.
pub fn serialize_with_retry<E: TypesetEngine + 'static>(
    engine: &Rc<E>,
    scheduler: &Scheduler,
    render: E::Render,
    done: SerializeDone,
) {
    attempt(Rc::clone(engine), scheduler.clone(), render, done);
}

fn attempt<E: TypesetEngine + 'static>(
    engine: Rc<E>,
    scheduler: Scheduler,
    render: E::Render,
    done: SerializeDone,
) {
    match engine.serialize(&render) {
        Ok(SerializeOutcome::Ready(markup)) => done(Ok(markup)),
        Ok(SerializeOutcome::RetryAfter(delay)) => {
            tracing::trace!(
                target: "mathweave::retry",
                delay_ms = delay.as_millis() as u64,
                "serialize asked to be retried"
            );
            let rescheduler = scheduler.clone();
            scheduler.defer_after(delay, move || {
                attempt(engine, rescheduler, render, done);
            });
        }
        Err(err) => done(Err(err)),
    }
}
