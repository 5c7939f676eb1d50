//! The typesetting render queue.
//!
//! Serializes calls into the engine: requests accumulate into a batch, one
//! batch is in flight at a time, and each batch is handed over whole with a
//! single completion callback. Per-request `on_done` callbacks fire in
//! enqueue order when their batch completes; `on_settled` callbacks fire only
//! once the whole queue has drained. Requests enqueued from inside a
//! completion callback land in the next batch - they never join the batch in
//! flight.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::{TypesetEngine, TypesetJob};

type Callback = Box<dyn FnOnce()>;

struct QueueState {
    /// Requests for the next batch.
    pending: Vec<(TypesetJob, Callback)>,
    /// Drained-queue callbacks accumulated across batches.
    post: Vec<Callback>,
    /// A batch is in flight.
    processing: bool,
}

struct QueueInner<E: TypesetEngine> {
    engine: Rc<E>,
    state: RefCell<QueueState>,
}

/// Cheap-clone handle to the queue; all clones share the same batch state.
pub struct TypesetQueue<E: TypesetEngine> {
    inner: Rc<QueueInner<E>>,
}

impl<E: TypesetEngine> Clone for TypesetQueue<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: TypesetEngine + 'static> TypesetQueue<E> {
    pub fn new(engine: Rc<E>) -> Self {
        Self {
            inner: Rc::new(QueueInner {
                engine,
                state: RefCell::new(QueueState {
                    pending: Vec::new(),
                    post: Vec::new(),
                    processing: false,
                }),
            }),
        }
    }

    pub fn engine(&self) -> Rc<E> {
        Rc::clone(&self.inner.engine)
    }

    /// Append a request. Dispatches immediately when the queue is idle;
    /// otherwise the request waits for the next batch.
    pub fn enqueue(
        &self,
        job: TypesetJob,
        on_done: impl FnOnce() + 'static,
        on_settled: impl FnOnce() + 'static,
    ) {
        let start = {
            let mut state = self.inner.state.borrow_mut();
            state.pending.push((job, Box::new(on_done)));
            state.post.push(Box::new(on_settled));
            if state.processing {
                false
            } else {
                state.processing = true;
                true
            }
        };
        if start {
            self.dispatch();
        }
    }

    fn dispatch(&self) {
        let (jobs, dones): (Vec<_>, Vec<_>) = {
            let mut state = self.inner.state.borrow_mut();
            std::mem::take(&mut state.pending).into_iter().unzip()
        };
        tracing::debug!(
            target: "mathweave::queue",
            batch = jobs.len(),
            "dispatching typeset batch"
        );
        let this = self.clone();
        self.inner
            .engine
            .process(jobs, Box::new(move || this.batch_complete(dones)));
    }

    fn batch_complete(&self, dones: Vec<Callback>) {
        // Enqueue order; a callback may re-enter `enqueue` and will be routed
        // into the pending batch because `processing` is still set.
        for done in dones {
            done();
        }
        enum Next {
            Dispatch,
            Settle(Vec<Callback>),
        }
        let next = {
            let mut state = self.inner.state.borrow_mut();
            if state.pending.is_empty() {
                state.processing = false;
                Next::Settle(std::mem::take(&mut state.post))
            } else {
                Next::Dispatch
            }
        };
        match next {
            Next::Dispatch => self.dispatch(),
            Next::Settle(post) => {
                tracing::debug!(
                    target: "mathweave::queue",
                    settled = post.len(),
                    "typeset queue drained"
                );
                for settle in post {
                    settle();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, SerializeOutcome};
    use mathweave_core::{Document, NodeId, SmolStr};
    use std::cell::RefCell;

    /// Engine whose batch completions are released by hand.
    struct ManualEngine {
        batches: RefCell<Vec<(Vec<TypesetJob>, Box<dyn FnOnce()>)>>,
    }

    impl ManualEngine {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                batches: RefCell::new(Vec::new()),
            })
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.borrow().iter().map(|(b, _)| b.len()).collect()
        }

        fn complete_next(&self) {
            let (_, done) = self.batches.borrow_mut().remove(0);
            done();
        }
    }

    impl TypesetEngine for ManualEngine {
        type Render = ();

        fn process(&self, batch: Vec<TypesetJob>, done: Box<dyn FnOnce()>) {
            self.batches.borrow_mut().push((batch, done));
        }
        fn lookup(&self, _element: NodeId) -> Option<()> {
            None
        }
        fn serialize(&self, _render: &()) -> Result<SerializeOutcome, EngineError> {
            Ok(SerializeOutcome::Ready(String::new()))
        }
        fn original_text(&self, _render: &()) -> String {
            String::new()
        }
    }

    fn job(element: NodeId, markup: &str) -> TypesetJob {
        TypesetJob {
            element,
            markup: markup.to_string(),
            source_type: SmolStr::new_static("application/x-tex"),
            display: true,
        }
    }

    fn elements(n: usize) -> Vec<NodeId> {
        let mut doc = Document::new();
        let root = doc.root();
        (0..n)
            .map(|_| {
                let el = doc.create_element("eq");
                doc.append_child(root, el);
                el
            })
            .collect()
    }

    #[test]
    fn done_callbacks_fire_in_enqueue_order_then_settled() {
        let engine = ManualEngine::new();
        let queue = TypesetQueue::new(Rc::clone(&engine));
        let els = elements(2);
        let log = Rc::new(RefCell::new(Vec::new()));

        for (i, &el) in els.iter().enumerate() {
            let log_done = Rc::clone(&log);
            let log_settled = Rc::clone(&log);
            queue.enqueue(
                job(el, "x"),
                move || log_done.borrow_mut().push(format!("done{i}")),
                move || log_settled.borrow_mut().push(format!("settled{i}")),
            );
        }
        // first enqueue dispatched immediately with a batch of one; the
        // second waited
        assert_eq!(engine.batch_sizes(), vec![1]);

        engine.complete_next();
        assert_eq!(engine.batch_sizes(), vec![1]);
        engine.complete_next();
        assert_eq!(
            *log.borrow(),
            vec!["done0", "done1", "settled0", "settled1"]
        );
    }

    #[test]
    fn reentrant_enqueue_lands_in_the_next_batch() {
        let engine = ManualEngine::new();
        let queue = TypesetQueue::new(Rc::clone(&engine));
        let els = elements(2);
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let queue2 = queue.clone();
            let log_outer = Rc::clone(&log);
            let log_settled = Rc::clone(&log);
            let inner_el = els[1];
            queue.enqueue(
                job(els[0], "x"),
                move || {
                    log_outer.borrow_mut().push("outer done".to_string());
                    let log_inner = Rc::clone(&log_outer);
                    queue2.enqueue(
                        job(inner_el, "y"),
                        move || log_inner.borrow_mut().push("inner done".to_string()),
                        || {},
                    );
                },
                move || log_settled.borrow_mut().push("settled".to_string()),
            );
        }

        engine.complete_next();
        // the reentrant request formed a fresh batch; nothing settled yet
        assert_eq!(*log.borrow(), vec!["outer done"]);
        assert_eq!(engine.batch_sizes(), vec![1]);

        engine.complete_next();
        assert_eq!(*log.borrow(), vec!["outer done", "inner done", "settled"]);
    }

    #[test]
    fn settled_fires_only_after_the_whole_queue_drains() {
        let engine = ManualEngine::new();
        let queue = TypesetQueue::new(Rc::clone(&engine));
        let els = elements(3);
        let settled = Rc::new(RefCell::new(0));

        for &el in &els {
            let settled = Rc::clone(&settled);
            queue.enqueue(job(el, "x"), || {}, move || *settled.borrow_mut() += 1);
        }
        engine.complete_next();
        assert_eq!(*settled.borrow(), 0);
        engine.complete_next();
        // all three settled callbacks fire together at drain
        assert_eq!(*settled.borrow(), 3);
    }

    #[test]
    fn queue_returns_to_idle_and_accepts_new_work() {
        let engine = ManualEngine::new();
        let queue = TypesetQueue::new(Rc::clone(&engine));
        let els = elements(2);

        queue.enqueue(job(els[0], "x"), || {}, || {});
        engine.complete_next();

        queue.enqueue(job(els[1], "y"), || {}, || {});
        // idle again, so the new request dispatched immediately
        assert_eq!(engine.batch_sizes(), vec![1]);
        engine.complete_next();
    }
}
