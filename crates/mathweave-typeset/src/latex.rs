//! TeX-to-MathML engine adapter.
//!
//! A concrete [`TypesetEngine`] built on `pulldown-latex`. TeX payloads are
//! parsed and rendered to MathML; MathML payloads pass through unchanged
//! (they are already in the engine's serialized form). Batches complete on a
//! deferred scheduler tick, mirroring an engine that shares the caller's
//! single logical thread, and a serialize attempt issued before the batch
//! has run reports `RetryAfter` rather than failing.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use mathweave_core::{NodeId, Scheduler, TYPE_TEX};
use pulldown_latex::config::DisplayMode;
use pulldown_latex::{Parser, RenderConfig, Storage, mathml::push_mathml};

use crate::engine::{EngineError, SerializeOutcome, TypesetEngine, TypesetJob};

/// Delay suggested to callers that serialize before the batch has run.
const POLL_DELAY: Duration = Duration::from_millis(10);

struct JobRecord {
    source: String,
    output: Option<Result<String, String>>,
}

struct LatexState {
    jobs: HashMap<NodeId, JobRecord>,
}

pub struct LatexEngine {
    scheduler: Scheduler,
    state: Rc<RefCell<LatexState>>,
}

/// Render-object handle: one typeset element.
#[derive(Clone, Copy, Debug)]
pub struct LatexRender {
    element: NodeId,
}

impl LatexEngine {
    pub fn new(scheduler: Scheduler) -> Rc<Self> {
        Rc::new(Self {
            scheduler,
            state: Rc::new(RefCell::new(LatexState {
                jobs: HashMap::new(),
            })),
        })
    }
}

fn render_job(job: &TypesetJob) -> Result<String, String> {
    if job.source_type != TYPE_TEX {
        // already MathML; the engine stores it as its internal form
        return Ok(job.markup.clone());
    }
    let storage = Storage::new();
    let parser = Parser::new(&job.markup, &storage);
    let mut config = RenderConfig::default();
    config.display_mode = if job.display {
        DisplayMode::Block
    } else {
        DisplayMode::Inline
    };
    let mut mathml = String::new();
    match push_mathml(&mut mathml, parser, config) {
        Ok(()) => Ok(mathml),
        Err(err) => Err(err.to_string()),
    }
}

impl TypesetEngine for LatexEngine {
    type Render = LatexRender;

    fn name(&self) -> &'static str {
        "latex"
    }

    fn process(&self, batch: Vec<TypesetJob>, done: Box<dyn FnOnce()>) {
        {
            // jobs become visible to lookup immediately; output arrives on a
            // later tick
            let mut state = self.state.borrow_mut();
            for job in &batch {
                state.jobs.insert(
                    job.element,
                    JobRecord {
                        source: job.markup.clone(),
                        output: None,
                    },
                );
            }
        }
        let state = Rc::clone(&self.state);
        self.scheduler.defer(move || {
            for job in &batch {
                let output = render_job(job);
                if let Err(err) = &output {
                    tracing::warn!(
                        target: "mathweave::latex",
                        error = %err,
                        "typesetting failed for one element"
                    );
                }
                if let Some(record) = state.borrow_mut().jobs.get_mut(&job.element) {
                    record.output = Some(output);
                }
            }
            done();
        });
    }

    fn lookup(&self, element: NodeId) -> Option<LatexRender> {
        self.state
            .borrow()
            .jobs
            .contains_key(&element)
            .then_some(LatexRender { element })
    }

    fn serialize(&self, render: &LatexRender) -> Result<SerializeOutcome, EngineError> {
        let state = self.state.borrow();
        match state.jobs.get(&render.element).and_then(|r| r.output.as_ref()) {
            Some(Ok(mathml)) => Ok(SerializeOutcome::Ready(mathml.clone())),
            Some(Err(err)) => Err(EngineError::Typeset(err.clone())),
            None => Ok(SerializeOutcome::RetryAfter(POLL_DELAY)),
        }
    }

    fn original_text(&self, render: &LatexRender) -> String {
        self.state
            .borrow()
            .jobs
            .get(&render.element)
            .map(|r| r.source.clone())
            .unwrap_or_default()
    }
}
