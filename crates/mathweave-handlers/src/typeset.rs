//! Engine-backed handler.
//!
//! Registered twice: once for formula notation (TeX) and once for embedded
//! math markup handed to the engine. `init` enqueues the element's payload
//! and completes with its batch; the render path mounts the engine's output
//! into a fresh presentation container; and once the whole queue settles the
//! engine's serialized internal tree is read back and appended as an
//! export-only source element.

use std::rc::Rc;

use mathweave_core::item;
use mathweave_core::source;
use mathweave_core::{
    Document, Handler, HandlerCx, HandlerError, InitDone, MATH_SOURCE_TAG, NodeId, SmolStr,
    SourceData, SourceFilter, SourceValueDone, SourcesDone, TYPE_MATHML, TYPE_TEX,
};
use mathweave_typeset::{
    TypesetEngine, TypesetJob, TypesetQueue, lowercase_tag_names, serialize_with_retry,
};

#[derive(Clone)]
struct SourceTag {
    kind: SmolStr,
    subtype: SmolStr,
}

pub struct TypesetHandler<E: TypesetEngine> {
    queue: TypesetQueue<E>,
    original: SourceTag,
    internal: SourceTag,
    /// Media type of the authored sources this registration consumes.
    consumes: SmolStr,
}

impl<E: TypesetEngine + 'static> TypesetHandler<E> {
    /// Formula-source registration: authored TeX in, engine markup out.
    pub fn formula(queue: TypesetQueue<E>) -> Self {
        let engine_name = queue.engine().name();
        Self {
            original: SourceTag {
                kind: SmolStr::new_static("TeX"),
                subtype: SmolStr::new_static("original"),
            },
            internal: SourceTag {
                kind: SmolStr::new_static("MathML"),
                subtype: SmolStr::new(engine_name),
            },
            consumes: SmolStr::new_static(TYPE_TEX),
            queue,
        }
    }

    /// Embedded-markup registration: authored MathML handed to the engine.
    pub fn markup(queue: TypesetQueue<E>) -> Self {
        let engine_name = queue.engine().name();
        Self {
            original: SourceTag {
                kind: SmolStr::new_static("MathML"),
                subtype: SmolStr::new_static("original"),
            },
            internal: SourceTag {
                kind: SmolStr::new_static("MathML"),
                subtype: SmolStr::new(engine_name),
            },
            consumes: SmolStr::new_static(TYPE_MATHML),
            queue,
        }
    }

    fn engine(&self) -> Rc<E> {
        self.queue.engine()
    }

    /// Build the engine payload from the first render-eligible source of the
    /// consumed media type.
    fn job(&self, doc: &Document, el: NodeId) -> Option<TypesetJob> {
        let sources = item::get_sources(
            doc,
            el,
            &SourceFilter::new()
                .with_render(true)
                .with_type(self.consumes.clone()),
        );
        let &first = sources.first()?;
        let mut markup = source::source_markup(doc, first);
        if self.consumes == TYPE_MATHML {
            // the engine is case-sensitive on tag names
            markup = lowercase_tag_names(&markup);
        }
        let display = doc
            .attr(el, "display")
            .map(|v| v == "block")
            .unwrap_or(true);
        Some(TypesetJob {
            element: el,
            markup,
            source_type: self.consumes.clone(),
            display,
        })
    }
}

/// Mount the engine's serialized output into the presentation container,
/// retrying while the engine is still working. Genuine failures degrade to
/// revealing the authored sources.
fn mount_output<E: TypesetEngine + 'static>(
    engine: Rc<E>,
    cx: HandlerCx,
    el: NodeId,
    mount: NodeId,
    render: E::Render,
) {
    let scheduler = cx.scheduler.clone();
    let doc = cx.doc;
    serialize_with_retry(
        &engine,
        &scheduler,
        render,
        Box::new(move |result| {
            let mut doc = doc.borrow_mut();
            if !doc.contains(mount) {
                return;
            }
            let markup = match result {
                Ok(markup) => markup,
                Err(err) => {
                    tracing::warn!(
                        target: "mathweave::typeset",
                        error = %err,
                        "engine failed; revealing authored sources"
                    );
                    let to_show = item::get_sources(&doc, el, &SourceFilter::new().with_render(true));
                    item::show_sources(&mut doc, el, &to_show);
                    return;
                }
            };
            if let Err(err) = doc.append_fragment(mount, &markup) {
                tracing::warn!(
                    target: "mathweave::typeset",
                    error = %err,
                    "engine output is not well-formed; revealing authored sources"
                );
                let to_show = item::get_sources(&doc, el, &SourceFilter::new().with_render(true));
                item::show_sources(&mut doc, el, &to_show);
            }
        }),
    );
}

/// Queue-settled continuation: read the engine's internal tree back and
/// append it as a hidden export-only source, tagged with the engine name.
fn readback_settled<E: TypesetEngine + 'static>(
    engine: Rc<E>,
    cx: HandlerCx,
    el: NodeId,
) -> impl FnOnce() + 'static {
    move || {
        let Some(render) = engine.lookup(el) else {
            return;
        };
        let scheduler = cx.scheduler.clone();
        let doc = cx.doc;
        let engine_name = engine.name();
        serialize_with_retry(
            &engine,
            &scheduler,
            render,
            Box::new(move |result| {
                let markup = match result {
                    Ok(markup) => markup,
                    Err(err) => {
                        tracing::warn!(
                            target: "mathweave::typeset",
                            error = %err,
                            "skipping engine markup read-back"
                        );
                        return;
                    }
                };
                let mut doc = doc.borrow_mut();
                if !doc.contains(el) {
                    return;
                }
                let already = source::source_elements(&doc, el)
                    .iter()
                    .any(|&s| doc.attr(s, "name") == Some(engine_name));
                if already {
                    return;
                }
                let src = doc.create_element(MATH_SOURCE_TAG);
                doc.set_hidden(src, true);
                doc.set_attr(src, "type", TYPE_MATHML);
                doc.set_attr(src, "usage", "norender");
                doc.set_attr(src, "name", engine_name);
                doc.set_text_content(src, markup);
                doc.append_child(el, src);
            }),
        );
    }
}

impl<E: TypesetEngine + 'static> Handler for TypesetHandler<E> {
    fn init(&self, cx: &HandlerCx, el: NodeId, done: InitDone) {
        let job = {
            let doc = cx.doc.borrow();
            self.job(&doc, el)
        };
        let Some(job) = job else {
            done(Ok(()));
            return;
        };
        let settled = readback_settled(self.engine(), cx.clone(), el);
        self.queue.enqueue(job, move || done(Ok(())), settled);
    }

    fn render(&self, cx: &HandlerCx, el: NodeId) -> bool {
        let job = {
            let doc = cx.doc.borrow();
            self.job(&doc, el)
        };
        let Some(job) = job else {
            return false;
        };
        let mount = {
            let mut doc = cx.doc.borrow_mut();
            item::insert_presentation(&mut doc, el)
        };
        let engine = self.engine();
        match engine.lookup(el) {
            Some(render) => mount_output(engine, cx.clone(), el, mount, render),
            None => {
                // not typeset yet (dynamic insertion, or render without init)
                let mount_cx = cx.clone();
                let mount_engine = Rc::clone(&engine);
                let settled = readback_settled(Rc::clone(&engine), cx.clone(), el);
                self.queue.enqueue(
                    job,
                    move || {
                        if let Some(render) = mount_engine.lookup(el) {
                            mount_output(mount_engine, mount_cx, el, mount, render);
                        }
                    },
                    settled,
                );
            }
        }
        true
    }

    fn sources(&self, cx: &HandlerCx, el: NodeId, done: SourcesDone) {
        let engine = self.engine();
        let Some(render) = engine.lookup(el) else {
            done(Ok(Vec::new()));
            return;
        };
        let mut out = vec![SourceData {
            kind: self.original.kind.clone(),
            subtype: Some(self.original.subtype.clone()),
            markup: engine.original_text(&render),
        }];
        let internal = self.internal.clone();
        let scheduler = cx.scheduler.clone();
        serialize_with_retry(
            &engine,
            &scheduler,
            render,
            Box::new(move |result| match result {
                Ok(markup) => {
                    out.push(SourceData {
                        kind: internal.kind,
                        subtype: Some(internal.subtype),
                        markup,
                    });
                    done(Ok(out));
                }
                Err(err) => done(Err(HandlerError::Engine(err.to_string()))),
            }),
        );
    }

    fn clone_presentation(&self, doc: &mut Document, from: NodeId, to: NodeId) {
        let mounts: Vec<_> = doc
            .children(from)
            .iter()
            .copied()
            .filter(|&c| doc.tag(c) == Some(item::PRESENTATION_TAG))
            .collect();
        if mounts.is_empty() {
            doc.clone_children(from, to);
            return;
        }
        for mount in mounts {
            doc.clone_children(mount, to);
        }
    }

    fn source_types(&self, _doc: &Document, el: NodeId) -> Vec<SmolStr> {
        if self.engine().lookup(el).is_none() {
            return Vec::new();
        }
        let mut kinds = vec![self.original.kind.clone()];
        if self.internal.kind != self.original.kind {
            kinds.push(self.internal.kind.clone());
        }
        kinds
    }

    fn source_for(&self, cx: &HandlerCx, kind: &str, el: NodeId, done: SourceValueDone) {
        let engine = self.engine();
        let Some(render) = engine.lookup(el) else {
            done(None);
            return;
        };
        if kind == self.original.kind {
            done(Some(engine.original_text(&render)));
        } else if kind == self.internal.kind {
            let scheduler = cx.scheduler.clone();
            serialize_with_retry(
                &engine,
                &scheduler,
                render,
                Box::new(move |result| match result {
                    Ok(markup) => done(Some(markup)),
                    Err(err) => {
                        tracing::warn!(
                            target: "mathweave::typeset",
                            error = %err,
                            "engine markup unavailable"
                        );
                        done(None);
                    }
                }),
            );
        } else {
            done(None);
        }
    }
}
