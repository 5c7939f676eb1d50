//! Source-inspection surface for interactive shells.
//!
//! Aggregates the bound handler's display kinds into serializable
//! descriptors, with asynchronous delivery for engine-backed kinds: entries
//! start unresolved and fill in as the handler delivers, invoking the
//! caller's change notification each time.

use std::cell::RefCell;
use std::rc::Rc;

use mathweave_core::{MathRuntime, NodeId, SmolStr};
use serde::{Deserialize, Serialize};

/// One inspectable source representation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub kind: SmolStr,
    /// Delivered markup; `None` when pending or unavailable.
    pub markup: Option<String>,
    /// Whether delivery has happened (distinguishes pending from
    /// unavailable).
    pub resolved: bool,
}

/// Live view over an item's inspectable sources.
pub struct SourceInspection {
    entries: Rc<RefCell<Vec<SourceDescriptor>>>,
}

impl SourceInspection {
    /// Collect descriptors for the item's available kinds and request each
    /// one's markup. `on_change` runs after every delivery.
    pub fn inspect(
        runtime: &MathRuntime,
        el: NodeId,
        on_change: impl Fn() + 'static,
    ) -> Self {
        let kinds = runtime.source_types(el);
        let entries = Rc::new(RefCell::new(
            kinds
                .iter()
                .map(|kind| SourceDescriptor {
                    kind: kind.clone(),
                    markup: None,
                    resolved: false,
                })
                .collect::<Vec<_>>(),
        ));
        let notify: Rc<dyn Fn()> = Rc::new(on_change);
        for (index, kind) in kinds.iter().enumerate() {
            let entries = Rc::clone(&entries);
            let notify = Rc::clone(&notify);
            runtime.source_for(
                el,
                kind.as_str(),
                Box::new(move |value| {
                    {
                        let mut entries = entries.borrow_mut();
                        if let Some(entry) = entries.get_mut(index) {
                            entry.markup = value;
                            entry.resolved = true;
                        }
                    }
                    notify();
                }),
            );
        }
        Self { entries }
    }

    pub fn entries(&self) -> Vec<SourceDescriptor> {
        self.entries.borrow().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.entries.borrow().iter().all(|e| e.resolved)
    }
}
