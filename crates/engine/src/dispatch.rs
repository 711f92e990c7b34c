//! Event dispatch over the in-memory document.
//!
//! Listeners are registered as (binding, handler) pairs. A dispatch walks the
//! target's ancestors invoking node-bound listeners innermost first, then
//! runs document-level listeners in registration order. Delegated listeners
//! fire only when `closest(target, selector)` finds a match and receive the
//! matched node. Work deferred by a handler runs after every listener has
//! returned, the way a zero-delay timer would in a browser.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use futures_util::future::join_all;
use portal_dom::{NodeId, SelectorList};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::SharedDocument;
use crate::regions::{PendingRefresh, RefreshOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    Submit,
}

/// Where a listener is attached.
#[derive(Clone, Debug)]
pub enum Binding {
    /// Fires when the event target is this node or one of its descendants.
    Node(NodeId),
    /// Document-level listener matched by ancestor selector.
    Delegated(SelectorList),
    /// Document-level listener that sees every event of its kind.
    Document,
}

type Handler = Rc<dyn Fn(&DomEvent, NodeId)>;

#[derive(Clone)]
struct Listener {
    kind: EventKind,
    binding: Binding,
    handler: Handler,
}

/// State of one event as it travels through the listeners.
pub struct DomEvent {
    pub kind: EventKind,
    pub target: NodeId,
    /// Control that was focused when a form was submitted.
    pub submitter: Option<NodeId>,
    default_prevented: Cell<bool>,
    pending: RefCell<Vec<PendingRefresh>>,
    deferred: DeferredTasks,
}

impl DomEvent {
    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    /// Hands an in-flight refresh back to whoever dispatched the event.
    pub fn track(&self, refresh: PendingRefresh) {
        self.pending.borrow_mut().push(refresh);
    }

    /// Queues work to run once dispatch has finished.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.deferred.push(task);
    }
}

impl fmt::Debug for DomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomEvent")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("submitter", &self.submitter)
            .field("default_prevented", &self.default_prevented.get())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

#[derive(Clone, Default)]
struct DeferredTasks(Rc<RefCell<VecDeque<Box<dyn FnOnce()>>>>);

impl DeferredTasks {
    fn push(&self, task: impl FnOnce() + 'static) {
        self.0.borrow_mut().push_back(Box::new(task));
    }

    fn run_all(&self) {
        loop {
            let next = self.0.borrow_mut().pop_front();
            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

/// What a dispatch left behind.
#[must_use = "refreshes do nothing unless settled or spawned"]
pub struct DispatchOutcome {
    pub default_prevented: bool,
    /// Refreshes started by the listeners, not yet resolved.
    pub pending: Vec<PendingRefresh>,
}

impl DispatchOutcome {
    fn ignored() -> Self {
        Self {
            default_prevented: false,
            pending: Vec::new(),
        }
    }

    /// Drives every pending refresh to completion concurrently.
    pub async fn settle(self) -> Vec<RefreshOutcome> {
        join_all(self.pending).await
    }

    /// Detaches the pending refreshes onto the current `LocalSet`.
    pub fn spawn_local(self) -> Vec<JoinHandle<RefreshOutcome>> {
        self.pending.into_iter().map(tokio::task::spawn_local).collect()
    }
}

impl fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchOutcome")
            .field("default_prevented", &self.default_prevented)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Registry of listeners for one page view.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RefCell<Vec<Listener>>,
    deferred: DeferredTasks,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(&self, kind: EventKind, binding: Binding, handler: impl Fn(&DomEvent, NodeId) + 'static) {
        self.listeners.borrow_mut().push(Listener {
            kind,
            binding,
            handler: Rc::new(handler),
        });
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Dispatches one event and runs any work deferred by its listeners.
    ///
    /// Clicks on disabled form controls are dropped, as browsers do.
    pub fn dispatch(
        &self,
        document: &SharedDocument,
        kind: EventKind,
        target: NodeId,
        submitter: Option<NodeId>,
    ) -> DispatchOutcome {
        let invocations = {
            let document = document.borrow();
            if kind == EventKind::Click && targets_disabled_control(&document, target) {
                trace!(?target, "click on disabled control ignored");
                return DispatchOutcome::ignored();
            }

            let listeners: Vec<Listener> = self
                .listeners
                .borrow()
                .iter()
                .filter(|listener| listener.kind == kind)
                .cloned()
                .collect();

            let mut invocations: Vec<(Handler, NodeId)> = Vec::new();
            for node in document.ancestors_inclusive(target) {
                for listener in &listeners {
                    if matches!(listener.binding, Binding::Node(bound) if bound == node) {
                        invocations.push((listener.handler.clone(), node));
                    }
                }
            }
            for listener in &listeners {
                match &listener.binding {
                    Binding::Node(_) => {}
                    Binding::Document => invocations.push((listener.handler.clone(), target)),
                    Binding::Delegated(selector) => {
                        if let Some(matched) = document.closest(target, selector) {
                            invocations.push((listener.handler.clone(), matched));
                        }
                    }
                }
            }
            invocations
        };

        let event = DomEvent {
            kind,
            target,
            submitter,
            default_prevented: Cell::new(false),
            pending: RefCell::new(Vec::new()),
            deferred: self.deferred.clone(),
        };
        for (handler, current) in invocations {
            handler(&event, current);
        }
        self.deferred.run_all();

        DispatchOutcome {
            default_prevented: event.default_prevented.get(),
            pending: event.pending.into_inner(),
        }
    }
}

fn targets_disabled_control(document: &portal_dom::Document, target: NodeId) -> bool {
    document.ancestors_inclusive(target).any(|node| {
        matches!(document.tag_name(node), Some("button" | "input" | "select" | "textarea"))
            && document.is_disabled(node)
    })
}
