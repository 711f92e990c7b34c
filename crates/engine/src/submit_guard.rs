//! Duplicate-submission guard.
//!
//! Once a form is actually sent, its submitter is disabled and shows a
//! spinner. A named submitter's value is carried over in a hidden input since
//! disabled controls are left out of the form data.

use portal_dom::{DomError, NodeId, SelectorList};
use tracing::{debug, warn};

use crate::SharedDocument;
use crate::dispatch::DomEvent;

const FALLBACK_SUBMITTER: &str = r#"button[type="submit"], input[type="submit"]"#;
const SPINNER_CLASS: &str = "spinner-border spinner-border-sm me-2";

/// What the guard did with one submit event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// Another listener already cancelled the submission.
    AlreadyPrevented,
    NoSubmitter,
    /// The submitter is a plain `type="button"` control.
    ButtonType(NodeId),
    /// The submitter will be disabled once dispatch completes.
    Locked {
        submitter: NodeId,
        preserved_name: Option<String>,
    },
}

pub struct SubmitGuard {
    document: SharedDocument,
    fallback: Option<SelectorList>,
}

impl SubmitGuard {
    pub fn new(document: SharedDocument) -> Self {
        Self {
            document,
            fallback: FALLBACK_SUBMITTER.parse().ok(),
        }
    }

    pub fn on_submit(&self, event: &DomEvent, form: NodeId) -> GuardDecision {
        if event.default_prevented() {
            return GuardDecision::AlreadyPrevented;
        }

        let Some(submitter) = self.submitter(event, form) else {
            return GuardDecision::NoSubmitter;
        };
        if self
            .document
            .borrow()
            .attribute(submitter, "type")
            .is_some_and(|kind| kind.eq_ignore_ascii_case("button"))
        {
            return GuardDecision::ButtonType(submitter);
        }

        let preserved_name = match self.preserve_value(form, submitter) {
            Ok(name) => name,
            Err(error) => {
                warn!(%error, "could not preserve submitter value");
                None
            }
        };

        let document = self.document.clone();
        event.defer(move || {
            if let Err(error) = lock(&document, submitter) {
                warn!(%error, "could not lock submitter");
            }
        });
        debug!(?submitter, ?preserved_name, "submitter locked");
        GuardDecision::Locked {
            submitter,
            preserved_name,
        }
    }

    fn submitter(&self, event: &DomEvent, form: NodeId) -> Option<NodeId> {
        let document = self.document.borrow();
        event
            .submitter
            .filter(|active| match document.tag_name(*active) {
                Some("button") => true,
                Some("input") => document
                    .attribute(*active, "type")
                    .is_some_and(|kind| kind.eq_ignore_ascii_case("submit")),
                _ => false,
            })
            .or_else(|| {
                self.fallback
                    .as_ref()
                    .and_then(|selector| document.select_first(form, selector))
            })
    }

    fn preserve_value(&self, form: NodeId, submitter: NodeId) -> Result<Option<String>, DomError> {
        let mut document = self.document.borrow_mut();
        let Some(name) = document
            .attribute(submitter, "name")
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            return Ok(None);
        };
        let value = document.value(submitter).unwrap_or_default();

        let hidden = document.create_element("input");
        document.set_attribute(hidden, "type", "hidden")?;
        document.set_attribute(hidden, "name", name.as_str())?;
        document.set_attribute(hidden, "value", value)?;
        document.append_child(form, hidden)?;
        Ok(Some(name))
    }
}

fn lock(document: &SharedDocument, submitter: NodeId) -> Result<(), DomError> {
    let mut document = document.borrow_mut();
    document.set_disabled(submitter, true)?;
    let spinner = document.create_element("span");
    document.set_attribute(spinner, "class", SPINNER_CLASS)?;
    document.set_attribute(spinner, "role", "status")?;
    document.set_attribute(spinner, "aria-hidden", "true")?;
    document.prepend_child(submitter, spinner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Binding, EventDispatcher, EventKind};
    use portal_dom::Document;
    use std::cell::RefCell;
    use std::rc::Rc;

    const FORM: &str = r#"<form id="approve" method="post">
        <input name="comment" value="ok">
        <button type="button" id="preview">Preview</button>
        <button type="submit" id="decide" name="decision" value="approve">Approve</button>
      </form>"#;

    fn guarded(markup: &str) -> (SharedDocument, EventDispatcher, Rc<RefCell<Vec<GuardDecision>>>) {
        let document: SharedDocument = Rc::new(RefCell::new(Document::parse(markup)));
        let dispatcher = EventDispatcher::new();
        let guard = SubmitGuard::new(document.clone());
        let decisions = Rc::new(RefCell::new(Vec::new()));
        let log = decisions.clone();
        dispatcher.listen(EventKind::Submit, Binding::Document, move |event, _| {
            log.borrow_mut().push(guard.on_submit(event, event.target));
        });
        (document, dispatcher, decisions)
    }

    fn node(document: &SharedDocument, id: &str) -> NodeId {
        document.borrow().get_element_by_id(id).unwrap()
    }

    #[test]
    fn named_submitter_is_preserved_and_locked_after_dispatch() {
        let (document, dispatcher, decisions) = guarded(FORM);
        let form = node(&document, "approve");
        let button = node(&document, "decide");

        let _ = dispatcher.dispatch(&document, EventKind::Submit, form, Some(button));

        assert_eq!(
            decisions.borrow()[0],
            GuardDecision::Locked {
                submitter: button,
                preserved_name: Some("decision".into()),
            }
        );
        let document = document.borrow();
        assert!(document.is_disabled(button));
        assert!(document.outer_html(button).starts_with(
            r#"<button type="submit" id="decide" name="decision" value="approve" disabled=""><span class="spinner-border spinner-border-sm me-2" role="status" aria-hidden="true"></span>"#
        ));
        assert!(portal_dom::form_data(&document, form).contains(&("decision".into(), "approve".into())));
    }

    #[test]
    fn falls_back_to_first_submit_control() {
        let (document, dispatcher, decisions) = guarded(FORM);
        let form = node(&document, "approve");

        let _ = dispatcher.dispatch(&document, EventKind::Submit, form, None);

        assert!(matches!(
            decisions.borrow()[0],
            GuardDecision::Locked { submitter, .. } if submitter == node(&document, "decide")
        ));
    }

    #[test]
    fn plain_button_submitter_is_left_alone() {
        let (document, dispatcher, decisions) = guarded(FORM);
        let form = node(&document, "approve");
        let preview = node(&document, "preview");

        let _ = dispatcher.dispatch(&document, EventKind::Submit, form, Some(preview));

        assert_eq!(decisions.borrow()[0], GuardDecision::ButtonType(preview));
        assert!(!document.borrow().is_disabled(preview));
    }

    #[test]
    fn prevented_submission_is_ignored() {
        let document: SharedDocument = Rc::new(RefCell::new(Document::parse(FORM)));
        let dispatcher = EventDispatcher::new();
        dispatcher.listen(EventKind::Submit, Binding::Document, |event, _| event.prevent_default());
        let guard = SubmitGuard::new(document.clone());
        let decision = Rc::new(RefCell::new(None));
        let slot = decision.clone();
        dispatcher.listen(EventKind::Submit, Binding::Document, move |event, _| {
            *slot.borrow_mut() = Some(guard.on_submit(event, event.target));
        });

        let form = node(&document, "approve");
        let _ = dispatcher.dispatch(&document, EventKind::Submit, form, Some(node(&document, "decide")));

        assert_eq!(*decision.borrow(), Some(GuardDecision::AlreadyPrevented));
        assert!(!document.borrow().is_disabled(node(&document, "decide")));
    }

    #[test]
    fn form_without_submit_control_has_no_submitter() {
        let (document, dispatcher, decisions) = guarded(r#"<form id="approve"><input name="q"></form>"#);
        let _ = dispatcher.dispatch(&document, EventKind::Submit, node(&document, "approve"), None);
        assert_eq!(decisions.borrow()[0], GuardDecision::NoSubmitter);
    }
}
