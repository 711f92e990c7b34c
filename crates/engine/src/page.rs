//! Mounting the behaviors onto one page view.

use std::cell::RefCell;
use std::rc::Rc;

use portal_api::FragmentFetcher;
use portal_dom::{Document, NodeId, SelectorError, is_submit_control};
use portal_util::{CollectionSelectors, PortalConfig};
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::collection::{CollectionEditor, EditorError};
use crate::dispatch::{Binding, DispatchOutcome, EventDispatcher, EventKind};
use crate::ports::{NoopWidgets, TracingNotice, UserNotice, WidgetInitPort};
use crate::regions::{RegionSynchronizer, SyncError};
use crate::submit_guard::SubmitGuard;
use crate::{SharedDocument, parse_selector};

#[derive(Debug, Error)]
pub enum MountError {
    #[error("collection editor: {0}")]
    Editor(#[from] EditorError),
    #[error("region synchronizer: {0}")]
    Regions(#[from] SyncError),
}

/// Collaborators the mounted behaviors call out through.
#[derive(Clone)]
pub struct PortalPorts {
    pub fetcher: Rc<dyn FragmentFetcher>,
    pub widgets: Rc<dyn WidgetInitPort>,
    pub notices: Rc<dyn UserNotice>,
}

impl PortalPorts {
    pub fn with_fetcher(fetcher: Rc<dyn FragmentFetcher>) -> Self {
        Self {
            fetcher,
            widgets: Rc::new(NoopWidgets),
            notices: Rc::new(TracingNotice),
        }
    }

    pub fn widgets(mut self, widgets: Rc<dyn WidgetInitPort>) -> Self {
        self.widgets = widgets;
        self
    }

    pub fn notices(mut self, notices: Rc<dyn UserNotice>) -> Self {
        self.notices = notices;
        self
    }
}

/// A parsed page with its behaviors bound.
///
/// The submission guard is always installed. The editor and synchronizer
/// exist only when their anchors were found.
pub struct PortalPage {
    document: SharedDocument,
    dispatcher: EventDispatcher,
    editor: Option<Rc<CollectionEditor>>,
    regions: Option<Rc<RegionSynchronizer>>,
}

impl PortalPage {
    fn with_guard(document: Document) -> Self {
        let document: SharedDocument = Rc::new(RefCell::new(document));
        let dispatcher = EventDispatcher::new();
        let guard = SubmitGuard::new(document.clone());
        dispatcher.listen(EventKind::Submit, Binding::Document, move |event, _| {
            guard.on_submit(event, event.target);
        });
        Self {
            document,
            dispatcher,
            editor: None,
            regions: None,
        }
    }

    /// Binds every behavior whose anchors the page carries.
    pub fn mount(document: Document, location: Url, config: &PortalConfig, ports: PortalPorts) -> Result<Self, MountError> {
        let mut page = Self::with_guard(document);
        if page.has_anchor(&config.regions.search_form) {
            page.attach_regions(location, config, ports.fetcher.clone())?;
        }
        if page.has_anchor(&config.collection.add_trigger) {
            page.attach_editor(&config.collection, &ports)?;
        }
        debug!(
            editor = page.editor.is_some(),
            regions = page.regions.is_some(),
            listeners = page.dispatcher.listener_count(),
            "page mounted"
        );
        Ok(page)
    }

    /// Mounts a dashboard page; missing dashboard anchors are fatal.
    pub fn mount_dashboard(
        document: Document,
        location: Url,
        config: &PortalConfig,
        ports: PortalPorts,
    ) -> Result<Self, MountError> {
        let mut page = Self::with_guard(document);
        page.attach_regions(location, config, ports.fetcher)?;
        Ok(page)
    }

    /// Mounts a request form page; missing collection anchors are fatal.
    pub fn mount_request_form(document: Document, config: &PortalConfig, ports: PortalPorts) -> Result<Self, MountError> {
        let mut page = Self::with_guard(document);
        page.attach_editor(&config.collection, &ports)?;
        Ok(page)
    }

    fn has_anchor(&self, selector: &str) -> bool {
        matches!(self.find(selector), Ok(Some(_)))
    }

    fn attach_editor(&mut self, selectors: &CollectionSelectors, ports: &PortalPorts) -> Result<(), MountError> {
        let editor = Rc::new(CollectionEditor::initialize(
            self.document.clone(),
            selectors,
            ports.widgets.clone(),
            ports.notices.clone(),
        )?);

        let handler = editor.clone();
        self.dispatcher
            .listen(EventKind::Click, Binding::Node(editor.add_trigger()), move |_, _| {
                if let Err(failure) = handler.on_add_triggered() {
                    error!(%failure, "add approver failed");
                }
            });
        self.editor = Some(editor);
        Ok(())
    }

    fn attach_regions(
        &mut self,
        location: Url,
        config: &PortalConfig,
        fetcher: Rc<dyn FragmentFetcher>,
    ) -> Result<(), MountError> {
        let paginator = parse_selector("paginator", &config.regions.paginator).map_err(SyncError::from)?;
        let regions = RegionSynchronizer::initialize(
            self.document.clone(),
            location,
            &config.regions,
            fetcher,
            config.refresh_policy,
        )?;

        let handler = regions.clone();
        self.dispatcher
            .listen(EventKind::Click, Binding::Delegated(paginator), move |event, paginator| {
                event.prevent_default();
                if let Some(refresh) = handler.on_paginator_click(paginator) {
                    event.track(refresh);
                }
            });

        let handler = regions.clone();
        self.dispatcher
            .listen(EventKind::Submit, Binding::Node(regions.search_form()), move |event, _| {
                event.prevent_default();
                event.track(handler.on_search_submit());
            });

        self.regions = Some(regions);
        Ok(())
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn editor(&self) -> Option<&Rc<CollectionEditor>> {
        self.editor.as_ref()
    }

    pub fn regions(&self) -> Option<&Rc<RegionSynchronizer>> {
        self.regions.as_ref()
    }

    pub fn find(&self, selector: &str) -> Result<Option<NodeId>, SelectorError> {
        let document = self.document.borrow();
        document.query_selector(document.root(), selector)
    }

    pub fn markup(&self) -> String {
        let document = self.document.borrow();
        document.outer_html(document.root())
    }

    /// Dispatches a click on `target`.
    ///
    /// A click on a submit control inside a form that no listener cancelled
    /// goes on to submit that form, with the control as submitter.
    pub fn click(&self, target: NodeId) -> DispatchOutcome {
        let mut outcome = self
            .dispatcher
            .dispatch(&self.document, EventKind::Click, target, None);
        if outcome.default_prevented {
            return outcome;
        }

        let submission = {
            let document = self.document.borrow();
            document
                .ancestors_inclusive(target)
                .find(|node| is_submit_control(&document, *node))
                .filter(|control| !document.is_disabled(*control))
                .and_then(|control| {
                    document
                        .ancestors_inclusive(control)
                        .find(|node| document.tag_name(*node) == Some("form"))
                        .map(|form| (form, control))
                })
        };
        if let Some((form, control)) = submission {
            let submitted = self.submit(form, Some(control));
            outcome.pending.extend(submitted.pending);
        }
        outcome
    }

    /// Dispatches a submit of `form`, `submitter` being the focused control.
    pub fn submit(&self, form: NodeId, submitter: Option<NodeId>) -> DispatchOutcome {
        if self.document.borrow().tag_name(form) != Some("form") {
            warn!(?form, "submit dispatched on a non-form element");
        }
        self.dispatcher
            .dispatch(&self.document, EventKind::Submit, form, submitter)
    }
}
