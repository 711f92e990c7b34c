//! # Portal Engine
//!
//! Client-side behaviors of the request/approval portal. The engine keeps
//! on-page state consistent with user actions without full page reloads.
//!
//! ## Key Features
//!
//! - **Collection Editor**: bounded, ordered approver rows whose display order
//!   and order field always read `1..n` in document order
//! - **Region Synchronizer**: swaps the notification and request regions with
//!   server-rendered fragments on search and pagination
//! - **Submission Guard**: locks the submitter of a form once it is sent
//!
//! ## Usage
//!
//! ```ignore
//! use std::rc::Rc;
//! use portal_dom::Document;
//! use portal_engine::{PortalPage, PortalPorts};
//! use portal_util::PortalConfig;
//!
//! let document = Document::parse(&std::fs::read_to_string("request_form.html")?);
//! let location = url::Url::parse("http://localhost:8000/approvals/new/")?;
//! let client = Rc::new(portal_api::PortalClient::new(std::time::Duration::from_secs(30))?);
//! let page = PortalPage::mount(document, location, &PortalConfig::default(), PortalPorts::with_fetcher(client))?;
//! if let Some(trigger) = page.editor().map(|editor| editor.add_trigger()) {
//!     let _ = page.click(trigger);
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`dispatch`**: delegated event dispatch over the in-memory document
//! - **`collection`**: the Collection Editor and its row factory
//! - **`regions`**: the Region Synchronizer and refresh URL construction
//! - **`submit_guard`**: duplicate-submission guard
//! - **`ports`**: widget-initialization and user-notice seams
//! - **`page`**: mounts the behaviors onto a parsed page

use std::cell::RefCell;
use std::rc::Rc;

use portal_dom::{Document, NodeId, SelectorError, SelectorList};
use thiserror::Error;

pub mod collection;
pub mod dispatch;
pub mod page;
pub mod ports;
pub mod regions;
pub mod submit_guard;

pub use collection::{AddOutcome, CollectionEditor, EditorError, instantiate_row};
pub use dispatch::{Binding, DispatchOutcome, DomEvent, EventDispatcher, EventKind};
pub use page::{MountError, PortalPage, PortalPorts};
pub use ports::{ChannelWidgets, NoopWidgets, TracingNotice, UserNotice, WidgetInitPort};
pub use regions::{PendingRefresh, RefreshFailure, RefreshOutcome, RegionSynchronizer, SyncError, build_refresh_url};
pub use submit_guard::{GuardDecision, SubmitGuard};

/// Document shared by every behavior mounted on one page view.
pub type SharedDocument = Rc<RefCell<Document>>;

/// A required element that could not be located.
#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("required {anchor} element '{selector}' not found")]
    Missing { anchor: &'static str, selector: String },
    #[error("invalid selector for {anchor}: {source}")]
    Selector {
        anchor: &'static str,
        #[source]
        source: SelectorError,
    },
}

pub(crate) fn parse_selector(anchor: &'static str, selector: &str) -> Result<SelectorList, AnchorError> {
    selector
        .parse()
        .map_err(|source| AnchorError::Selector { anchor, source })
}

/// Resolves the first element matching `selector` anywhere in the document.
pub(crate) fn resolve_anchor(document: &Document, anchor: &'static str, selector: &str) -> Result<NodeId, AnchorError> {
    let parsed = parse_selector(anchor, selector)?;
    document
        .select_first(document.root(), &parsed)
        .ok_or_else(|| AnchorError::Missing {
            anchor,
            selector: selector.to_string(),
        })
}
