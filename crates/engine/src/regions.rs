//! Region Synchronizer for the dashboard.
//!
//! Swaps the notification and request regions with server-rendered fragments.
//! Both regions share the search form's filter state; each has its own page
//! cursor key. Every refresh is independent: nothing is cancelled and, under
//! the default policy, whichever response resolves last is what the region
//! shows.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use portal_api::FragmentFetcher;
use portal_dom::{NodeId, form_data};
use portal_types::{Fragment, QueryParams, RefreshPolicy, Region, TARGET_QUERY_KEY};
use portal_util::{DEFAULT_PREVIEW_LIMIT, RegionSelectors, preview_text};
use thiserror::Error;
use tracing::{debug, error, warn};
use url::{Url, form_urlencoded};

use crate::{AnchorError, SharedDocument, resolve_anchor};

/// A refresh that has been built but not yet resolved.
///
/// The URL is fixed when the refresh is created. Nothing is sent until the
/// future is first polled, which is also when it takes its sequence number;
/// a refresh that is dropped unpolled never supersedes another. Settle or
/// spawn it.
pub type PendingRefresh = LocalBoxFuture<'static, RefreshOutcome>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Anchor(#[from] AnchorError),
    #[error("page location '{0}' cannot carry a query")]
    InvalidLocation(Url),
}

/// Why a refresh left its region untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshFailure {
    /// The server answered outside the 2xx range.
    Status(u16),
    /// The request never produced a response.
    Transport(String),
    /// The fragment could not be placed into the region.
    Document(String),
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshFailure::Status(status) => write!(f, "server answered {status}"),
            RefreshFailure::Transport(message) => write!(f, "transport error: {message}"),
            RefreshFailure::Document(message) => write!(f, "document error: {message}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied {
        region: Region,
        sequence: u64,
    },
    Failed {
        region: Region,
        sequence: u64,
        reason: RefreshFailure,
    },
    /// A newer refresh for the same region was issued before this one resolved.
    Discarded {
        region: Region,
        sequence: u64,
        latest: u64,
    },
}

impl RefreshOutcome {
    pub fn region(&self) -> Region {
        match self {
            RefreshOutcome::Applied { region, .. }
            | RefreshOutcome::Failed { region, .. }
            | RefreshOutcome::Discarded { region, .. } => *region,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, RefreshOutcome::Applied { .. })
    }
}

/// Builds the fragment URL for `region`.
///
/// The location's query is replaced by `params` and the `target` key is set
/// to the region name, replacing the first occurrence and dropping any others.
/// The location's fragment identifier is not sent.
pub fn build_refresh_url(location: &Url, region: Region, mut params: QueryParams) -> Url {
    params.set(TARGET_QUERY_KEY, region.as_str());
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    let mut url = location.clone();
    url.set_fragment(None);
    url.set_query(Some(&query));
    url
}

pub struct RegionSynchronizer {
    document: SharedDocument,
    fetcher: Rc<dyn FragmentFetcher>,
    location: Url,
    search_form: NodeId,
    notification_area: NodeId,
    request_area: NodeId,
    policy: RefreshPolicy,
    issued: RefCell<HashMap<Region, u64>>,
}

impl RegionSynchronizer {
    /// Binds to the search form and both region containers.
    pub fn initialize(
        document: SharedDocument,
        location: Url,
        selectors: &RegionSelectors,
        fetcher: Rc<dyn FragmentFetcher>,
        policy: RefreshPolicy,
    ) -> Result<Rc<Self>, SyncError> {
        if location.cannot_be_a_base() {
            return Err(SyncError::InvalidLocation(location));
        }
        let (search_form, notification_area, request_area) = {
            let document = document.borrow();
            (
                resolve_anchor(&document, "search form", &selectors.search_form)?,
                resolve_anchor(&document, "notification area", &selectors.notification_area)?,
                resolve_anchor(&document, "request area", &selectors.request_area)?,
            )
        };
        debug!(%location, policy = %policy, "region synchronizer bound");
        Ok(Rc::new(Self {
            document,
            fetcher,
            location,
            search_form,
            notification_area,
            request_area,
            policy,
            issued: RefCell::new(HashMap::new()),
        }))
    }

    pub fn search_form(&self) -> NodeId {
        self.search_form
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn container(&self, region: Region) -> NodeId {
        match region {
            Region::Notification => self.notification_area,
            Region::Request => self.request_area,
        }
    }

    /// Current field set of the search form, in tree order.
    pub fn filter_state(&self) -> QueryParams {
        let document = self.document.borrow();
        form_data(&document, self.search_form).into_iter().collect()
    }

    /// Filter state with only `region`'s cursor overridden.
    pub fn pagination_params(&self, region: Region, page: &str) -> QueryParams {
        let mut params = self.filter_state();
        params.set(region.cursor_key(), page);
        params
    }

    /// Filter state exactly as the form holds it.
    pub fn search_params(&self) -> QueryParams {
        self.filter_state()
    }

    /// Sequence number of the most recent refresh of `region` that started.
    pub fn latest_issued(&self, region: Region) -> u64 {
        self.issued.borrow().get(&region).copied().unwrap_or_default()
    }

    /// Issues a refresh of `region` with `params`.
    ///
    /// Earlier refreshes of the same region keep running.
    pub fn refresh(self: &Rc<Self>, region: Region, params: QueryParams) -> PendingRefresh {
        let url = build_refresh_url(&self.location, region, params);
        let synchronizer = Rc::clone(self);
        async move {
            let sequence = synchronizer.start(region);
            debug!(region = %region, sequence, %url, "refresh issued");
            synchronizer.complete(region, sequence, url).await
        }
        .boxed_local()
    }

    fn start(&self, region: Region) -> u64 {
        let mut issued = self.issued.borrow_mut();
        let latest = issued.entry(region).or_default();
        *latest += 1;
        *latest
    }

    /// Handles a click on a paginator element.
    ///
    /// Returns `None` when the paginator does not name a known region and a
    /// page; the caller still suppresses navigation in that case. An unknown
    /// target issues no request and never falls back to the request region.
    pub fn on_paginator_click(self: &Rc<Self>, paginator: NodeId) -> Option<PendingRefresh> {
        let (target, page) = {
            let document = self.document.borrow();
            (
                document.dataset(paginator, "target").map(str::to_string),
                document.dataset(paginator, "page").map(str::to_string),
            )
        };

        let region = match target.as_deref().map(str::parse::<Region>) {
            Some(Ok(region)) => region,
            Some(Err(error)) => {
                warn!(%error, "paginator names an unknown region");
                return None;
            }
            None => {
                warn!(?paginator, "paginator has no data-target");
                return None;
            }
        };
        let Some(page) = page.filter(|page| !page.trim().is_empty()) else {
            warn!(region = %region, "paginator has no data-page");
            return None;
        };

        let params = self.pagination_params(region, page.trim());
        Some(self.refresh(region, params))
    }

    /// Handles a search submission. Only the request region is refreshed.
    pub fn on_search_submit(self: &Rc<Self>) -> PendingRefresh {
        self.refresh(Region::Request, self.search_params())
    }

    async fn complete(&self, region: Region, sequence: u64, url: Url) -> RefreshOutcome {
        let response = match self.fetcher.fetch(&url).await {
            Ok(response) => response,
            Err(error) => {
                warn!(region = %region, %url, %error, "fragment request failed");
                return RefreshOutcome::Failed {
                    region,
                    sequence,
                    reason: RefreshFailure::Transport(error.to_string()),
                };
            }
        };

        if !response.is_success() {
            warn!(
                region = %region,
                %url,
                status = response.status,
                body = %preview_text(&response.body, DEFAULT_PREVIEW_LIMIT),
                "fragment request rejected"
            );
            return RefreshOutcome::Failed {
                region,
                sequence,
                reason: RefreshFailure::Status(response.status),
            };
        }

        let latest = self.latest_issued(region);
        if self.policy == RefreshPolicy::LatestIssuedOnly && sequence != latest {
            debug!(region = %region, sequence, latest, "stale fragment discarded");
            return RefreshOutcome::Discarded {
                region,
                sequence,
                latest,
            };
        }

        self.apply(region, sequence, Fragment::from(response.body))
    }

    fn apply(&self, region: Region, sequence: u64, fragment: Fragment) -> RefreshOutcome {
        let container = self.container(region);
        match self.document.borrow_mut().set_inner_html(container, fragment.as_str()) {
            Ok(nodes) => {
                debug!(region = %region, sequence, nodes = nodes.len(), "fragment applied");
                RefreshOutcome::Applied { region, sequence }
            }
            Err(failure) => {
                error!(region = %region, %failure, "fragment could not be applied");
                RefreshOutcome::Failed {
                    region,
                    sequence,
                    reason: RefreshFailure::Document(failure.to_string()),
                }
            }
        }
    }
}
