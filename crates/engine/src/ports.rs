//! Seams the behaviors call out through.
//!
//! Both ports are best-effort: callers never branch on their outcome beyond
//! logging a failure.

use anyhow::{Result, anyhow};
use portal_dom::NodeId;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

/// Initializes interactive widgets (autocompletes) inside freshly inserted markup.
pub trait WidgetInitPort {
    /// Called once per inserted row with the row's root node.
    fn elements_inserted(&self, root: NodeId) -> Result<()>;
}

/// Surfaces a message to the person using the page.
pub trait UserNotice {
    fn notify(&self, message: &str);
}

/// Widget port for pages without enhanced widgets.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWidgets;

impl WidgetInitPort for NoopWidgets {
    fn elements_inserted(&self, root: NodeId) -> Result<()> {
        debug!(?root, "no widget initializer configured");
        Ok(())
    }
}

/// Forwards "nodes inserted" signals to an async consumer.
#[derive(Debug, Clone)]
pub struct ChannelWidgets {
    sender: UnboundedSender<NodeId>,
}

impl ChannelWidgets {
    pub fn new() -> (Self, UnboundedReceiver<NodeId>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl WidgetInitPort for ChannelWidgets {
    fn elements_inserted(&self, root: NodeId) -> Result<()> {
        self.sender
            .send(root)
            .map_err(|_| anyhow!("widget initializer is no longer listening"))
    }
}

/// Notice port that writes to the diagnostic log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotice;

impl UserNotice for TracingNotice {
    fn notify(&self, message: &str) {
        warn!(notice = message, "user notice");
    }
}
