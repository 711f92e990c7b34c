//! In-memory document model for the portal client.
//!
//! This crate stands in for the browser DOM so the page behaviors can run
//! (and be tested) outside a browser. It provides:
//!
//! - `document`: an arena of element/text/comment nodes with inner/outer markup access
//! - `parser`: a tolerant markup parser for server-rendered fragments and templates
//! - `selector`: the CSS selector subset the behaviors rely on
//! - `form`: form-data collection following browser submission rules

mod document;
mod form;
mod parser;
mod selector;

pub use document::{Document, DomError, Element, NodeData, NodeId};
pub use form::{form_data, is_submit_control};
pub use selector::{SelectorError, SelectorList};
