//! Collection Editor for the approver rows of the request form.
//!
//! Rows are added from a server-rendered empty-row template. After every
//! structural change a renumbering pass rewrites each row's display order
//! and hidden order field to its 1-based position, so the server always
//! receives `1..n` in document order. Rows cannot be removed client-side.

use std::rc::Rc;

use portal_dom::{DomError, NodeId, SelectorList};
use portal_types::RowBounds;
use portal_util::CollectionSelectors;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ports::{UserNotice, WidgetInitPort};
use crate::{AnchorError, SharedDocument, parse_selector, resolve_anchor};

/// Errors raised by the Collection Editor.
#[derive(Debug, Error)]
pub enum EditorError {
    /// A required element or selector is missing; the editor cannot be bound.
    #[error(transparent)]
    Anchor(#[from] AnchorError),
    /// A count field does not hold a non-negative integer.
    #[error("{field} field holds '{value}', expected a non-negative integer")]
    InvalidCounter { field: &'static str, value: String },
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Result of an add request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// A row was appended; `index` is the 0-based form index substituted into its field names.
    Added { index: usize, count: usize, row: NodeId },
    /// The collection was already full; nothing changed.
    CapacityReached(RowBounds),
}

/// Builds a new row's markup by replacing every `placeholder` with `index`.
pub fn instantiate_row(template: &str, placeholder: &str, index: usize) -> String {
    template.replace(placeholder, &index.to_string())
}

/// Keeps a bounded list of row-entries ordered and numbered.
pub struct CollectionEditor {
    document: SharedDocument,
    container: NodeId,
    template: String,
    count_field: NodeId,
    max_field: NodeId,
    add_trigger: NodeId,
    row: SelectorList,
    display_order: SelectorList,
    order_field: SelectorList,
    placeholder: String,
    row_tag: String,
    row_class: String,
    capacity_message: String,
    widgets: Rc<dyn WidgetInitPort>,
    notices: Rc<dyn UserNotice>,
}

impl CollectionEditor {
    /// Binds to the page and numbers any server-rendered rows.
    ///
    /// Every anchor is resolved before anything is mutated, so a page missing
    /// one is rejected without side effects.
    pub fn initialize(
        document: SharedDocument,
        selectors: &CollectionSelectors,
        widgets: Rc<dyn WidgetInitPort>,
        notices: Rc<dyn UserNotice>,
    ) -> Result<Self, EditorError> {
        let (container, template, count_field, max_field, add_trigger) = {
            let document = document.borrow();
            let template_node = resolve_anchor(&document, "template", &selectors.template)?;
            (
                resolve_anchor(&document, "container", &selectors.container)?,
                document.inner_html(template_node),
                resolve_anchor(&document, "count", &selectors.count_field)?,
                resolve_anchor(&document, "max", &selectors.max_field)?,
                resolve_anchor(&document, "add trigger", &selectors.add_trigger)?,
            )
        };

        let editor = Self {
            document,
            container,
            template,
            count_field,
            max_field,
            add_trigger,
            row: parse_selector("row", &selectors.row)?,
            display_order: parse_selector("display order", &selectors.display_order)?,
            order_field: parse_selector("order field", &selectors.order_field)?,
            placeholder: selectors.placeholder.clone(),
            row_tag: selectors.row_tag.clone(),
            row_class: selectors.row_class.clone(),
            capacity_message: selectors.capacity_message.clone(),
            widgets,
            notices,
        };

        let bounds = editor.bounds()?;
        let rows = editor.renumber()?;
        if !bounds.has_capacity() {
            editor.disable_trigger()?;
        }
        debug!(rows, "collection editor bound");
        Ok(editor)
    }

    pub fn add_trigger(&self) -> NodeId {
        self.add_trigger
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn bounds(&self) -> Result<RowBounds, EditorError> {
        let document = self.document.borrow();
        Ok(RowBounds {
            count: read_counter(document.value(self.count_field), "count")?,
            max: read_counter(document.value(self.max_field), "max")?,
        })
    }

    /// Row-entries in document order.
    pub fn rows(&self) -> Vec<NodeId> {
        self.document.borrow().select_all(self.container, &self.row)
    }

    /// Appends one row if the collection has room.
    pub fn on_add_triggered(&self) -> Result<AddOutcome, EditorError> {
        let bounds = self.bounds()?;
        if !bounds.has_capacity() {
            self.notices.notify(&self.capacity_message);
            self.disable_trigger()?;
            info!(count = bounds.count, max = bounds.max, "collection is full");
            return Ok(AddOutcome::CapacityReached(bounds));
        }

        let index = bounds.count;
        let markup = instantiate_row(&self.template, &self.placeholder, index);
        let row = {
            let mut document = self.document.borrow_mut();
            let row = document.create_element(&self.row_tag);
            document.set_attribute(row, "class", self.row_class.as_str())?;
            document.set_inner_html(row, &markup)?;
            document.append_child(self.container, row)?;
            document.set_value(self.count_field, (index + 1).to_string())?;
            row
        };

        if let Err(error) = self.widgets.elements_inserted(row) {
            warn!(%error, "widget initialization failed for inserted row");
        }

        self.renumber()?;

        let count = index + 1;
        if count >= bounds.max {
            self.disable_trigger()?;
        }
        debug!(index, count, max = bounds.max, "row added");
        Ok(AddOutcome::Added { index, count, row })
    }

    /// Sets each row's display order and order field to its 1-based position.
    ///
    /// Rows lacking either element are skipped for that element. Returns the
    /// number of rows seen.
    pub fn renumber(&self) -> Result<usize, EditorError> {
        let mut document = self.document.borrow_mut();
        let rows = document.select_all(self.container, &self.row);
        for (index, row) in rows.iter().enumerate() {
            let position = (index + 1).to_string();
            if let Some(cell) = document.select_first(*row, &self.display_order) {
                document.set_text_content(cell, position.as_str());
            }
            if let Some(input) = document.select_first(*row, &self.order_field) {
                document.set_value(input, position)?;
            }
        }
        Ok(rows.len())
    }

    fn disable_trigger(&self) -> Result<(), EditorError> {
        self.document.borrow_mut().set_disabled(self.add_trigger, true)?;
        Ok(())
    }
}

fn read_counter(value: Option<String>, field: &'static str) -> Result<usize, EditorError> {
    let value = value.unwrap_or_default();
    value
        .trim()
        .parse()
        .map_err(|_| EditorError::InvalidCounter { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NoopWidgets;
    use anyhow::anyhow;
    use portal_dom::Document;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingNotice(RefCell<Vec<String>>);

    impl UserNotice for RecordingNotice {
        fn notify(&self, message: &str) {
            self.0.borrow_mut().push(message.to_string());
        }
    }

    struct FailingWidgets;

    impl WidgetInitPort for FailingWidgets {
        fn elements_inserted(&self, _root: NodeId) -> anyhow::Result<()> {
            Err(anyhow!("autocomplete library not loaded"))
        }
    }

    fn server_row(index: usize, shown: &str) -> String {
        format!(
            r#"<tr class="approver-row"><td class="order-number">{shown}</td>
               <td><input name="approvers-{index}-user" value="u{index}">
                   <input type="hidden" name="approvers-{index}-order" value="{shown}"></td></tr>"#
        )
    }

    fn request_form(rows: &[String], total: usize, max: usize) -> SharedDocument {
        let markup = format!(
            r#"<form method="post">
                 <input type="hidden" name="approvers-TOTAL_FORMS" id="id_approvers-TOTAL_FORMS" value="{total}">
                 <input type="hidden" name="approvers-MAX_NUM_FORMS" id="id_approvers-MAX_NUM_FORMS" value="{max}">
                 <table id="approver-table"><tbody>{}</tbody></table>
                 <button type="button" id="add-approver">Add approver</button>
               </form>
               <template id="empty-form-template"><td class="order-number"></td><td>
                 <select name="approvers-__prefix__-user" id="id_approvers-__prefix__-user"></select>
                 <input type="hidden" name="approvers-__prefix__-order" id="id_approvers-__prefix__-order">
               </td></template>"#,
            rows.join("")
        );
        Rc::new(RefCell::new(Document::parse(&markup)))
    }

    fn editor_with(document: &SharedDocument, notices: Rc<RecordingNotice>) -> CollectionEditor {
        CollectionEditor::initialize(
            document.clone(),
            &CollectionSelectors::default(),
            Rc::new(NoopWidgets),
            notices,
        )
        .unwrap()
    }

    fn order_values(editor: &CollectionEditor) -> Vec<(String, String)> {
        let document = editor.document.borrow();
        editor
            .rows()
            .into_iter()
            .map(|row| {
                let shown = document
                    .select_first(row, &editor.display_order)
                    .map(|cell| document.text_content(cell))
                    .unwrap_or_default();
                let field = document
                    .select_first(row, &editor.order_field)
                    .and_then(|input| document.value(input))
                    .unwrap_or_default();
                (shown, field)
            })
            .collect()
    }

    #[test]
    fn initialize_renumbers_server_rendered_rows() {
        let document = request_form(&[server_row(0, "7"), server_row(1, "3")], 2, 5);
        let editor = editor_with(&document, Rc::default());

        assert_eq!(
            order_values(&editor),
            vec![("1".into(), "1".into()), ("2".into(), "2".into())]
        );
    }

    #[test]
    fn order_stays_contiguous_after_each_add() {
        let document = request_form(&[server_row(0, "1")], 1, 5);
        let editor = editor_with(&document, Rc::default());

        for expected in 2..=5 {
            let outcome = editor.on_add_triggered().unwrap();
            assert!(matches!(outcome, AddOutcome::Added { count, .. } if count == expected));
            let values = order_values(&editor);
            let wanted: Vec<(String, String)> = (1..=expected)
                .map(|position| (position.to_string(), position.to_string()))
                .collect();
            assert_eq!(values, wanted);
        }
    }

    #[test]
    fn placeholder_takes_zero_based_index() {
        let rows: Vec<String> = (0..3).map(|index| server_row(index, "")).collect();
        let document = request_form(&rows, 3, 5);
        let editor = editor_with(&document, Rc::default());

        let AddOutcome::Added { index, row, .. } = editor.on_add_triggered().unwrap() else {
            panic!("expected a row to be added");
        };
        assert_eq!(index, 3);

        let document = document.borrow();
        let markup = document.inner_html(row);
        assert!(markup.contains(r#"name="approvers-3-user""#));
        assert!(markup.contains(r#"name="approvers-3-order""#));
        assert!(!markup.contains("__prefix__"));
        assert!(!markup.contains("approvers-4-"));
        let count = document.get_element_by_id("id_approvers-TOTAL_FORMS").unwrap();
        assert_eq!(document.value(count).as_deref(), Some("4"));
    }

    #[test]
    fn add_at_capacity_notifies_and_changes_nothing() {
        let rows: Vec<String> = (0..3).map(|index| server_row(index, "")).collect();
        let document = request_form(&rows, 3, 3);
        let notices = Rc::new(RecordingNotice::default());
        let editor = editor_with(&document, notices.clone());
        let before = document.borrow().inner_html(editor.container());

        let outcome = editor.on_add_triggered().unwrap();

        assert_eq!(outcome, AddOutcome::CapacityReached(RowBounds { count: 3, max: 3 }));
        assert_eq!(editor.rows().len(), 3);
        assert_eq!(document.borrow().inner_html(editor.container()), before);
        assert_eq!(editor.bounds().unwrap().count, 3);
        assert!(document.borrow().is_disabled(editor.add_trigger()));
        assert_eq!(notices.0.borrow().as_slice(), ["No more approvers can be added."]);
    }

    #[test]
    fn trigger_disables_once_the_last_slot_fills() {
        let document = request_form(&[], 0, 2);
        let editor = editor_with(&document, Rc::default());

        editor.on_add_triggered().unwrap();
        assert!(!document.borrow().is_disabled(editor.add_trigger()));
        editor.on_add_triggered().unwrap();
        assert!(document.borrow().is_disabled(editor.add_trigger()));
    }

    #[test]
    fn widget_failure_does_not_block_insertion() {
        let document = request_form(&[], 0, 3);
        let editor = CollectionEditor::initialize(
            document.clone(),
            &CollectionSelectors::default(),
            Rc::new(FailingWidgets),
            Rc::new(RecordingNotice::default()),
        )
        .unwrap();

        let outcome = editor.on_add_triggered().unwrap();
        assert!(matches!(outcome, AddOutcome::Added { index: 0, count: 1, .. }));
        assert_eq!(order_values(&editor), vec![("1".into(), "1".into())]);
    }

    #[test]
    fn rows_missing_order_elements_are_skipped() {
        let marker = r#"<tr class="approver-row"><td colspan="2">end of list</td></tr>"#.to_string();
        let document = request_form(&[server_row(0, "9"), marker], 1, 5);
        let editor = editor_with(&document, Rc::default());

        assert_eq!(editor.renumber().unwrap(), 2);
        let values = order_values(&editor);
        assert_eq!(values[0], ("1".into(), "1".into()));
        assert_eq!(values[1], ("".into(), "".into()));
    }

    #[test]
    fn missing_template_is_fatal() {
        let document = Rc::new(RefCell::new(Document::parse(
            r#"<table id="approver-table"><tbody></tbody></table>
               <input id="id_approvers-TOTAL_FORMS" value="0"><input id="id_approvers-MAX_NUM_FORMS" value="3">
               <button id="add-approver">Add</button>"#,
        )));
        let error = CollectionEditor::initialize(
            document,
            &CollectionSelectors::default(),
            Rc::new(NoopWidgets),
            Rc::new(RecordingNotice::default()),
        )
        .err()
        .unwrap();
        assert!(matches!(
            error,
            EditorError::Anchor(AnchorError::Missing { anchor: "template", .. })
        ));
    }

    #[test]
    fn non_numeric_counter_is_rejected_without_mutation() {
        let document = request_form(&[], 0, 3);
        let editor = editor_with(&document, Rc::default());
        {
            let mut document = document.borrow_mut();
            let count = document.get_element_by_id("id_approvers-TOTAL_FORMS").unwrap();
            document.set_value(count, "two").unwrap();
        }

        let error = editor.on_add_triggered().unwrap_err();
        assert!(matches!(error, EditorError::InvalidCounter { field: "count", .. }));
        assert!(editor.rows().is_empty());
    }

    #[test]
    fn bad_max_at_load_leaves_server_rows_untouched() {
        let document = request_form(&[server_row(0, "9")], 1, 3);
        {
            let mut document = document.borrow_mut();
            let max = document.get_element_by_id("id_approvers-MAX_NUM_FORMS").unwrap();
            document.set_value(max, "abc").unwrap();
        }
        let markup = || {
            let document = document.borrow();
            document.inner_html(document.root())
        };
        let before = markup();

        let error = CollectionEditor::initialize(
            document.clone(),
            &CollectionSelectors::default(),
            Rc::new(NoopWidgets),
            Rc::new(RecordingNotice::default()),
        )
        .err()
        .unwrap();

        assert!(matches!(error, EditorError::InvalidCounter { field: "max", .. }));
        assert_eq!(markup(), before);
        assert!(before.contains(r#"<td class="order-number">9</td>"#));
    }

    #[test]
    fn factory_replaces_every_occurrence() {
        assert_eq!(
            instantiate_row("id_x-__prefix__ name=x-__prefix__-order", "__prefix__", 12),
            "id_x-12 name=x-12-order"
        );
    }
}
