use std::rc::Rc;

use anyhow::anyhow;
use async_trait::async_trait;
use portal_api::{FetchError, FragmentFetcher, FragmentResponse};
use portal_dom::{Document, NodeId};
use portal_engine::{ChannelWidgets, PortalPage, PortalPorts, WidgetInitPort};
use portal_util::PortalConfig;
use url::Url;

struct NoNetwork;

#[async_trait(?Send)]
impl FragmentFetcher for NoNetwork {
    async fn fetch(&self, url: &Url) -> Result<FragmentResponse, FetchError> {
        Err(FetchError::Transport(format!("unexpected request to {url}")))
    }
}

struct BrokenWidgets;

impl WidgetInitPort for BrokenWidgets {
    fn elements_inserted(&self, _root: NodeId) -> anyhow::Result<()> {
        Err(anyhow!("autocomplete is not available"))
    }
}

fn request_form(existing: usize, max: usize) -> Document {
    let rows: String = (0..existing)
        .map(|index| {
            format!(
                r#"<tr class="approver-row"><td class="order-number">{index}</td><td>
                     <select name="approvers-{index}-user"><option value="{index}" selected>user {index}</option></select>
                     <input type="hidden" name="approvers-{index}-order" value="0"></td></tr>"#
            )
        })
        .collect();
    Document::parse(&format!(
        r#"<form method="post" id="request-form">
             <input name="title" value="New laptop">
             <input type="hidden" name="approvers-TOTAL_FORMS" id="id_approvers-TOTAL_FORMS" value="{existing}">
             <input type="hidden" name="approvers-MAX_NUM_FORMS" id="id_approvers-MAX_NUM_FORMS" value="{max}">
             <table id="approver-table"><thead><tr><th>#</th><th>Approver</th></tr></thead><tbody>{rows}</tbody></table>
             <button type="button" id="add-approver" class="btn btn-secondary">Add approver</button>
             <button type="submit" id="save" name="save" value="1">Submit request</button>
           </form>
           <template id="empty-form-template"><td class="order-number"></td><td>
             <select name="approvers-__prefix__-user" id="id_approvers-__prefix__-user"></select>
             <input type="hidden" name="approvers-__prefix__-order" id="id_approvers-__prefix__-order"></td></template>"#
    ))
}

fn mount(document: Document, ports: PortalPorts) -> PortalPage {
    PortalPage::mount_request_form(document, &PortalConfig::default(), ports).unwrap()
}

fn ports() -> PortalPorts {
    PortalPorts::with_fetcher(Rc::new(NoNetwork))
}

fn node(page: &PortalPage, selector: &str) -> NodeId {
    page.find(selector).unwrap().unwrap()
}

fn order_fields(page: &PortalPage) -> Vec<String> {
    let document = page.document().borrow();
    document
        .query_selector_all(document.root(), r#"tr.approver-row input[name$="-order"]"#)
        .unwrap()
        .into_iter()
        .map(|input| document.value(input).unwrap_or_default())
        .collect()
}

fn display_orders(page: &PortalPage) -> Vec<String> {
    let document = page.document().borrow();
    document
        .query_selector_all(document.root(), "tr.approver-row .order-number")
        .unwrap()
        .into_iter()
        .map(|cell| document.text_content(cell))
        .collect()
}

fn total_forms(page: &PortalPage) -> String {
    let document = page.document().borrow();
    let field = document.get_element_by_id("id_approvers-TOTAL_FORMS").unwrap();
    document.value(field).unwrap_or_default()
}

#[test]
fn order_fields_read_one_to_n_after_every_add() {
    let page = mount(request_form(2, 6), ports());
    assert_eq!(order_fields(&page), ["1", "2"]);
    let trigger = node(&page, "#add-approver");

    for count in 3..=6 {
        let _ = page.click(trigger);
        let expected: Vec<String> = (1..=count).map(|position| position.to_string()).collect();
        assert_eq!(order_fields(&page), expected);
        assert_eq!(display_orders(&page), expected);
        assert_eq!(total_forms(&page), count.to_string());
    }
}

#[test]
fn add_at_the_bound_leaves_everything_in_place() {
    let page = mount(request_form(3, 3), ports());
    let trigger = node(&page, "#add-approver");
    assert!(page.document().borrow().is_disabled(trigger));

    let outcome = page.click(trigger);

    assert!(outcome.pending.is_empty());
    assert_eq!(total_forms(&page), "3");
    assert_eq!(page.editor().unwrap().rows().len(), 3);
    assert!(page.document().borrow().is_disabled(trigger));
}

#[test]
fn fourth_row_is_indexed_three() {
    let page = mount(request_form(3, 5), ports());

    let _ = page.click(node(&page, "#add-approver"));

    let editor = page.editor().unwrap();
    let rows = editor.rows();
    assert_eq!(rows.len(), 4);
    let markup = page.document().borrow().outer_html(rows[3]);
    assert!(markup.starts_with(r#"<tr class="approver-row">"#));
    assert!(markup.contains(r#"name="approvers-3-user""#));
    assert!(markup.contains(r#"id="id_approvers-3-order""#));
    assert!(!markup.contains("approvers-4-"));
    assert_eq!(order_fields(&page)[3], "4");
}

#[test]
fn broken_widget_port_does_not_stop_the_add() {
    let page = mount(request_form(1, 4), ports().widgets(Rc::new(BrokenWidgets)));

    let _ = page.click(node(&page, "#add-approver"));

    assert_eq!(total_forms(&page), "2");
    assert_eq!(order_fields(&page), ["1", "2"]);
}

#[test]
fn widget_port_sees_each_inserted_row() {
    let (widgets, mut inserted) = ChannelWidgets::new();
    let page = mount(request_form(0, 2), ports().widgets(Rc::new(widgets)));
    let trigger = node(&page, "#add-approver");

    let _ = page.click(trigger);
    let _ = page.click(trigger);
    let _ = page.click(trigger);

    let rows = page.editor().unwrap().rows();
    assert_eq!(inserted.try_recv().unwrap(), rows[0]);
    assert_eq!(inserted.try_recv().unwrap(), rows[1]);
    assert!(inserted.try_recv().is_err());
}

#[test]
fn saving_the_request_locks_the_submit_button() {
    let page = mount(request_form(1, 3), ports());
    let save = node(&page, "#save");

    let _ = page.click(save);

    assert!(page.document().borrow().is_disabled(save));
    assert!(page.markup().contains(r#"<input type="hidden" name="save" value="1">"#));
    assert!(!page.document().borrow().is_disabled(node(&page, "#add-approver")));
}
