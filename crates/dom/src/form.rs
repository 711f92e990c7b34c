//! Form-data collection.

use crate::document::{Document, NodeId};

/// Whether `node` is a control that submits its form when activated.
pub fn is_submit_control(document: &Document, node: NodeId) -> bool {
    match document.tag_name(node) {
        Some("button") => document
            .attribute(node, "type")
            .is_none_or(|kind| kind.eq_ignore_ascii_case("submit")),
        Some("input") => document
            .attribute(node, "type")
            .is_some_and(|kind| kind.eq_ignore_ascii_case("submit") || kind.eq_ignore_ascii_case("image")),
        _ => false,
    }
}

/// Serializes the successful controls of `form` in tree order.
///
/// Follows the browser's form-data construction: disabled controls (and
/// those inside a disabled fieldset), unnamed controls, unchecked
/// checkboxes/radios, file inputs and buttons are skipped.
pub fn form_data(document: &Document, form: NodeId) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for node in document.descendants(form) {
        let Some(tag) = document.tag_name(node) else {
            continue;
        };
        if !matches!(tag, "input" | "select" | "textarea") {
            continue;
        }
        let Some(name) = document.attribute(node, "name").filter(|name| !name.is_empty()) else {
            continue;
        };
        if is_disabled_control(document, node, form) {
            continue;
        }

        match tag {
            "input" => {
                let kind = document
                    .attribute(node, "type")
                    .unwrap_or("text")
                    .to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "button" | "reset" | "image" | "file" => {}
                    "checkbox" | "radio" => {
                        if document.has_attribute(node, "checked") {
                            let value = document.attribute(node, "value").unwrap_or("on");
                            entries.push((name.to_string(), value.to_string()));
                        }
                    }
                    _ => entries.push((name.to_string(), document.value(node).unwrap_or_default())),
                }
            }
            "select" if document.has_attribute(node, "multiple") => {
                for option in document.descendants(node) {
                    if document.tag_name(option) == Some("option") && document.has_attribute(option, "selected") {
                        entries.push((name.to_string(), document.option_value(option)));
                    }
                }
            }
            _ => {
                if let Some(value) = document.value(node) {
                    entries.push((name.to_string(), value));
                }
            }
        }
    }
    entries
}

fn is_disabled_control(document: &Document, node: NodeId, form: NodeId) -> bool {
    document
        .ancestors_inclusive(node)
        .take_while(|ancestor| *ancestor != form)
        .any(|ancestor| {
            document.is_disabled(ancestor)
                && (ancestor == node || document.tag_name(ancestor) == Some("fieldset"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_successful_controls_in_tree_order() {
        let document = Document::parse(
            r#"<form id="search-form">
                 <input name="q" value="travel">
                 <select name="status"><option value="">all</option><option value="pending" selected>Pending</option></select>
                 <input type="checkbox" name="mine" checked>
                 <input type="checkbox" name="archived">
                 <input name="skipped" disabled value="x">
                 <fieldset disabled><input name="inside" value="y"></fieldset>
                 <textarea name="note">a &amp; b</textarea>
                 <button type="submit" name="go" value="1">Search</button>
               </form>"#,
        );
        let form = document.get_element_by_id("search-form").unwrap();

        assert_eq!(
            form_data(&document, form),
            vec![
                ("q".to_string(), "travel".to_string()),
                ("status".to_string(), "pending".to_string()),
                ("mine".to_string(), "on".to_string()),
                ("note".to_string(), "a & b".to_string()),
            ]
        );
    }

    #[test]
    fn submit_controls_are_recognized() {
        let document = Document::parse(
            r#"<button id="a">A</button><button id="b" type="button">B</button>
               <input id="c" type="submit"><input id="d" type="text">"#,
        );
        let id = |name: &str| document.get_element_by_id(name).unwrap();
        assert!(is_submit_control(&document, id("a")));
        assert!(!is_submit_control(&document, id("b")));
        assert!(is_submit_control(&document, id("c")));
        assert!(!is_submit_control(&document, id("d")));
    }
}
