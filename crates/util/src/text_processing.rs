//! Text helpers for diagnostics.

/// Default number of characters kept by [`preview_text`] callers.
pub const DEFAULT_PREVIEW_LIMIT: usize = 200;

/// Collapse a response body into a single-line preview for log output.
///
/// Runs of whitespace become one space and the result is cut after `limit`
/// characters with a trailing `...`. Blank input yields `<empty>`.
pub fn preview_text(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    let mut taken = 0usize;
    for ch in text.trim().chars() {
        if taken >= limit {
            preview.push_str("...");
            break;
        }
        if ch.is_whitespace() {
            if !preview.ends_with(' ') {
                preview.push(' ');
                taken += 1;
            }
            continue;
        }
        preview.push(ch);
        taken += 1;
    }

    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_markup_whitespace() {
        let body = "<div>\n    <p>Server error</p>\r\n\t</div>";
        assert_eq!(preview_text(body, 200), "<div> <p>Server error</p> </div>");
    }

    #[test]
    fn truncates_long_bodies() {
        assert_eq!(preview_text("abcdefgh", 3), "abc...");
        assert_eq!(preview_text("  \n ", 10), "<empty>");
    }
}
