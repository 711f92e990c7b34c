//! Tolerant markup parser.
//!
//! Accepts the server-rendered fragments and row templates the portal emits:
//! unquoted and boolean attributes, void elements, self-closing syntax,
//! comments, doctypes and stray end tags. It is not a conforming HTML5 tree
//! builder; table and paragraph insertion modes are approximated by the
//! implicit-close rules in [`closes_on_open`].

use indexmap::IndexMap;
use tracing::trace;

use crate::document::{Document, Element, NodeData, NodeId, RAW_TEXT_ELEMENTS, VOID_ELEMENTS};

/// Parses `markup` into detached nodes owned by `document`.
///
/// Returns the top-level nodes in source order.
pub(crate) fn parse_fragment(document: &mut Document, markup: &str) -> Vec<NodeId> {
    let mut builder = TreeBuilder {
        document,
        top_level: Vec::new(),
        open: Vec::new(),
    };
    let mut cursor = Cursor { source: markup, position: 0 };

    while !cursor.at_end() {
        if cursor.starts_with("<!--") {
            cursor.advance(4);
            let comment = cursor.take_until("-->");
            cursor.advance(3);
            builder.push_leaf(NodeData::Comment(comment.to_string()));
        } else if cursor.starts_with("<!") || cursor.starts_with("<?") {
            cursor.take_until(">");
            cursor.advance(1);
        } else if cursor.starts_with("</") && cursor.peek_at(2).is_some_and(|c| c.is_ascii_alphabetic()) {
            cursor.advance(2);
            let name = cursor.take_while(is_name_char).to_ascii_lowercase();
            cursor.take_until(">");
            cursor.advance(1);
            builder.close(&name);
        } else if cursor.starts_with("<") && cursor.peek_at(1).is_some_and(|c| c.is_ascii_alphabetic()) {
            cursor.advance(1);
            let (element, self_closing) = parse_start_tag(&mut cursor);
            let tag = element.tag.clone();
            let node = builder.open_element(element);
            if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) && !self_closing {
                let body = cursor.take_until_ignore_case(&format!("</{tag}"));
                if !body.is_empty() {
                    let text = match tag.as_str() {
                        "textarea" | "title" => decode_entities(body),
                        _ => body.to_string(),
                    };
                    let text_node = builder.document.create_text(text);
                    builder.append(text_node);
                }
                cursor.take_until(">");
                cursor.advance(1);
                builder.close(&tag);
            } else if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
                builder.close_node(node);
            }
        } else {
            let text = if cursor.starts_with("<") {
                cursor.advance(1);
                "<".to_string()
            } else {
                decode_entities(cursor.take_until("<"))
            };
            builder.push_text(text);
        }
    }

    builder.top_level
}

struct TreeBuilder<'d> {
    document: &'d mut Document,
    top_level: Vec<NodeId>,
    open: Vec<(NodeId, String)>,
}

impl TreeBuilder<'_> {
    fn append(&mut self, node: NodeId) {
        match self.open.last() {
            Some((parent, _)) => {
                let parent = *parent;
                // Freshly created nodes cannot form cycles.
                let _ = self.document.append_child(parent, node);
            }
            None => self.top_level.push(node),
        }
    }

    fn push_leaf(&mut self, data: NodeData) {
        let node = self.document.push_node(data);
        self.append(node);
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        self.push_leaf(NodeData::Text(text));
    }

    fn open_element(&mut self, element: Element) -> NodeId {
        while let Some((_, current)) = self.open.last() {
            if closes_on_open(current, &element.tag) {
                self.open.pop();
            } else {
                break;
            }
        }
        let tag = element.tag.clone();
        let node = self.document.push_node(NodeData::Element(element));
        self.append(node);
        self.open.push((node, tag));
        node
    }

    fn close_node(&mut self, node: NodeId) {
        if let Some(index) = self.open.iter().rposition(|(open, _)| *open == node) {
            self.open.truncate(index);
        }
    }

    fn close(&mut self, tag: &str) {
        match self.open.iter().rposition(|(_, open)| open == tag) {
            Some(index) => self.open.truncate(index),
            None => trace!(tag, "ignoring stray end tag"),
        }
    }
}

/// Whether an open `current` element is implicitly closed by a new `incoming` start tag.
fn closes_on_open(current: &str, incoming: &str) -> bool {
    match incoming {
        "li" => current == "li",
        "option" => current == "option",
        "td" | "th" => matches!(current, "td" | "th"),
        "tr" => matches!(current, "td" | "th" | "tr"),
        "tbody" | "thead" | "tfoot" => matches!(current, "td" | "th" | "tr" | "tbody" | "thead" | "tfoot"),
        "p" | "div" | "ul" | "ol" | "table" | "form" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => current == "p",
        _ => false,
    }
}

fn parse_start_tag(cursor: &mut Cursor<'_>) -> (Element, bool) {
    let name = cursor.take_while(is_name_char);
    let mut element = Element::new(name);
    let mut attributes = IndexMap::new();
    let mut self_closing = false;

    loop {
        cursor.take_while(|c| c.is_whitespace());
        match cursor.peek() {
            None => break,
            Some('>') => {
                cursor.advance(1);
                break;
            }
            Some('/') => {
                cursor.advance(1);
                if cursor.peek() == Some('>') {
                    cursor.advance(1);
                    self_closing = true;
                    break;
                }
            }
            Some(_) => {
                let name = cursor
                    .take_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/'))
                    .to_ascii_lowercase();
                if name.is_empty() {
                    cursor.advance(1);
                    continue;
                }
                cursor.take_while(|c| c.is_whitespace());
                let value = if cursor.peek() == Some('=') {
                    cursor.advance(1);
                    cursor.take_while(|c| c.is_whitespace());
                    match cursor.peek() {
                        Some(quote @ ('"' | '\'')) => {
                            cursor.advance(1);
                            let raw = cursor.take_until_char(quote);
                            cursor.advance(1);
                            decode_entities(raw)
                        }
                        _ => decode_entities(cursor.take_while(|c| !c.is_whitespace() && c != '>')),
                    }
                } else {
                    String::new()
                };
                // First occurrence wins, as in browsers.
                attributes.entry(name).or_insert(value);
            }
        }
    }

    element.attributes = attributes;
    (element, self_closing)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':')
}

/// Decodes the character references the portal templates use.
pub(crate) fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &candidate[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((ch, end + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

struct Cursor<'s> {
    source: &'s str,
    position: usize,
}

impl<'s> Cursor<'s> {
    fn at_end(&self) -> bool {
        self.position >= self.source.len()
    }

    fn rest(&self) -> &'s str {
        &self.source[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.rest().chars().nth(offset)
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn advance(&mut self, chars: usize) {
        for _ in 0..chars {
            match self.peek() {
                Some(c) => self.position += c.len_utf8(),
                None => break,
            }
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'s str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !predicate(*c))
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        self.position += end;
        &rest[..end]
    }

    /// Consumes up to (not including) `needle`, or to the end.
    fn take_until(&mut self, needle: &str) -> &'s str {
        let rest = self.rest();
        let end = rest.find(needle).unwrap_or(rest.len());
        self.position += end;
        &rest[..end]
    }

    fn take_until_char(&mut self, needle: char) -> &'s str {
        let rest = self.rest();
        let end = rest.find(needle).unwrap_or(rest.len());
        self.position += end;
        &rest[..end]
    }

    fn take_until_ignore_case(&mut self, needle: &str) -> &'s str {
        let rest = self.rest();
        let lowered = rest.to_ascii_lowercase();
        let end = lowered.find(needle).unwrap_or(rest.len());
        self.position += end;
        &rest[..end]
    }
}
