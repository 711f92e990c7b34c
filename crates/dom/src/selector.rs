//! CSS selector subset.
//!
//! Supported: type, `#id`, `.class`, `[attr]`, `[attr=v]`, `[attr^=v]`,
//! `[attr$=v]`, `[attr*=v]`, `[attr~=v]`, descendant and child (`>`)
//! combinators, and comma-separated selector lists.

use std::str::FromStr;

use thiserror::Error;

use crate::document::{Document, NodeId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected '{found}' at offset {offset} in selector '{selector}'")]
    Unexpected { selector: String, found: char, offset: usize },
    #[error("unterminated attribute selector in '{0}'")]
    UnterminatedAttribute(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Prefix,
    Suffix,
    Contains,
    Includes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    condition: Option<(AttrOp, String)>,
}

impl AttrSelector {
    fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match &self.condition {
            None => true,
            Some((AttrOp::Equals, expected)) => value == expected,
            Some((AttrOp::Prefix, expected)) => !expected.is_empty() && value.starts_with(expected.as_str()),
            Some((AttrOp::Suffix, expected)) => !expected.is_empty() && value.ends_with(expected.as_str()),
            Some((AttrOp::Contains, expected)) => !expected.is_empty() && value.contains(expected.as_str()),
            Some((AttrOp::Includes, expected)) => value.split_ascii_whitespace().any(|word| word == expected),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttrSelector>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attributes.is_empty()
    }

    fn matches(&self, document: &Document, node: NodeId) -> bool {
        let Some(element) = document.element(node) else {
            return false;
        };
        self.tag.as_ref().is_none_or(|tag| tag == "*" || *tag == element.tag)
            && self.id.as_ref().is_none_or(|id| element.attribute("id") == Some(id.as_str()))
            && self.classes.iter().all(|class| element.has_class(class))
            && self
                .attributes
                .iter()
                .all(|attr| attr.matches(element.attribute(&attr.name)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// Compounds from left to right; `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

impl Complex {
    fn matches(&self, document: &Document, node: NodeId) -> bool {
        self.matches_at(document, node, self.compounds.len() - 1)
    }

    fn matches_at(&self, document: &Document, node: NodeId, index: usize) -> bool {
        if !self.compounds[index].matches(document, node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.combinators[index - 1] {
            Combinator::Child => document
                .parent(node)
                .is_some_and(|parent| self.matches_at(document, parent, index - 1)),
            Combinator::Descendant => document
                .ancestors_inclusive(node)
                .skip(1)
                .any(|ancestor| self.matches_at(document, ancestor, index - 1)),
        }
    }
}

/// Parsed, reusable selector list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorList {
    source: String,
    selectors: Vec<Complex>,
}

impl SelectorList {
    pub fn matches(&self, document: &Document, node: NodeId) -> bool {
        self.selectors.iter().any(|selector| selector.matches(document, node))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Display for SelectorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for SelectorList {
    type Err = SelectorError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let mut selectors = Vec::new();
        for part in split_top_level(source) {
            selectors.push(parse_complex(source, part)?);
        }
        if selectors.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self {
            source: source.trim().to_string(),
            selectors,
        })
    }
}

/// Splits on commas that are not inside an attribute selector.
fn split_top_level(source: &str) -> Vec<(usize, &str)> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (index, c) in source.char_indices() {
        match (quote, c) {
            (Some(open), _) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push((start, &source[start..index]));
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push((start, &source[start..]));
    parts
}

fn parse_complex(full: &str, (offset, part): (usize, &str)) -> Result<Complex, SelectorError> {
    let chars: Vec<(usize, char)> = part.char_indices().collect();
    let mut position = 0;
    let mut compounds = Vec::new();
    let mut combinators = Vec::new();
    let mut current = Compound::default();
    let mut pending: Option<Combinator> = None;

    let unexpected = |at: usize, found: char| SelectorError::Unexpected {
        selector: full.to_string(),
        found,
        offset: offset + at,
    };

    while position < chars.len() {
        let (byte, c) = chars[position];
        match c {
            c if c.is_whitespace() || c == '>' => {
                if !current.is_empty() {
                    compounds.push(std::mem::take(&mut current));
                    pending = Some(Combinator::Descendant);
                }
                if c == '>' {
                    if compounds.is_empty() {
                        return Err(unexpected(byte, c));
                    }
                    pending = Some(Combinator::Child);
                }
                position += 1;
            }
            '#' | '.' => {
                position += 1;
                let name = read_ident(&chars, &mut position);
                if name.is_empty() {
                    return Err(unexpected(byte, c));
                }
                push_combinator(&mut combinators, &mut pending, &compounds, &current);
                if c == '#' {
                    current.id = Some(name);
                } else {
                    current.classes.push(name);
                }
            }
            '[' => {
                position += 1;
                let attribute = read_attribute(&chars, &mut position)
                    .ok_or_else(|| SelectorError::UnterminatedAttribute(full.to_string()))?;
                push_combinator(&mut combinators, &mut pending, &compounds, &current);
                current.attributes.push(attribute);
            }
            '*' => {
                position += 1;
                push_combinator(&mut combinators, &mut pending, &compounds, &current);
                current.tag = Some("*".into());
            }
            c if c.is_ascii_alphabetic() => {
                let name = read_ident(&chars, &mut position);
                push_combinator(&mut combinators, &mut pending, &compounds, &current);
                current.tag = Some(name.to_ascii_lowercase());
            }
            other => return Err(unexpected(byte, other)),
        }
    }

    if !current.is_empty() {
        compounds.push(current);
    } else if pending == Some(Combinator::Child) {
        return Err(unexpected(part.len(), '>'));
    }
    if compounds.is_empty() {
        return Err(SelectorError::Empty);
    }
    Ok(Complex { compounds, combinators })
}

/// Records the combinator joining the previous compound once a new compound starts.
fn push_combinator(
    combinators: &mut Vec<Combinator>,
    pending: &mut Option<Combinator>,
    compounds: &[Compound],
    current: &Compound,
) {
    if current.is_empty() && !compounds.is_empty() {
        combinators.push(pending.take().unwrap_or(Combinator::Descendant));
    }
}

fn read_ident(chars: &[(usize, char)], position: &mut usize) -> String {
    let mut out = String::new();
    while let Some((_, c)) = chars.get(*position) {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
            out.push(*c);
            *position += 1;
        } else {
            break;
        }
    }
    out
}

fn read_attribute(chars: &[(usize, char)], position: &mut usize) -> Option<AttrSelector> {
    let skip_ws = |position: &mut usize| {
        while chars.get(*position).is_some_and(|(_, c)| c.is_whitespace()) {
            *position += 1;
        }
    };
    skip_ws(position);
    let name = read_ident(chars, position).to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    skip_ws(position);
    let (_, c) = *chars.get(*position)?;
    if c == ']' {
        *position += 1;
        return Some(AttrSelector { name, condition: None });
    }
    let op = match c {
        '=' => AttrOp::Equals,
        '^' => AttrOp::Prefix,
        '$' => AttrOp::Suffix,
        '*' => AttrOp::Contains,
        '~' => AttrOp::Includes,
        _ => return None,
    };
    *position += 1;
    if op != AttrOp::Equals {
        if chars.get(*position).map(|(_, c)| *c) != Some('=') {
            return None;
        }
        *position += 1;
    }
    skip_ws(position);
    let value = match chars.get(*position).map(|(_, c)| *c) {
        Some(quote @ ('"' | '\'')) => {
            *position += 1;
            let mut value = String::new();
            loop {
                let (_, c) = *chars.get(*position)?;
                *position += 1;
                if c == quote {
                    break;
                }
                value.push(c);
            }
            value
        }
        _ => {
            let mut value = String::new();
            while let Some((_, c)) = chars.get(*position) {
                if *c == ']' || c.is_whitespace() {
                    break;
                }
                value.push(*c);
                *position += 1;
            }
            value
        }
    };
    skip_ws(position);
    if chars.get(*position).map(|(_, c)| *c) != Some(']') {
        return None;
    }
    *position += 1;
    Some(AttrSelector {
        name,
        condition: Some((op, value)),
    })
}
