use std::{error::Error, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Query key naming the region whose fragment is requested.
pub const TARGET_QUERY_KEY: &str = "target";

/// Represents one independently paginated content area of the dashboard.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// Notices addressed to the current user (`#notification-area`)
    Notification,
    /// Approval requests matching the search form (`#request-area`)
    Request,
}

impl Region {
    /// Name sent as the `target` query value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Request => "request",
        }
    }

    /// Query key carrying this region's page cursor.
    ///
    /// The keys differ so both cursors can ride in the same serialized form.
    pub fn cursor_key(&self) -> &'static str {
        match self {
            Self::Notification => "n_page",
            Self::Request => "page",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ParseRegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "notification" => Ok(Self::Notification),
            "request" => Ok(Self::Request),
            other => Err(ParseRegionError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRegionError(pub String);

impl fmt::Display for ParseRegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown region '{}'; expected 'notification' or 'request'", self.0)
    }
}

impl Error for ParseRegionError {}

/// Ordered key/value pairs serialized into a request query.
///
/// Repeated keys are preserved in insertion order, matching how a browser
/// serializes form data. `set` follows `URLSearchParams::set`: the first
/// occurrence is replaced in place and later duplicates are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter().position(|(existing, _)| existing == key) {
            Some(first) => {
                self.pairs[first].1 = value;
                let mut index = 0;
                self.pairs.retain(|(existing, _)| {
                    let keep = index <= first || existing != key;
                    index += 1;
                    keep
                });
            }
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(existing, _)| existing == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().map(|(key, value)| (key.into(), value.into())).collect(),
        }
    }
}

impl IntoIterator for QueryParams {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

/// Opaque server-rendered markup for one region/query combination.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fragment(String);

impl Fragment {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fragment {
    fn from(markup: String) -> Self {
        Self(markup)
    }
}

/// Current and maximum row counts of a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBounds {
    pub count: usize,
    pub max: usize,
}

impl RowBounds {
    /// Whether another row may be added. Equality already rejects.
    pub fn has_capacity(&self) -> bool {
        self.count < self.max
    }
}

/// How overlapping refreshes for the same region are reconciled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// Every successful response is applied; whichever resolves last wins.
    #[default]
    LastResolvedWins,
    /// Responses superseded by a newer request for the same region are discarded.
    LatestIssuedOnly,
}

impl RefreshPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastResolvedWins => "last-resolved-wins",
            Self::LatestIssuedOnly => "latest-issued-only",
        }
    }
}

impl fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshPolicy {
    type Err = ParseRefreshPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-resolved-wins" => Ok(Self::LastResolvedWins),
            "latest-issued-only" => Ok(Self::LatestIssuedOnly),
            _ => Err(ParseRefreshPolicyError),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseRefreshPolicyError;

impl fmt::Display for ParseRefreshPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid refresh policy; expected 'last-resolved-wins' or 'latest-issued-only'")
    }
}

impl Error for ParseRefreshPolicyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_cursor_keys_are_distinct() {
        assert_eq!(Region::Notification.cursor_key(), "n_page");
        assert_eq!(Region::Request.cursor_key(), "page");
        assert_eq!("notification".parse::<Region>().unwrap(), Region::Notification);
        assert!("requests".parse::<Region>().is_err());
    }

    #[test]
    fn set_replaces_first_occurrence_and_drops_duplicates() {
        let mut params: QueryParams = [("status", "open"), ("page", "1"), ("q", "x"), ("page", "4")]
            .into_iter()
            .collect();
        params.set("page", "2");

        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("status", "open"), ("page", "2"), ("q", "x")]);
    }

    #[test]
    fn set_appends_missing_key() {
        let mut params = QueryParams::new();
        params.append("status", "open");
        params.set("n_page", "3");
        assert_eq!(params.get("n_page"), Some("3"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn repeated_keys_survive_append() {
        let mut params = QueryParams::new();
        params.append("kind", "a");
        params.append("kind", "b");
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("kind", "a"), ("kind", "b")]);
        assert_eq!(params.get("kind"), Some("a"));
    }

    #[test]
    fn bounds_reject_at_equality() {
        assert!(RowBounds { count: 2, max: 3 }.has_capacity());
        assert!(!RowBounds { count: 3, max: 3 }.has_capacity());
        assert!(!RowBounds { count: 5, max: 3 }.has_capacity());
    }

    #[test]
    fn refresh_policy_parses_kebab_case() {
        assert_eq!("latest-issued-only".parse::<RefreshPolicy>().unwrap(), RefreshPolicy::LatestIssuedOnly);
        assert_eq!(RefreshPolicy::default(), RefreshPolicy::LastResolvedWins);
        let json = serde_json::to_string(&RefreshPolicy::LatestIssuedOnly).unwrap();
        assert_eq!(json, "\"latest-issued-only\"");
    }
}
