//! Portal client configuration.
//!
//! Configuration is a small JSON document read from `PORTAL_CONFIG_PATH` or,
//! by default, `<config_dir>/portal/config.json`. A missing file yields the
//! defaults, which match the markup the portal server renders. Two
//! environment variables override the file: `PORTAL_BASE_URL` and
//! `PORTAL_REFRESH_POLICY`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs_next::{config_dir, home_dir};
use portal_types::RefreshPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Environment variable allowing callers to override the config file path.
pub const CONFIG_PATH_ENV: &str = "PORTAL_CONFIG_PATH";

/// Environment variable overriding the page location used for refreshes.
pub const BASE_URL_ENV: &str = "PORTAL_BASE_URL";

/// Environment variable overriding [`PortalConfig::refresh_policy`].
pub const REFRESH_POLICY_ENV: &str = "PORTAL_REFRESH_POLICY";

/// Default filename for the JSON payload.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Error surfaced when loading configuration fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure (for example, permissions).
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON or unexpected field types.
    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid PORTAL_BASE_URL '{value}': {source}")]
    InvalidBaseUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid PORTAL_REFRESH_POLICY '{0}'; expected 'last-resolved-wins' or 'latest-issued-only'")]
    InvalidRefreshPolicy(String),
}

/// Selectors and conventions used by the approver collection on the request form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSelectors {
    /// Element the row-entries are appended to.
    pub container: String,
    /// Matches one row-entry inside the container.
    pub row: String,
    /// Element inside a row showing its 1-based position.
    pub display_order: String,
    /// Input inside a row carrying the 1-based order sent to the server.
    pub order_field: String,
    /// Element whose inner markup is the empty-row template.
    pub template: String,
    pub count_field: String,
    pub max_field: String,
    pub add_trigger: String,
    /// Token replaced with the 0-based row index in the template.
    pub placeholder: String,
    /// Tag of the element created to hold a new row's markup.
    pub row_tag: String,
    /// Class given to that element so it matches `row`.
    pub row_class: String,
    /// Notice shown when the collection is full.
    pub capacity_message: String,
}

impl Default for CollectionSelectors {
    fn default() -> Self {
        Self {
            container: "#approver-table tbody".into(),
            row: "tr.approver-row".into(),
            display_order: ".order-number".into(),
            order_field: r#"input[name$="-order"]"#.into(),
            template: "#empty-form-template".into(),
            count_field: "#id_approvers-TOTAL_FORMS".into(),
            max_field: "#id_approvers-MAX_NUM_FORMS".into(),
            add_trigger: "#add-approver".into(),
            placeholder: "__prefix__".into(),
            row_tag: "tr".into(),
            row_class: "approver-row".into(),
            capacity_message: "No more approvers can be added.".into(),
        }
    }
}

/// Selectors for the dashboard's search form and result regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSelectors {
    pub search_form: String,
    pub notification_area: String,
    pub request_area: String,
    /// Matches pagination links; they carry `data-target` and `data-page`.
    pub paginator: String,
}

impl Default for RegionSelectors {
    fn default() -> Self {
        Self {
            search_form: "#search-form".into(),
            notification_area: "#notification-area".into(),
            request_area: "#request-area".into(),
            paginator: ".ajax-pagination".into(),
        }
    }
}

/// Persisted configuration values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Location of the page whose regions are refreshed.
    pub base_url: Option<Url>,
    pub refresh_policy: RefreshPolicy,
    pub connect_timeout_secs: u64,
    pub collection: CollectionSelectors,
    pub regions: RegionSelectors,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            refresh_policy: RefreshPolicy::default(),
            connect_timeout_secs: 30,
            collection: CollectionSelectors::default(),
            regions: RegionSelectors::default(),
        }
    }
}

impl PortalConfig {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_path(&default_config_path())?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Read the JSON file at `path`; a missing file yields the defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = non_empty_env(BASE_URL_ENV) {
            let url = Url::parse(&value).map_err(|source| ConfigError::InvalidBaseUrl {
                value: value.clone(),
                source,
            })?;
            self.base_url = Some(url);
        }
        if let Some(value) = non_empty_env(REFRESH_POLICY_ENV) {
            self.refresh_policy = value
                .parse()
                .map_err(|_| ConfigError::InvalidRefreshPolicy(value.clone()))?;
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Resolve the config file path honoring [`CONFIG_PATH_ENV`].
pub fn default_config_path() -> PathBuf {
    if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("portal")
        .join(CONFIG_FILE_NAME)
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest),
        None if path == "~" => home_dir().unwrap_or_else(|| PathBuf::from("~")),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = PortalConfig::from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, PortalConfig::default());
        assert_eq!(config.collection.placeholder, "__prefix__");
        assert_eq!(config.regions.paginator, ".ajax-pagination");
    }

    #[test]
    fn partial_file_keeps_unspecified_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r##"{"refresh_policy": "latest-issued-only", "collection": {"add_trigger": "#add-row"}}"##,
        )
        .unwrap();

        let config = PortalConfig::from_path(&path).unwrap();
        assert_eq!(config.refresh_policy, RefreshPolicy::LatestIssuedOnly);
        assert_eq!(config.collection.add_trigger, "#add-row");
        assert_eq!(config.collection.row, "tr.approver-row");
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(PortalConfig::from_path(&path), Err(ConfigError::Serialization(_))));
    }

    #[test]
    fn env_overrides_apply_over_file_values() {
        temp_env::with_vars(
            [
                (BASE_URL_ENV, Some("http://localhost:8000/portal/")),
                (REFRESH_POLICY_ENV, Some("latest-issued-only")),
            ],
            || {
                let mut config = PortalConfig::default();
                config.apply_env_overrides().unwrap();
                assert_eq!(config.base_url.unwrap().as_str(), "http://localhost:8000/portal/");
                assert_eq!(config.refresh_policy, RefreshPolicy::LatestIssuedOnly);
            },
        );
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        temp_env::with_var(REFRESH_POLICY_ENV, Some("newest"), || {
            let mut config = PortalConfig::default();
            assert!(matches!(
                config.apply_env_overrides(),
                Err(ConfigError::InvalidRefreshPolicy(_))
            ));
        });
        temp_env::with_var(BASE_URL_ENV, Some("not a url"), || {
            let mut config = PortalConfig::default();
            assert!(matches!(config.apply_env_overrides(), Err(ConfigError::InvalidBaseUrl { .. })));
        });
    }

    #[test]
    fn config_path_env_override() {
        let dir = tempdir().unwrap();
        let override_path = dir.path().join("custom.json");
        temp_env::with_var(CONFIG_PATH_ENV, Some(override_path.to_str().unwrap()), || {
            assert_eq!(default_config_path(), override_path);
        });
    }
}
