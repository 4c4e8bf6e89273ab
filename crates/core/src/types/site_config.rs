//! Shared site configuration (display metrics).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recognised keys and their compiled-in defaults.
pub const DEFAULT_METRICS: &[(&str, &str)] = &[
    ("years", "10+"),
    ("projects", "250+"),
    ("clients", "120+"),
    ("satisfaction", "98%"),
];

/// Rejected shared config mapping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedConfigError {
    #[error("shared config cannot be empty")]
    Empty,
}

/// Mapping of shared config keys to display values.
///
/// Never empty: it is either a non-empty remote mapping or the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct SharedConfig(BTreeMap<String, String>);

impl SharedConfig {
    /// The compiled-in default mapping.
    #[must_use]
    pub fn defaults() -> Self {
        Self(
            DEFAULT_METRICS
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        )
    }

    /// Build a view from a remote mapping.
    ///
    /// The remote mapping is taken verbatim; it is not merged with the
    /// defaults. An empty mapping yields `None`.
    #[must_use]
    pub fn from_remote(fields: BTreeMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            None
        } else {
            Some(Self(fields))
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<BTreeMap<String, String>> for SharedConfig {
    type Error = SharedConfigError;

    fn try_from(fields: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_remote(fields).ok_or(SharedConfigError::Empty)
    }
}

impl From<SharedConfig> for BTreeMap<String, String> {
    fn from(config: SharedConfig) -> Self {
        config.0
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Where the current view came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Default,
    Remote,
}

/// The in-memory shared config view published to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedConfigView {
    pub metrics: SharedConfig,
    pub source: ConfigSource,
    /// Revision of the remote snapshot this view was built from.
    pub revision: Option<u64>,
}

impl SharedConfigView {
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            metrics: SharedConfig::defaults(),
            source: ConfigSource::Default,
            revision: None,
        }
    }

    #[must_use]
    pub const fn remote(metrics: SharedConfig, revision: u64) -> Self {
        Self {
            metrics,
            source: ConfigSource::Remote,
            revision: Some(revision),
        }
    }
}

impl Default for SharedConfigView {
    fn default() -> Self {
        Self::defaults()
    }
}
