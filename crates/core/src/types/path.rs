//! Backend document and collection paths.
//!
//! All data lives under `artifacts/{app_id}/...`:
//!
//! ```text
//! artifacts/{app_id}/public/data/site_config/metrics   - shared config document
//! artifacts/{app_id}/users/{visitor_id}/leads          - per-visitor lead collection
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::types::id::VisitorId;

/// Errors that can occur when parsing an [`AppId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AppIdError {
    /// The input string is empty or whitespace.
    #[error("app id cannot be empty")]
    Empty,
    /// The input contains a path separator.
    #[error("app id cannot contain '/'")]
    ContainsSeparator,
}

/// Application identifier that scopes every backend path.
///
/// ```
/// use leadline_core::AppId;
///
/// assert!(AppId::parse("acme-site").is_ok());
/// assert!(AppId::parse("").is_err());
/// assert!(AppId::parse("a/b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    /// App id used when none is configured.
    pub const DEFAULT: &'static str = "default-app-id";

    /// Parse an `AppId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is blank or contains `/`.
    pub fn parse(s: &str) -> Result<Self, AppIdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AppIdError::Empty);
        }
        if s.contains('/') {
            return Err(AppIdError::ContainsSeparator);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the app id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The shared, read-mostly site configuration document.
    #[must_use]
    pub fn shared_config_document(&self) -> DocumentPath {
        DocumentPath(format!("artifacts/{}/public/data/site_config/metrics", self.0))
    }

    /// The private lead collection owned by `visitor`.
    #[must_use]
    pub fn lead_collection(&self, visitor: &VisitorId) -> CollectionPath {
        CollectionPath(format!("artifacts/{}/users/{}/leads", self.0, visitor))
    }
}

impl Default for AppId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_owned())
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AppId {
    type Err = AppIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AppId {
    type Error = AppIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AppId> for String {
    fn from(id: AppId) -> Self {
        id.0
    }
}

/// Slash-separated path to a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Wrap a raw document path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Slash-separated path to a collection of documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Wrap a raw collection path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_app_id_parse_trims() {
        let id = AppId::parse("  acme  ").ok();
        assert_eq!(id.as_ref().map(AppId::as_str), Some("acme"));
    }

    #[test]
    fn test_app_id_rejects_invalid() {
        assert_eq!(AppId::parse("   "), Err(AppIdError::Empty));
        assert_eq!(AppId::parse("a/b"), Err(AppIdError::ContainsSeparator));
    }

    #[test]
    fn test_app_id_deserialize_validates() {
        let id: AppId = serde_json::from_str(r#"" acme ""#).unwrap();
        assert_eq!(id.as_str(), "acme");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""acme""#);

        assert!(serde_json::from_str::<AppId>(r#""""#).is_err());
        assert!(serde_json::from_str::<AppId>(r#""a/b""#).is_err());
    }

    #[test]
    fn test_paths_are_scoped_by_app_and_visitor() {
        let app = AppId::default();
        assert_eq!(
            app.shared_config_document().as_str(),
            "artifacts/default-app-id/public/data/site_config/metrics"
        );
        assert_eq!(
            app.lead_collection(&VisitorId::new("u1")).as_str(),
            "artifacts/default-app-id/users/u1/leads"
        );
    }
}
