//! Core types for Leadline.
//!
//! This module provides type-safe wrappers for the domain concepts shared by
//! the identity bootstrap, the shared config view and the lead log.

pub mod id;
pub mod identity;
pub mod lead;
pub mod path;
pub mod site_config;
pub mod status;

pub use id::*;
pub use identity::{Identity, IdentitySource, IdentityState};
pub use lead::{Fields, LeadForm, LeadFormError, LeadRecord};
pub use path::{AppId, AppIdError, CollectionPath, DocumentPath};
pub use site_config::{ConfigSource, SharedConfig, SharedConfigError, SharedConfigView};
pub use status::LeadStatus;
