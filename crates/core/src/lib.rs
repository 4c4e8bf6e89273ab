//! Leadline Core - Shared types library.
//!
//! This crate provides common types used across all Leadline components:
//! - `site` - Public-facing marketing site and its identity & sync core
//! - `cli` - Command-line tools for seeding and inspecting the backend
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no runtime, no HTTP clients.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, backend paths, identity state, shared config and lead records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
