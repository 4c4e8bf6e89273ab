//! Leadline site library.
//!
//! Identity bootstrap, shared config mirroring and lead submission against a
//! pluggable backend, plus the HTTP shell serving them. Exposed as a library
//! so the CLI and the integration tests drive the same code as the binary.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod sync;
