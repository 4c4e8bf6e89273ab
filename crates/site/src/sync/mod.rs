//! Identity & sync core.
//!
//! Boot order: [`IdentityManager`] establishes the visitor's identity, the
//! [`SharedConfigStore`] waits for it to be ready before touching the
//! backend, and [`LeadSubmitter`] refuses to write until it is. Every remote
//! write goes through a [`RetryPolicy`].

mod config_store;
mod identity;
mod leads;
mod retry;

pub use config_store::SharedConfigStore;
pub use identity::{IdentityManager, IdentityOptions};
pub use leads::{LeadSubmitter, SubmitError, SubmitReceipt};
pub use retry::RetryPolicy;
