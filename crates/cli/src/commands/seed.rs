//! Seed the shared config document.

use leadline_core::SharedConfig;
use leadline_site::backend::{Backend, SetOptions};
use tracing::{error, info};

use super::{CliError, Session};

/// Merge-write the default metrics into the shared config document.
///
/// Unlike the site's best-effort seed, a failure here is reported.
///
/// # Errors
///
/// Returns error if the session cannot be established or every write
/// attempt failed.
pub async fn defaults() -> Result<(), CliError> {
    let session = Session::connect().await?;
    let document = session.config.app_id.shared_config_document();
    let fields = SharedConfig::defaults().into_map();

    info!(path = %document, keys = fields.len(), "Seeding shared config defaults");

    let backend: &dyn Backend = session.backend.as_ref();
    let (path, defaults) = (&document, &fields);
    let result = session
        .config
        .retry
        .run("seed_shared_config", move || {
            backend.set_document(path, defaults, SetOptions::merge())
        })
        .await;

    match result {
        Ok(()) => {
            info!(path = %document, "Shared config seeded");
            Ok(())
        }
        Err(e) => {
            error!(path = %document, error = %e, "Shared config seed failed");
            Err(e.into())
        }
    }
}
