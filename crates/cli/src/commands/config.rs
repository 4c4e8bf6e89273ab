//! Print the shared config view.

use leadline_core::{SharedConfig, SharedConfigView};
use leadline_site::backend::Backend;
use tracing::warn;

use super::{CliError, Session};

/// Fetch the shared config document once and print the resulting view.
///
/// Mirrors what the site serves: the remote mapping when the document
/// exists, the defaults when it is missing, empty or unreadable.
///
/// # Errors
///
/// Returns error if the session cannot be established.
#[allow(clippy::print_stdout)]
pub async fn show() -> Result<(), CliError> {
    let session = Session::connect().await?;
    let document = session.config.app_id.shared_config_document();

    let view = match session.backend.get_document(&document).await {
        Ok(Some(snapshot)) => match SharedConfig::from_remote(snapshot.fields) {
            Some(metrics) => SharedConfigView::remote(metrics, snapshot.revision),
            None => SharedConfigView::defaults(),
        },
        Ok(None) => SharedConfigView::defaults(),
        Err(e) => {
            warn!(path = %document, error = %e, "Could not read shared config, showing defaults");
            SharedConfigView::defaults()
        }
    };

    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
