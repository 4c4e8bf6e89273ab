//! Submit a lead from the command line.

use leadline_core::LeadForm;
use leadline_site::sync::LeadSubmitter;
use tracing::error;

use super::{CliError, Session};

/// Validate and submit `form` under the session's identity.
///
/// # Errors
///
/// Returns error if the form is invalid, the session cannot be established
/// or the submission failed.
#[allow(clippy::print_stdout)]
pub async fn lead(form: LeadForm) -> Result<(), CliError> {
    let form = form.normalized();
    form.validate()?;

    let session = Session::connect().await?;
    let submitter = LeadSubmitter::new(session.config.app_id.clone(), session.config.retry);

    match submitter
        .submit(&session.identity, Some(&session.backend), form)
        .await
    {
        Ok(receipt) => {
            println!("{}", receipt.message);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Lead submission failed");
            Err(CliError::Submit(e))
        }
    }
}
