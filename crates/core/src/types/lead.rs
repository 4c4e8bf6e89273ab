//! Lead form input and the immutable record written for it.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::status::LeadStatus;

/// Flat string-to-string document body, the shape every backend write takes.
pub type Fields = BTreeMap<String, String>;

/// Maximum length of an email address (RFC 5321).
const MAX_EMAIL_LENGTH: usize = 254;

/// Errors returned by [`LeadForm::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LeadFormError {
    #[error("name is required")]
    MissingName,
    #[error("email is required")]
    MissingEmail,
    #[error("email must be at most {max} characters")]
    EmailTooLong { max: usize },
    #[error("email address is not valid")]
    InvalidEmail,
}

/// User-supplied inquiry form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeadForm {
    pub name: String,
    #[serde(default)]
    pub company: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub inquiry: String,
}

impl LeadForm {
    /// Trim every field and lower-case the email.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_owned(),
            company: self.company.trim().to_owned(),
            email: self.email.trim().to_lowercase(),
            phone: self.phone.trim().to_owned(),
            inquiry: self.inquiry.trim().to_owned(),
        }
    }

    /// Check the fields a lead cannot be followed up without.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the email is missing or malformed.
    pub fn validate(&self) -> Result<(), LeadFormError> {
        if self.name.trim().is_empty() {
            return Err(LeadFormError::MissingName);
        }

        let email = self.email.trim();
        if email.is_empty() {
            return Err(LeadFormError::MissingEmail);
        }
        if email.len() > MAX_EMAIL_LENGTH {
            return Err(LeadFormError::EmailTooLong {
                max: MAX_EMAIL_LENGTH,
            });
        }

        let Some((local, domain)) = email.split_once('@') else {
            return Err(LeadFormError::InvalidEmail);
        };
        if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@')
        {
            return Err(LeadFormError::InvalidEmail);
        }

        Ok(())
    }
}

/// A lead as persisted in the visitor's private collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    #[serde(flatten)]
    pub form: LeadForm,
    pub timestamp: DateTime<Utc>,
    pub status: LeadStatus,
}

impl LeadRecord {
    /// Build a fresh record with the starting status.
    #[must_use]
    pub fn new(form: LeadForm, timestamp: DateTime<Utc>) -> Self {
        Self {
            form,
            timestamp,
            status: LeadStatus::New,
        }
    }

    /// Flatten into the document body written to the backend.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        let LeadForm {
            name,
            company,
            email,
            phone,
            inquiry,
        } = &self.form;

        BTreeMap::from([
            ("name".to_owned(), name.clone()),
            ("company".to_owned(), company.clone()),
            ("email".to_owned(), email.clone()),
            ("phone".to_owned(), phone.clone()),
            ("inquiry".to_owned(), inquiry.clone()),
            (
                "timestamp".to_owned(),
                self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("status".to_owned(), self.status.to_string()),
        ])
    }
}
