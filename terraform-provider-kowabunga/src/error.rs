//! Provider error taxonomy and its mapping onto Terraform diagnostics

use crate::client::ClientError;
use crate::schema::Diagnostic;
use crate::timeouts::Operation;
use kowabunga_common::Kind;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// A name-or-ID reference matched nothing
    #[error("Unknown {0}")]
    Unknown(Kind),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("Invalid value for {attribute}: {message}")]
    InvalidAttribute { attribute: String, message: String },

    #[error("{0}")]
    Validation(String),

    #[error("The API returned no ID for the new {0}")]
    MissingId(Kind),

    #[error("{operation} did not complete within {after:?}")]
    Timeout { operation: Operation, after: Duration },

    #[error("Provider not configured")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    pub fn invalid(attribute: &str, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }

    /// Whether the remote object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Client(ClientError::NotFound(_)))
    }

    /// Wrap the error as the detail of a diagnostic with the given summary
    pub fn to_diagnostic(&self, summary: &str) -> Diagnostic {
        let diag = Diagnostic::error(summary).with_detail(&self.to_string());
        match self {
            Self::MissingAttribute(attribute) | Self::InvalidAttribute { attribute, .. } => {
                diag.with_attribute(vec![attribute.clone()])
            }
            _ => diag,
        }
    }
}
