//! Error types for the provisioning crate.

use thiserror::Error;

/// Errors that can occur while talking to the deployment fabric.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The request could not be sent or the connection failed.
    #[error("provider request failed: {0}")]
    Http(String),

    /// The provider answered with a status that does not mean success.
    #[error("provider rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the provider.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// The provider response body could not be decoded.
    #[error("invalid provider response: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProvisionError {
    /// Check if this error is retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProvisionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// A specialized Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_classification() {
        assert!(ProvisionError::Http("reset".into()).is_retriable());
        assert!(ProvisionError::Rejected {
            status: 503,
            message: String::new()
        }
        .is_retriable());
        assert!(!ProvisionError::Rejected {
            status: 400,
            message: String::new()
        }
        .is_retriable());
        assert!(!ProvisionError::Config("x".into()).is_retriable());
    }
}
