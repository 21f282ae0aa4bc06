//! Error types for the lifecycle engine.
//!
//! This module defines all errors that can occur while creating, joining,
//! listing and deleting instances, and while ingesting instance reports.

use fleet_core::{CallbackId, InstanceId};
use fleet_provision::ProvisionError;
use fleet_store::StoreError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in lifecycle operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A request was missing required data or carried malformed values.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested instance was not found.
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// A join would exceed the instance's seat capacity.
    #[error(
        "seat limit reached on instance {instance_id}: capacity exceeded ({requested} requested, {available} available)"
    )]
    SeatLimitReached {
        /// The instance being joined.
        instance_id: InstanceId,
        /// Seats the join would consume.
        requested: usize,
        /// Seats still free before the join.
        available: i32,
    },

    /// The provisioning fabric could not be reached or failed a request.
    #[error("provisioning error: {0}")]
    Provisioning(#[source] ProvisionError),

    /// The provisioning fabric refused to create a deployment.
    #[error("deployment rejected: {0}")]
    DeploymentRejected(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// An inbound report was malformed.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A create callback was registered twice under the same id.
    #[error("callback already registered: {0}")]
    CallbackAlreadyRegistered(CallbackId),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ProvisionError> for ControlError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Rejected { message, .. } => Self::DeploymentRejected(message),
            other => Self::Provisioning(other),
        }
    }
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_)
            | Self::Protocol(_)
            | Self::Store(StoreError::InvalidQuery(_) | StoreError::InvalidCursor) => 400,
            Self::InstanceNotFound(_) => 404,
            Self::SeatLimitReached { .. } => 409,
            Self::Provisioning(_) | Self::DeploymentRejected(_) => 502,
            Self::Store(_) | Self::CallbackAlreadyRegistered(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Provisioning(err) => err.is_retriable(),
            Self::Store(StoreError::Database(_)) | Self::Internal(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        let instance_id = InstanceId::new("i-1").unwrap();

        assert_eq!(
            ControlError::InvalidInput("x".into()).http_status_code(),
            400
        );
        assert_eq!(
            ControlError::InstanceNotFound(instance_id.clone()).http_status_code(),
            404
        );
        assert_eq!(
            ControlError::SeatLimitReached {
                instance_id,
                requested: 1,
                available: 0
            }
            .http_status_code(),
            409
        );
        assert_eq!(
            ControlError::Store(StoreError::InvalidCursor).http_status_code(),
            400
        );
        assert_eq!(
            ControlError::Store(StoreError::Database("io".into())).http_status_code(),
            500
        );
    }

    #[test]
    fn provider_rejection_is_not_retried() {
        let err = ControlError::from(ProvisionError::Rejected {
            status: 400,
            message: "bad app version".into(),
        });
        assert!(matches!(err, ControlError::DeploymentRejected(ref m) if m == "bad app version"));
        assert_eq!(err.http_status_code(), 502);
        assert!(!err.is_retriable());

        let err = ControlError::from(ProvisionError::Http("timed out".into()));
        assert!(err.is_retriable());
    }

    #[test]
    fn seat_limit_message_names_capacity() {
        let err = ControlError::SeatLimitReached {
            instance_id: InstanceId::new("i-1").unwrap(),
            requested: 1,
            available: 0,
        };
        assert!(err.to_string().contains("capacity exceeded"));
    }
}
