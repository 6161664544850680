//! Error types for queue operations, connection builds and configuration.

use std::fmt;
use thiserror::Error;

/// Operation that was being performed against the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOperation {
    Receive,
    Delete,
    ChangeVisibility,
}

impl QueueOperation {
    /// Name of the operation as it appears in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receive => "receive_messages",
            Self::Delete => "delete_message",
            Self::ChangeVisibility => "change_message_visibility",
        }
    }
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a receive, delete or change-visibility call
///
/// Every variant records the operation it came from so callers can log the
/// error without extra context. None of these are retried by the provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueOperationError {
    #[error("{operation}: no connection has been established yet")]
    NotConnected { operation: QueueOperation },

    #[error("{operation}: receipt handle is invalid or expired: {message}")]
    InvalidReceipt {
        operation: QueueOperation,
        message: String,
    },

    #[error("{operation}: credentials rejected ({code}): {message}")]
    Unauthorized {
        operation: QueueOperation,
        code: String,
        message: String,
    },

    #[error("{operation}: request throttled ({code}): {message}")]
    Throttled {
        operation: QueueOperation,
        code: String,
        message: String,
    },

    #[error("{operation}: connection failed: {message}")]
    Connection {
        operation: QueueOperation,
        message: String,
    },

    #[error("{operation}: service error ({code}): {message}")]
    Service {
        operation: QueueOperation,
        code: String,
        message: String,
    },

    #[error("{operation}: invalid value for {field}: {message}")]
    InvalidArgument {
        operation: QueueOperation,
        field: String,
        message: String,
    },

    #[error("{operation}: malformed response: {message}")]
    MalformedResponse {
        operation: QueueOperation,
        message: String,
    },
}

impl QueueOperationError {
    /// Operation that failed
    pub fn operation(&self) -> QueueOperation {
        match self {
            Self::NotConnected { operation }
            | Self::InvalidReceipt { operation, .. }
            | Self::Unauthorized { operation, .. }
            | Self::Throttled { operation, .. }
            | Self::Connection { operation, .. }
            | Self::Service { operation, .. }
            | Self::InvalidArgument { operation, .. }
            | Self::MalformedResponse { operation, .. } => *operation,
        }
    }

    /// Machine-readable error code reported by the queue service, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { code, .. }
            | Self::Throttled { code, .. }
            | Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Check if error is transient and the caller may retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotConnected { .. } => true,
            Self::InvalidReceipt { .. } => false,
            Self::Unauthorized { .. } => false,
            Self::Throttled { .. } => true,
            Self::Connection { .. } => true,
            Self::Service { .. } => true,
            Self::InvalidArgument { .. } => false,
            Self::MalformedResponse { .. } => false,
        }
    }

    /// Check if the failure means the live credentials need refreshing
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::NotConnected { .. })
    }
}

/// Failure to build an authenticated connection from a credential set
///
/// The provider keeps serving with its previous connection when this is
/// returned from a refresh.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("Credential field '{field}' is missing or empty")]
    MissingCredential { field: String },

    #[error("Credentials rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Credential verification could not reach the queue service: {message}")]
    Unreachable { message: String },

    #[error("Failed to create queue client: {message}")]
    Client { message: String },
}

/// Configuration errors, raised before any queue operation is attempted
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Invalid configuration for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Configuration loading failed: {message}")]
    Load { message: String },
}

/// Failure of the external credential source
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialSourceError {
    #[error("Credential source unavailable: {message}")]
    Unavailable { message: String },

    #[error("Credential source denied the request: {message}")]
    Denied { message: String },
}

/// Failed refresh cycle
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Failed to fetch credentials: {0}")]
    Source(#[from] CredentialSourceError),

    #[error("Failed to install credentials: {0}")]
    Authentication(#[from] AuthenticationError),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
