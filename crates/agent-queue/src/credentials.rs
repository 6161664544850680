//! Temporary access credentials consumed by connection refreshes.

use crate::error::AuthenticationError;
use serde::Deserialize;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Temporary credential set produced by the credential exchange
///
/// All three fields are required and non-empty. Secret fields are zeroized
/// on drop and never appear in `Debug` output. Expiry is not tracked here:
/// an expired set surfaces as an operation failure from the queue service.
#[derive(Clone, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CredentialSet {
    #[serde(alias = "AccessKeyId", alias = "accessKeyId")]
    access_key_id: String,
    #[serde(alias = "SecretAccessKey", alias = "secretAccessKey")]
    secret_access_key: String,
    #[serde(alias = "SessionToken", alias = "sessionToken")]
    session_token: String,
}

impl CredentialSet {
    /// Create a validated credential set
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationError::MissingCredential` naming the first
    /// empty field.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Result<Self, AuthenticationError> {
        let credentials = Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Check that every field is present
    ///
    /// Deserialized sets bypass `new`, so builders call this again before
    /// using a set.
    pub fn validate(&self) -> Result<(), AuthenticationError> {
        let fields = [
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
            ("session_token", &self.session_token),
        ];

        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(AuthenticationError::MissingCredential {
                    field: field.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Access key id; safe to log
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Secret access key (only for request signing)
    pub fn expose_secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// Session token (only for request signing)
    pub fn expose_session_token(&self) -> &str {
        &self.session_token
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
