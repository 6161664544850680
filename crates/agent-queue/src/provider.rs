//! Queue provider: stable identity over a replaceable connection.
//!
//! [`RotatingQueueProvider`] is constructed once per queue and lives for the
//! whole worker process. Workers call receive, delete and change-visibility
//! concurrently; a refresh actor calls [`MessageQueue::refresh_client`] with
//! fresh credentials. Refresh builds the new connection before taking the
//! write lock, and a failed refresh leaves the previous connection serving.

use crate::client::{QueueClient, QueueConnector, ReceiveRequest};
use crate::credentials::CredentialSet;
use crate::error::{AuthenticationError, ConfigurationError, QueueOperation, QueueOperationError};
use crate::message::QueueMessage;
use crate::providers::{SqsConfig, SqsConnector};
use crate::settings::{QueueEndpoint, QueueSettings, MAX_WAIT_TIME_SECONDS};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Largest batch a single receive may request
pub const MAX_RECEIVE_BATCH: u32 = 10;

/// Longest visibility timeout the queue service accepts (12 hours)
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u32 = 43_200;

/// Operations workers and the refresh actor perform against a queue
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue URL; immutable for the provider's lifetime
    fn queue_url(&self) -> &str;

    /// Receive up to `max_messages` (1-10) messages
    ///
    /// Returns an empty vec, not an error, when nothing is available.
    async fn receive_messages(
        &self,
        max_messages: u32,
        visibility_timeout_seconds: u32,
    ) -> Result<Vec<QueueMessage>, QueueOperationError>;

    /// Delete a processed message
    async fn delete_message(&self, message: &QueueMessage) -> Result<(), QueueOperationError>;

    /// Extend (or shorten) the processing window of a message
    async fn change_message_visibility(
        &self,
        message: &QueueMessage,
        visibility_timeout_seconds: u32,
    ) -> Result<(), QueueOperationError>;

    /// Replace the live connection with one built from `credentials`
    ///
    /// Assumes a single refresh actor such as
    /// [`CredentialRefresher`](crate::refresh::CredentialRefresher). Concurrent
    /// refreshes each build outside the lock and install in completion order,
    /// so a slower build can replace newer credentials with older ones.
    async fn refresh_client(&self, credentials: &CredentialSet) -> Result<(), AuthenticationError>;
}

/// Queue provider whose connection can be swapped while workers use it
pub struct RotatingQueueProvider {
    name: String,
    endpoint: QueueEndpoint,
    wait_time_seconds: u32,
    connector: Arc<dyn QueueConnector>,
    client: QueueClient,
}

impl RotatingQueueProvider {
    /// Create a provider with no live connection
    ///
    /// Operations fail with `NotConnected` until the first successful
    /// [`MessageQueue::refresh_client`].
    pub fn new(endpoint: QueueEndpoint, connector: Arc<dyn QueueConnector>) -> Self {
        Self {
            name: uuid::Uuid::new_v4().to_string(),
            endpoint,
            wait_time_seconds: 0,
            connector,
            client: QueueClient::new(),
        }
    }

    /// Create an SQS-backed provider from settings
    pub fn from_settings(settings: &QueueSettings) -> Result<Self, ConfigurationError> {
        settings.validate()?;

        let connector = SqsConnector::new(SqsConfig::from_settings(settings))?;
        let provider = Self::new(settings.endpoint()?, Arc::new(connector))
            .with_wait_time_seconds(settings.wait_time_seconds)?;

        info!(
            provider = %provider.name,
            queue_url = %provider.endpoint.queue_url(),
            region = %provider.endpoint.region(),
            "Created queue provider"
        );

        Ok(provider)
    }

    /// Set the long-poll wait used by receive calls
    pub fn with_wait_time_seconds(
        mut self,
        wait_time_seconds: u32,
    ) -> Result<Self, ConfigurationError> {
        if wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ConfigurationError::Invalid {
                key: "wait_time_seconds".to_string(),
                message: format!("must be at most {}", MAX_WAIT_TIME_SECONDS),
            });
        }
        self.wait_time_seconds = wait_time_seconds;
        Ok(self)
    }

    /// Generated provider name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Region the provider signs requests for
    pub fn region(&self) -> &str {
        self.endpoint.region()
    }

    /// Queue endpoint
    pub fn endpoint(&self) -> &QueueEndpoint {
        &self.endpoint
    }

    /// Generation of the live connection, 0 before the first refresh
    pub async fn generation(&self) -> u64 {
        self.client.generation().await
    }

    /// Check whether a connection has been installed
    pub async fn is_connected(&self) -> bool {
        self.client.is_connected().await
    }

    fn check_visibility_timeout(
        operation: QueueOperation,
        visibility_timeout_seconds: u32,
    ) -> Result<(), QueueOperationError> {
        if visibility_timeout_seconds > MAX_VISIBILITY_TIMEOUT_SECONDS {
            return Err(QueueOperationError::InvalidArgument {
                operation,
                field: "visibility_timeout_seconds".to_string(),
                message: format!("must be at most {}", MAX_VISIBILITY_TIMEOUT_SECONDS),
            });
        }
        Ok(())
    }

    fn log_failure(&self, error: &QueueOperationError) {
        warn!(
            provider = %self.name,
            queue_url = %self.endpoint.queue_url(),
            operation = %error.operation(),
            code = error.code().unwrap_or("-"),
            error = %error,
            "Queue operation failed"
        );
    }
}

impl fmt::Debug for RotatingQueueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingQueueProvider")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("wait_time_seconds", &self.wait_time_seconds)
            .finish()
    }
}

#[async_trait]
impl MessageQueue for RotatingQueueProvider {
    fn queue_url(&self) -> &str {
        self.endpoint.queue_url()
    }

    async fn receive_messages(
        &self,
        max_messages: u32,
        visibility_timeout_seconds: u32,
    ) -> Result<Vec<QueueMessage>, QueueOperationError> {
        if !(1..=MAX_RECEIVE_BATCH).contains(&max_messages) {
            return Err(QueueOperationError::InvalidArgument {
                operation: QueueOperation::Receive,
                field: "max_messages".to_string(),
                message: format!("must be between 1 and {}", MAX_RECEIVE_BATCH),
            });
        }
        Self::check_visibility_timeout(QueueOperation::Receive, visibility_timeout_seconds)?;

        // Built outside the lock; only the call itself is guarded
        let request = ReceiveRequest {
            queue_url: self.endpoint.queue_url().to_string(),
            max_messages,
            visibility_timeout_seconds,
            wait_time_seconds: self.wait_time_seconds,
            all_attributes: true,
        };

        let result = self
            .client
            .with_connection(QueueOperation::Receive, |slot| async move {
                slot.transport().receive_messages(&request).await
            })
            .await;

        match &result {
            Ok(messages) if messages.is_empty() => {
                debug!(
                    provider = %self.name,
                    queue_url = %self.endpoint.queue_url(),
                    "Received 0 messages"
                );
            }
            Ok(messages) => {
                info!(
                    provider = %self.name,
                    queue_url = %self.endpoint.queue_url(),
                    count = messages.len(),
                    "Received messages"
                );
            }
            Err(error) => self.log_failure(error),
        }

        result
    }

    async fn delete_message(&self, message: &QueueMessage) -> Result<(), QueueOperationError> {
        let queue_url = self.endpoint.queue_url();
        let receipt = &message.receipt_handle;

        let result = self
            .client
            .with_connection(QueueOperation::Delete, |slot| async move {
                slot.transport().delete_message(queue_url, receipt).await
            })
            .await;

        match &result {
            Ok(()) => debug!(
                provider = %self.name,
                message_id = %message.message_id,
                "Message deleted"
            ),
            Err(error) => self.log_failure(error),
        }

        result
    }

    async fn change_message_visibility(
        &self,
        message: &QueueMessage,
        visibility_timeout_seconds: u32,
    ) -> Result<(), QueueOperationError> {
        Self::check_visibility_timeout(
            QueueOperation::ChangeVisibility,
            visibility_timeout_seconds,
        )?;

        let queue_url = self.endpoint.queue_url();
        let receipt = &message.receipt_handle;

        let result = self
            .client
            .with_connection(QueueOperation::ChangeVisibility, |slot| async move {
                slot.transport()
                    .change_message_visibility(queue_url, receipt, visibility_timeout_seconds)
                    .await
            })
            .await;

        match &result {
            Ok(()) => debug!(
                provider = %self.name,
                message_id = %message.message_id,
                visibility_timeout_seconds,
                "Message visibility changed"
            ),
            Err(error) => self.log_failure(error),
        }

        result
    }

    async fn refresh_client(&self, credentials: &CredentialSet) -> Result<(), AuthenticationError> {
        // Session establishment happens before any lock is taken
        let transport = match self.connector.connect(&self.endpoint, credentials).await {
            Ok(transport) => transport,
            Err(error) => {
                error!(
                    provider = %self.name,
                    queue_url = %self.endpoint.queue_url(),
                    access_key_id = %credentials.access_key_id(),
                    error = %error,
                    "Queue client refresh failed; previous connection stays active"
                );
                return Err(error);
            }
        };

        let generation = self
            .client
            .install(transport, credentials.access_key_id())
            .await;

        info!(
            provider = %self.name,
            queue_url = %self.endpoint.queue_url(),
            access_key_id = %credentials.access_key_id(),
            generation,
            "Queue client refreshed"
        );

        Ok(())
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
