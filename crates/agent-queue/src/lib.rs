//! # Agent Queue
//!
//! Queue client for long-running worker agents whose queue credentials are
//! temporary and rotate while the agent keeps processing messages.
//!
//! This library provides:
//! - A queue provider with a stable identity and a replaceable connection
//! - Receive, delete and change-visibility operations safe for concurrent use
//! - Credential refresh that never blocks in-flight calls on re-authentication
//! - An SQS transport signing requests with temporary credentials
//! - An in-memory transport for tests and local development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for queue operations, authentication and settings
//! - [`message`] - Received messages and receipt handles
//! - [`credentials`] - Temporary credential sets
//! - [`client`] - Transport traits and the lock-protected connection slot
//! - [`provider`] - The rotating queue provider
//! - [`providers`] - SQS and in-memory transports
//! - [`refresh`] - Background credential refresher
//! - [`settings`] - Configuration loading
//!
//! ## Example
//!
//! ```rust,ignore
//! let settings = QueueSettings::load(Some(Path::new("agent-queue.yaml")))?;
//! let queue = Arc::new(RotatingQueueProvider::from_settings(&settings)?);
//!
//! let refresher = CredentialRefresher::new(queue.clone(), source, settings.refresh.clone());
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! refresher.spawn(shutdown_rx);
//!
//! for message in queue.receive_messages(10, 60).await? {
//!     process(&message).await;
//!     queue.delete_message(&message).await?;
//! }
//! ```

pub mod client;
pub mod credentials;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod refresh;
pub mod settings;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClient, QueueConnector, QueueTransport, ReceiveRequest};
pub use credentials::CredentialSet;
pub use error::{
    AuthenticationError, ConfigurationError, CredentialSourceError, QueueOperation,
    QueueOperationError, RefreshError,
};
pub use message::{MessageAttributeValue, MessageId, QueueMessage, ReceiptHandle, Timestamp};
pub use provider::{MessageQueue, RotatingQueueProvider};
pub use providers::{InMemoryConnector, InMemoryQueue, SqsConfig, SqsConnector};
pub use refresh::{CredentialRefresher, CredentialSource, RefreshHandle, RefreshStats};
pub use settings::{QueueEndpoint, QueueSettings, RefreshSettings};
