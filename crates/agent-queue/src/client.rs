//! Connection slot: the single live transport and the lock that guards it.
//!
//! A [`QueueConnector`] builds an authenticated [`QueueTransport`] from a
//! credential set. The [`QueueClient`] holds the currently installed transport
//! behind a read/write lock:
//!
//! - worker calls take the read lock only around the network call, so calls
//!   against the same connection run in parallel;
//! - installing a new transport takes the write lock only for the swap, so
//!   re-authentication latency never blocks readers.
//!
//! Readers see either the complete old slot or the complete new one.

use crate::credentials::CredentialSet;
use crate::error::{AuthenticationError, QueueOperation, QueueOperationError};
use crate::message::{QueueMessage, ReceiptHandle, Timestamp};
use crate::settings::QueueEndpoint;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Parameters of a single receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub queue_url: String,
    pub max_messages: u32,
    pub visibility_timeout_seconds: u32,
    pub wait_time_seconds: u32,
    /// Request every system attribute and message attribute
    pub all_attributes: bool,
}

/// Remote calls bound to one authenticated connection
///
/// Implementations hold no shared mutable state that needs locking; the
/// provider serializes swaps around them.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Receive up to `request.max_messages` messages; empty when none are available
    async fn receive_messages(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<QueueMessage>, QueueOperationError>;

    /// Delete a message by receipt handle
    async fn delete_message(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueOperationError>;

    /// Change the visibility timeout of an in-flight message
    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
        visibility_timeout_seconds: u32,
    ) -> Result<(), QueueOperationError>;
}

/// Builds authenticated transports from credentials
///
/// `connect` is a pure function of its inputs; it never touches the slot.
#[async_trait]
pub trait QueueConnector: Send + Sync {
    /// Build a new transport for `endpoint` using `credentials`
    async fn connect(
        &self,
        endpoint: &QueueEndpoint,
        credentials: &CredentialSet,
    ) -> Result<Arc<dyn QueueTransport>, AuthenticationError>;
}

/// One installed connection
pub struct ConnectionSlot {
    transport: Arc<dyn QueueTransport>,
    generation: u64,
    access_key_id: String,
    installed_at: Timestamp,
}

impl ConnectionSlot {
    /// Transport bound to this slot
    pub fn transport(&self) -> &dyn QueueTransport {
        self.transport.as_ref()
    }

    /// Install counter, starting at 1 for the first connection
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Access key the transport was built from
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// When the slot was installed
    pub fn installed_at(&self) -> Timestamp {
        self.installed_at
    }
}

impl std::fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSlot")
            .field("generation", &self.generation)
            .field("access_key_id", &self.access_key_id)
            .field("installed_at", &self.installed_at)
            .finish()
    }
}

/// Lock-protected holder of the live connection slot
pub struct QueueClient {
    slot: RwLock<Option<Arc<ConnectionSlot>>>,
    generations: AtomicU64,
}

impl QueueClient {
    /// Create a client with no connection installed
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            generations: AtomicU64::new(0),
        }
    }

    /// Replace the live slot with `transport`
    ///
    /// The write lock is held only for the assignment. Returns the new
    /// generation.
    pub async fn install(&self, transport: Arc<dyn QueueTransport>, access_key_id: &str) -> u64 {
        let access_key_id = access_key_id.to_string();

        let (generation, previous) = {
            let mut guard = self.slot.write().await;
            // Numbered under the lock so generations follow install order
            let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
            let previous = guard.replace(Arc::new(ConnectionSlot {
                transport,
                generation,
                access_key_id,
                installed_at: Timestamp::now(),
            }));
            (generation, previous)
        };

        // The old transport is dropped outside the lock
        drop(previous);
        generation
    }

    /// Run `call` against the live slot while holding the read lock
    ///
    /// The guard is held until the future returned by `call` completes, so a
    /// concurrent `install` waits for the call to finish. Fails with
    /// `NotConnected` when nothing has been installed yet.
    pub async fn with_connection<T, F, Fut>(
        &self,
        operation: QueueOperation,
        call: F,
    ) -> Result<T, QueueOperationError>
    where
        F: FnOnce(Arc<ConnectionSlot>) -> Fut,
        Fut: Future<Output = Result<T, QueueOperationError>>,
    {
        let guard = self.slot.read().await;
        let slot = guard
            .as_ref()
            .map(Arc::clone)
            .ok_or(QueueOperationError::NotConnected { operation })?;
        let result = call(slot).await;
        drop(guard);
        result
    }

    /// Generation of the live slot, 0 when nothing is installed
    pub async fn generation(&self) -> u64 {
        self.slot
            .read()
            .await
            .as_ref()
            .map(|slot| slot.generation())
            .unwrap_or(0)
    }

    /// Check whether a connection is installed
    pub async fn is_connected(&self) -> bool {
        self.slot.read().await.is_some()
    }
}

impl Default for QueueClient {
    fn default() -> Self {
        Self::new()
    }
}
