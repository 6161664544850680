//! In-memory queue and connector for testing and development.
//!
//! This module provides a small queue broker that:
//! - Hands out single-use receipt handles per delivery
//! - Implements visibility timeouts (expired receipts are rejected)
//! - Builds one transport per `connect`, bound to the credentials used
//! - Records which connection served every call
//!
//! The recording is what lets tests verify that a refresh never mixes
//! transports within one call.

use crate::client::{QueueConnector, QueueTransport, ReceiveRequest};
use crate::credentials::CredentialSet;
use crate::error::{AuthenticationError, QueueOperation, QueueOperationError};
use crate::message::{MessageAttributeValue, MessageId, QueueMessage, ReceiptHandle};
use crate::settings::QueueEndpoint;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    message_attributes: HashMap<String, MessageAttributeValue>,
    sent_at: DateTime<Utc>,
    receive_count: u32,
    first_received_at: Option<DateTime<Utc>>,
}

impl StoredMessage {
    fn to_queue_message(&self, receipt: &str) -> QueueMessage {
        let mut message = QueueMessage::new(
            self.message_id.clone(),
            self.body.clone(),
            ReceiptHandle::new(receipt),
        )
        .with_attribute("ApproximateReceiveCount", self.receive_count.to_string())
        .with_attribute("SentTimestamp", self.sent_at.timestamp_millis().to_string());

        if let Some(first_received_at) = self.first_received_at {
            message = message.with_attribute(
                "ApproximateFirstReceiveTimestamp",
                first_received_at.timestamp_millis().to_string(),
            );
        }

        message.message_attributes = self.message_attributes.clone();
        message
    }
}

/// A message currently hidden from receivers
struct InFlightMessage {
    message: StoredMessage,
    visible_at: DateTime<Utc>,
}

impl InFlightMessage {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.visible_at
    }
}

#[derive(Default)]
struct QueueStorage {
    available: VecDeque<StoredMessage>,
    /// In-flight messages keyed by their current receipt handle
    in_flight: HashMap<String, InFlightMessage>,
}

impl QueueStorage {
    /// Return messages whose visibility window lapsed to the queue
    ///
    /// Their receipt handles become invalid.
    fn release_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| in_flight.is_expired(now))
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                self.available.push_back(in_flight.message);
            }
        }
    }
}

// ============================================================================
// InMemoryQueue
// ============================================================================

/// In-memory queue with visibility timeouts and single-use receipts
pub struct InMemoryQueue {
    queue_url: String,
    storage: Mutex<QueueStorage>,
}

impl InMemoryQueue {
    /// Create an empty queue answering to `queue_url`
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            storage: Mutex::new(QueueStorage::default()),
        }
    }

    /// Queue URL this queue answers to
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Enqueue a message body
    pub fn send(&self, body: impl Into<String>) -> MessageId {
        self.send_with_attributes(body, HashMap::new())
    }

    /// Enqueue a message body with user message attributes
    pub fn send_with_attributes(
        &self,
        body: impl Into<String>,
        message_attributes: HashMap<String, MessageAttributeValue>,
    ) -> MessageId {
        let message_id = MessageId::new();
        lock(&self.storage).available.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: body.into(),
            message_attributes,
            sent_at: Utc::now(),
            receive_count: 0,
            first_received_at: None,
        });
        message_id
    }

    /// Number of messages available for receiving
    pub fn available_count(&self) -> usize {
        let mut storage = lock(&self.storage);
        storage.release_expired(Utc::now());
        storage.available.len()
    }

    /// Number of messages hidden behind a live receipt
    pub fn in_flight_count(&self) -> usize {
        let mut storage = lock(&self.storage);
        storage.release_expired(Utc::now());
        storage.in_flight.len()
    }

    fn receive(&self, max_messages: u32, visibility_timeout_seconds: u32) -> Vec<QueueMessage> {
        let now = Utc::now();
        let visible_at = now + ChronoDuration::seconds(i64::from(visibility_timeout_seconds));

        let mut storage = lock(&self.storage);
        storage.release_expired(now);

        let mut received = Vec::new();
        while received.len() < max_messages as usize {
            let Some(mut message) = storage.available.pop_front() else {
                break;
            };

            message.receive_count += 1;
            message.first_received_at.get_or_insert(now);

            let receipt = uuid::Uuid::new_v4().to_string();
            received.push(message.to_queue_message(&receipt));
            storage
                .in_flight
                .insert(receipt, InFlightMessage { message, visible_at });
        }

        received
    }

    fn delete(&self, receipt: &ReceiptHandle) -> Result<(), String> {
        let mut storage = lock(&self.storage);
        storage.release_expired(Utc::now());

        storage
            .in_flight
            .remove(receipt.handle())
            .map(|_| ())
            .ok_or_else(|| format!("receipt handle {} is not in flight", receipt))
    }

    fn change_visibility(
        &self,
        receipt: &ReceiptHandle,
        visibility_timeout_seconds: u32,
    ) -> Result<(), String> {
        let now = Utc::now();
        let mut storage = lock(&self.storage);
        storage.release_expired(now);

        let in_flight = storage
            .in_flight
            .get_mut(receipt.handle())
            .ok_or_else(|| format!("receipt handle {} is not in flight", receipt))?;
        in_flight.visible_at = now + ChronoDuration::seconds(i64::from(visibility_timeout_seconds));
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueue")
            .field("queue_url", &self.queue_url)
            .finish()
    }
}

// ============================================================================
// Call recording
// ============================================================================

/// One transport call as seen by the in-memory connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedCall {
    /// Sequence number of the `connect` that built the serving transport
    pub connection: u64,
    /// Access key the serving transport was built from
    pub access_key_id: String,
    pub operation: QueueOperation,
    /// Global event sequence at call start
    pub started_at: u64,
    /// Global event sequence at call end
    pub finished_at: u64,
}

struct ConnectorState {
    queue: Arc<InMemoryQueue>,
    rejected_access_keys: Mutex<HashSet<String>>,
    expired_access_keys: Mutex<HashSet<String>>,
    served: Mutex<Vec<ServedCall>>,
    sequence: AtomicU64,
    connections: AtomicU64,
}

impl ConnectorState {
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

// ============================================================================
// InMemoryConnector
// ============================================================================

/// Connector building transports over an [`InMemoryQueue`]
#[derive(Clone)]
pub struct InMemoryConnector {
    state: Arc<ConnectorState>,
    connect_delay: Option<Duration>,
    call_delay: Option<Duration>,
}

impl InMemoryConnector {
    /// Create a connector for `queue`
    pub fn new(queue: Arc<InMemoryQueue>) -> Self {
        Self {
            state: Arc::new(ConnectorState {
                queue,
                rejected_access_keys: Mutex::new(HashSet::new()),
                expired_access_keys: Mutex::new(HashSet::new()),
                served: Mutex::new(Vec::new()),
                sequence: AtomicU64::new(0),
                connections: AtomicU64::new(0),
            }),
            connect_delay: None,
            call_delay: None,
        }
    }

    /// Simulate session-establishment latency
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Simulate network latency on every transport call
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    /// Make `connect` reject credentials with this access key
    pub fn reject_access_key(&self, access_key_id: impl Into<String>) {
        lock(&self.state.rejected_access_keys).insert(access_key_id.into());
    }

    /// Make calls through transports built from this access key fail as expired
    pub fn expire_access_key(&self, access_key_id: impl Into<String>) {
        lock(&self.state.expired_access_keys).insert(access_key_id.into());
    }

    /// Queue behind this connector
    pub fn queue(&self) -> &Arc<InMemoryQueue> {
        &self.state.queue
    }

    /// Every call served so far, in completion order
    pub fn served_calls(&self) -> Vec<ServedCall> {
        lock(&self.state.served).clone()
    }

    /// Number of successful `connect` calls
    pub fn connections_built(&self) -> u64 {
        self.state.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueConnector for InMemoryConnector {
    async fn connect(
        &self,
        endpoint: &QueueEndpoint,
        credentials: &CredentialSet,
    ) -> Result<Arc<dyn QueueTransport>, AuthenticationError> {
        credentials.validate()?;

        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }

        if lock(&self.state.rejected_access_keys).contains(credentials.access_key_id()) {
            return Err(AuthenticationError::Rejected {
                code: "InvalidClientTokenId".to_string(),
                message: format!(
                    "access key {} is not recognized",
                    credentials.access_key_id()
                ),
            });
        }

        if endpoint.queue_url() != self.state.queue.queue_url() {
            return Err(AuthenticationError::Rejected {
                code: "AccessDenied".to_string(),
                message: format!("no access to queue {}", endpoint.queue_url()),
            });
        }

        let connection = self.state.connections.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(Arc::new(InMemoryTransport {
            state: Arc::clone(&self.state),
            connection,
            access_key_id: credentials.access_key_id().to_string(),
            call_delay: self.call_delay,
        }))
    }
}

impl std::fmt::Debug for InMemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConnector")
            .field("queue", &self.state.queue)
            .field("connections_built", &self.connections_built())
            .finish()
    }
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// Transport bound to one in-memory connection
struct InMemoryTransport {
    state: Arc<ConnectorState>,
    connection: u64,
    access_key_id: String,
    call_delay: Option<Duration>,
}

impl InMemoryTransport {
    /// Run `call` against the queue, recording the call
    async fn serve<T>(
        &self,
        operation: QueueOperation,
        queue_url: &str,
        call: impl FnOnce(&InMemoryQueue) -> Result<T, QueueOperationError>,
    ) -> Result<T, QueueOperationError> {
        let started_at = self.state.next_sequence();

        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }

        let result = if lock(&self.state.expired_access_keys).contains(&self.access_key_id) {
            Err(QueueOperationError::Unauthorized {
                operation,
                code: "ExpiredToken".to_string(),
                message: "The security token included in the request is expired".to_string(),
            })
        } else if queue_url != self.state.queue.queue_url() {
            Err(QueueOperationError::Service {
                operation,
                code: "AWS.SimpleQueueService.NonExistentQueue".to_string(),
                message: format!("queue {} does not exist", queue_url),
            })
        } else {
            call(&self.state.queue)
        };

        let finished_at = self.state.next_sequence();
        lock(&self.state.served).push(ServedCall {
            connection: self.connection,
            access_key_id: self.access_key_id.clone(),
            operation,
            started_at,
            finished_at,
        });

        result
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn receive_messages(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<QueueMessage>, QueueOperationError> {
        self.serve(QueueOperation::Receive, &request.queue_url, |queue| {
            Ok(queue.receive(request.max_messages, request.visibility_timeout_seconds))
        })
        .await
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueOperationError> {
        self.serve(QueueOperation::Delete, queue_url, |queue| {
            queue
                .delete(receipt)
                .map_err(|message| QueueOperationError::InvalidReceipt {
                    operation: QueueOperation::Delete,
                    message,
                })
        })
        .await
    }

    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
        visibility_timeout_seconds: u32,
    ) -> Result<(), QueueOperationError> {
        self.serve(QueueOperation::ChangeVisibility, queue_url, |queue| {
            queue
                .change_visibility(receipt, visibility_timeout_seconds)
                .map_err(|message| QueueOperationError::InvalidReceipt {
                    operation: QueueOperation::ChangeVisibility,
                    message,
                })
        })
        .await
    }
}
