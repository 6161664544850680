//! Message types returned by the queue, including receipt handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Identifier assigned to a message by the queue service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("message id cannot be empty".to_string());
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// Opaque token required to delete a message or change its visibility
///
/// Only valid until the message is deleted or its visibility window lapses.
/// The token itself is never inspected locally; staleness is reported by the
/// queue service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle {
    handle: String,
}

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
        }
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.handle
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Receipt handles are long; the prefix is enough to correlate logs
        let prefix: String = self.handle.chars().take(16).collect();
        write!(f, "{}...", prefix)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// User-defined message attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttributeValue {
    /// Declared data type (`String`, `Number`, `Binary`, or a custom suffix)
    pub data_type: String,
    /// Value for string and number attributes
    pub string_value: Option<String>,
    /// Base64 value for binary attributes, kept as received
    pub binary_value: Option<String>,
}

impl MessageAttributeValue {
    /// Create a string attribute
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }
}

/// A message received from the queue
///
/// Messages are snapshots. They carry no reference to the provider that
/// produced them, so delete and visibility calls take the message and the
/// current provider separately.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: MessageId,
    pub body: String,
    pub receipt_handle: ReceiptHandle,
    /// System attributes such as `ApproximateReceiveCount` and `SentTimestamp`
    pub attributes: HashMap<String, String>,
    pub message_attributes: HashMap<String, MessageAttributeValue>,
}

impl QueueMessage {
    /// Create a message with no attributes
    pub fn new(message_id: MessageId, body: impl Into<String>, receipt_handle: ReceiptHandle) -> Self {
        Self {
            message_id,
            body: body.into(),
            receipt_handle,
            attributes: HashMap::new(),
            message_attributes: HashMap::new(),
        }
    }

    /// Add a system attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a user message attribute
    pub fn with_message_attribute(
        mut self,
        key: impl Into<String>,
        value: MessageAttributeValue,
    ) -> Self {
        self.message_attributes.insert(key.into(), value);
        self
    }

    /// Number of times the message has been received, when reported
    pub fn receive_count(&self) -> Option<u32> {
        self.attributes
            .get("ApproximateReceiveCount")
            .and_then(|count| count.parse().ok())
    }

    /// String value of a user message attribute
    pub fn message_attribute(&self, key: &str) -> Option<&str> {
        self.message_attributes
            .get(key)
            .and_then(|value| value.string_value.as_deref())
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
