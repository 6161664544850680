//! Common test utilities for agent-queue integration tests
//!
//! This module provides:
//! - Tracing setup honouring `RUST_LOG`
//! - Fixtures for providers over the in-memory connector

use agent_queue::{
    CredentialSet, InMemoryConnector, InMemoryQueue, QueueEndpoint, RotatingQueueProvider,
};
use std::sync::Arc;

pub const QUEUE_URL: &str = "https://sqs.us-west-2.amazonaws.com/123456789012/Q1";
pub const REGION: &str = "us-west-2";

/// Install a test-writer subscriber; later calls are no-ops
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn credentials(access_key: &str) -> CredentialSet {
    CredentialSet::new(access_key, format!("secret-{}", access_key), "session-token")
        .expect("test credentials are complete")
}

/// Provider over a fresh in-memory queue, plus the connector for inspection
#[allow(dead_code)]
pub fn in_memory_provider(
    configure: impl FnOnce(InMemoryConnector) -> InMemoryConnector,
) -> (Arc<RotatingQueueProvider>, InMemoryConnector) {
    let connector = configure(InMemoryConnector::new(Arc::new(InMemoryQueue::new(
        QUEUE_URL,
    ))));
    let endpoint = QueueEndpoint::new(QUEUE_URL, REGION).expect("valid test endpoint");
    let provider = Arc::new(RotatingQueueProvider::new(
        endpoint,
        Arc::new(connector.clone()),
    ));
    (provider, connector)
}
