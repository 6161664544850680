//! Queue transport implementations.
//!
//! - [`aws`] - signed HTTP calls to AWS SQS
//! - [`memory`] - in-process queue for tests and local development

pub mod aws;
pub mod memory;

pub use aws::{SqsConfig, SqsConnector, SqsError};
pub use memory::{InMemoryConnector, InMemoryQueue, ServedCall};
