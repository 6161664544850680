//! Background credential refresh.
//!
//! The [`CredentialRefresher`] fetches a fresh [`CredentialSet`] from a
//! [`CredentialSource`] and hands it to [`MessageQueue::refresh_client`]. It
//! runs one cycle immediately, then waits the success period after a good
//! cycle or the error period after a failed one. Workers that hit an
//! authentication failure can ask for an early cycle through a
//! [`RefreshHandle`].
//!
//! A failed cycle never disturbs the live connection; the provider keeps
//! serving with the previous credentials until a later cycle succeeds.

use crate::credentials::CredentialSet;
use crate::error::{CredentialSourceError, RefreshError};
use crate::provider::MessageQueue;
use crate::settings::RefreshSettings;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;

/// Source of temporary queue credentials
///
/// Implementations typically exchange a long-lived identity for role-scoped
/// credentials. Called once per refresh cycle.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch_credentials(&self) -> Result<CredentialSet, CredentialSourceError>;
}

/// Cycle counts reported when the refresher stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub succeeded: u64,
    pub failed: u64,
}

/// Requests early refresh cycles from outside the refresher task
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    requests: Arc<Notify>,
}

impl RefreshHandle {
    /// Ask for a cycle as soon as the refresher is idle
    ///
    /// Requests made while a cycle is running collapse into one follow-up cycle.
    pub fn request_refresh(&self) {
        self.requests.notify_one();
    }
}

/// Periodically refreshes a queue provider's credentials
pub struct CredentialRefresher {
    queue: Arc<dyn MessageQueue>,
    source: Arc<dyn CredentialSource>,
    settings: RefreshSettings,
    requests: Arc<Notify>,
}

impl CredentialRefresher {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        source: Arc<dyn CredentialSource>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            queue,
            source,
            settings,
            requests: Arc::new(Notify::new()),
        }
    }

    /// Handle for requesting early cycles
    pub fn handle(&self) -> RefreshHandle {
        RefreshHandle {
            requests: Arc::clone(&self.requests),
        }
    }

    /// Run a single fetch-and-install cycle
    ///
    /// # Errors
    ///
    /// Returns `RefreshError::Source` if no credentials could be fetched and
    /// `RefreshError::Authentication` if the provider rejected them. In both
    /// cases the provider's previous connection stays in place.
    pub async fn refresh_once(&self) -> Result<(), RefreshError> {
        let credentials = self.source.fetch_credentials().await?;
        self.queue.refresh_client(&credentials).await?;
        Ok(())
    }

    /// Run cycles until `shutdown` turns true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> RefreshStats {
        let mut stats = RefreshStats::default();
        let mut next_cycle = Instant::now();

        info!(
            queue_url = %self.queue.queue_url(),
            success_period_seconds = self.settings.success_period_seconds,
            error_period_seconds = self.settings.error_period_seconds,
            "Starting credential refresher"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep_until(next_cycle) => {}
                _ = self.requests.notified() => {
                    debug!(queue_url = %self.queue.queue_url(), "Early refresh requested");
                }
            }

            match self.refresh_once().await {
                Ok(()) => {
                    stats.succeeded += 1;
                    next_cycle = Instant::now() + self.settings.success_period();
                    debug!(
                        queue_url = %self.queue.queue_url(),
                        next_in_seconds = self.settings.success_period_seconds,
                        "Credential refresh cycle completed"
                    );
                }
                Err(RefreshError::Source(source_error)) => {
                    stats.failed += 1;
                    next_cycle = Instant::now() + self.settings.error_period();
                    warn!(
                        queue_url = %self.queue.queue_url(),
                        error = %source_error,
                        retry_in_seconds = self.settings.error_period_seconds,
                        "Credential source failed; retrying"
                    );
                }
                Err(RefreshError::Authentication(auth_error)) => {
                    stats.failed += 1;
                    next_cycle = Instant::now() + self.settings.error_period();
                    error!(
                        queue_url = %self.queue.queue_url(),
                        error = %auth_error,
                        retry_in_seconds = self.settings.error_period_seconds,
                        "Fetched credentials were not accepted; retrying"
                    );
                }
            }
        }

        info!(
            queue_url = %self.queue.queue_url(),
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Credential refresher stopped"
        );

        stats
    }

    /// Run the refresher on its own task
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<RefreshStats> {
        tokio::spawn(self.run(shutdown))
    }
}
