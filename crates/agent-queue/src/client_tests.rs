//! Tests for the connection slot and its lock discipline.

use super::*;
use std::time::{Duration, Instant};

/// Transport that answers every call successfully without doing anything
struct NoopTransport;

#[async_trait]
impl QueueTransport for NoopTransport {
    async fn receive_messages(
        &self,
        _request: &ReceiveRequest,
    ) -> Result<Vec<QueueMessage>, QueueOperationError> {
        Ok(Vec::new())
    }

    async fn delete_message(
        &self,
        _queue_url: &str,
        _receipt: &ReceiptHandle,
    ) -> Result<(), QueueOperationError> {
        Ok(())
    }

    async fn change_message_visibility(
        &self,
        _queue_url: &str,
        _receipt: &ReceiptHandle,
        _visibility_timeout_seconds: u32,
    ) -> Result<(), QueueOperationError> {
        Ok(())
    }
}

fn transport() -> Arc<dyn QueueTransport> {
    Arc::new(NoopTransport)
}

/// Read the slot generation after holding the connection for `hold`
async fn generation_after(client: &QueueClient, hold: Duration) -> Result<u64, QueueOperationError> {
    client
        .with_connection(QueueOperation::Receive, |slot| async move {
            tokio::time::sleep(hold).await;
            Ok(slot.generation())
        })
        .await
}

mod slot {
    use super::*;

    #[tokio::test]
    async fn test_empty_client_is_not_connected() {
        let client = QueueClient::new();

        assert!(!client.is_connected().await);
        assert_eq!(client.generation().await, 0);

        let error = client
            .with_connection(QueueOperation::Delete, |slot| async move {
                Ok(slot.generation())
            })
            .await
            .unwrap_err();
        assert_eq!(
            error,
            QueueOperationError::NotConnected {
                operation: QueueOperation::Delete
            }
        );
    }

    #[tokio::test]
    async fn test_install_numbers_generations() {
        let client = QueueClient::default();

        assert_eq!(client.install(transport(), "ak1").await, 1);
        assert_eq!(client.install(transport(), "ak2").await, 2);

        assert!(client.is_connected().await);
        assert_eq!(client.generation().await, 2);
    }

    #[tokio::test]
    async fn test_calls_use_latest_slot() {
        let client = QueueClient::new();
        client.install(transport(), "ak1").await;
        client.install(transport(), "ak2").await;

        let access_key_id = client
            .with_connection(QueueOperation::Receive, |slot| async move {
                Ok(slot.access_key_id().to_string())
            })
            .await
            .unwrap();

        assert_eq!(access_key_id, "ak2");
    }

    #[tokio::test]
    async fn test_call_errors_are_passed_through() {
        let client = QueueClient::new();
        client.install(transport(), "ak1").await;

        let error = client
            .with_connection(QueueOperation::ChangeVisibility, |_slot| async move {
                Err::<(), _>(QueueOperationError::InvalidReceipt {
                    operation: QueueOperation::ChangeVisibility,
                    message: "stale".to_string(),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(error, QueueOperationError::InvalidReceipt { .. }));
    }

    #[test]
    fn test_slot_debug_omits_transport() {
        let slot = ConnectionSlot {
            transport: transport(),
            generation: 3,
            access_key_id: "ak3".to_string(),
            installed_at: Timestamp::now(),
        };

        let rendered = format!("{:?}", slot);

        assert!(rendered.contains("generation: 3"));
        assert!(rendered.contains("ak3"));
    }
}

mod locking {
    use super::*;

    #[tokio::test]
    async fn test_readers_run_in_parallel() {
        let client = QueueClient::new();
        client.install(transport(), "ak1").await;
        let hold = Duration::from_millis(200);

        let started = Instant::now();
        let (first, second, third) = tokio::join!(
            generation_after(&client, hold),
            generation_after(&client, hold),
            generation_after(&client, hold)
        );

        assert_eq!(first.unwrap(), 1);
        assert_eq!(second.unwrap(), 1);
        assert_eq!(third.unwrap(), 1);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_install_waits_for_in_flight_call() {
        let client = Arc::new(QueueClient::new());
        client.install(transport(), "ak1").await;

        let reader = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let generation = generation_after(&client, Duration::from_millis(200)).await;
                (generation, Instant::now())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        client.install(transport(), "ak2").await;
        let installed_at = Instant::now();

        let (generation, reader_finished_at) = reader.await.unwrap();
        assert_eq!(generation.unwrap(), 1);
        assert!(reader_finished_at <= installed_at);
    }

    #[tokio::test]
    async fn test_calls_queued_behind_install_see_new_slot() {
        let client = Arc::new(QueueClient::new());
        client.install(transport(), "ak1").await;

        let in_flight = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { generation_after(&client, Duration::from_millis(200)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let installer = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.install(transport(), "ak2").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Arrives while the install is waiting for the write lock
        let late = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { generation_after(&client, Duration::ZERO).await })
        };

        assert_eq!(in_flight.await.unwrap().unwrap(), 1);
        assert_eq!(installer.await.unwrap(), 2);
        assert_eq!(late.await.unwrap().unwrap(), 2);
    }
}
