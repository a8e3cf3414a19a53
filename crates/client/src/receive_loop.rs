//! Background task demultiplexing responses onto pending requests

use std::sync::Arc;

use messages::Response;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::state::Shared;

pub(crate) struct ReceiveLoop<C> {
    connection: Arc<C>,
    shared: Arc<Shared>,
    config: ClientConfig,
}

impl<C> ReceiveLoop<C>
where
    C: Connection,
{
    pub(crate) fn new(connection: Arc<C>, shared: Arc<Shared>, config: ClientConfig) -> Self {
        Self {
            connection,
            shared,
            config,
        }
    }

    /// Start the loop on the current tokio runtime
    pub(crate) fn spawn(self, connection_id: &str) -> JoinHandle<()> {
        let span = tracing::debug_span!("receive_loop", %connection_id);
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(self) {
        tracing::debug!("receive loop started");
        let cancel = self.shared.cancel.clone();
        let mut consecutive_errors: u32 = 0;

        while !self.shared.is_closed() {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("receive loop cancelled");
                    break;
                }
                result = self.connection.read() => result,
            };

            match result {
                Ok(response) => {
                    consecutive_errors = 0;
                    self.dispatch(response);
                }
                Err(ConnectionError::Closed) => {
                    tracing::debug!("connection closed");
                    self.shut_down("connection closed").await;
                    break;
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    tracing::error!(error = %e, consecutive_errors, "read failure");

                    if self.should_give_up(consecutive_errors) {
                        tracing::error!(consecutive_errors, "too many read failures, giving up");
                        self.shut_down("too many read failures").await;
                        break;
                    }

                    let backoff = self.config.read_error_backoff;
                    if !backoff.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
            }
        }

        tracing::debug!("receive loop stopped");
    }

    /// Resolve the pending request matching `response`
    fn dispatch(&self, response: Response) {
        let id = response.id().clone();
        match self.shared.table.take(&id) {
            Some(slot) => {
                tracing::trace!(%id, "resolving request");
                if slot.resolve(Ok(response)).is_err() {
                    tracing::warn!(%id, "request was already resolved");
                }
            }
            None => {
                tracing::warn!(%id, "response received with unrecognised id");
            }
        }
    }

    fn should_give_up(&self, consecutive_errors: u32) -> bool {
        match self.config.read_error_limit() {
            Some(max) => consecutive_errors >= max,
            None => false,
        }
    }

    /// Close the session from inside the loop. If this wins the shutdown
    /// race the loop is also responsible for releasing the connection.
    async fn shut_down(&self, reason: &'static str) {
        if self.shared.shutdown(reason).is_some() {
            self.shared.release(self.connection.as_ref()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use messages::Id;
    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::slot::PendingSlot;
    use crate::testing::{self, MemoryPeer};

    fn start(config: ClientConfig) -> (Arc<Shared>, MemoryPeer, JoinHandle<()>) {
        let (connection, peer) = testing::pair();
        let shared = Arc::new(Shared::new());
        let handle =
            ReceiveLoop::new(Arc::new(connection), Arc::clone(&shared), config).spawn("test");
        (shared, peer, handle)
    }

    #[tokio::test]
    async fn routes_response_to_matching_slot() {
        let (shared, peer, _handle) = start(ClientConfig::default());
        let (slot, response) = PendingSlot::new();
        shared.table.insert(Id::Number(7), slot).unwrap();

        peer.respond(Response::success(7, json!("pong")));

        let got = response.wait().await.unwrap();
        assert_eq!(got.result, Some(json!("pong")));
        assert!(shared.table.is_empty());
    }

    #[tokio::test]
    async fn unknown_id_does_not_disturb_pending() {
        let (shared, peer, handle) = start(ClientConfig::default());
        let (slot, response) = PendingSlot::new();
        shared.table.insert(Id::Number(1), slot).unwrap();

        peer.respond(Response::success(99, json!(null)));
        peer.respond(Response::success(1, json!(1)));

        assert_eq!(response.wait().await.unwrap().id(), &Id::Number(1));
        assert!(!handle.is_finished());
        assert!(!shared.is_closed());
    }

    #[tokio::test]
    async fn closed_connection_shuts_down() {
        let (shared, mut peer, handle) = start(ClientConfig::default());
        let (slot, response) = PendingSlot::new();
        shared.table.insert(Id::Number(1), slot).unwrap();

        peer.hang_up();

        assert!(matches!(response.wait().await, Err(Error::Closed)));
        handle.await.unwrap();
        assert!(shared.is_closed());
        assert!(peer.connection_closed());
    }

    #[tokio::test]
    async fn read_errors_are_survivable() {
        let (shared, peer, _handle) = start(ClientConfig::default());
        let (slot, response) = PendingSlot::new();
        shared.table.insert(Id::Number(2), slot).unwrap();

        peer.inject_error(ConnectionError::Transport("garbled".to_string()));
        peer.respond(Response::success(2, json!(true)));

        assert!(response.wait().await.is_ok());
        assert!(!shared.is_closed());
    }

    #[tokio::test]
    async fn repeated_read_errors_shut_down() {
        let config = ClientConfig {
            max_consecutive_read_errors: Some(3),
            read_error_backoff: Duration::ZERO,
        };
        let (shared, peer, handle) = start(config);
        let (slot, response) = PendingSlot::new();
        shared.table.insert(Id::Number(3), slot).unwrap();

        for _ in 0..3 {
            peer.inject_error(ConnectionError::Transport("broken".to_string()));
        }

        handle.await.unwrap();
        assert!(shared.is_closed());
        assert!(matches!(response.wait().await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn successful_read_resets_error_count() {
        let config = ClientConfig {
            max_consecutive_read_errors: Some(2),
            read_error_backoff: Duration::ZERO,
        };
        let (shared, peer, _handle) = start(config);
        let (slot, response) = PendingSlot::new();
        shared.table.insert(Id::Number(4), slot).unwrap();

        peer.inject_error(ConnectionError::Transport("one".to_string()));
        peer.respond(Response::success(100, json!(null)));
        peer.inject_error(ConnectionError::Transport("two".to_string()));
        peer.respond(Response::success(4, json!(null)));

        assert!(response.wait().await.is_ok());
        assert!(!shared.is_closed());
    }

    #[tokio::test]
    async fn zero_error_limit_keeps_reading() {
        let config = ClientConfig {
            max_consecutive_read_errors: Some(0),
            read_error_backoff: Duration::ZERO,
        };
        let (shared, peer, handle) = start(config);
        let (slot, response) = PendingSlot::new();
        shared.table.insert(Id::Number(5), slot).unwrap();

        for _ in 0..50 {
            peer.inject_error(ConnectionError::Transport("noise".to_string()));
        }
        peer.respond(Response::success(5, json!("still here")));

        assert_eq!(response.wait().await.unwrap().result, Some(json!("still here")));
        assert!(!handle.is_finished());
        assert!(!shared.is_closed());
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let (shared, peer, handle) = start(ClientConfig::default());

        shared.cancel.cancel();
        handle.await.unwrap();

        // nothing is read once the loop has stopped
        peer.respond(Response::success(1, json!(null)));
        assert!(!peer.connection_closed());
    }
}
