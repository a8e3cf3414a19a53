//! In-memory connection for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use messages::{Request, Response};
use tokio::sync::mpsc;

use crate::connection::{Connection, Dialer};
use crate::error::ConnectionError;

type Inbound = Result<Response, ConnectionError>;

#[derive(Debug, Default)]
struct Controls {
    write_failure: Mutex<Option<ConnectionError>>,
    closed: AtomicBool,
}

/// Client half of an in-memory connection.
///
/// Requests written to it are received by the paired [`MemoryPeer`];
/// responses and read errors pushed by the peer are returned from
/// [`Connection::read`]. Once the peer hangs up, reads return
/// [`ConnectionError::Closed`].
#[derive(Debug)]
pub struct MemoryConnection {
    requests: mpsc::UnboundedSender<Request>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    controls: Arc<Controls>,
}

/// Remote half of an in-memory connection, driven by the test.
#[derive(Debug)]
pub struct MemoryPeer {
    requests: mpsc::UnboundedReceiver<Request>,
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    controls: Arc<Controls>,
}

/// Create a connected client/peer pair
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let controls = Arc::new(Controls::default());

    let connection = MemoryConnection {
        requests: requests_tx,
        inbound: tokio::sync::Mutex::new(inbound_rx),
        controls: Arc::clone(&controls),
    };
    let peer = MemoryPeer {
        requests: requests_rx,
        inbound: Some(inbound_tx),
        controls,
    };
    (connection, peer)
}

impl Connection for MemoryConnection {
    async fn read(&self) -> Result<Response, ConnectionError> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(message) => message,
            None => Err(ConnectionError::Closed),
        }
    }

    async fn write(&self, request: &Request) -> Result<(), ConnectionError> {
        let failure = self
            .controls
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(e) = failure {
            return Err(e);
        }

        self.requests
            .send(request.clone())
            .map_err(|_| ConnectionError::Closed)
    }

    async fn close(&self) {
        self.controls.closed.store(true, Ordering::SeqCst);
    }
}

impl MemoryPeer {
    /// Wait for the next request written by the client.
    ///
    /// Returns `None` once the client connection has been dropped.
    pub async fn next_request(&mut self) -> Option<Request> {
        self.requests.recv().await
    }

    /// Return a request that has already been written, without waiting
    pub fn try_next_request(&mut self) -> Option<Request> {
        self.requests.try_recv().ok()
    }

    /// Deliver a response to the client. Ignored after [`hang_up`](Self::hang_up)
    /// or once the client connection is gone.
    pub fn respond(&self, response: Response) {
        self.push(Ok(response));
    }

    /// Answer `request` with a successful result
    pub fn reply(&self, request: &Request, result: serde_json::Value) {
        match &request.id {
            Some(id) => self.respond(Response::success(id.clone(), result)),
            None => tracing::warn!(method = %request.method, "cannot reply to request without id"),
        }
    }

    /// Make the client's next read fail with `error`
    pub fn inject_error(&self, error: ConnectionError) {
        self.push(Err(error));
    }

    /// Make every subsequent write fail with `error`, or succeed again with
    /// `None`
    pub fn fail_writes(&self, error: Option<ConnectionError>) {
        *self
            .controls
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Terminate the connection. Once everything already delivered has been
    /// read, the client sees [`ConnectionError::Closed`].
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Whether the client released the connection via [`Connection::close`]
    pub fn connection_closed(&self) -> bool {
        self.controls.closed.load(Ordering::SeqCst)
    }

    fn push(&self, message: Inbound) {
        if let Some(inbound) = &self.inbound {
            if inbound.send(message).is_err() {
                tracing::debug!("client connection dropped, discarding message");
            }
        }
    }
}

/// Dialer handing out a prepared [`MemoryConnection`].
///
/// Queued failures are returned first, one per dial. After the connection
/// has been handed out, further dials fail.
#[derive(Debug)]
pub struct MemoryDialer {
    connection: Mutex<Option<MemoryConnection>>,
    failures: Mutex<VecDeque<ConnectionError>>,
}

impl MemoryDialer {
    /// Create a dialer together with the peer of the connection it will hand out
    pub fn pair() -> (Self, MemoryPeer) {
        let (connection, peer) = pair();
        (Self::new(connection), peer)
    }

    pub fn new(connection: MemoryConnection) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// A dialer that never produces a connection
    pub fn failing(error: ConnectionError) -> Self {
        let dialer = Self {
            connection: Mutex::new(None),
            failures: Mutex::new(VecDeque::new()),
        };
        dialer.fail_next(error);
        dialer
    }

    /// Make the next dial fail with `error`
    pub fn fail_next(&self, error: ConnectionError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }
}

impl Dialer for MemoryDialer {
    type Connection = MemoryConnection;

    async fn dial(&self) -> Result<MemoryConnection, ConnectionError> {
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(e) = failure {
            return Err(e);
        }

        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| ConnectionError::Transport("no connection available".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn requests_reach_the_peer() {
        let (connection, mut peer) = pair();

        let request = Request::new("ping", None).with_id(1);
        connection.write(&request).await.unwrap();

        assert_eq!(peer.next_request().await, Some(request));
        assert!(peer.try_next_request().is_none());
    }

    #[tokio::test]
    async fn responses_reach_the_client() {
        let (connection, peer) = pair();

        peer.respond(Response::success(1, json!("pong")));
        let response = connection.read().await.unwrap();
        assert_eq!(response.result, Some(json!("pong")));
    }

    #[tokio::test]
    async fn hang_up_signals_closed() {
        let (connection, mut peer) = pair();

        peer.respond(Response::success(1, json!(1)));
        peer.hang_up();

        // buffered messages are still delivered first
        assert!(connection.read().await.is_ok());
        assert!(matches!(connection.read().await, Err(ConnectionError::Closed)));
        assert!(matches!(connection.read().await, Err(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn injected_write_failure() {
        let (connection, peer) = pair();
        peer.fail_writes(Some(ConnectionError::Transport("nope".to_string())));

        let request = Request::new("ping", None).with_id(1);
        assert!(matches!(
            connection.write(&request).await,
            Err(ConnectionError::Transport(_))
        ));

        peer.fail_writes(None);
        assert!(connection.write(&request).await.is_ok());
    }

    #[tokio::test]
    async fn close_is_visible_to_peer() {
        let (connection, peer) = pair();
        assert!(!peer.connection_closed());
        connection.close().await;
        assert!(peer.connection_closed());
    }

    #[tokio::test]
    async fn dialer_hands_out_connection_once() {
        let (dialer, _peer) = MemoryDialer::pair();
        dialer.fail_next(ConnectionError::Transport("refused".to_string()));

        assert!(dialer.dial().await.is_err());
        assert!(dialer.dial().await.is_ok());
        assert!(dialer.dial().await.is_err());
    }
}
