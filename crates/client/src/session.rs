//! The client session
//!
//! A [`Session`] correlates requests written to a single [`Connection`] with
//! the responses read back from it by a background task. Every request sent
//! while the session is open is resolved exactly once: with its response,
//! with the error that prevented it from being written, or with
//! [`Error::Closed`] when the session shuts down first.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use messages::{IdGenerator, Request, Response, UuidIds};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::connection::{Connection, Dialer};
use crate::error::{Error, Result};
use crate::receive_loop::ReceiveLoop;
use crate::slot::{PendingSlot, ResponseFuture};
use crate::state::{SessionState, Shared};
use crate::table::InsertError;

/// Builder for a [`Session`] with non-default settings
pub struct SessionBuilder<D> {
    dialer: D,
    config: ClientConfig,
    ids: Box<dyn IdGenerator>,
}

impl<D> SessionBuilder<D>
where
    D: Dialer,
{
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `ids` to assign identifiers to requests that do not have one
    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn build(self) -> Session<D> {
        Session {
            dialer: self.dialer,
            config: self.config,
            ids: self.ids,
            shared: Arc::new(Shared::new()),
            connection: OnceLock::new(),
            connection_id: OnceLock::new(),
            reader_handle: Mutex::new(None),
        }
    }
}

/// Request/response session over a single connection
pub struct Session<D: Dialer> {
    dialer: D,
    config: ClientConfig,
    ids: Box<dyn IdGenerator>,

    // shared with the receive loop
    shared: Arc<Shared>,

    // set once by a successful connect
    connection: OnceLock<Arc<D::Connection>>,
    connection_id: OnceLock<String>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<D> Session<D>
where
    D: Dialer,
{
    /// Create an unconnected session with the default configuration
    pub fn new(dialer: D) -> Self {
        Self::builder(dialer).build()
    }

    pub fn with_config(dialer: D, config: ClientConfig) -> Self {
        Self::builder(dialer).config(config).build()
    }

    pub fn builder(dialer: D) -> SessionBuilder<D> {
        SessionBuilder {
            dialer,
            config: ClientConfig::default(),
            ids: Box::new(UuidIds),
        }
    }

    /// Dial the connection and start receiving responses.
    ///
    /// Only valid on an unconnected session. If the dial fails the session
    /// stays unconnected and `connect` may be retried.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn connect(&self) -> Result<()> {
        self.shared.begin_connect()?;

        let connection = match self.dialer.dial().await {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                tracing::debug!(error = %e, "error making connection");
                self.shared.abort_connect();
                return Err(Error::Dial(e));
            }
        };

        // senders that observe `Connected` must find the connection
        if self.connection.set(Arc::clone(&connection)).is_err() {
            self.shared.abort_connect();
            return Err(Error::AlreadyConnected);
        }
        if let Err(e) = self.shared.finish_connect() {
            tracing::debug!("session closed while connecting");
            connection.close().await;
            return Err(e);
        }

        let connection_id = uuid::Uuid::new_v4().simple().to_string();
        tracing::debug!(%connection_id, "connection made");
        let handle = ReceiveLoop::new(connection, Arc::clone(&self.shared), self.config.clone())
            .spawn(&connection_id);
        *self.lock_reader() = Some(handle);
        let _ = self.connection_id.set(connection_id);

        Ok(())
    }

    /// Send a request and return a handle to its eventual outcome.
    ///
    /// The request is given an identifier if it does not have one. The
    /// returned handle always resolves: with the response, with
    /// [`Error::Write`] if the request could not be written, or with
    /// [`Error::Closed`] if the session is or becomes closed.
    #[tracing::instrument(skip_all, level = "debug", fields(method = %request.method, id))]
    pub async fn send_async(&self, mut request: Request) -> ResponseFuture {
        let id = request.ensure_id(self.ids.as_ref()).clone();
        tracing::Span::current().record("id", tracing::field::display(&id));

        let connection = match self.shared.state() {
            SessionState::Closed => return PendingSlot::resolved(Err(Error::Closed)),
            SessionState::Unconnected | SessionState::Connecting => {
                return PendingSlot::resolved(Err(Error::NotConnected));
            }
            SessionState::Connected => match self.connection.get() {
                Some(connection) => connection,
                None => return PendingSlot::resolved(Err(Error::NotConnected)),
            },
        };

        // held through the write; the connection is not released under it
        let _writing = self.shared.writes.read().await;

        let (slot, handle) = PendingSlot::new();
        match self.shared.table.insert(id.clone(), slot) {
            Ok(()) => {}
            Err(InsertError::Closed(slot)) => {
                tracing::debug!("session closed before request was registered");
                let _ = slot.resolve(Err(Error::Closed));
                return handle;
            }
            Err(InsertError::Duplicate(slot)) => {
                tracing::warn!("request id is already pending");
                let _ = slot.resolve(Err(Error::DuplicateId(id)));
                return handle;
            }
        }

        tracing::debug!("sending request");
        if let Err(e) = connection.write(&request).await {
            tracing::warn!(error = %e, "error writing request");
            // a miss means close or the receive loop got there first
            if let Some(slot) = self.shared.table.take(&id) {
                let _ = slot.resolve(Err(Error::Write(e)));
            }
        }

        handle
    }

    /// Send a request and wait for its response without a deadline
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.send_async(request).await.wait().await
    }

    /// Send a request and wait for its response until `cancel` fires.
    ///
    /// A token that is already cancelled returns [`Error::Cancelled`]
    /// without waiting. Cancelling does not withdraw the request: a late
    /// response is discarded by the receive loop, and `close` releases it
    /// otherwise.
    pub async fn send_with_cancel(
        &self,
        cancel: &CancellationToken,
        request: Request,
    ) -> Result<Response> {
        let pending = self.send_async(request).await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            outcome = pending.wait() => outcome,
        }
    }

    /// Send a request and wait at most `timeout` for its response.
    ///
    /// The request is abandoned on expiry in the same way as with
    /// [`send_with_cancel`](Self::send_with_cancel).
    pub async fn send_timeout(&self, timeout: Duration, request: Request) -> Result<Response> {
        let pending = self.send_async(request).await;
        match tokio::time::timeout(timeout, pending.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::TimedOut(timeout)),
        }
    }

    /// Close the session.
    ///
    /// Every pending request is resolved with [`Error::Closed`] and the
    /// receive loop is stopped and awaited. The connection is released once
    /// writes already in flight have finished. Closing an already closed
    /// session returns [`Error::Closed`].
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn close(&self) -> Result<()> {
        let Some(previous) = self.shared.shutdown("closed by caller") else {
            return Err(Error::Closed);
        };

        let handle = self.lock_reader().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "receive loop failed");
            }
        }

        // a session closed mid-dial is released by `connect` itself
        if previous == SessionState::Connected {
            if let Some(connection) = self.connection.get() {
                self.shared.release(connection.as_ref()).await;
            }
        }

        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Identifier used in log output for the current connection
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.get().map(String::as_str)
    }

    /// Get the number of requests waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.shared.table.len()
    }

    fn lock_reader(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.reader_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dropping a session shuts it down and releases every waiter, but cannot
/// await [`Connection::close`]: the connection is only dropped. Call
/// [`Session::close`] for an orderly release.
impl<D> Drop for Session<D>
where
    D: Dialer,
{
    fn drop(&mut self) {
        if self.shared.shutdown("session dropped").is_some() {
            tracing::debug!("shutting down session");
        }
    }
}
