//! Session lifecycle shared between callers and the receive loop

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::table::CorrelationTable;

/// Lifecycle of a [`Session`](crate::Session).
///
/// `Unconnected -> Connecting -> Connected -> Closed`. A failed dial goes
/// back from `Connecting` to `Unconnected`; `Closed` is terminal and may be
/// entered from any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connecting,
    Connected,
    Closed,
}

impl SessionState {
    const fn as_u8(self) -> u8 {
        match self {
            SessionState::Unconnected => 0,
            SessionState::Connecting => 1,
            SessionState::Connected => 2,
            SessionState::Closed => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Unconnected,
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            _ => SessionState::Closed,
        }
    }
}

/// State owned jointly by the session and its receive loop
#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicU8,
    pub(crate) table: CorrelationTable,
    /// Stops the receive loop
    pub(crate) cancel: CancellationToken,
    /// Held shared by every in-flight write and exclusively while the
    /// connection is released
    pub(crate) writes: RwLock<()>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Unconnected.as_u8()),
            table: CorrelationTable::new(),
            cancel: CancellationToken::new(),
            writes: RwLock::new(()),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    fn transition(&self, from: SessionState, to: SessionState) -> Result<(), SessionState> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(SessionState::from_u8)
    }

    /// Claim the right to dial
    pub(crate) fn begin_connect(&self) -> Result<()> {
        self.transition(SessionState::Unconnected, SessionState::Connecting)
            .map_err(|actual| match actual {
                SessionState::Closed => Error::Closed,
                _ => Error::AlreadyConnected,
            })
    }

    /// Give the right to dial back after a failed dial. A session closed in
    /// the meantime stays closed.
    pub(crate) fn abort_connect(&self) {
        let _ = self.transition(SessionState::Connecting, SessionState::Unconnected);
    }

    /// Publish the connection. Fails only if the session was closed while
    /// dialing.
    pub(crate) fn finish_connect(&self) -> Result<()> {
        self.transition(SessionState::Connecting, SessionState::Connected)
            .map_err(|_| Error::Closed)
    }

    /// Run the one-time shutdown sequence.
    ///
    /// Exactly one caller wins the transition to `Closed`; it stops the
    /// receive loop, drains the table and resolves every pending request
    /// with [`Error::Closed`]. The winner gets back the state the session
    /// was in; every other caller gets `None`.
    pub(crate) fn shutdown(&self, reason: &'static str) -> Option<SessionState> {
        let mut current = self.state();
        loop {
            if current == SessionState::Closed {
                return None;
            }
            match self.transition(current, SessionState::Closed) {
                Ok(()) => break,
                Err(actual) => current = actual,
            }
        }

        self.cancel.cancel();
        let drained = self.table.drain();
        tracing::debug!(%reason, pending = drained.len(), previous = ?current, "shutting down session");
        for slot in drained {
            if slot.resolve(Err(Error::Closed)).is_err() {
                tracing::warn!("drained request was already resolved");
            }
        }
        Some(current)
    }

    /// Release `connection` once every write already in flight has finished.
    ///
    /// Only called after a shutdown, so no new write can register.
    pub(crate) async fn release<C: Connection>(&self, connection: &C) {
        let _writes = self.writes.write().await;
        tracing::debug!("releasing connection");
        connection.close().await;
    }
}
