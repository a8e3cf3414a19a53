//! Single-assignment result slots for in-flight requests
//!
//! A [`PendingSlot`] is the writing half: it lives in the
//! [`CorrelationTable`](crate::table::CorrelationTable) until the matching
//! response (or a failure) resolves it. A [`ResponseFuture`] is the reading
//! half handed to the caller.
//!
//! The slot is backed by a `watch` channel holding `Option<Outcome>`. The
//! `None -> Some` transition happens inside `send_if_modified`, so it is
//! atomic and can only succeed once.

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use messages::Response;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// The eventual result of a single request
pub type Outcome = Result<Response>;

/// Writing half of a pending request.
#[derive(Debug)]
pub struct PendingSlot {
    tx: watch::Sender<Option<Outcome>>,
}

impl PendingSlot {
    /// Create an unresolved slot and the handle observing it
    pub fn new() -> (Self, ResponseFuture) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, ResponseFuture { rx })
    }

    /// Create a handle that is already resolved with `outcome`
    pub fn resolved(outcome: Outcome) -> ResponseFuture {
        let (slot, handle) = Self::new();
        // a fresh slot always accepts its first outcome
        let _ = slot.resolve(outcome);
        handle
    }

    /// Store the outcome and wake every observer.
    ///
    /// Returns the outcome back as `Err` if the slot was already resolved;
    /// the first outcome is never replaced.
    pub fn resolve(&self, outcome: Outcome) -> Result<(), Outcome> {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = outcome.take();
            true
        });

        match outcome {
            None => Ok(()),
            Some(rejected) => Err(rejected),
        }
    }

    #[allow(dead_code)]
    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Reading half of a pending request.
///
/// Cloning the handle gives another observer of the same outcome. If the
/// writing half is dropped without being resolved, observers receive
/// [`Error::Closed`].
#[derive(Debug, Clone)]
pub struct ResponseFuture {
    rx: watch::Receiver<Option<Outcome>>,
}

impl ResponseFuture {
    /// Wait until the request is resolved and return its outcome
    pub async fn wait(mut self) -> Outcome {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(current) => current.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(Error::Closed))
    }

    /// Return the outcome without waiting, if there is one
    pub fn try_get(&self) -> Option<Outcome> {
        self.rx.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl IntoFuture for ResponseFuture {
    type Output = Outcome;
    type IntoFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
