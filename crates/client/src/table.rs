//! Tracking pending requests and matching responses
//!
//! When a request is sent, its [`PendingSlot`] is added to the table keyed by
//! the request id. When a response arrives, it is taken back out by id and
//! resolved. On shutdown the whole table is drained.
//!
//! The closed flag lives under the same lock as the map: once [`drain`] has
//! run, every later [`insert`] fails with [`InsertError::Closed`], so no
//! request can slip into the table after shutdown and wait forever.
//!
//! [`drain`]: CorrelationTable::drain
//! [`insert`]: CorrelationTable::insert

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use messages::Id;

use crate::slot::PendingSlot;

/// Reason an insert was refused. The slot is handed back so the caller can
/// resolve it.
#[derive(Debug)]
pub enum InsertError {
    /// The table has been drained
    Closed(PendingSlot),
    /// A request with the same id is already pending
    Duplicate(PendingSlot),
}

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<Id, PendingSlot>,
    closed: bool,
}

/// Concurrent map of request ids to pending slots
#[derive(Debug, Default)]
pub struct CorrelationTable {
    inner: Mutex<Inner>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly pending request
    pub fn insert(&self, id: Id, slot: PendingSlot) -> Result<(), InsertError> {
        self.with_lock(|mut inner| {
            if inner.closed {
                return Err(InsertError::Closed(slot));
            }
            if inner.pending.contains_key(&id) {
                return Err(InsertError::Duplicate(slot));
            }
            inner.pending.insert(id, slot);
            Ok(())
        })
    }

    /// Remove and return the slot for `id`, if any
    pub fn take(&self, id: &Id) -> Option<PendingSlot> {
        self.with_lock(|mut inner| inner.pending.remove(id))
    }

    /// Close the table and return every pending slot.
    ///
    /// Subsequent calls return an empty list.
    pub fn drain(&self) -> Vec<PendingSlot> {
        self.with_lock(|mut inner| {
            inner.closed = true;
            inner.pending.drain().map(|(_, slot)| slot).collect()
        })
    }

    #[allow(dead_code)]
    pub fn is_closed(&self) -> bool {
        self.with_lock(|inner| inner.closed)
    }

    /// Get the number of pending requests
    pub fn len(&self) -> usize {
        self.with_lock(|inner| inner.pending.len())
    }

    /// Check if there are any pending requests
    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_lock<F, R>(&self, f: F) -> R
    where
        F: FnOnce(MutexGuard<'_, Inner>) -> R,
    {
        tracing::trace!("taking lock");
        // the map stays consistent across a panicking holder, so poisoning is ignored
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let res = f(inner);
        tracing::trace!("releasing lock");
        res
    }
}
