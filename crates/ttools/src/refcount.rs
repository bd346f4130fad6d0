//! Open-connection accounting.
//!
//! Each hooked driver owns one [`Ledger`]: the insert registry plus a count of
//! logical connections currently open. Closing the last connection hands the
//! drained registry to the caller, which runs cleanup. The zero check and the
//! drain happen under the registry lock, so an insert registered before a
//! close returns is always part of that close's cleanup.

use crate::hooks::ConnId;
use crate::registry::{PendingTable, Registry};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use ttools_core::{Error, HookError, HookErrorKind};

/// Count of open logical connections. Never goes below zero.
#[derive(Debug, Default)]
pub struct OpenCounter {
    open: AtomicUsize,
}

impl OpenCounter {
    pub const fn new() -> Self {
        Self {
            open: AtomicUsize::new(0),
        }
    }

    /// Count one more open connection; returns the new count.
    pub fn acquire(&self) -> usize {
        self.open.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Count one fewer open connection; returns the new count.
    ///
    /// Releasing with nothing open is an accounting error and leaves the
    /// count at zero.
    pub fn release(&self) -> Result<usize, Error> {
        self.open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| {
                HookError::new(
                    HookErrorKind::Accounting,
                    "connection closed without a matching open",
                )
                .into()
            })
    }

    pub fn current(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Result of releasing a connection.
#[derive(Debug, PartialEq, Eq)]
pub enum Release {
    /// Other connections remain open.
    Remaining(usize),
    /// This was the last one; these rows must now be deleted.
    Last(Vec<PendingTable>),
}

/// Registry plus open count for one hooked driver.
#[derive(Debug, Default)]
pub struct Ledger {
    registry: Mutex<Registry>,
    open: OpenCounter,
    next_conn: AtomicU64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh identity for a connection about to be opened.
    pub fn next_conn_id(&self) -> ConnId {
        ConnId::new(self.next_conn.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Register a generated id. Returns false if it was already registered.
    pub fn record(&self, table: &str, id: i64) -> Result<bool, Error> {
        let mut registry = self.registry.lock().map_err(|_| {
            Error::from(
                HookError::new(
                    HookErrorKind::Bookkeeping,
                    format!("insert registry poisoned; row {id} of {table} will not be deleted"),
                )
            )
        })?;
        Ok(registry.record(table, id))
    }

    /// Return ids to the registry after a failed cleanup.
    pub fn restore(&self, table: &str, ids: Vec<i64>) {
        self.lock_recovering().restore(table, ids);
    }

    pub fn open_connections(&self) -> usize {
        self.open.current()
    }

    pub fn pending_rows(&self) -> usize {
        self.lock_recovering().pending_rows()
    }

    pub fn pending_ids(&self, table: &str) -> Vec<i64> {
        self.lock_recovering().ids(table)
    }

    /// Forget every pending row without deleting anything.
    pub fn clear(&self) {
        self.lock_recovering().clear();
    }

    /// Decrement the open count. When it reaches zero and `drain` is set,
    /// the registry is drained in the same critical section.
    fn release_one(&self, drain: bool) -> Result<Release, Error> {
        let mut registry = self.lock_recovering();
        let remaining = self.open.release()?;
        if remaining > 0 {
            return Ok(Release::Remaining(remaining));
        }
        let pending = if drain { registry.drain() } else { Vec::new() };
        Ok(Release::Last(pending))
    }

    // Close paths must make progress, so they see through poisoning.
    fn lock_recovering(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One logical connection's share of the open count.
///
/// Released explicitly by `close`; a lease dropped without release still
/// decrements the count but leaves pending rows for a later close.
#[derive(Debug)]
pub struct ConnectionLease {
    ledger: Arc<Ledger>,
    conn: ConnId,
    released: bool,
}

impl ConnectionLease {
    pub fn acquire(ledger: &Arc<Ledger>, conn: ConnId) -> Self {
        let open = ledger.open.acquire();
        tracing::debug!(conn = %conn, open, "connection counted as open");
        Self {
            ledger: Arc::clone(ledger),
            conn,
            released: false,
        }
    }

    pub fn conn(&self) -> ConnId {
        self.conn
    }

    pub fn release(mut self) -> Result<Release, Error> {
        self.released = true;
        self.ledger.release_one(true)
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.ledger.release_one(false) {
            Ok(Release::Last(_)) => tracing::warn!(
                conn = %self.conn,
                pending_rows = self.ledger.pending_rows(),
                "last connection dropped without close; inserted rows were left in place"
            ),
            Ok(Release::Remaining(open)) => tracing::warn!(
                conn = %self.conn,
                open,
                "connection dropped without close"
            ),
            Err(e) => tracing::warn!(conn = %self.conn, error = %e, "connection accounting failed on drop"),
        }
    }
}
