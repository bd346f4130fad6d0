//! Monotonic id generation for test fixtures.
//!
//! Tests that insert rows with explicit primary keys draw them from here so
//! concurrently running tests never collide.

use std::sync::atomic::{AtomicI64, Ordering};

/// A thread-safe source of strictly increasing ids, starting at 1.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Next id. Every call returns a distinct value.
    pub fn next_id(&self) -> i64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The most recently issued id, or 0 if none was issued yet.
    pub fn last(&self) -> i64 {
        self.last.load(Ordering::Relaxed)
    }
}

static GLOBAL: IdGenerator = IdGenerator::new();

/// Next id from the process-wide generator.
pub fn id() -> i64 {
    GLOBAL.next_id()
}
