//! Request-ID counter for outbound commands.
//!
//! # Why request IDs? (for beginners)
//!
//! Early controller firmware answers commands strictly in the order it
//! receives them and carries no identifier in its replies, so a client can
//! only pair replies with requests by position.  If one reply is lost, every
//! later reply is paired with the wrong request.
//!
//! Tagging every command with a unique `"id"` lets firmware that echoes the
//! field be matched exactly, while replies without an `id` still fall back to
//! positional (oldest-first) matching.
//!
//! # Thread safety
//!
//! The counter is an `AtomicU64`, so any number of tasks can draw IDs
//! concurrently without a lock and never observe the same value twice.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing source of request IDs.
///
/// IDs start at 1.  Zero is skipped so that firmware treating `0` as "no id"
/// never confuses a real request for an untagged one.
#[derive(Debug)]
pub struct RequestIdCounter {
    inner: AtomicU64,
}

impl RequestIdCounter {
    /// Creates a counter whose first ID is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next request ID.
    ///
    /// `Relaxed` ordering suffices: IDs only need to be unique, they do not
    /// publish any other memory.
    pub fn next_id(&self) -> u64 {
        let id = self.inner.fetch_add(1, Ordering::Relaxed);
        if id == 0 {
            // Wrapped past u64::MAX.
            self.inner.fetch_add(1, Ordering::Relaxed)
        } else {
            id
        }
    }

    /// Returns the ID the next call to [`next_id`](Self::next_id) would hand
    /// out, for diagnostics.
    pub fn peek(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for RequestIdCounter {
    fn default() -> Self {
        Self::new()
    }
}
