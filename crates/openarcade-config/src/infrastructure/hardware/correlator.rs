//! Matches inbound responses with the requests waiting for them.
//!
//! # How matching works
//!
//! Every request is registered under its request ID before it is written.
//! When a response arrives:
//!
//! 1. If it carries an `id`, the request with that ID is resolved.  A
//!    response for an ID nobody is waiting on is dropped.
//! 2. If it carries no `id`, the **oldest** outstanding request is resolved.
//!    This is the behaviour firmware without request IDs relies on: one
//!    response per command, in the order the commands were sent.  A device
//!    that drops or reorders a response shifts every later pairing; the
//!    client cannot detect that.
//!
//! An unparseable line counts as a response without an `id`, so it still
//! consumes the oldest slot instead of stalling the queue.
//!
//! # Timed-out requests
//!
//! A request that times out is [abandoned](Correlator::abandon), not
//! forgotten.  Until the peer has echoed at least one ID, its slot stays in
//! dispatch order as a placeholder that swallows the late response, so
//! the next ID-less reply still reaches the request it belongs to.
//! Placeholders count towards `max_pending`.  Once the peer is known to echo
//! IDs, a late response is recognised as stale and the slot is dropped
//! straight away.
//!
//! Request IDs increase monotonically, so the smallest key in the pending
//! map is always the oldest request.

use std::collections::BTreeMap;

use openarcade_core::Response;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::application::config_client::ConfigError;

/// What a waiting request eventually receives.
pub type Reply = Result<Response, ConfigError>;

/// Outcome of [`Correlator::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Delivered to the request with this ID.
    Delivered(u64),
    /// Swallowed by the placeholder of abandoned request with this ID.
    Absorbed(u64),
    /// The response named an ID nobody is waiting on.
    Stale(u64),
    /// Nothing was outstanding.
    Unsolicited,
}

#[derive(Debug)]
enum Slot {
    Waiting(oneshot::Sender<Reply>),
    Abandoned,
}

/// Table of outstanding requests for one connection.
#[derive(Debug)]
pub struct Correlator {
    pending: BTreeMap<u64, Slot>,
    max_pending: usize,
    echoes_ids: bool,
    closed: bool,
}

impl Correlator {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            max_pending,
            echoes_ids: false,
            closed: false,
        }
    }

    /// Registers request `id` and returns the receiver its reply will arrive on.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ConnectionClosed`] after [`close_all`](Self::close_all).
    /// - [`ConfigError::QueueFull`] when `max_pending` slots are taken.
    pub fn register(&mut self, id: u64) -> Result<oneshot::Receiver<Reply>, ConfigError> {
        if self.closed {
            return Err(ConfigError::ConnectionClosed);
        }
        if self.pending.len() >= self.max_pending {
            warn!(
                "refusing request {id}: {} requests outstanding",
                self.pending.len()
            );
            return Err(ConfigError::QueueFull {
                limit: self.max_pending,
            });
        }
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, Slot::Waiting(tx));
        Ok(rx)
    }

    /// Hands `response` to the request it answers.
    pub fn resolve(&mut self, response: Response) -> Resolution {
        let entry = match response.id {
            Some(id) => match self.pending.remove(&id) {
                Some(slot) => {
                    self.echoes_ids = true;
                    Some((id, slot))
                }
                None => {
                    warn!("dropping response for request {id}, which is no longer outstanding");
                    return Resolution::Stale(id);
                }
            },
            None => self.pending.pop_first(),
        };

        match entry {
            Some((id, Slot::Waiting(tx))) => {
                // The caller may have dropped its future.
                if tx.send(Ok(response)).is_err() {
                    debug!("request {id} was abandoned before its response arrived");
                }
                Resolution::Delivered(id)
            }
            Some((id, Slot::Abandoned)) => {
                debug!("late response for timed-out request {id} discarded");
                Resolution::Absorbed(id)
            }
            None => {
                warn!("dropping unsolicited response: {response:?}");
                Resolution::Unsolicited
            }
        }
    }

    /// Forgets request `id` without resolving it, for a request that never
    /// reached the wire.  Returns whether it was still outstanding.
    pub fn cancel(&mut self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Gives up on request `id` after it was written.  Its response may
    /// still arrive, so unless the peer echoes IDs the slot is kept as a
    /// placeholder in dispatch order.  Returns whether it was still
    /// outstanding.
    pub fn abandon(&mut self, id: u64) -> bool {
        if self.echoes_ids {
            return self.cancel(id);
        }
        match self.pending.get_mut(&id) {
            Some(slot) => {
                *slot = Slot::Abandoned;
                true
            }
            None => false,
        }
    }

    /// Fails every outstanding request with `ConnectionClosed` and refuses
    /// new ones.  Returns how many waiting requests were failed.
    pub fn close_all(&mut self) -> usize {
        self.closed = true;
        let pending = std::mem::take(&mut self.pending);
        let mut count = 0;
        for (_, slot) in pending {
            if let Slot::Waiting(tx) = slot {
                let _ = tx.send(Err(ConfigError::ConnectionClosed));
                count += 1;
            }
        }
        count
    }

    /// Number of occupied slots, placeholders included.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
