//! # Packet Dispatcher
//!
//! Observer registry for decoded packets. Handlers are keyed by an
//! explicit [`SubscriptionId`] so callers can unsubscribe deterministically;
//! there is no process-wide emitter. Packets reach handlers in the order
//! they arrived on the connection, and handlers in subscription order.

use crate::error::{constants, CastError, Result};
use crate::protocol::packet::Packet;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Opaque handle returned by [`Dispatcher::subscribe`].
pub type SubscriptionId = u64;

type HandlerFn = dyn Fn(&Packet) + Send + Sync + 'static;

/// Packet observer registry. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Dispatcher {
    // BTreeMap keeps handlers in subscription order during dispatch.
    handlers: Arc<RwLock<BTreeMap<SubscriptionId, Box<HandlerFn>>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a handler for every dispatched packet. Returns the id used
    /// to remove it later.
    pub fn subscribe<F>(&self, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| CastError::Transport(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;
        handlers.insert(id, Box::new(handler));
        Ok(id)
    }

    /// Remove a handler. Returns false if the id was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| CastError::Transport(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;
        Ok(handlers.remove(&id).is_some())
    }

    /// Deliver one packet to every subscribed handler.
    pub fn dispatch(&self, packet: &Packet) -> Result<()> {
        if let Packet::Unknown(opcode) = packet {
            warn!(opcode, "ignoring packet with unknown opcode");
            return Ok(());
        }

        let handlers = self
            .handlers
            .read()
            .map_err(|_| CastError::Transport(constants::ERR_DISPATCHER_READ_LOCK.to_string()))?;
        for handler in handlers.values() {
            handler(packet);
        }
        Ok(())
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("subscriptions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn handlers_run_in_subscription_order() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            dispatcher
                .subscribe(move |_| seen.lock().unwrap().push(tag))
                .unwrap();
        }

        dispatcher.dispatch(&Packet::Pause).unwrap();
        assert_eq!(&*seen.lock().unwrap(), &["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&count);
        let id = dispatcher
            .subscribe(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        dispatcher.dispatch(&Packet::Ping).unwrap();
        assert!(dispatcher.unsubscribe(id).unwrap());
        dispatcher.dispatch(&Packet::Ping).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!dispatcher.unsubscribe(id).unwrap());
    }

    #[test]
    fn unknown_packets_are_not_delivered() {
        let dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&count);
        dispatcher
            .subscribe(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        dispatcher.dispatch(&Packet::Unknown(200)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
