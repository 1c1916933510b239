//! Multi-subscriber fan-out over unbounded tokio channels.
//!
//! Every observable stream in the crate (bridge events, bridge state,
//! adapter output, tracker changes, directory reloads) is an [`EventHub`].
//! Each subscriber gets its own `UnboundedReceiver`, so delivery is lossless
//! and ordered per subscriber. Receivers that have been dropped are pruned on
//! the next emit.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

pub struct EventHub<T> {
    subscribers: Arc<Mutex<Vec<UnboundedSender<T>>>>,
}

impl<T> Clone for EventHub<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> EventHub<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. It sees every item emitted from now on.
    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Deliver `item` to every live subscriber.
    pub fn emit(&self, item: T) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(item.clone()).is_ok());
    }

    /// Number of subscribers still attached as of the last emit.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}
