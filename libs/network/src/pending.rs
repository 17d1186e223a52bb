//! Pending-reply tracking.
//!
//! Requests that expect a reply register a oneshot keyed by their
//! correlation value (the request's sequence id for single-hop replies, a
//! message uuid for end-to-end relay replies). The reply path completes the
//! oneshot; an optional deadline fails the caller's future with a timeout
//! and removes the entry. The envelope already on the wire is never
//! retracted — timing out is purely a local decision.

use crate::error::{NetworkError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::oneshot;

pub struct PendingReplies<K, V> {
    waiting: Mutex<HashMap<K, oneshot::Sender<V>>>,
}

impl<K: Eq + Hash + Clone, V> PendingReplies<K, V> {
    pub fn new() -> Self {
        Self {
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// Register interest in the reply correlated by `key`.
    pub fn register(&self, key: K) -> oneshot::Receiver<V> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(key, tx);
        rx
    }

    /// Complete the waiter for `key`. Returns false when nobody is waiting
    /// (already timed out, or an unsolicited reply).
    pub fn complete(&self, key: &K, value: V) -> bool {
        match self.waiting.lock().remove(key) {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Drop the waiter for `key` without completing it.
    pub fn forget(&self, key: &K) {
        self.waiting.lock().remove(key);
    }

    /// Fail every outstanding waiter; used on connection loss.
    pub fn fail_all(&self) {
        self.waiting.lock().clear();
    }

    /// Await a registered reply with a deadline. On timeout the entry is
    /// removed so the reply can fire at most once, then never again.
    pub async fn await_reply(
        &self,
        key: K,
        rx: oneshot::Receiver<V>,
        timeout: Duration,
    ) -> Result<V> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(NetworkError::SessionClosed),
            Err(_) => {
                self.forget(&key);
                Err(NetworkError::timeout(timeout))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.waiting.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.lock().is_empty()
    }
}

impl<K: Eq + Hash + Clone, V> Default for PendingReplies<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
