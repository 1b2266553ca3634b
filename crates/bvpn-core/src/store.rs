//! Screen State Store
//!
//! Holds the current immutable snapshot of one screen and fans every
//! applied update out to live subscribers.
//!
//! # Ordering
//!
//! Updates are applied under a single lock and pushed to each subscriber
//! channel while that lock is held, so every subscriber observes snapshots
//! in exactly the order the transforms were applied. A subscriber is
//! registered under the same lock, which makes its first item the snapshot
//! that was current at subscribe time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

/// Stream of snapshots returned by [`StateStore::subscribe`].
pub type StateStream<S> = UnboundedReceiverStream<S>;

struct Inner<S> {
    /// Snapshot visible to `get()`
    current: S,
    /// Number of updates applied so far
    version: u64,
    /// One channel per live subscriber
    subscribers: Vec<mpsc::UnboundedSender<S>>,
}

/// Observable holder of a screen's state snapshot.
///
/// Cloning yields another handle to the same store.
pub struct StateStore<S> {
    inner: Arc<Mutex<Inner<S>>>,
}

impl<S> Clone for StateStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Clone + Send + 'static> StateStore<S> {
    /// Create a store holding `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                current: initial,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        // A transform that panicked never replaced `current`, so the
        // snapshot behind a poisoned lock is still a complete one.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current snapshot.
    pub fn get(&self) -> S {
        self.lock().current.clone()
    }

    /// Number of updates applied since creation.
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Replace the snapshot with `transform(current)`.
    ///
    /// Concurrent calls are linearized; the returned value is the snapshot
    /// this call produced.
    pub fn update<F>(&self, transform: F) -> S
    where
        F: FnOnce(&S) -> S,
    {
        let mut inner = self.lock();
        let next = transform(&inner.current);
        inner.current = next.clone();
        inner.version += 1;
        let version = inner.version;

        inner
            .subscribers
            .retain(|tx| tx.send(next.clone()).is_ok());
        trace!(version, subscribers = inner.subscribers.len(), "state updated");

        next
    }

    /// Apply an in-place edit to a copy of the current snapshot.
    pub fn modify<F>(&self, edit: F) -> S
    where
        F: FnOnce(&mut S),
    {
        self.update(|current| {
            let mut next = current.clone();
            edit(&mut next);
            next
        })
    }

    /// Subscribe to snapshots.
    ///
    /// The stream yields the current snapshot immediately, then every later
    /// snapshot in update order. Dropping the stream unsubscribes.
    pub fn subscribe(&self) -> StateStream<S> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // `rx` is alive, the send cannot fail
        let _ = tx.send(inner.current.clone());
        inner.subscribers.push(tx);
        UnboundedReceiverStream::new(rx)
    }

    /// Number of subscribers whose streams are still alive.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }
}

impl<S: Clone + Send + Default + 'static> Default for StateStore<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}
