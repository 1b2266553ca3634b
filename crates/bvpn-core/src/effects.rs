//! One-shot Effect Queue
//!
//! Carries commands such as "navigate" or "request permission" from a
//! coordinator to whichever UI consumer is currently attached.
//!
//! # Behavior
//!
//! - Effects are delivered FIFO, each exactly once
//! - With no consumer attached, effects are buffered, never dropped
//! - At most one consumer is attached at a time; a recreated screen
//!   attaches again and continues where the previous consumer stopped

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio_stream::Stream;
use tracing::{debug, warn};

/// Ordered, exactly-once channel of effects.
pub struct EffectQueue<E> {
    tx: mpsc::UnboundedSender<E>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<E>>>,
    pending: Arc<AtomicUsize>,
}

impl<E> Clone for EffectQueue<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: Arc::clone(&self.rx),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<E: Send + 'static> EffectQueue<E> {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Append an effect. Never blocks.
    pub fn emit(&self, effect: E) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(effect).is_err() {
            // Only possible once every handle to the receiver is gone
            self.pending.fetch_sub(1, Ordering::AcqRel);
            warn!("Effect emitted after queue shutdown, dropped");
        }
    }

    /// Number of emitted effects not yet delivered.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Attach a consumer, waiting for any current consumer to detach.
    pub async fn attach(&self) -> EffectConsumer<E> {
        let rx = Arc::clone(&self.rx).lock_owned().await;
        debug!(pending = self.pending(), "Effect consumer attached");
        EffectConsumer {
            rx,
            pending: Arc::clone(&self.pending),
        }
    }

    /// Attach a consumer unless one is already attached.
    pub fn try_attach(&self) -> Option<EffectConsumer<E>> {
        let rx = Arc::clone(&self.rx).try_lock_owned().ok()?;
        debug!(pending = self.pending(), "Effect consumer attached");
        Some(EffectConsumer {
            rx,
            pending: Arc::clone(&self.pending),
        })
    }
}

impl<E: Send + 'static> Default for EffectQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive consumer of an [`EffectQueue`].
///
/// Dropping it detaches; undelivered effects stay queued. Receiving is
/// cancel-safe, so dropping a consumer mid-`recv` loses nothing.
pub struct EffectConsumer<E> {
    rx: OwnedMutexGuard<mpsc::UnboundedReceiver<E>>,
    pending: Arc<AtomicUsize>,
}

impl<E> EffectConsumer<E> {
    /// Wait for the next effect.
    ///
    /// Returns `None` only once every queue handle has been dropped and the
    /// buffer is drained.
    pub async fn recv(&mut self) -> Option<E> {
        let effect = self.rx.recv().await;
        if effect.is_some() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        effect
    }

    /// Take the next buffered effect without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        let effect = self.rx.try_recv().ok();
        if effect.is_some() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        effect
    }

    /// Take every buffered effect without waiting.
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl<E> Stream for EffectConsumer<E> {
    type Item = E;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        let this = self.get_mut();
        let polled = this.rx.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &polled {
            this.pending.fetch_sub(1, Ordering::AcqRel);
        }
        polled
    }
}

impl<E> Drop for EffectConsumer<E> {
    fn drop(&mut self) {
        debug!(
            pending = self.pending.load(Ordering::Acquire),
            "Effect consumer detached"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    #[derive(Debug, Clone, PartialEq)]
    enum Cmd {
        Navigate(&'static str),
        Copy(String),
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let queue = EffectQueue::new();
        queue.emit(Cmd::Navigate("a"));
        queue.emit(Cmd::Copy("logs".into()));
        queue.emit(Cmd::Navigate("b"));

        let mut consumer = queue.attach().await;
        assert_eq!(consumer.recv().await, Some(Cmd::Navigate("a")));
        assert_eq!(consumer.recv().await, Some(Cmd::Copy("logs".into())));
        assert_eq!(consumer.recv().await, Some(Cmd::Navigate("b")));
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_buffered_until_attach() {
        let queue = EffectQueue::new();
        queue.emit(Cmd::Navigate("settings"));
        assert_eq!(queue.pending(), 1);

        let mut consumer = queue.try_attach().unwrap();
        assert_eq!(consumer.try_recv(), Some(Cmd::Navigate("settings")));
        assert_eq!(consumer.try_recv(), None);
    }

    #[tokio::test]
    async fn test_no_redelivery_after_reattach() {
        let queue = EffectQueue::new();
        queue.emit(Cmd::Navigate("one"));
        queue.emit(Cmd::Navigate("two"));

        let mut first = queue.attach().await;
        assert_eq!(first.recv().await, Some(Cmd::Navigate("one")));
        drop(first);

        // Screen recreated: the second consumer only sees what is left
        let mut second = queue.attach().await;
        assert_eq!(second.drain(), vec![Cmd::Navigate("two")]);
        assert_eq!(second.try_recv(), None);
    }

    #[tokio::test]
    async fn test_single_consumer_at_a_time() {
        let queue: EffectQueue<Cmd> = EffectQueue::new();
        let first = queue.try_attach().unwrap();
        assert!(queue.try_attach().is_none());

        drop(first);
        assert!(queue.try_attach().is_some());
    }

    #[tokio::test]
    async fn test_attach_waits_for_detach() {
        let queue = EffectQueue::new();
        let first = queue.attach().await;

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut consumer = queue.attach().await;
                consumer.recv().await
            })
        };

        queue.emit(Cmd::Navigate("late"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(first);
        assert_eq!(waiter.await.unwrap(), Some(Cmd::Navigate("late")));
    }

    #[tokio::test]
    async fn test_cancelled_recv_loses_nothing() {
        let queue = EffectQueue::new();
        let mut consumer = queue.attach().await;

        let timed_out =
            tokio::time::timeout(Duration::from_millis(5), consumer.recv()).await;
        assert!(timed_out.is_err());
        drop(consumer);

        queue.emit(Cmd::Navigate("after"));
        let mut consumer = queue.attach().await;
        assert_eq!(consumer.recv().await, Some(Cmd::Navigate("after")));
    }

    #[tokio::test]
    async fn test_consumer_as_stream() {
        let queue = EffectQueue::new();
        for name in ["a", "b", "c"] {
            queue.emit(Cmd::Navigate(name));
        }

        let consumer = queue.attach().await;
        let taken: Vec<_> = consumer.take(3).collect().await;
        assert_eq!(
            taken,
            vec![Cmd::Navigate("a"), Cmd::Navigate("b"), Cmd::Navigate("c")]
        );
        assert_eq!(queue.pending(), 0);
    }
}
