//! Callback Bridge
//!
//! Turns a callback-style vendor API into a single awaitable result.
//!
//! # Usage
//!
//! ```rust,ignore
//! let (resumer, pending) = bridge::<Result<Ad, String>>("ad-load", Some(timeout));
//! let on_error = resumer.clone();
//! vendor.load(move |ad| { resumer.resume(Ok(ad)); }, move |e| { on_error.resume(Err(e)); });
//! let outcome = pending.wait().await?;
//! ```
//!
//! The awaiting side resumes exactly once: the first `resume` wins and
//! later calls are ignored. If every resumer is dropped without firing, or
//! the optional watchdog elapses, the wait resolves with a [`BridgeError`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Watchdog timeouts applied to vendor callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Upper bound on waiting for a load callback
    pub load_timeout: Option<Duration>,
    /// Upper bound on waiting for a show/dismiss callback
    pub show_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            load_timeout: Some(Duration::from_secs(30)),
            // The user may keep a full-screen resource open for a while
            show_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Bridge errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("callback dropped without firing")]
    Dropped,

    #[error("callback did not fire within {0:?}")]
    TimedOut(Duration),
}

/// Vendor-facing half of a bridge. Clone it into each callback.
pub struct Resumer<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
    label: &'static str,
}

impl<T> Clone for Resumer<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            label: self.label,
        }
    }
}

impl<T> Resumer<T> {
    /// Deliver the result. Returns `false` if a result was already delivered.
    pub fn resume(&self, value: T) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sender {
            Some(tx) => {
                if tx.send(value).is_err() {
                    debug!(bridge = self.label, "Callback fired after waiter gave up");
                }
                true
            }
            None => {
                warn!(bridge = self.label, "Duplicate callback ignored");
                false
            }
        }
    }
}

/// Awaiting half of a bridge.
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
    timeout: Option<Duration>,
    label: &'static str,
}

impl<T> Pending<T> {
    /// Wait for the single result.
    pub async fn wait(self) -> Result<T, BridgeError> {
        let Pending { rx, timeout, label } = self;
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(_)) => {
                    warn!(bridge = label, "Callback dropped without firing");
                    Err(BridgeError::Dropped)
                }
                Err(_) => {
                    warn!(bridge = label, ?limit, "Callback watchdog elapsed");
                    Err(BridgeError::TimedOut(limit))
                }
            },
            None => rx.await.map_err(|_| {
                warn!(bridge = label, "Callback dropped without firing");
                BridgeError::Dropped
            }),
        }
    }
}

/// Create a bridge labelled `label` (used in logs) with an optional watchdog.
pub fn bridge<T>(label: &'static str, timeout: Option<Duration>) -> (Resumer<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Resumer {
            slot: Arc::new(Mutex::new(Some(tx))),
            label,
        },
        Pending { rx, timeout, label },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Vendor that fires its success callback and then its failure callback.
    fn double_firing_vendor(on_ok: Resumer<Result<u8, String>>, on_err: Resumer<Result<u8, String>>) {
        std::thread::spawn(move || {
            on_ok.resume(Ok(1));
            on_err.resume(Err("late failure".into()));
        });
    }

    #[tokio::test]
    async fn test_resumes_once_with_first_value() {
        let (resumer, pending) = bridge("test", None);
        double_firing_vendor(resumer.clone(), resumer);

        assert_eq!(pending.wait().await, Ok(Ok(1)));
    }

    #[test]
    fn test_second_resume_reports_false() {
        let (resumer, _pending) = bridge::<u8>("test", None);
        assert!(resumer.resume(1));
        assert!(!resumer.resume(2));
    }

    #[tokio::test]
    async fn test_dropped_callbacks_resolve() {
        let (resumer, pending) = bridge::<u8>("test", None);
        let clone = resumer.clone();
        drop(resumer);
        drop(clone);

        assert_eq!(pending.wait().await, Err(BridgeError::Dropped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_firing_vendor_times_out() {
        let (resumer, pending) = bridge::<u8>("test", Some(Duration::from_secs(30)));

        let result = pending.wait().await;
        assert_eq!(result, Err(BridgeError::TimedOut(Duration::from_secs(30))));

        // A callback arriving after the watchdog is absorbed quietly
        assert!(resumer.resume(9));
    }

    #[tokio::test]
    async fn test_resume_before_wait() {
        let (resumer, pending) = bridge("test", Some(Duration::from_secs(1)));
        resumer.resume("ready");
        assert_eq!(pending.wait().await, Ok("ready"));
    }

    #[test]
    fn test_default_config_bounds_both_callbacks() {
        let config = BridgeConfig::default();
        assert!(config.load_timeout.is_some());
        assert!(config.show_timeout.is_some());
    }
}
