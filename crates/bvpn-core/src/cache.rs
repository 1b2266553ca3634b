//! Single-Flight Resource Cache
//!
//! Keeps at most one externally-loaded, single-use resource warm (a
//! preloaded interstitial, a tunnel session, a map surface).
//!
//! # State Machine
//!
//! ```text
//!            preload / acquire              load ok
//!   Empty ─────────────────────▶ Loading ───────────▶ Ready
//!     ▲                             │                   │
//!     │          load failed        │     consumed      │
//!     └─────────────────────────────┴───────────────────┘
//! ```
//!
//! The slot and the in-flight marker live behind one mutex. Every caller
//! that arrives while a load is in flight waits on that same load and
//! observes the same outcome. The load itself runs in a detached task, so a
//! waiter that is cancelled never strands the cache in `Loading`.

use crate::bridge::{bridge, BridgeError, Resumer};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Load failure reported to every waiter of a load.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("vendor failed to load: {0}")]
    Vendor(String),

    #[error("load callback: {0}")]
    Bridge(#[from] BridgeError),
}

/// Why `acquire` produced no handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    #[error("resource load failed: {0}")]
    Load(#[from] LoadError),

    /// The shared load succeeded but a concurrent caller took the handle.
    #[error("resource already consumed by a concurrent caller")]
    AlreadyConsumed,
}

/// Observable phase of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePhase {
    /// No handle, no load in flight
    Empty,
    /// Exactly one load in flight
    Loading,
    /// Handle present and unconsumed
    Ready,
}

/// Callback handed to a [`ResourceLoader`] for one load.
///
/// Clone it into every vendor callback; only the first report counts.
pub struct LoadCallback<H> {
    resumer: Resumer<Result<H, LoadError>>,
}

impl<H> Clone for LoadCallback<H> {
    fn clone(&self) -> Self {
        Self {
            resumer: self.resumer.clone(),
        }
    }
}

impl<H> LoadCallback<H> {
    /// Vendor success callback.
    pub fn on_loaded(&self, handle: H) {
        self.resumer.resume(Ok(handle));
    }

    /// Vendor failure callback.
    pub fn on_failed(&self, reason: impl Into<String>) {
        self.resumer.resume(Err(LoadError::Vendor(reason.into())));
    }
}

/// Issues one vendor load per call.
pub trait ResourceLoader: Send + Sync + 'static {
    /// Loaded resource; consumed at most once.
    type Handle: Send + 'static;

    /// Start a load and report its outcome through `callback`.
    fn load(&self, callback: LoadCallback<Self::Handle>);
}

type SharedOutcome = Option<Result<(), LoadError>>;

enum Slot<H> {
    Empty,
    Loading(watch::Receiver<SharedOutcome>),
    Ready(H),
}

impl<H> Slot<H> {
    fn phase(&self) -> CachePhase {
        match self {
            Slot::Empty => CachePhase::Empty,
            Slot::Loading(_) => CachePhase::Loading,
            Slot::Ready(_) => CachePhase::Ready,
        }
    }
}

struct Inner<L: ResourceLoader> {
    loader: L,
    slot: Mutex<Slot<L::Handle>>,
    load_timeout: Option<Duration>,
    loads_started: AtomicU64,
    name: &'static str,
}

impl<L: ResourceLoader> Inner<L> {
    fn lock(&self) -> MutexGuard<'_, Slot<L::Handle>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-flight cache around one consumable resource.
pub struct SingleFlightCache<L: ResourceLoader> {
    inner: Arc<Inner<L>>,
}

impl<L: ResourceLoader> Clone for SingleFlightCache<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: ResourceLoader> SingleFlightCache<L> {
    /// Create an empty cache. `name` tags log lines.
    pub fn new(name: &'static str, loader: L, load_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                slot: Mutex::new(Slot::Empty),
                load_timeout,
                loads_started: AtomicU64::new(0),
                name,
            }),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> CachePhase {
        self.inner.lock().phase()
    }

    /// Number of underlying vendor loads issued so far.
    pub fn loads_started(&self) -> u64 {
        self.inner.loads_started.load(Ordering::Acquire)
    }

    /// Access the wrapped loader.
    pub fn loader(&self) -> &L {
        &self.inner.loader
    }

    /// Warm the cache. No-op while `Loading` or `Ready`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn preload(&self) {
        let mut slot = self.inner.lock();
        if matches!(*slot, Slot::Empty) {
            self.start_load(&mut slot);
        } else {
            debug!(cache = self.inner.name, phase = ?slot.phase(), "Preload skipped");
        }
    }

    /// Take the handle, loading it first if needed, and pass it to `consumer`.
    ///
    /// The cache is `Empty` before `consumer` runs, whatever it does with the
    /// handle.
    pub async fn acquire_and_consume<F, Fut, T>(&self, consumer: F) -> Result<T, AcquireError>
    where
        F: FnOnce(L::Handle) -> Fut,
        Fut: Future<Output = T>,
    {
        let handle = self.acquire().await?;
        Ok(consumer(handle).await)
    }

    /// Take the handle, joining or starting a load when none is ready.
    pub async fn acquire(&self) -> Result<L::Handle, AcquireError> {
        let mut outcome_rx = {
            let mut slot = self.inner.lock();
            match std::mem::replace(&mut *slot, Slot::Empty) {
                Slot::Ready(handle) => {
                    debug!(cache = self.inner.name, "Handle consumed from cache");
                    return Ok(handle);
                }
                Slot::Loading(rx) => {
                    debug!(cache = self.inner.name, "Joining in-flight load");
                    *slot = Slot::Loading(rx.clone());
                    rx
                }
                Slot::Empty => self.start_load(&mut slot),
            }
        };

        let outcome = match outcome_rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(LoadError::Bridge(BridgeError::Dropped))),
            // The load task went away without publishing
            Err(_) => Err(LoadError::Bridge(BridgeError::Dropped)),
        };
        outcome?;

        let mut slot = self.inner.lock();
        match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Ready(handle) => {
                debug!(cache = self.inner.name, "Handle consumed after load");
                Ok(handle)
            }
            other => {
                *slot = other;
                Err(AcquireError::AlreadyConsumed)
            }
        }
    }

    /// Transition `Empty → Loading` and spawn the vendor load.
    fn start_load(&self, slot: &mut Slot<L::Handle>) -> watch::Receiver<SharedOutcome> {
        let (outcome_tx, outcome_rx) = watch::channel(None);
        *slot = Slot::Loading(outcome_rx.clone());

        let attempt = self.inner.loads_started.fetch_add(1, Ordering::AcqRel) + 1;
        info!(cache = self.inner.name, attempt, "Starting resource load");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let (resumer, pending) = bridge(inner.name, inner.load_timeout);
            inner.loader.load(LoadCallback { resumer });

            let result = match pending.wait().await {
                Ok(result) => result,
                Err(e) => Err(LoadError::Bridge(e)),
            };

            let shared = {
                let mut slot = inner.lock();
                match result {
                    Ok(handle) => {
                        *slot = Slot::Ready(handle);
                        info!(cache = inner.name, attempt, "Resource loaded");
                        Ok(())
                    }
                    Err(e) => {
                        *slot = Slot::Empty;
                        warn!(cache = inner.name, attempt, error = %e, "Resource load failed");
                        Err(e)
                    }
                }
            };

            // Waiters may all have been cancelled
            let _ = outcome_tx.send(Some(shared));
        });

        outcome_rx
    }
}
