//! Interstitial Ads
//!
//! One interstitial is kept warm in a [`SingleFlightCache`]. Showing it
//! takes the preloaded ad (or waits for the in-flight load) and bridges the
//! vendor's dismiss/failure callbacks into a single `bool`.

use crate::config::AdConfig;
use bvpn_core::{bridge, BridgeError, CachePhase, LoadCallback, ResourceLoader, Resumer, SingleFlightCache};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Show failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShowError {
    #[error("vendor failed to show: {0}")]
    Vendor(String),

    #[error("show callback: {0}")]
    Bridge(#[from] BridgeError),
}

/// Callback handed to the vendor for one `show`.
#[derive(Clone)]
pub struct ShowCallback {
    resumer: Resumer<Result<(), ShowError>>,
}

impl ShowCallback {
    /// The user closed the ad.
    pub fn on_dismissed(&self) {
        debug!("Interstitial dismissed callback");
        self.resumer.resume(Ok(()));
    }

    /// The ad could not be presented.
    pub fn on_failed_to_show(&self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(%reason, "Interstitial failed-to-show callback");
        self.resumer.resume(Err(ShowError::Vendor(reason)));
    }
}

/// Ad SDK
pub trait AdVendor: Send + Sync + 'static {
    /// Loaded, not yet shown ad
    type Ad: Send + 'static;

    /// Request an ad for `unit_id`.
    fn load(&self, unit_id: &str, callback: LoadCallback<Self::Ad>);

    /// Present a loaded ad full screen.
    fn show(&self, ad: Self::Ad, callback: ShowCallback);
}

/// Adapts an [`AdVendor`] to the cache's loader contract.
pub struct AdLoader<V: AdVendor> {
    vendor: Arc<V>,
    unit_id: String,
}

impl<V: AdVendor> AdLoader<V> {
    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }
}

impl<V: AdVendor> ResourceLoader for AdLoader<V> {
    type Handle = V::Ad;

    fn load(&self, callback: LoadCallback<V::Ad>) {
        debug!(unit_id = %self.unit_id, "Requesting interstitial");
        self.vendor.load(&self.unit_id, callback);
    }
}

/// A full-screen interruption the coordinator can show between actions.
pub trait Interstitial: Send + Sync + 'static {
    /// Warm up; fire-and-forget.
    fn preload(&self);

    /// Show it. Resolves `true` once dismissed, `false` if nothing could be
    /// shown. Never fails.
    fn present(&self) -> impl Future<Output = bool> + Send;
}

/// Interstitial ad manager
pub struct AdManager<V: AdVendor> {
    cache: SingleFlightCache<AdLoader<V>>,
    show_timeout: Option<Duration>,
}

impl<V: AdVendor> Clone for AdManager<V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            show_timeout: self.show_timeout,
        }
    }
}

impl<V: AdVendor> AdManager<V> {
    /// Create a manager. Debug builds request the vendor's test unit.
    pub fn new(vendor: Arc<V>, config: &AdConfig, debug: bool) -> Self {
        let bridge = config.bridge_config();
        let loader = AdLoader {
            vendor,
            unit_id: config.unit_id(debug).to_string(),
        };
        Self {
            cache: SingleFlightCache::new("interstitial", loader, bridge.load_timeout),
            show_timeout: bridge.show_timeout,
        }
    }

    /// Start loading unless an ad is loading or ready.
    pub fn preload(&self) {
        self.cache.preload();
    }

    pub fn phase(&self) -> CachePhase {
        self.cache.phase()
    }

    /// Underlying vendor loads issued so far
    pub fn loads_started(&self) -> u64 {
        self.cache.loads_started()
    }

    pub fn unit_id(&self) -> &str {
        self.cache.loader().unit_id()
    }

    /// Show the interstitial, loading it first if needed.
    pub async fn show(&self) -> bool {
        let vendor = Arc::clone(&self.cache.loader().vendor);
        let show_timeout = self.show_timeout;

        let outcome = self
            .cache
            .acquire_and_consume(|ad| async move {
                let (resumer, pending) = bridge("interstitial-show", show_timeout);
                vendor.show(ad, ShowCallback { resumer });
                pending.wait().await.unwrap_or_else(|e| Err(ShowError::Bridge(e)))
            })
            .await;

        match outcome {
            Ok(Ok(())) => {
                info!("Interstitial shown");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Interstitial not shown");
                false
            }
            Err(e) => {
                warn!(error = %e, "Interstitial unavailable");
                false
            }
        }
    }
}

impl<V: AdVendor> Interstitial for AdManager<V> {
    fn preload(&self) {
        self.cache.preload();
    }

    fn present(&self) -> impl Future<Output = bool> + Send {
        self.show()
    }
}
