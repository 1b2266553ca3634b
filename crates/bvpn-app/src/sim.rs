//! Simulated collaborators
//!
//! Stand-ins for the tunnel library, the ad SDK, the backend and the
//! platform surfaces, with realistic delays. Enough to drive a dashboard
//! session end to end from the command line.

use bvpn_core::LoadCallback;
use bvpn_screens::{ApiError, City, Country, DashboardApi, ServersApi, SessionInfo};
use bvpn_vpn::{
    AdVendor, CameraTarget, MapSurface, PermissionFlow, PermissionRequest, ShowCallback,
    TunnelConfig, TunnelError, TunnelEvent, TunnelManager, VpnStatus,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Tunnel library
///
/// Start moves through `Connecting` and reports `Connected` after the
/// handshake delay; stop reports `Disconnecting` then `Disconnected`.
pub struct SimTunnel {
    status: Arc<Mutex<VpnStatus>>,
    events: broadcast::Sender<TunnelEvent>,
    handshake: Duration,
    permission_granted: AtomicBool,
    fail_next: AtomicBool,
}

impl SimTunnel {
    pub fn new(handshake: Duration) -> Arc<Self> {
        Arc::new(Self {
            status: Arc::new(Mutex::new(VpnStatus::Disconnected)),
            events: broadcast::channel(32).0,
            handshake,
            permission_granted: AtomicBool::new(false),
            fail_next: AtomicBool::new(false),
        })
    }

    /// Make the next handshake fail.
    pub fn fail_next_handshake(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn grant_permission(&self) {
        self.permission_granted.store(true, Ordering::SeqCst);
    }

    fn publish(
        status: &Mutex<VpnStatus>,
        events: &broadcast::Sender<TunnelEvent>,
        next: VpnStatus,
    ) {
        *status.lock().unwrap_or_else(PoisonError::into_inner) = next;
        debug!(status = ?next, "Sim tunnel status");
        // No listener is fine
        let _ = events.send(TunnelEvent::Status(next));
    }
}

impl TunnelManager for SimTunnel {
    async fn start(&self, config: TunnelConfig) -> Result<(), TunnelError> {
        if !self.permission_granted.load(Ordering::SeqCst) {
            return Err(TunnelError::PermissionMissing);
        }
        if self.status() != VpnStatus::Disconnected {
            return Err(TunnelError::AlreadyRunning);
        }

        info!(
            endpoint = config.city.as_ref().map(|c| c.name.as_str()).unwrap_or("auto"),
            dns = config.dns.address(),
            "Sim tunnel handshake"
        );
        Self::publish(&self.status, &self.events, VpnStatus::Connecting);

        let status = Arc::clone(&self.status);
        let events = self.events.clone();
        let handshake = self.handshake;
        let fail = self.fail_next.swap(false, Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::time::sleep(handshake).await;
            let connecting = *status.lock().unwrap_or_else(PoisonError::into_inner) == VpnStatus::Connecting;
            if !connecting {
                return;
            }
            if fail {
                *status.lock().unwrap_or_else(PoisonError::into_inner) = VpnStatus::Disconnected;
                warn!("Sim tunnel handshake failed");
                let _ = events.send(TunnelEvent::Failed {
                    reason: "handshake timeout".to_string(),
                });
            } else {
                Self::publish(&status, &events, VpnStatus::Connected);
            }
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), TunnelError> {
        if self.status() == VpnStatus::Disconnected {
            return Ok(());
        }
        Self::publish(&self.status, &self.events, VpnStatus::Disconnecting);

        let status = Arc::clone(&self.status);
        let events = self.events.clone();
        let teardown = self.handshake / 4;
        tokio::spawn(async move {
            tokio::time::sleep(teardown).await;
            Self::publish(&status, &events, VpnStatus::Disconnected);
        });
        Ok(())
    }

    fn status(&self) -> VpnStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.events.subscribe()
    }

    fn permission_request(&self) -> Option<PermissionRequest> {
        if self.permission_granted.load(Ordering::SeqCst) {
            None
        } else {
            Some(PermissionRequest {
                action: "android.net.VpnService".to_string(),
            })
        }
    }
}

/// OS permission prompt that the user always accepts
pub struct SimPermission {
    tunnel: Arc<SimTunnel>,
}

impl SimPermission {
    pub fn new(tunnel: Arc<SimTunnel>) -> Self {
        Self { tunnel }
    }
}

impl PermissionFlow for SimPermission {
    async fn request(&self, request: PermissionRequest) -> bool {
        info!(action = %request.action, "Permission prompt");
        tokio::time::sleep(Duration::from_millis(300)).await;
        self.tunnel.grant_permission();
        true
    }
}

/// Ad SDK; loads and dismisses after fixed delays
pub struct SimAdVendor {
    next_ad: AtomicU64,
    load_delay: Duration,
    show_delay: Duration,
}

impl SimAdVendor {
    pub fn new(load_delay: Duration, show_delay: Duration) -> Self {
        Self {
            next_ad: AtomicU64::new(1),
            load_delay,
            show_delay,
        }
    }
}

impl AdVendor for SimAdVendor {
    type Ad = u64;

    fn load(&self, unit_id: &str, callback: LoadCallback<u64>) {
        let ad = self.next_ad.fetch_add(1, Ordering::SeqCst);
        let delay = self.load_delay;
        info!(unit_id, ad, "Sim ad load");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback.on_loaded(ad);
        });
    }

    fn show(&self, ad: u64, callback: ShowCallback) {
        let delay = self.show_delay;
        info!(ad, "Sim ad on screen");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback.on_dismissed();
        });
    }
}

/// Backend returning a fixed session and server catalog
pub struct SimApi {
    ip_address: String,
    latency: Duration,
}

impl SimApi {
    pub fn new(ip_address: impl Into<String>, latency: Duration) -> Self {
        Self {
            ip_address: ip_address.into(),
            latency,
        }
    }
}

impl DashboardApi for SimApi {
    async fn fetch_session(&self) -> Result<SessionInfo, ApiError> {
        tokio::time::sleep(self.latency).await;
        Ok(SessionInfo {
            ip_address: self.ip_address.clone(),
        })
    }
}

/// (country id, name, flag)
const COUNTRIES: &[(u32, &str, &str)] = &[(49, "Germany", "DE"), (31, "Netherlands", "NL")];

/// (city id, country id, name, latitude, longitude, servers)
const CITIES: &[(u32, u32, &str, f64, f64, u32)] = &[
    (12, 49, "Frankfurt", 50.1109, 8.6821, 4),
    (7, 49, "Berlin", 52.52, 13.405, 2),
    (3, 31, "Amsterdam", 52.3676, 4.9041, 3),
];

impl ServersApi for SimApi {
    async fn fetch_countries(&self) -> Result<Vec<Country>, ApiError> {
        tokio::time::sleep(self.latency).await;
        Ok(COUNTRIES
            .iter()
            .map(|&(id, name, flag)| Country {
                id,
                name: name.to_string(),
                flag: flag.to_string(),
            })
            .collect())
    }

    async fn fetch_cities(&self, country_id: u32) -> Result<Vec<City>, ApiError> {
        tokio::time::sleep(self.latency).await;
        let cities: Vec<City> = CITIES
            .iter()
            .filter(|city| city.1 == country_id)
            .map(|&(id, country_id, name, latitude, longitude, servers_available)| City {
                id,
                country_id,
                name: name.to_string(),
                latitude,
                longitude,
                servers_available,
            })
            .collect();
        if cities.is_empty() {
            return Err(ApiError::Network(format!("no servers in country {country_id}")));
        }
        Ok(cities)
    }
}

/// Map view that only logs
pub struct SimMap;

impl MapSurface for SimMap {
    async fn animate_camera_to(&self, target: CameraTarget) {
        info!(
            lat = target.latitude,
            lon = target.longitude,
            zoom = target.zoom,
            "Camera moving"
        );
        tokio::time::sleep(target.duration).await;
    }
}
