//! Dashboard Coordinator
//!
//! Drives the connect/disconnect screen.
//!
//! # Connection state
//!
//! ```text
//!                 connect click            permission granted
//!  Disconnected ───────────────▶ (CheckVpnPermission) ─────────▶ Connecting
//!       ▲                                                            │
//!       │ tunnel Disconnected       tunnel failure (alert)           │ tunnel Connected
//!       │◀───────────────────────────────────────────────────────────┤
//!       │                                                            ▼
//!  Disconnecting ◀──────────────────── connect click ────────────  Connected
//! ```
//!
//! `is_outdated` and `is_banned` are terminal: once set, every action other
//! than [`on_update_click`](DashboardCoordinator::on_update_click) is ignored.
//!
//! # Sessions
//!
//! [`enter`](DashboardCoordinator::enter) opens a session and starts the
//! session's listeners (tunnel events, selected city, session fetch).
//! [`leave`](DashboardCoordinator::leave) aborts them. Every async result is
//! applied through the [`SessionToken`] captured when the work was issued,
//! so a result that lands after `leave` is dropped.

use crate::api::{ApiError, DashboardApi, SessionInfo};
use crate::lock;
use crate::status::Status;
use bvpn_core::{EffectQueue, SessionScope, SessionToken, StateStore};
use bvpn_vpn::{
    Interstitial, MapConfig, Preferences, SelectedCity, TunnelConfig, TunnelEvent, TunnelManager,
    VpnStatus,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Reason the error alert is open
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DashboardError {
    #[error("VPN permission denied")]
    PermissionDenied,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl DashboardError {
    /// Confirming the alert retries the connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            DashboardError::PermissionDenied | DashboardError::ConnectionFailed(_) => true,
        }
    }
}

/// Dashboard snapshot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashboardState {
    pub vpn_status: VpnStatus,
    /// Session fetch status
    pub status: Status,
    pub selected_city: Option<SelectedCity>,
    pub ip_address: String,
    pub is_error_alert_visible: bool,
    pub error: Option<DashboardError>,
    pub is_outdated: bool,
    pub is_banned: bool,
}

impl DashboardState {
    /// Blocking overlay: a fetch in flight or the tunnel between states.
    pub fn is_loading(&self) -> bool {
        self.status.is_loading() || self.vpn_status.is_transitioning()
    }

    /// Terminal screen (update required or banned)
    pub fn is_fatal(&self) -> bool {
        self.is_outdated || self.is_banned
    }
}

/// One-shot commands for the dashboard UI
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEffect {
    /// Check (and if needed request) the VPN permission, then report back
    /// through `on_permissions_result`.
    CheckVpnPermission,
    ShowSelectServer {
        selected_city: Option<SelectedCity>,
    },
    ShowSettings,
    /// Open the store page to update the app
    ShowGooglePlay,
    ChangeMapPosition {
        latitude: f64,
        longitude: f64,
        zoom: f64,
        duration: Duration,
    },
}

impl DashboardEffect {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardEffect::CheckVpnPermission => "check_vpn_permission",
            DashboardEffect::ShowSelectServer { .. } => "show_select_server",
            DashboardEffect::ShowSettings => "show_settings",
            DashboardEffect::ShowGooglePlay => "show_google_play",
            DashboardEffect::ChangeMapPosition { .. } => "change_map_position",
        }
    }
}

struct Inner<T, A, I> {
    store: StateStore<DashboardState>,
    effects: EffectQueue<DashboardEffect>,
    scope: SessionScope,
    session: Mutex<Option<SessionToken>>,
    /// Server-list navigation waiting for the interstitial to close
    pending_navigation: Mutex<Option<Option<SelectedCity>>>,
    tunnel: Arc<T>,
    api: Arc<A>,
    ads: Arc<I>,
    prefs: Preferences,
    map: MapConfig,
}

/// Dashboard screen coordinator
pub struct DashboardCoordinator<T, A, I> {
    inner: Arc<Inner<T, A, I>>,
}

impl<T, A, I> Clone for DashboardCoordinator<T, A, I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, A, I> DashboardCoordinator<T, A, I>
where
    T: TunnelManager,
    A: DashboardApi,
    I: Interstitial,
{
    pub fn new(tunnel: Arc<T>, api: Arc<A>, ads: Arc<I>, prefs: Preferences, map: MapConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: StateStore::default(),
                effects: EffectQueue::new(),
                scope: SessionScope::new(),
                session: Mutex::new(None),
                pending_navigation: Mutex::new(None),
                tunnel,
                api,
                ads,
                prefs,
                map,
            }),
        }
    }

    /// Screen state
    pub fn state(&self) -> &StateStore<DashboardState> {
        &self.inner.store
    }

    /// Screen effects
    pub fn effects(&self) -> &EffectQueue<DashboardEffect> {
        &self.inner.effects
    }

    fn token(&self) -> Option<SessionToken> {
        let token = lock(&self.inner.session).clone();
        if token.is_none() {
            debug!("Dashboard action outside a session ignored");
        }
        token
    }

    fn emit(&self, effect: DashboardEffect) {
        debug!(effect = effect.kind(), "Dashboard effect");
        self.inner.effects.emit(effect);
    }

    /// Start a screen session. Must be called from within a tokio runtime.
    pub fn enter(&self) {
        let token = self.inner.scope.begin();
        *lock(&self.inner.session) = Some(token.clone());

        self.inner.ads.preload();

        let tunnel_status = self.inner.tunnel.status();
        self.inner.store.modify(|s| {
            s.vpn_status = tunnel_status;
            if !s.is_fatal() {
                s.status = Status::Loading;
            }
        });

        self.watch_tunnel(&token);
        self.watch_selected_city(&token);

        let this = self.clone();
        let fetch_token = token.clone();
        self.inner.scope.spawn(&token, async move {
            let result = this.inner.api.fetch_session().await;
            fetch_token.apply(|| this.apply_session(result));
        });
    }

    /// End the screen session; late results are discarded.
    pub fn leave(&self) {
        lock(&self.inner.session).take();
        lock(&self.inner.pending_navigation).take();
        self.inner.scope.end();
        info!(
            updates = self.inner.store.version(),
            subscribers = self.inner.store.subscriber_count(),
            "Dashboard session ended"
        );
    }

    fn watch_tunnel(&self, token: &SessionToken) {
        // Subscribe before spawning so no event between here and the first
        // poll is lost
        let mut events = self.inner.tunnel.subscribe();
        let this = self.clone();
        let event_token = token.clone();

        self.inner.scope.spawn(token, async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        event_token.apply(|| this.on_tunnel_event(event));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Tunnel events lagged");
                        let status = this.inner.tunnel.status();
                        event_token.apply(|| this.on_tunnel_event(TunnelEvent::Status(status)));
                    }
                    Err(RecvError::Closed) => {
                        debug!("Tunnel event stream closed");
                        break;
                    }
                }
            }
        });
    }

    fn watch_selected_city(&self, token: &SessionToken) {
        let mut cities = self.inner.prefs.observe_selected_city();
        let this = self.clone();
        let city_token = token.clone();

        self.inner.scope.spawn(token, async move {
            while let Some(city) = cities.next().await {
                city_token.apply(|| this.on_city_changed(city));
            }
        });
    }

    fn on_city_changed(&self, city: Option<SelectedCity>) {
        if let Some(city) = &city {
            info!(city = %city.name, "Selected city changed");
            self.emit(DashboardEffect::ChangeMapPosition {
                latitude: city.latitude,
                longitude: city.longitude,
                zoom: self.inner.map.zoom,
                duration: self.inner.map.camera_duration(),
            });
        }
        self.inner.store.modify(|s| s.selected_city = city);
    }

    fn on_tunnel_event(&self, event: TunnelEvent) {
        match event {
            TunnelEvent::Status(status) => {
                info!(?status, "Tunnel status");
                self.inner.store.modify(|s| s.vpn_status = status);
            }
            TunnelEvent::Failed { reason } => {
                let status = self.inner.store.get().vpn_status;
                if matches!(status, VpnStatus::Connecting | VpnStatus::Connected) {
                    warn!(%reason, ?status, "Tunnel failed");
                    self.fail_connection(reason);
                } else {
                    debug!(%reason, ?status, "Tunnel failure ignored");
                }
            }
        }
    }

    fn fail_connection(&self, reason: String) {
        self.inner.store.modify(|s| {
            s.vpn_status = VpnStatus::Disconnected;
            if !s.is_fatal() {
                s.is_error_alert_visible = true;
                s.error = Some(DashboardError::ConnectionFailed(reason));
            }
        });
    }

    fn apply_session(&self, result: Result<SessionInfo, ApiError>) {
        match result {
            Ok(info) => {
                info!(ip = %info.ip_address, "Session info loaded");
                self.inner.store.modify(|s| {
                    s.status = Status::Data;
                    s.ip_address = info.ip_address;
                });
            }
            Err(e) if e.is_fatal() => {
                warn!(error = %e, "Dashboard blocked");
                if lock(&self.inner.pending_navigation).take().is_some() {
                    debug!("Pending server list navigation dropped");
                }
                let banned = e == ApiError::Banned;
                self.inner.store.modify(|s| {
                    s.status = Status::Data;
                    if banned {
                        s.is_banned = true;
                    } else {
                        s.is_outdated = true;
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Session fetch failed");
                self.inner
                    .store
                    .modify(|s| s.status = Status::Error { is_loading: false });
            }
        }
    }

    /// Connect button. Disconnected: ask for the VPN permission.
    /// Connecting or connected: stop the tunnel.
    pub async fn on_connect_click(&self) {
        let Some(token) = self.token() else { return };
        if self.inner.store.get().is_fatal() {
            debug!("Connect ignored on terminal screen");
            return;
        }

        let mut previous = VpnStatus::Disconnected;
        self.inner.store.modify(|s| {
            previous = s.vpn_status;
            if matches!(s.vpn_status, VpnStatus::Connecting | VpnStatus::Connected) {
                s.vpn_status = VpnStatus::Disconnecting;
            }
        });

        match previous {
            VpnStatus::Disconnected => self.emit(DashboardEffect::CheckVpnPermission),
            VpnStatus::Disconnecting => debug!("Connect ignored while disconnecting"),
            status @ (VpnStatus::Connecting | VpnStatus::Connected) => {
                info!(from = ?status, "Stopping tunnel");
                if let Err(e) = self.inner.tunnel.stop().await {
                    warn!(error = %e, "Tunnel stop failed");
                    token.apply(|| {
                        self.inner.store.modify(|s| {
                            if s.vpn_status == VpnStatus::Disconnecting {
                                s.vpn_status = status;
                            }
                        })
                    });
                }
            }
        }
    }

    /// Result of the permission prompt started by `CheckVpnPermission`.
    pub async fn on_permissions_result(&self, granted: bool) {
        let Some(token) = self.token() else { return };
        if self.inner.store.get().is_fatal() {
            debug!("Permission result ignored on terminal screen");
            return;
        }

        if !granted {
            info!("VPN permission denied");
            self.inner.store.modify(|s| {
                if !s.is_fatal() {
                    s.is_error_alert_visible = true;
                    s.error = Some(DashboardError::PermissionDenied);
                }
            });
            return;
        }

        let mut start = false;
        self.inner.store.modify(|s| {
            if !s.is_fatal() && s.vpn_status == VpnStatus::Disconnected {
                s.vpn_status = VpnStatus::Connecting;
                start = true;
            }
        });
        if !start {
            debug!("Permission granted but tunnel not idle");
            return;
        }

        let prefs = &self.inner.prefs;
        let config = TunnelConfig {
            city: prefs.selected_city(),
            protocol: prefs.protocol(),
            dns: prefs.dns(),
        };
        info!(
            city = config.city.as_ref().map(|c| c.name.as_str()).unwrap_or("auto"),
            protocol = ?config.protocol,
            dns = ?config.dns,
            "Starting tunnel"
        );

        if let Err(e) = self.inner.tunnel.start(config).await {
            warn!(error = %e, "Tunnel start failed");
            token.apply(|| self.fail_connection(e.to_string()));
        }
    }

    /// Open the server list after an interstitial.
    ///
    /// Ignored while loading or while a previous click is still waiting for
    /// its ad. The navigation is released by [`on_ad_shown`](Self::on_ad_shown)
    /// whether or not an ad was actually shown.
    pub fn on_select_server_click(&self) {
        let Some(token) = self.token() else { return };

        let state = self.inner.store.get();
        if state.is_fatal() || state.is_loading() {
            debug!(loading = state.is_loading(), "Select server ignored");
            return;
        }

        {
            let mut pending = lock(&self.inner.pending_navigation);
            if pending.is_some() {
                debug!("Select server already pending");
                return;
            }
            *pending = Some(state.selected_city);
        }

        let this = self.clone();
        let ad_token = token.clone();
        self.inner.scope.spawn(&token, async move {
            let shown = this.inner.ads.present().await;
            debug!(shown, "Interstitial finished");
            ad_token.apply(|| this.on_ad_shown());
        });
    }

    /// Interstitial closed (or could not be shown); release the pending
    /// navigation. Calling it again is a no-op.
    pub fn on_ad_shown(&self) {
        let Some(selected_city) = lock(&self.inner.pending_navigation).take() else {
            return;
        };
        if self.inner.store.get().is_fatal() {
            debug!("Server list navigation dropped on terminal screen");
            return;
        }
        self.emit(DashboardEffect::ShowSelectServer { selected_city });
    }

    pub fn on_settings_click(&self) {
        let Some(_token) = self.token() else { return };
        if self.inner.store.get().is_fatal() {
            return;
        }
        self.emit(DashboardEffect::ShowSettings);
    }

    /// Retry the failed session fetch.
    pub async fn on_try_again_click(&self) {
        let Some(token) = self.token() else { return };

        let mut retry = false;
        self.inner.store.modify(|s| {
            if !s.is_fatal() && s.status == (Status::Error { is_loading: false }) {
                s.status = Status::Error { is_loading: true };
                retry = true;
            }
        });
        if !retry {
            debug!("Nothing to retry");
            return;
        }

        info!("Retrying session fetch");
        let result = self.inner.api.fetch_session().await;
        token.apply(|| self.apply_session(result));
    }

    /// Alert confirmed: close it and try connecting again.
    pub fn on_alert_confirm_click(&self) {
        let Some(_token) = self.token() else { return };
        let mut retry = false;
        self.inner.store.modify(|s| {
            retry = s.error.as_ref().is_some_and(DashboardError::is_retryable)
                && s.vpn_status == VpnStatus::Disconnected
                && !s.is_fatal();
            s.is_error_alert_visible = false;
            s.error = None;
        });
        if retry {
            self.emit(DashboardEffect::CheckVpnPermission);
        }
    }

    /// Alert dismissed without retrying.
    pub fn on_alert_dismiss_request(&self) {
        let Some(_token) = self.token() else { return };
        self.inner.store.modify(|s| {
            s.is_error_alert_visible = false;
            s.error = None;
        });
    }

    /// Update button on the outdated screen.
    pub fn on_update_click(&self) {
        let Some(_token) = self.token() else { return };
        self.emit(DashboardEffect::ShowGooglePlay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bvpn_core::EffectConsumer;
    use bvpn_vpn::{MemoryStore, Protocol, TunnelError};
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{broadcast, mpsc, Notify};

    const WAIT: Duration = Duration::from_secs(5);

    struct FakeTunnel {
        events: broadcast::Sender<TunnelEvent>,
        starts: Mutex<Vec<TunnelConfig>>,
        stops: AtomicUsize,
        start_error: Mutex<Option<TunnelError>>,
    }

    impl FakeTunnel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: broadcast::channel(16).0,
                starts: Mutex::new(Vec::new()),
                stops: AtomicUsize::new(0),
                start_error: Mutex::new(None),
            })
        }

        fn emit(&self, event: TunnelEvent) {
            self.events.send(event).unwrap();
        }
    }

    impl TunnelManager for FakeTunnel {
        fn start(&self, config: TunnelConfig) -> impl Future<Output = Result<(), TunnelError>> + Send {
            self.starts.lock().unwrap().push(config);
            let result = match self.start_error.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            };
            async move { result }
        }

        fn stop(&self) -> impl Future<Output = Result<(), TunnelError>> + Send {
            self.stops.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }

        fn status(&self) -> VpnStatus {
            VpnStatus::Disconnected
        }

        fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
            self.events.subscribe()
        }

        fn permission_request(&self) -> Option<bvpn_vpn::PermissionRequest> {
            None
        }
    }

    /// API whose responses are pushed by the test.
    struct FakeApi {
        responses: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<SessionInfo, ApiError>>>,
        calls: AtomicUsize,
    }

    impl DashboardApi for FakeApi {
        fn fetch_session(&self) -> impl Future<Output = Result<SessionInfo, ApiError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            async move {
                self.responses
                    .lock()
                    .await
                    .recv()
                    .await
                    .unwrap_or_else(|| Err(ApiError::Network("closed".into())))
            }
        }
    }

    struct FakeAds {
        preloads: AtomicUsize,
        presents: AtomicUsize,
        fill: bool,
        /// Holds the ad on screen until notified
        gate: Option<Arc<Notify>>,
    }

    impl Interstitial for FakeAds {
        fn preload(&self) {
            self.preloads.fetch_add(1, Ordering::SeqCst);
        }

        fn present(&self) -> impl Future<Output = bool> + Send {
            self.presents.fetch_add(1, Ordering::SeqCst);
            let fill = self.fill;
            let gate = self.gate.clone();
            async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                fill
            }
        }
    }

    struct Harness {
        dashboard: DashboardCoordinator<FakeTunnel, FakeApi, FakeAds>,
        tunnel: Arc<FakeTunnel>,
        api: Arc<FakeApi>,
        ads: Arc<FakeAds>,
        responses: mpsc::UnboundedSender<Result<SessionInfo, ApiError>>,
        prefs: Preferences,
    }

    fn harness(fill: bool) -> Harness {
        harness_with_gate(fill, None)
    }

    fn harness_with_gate(fill: bool, gate: Option<Arc<Notify>>) -> Harness {
        let (responses, rx) = mpsc::unbounded_channel();
        let tunnel = FakeTunnel::new();
        let api = Arc::new(FakeApi {
            responses: tokio::sync::Mutex::new(rx),
            calls: AtomicUsize::new(0),
        });
        let ads = Arc::new(FakeAds {
            preloads: AtomicUsize::new(0),
            presents: AtomicUsize::new(0),
            fill,
            gate,
        });
        let prefs = Preferences::new(Arc::new(MemoryStore::new()));
        let dashboard = DashboardCoordinator::new(
            Arc::clone(&tunnel),
            Arc::clone(&api),
            Arc::clone(&ads),
            prefs.clone(),
            MapConfig::default(),
        );
        Harness {
            dashboard,
            tunnel,
            api,
            ads,
            responses,
            prefs,
        }
    }

    fn berlin() -> SelectedCity {
        SelectedCity {
            id: 7,
            name: "Berlin".into(),
            country_id: 49,
            country_name: "Germany".into(),
            country_flag: "DE".into(),
            latitude: 52.52,
            longitude: 13.405,
        }
    }

    fn ip(address: &str) -> Result<SessionInfo, ApiError> {
        Ok(SessionInfo {
            ip_address: address.into(),
        })
    }

    impl Harness {
        /// Enter and wait for the session fetch to land.
        async fn enter_with(&self, response: Result<SessionInfo, ApiError>) -> DashboardState {
            self.dashboard.enter();
            self.responses.send(response).unwrap();
            self.settle(|s| !s.status.is_loading()).await
        }

        async fn settle(&self, done: impl Fn(&DashboardState) -> bool) -> DashboardState {
            let mut states = self.dashboard.state().subscribe();
            tokio::time::timeout(WAIT, async {
                loop {
                    match states.next().await {
                        Some(state) if done(&state) => return state,
                        Some(_) => continue,
                        None => panic!("state stream ended"),
                    }
                }
            })
            .await
            .expect("state did not settle")
        }

        async fn effects(&self) -> EffectConsumer<DashboardEffect> {
            self.dashboard.effects().attach().await
        }
    }

    async fn next_effect(effects: &mut EffectConsumer<DashboardEffect>) -> DashboardEffect {
        tokio::time::timeout(WAIT, effects.recv())
            .await
            .expect("no effect")
            .expect("queue closed")
    }

    #[tokio::test]
    async fn test_initial_state() {
        let h = harness(true);
        let state = h.dashboard.state().get();

        assert_eq!(state.vpn_status, VpnStatus::Disconnected);
        assert_eq!(state.status, Status::Loading);
        assert!(state.is_loading());
        assert!(!state.is_fatal());
    }

    #[tokio::test]
    async fn test_enter_preloads_and_fetches_session() {
        let h = harness(true);
        let state = h.enter_with(ip("10.0.0.2")).await;

        assert_eq!(state.status, Status::Data);
        assert_eq!(state.ip_address, "10.0.0.2");
        assert_eq!(h.ads.preloads.load(Ordering::SeqCst), 1);
        assert_eq!(h.api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_flow() {
        let h = harness(true);
        h.enter_with(ip("10.0.0.2")).await;
        let mut effects = h.effects().await;

        h.dashboard.on_connect_click().await;
        assert_eq!(next_effect(&mut effects).await, DashboardEffect::CheckVpnPermission);
        assert_eq!(h.dashboard.state().get().vpn_status, VpnStatus::Disconnected);

        h.dashboard.on_permissions_result(true).await;
        let state = h.dashboard.state().get();
        assert_eq!(state.vpn_status, VpnStatus::Connecting);
        assert!(state.is_loading());
        assert_eq!(h.tunnel.starts.lock().unwrap().len(), 1);

        h.tunnel.emit(TunnelEvent::Status(VpnStatus::Connected));
        let state = h.settle(|s| s.vpn_status == VpnStatus::Connected).await;
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_tunnel_config_uses_preferences() {
        let h = harness(true);
        h.prefs.store_selected_city(&berlin()).unwrap();
        h.prefs.store_protocol(Protocol::V2Ray).unwrap();
        h.enter_with(ip("10.0.0.2")).await;

        h.dashboard.on_permissions_result(true).await;

        let starts = h.tunnel.starts.lock().unwrap();
        assert_eq!(starts[0].city, Some(berlin()));
        assert_eq!(starts[0].protocol, Protocol::V2Ray);
    }

    #[tokio::test]
    async fn test_disconnect_flow() {
        let h = harness(true);
        h.enter_with(ip("10.0.0.2")).await;
        h.dashboard.on_permissions_result(true).await;
        h.tunnel.emit(TunnelEvent::Status(VpnStatus::Connected));
        h.settle(|s| s.vpn_status == VpnStatus::Connected).await;

        h.dashboard.on_connect_click().await;
        assert_eq!(h.dashboard.state().get().vpn_status, VpnStatus::Disconnecting);
        assert_eq!(h.tunnel.stops.load(Ordering::SeqCst), 1);

        h.tunnel.emit(TunnelEvent::Status(VpnStatus::Disconnected));
        h.settle(|s| s.vpn_status == VpnStatus::Disconnected).await;
    }

    #[tokio::test]
    async fn test_failure_while_connecting_opens_alert() {
        let h = harness(true);
        h.enter_with(ip("10.0.0.2")).await;
        h.dashboard.on_permissions_result(true).await;

        h.tunnel.emit(TunnelEvent::Failed {
            reason: "handshake timeout".into(),
        });
        let state = h.settle(|s| s.is_error_alert_visible).await;
        assert_eq!(state.vpn_status, VpnStatus::Disconnected);
        assert!(!state.is_loading());
        assert_eq!(
            state.error,
            Some(DashboardError::ConnectionFailed("handshake timeout".into()))
        );

        h.dashboard.on_alert_dismiss_request();
        let state = h.dashboard.state().get();
        assert!(!state.is_error_alert_visible);
        assert_eq!(state.error, None);
        assert_eq!(state.vpn_status, VpnStatus::Disconnected);
        assert_eq!(state.ip_address, "10.0.0.2");
    }

    #[tokio::test]
    async fn test_start_error_opens_alert() {
        let h = harness(true);
        h.enter_with(ip("10.0.0.2")).await;
        *h.tunnel.start_error.lock().unwrap() = Some(TunnelError::StartFailed("no route".into()));

        h.dashboard.on_permissions_result(true).await;

        let state = h.dashboard.state().get();
        assert_eq!(state.vpn_status, VpnStatus::Disconnected);
        assert!(state.is_error_alert_visible);
    }

    #[tokio::test]
    async fn test_alert_confirm_retries() {
        let h = harness(true);
        h.enter_with(ip("10.0.0.2")).await;
        let mut effects = h.effects().await;

        h.dashboard.on_permissions_result(false).await;
        let state = h.dashboard.state().get();
        assert!(state.is_error_alert_visible);
        assert_eq!(state.error, Some(DashboardError::PermissionDenied));
        assert_eq!(state.vpn_status, VpnStatus::Disconnected);

        h.dashboard.on_alert_confirm_click();
        assert!(!h.dashboard.state().get().is_error_alert_visible);
        assert_eq!(next_effect(&mut effects).await, DashboardEffect::CheckVpnPermission);
    }

    #[tokio::test]
    async fn test_try_again() {
        let h = harness(true);
        let state = h.enter_with(Err(ApiError::Network("reset".into()))).await;
        assert_eq!(state.status, Status::Error { is_loading: false });

        let retry = {
            let dashboard = h.dashboard.clone();
            tokio::spawn(async move { dashboard.on_try_again_click().await })
        };
        let state = h.settle(|s| s.status == Status::Error { is_loading: true }).await;
        assert!(state.is_loading());

        // Repeated failure
        h.responses.send(Err(ApiError::Network("reset".into()))).unwrap();
        retry.await.unwrap();
        assert_eq!(h.dashboard.state().get().status, Status::Error { is_loading: false });

        // Success clears the error
        h.responses.send(ip("10.0.0.9")).unwrap();
        h.dashboard.on_try_again_click().await;
        let state = h.dashboard.state().get();
        assert_eq!(state.status, Status::Data);
        assert_eq!(state.ip_address, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_try_again_without_error_is_ignored() {
        let h = harness(true);
        h.enter_with(ip("10.0.0.2")).await;

        h.dashboard.on_try_again_click().await;
        assert_eq!(h.api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_outdated_blocks_actions() {
        let h = harness(true);
        let state = h.enter_with(Err(ApiError::Outdated)).await;
        assert!(state.is_outdated);
        let mut effects = h.effects().await;

        h.dashboard.on_connect_click().await;
        h.dashboard.on_settings_click();
        h.dashboard.on_select_server_click();
        h.dashboard.on_permissions_result(true).await;
        assert!(effects.try_recv().is_none());
        assert!(h.tunnel.starts.lock().unwrap().is_empty());

        h.dashboard.on_update_click();
        assert_eq!(next_effect(&mut effects).await, DashboardEffect::ShowGooglePlay);
    }

    #[tokio::test]
    async fn test_connect_on_terminal_screen_leaves_state_untouched() {
        let h = harness(true);
        h.enter_with(Err(ApiError::Banned)).await;
        tokio::task::yield_now().await;
        let version = h.dashboard.state().version();
        let mut states = h.dashboard.state().subscribe();
        states.next().await.unwrap();

        h.dashboard.on_connect_click().await;
        h.dashboard.on_permissions_result(true).await;

        assert_eq!(h.dashboard.state().version(), version);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), states.next())
                .await
                .is_err()
        );
        assert_eq!(h.tunnel.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_banned_blocks_actions() {
        let h = harness(true);
        let state = h.enter_with(Err(ApiError::Banned)).await;
        assert!(state.is_banned);

        h.dashboard.on_permissions_result(false).await;
        h.dashboard.on_try_again_click().await;

        let state = h.dashboard.state().get();
        assert!(!state.is_error_alert_visible);
        assert_eq!(state.vpn_status, VpnStatus::Disconnected);
        assert_eq!(h.api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_select_server_after_ad() {
        let h = harness(true);
        h.prefs.store_selected_city(&berlin()).unwrap();
        h.enter_with(ip("10.0.0.2")).await;
        h.settle(|s| s.selected_city.is_some()).await;
        let mut effects = h.effects().await;

        // Camera follows the stored city
        assert!(matches!(
            next_effect(&mut effects).await,
            DashboardEffect::ChangeMapPosition { zoom, .. } if zoom == 9.0
        ));

        h.dashboard.on_select_server_click();
        assert_eq!(
            next_effect(&mut effects).await,
            DashboardEffect::ShowSelectServer {
                selected_city: Some(berlin())
            }
        );
        assert_eq!(h.ads.presents.load(Ordering::SeqCst), 1);

        // Late duplicate callback
        h.dashboard.on_ad_shown();
        assert!(effects.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_select_server_dropped_when_screen_turns_fatal() {
        let gate = Arc::new(Notify::new());
        let h = harness_with_gate(true, Some(Arc::clone(&gate)));
        h.enter_with(Err(ApiError::Network("reset".into()))).await;
        let mut effects = h.effects().await;

        // Ad is on screen while the retry reports an outdated app
        h.dashboard.on_select_server_click();
        h.responses.send(Err(ApiError::Outdated)).unwrap();
        h.dashboard.on_try_again_click().await;
        assert!(h.dashboard.state().get().is_outdated);

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.ads.presents.load(Ordering::SeqCst), 1);
        assert!(effects.try_recv().is_none());

        h.dashboard.on_ad_shown();
        assert!(effects.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_ad_closing_on_terminal_screen_emits_nothing() {
        let gate = Arc::new(Notify::new());
        let h = harness_with_gate(true, Some(Arc::clone(&gate)));
        h.enter_with(ip("10.0.0.2")).await;
        let mut effects = h.effects().await;

        h.dashboard.on_select_server_click();
        h.dashboard.state().modify(|s| s.is_banned = true);

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(effects.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_select_server_without_ad_still_navigates() {
        let h = harness(false);
        h.enter_with(ip("10.0.0.2")).await;
        let mut effects = h.effects().await;

        h.dashboard.on_select_server_click();
        assert_eq!(
            next_effect(&mut effects).await,
            DashboardEffect::ShowSelectServer { selected_city: None }
        );
    }

    #[tokio::test]
    async fn test_select_server_disabled_while_loading() {
        let h = harness(true);
        h.dashboard.enter();
        let mut effects = h.effects().await;

        h.dashboard.on_select_server_click();
        tokio::task::yield_now().await;
        assert!(effects.try_recv().is_none());
        assert_eq!(h.ads.presents.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_map_follows_city_changes() {
        let h = harness(true);
        h.enter_with(ip("10.0.0.2")).await;
        let mut effects = h.effects().await;

        h.prefs.store_selected_city(&berlin()).unwrap();
        assert_eq!(
            next_effect(&mut effects).await,
            DashboardEffect::ChangeMapPosition {
                latitude: 52.52,
                longitude: 13.405,
                zoom: 9.0,
                duration: Duration::from_millis(2000),
            }
        );
        assert_eq!(h.dashboard.state().get().selected_city, Some(berlin()));
    }

    #[tokio::test]
    async fn test_result_after_leave_is_discarded() {
        let h = harness(true);
        h.enter_with(Err(ApiError::Network("reset".into()))).await;

        let retry = {
            let dashboard = h.dashboard.clone();
            tokio::spawn(async move { dashboard.on_try_again_click().await })
        };
        h.settle(|s| s.status == Status::Error { is_loading: true }).await;

        h.dashboard.leave();
        h.responses.send(ip("10.0.0.9")).unwrap();
        retry.await.unwrap();

        let state = h.dashboard.state().get();
        assert_eq!(state.ip_address, "");
        assert_eq!(state.status, Status::Error { is_loading: true });
    }

    #[tokio::test]
    async fn test_leave_stops_listening() {
        let h = harness(true);
        h.enter_with(ip("10.0.0.2")).await;
        h.dashboard.leave();

        let _ = h.tunnel.events.send(TunnelEvent::Status(VpnStatus::Connected));
        tokio::task::yield_now().await;
        assert_eq!(h.dashboard.state().get().vpn_status, VpnStatus::Disconnected);

        // Actions outside a session do nothing
        let mut effects = h.effects().await;
        h.dashboard.on_connect_click().await;
        assert!(effects.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_ui_actions_outside_session_are_ignored() {
        let h = harness(true);
        let mut effects = h.effects().await;
        let version = h.dashboard.state().version();

        h.dashboard.on_settings_click();
        h.dashboard.on_update_click();
        h.dashboard.on_alert_confirm_click();
        h.dashboard.on_alert_dismiss_request();

        assert!(effects.try_recv().is_none());
        assert_eq!(h.dashboard.state().version(), version);

        // Same after the session has ended
        h.enter_with(ip("10.0.0.2")).await;
        h.dashboard.on_permissions_result(false).await;
        assert!(h.dashboard.state().get().is_error_alert_visible);
        h.dashboard.leave();

        h.dashboard.on_alert_confirm_click();
        h.dashboard.on_settings_click();
        assert!(h.dashboard.state().get().is_error_alert_visible);
        assert!(effects.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_reenter_starts_fresh_session() {
        let h = harness(true);
        h.enter_with(ip("10.0.0.2")).await;
        h.dashboard.leave();

        let state = h.enter_with(ip("10.0.0.3")).await;
        assert_eq!(state.ip_address, "10.0.0.3");
        assert_eq!(h.ads.preloads.load(Ordering::SeqCst), 2);

        h.tunnel.emit(TunnelEvent::Status(VpnStatus::Connecting));
        h.settle(|s| s.vpn_status == VpnStatus::Connecting).await;
    }
}
