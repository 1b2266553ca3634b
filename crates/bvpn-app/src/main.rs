//! Based VPN: command-line driver
//!
//! Wires the screen coordinators to simulated collaborators and plays a
//! scripted session: walk through the intro on first launch, fetch the
//! session, connect (first handshake fails and is retried from the alert),
//! pick a city from the server list behind an interstitial, change DNS in
//! settings, copy logs, disconnect.
//!
//! Usage: `bvpn [config.toml|config.json]`

mod logs;
mod sim;

use anyhow::{anyhow, bail, Context, Result};
use bvpn_core::StateStore;
use bvpn_screens::{
    CitiesCoordinator, CitiesEffect, CountriesCoordinator, CountriesEffect, DashboardCoordinator,
    DashboardEffect, IntroCoordinator, IntroEffect, SettingsCoordinator, SettingsEffect,
    StartDestination, INTRO_PAGES,
};
use bvpn_vpn::{
    AdManager, AppConfig, CameraTarget, Dns, MapSurface, MemoryStore, PermissionFlow, Preferences,
    SelectedCity, TunnelManager, VpnStatus,
};
use logs::LogBuffer;
use sim::{SimAdVendor, SimApi, SimMap, SimPermission, SimTunnel};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type Dashboard = DashboardCoordinator<SimTunnel, SimApi, AdManager<SimAdVendor>>;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

fn load_config() -> Result<AppConfig> {
    match std::env::args().nth(1) {
        Some(path) => AppConfig::from_file(Path::new(&path))
            .with_context(|| format!("loading config from {path}")),
        None => Ok(AppConfig {
            debug: cfg!(debug_assertions),
            ..AppConfig::default()
        }),
    }
}

fn init_logging(config: &AppConfig, logs: LogBuffer) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_writer(logs)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))
}

/// Wait until a screen reaches a state matching `done`.
async fn settle<S: Clone + Send + 'static>(
    store: &StateStore<S>,
    what: &str,
    done: impl Fn(&S) -> bool,
) -> Result<S> {
    let mut states = store.subscribe();
    let reached = tokio::time::timeout(SETTLE_TIMEOUT, async {
        while let Some(state) = states.next().await {
            if done(&state) {
                return Some(state);
            }
        }
        None
    })
    .await;

    match reached {
        Ok(Some(state)) => Ok(state),
        Ok(None) => bail!("state stream ended while waiting for {what}"),
        Err(_) => bail!("timed out waiting for {what}"),
    }
}

/// First launch: page through the intro until it hands over to the dashboard.
async fn run_intro(prefs: &Preferences) -> Result<()> {
    let intro = IntroCoordinator::new(prefs.clone());
    let mut effects = intro.effects().attach().await;
    intro.enter();

    for _ in 0..INTRO_PAGES {
        intro.on_next_click();
    }
    match effects.try_recv() {
        Some(IntroEffect::ShowDashboard) => {
            info!(pages = INTRO_PAGES, "Intro finished");
            Ok(())
        }
        None => bail!("intro did not hand over to the dashboard"),
    }
}

/// Server list: pick `city_name` in `country_name`.
async fn browse_servers(api: Arc<SimApi>, prefs: Preferences, country_name: &str, city_name: &str) -> Result<()> {
    let countries = CountriesCoordinator::new(Arc::clone(&api));
    let mut country_effects = countries.effects().attach().await;
    countries.enter();

    let listed = settle(countries.state(), "countries", |s| !s.status.is_loading()).await?;
    let country = listed
        .countries
        .into_iter()
        .find(|c| c.name == country_name)
        .ok_or_else(|| anyhow!("{country_name} is not on the server list"))?;
    countries.on_country_click(country);
    let Some(CountriesEffect::ShowCitiesScreen { country }) = country_effects.recv().await else {
        bail!("countries screen closed");
    };
    countries.leave();

    let cities = CitiesCoordinator::new(api, prefs);
    let mut city_effects = cities.effects().attach().await;
    cities.enter(country);

    let listed = settle(cities.state(), "cities", |s| !s.status.is_loading()).await?;
    let city = listed
        .cities
        .into_iter()
        .find(|c| c.name == city_name)
        .ok_or_else(|| anyhow!("{city_name} has no servers"))?;
    info!(city = %city.name, servers = city.servers_available, "Picking city");
    cities.on_city_click(city);
    let Some(CitiesEffect::GoBackToRoot) = city_effects.recv().await else {
        bail!("cities screen closed");
    };
    cities.leave();
    Ok(())
}

/// Executes dashboard effects the way the UI layer would. Server list
/// navigation is handed to `navigation`.
async fn run_dashboard_effects(
    dashboard: Dashboard,
    tunnel: Arc<SimTunnel>,
    permission: SimPermission,
    map: SimMap,
    navigation: mpsc::UnboundedSender<Option<SelectedCity>>,
) {
    let mut effects = dashboard.effects().attach().await;

    while let Some(effect) = effects.recv().await {
        info!(effect = effect.kind(), "Handling effect");
        match effect {
            DashboardEffect::CheckVpnPermission => {
                let granted = match tunnel.permission_request() {
                    Some(request) => permission.request(request).await,
                    None => true,
                };
                dashboard.on_permissions_result(granted).await;
            }
            DashboardEffect::ShowSelectServer { selected_city } => {
                if navigation.send(selected_city).is_err() {
                    warn!("Server list navigation dropped");
                }
            }
            DashboardEffect::ShowSettings => info!("Settings opened"),
            DashboardEffect::ShowGooglePlay => info!("Store page opened"),
            DashboardEffect::ChangeMapPosition {
                latitude,
                longitude,
                zoom,
                duration,
            } => {
                map.animate_camera_to(CameraTarget {
                    latitude,
                    longitude,
                    zoom,
                    duration,
                })
                .await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let logs = LogBuffer::new(512);
    init_logging(&config, logs.clone())?;

    info!(version = %config.app_version, debug = config.debug, "Based VPN starting");
    info!("Using mimalloc allocator");

    let prefs = Preferences::new(Arc::new(MemoryStore::new()));
    match StartDestination::resolve(&prefs) {
        StartDestination::Intro => run_intro(&prefs).await?,
        StartDestination::Dashboard => debug!("Onboarding already done"),
    }

    let tunnel = SimTunnel::new(Duration::from_millis(800));
    let vendor = Arc::new(SimAdVendor::new(Duration::from_millis(400), Duration::from_millis(600)));
    let ads = Arc::new(AdManager::new(vendor, &config.ads, config.debug));
    let api = Arc::new(SimApi::new("185.65.134.10", Duration::from_millis(250)));

    let dashboard: Dashboard = DashboardCoordinator::new(
        Arc::clone(&tunnel),
        Arc::clone(&api),
        ads,
        prefs.clone(),
        config.map,
    );
    let settings = SettingsCoordinator::new(prefs.clone(), Arc::new(logs.clone()), &config);

    let (navigation, mut server_list) = mpsc::unbounded_channel();
    let handler = tokio::spawn(run_dashboard_effects(
        dashboard.clone(),
        Arc::clone(&tunnel),
        SimPermission::new(Arc::clone(&tunnel)),
        SimMap,
        navigation,
    ));

    dashboard.enter();
    let state = settle(dashboard.state(), "session info", |s| !s.is_loading()).await?;
    info!(ip = %state.ip_address, "Dashboard ready");

    // First attempt fails; retry from the alert
    tunnel.fail_next_handshake();
    dashboard.on_connect_click().await;
    settle(dashboard.state(), "error alert", |s| s.is_error_alert_visible).await?;
    dashboard.on_alert_confirm_click();
    settle(dashboard.state(), "connection", |s| s.vpn_status == VpnStatus::Connected).await?;

    dashboard.on_select_server_click();
    let current = tokio::time::timeout(SETTLE_TIMEOUT, server_list.recv())
        .await
        .context("waiting for the server list")?
        .ok_or_else(|| anyhow!("effect handler stopped"))?;
    info!(
        current = current.as_ref().map(|c| c.name.as_str()).unwrap_or("auto"),
        "Server list opened"
    );
    browse_servers(Arc::clone(&api), prefs.clone(), "Germany", "Berlin").await?;
    let state = settle(dashboard.state(), "city change", |s| s.selected_city.is_some()).await?;
    info!(city = ?state.selected_city.map(|c| c.name), "Dashboard follows selection");

    dashboard.on_settings_click();
    settings.enter();
    settings.on_dns_row_click();
    settings.on_dns_selected(Dns::Google);
    settings.on_telegram_click();
    settings.on_logs_row_click();

    let mut settings_effects = settings.effects().attach().await;
    for effect in settings_effects.drain() {
        match effect {
            SettingsEffect::OpenTelegram { url } => info!(%url, "Opening support channel"),
            SettingsEffect::CopyLogsToClipboard { logs } => {
                info!(lines = logs.lines().count(), "Logs copied to clipboard")
            }
        }
    }

    dashboard.on_connect_click().await;
    settle(dashboard.state(), "disconnect", |s| s.vpn_status == VpnStatus::Disconnected).await?;

    dashboard.leave();
    handler.abort();
    if let Err(e) = handler.await {
        if !e.is_cancelled() {
            warn!(error = %e, "Effect handler failed");
        }
    }

    info!("Based VPN shutting down");
    Ok(())
}
