//! Settings Coordinator
//!
//! DNS and protocol pickers persisted through [`Preferences`], plus the
//! support link and the copy-logs row.

use bvpn_core::{EffectQueue, StateStore};
use bvpn_vpn::{AppConfig, Dns, Preferences, Protocol};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Recent application logs
pub trait LogSource: Send + Sync + 'static {
    /// Recent log lines, oldest first, newline separated.
    fn recent_logs(&self) -> String;
}

/// Settings snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsState {
    pub current_dns: Dns,
    pub dns_options: Vec<Dns>,
    pub is_dns_selector_visible: bool,
    pub current_protocol: Protocol,
    pub protocol_options: Vec<Protocol>,
    pub is_protocol_selector_visible: bool,
    pub app_version: String,
}

/// One-shot commands for the settings UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsEffect {
    OpenTelegram { url: String },
    CopyLogsToClipboard { logs: String },
}

/// Settings screen coordinator
pub struct SettingsCoordinator<L> {
    store: StateStore<SettingsState>,
    effects: EffectQueue<SettingsEffect>,
    prefs: Preferences,
    logs: Arc<L>,
    telegram_url: String,
}

impl<L: LogSource> SettingsCoordinator<L> {
    pub fn new(prefs: Preferences, logs: Arc<L>, config: &AppConfig) -> Self {
        let state = SettingsState {
            current_dns: prefs.dns(),
            dns_options: Dns::all().to_vec(),
            is_dns_selector_visible: false,
            current_protocol: prefs.protocol(),
            protocol_options: Protocol::all().to_vec(),
            is_protocol_selector_visible: false,
            app_version: config.app_version.clone(),
        };

        Self {
            store: StateStore::new(state),
            effects: EffectQueue::new(),
            prefs,
            logs,
            telegram_url: config.telegram_url.clone(),
        }
    }

    pub fn state(&self) -> &StateStore<SettingsState> {
        &self.store
    }

    pub fn effects(&self) -> &EffectQueue<SettingsEffect> {
        &self.effects
    }

    /// Screen became visible: reload persisted selections.
    pub fn enter(&self) {
        let dns = self.prefs.dns();
        let protocol = self.prefs.protocol();
        self.store.modify(|s| {
            s.current_dns = dns;
            s.current_protocol = protocol;
        });
    }

    pub fn on_dns_row_click(&self) {
        self.store.modify(|s| s.is_dns_selector_visible = true);
    }

    pub fn on_dns_dialog_dismiss_click(&self) {
        self.store.modify(|s| s.is_dns_selector_visible = false);
    }

    pub fn on_dns_selected(&self, dns: Dns) {
        info!(?dns, "DNS selected");
        let stored = match self.prefs.store_dns(dns) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "DNS selection not saved");
                false
            }
        };
        self.store.modify(|s| {
            if stored {
                s.current_dns = dns;
            }
            s.is_dns_selector_visible = false;
        });
    }

    pub fn on_protocol_row_click(&self) {
        self.store.modify(|s| s.is_protocol_selector_visible = true);
    }

    pub fn on_protocol_dialog_dismiss_click(&self) {
        self.store.modify(|s| s.is_protocol_selector_visible = false);
    }

    pub fn on_protocol_selected(&self, protocol: Protocol) {
        info!(?protocol, "Protocol selected");
        let stored = match self.prefs.store_protocol(protocol) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Protocol selection not saved");
                false
            }
        };
        self.store.modify(|s| {
            if stored {
                s.current_protocol = protocol;
            }
            s.is_protocol_selector_visible = false;
        });
    }

    pub fn on_telegram_click(&self) {
        self.effects.emit(SettingsEffect::OpenTelegram {
            url: self.telegram_url.clone(),
        });
    }

    pub fn on_logs_row_click(&self) {
        let logs = self.logs.recent_logs();
        debug!(bytes = logs.len(), "Copying logs");
        self.effects.emit(SettingsEffect::CopyLogsToClipboard { logs });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bvpn_vpn::{KeyValueStore, MemoryStore};

    struct FixedLogs;

    impl LogSource for FixedLogs {
        fn recent_logs(&self) -> String {
            "INFO Tunnel status\nWARN Tunnel failed".to_string()
        }
    }

    fn settings() -> (Arc<MemoryStore>, SettingsCoordinator<FixedLogs>) {
        let store = Arc::new(MemoryStore::new());
        let prefs = Preferences::new(store.clone());
        let config = AppConfig {
            app_version: "1.4.0".into(),
            ..AppConfig::default()
        };
        (store, SettingsCoordinator::new(prefs, Arc::new(FixedLogs), &config))
    }

    #[test]
    fn test_initial_state() {
        let (_, settings) = settings();
        let state = settings.state().get();

        assert_eq!(state.current_dns, Dns::Cloudflare);
        assert_eq!(state.current_protocol, Protocol::WireGuard);
        assert_eq!(state.dns_options.len(), 3);
        assert_eq!(state.app_version, "1.4.0");
        assert!(!state.is_dns_selector_visible);
    }

    #[test]
    fn test_dns_dialog() {
        let (store, settings) = settings();

        settings.on_dns_row_click();
        assert!(settings.state().get().is_dns_selector_visible);

        settings.on_dns_selected(Dns::Google);
        let state = settings.state().get();
        assert_eq!(state.current_dns, Dns::Google);
        assert!(!state.is_dns_selector_visible);
        assert_eq!(store.get("dns").as_deref(), Some("\"google\""));

        settings.on_dns_row_click();
        settings.on_dns_dialog_dismiss_click();
        let state = settings.state().get();
        assert_eq!(state.current_dns, Dns::Google);
        assert!(!state.is_dns_selector_visible);
    }

    #[test]
    fn test_protocol_dialog() {
        let (_, settings) = settings();

        settings.on_protocol_row_click();
        settings.on_protocol_selected(Protocol::V2Ray);

        let state = settings.state().get();
        assert_eq!(state.current_protocol, Protocol::V2Ray);
        assert!(!state.is_protocol_selector_visible);
    }

    #[test]
    fn test_enter_reloads_preferences() {
        let (store, settings) = settings();
        store.set("protocol", "\"none\"".into());

        settings.enter();
        assert_eq!(settings.state().get().current_protocol, Protocol::None);
    }

    #[tokio::test]
    async fn test_effects() {
        let (_, settings) = settings();
        let mut effects = settings.effects().attach().await;

        settings.on_telegram_click();
        settings.on_logs_row_click();

        assert_eq!(
            effects.drain(),
            vec![
                SettingsEffect::OpenTelegram {
                    url: "https://t.me/bagimsizdvpn".into()
                },
                SettingsEffect::CopyLogsToClipboard {
                    logs: "INFO Tunnel status\nWARN Tunnel failed".into()
                },
            ]
        );
    }
}
