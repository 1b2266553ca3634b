//! Typed Preferences
//!
//! Typed accessors over the [`KeyValueStore`]. Structured values are stored
//! as JSON; a value that fails to decode reads as "not set".

use crate::storage::{KeyValueStore, StorageError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

const KEY_SELECTED_CITY: &str = "selected_city";
const KEY_ONBOARDING_SHOWN: &str = "onboarding_shown";
const KEY_DNS: &str = "dns";
const KEY_PROTOCOL: &str = "protocol";

/// City the user picked on the server list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCity {
    pub id: u32,
    pub name: String,
    pub country_id: u32,
    pub country_name: String,
    /// Country flag code (ISO 3166 alpha-2)
    pub country_flag: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// DNS resolver used inside the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dns {
    #[default]
    Cloudflare,
    Google,
    Handshake,
}

impl Dns {
    /// All selectable resolvers, in display order
    pub fn all() -> &'static [Dns] {
        &[Dns::Cloudflare, Dns::Google, Dns::Handshake]
    }

    /// Resolver address
    pub fn address(&self) -> &'static str {
        match self {
            Dns::Cloudflare => "1.1.1.1",
            Dns::Google => "8.8.8.8",
            Dns::Handshake => "103.196.38.38",
        }
    }
}

/// Tunnel protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    WireGuard,
    V2Ray,
    /// Let the backend decide
    None,
}

impl Protocol {
    /// All selectable protocols, in display order
    pub fn all() -> &'static [Protocol] {
        &[Protocol::WireGuard, Protocol::V2Ray, Protocol::None]
    }
}

/// Typed preferences
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Has the intro screen been completed on this device?
    pub fn is_onboarding_shown(&self) -> bool {
        self.store.get(KEY_ONBOARDING_SHOWN).as_deref() == Some("true")
    }

    pub fn on_onboarding_shown(&self) {
        self.store.set(KEY_ONBOARDING_SHOWN, "true".to_string());
    }

    pub fn selected_city(&self) -> Option<SelectedCity> {
        self.read_json(KEY_SELECTED_CITY)
    }

    pub fn store_selected_city(&self, city: &SelectedCity) -> Result<(), StorageError> {
        self.write_json(KEY_SELECTED_CITY, city)
    }

    /// Selected city now and after every change. Undecodable values read as `None`.
    pub fn observe_selected_city(&self) -> impl Stream<Item = Option<SelectedCity>> + Send + Unpin + use<> {
        self.store.observe(KEY_SELECTED_CITY).map(|raw| {
            raw.and_then(|json| match serde_json::from_str(&json) {
                Ok(city) => Some(city),
                Err(e) => {
                    warn!(error = %e, "Stored city is not decodable");
                    None
                }
            })
        })
    }

    pub fn dns(&self) -> Dns {
        self.read_json(KEY_DNS).unwrap_or_default()
    }

    pub fn store_dns(&self, dns: Dns) -> Result<(), StorageError> {
        self.write_json(KEY_DNS, &dns)
    }

    pub fn protocol(&self) -> Protocol {
        self.read_json(KEY_PROTOCOL).unwrap_or_default()
    }

    pub fn store_protocol(&self, protocol: Protocol) -> Result<(), StorageError> {
        self.write_json(KEY_PROTOCOL, &protocol)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        serde_json::from_str(&raw)
            .map_err(|e| {
                let err = StorageError::Decode {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                warn!("{}", err);
            })
            .ok()
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value).map_err(|e| StorageError::Encode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(key, json);
        Ok(())
    }
}
