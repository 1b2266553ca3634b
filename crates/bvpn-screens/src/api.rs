//! Backend calls made by the screens.

use bvpn_vpn::SelectedCity;
use std::future::Future;

/// Session information returned on dashboard entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Public IP address as seen by the backend
    pub ip_address: String,
}

/// Dashboard API errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// This app version is no longer supported
    #[error("App version is outdated")]
    Outdated,

    /// The device has been banned
    #[error("Device is banned")]
    Banned,

    #[error("Network error: {0}")]
    Network(String),
}

impl ApiError {
    /// Fatal errors replace the whole screen and cannot be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Outdated | ApiError::Banned)
    }
}

/// Dashboard backend
pub trait DashboardApi: Send + Sync + 'static {
    fn fetch_session(&self) -> impl Future<Output = Result<SessionInfo, ApiError>> + Send;
}

/// Country on the server list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub id: u32,
    pub name: String,
    /// ISO 3166 alpha-2 code; empty when the backend has no flag for it
    pub flag: String,
}

/// City with VPN servers
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub id: u32,
    pub country_id: u32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub servers_available: u32,
}

impl City {
    /// Selection record persisted for the dashboard and the tunnel.
    pub fn select(&self, country: &Country) -> SelectedCity {
        SelectedCity {
            id: self.id,
            name: self.name.clone(),
            country_id: country.id,
            country_name: country.name.clone(),
            country_flag: country.flag.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Server list backend
pub trait ServersApi: Send + Sync + 'static {
    fn fetch_countries(&self) -> impl Future<Output = Result<Vec<Country>, ApiError>> + Send;

    fn fetch_cities(&self, country_id: u32) -> impl Future<Output = Result<Vec<City>, ApiError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(ApiError::Outdated.is_fatal());
        assert!(ApiError::Banned.is_fatal());
        assert!(!ApiError::Network("reset".into()).is_fatal());
        assert_eq!(ApiError::Network("reset".into()).to_string(), "Network error: reset");
    }

    #[test]
    fn test_city_selection_carries_country() {
        let germany = Country {
            id: 49,
            name: "Germany".into(),
            flag: "DE".into(),
        };
        let city = City {
            id: 7,
            country_id: 49,
            name: "Berlin".into(),
            latitude: 52.52,
            longitude: 13.405,
            servers_available: 3,
        };

        let selected = city.select(&germany);
        assert_eq!(selected.country_name, "Germany");
        assert_eq!(selected.country_flag, "DE");
        assert_eq!((selected.latitude, selected.longitude), (52.52, 13.405));
    }
}
