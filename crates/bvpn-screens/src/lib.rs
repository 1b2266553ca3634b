//! Based VPN - Screen Coordinators
//!
//! One coordinator per screen. Each owns a [`StateStore`](bvpn_core::StateStore)
//! the UI renders from and an [`EffectQueue`](bvpn_core::EffectQueue) the UI
//! drains for one-shot commands (navigation, permission prompts, camera
//! moves, clipboard).
//!
//! - [`IntroCoordinator`]: first-launch pager; [`StartDestination`] picks the first screen
//! - [`DashboardCoordinator`]: connect/disconnect, server selection, session info
//! - [`CountriesCoordinator`], [`CitiesCoordinator`]: the server list
//! - [`SettingsCoordinator`]: DNS and protocol pickers, support links, log export

mod api;
mod cities;
mod countries;
mod dashboard;
mod intro;
mod settings;
mod status;

pub use api::{ApiError, City, Country, DashboardApi, ServersApi, SessionInfo};
pub use cities::{CitiesCoordinator, CitiesEffect, CitiesState};
pub use countries::{CountriesCoordinator, CountriesEffect, CountriesState};
pub use dashboard::{DashboardCoordinator, DashboardEffect, DashboardError, DashboardState};
pub use intro::{IntroCoordinator, IntroEffect, IntroState, StartDestination, INTRO_PAGES};
pub use settings::{LogSource, SettingsCoordinator, SettingsEffect, SettingsState};
pub use status::Status;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a coordinator mutex, recovering from poisoning.
pub(crate) fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
