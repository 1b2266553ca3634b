//! Cities Coordinator
//!
//! Second step of the server list. Picking a city persists it through
//! [`Preferences`]; the dashboard follows the stored selection, so the
//! screen only has to navigate back to the root.

use crate::api::{ApiError, City, Country, ServersApi};
use crate::lock;
use crate::status::Status;
use bvpn_core::{EffectQueue, SessionScope, SessionToken, StateStore};
use bvpn_vpn::Preferences;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Cities snapshot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CitiesState {
    pub status: Status,
    pub country: Option<Country>,
    pub cities: Vec<City>,
}

/// One-shot commands for the cities UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitiesEffect {
    /// Close the server list and return to the dashboard
    GoBackToRoot,
}

struct Inner<A> {
    store: StateStore<CitiesState>,
    effects: EffectQueue<CitiesEffect>,
    scope: SessionScope,
    session: Mutex<Option<SessionToken>>,
    api: Arc<A>,
    prefs: Preferences,
}

/// Cities screen coordinator
pub struct CitiesCoordinator<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for CitiesCoordinator<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ServersApi> CitiesCoordinator<A> {
    pub fn new(api: Arc<A>, prefs: Preferences) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: StateStore::default(),
                effects: EffectQueue::new(),
                scope: SessionScope::new(),
                session: Mutex::new(None),
                api,
                prefs,
            }),
        }
    }

    pub fn state(&self) -> &StateStore<CitiesState> {
        &self.inner.store
    }

    pub fn effects(&self) -> &EffectQueue<CitiesEffect> {
        &self.inner.effects
    }

    fn token(&self) -> Option<SessionToken> {
        lock(&self.inner.session).clone()
    }

    /// Show the cities of `country`. Must be called from within a tokio
    /// runtime.
    pub fn enter(&self, country: Country) {
        let token = self.inner.scope.begin();
        *lock(&self.inner.session) = Some(token.clone());

        let country_id = country.id;
        self.inner.store.update(|_| CitiesState {
            status: Status::Loading,
            country: Some(country),
            cities: Vec::new(),
        });

        let this = self.clone();
        let fetch_token = token.clone();
        self.inner.scope.spawn(&token, async move {
            let result = this.inner.api.fetch_cities(country_id).await;
            fetch_token.apply(|| this.apply_cities(result));
        });
    }

    pub fn leave(&self) {
        lock(&self.inner.session).take();
        self.inner.scope.end();
    }

    fn apply_cities(&self, result: Result<Vec<City>, ApiError>) {
        match result {
            Ok(cities) => {
                info!(count = cities.len(), "Cities loaded");
                self.inner.store.modify(|s| {
                    s.status = Status::Data;
                    s.cities = cities;
                });
            }
            Err(e) => {
                warn!(error = %e, "Cities fetch failed");
                self.inner
                    .store
                    .modify(|s| s.status = Status::Error { is_loading: false });
            }
        }
    }

    /// Persist the pick and return to the dashboard.
    ///
    /// A failed write is logged; the dashboard then keeps its previous city.
    pub fn on_city_click(&self, city: City) {
        if self.token().is_none() {
            debug!("City click outside a session ignored");
            return;
        }
        let Some(country) = self.inner.store.get().country else {
            return;
        };

        info!(city = %city.name, country = %country.name, "City selected");
        if let Err(e) = self.inner.prefs.store_selected_city(&city.select(&country)) {
            warn!(error = %e, "City selection not saved");
        }
        self.inner.effects.emit(CitiesEffect::GoBackToRoot);
    }

    /// Retry the failed fetch.
    pub async fn on_try_again_click(&self) {
        let Some(token) = self.token() else { return };

        let mut country_id = None;
        self.inner.store.modify(|s| {
            if s.status == (Status::Error { is_loading: false }) {
                s.status = Status::Error { is_loading: true };
                country_id = s.country.as_ref().map(|c| c.id);
            }
        });
        let Some(country_id) = country_id else { return };

        let result = self.inner.api.fetch_cities(country_id).await;
        token.apply(|| self.apply_cities(result));
    }
}
