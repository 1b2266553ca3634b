//! Countries Coordinator
//!
//! First step of the server list. The country list is fetched once per
//! session; a failed fetch can be retried from the error view.

use crate::api::{ApiError, Country, ServersApi};
use crate::lock;
use crate::status::Status;
use bvpn_core::{EffectQueue, SessionScope, SessionToken, StateStore};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Countries snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CountriesState {
    pub status: Status,
    pub countries: Vec<Country>,
}

/// One-shot commands for the countries UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountriesEffect {
    ShowCitiesScreen { country: Country },
}

struct Inner<A> {
    store: StateStore<CountriesState>,
    effects: EffectQueue<CountriesEffect>,
    scope: SessionScope,
    session: Mutex<Option<SessionToken>>,
    api: Arc<A>,
}

/// Countries screen coordinator
pub struct CountriesCoordinator<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for CountriesCoordinator<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ServersApi> CountriesCoordinator<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: StateStore::default(),
                effects: EffectQueue::new(),
                scope: SessionScope::new(),
                session: Mutex::new(None),
                api,
            }),
        }
    }

    pub fn state(&self) -> &StateStore<CountriesState> {
        &self.inner.store
    }

    pub fn effects(&self) -> &EffectQueue<CountriesEffect> {
        &self.inner.effects
    }

    fn token(&self) -> Option<SessionToken> {
        lock(&self.inner.session).clone()
    }

    /// Start a screen session and fetch the list. Must be called from within
    /// a tokio runtime.
    pub fn enter(&self) {
        let token = self.inner.scope.begin();
        *lock(&self.inner.session) = Some(token.clone());
        self.inner.store.modify(|s| {
            if s.countries.is_empty() {
                s.status = Status::Loading;
            }
        });

        let this = self.clone();
        let fetch_token = token.clone();
        self.inner.scope.spawn(&token, async move {
            let result = this.inner.api.fetch_countries().await;
            fetch_token.apply(|| this.apply_countries(result));
        });
    }

    pub fn leave(&self) {
        lock(&self.inner.session).take();
        self.inner.scope.end();
    }

    fn apply_countries(&self, result: Result<Vec<Country>, ApiError>) {
        match result {
            Ok(countries) => {
                info!(count = countries.len(), "Countries loaded");
                self.inner.store.modify(|s| {
                    s.status = Status::Data;
                    s.countries = countries;
                });
            }
            Err(e) => {
                warn!(error = %e, "Countries fetch failed");
                self.inner
                    .store
                    .modify(|s| s.status = Status::Error { is_loading: false });
            }
        }
    }

    pub fn on_country_click(&self, country: Country) {
        if self.token().is_none() {
            debug!("Country click outside a session ignored");
            return;
        }
        debug!(country = %country.name, "Opening cities");
        self.inner
            .effects
            .emit(CountriesEffect::ShowCitiesScreen { country });
    }

    /// Retry the failed fetch.
    pub async fn on_try_again_click(&self) {
        let Some(token) = self.token() else { return };

        let mut retry = false;
        self.inner.store.modify(|s| {
            if s.status == (Status::Error { is_loading: false }) {
                s.status = Status::Error { is_loading: true };
                retry = true;
            }
        });
        if !retry {
            return;
        }

        let result = self.inner.api.fetch_countries().await;
        token.apply(|| self.apply_countries(result));
    }
}
