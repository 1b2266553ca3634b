//! Intro Coordinator
//!
//! Onboarding pager shown on first launch. Opening it marks onboarding as
//! shown, so the next launch starts on the dashboard.

use bvpn_core::{EffectQueue, StateStore};
use bvpn_vpn::Preferences;
use tracing::info;

/// Number of intro pages
pub const INTRO_PAGES: usize = 3;

/// First screen of the app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDestination {
    Intro,
    Dashboard,
}

impl StartDestination {
    pub fn resolve(prefs: &Preferences) -> Self {
        if prefs.is_onboarding_shown() {
            StartDestination::Dashboard
        } else {
            StartDestination::Intro
        }
    }
}

/// Intro snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntroState {
    pub page: usize,
}

impl IntroState {
    /// Last page; the button reads "Get started".
    pub fn is_last_page(&self) -> bool {
        self.page + 1 >= INTRO_PAGES
    }
}

/// One-shot commands for the intro UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroEffect {
    /// Replace the intro with the dashboard
    ShowDashboard,
}

/// Intro screen coordinator
pub struct IntroCoordinator {
    store: StateStore<IntroState>,
    effects: EffectQueue<IntroEffect>,
    prefs: Preferences,
}

impl IntroCoordinator {
    pub fn new(prefs: Preferences) -> Self {
        Self {
            store: StateStore::default(),
            effects: EffectQueue::new(),
            prefs,
        }
    }

    pub fn state(&self) -> &StateStore<IntroState> {
        &self.store
    }

    pub fn effects(&self) -> &EffectQueue<IntroEffect> {
        &self.effects
    }

    pub fn enter(&self) {
        if !self.prefs.is_onboarding_shown() {
            info!("Onboarding shown");
            self.prefs.on_onboarding_shown();
        }
    }

    /// Pager swiped by the user
    pub fn on_page_changed(&self, page: usize) {
        self.store.modify(|s| s.page = page.min(INTRO_PAGES - 1));
    }

    /// "Next" advances the pager; on the last page it opens the dashboard.
    pub fn on_next_click(&self) {
        if self.store.get().is_last_page() {
            self.effects.emit(IntroEffect::ShowDashboard);
        } else {
            self.store.modify(|s| s.page += 1);
        }
    }
}
