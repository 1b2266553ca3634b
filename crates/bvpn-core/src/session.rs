//! Screen sessions and the stale-result guard.
//!
//! A coordinator opens a session when its screen becomes active and closes
//! it when the screen leaves. Each session has a generation number; async
//! work captures a [`SessionToken`] when it is issued and applies its result
//! through [`SessionToken::apply`], which runs only while that generation is
//! still the active one.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use tracing::{debug, info};

#[derive(Default)]
struct ScopeState {
    /// Generation of the active session, `None` between sessions
    active: Option<u64>,
    /// Last generation handed out
    last: u64,
    /// Tasks spawned on behalf of the active session
    tasks: Vec<AbortHandle>,
}

/// Session lifecycle owner for one screen.
#[derive(Clone, Default)]
pub struct SessionScope {
    state: Arc<Mutex<ScopeState>>,
}

impl SessionScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new session, closing the previous one if still active.
    pub fn begin(&self) -> SessionToken {
        let mut state = self.lock();
        Self::close(&mut state);
        state.last += 1;
        state.active = Some(state.last);
        info!(generation = state.last, "Screen session started");

        SessionToken {
            generation: state.last,
            scope: self.clone(),
        }
    }

    /// Close the active session and abort its tasks.
    pub fn end(&self) {
        let mut state = self.lock();
        Self::close(&mut state);
    }

    fn close(state: &mut ScopeState) {
        if let Some(generation) = state.active.take() {
            let aborted = state.tasks.len();
            for task in state.tasks.drain(..) {
                task.abort();
            }
            info!(generation, aborted, "Screen session ended");
        }
    }

    /// Generation of the active session.
    pub fn active_generation(&self) -> Option<u64> {
        self.lock().active
    }

    /// Spawn `future` on behalf of `token`'s session.
    ///
    /// The task is aborted when the session ends. If the session already
    /// ended, nothing is spawned.
    pub fn spawn<F>(&self, token: &SessionToken, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.lock();
        if state.active != Some(token.generation) {
            debug!(generation = token.generation, "Not spawning task for closed session");
            return;
        }
        state.tasks.retain(|task| !task.is_finished());
        state.tasks.push(tokio::spawn(future).abort_handle());
    }
}

/// Generation token captured by async work at issue time.
#[derive(Clone)]
pub struct SessionToken {
    generation: u64,
    scope: SessionScope,
}

impl SessionToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Is this token's session still the active one?
    pub fn is_current(&self) -> bool {
        self.scope.lock().active == Some(self.generation)
    }

    /// Run `apply` only if this token's session is still active.
    ///
    /// The check and `apply` happen under the scope lock, so a session
    /// cannot end between them. `apply` must not call back into the scope
    /// (begin, end or spawn).
    pub fn apply<R>(&self, apply: impl FnOnce() -> R) -> Option<R> {
        let state = self.scope.lock();
        if state.active == Some(self.generation) {
            Some(apply())
        } else {
            debug!(
                generation = self.generation,
                active = ?state.active,
                "Discarding stale result"
            );
            None
        }
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("generation", &self.generation)
            .finish()
    }
}
