//! Based VPN - Screen Coordination Core
//!
//! Building blocks shared by every screen coordinator:
//!
//! ```text
//!   user action ──▶ Coordinator ──▶ StateStore ──▶ UI re-render
//!                       │
//!                       ├──────────▶ EffectQueue ──▶ UI / platform (once each)
//!                       │
//!                       └──────────▶ SingleFlightCache ──▶ vendor (callback API)
//!                                          ▲
//!                                          └── CallbackBridge (resume exactly once)
//! ```
//!
//! # Guarantees
//!
//! - **StateStore**: linearized updates, every snapshot fanned out in order
//! - **EffectQueue**: FIFO, exactly-once delivery, buffered while detached
//! - **SingleFlightCache**: one vendor load at a time, shared outcome
//! - **SessionScope**: results from torn-down sessions are discarded

mod bridge;
mod cache;
mod effects;
mod session;
mod store;

pub use bridge::{bridge, BridgeConfig, BridgeError, Pending, Resumer};
pub use cache::{
    AcquireError, CachePhase, LoadCallback, LoadError, ResourceLoader, SingleFlightCache,
};
pub use effects::{EffectConsumer, EffectQueue};
pub use session::{SessionScope, SessionToken};
pub use store::{StateStore, StateStream};
