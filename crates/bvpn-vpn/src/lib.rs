//! Based VPN - Collaborator Contracts
//!
//! Everything the screen coordinators talk to, expressed as narrow
//! interfaces plus the small amount of logic that sits on our side of
//! each boundary.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Screen coordinators                  │
//! └───────┬──────────────┬──────────────┬──────────────┬─────┘
//!         │              │              │              │
//!   ┌─────▼─────┐  ┌─────▼─────┐  ┌─────▼─────┐  ┌─────▼─────┐
//!   │  Tunnel   │  │ AdManager │  │Preferences│  │ Platform  │
//!   │  Manager  │  │(1-flight) │  │ (KV store)│  │ map/perm  │
//!   └───────────┘  └─────┬─────┘  └───────────┘  └───────────┘
//!                        │ callbacks
//!                  ┌─────▼─────┐
//!                  │ AdVendor  │
//!                  └───────────┘
//! ```
//!
//! The tunnel protocol, the ad SDK and the platform UI live outside this
//! workspace; only their contracts are defined here.

mod ads;
mod config;
mod platform;
mod prefs;
mod storage;
mod tunnel;

pub use ads::{AdLoader, AdManager, AdVendor, Interstitial, ShowCallback, ShowError};
pub use config::{AdConfig, AppConfig, ConfigError, ConfigFormat, MapConfig};
pub use platform::{CameraTarget, MapSurface, PermissionFlow};
pub use prefs::{Dns, Preferences, Protocol, SelectedCity};
pub use storage::{KeyValueStore, MemoryStore, StorageError, ValueStream};
pub use tunnel::{PermissionRequest, TunnelConfig, TunnelError, TunnelEvent, TunnelManager, VpnStatus};
