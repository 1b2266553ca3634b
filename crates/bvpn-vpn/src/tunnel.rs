//! Tunnel Manager Contract
//!
//! The tunnel itself (WireGuard / V2Ray) is driven by an external library.
//! The app only starts and stops it, listens to its status, and asks the
//! platform for the VPN permission when the OS requires one.

use crate::prefs::{Dns, Protocol, SelectedCity};
use std::future::Future;
use tokio::sync::broadcast;

/// VPN connection status as reported by the tunnel library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VpnStatus {
    /// No tunnel
    #[default]
    Disconnected,
    /// Tunnel is being established
    Connecting,
    /// Tunnel is up
    Connected,
    /// Tunnel is being torn down
    Disconnecting,
}

impl VpnStatus {
    /// Check if the tunnel is usable
    pub fn is_connected(&self) -> bool {
        matches!(self, VpnStatus::Connected)
    }

    /// Check if the tunnel is between two stable states
    pub fn is_transitioning(&self) -> bool {
        matches!(self, VpnStatus::Connecting | VpnStatus::Disconnecting)
    }
}

/// Event published by the tunnel library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// Status changed
    Status(VpnStatus),
    /// The tunnel failed unexpectedly
    Failed { reason: String },
}

/// What the tunnel should connect to
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelConfig {
    /// Target city, `None` lets the backend pick one
    pub city: Option<SelectedCity>,
    /// Tunnel protocol
    pub protocol: Protocol,
    /// DNS resolver inside the tunnel
    pub dns: Dns,
}

/// Opaque platform intent that must be launched before the first start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub action: String,
}

/// Tunnel errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TunnelError {
    #[error("VPN permission not granted")]
    PermissionMissing,

    #[error("Tunnel already running")]
    AlreadyRunning,

    #[error("Tunnel start failed: {0}")]
    StartFailed(String),

    #[error("Tunnel stop failed: {0}")]
    StopFailed(String),
}

/// External tunnel manager
pub trait TunnelManager: Send + Sync + 'static {
    /// Request a tunnel start. Progress arrives through [`subscribe`](Self::subscribe).
    fn start(&self, config: TunnelConfig) -> impl Future<Output = Result<(), TunnelError>> + Send;

    /// Request a tunnel stop.
    fn stop(&self) -> impl Future<Output = Result<(), TunnelError>> + Send;

    /// Current status, for observers that attach late.
    fn status(&self) -> VpnStatus;

    /// Subscribe to status changes and failures.
    fn subscribe(&self) -> broadcast::Receiver<TunnelEvent>;

    /// Platform permission intent, or `None` if already granted.
    fn permission_request(&self) -> Option<PermissionRequest>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpn_status() {
        assert!(VpnStatus::Connected.is_connected());
        assert!(!VpnStatus::Disconnected.is_connected());
        assert!(VpnStatus::Connecting.is_transitioning());
        assert!(VpnStatus::Disconnecting.is_transitioning());
        assert_eq!(VpnStatus::default(), VpnStatus::Disconnected);
    }

    #[test]
    fn test_error_display() {
        let err = TunnelError::StartFailed("handshake timeout".into());
        assert_eq!(err.to_string(), "Tunnel start failed: handshake timeout");
    }
}
