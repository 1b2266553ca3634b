//! Platform surfaces consumed by effect handlers: the map view and the
//! OS permission flow.

use crate::tunnel::PermissionRequest;
use std::future::Future;
use std::time::Duration;

/// Camera animation target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTarget {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub duration: Duration,
}

/// Map view
pub trait MapSurface: Send + Sync + 'static {
    /// Fly the camera to `target`; resolves when the animation completes.
    fn animate_camera_to(&self, target: CameraTarget) -> impl Future<Output = ()> + Send;
}

/// OS permission prompt
pub trait PermissionFlow: Send + Sync + 'static {
    /// Launch the prompt; resolves to `true` if the user granted it.
    fn request(&self, request: PermissionRequest) -> impl Future<Output = bool> + Send;
}
