//! Camera contract consumed by the capture loop.
//!
//! A [`CameraDevice`] opens a [`VideoStream`]; the stream hands out its most
//! recent frame on demand and releases its tracks on [`VideoStream::stop`].

pub mod snapshot;

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

pub use snapshot::SnapshotCamera;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Facing {
    Environment,
    User,
}

/// Preferred stream parameters. Devices treat these as hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing: Facing::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
            frame_rate: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FocusMode {
    Continuous,
    SingleShot,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    pub focus_modes: Vec<FocusMode>,
    pub zoom: Option<ZoomRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSettings {
    pub focus_mode: Option<FocusMode>,
    pub zoom: Option<f64>,
}

impl TrackSettings {
    pub fn is_empty(&self) -> bool {
        self.focus_mode.is_none() && self.zoom.is_none()
    }
}

/// Continuous autofocus and a mid-range zoom, for whatever the track supports.
pub fn preferred_settings(capabilities: &CameraCapabilities) -> TrackSettings {
    TrackSettings {
        focus_mode: capabilities
            .focus_modes
            .contains(&FocusMode::Continuous)
            .then_some(FocusMode::Continuous),
        zoom: capabilities
            .zoom
            .filter(|range| range.max > range.min)
            .map(|range| range.min + (range.max - range.min) / 2.0),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("no camera source configured")]
    NotConfigured,

    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[error("camera rejected settings: {0}")]
    Unsupported(String),

    #[error("camera stream already stopped")]
    Stopped,

    #[error("frame read failed: {0}")]
    Read(String),
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, constraints: &CameraConstraints)
        -> Result<Box<dyn VideoStream>, CameraError>;
}

#[async_trait]
pub trait VideoStream: Send {
    fn capabilities(&self) -> CameraCapabilities;

    async fn apply(&mut self, settings: &TrackSettings) -> Result<(), CameraError>;

    /// `Ok(None)` while the device has nothing decodable yet.
    async fn latest_frame(&mut self) -> Result<Option<DynamicImage>, CameraError>;

    /// Stop every track. Idempotent.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}
