use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use image::DynamicImage;
use log::{debug, info};

use super::{
    CameraCapabilities, CameraConstraints, CameraDevice, CameraError, TrackSettings, VideoStream,
};

/// Upper bound for one snapshot GET or file read.
pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    /// IP camera still endpoint returning one JPEG/PNG per GET.
    Http(String),
    /// Image file kept fresh by an external grabber.
    File(PathBuf),
}

impl SnapshotSource {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            SnapshotSource::Http(trimmed.to_string())
        } else {
            SnapshotSource::File(PathBuf::from(trimmed))
        }
    }
}

/// Polls a still-image source each time a frame is requested. Has no focus
/// or zoom controls, so capability negotiation always comes back empty.
pub struct SnapshotCamera {
    source: SnapshotSource,
    client: reqwest::Client,
    timeout: Duration,
}

impl SnapshotCamera {
    pub fn new(source: SnapshotSource) -> Result<Self, CameraError> {
        Self::with_timeout(source, SNAPSHOT_TIMEOUT)
    }

    fn with_timeout(source: SnapshotSource, timeout: Duration) -> Result<Self, CameraError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|err| CameraError::Unavailable(format!("http client: {err}")))?;
        Ok(Self {
            source,
            client,
            timeout,
        })
    }

    pub fn from_setting(source: Option<&str>) -> Result<Self, CameraError> {
        match source.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Self::new(SnapshotSource::parse(raw)),
            None => Err(CameraError::NotConfigured),
        }
    }
}

#[async_trait]
impl CameraDevice for SnapshotCamera {
    async fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn VideoStream>, CameraError> {
        match &self.source {
            SnapshotSource::Http(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|err| CameraError::Unavailable(format!("{url}: {err}")))?;
                if !response.status().is_success() {
                    return Err(CameraError::Unavailable(format!(
                        "{url}: HTTP {}",
                        response.status().as_u16()
                    )));
                }
            }
            SnapshotSource::File(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(CameraError::Unavailable(format!(
                        "{} does not exist",
                        path.display()
                    )));
                }
            }
        }

        info!(
            "Snapshot camera opened ({:?}); wants {:?} {}x{}@{}fps, source decides actual size",
            self.source,
            constraints.facing,
            constraints.ideal_width,
            constraints.ideal_height,
            constraints.frame_rate
        );

        Ok(Box::new(SnapshotStream {
            source: self.source.clone(),
            client: self.client.clone(),
            timeout: self.timeout,
            ideal: (constraints.ideal_width, constraints.ideal_height),
            live: true,
        }))
    }
}

struct SnapshotStream {
    source: SnapshotSource,
    client: reqwest::Client,
    timeout: Duration,
    ideal: (u32, u32),
    live: bool,
}

impl SnapshotStream {
    async fn fetch(&self) -> Result<Vec<u8>, CameraError> {
        tokio::time::timeout(self.timeout, self.read_source())
            .await
            .map_err(|_| {
                CameraError::Read(format!(
                    "no snapshot within {}ms",
                    self.timeout.as_millis()
                ))
            })?
    }

    async fn read_source(&self) -> Result<Vec<u8>, CameraError> {
        match &self.source {
            SnapshotSource::Http(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|err| CameraError::Read(err.to_string()))?;
                if !response.status().is_success() {
                    return Err(CameraError::Read(format!(
                        "HTTP {}",
                        response.status().as_u16()
                    )));
                }
                response
                    .bytes()
                    .await
                    .map(|bytes| bytes.to_vec())
                    .map_err(|err| CameraError::Read(err.to_string()))
            }
            SnapshotSource::File(path) => tokio::fs::read(path)
                .await
                .map_err(|err| CameraError::Read(format!("{}: {err}", path.display()))),
        }
    }
}

#[async_trait]
impl VideoStream for SnapshotStream {
    fn capabilities(&self) -> CameraCapabilities {
        CameraCapabilities::default()
    }

    async fn apply(&mut self, settings: &TrackSettings) -> Result<(), CameraError> {
        if settings.is_empty() {
            return Ok(());
        }
        Err(CameraError::Unsupported(
            "snapshot sources have no focus or zoom controls".into(),
        ))
    }

    async fn latest_frame(&mut self) -> Result<Option<DynamicImage>, CameraError> {
        if !self.live {
            return Err(CameraError::Stopped);
        }

        let bytes = self.fetch().await?;
        if bytes.is_empty() {
            return Ok(None);
        }

        let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|err| CameraError::Read(format!("decode worker join failed: {err}")))?;

        match decoded {
            Ok(frame) if frame.width() > 0 && frame.height() > 0 => {
                if (frame.width(), frame.height()) != self.ideal {
                    debug!(
                        "Snapshot is {}x{} (wanted {}x{})",
                        frame.width(),
                        frame.height(),
                        self.ideal.0,
                        self.ideal.1
                    );
                }
                Ok(Some(frame))
            }
            Ok(_) => Ok(None),
            Err(err) => {
                // Usually a half-written file; the next tick will see a whole one.
                debug!("Snapshot not decodable yet: {err}");
                Ok(None)
            }
        }
    }

    fn stop(&mut self) {
        if self.live {
            info!("Snapshot camera released");
        }
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
