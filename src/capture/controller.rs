use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    camera::{preferred_settings, CameraDevice, CameraError},
    recognition::RecognitionClient,
};

use super::{
    context::{ScanContext, ScanUpdate},
    loop_worker::{capture_loop, LoopConfig},
};

/// Owns the scan-mode lifecycle: at most one camera session and one loop
/// task exist at a time.
pub struct CaptureController {
    ctx: Arc<ScanContext>,
    camera: Arc<dyn CameraDevice>,
    client: RecognitionClient,
    config: LoopConfig,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl CaptureController {
    pub fn new(
        ctx: Arc<ScanContext>,
        camera: Arc<dyn CameraDevice>,
        client: RecognitionClient,
        config: LoopConfig,
    ) -> Self {
        Self {
            ctx,
            camera,
            client,
            config,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn context(&self) -> &Arc<ScanContext> {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Swap the camera used by the next `start`.
    pub fn set_camera(&mut self, camera: Arc<dyn CameraDevice>) {
        self.camera = camera;
    }

    pub fn set_interval(&mut self, interval: std::time::Duration) {
        self.config.interval = interval;
    }

    /// Enter scan mode. Any previous session is torn down first. On camera
    /// failure the controller stays idle and the error is returned.
    pub async fn start(&mut self) -> Result<(), CameraError> {
        if let Err(err) = self.stop().await {
            warn!("previous capture session did not stop cleanly: {err:#}");
        }

        let mut stream = match self.camera.open(&self.config.constraints).await {
            Ok(stream) => stream,
            Err(err) => {
                self.ctx.publish(ScanUpdate::CameraError(err.to_string()));
                return Err(err);
            }
        };

        let wanted = preferred_settings(&stream.capabilities());
        if !wanted.is_empty() {
            if let Err(err) = stream.apply(&wanted).await {
                warn!("camera ignored focus/zoom request: {err}");
            }
        }

        let epoch = self.ctx.arm();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(
            Arc::clone(&self.ctx),
            self.client.clone(),
            stream,
            epoch,
            self.config.clone(),
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        info!("scan mode on");
        Ok(())
    }

    /// Leave scan mode. Outstanding requests finish on their own and their
    /// results are dropped.
    pub async fn stop(&mut self) -> Result<()> {
        self.ctx.disarm();

        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("capture loop task failed to join")?;
            info!("scan mode off");
        }
        Ok(())
    }
}
