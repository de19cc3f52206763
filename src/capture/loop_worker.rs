use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    camera::{CameraConstraints, VideoStream},
    recognition::RecognitionClient,
    settings::{CameraSettings, CaptureSettings},
};

use super::{context::ScanContext, frame::prepare_frame, frame::FrameSpec};

// Set to false to silence per-tick logging
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub interval: Duration,
    pub frame: FrameSpec,
    pub constraints: CameraConstraints,
}

impl LoopConfig {
    pub fn from_settings(capture: &CaptureSettings, camera: &CameraSettings) -> Self {
        Self {
            interval: Duration::from_millis(capture.interval_ms.max(1)),
            frame: FrameSpec::from(capture),
            constraints: CameraConstraints {
                facing: camera.facing,
                ideal_width: camera.ideal_width,
                ideal_height: camera.ideal_height,
                frame_rate: camera.frame_rate,
            },
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_settings(&CaptureSettings::default(), &CameraSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A request is still outstanding; nothing was sampled.
    Busy,
    /// The camera had no usable frame yet.
    NoFrame,
    /// A frame was encoded and handed to the recognition client.
    Requested,
}

pub async fn capture_loop(
    ctx: Arc<ScanContext>,
    client: RecognitionClient,
    mut stream: Box<dyn VideoStream>,
    epoch: u64,
    config: LoopConfig,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    log_info!(
        "capture loop armed (session {epoch}, every {}ms)",
        config.interval.as_millis()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Instant::now();
                // A stalled frame read must not hold up leaving scan mode.
                tokio::select! {
                    outcome = tick(&ctx, &client, stream.as_mut(), epoch, &config.frame) => {
                        log_debug!("tick {:?} in {}ms", outcome, started.elapsed().as_millis());
                    }
                    _ = cancel_token.cancelled() => {
                        log_debug!("tick abandoned after {}ms", started.elapsed().as_millis());
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                break;
            }
        }
    }

    stream.stop();
    log_info!("capture loop shutting down (session {epoch})");
}

/// One `Sampling -> Requesting` pass. Reconciliation happens in the spawned
/// request task so the ticker keeps running (and skipping) meanwhile.
pub async fn tick(
    ctx: &Arc<ScanContext>,
    client: &RecognitionClient,
    stream: &mut dyn VideoStream,
    epoch: u64,
    spec: &FrameSpec,
) -> TickOutcome {
    let Some(permit) = ctx.guard().try_acquire() else {
        return TickOutcome::Busy;
    };

    let frame = match stream.latest_frame().await {
        Ok(Some(frame)) => frame,
        Ok(None) => return TickOutcome::NoFrame,
        Err(err) => {
            log_warn!("camera frame unavailable: {err}");
            return TickOutcome::NoFrame;
        }
    };

    let spec = *spec;
    let jpeg = match tokio::task::spawn_blocking(move || prepare_frame(&frame, &spec)).await {
        Ok(Ok(jpeg)) => jpeg,
        Ok(Err(err)) => {
            log_warn!("frame sampling failed: {err:#}");
            return TickOutcome::NoFrame;
        }
        Err(err) => {
            log_warn!("frame worker join failed: {err}");
            return TickOutcome::NoFrame;
        }
    };

    log_debug!("sampled {} byte frame for session {epoch}", jpeg.len());

    let ctx = Arc::clone(ctx);
    let client = client.clone();
    tokio::spawn(async move {
        let _permit = permit;
        let outcome = client.recognize(jpeg).await;
        ctx.reconcile(epoch, outcome).await;
    });

    TickOutcome::Requested
}
