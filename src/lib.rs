pub mod alert;
pub mod camera;
pub mod capture;
mod cli;
pub mod commands;
pub mod db;
pub mod recognition;
pub mod settings;
pub mod utils;
pub mod watchlist;

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::sync::Mutex;

use alert::Alerter;
use camera::{CameraDevice, SnapshotCamera};
use capture::{CaptureController, LoopConfig, ScanContext};
use db::{Database, KeyValueStore};
use recognition::{gemini, GeminiBackend, RecognitionBackend, RecognitionClient};
use settings::SettingsStore;
use watchlist::WatchlistStore;

/// Owned application context handed to the presentation layer.
pub struct AppState {
    pub settings: SettingsStore,
    pub watchlist: Arc<WatchlistStore>,
    pub scan: Arc<ScanContext>,
    /// `None` when no recognition API key is configured.
    pub(crate) scanner: Mutex<Option<CaptureController>>,
}

impl AppState {
    /// Open the store and settings under `data_dir` and wire the scanner.
    pub async fn initialize(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let database = Database::new(data_dir.join("platewatch.sqlite3"))?;
        info!("Using store at {}", database.path().display());

        let backend = gemini::api_key_from_env().map(|key| {
            Arc::new(GeminiBackend::new(key, settings.recognition())) as Arc<dyn RecognitionBackend>
        });
        if backend.is_none() {
            warn!(
                "No recognition API key ({}); scanning is disabled",
                gemini::API_KEY_VARS.join(" or ")
            );
        }

        let alerter: Arc<dyn Alerter> =
            Arc::from(alert::default_alerter(settings.alert().sound_enabled));

        Ok(Self::from_parts(settings, Arc::new(database), backend, alerter).await)
    }

    /// Assemble the context from explicit collaborators.
    pub async fn from_parts(
        settings: SettingsStore,
        store: Arc<dyn KeyValueStore>,
        backend: Option<Arc<dyn RecognitionBackend>>,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        let capture = settings.capture();
        let camera_settings = settings.camera();

        let watchlist = Arc::new(WatchlistStore::load(store).await);
        let scan = Arc::new(ScanContext::new(
            Arc::clone(&watchlist),
            alerter,
            capture.log_capacity,
            Duration::from_millis(capture.match_display_ms),
        ));

        let scanner = backend.map(|backend| {
            let camera: Arc<dyn CameraDevice> = Arc::new(UnconfiguredCamera);
            CaptureController::new(
                Arc::clone(&scan),
                camera,
                RecognitionClient::new(backend),
                LoopConfig::from_settings(&capture, &camera_settings),
            )
        });

        Self {
            settings,
            watchlist,
            scan,
            scanner: Mutex::new(scanner),
        }
    }
}

/// Placeholder until a source is chosen; opening always fails.
struct UnconfiguredCamera;

#[async_trait::async_trait]
impl CameraDevice for UnconfiguredCamera {
    async fn open(
        &self,
        _constraints: &camera::CameraConstraints,
    ) -> std::result::Result<Box<dyn camera::VideoStream>, camera::CameraError> {
        Err(camera::CameraError::NotConfigured)
    }
}

/// Resolve the camera for a scan: explicit source first, then settings.
pub(crate) fn camera_for(
    source: Option<&str>,
    settings: &SettingsStore,
) -> std::result::Result<Arc<dyn CameraDevice>, camera::CameraError> {
    let configured = settings.camera().source;
    let chosen = source.or(configured.as_deref());
    Ok(Arc::new(SnapshotCamera::from_setting(chosen)?))
}

pub fn run() -> Result<()> {
    utils::logging::init();

    let cli = cli::Cli::parse();

    log::info!("platewatch starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(cli::dispatch(cli))
}
