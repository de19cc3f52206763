//! User actions behind both views. Errors are flattened to strings here,
//! at the presentation boundary.

use std::time::Duration;

use crate::{
    camera_for,
    capture::ScanSnapshot,
    settings::UserSettings,
    watchlist::{normalize, WatchedPlate},
    AppState,
};

pub async fn list_plates(state: &AppState) -> Result<Vec<WatchedPlate>, String> {
    Ok(state.watchlist.list().await)
}

pub async fn add_plate(state: &AppState, raw: &str) -> Result<WatchedPlate, String> {
    state.watchlist.add(raw).await.map_err(|e| e.to_string())
}

/// Removes by id, or by plate number when `key` is not a known id.
/// Returns the removed entry, `None` if nothing matched.
pub async fn remove_plate(state: &AppState, key: &str) -> Result<Option<WatchedPlate>, String> {
    let key = key.trim();
    let plates = state.watchlist.list().await;

    let id = if plates.iter().any(|plate| plate.id == key) {
        key.to_string()
    } else {
        let number = normalize(key);
        match plates.iter().find(|plate| plate.number == number) {
            Some(plate) => plate.id.clone(),
            None => return Ok(None),
        }
    };

    state.watchlist.remove(&id).await.map_err(|e| e.to_string())
}

pub async fn start_scan(
    state: &AppState,
    source: Option<&str>,
    interval_ms: Option<u64>,
) -> Result<(), String> {
    let mut guard = state.scanner.lock().await;
    let controller = guard.as_mut().ok_or_else(|| {
        "scanning needs a recognition API key (set GEMINI_API_KEY)".to_string()
    })?;

    let camera = camera_for(source, &state.settings).map_err(|e| e.to_string())?;
    controller.set_camera(camera);
    if let Some(ms) = interval_ms {
        controller.set_interval(Duration::from_millis(ms.max(1)));
    }

    controller.start().await.map_err(|e| e.to_string())
}

pub async fn stop_scan(state: &AppState) -> Result<(), String> {
    let mut guard = state.scanner.lock().await;
    match guard.as_mut() {
        Some(controller) => controller.stop().await.map_err(|e| format!("{e:#}")),
        None => Ok(()),
    }
}

pub fn get_scan_state(state: &AppState) -> ScanSnapshot {
    state.scan.snapshot()
}

pub fn get_settings(state: &AppState) -> UserSettings {
    state.settings.snapshot()
}

#[derive(Debug, Default, Clone)]
pub struct SettingsChange {
    pub source: Option<String>,
    pub interval_ms: Option<u64>,
    pub deep_reasoning: Option<bool>,
}

impl SettingsChange {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.interval_ms.is_none() && self.deep_reasoning.is_none()
    }
}

/// Persisted settings apply from the next start of the program.
pub fn update_settings(state: &AppState, change: SettingsChange) -> Result<UserSettings, String> {
    state
        .settings
        .update(|settings| {
            if let Some(source) = change.source {
                settings.camera.source = Some(source).filter(|s| !s.trim().is_empty());
            }
            if let Some(ms) = change.interval_ms {
                settings.capture.interval_ms = ms.max(1);
            }
            if let Some(deep) = change.deep_reasoning {
                settings.recognition.disable_deep_reasoning = !deep;
            }
        })
        .map_err(|e| format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alert::MutedAlert, db::MemoryStore, settings::SettingsStore};
    use std::sync::Arc;

    async fn state(dir: &tempfile::TempDir) -> AppState {
        let settings = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        AppState::from_parts(settings, Arc::new(MemoryStore::new()), None, Arc::new(MutedAlert)).await
    }

    #[tokio::test]
    async fn list_add_remove_flow() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let added = add_plate(&state, "ab-123-cd").await.unwrap();
        assert_eq!(list_plates(&state).await.unwrap(), vec![added.clone()]);

        let err = add_plate(&state, "AB 123 CD").await.unwrap_err();
        assert!(err.contains("already"), "{err}");
        let err = add_plate(&state, "x1").await.unwrap_err();
        assert!(err.contains("at least 4"), "{err}");

        assert_eq!(remove_plate(&state, "nope").await.unwrap(), None);
        assert_eq!(remove_plate(&state, &added.id).await.unwrap(), Some(added));
        assert!(list_plates(&state).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_accepts_plate_number() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let added = add_plate(&state, "XY-987-ZT").await.unwrap();

        assert_eq!(remove_plate(&state, "xy 987 zt").await.unwrap(), Some(added));
    }

    #[tokio::test]
    async fn scan_without_key_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let err = start_scan(&state, Some("/tmp/frame.jpg"), None).await.unwrap_err();
        assert!(err.contains("API key"), "{err}");
        assert!(stop_scan(&state).await.is_ok());
        assert!(!get_scan_state(&state).session.active);
    }

    #[tokio::test]
    async fn settings_change_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let updated = update_settings(
            &state,
            SettingsChange {
                source: Some("http://cam.local/snap.jpg".into()),
                interval_ms: Some(2000),
                deep_reasoning: Some(true),
            },
        )
        .unwrap();
        assert_eq!(updated.capture.interval_ms, 2000);
        assert!(!updated.recognition.disable_deep_reasoning);
        assert_eq!(get_settings(&state), updated);
    }
}
