use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::camera::Facing;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionSettings {
    pub endpoint: String,
    pub model: String,
    /// Sends a zero thinking budget: lowest latency, slightly lower accuracy.
    pub disable_deep_reasoning: bool,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-2.5-flash".into(),
            disable_deep_reasoning: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureSettings {
    pub interval_ms: u64,
    pub crop_width_ratio: f32,
    pub crop_height_ratio: f32,
    pub output_width: u32,
    pub output_height: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    pub match_display_ms: u64,
    pub log_capacity: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1200,
            crop_width_ratio: 0.6,
            crop_height_ratio: 0.4,
            output_width: 1280,
            output_height: 720,
            jpeg_quality: 80,
            match_display_ms: 5000,
            log_capacity: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraSettings {
    /// Snapshot URL (`http://`/`https://`) or image file path.
    pub source: Option<String>,
    /// Which way the preferred camera points; `environment` is the rear one.
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            source: None,
            facing: Facing::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
            frame_rate: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertSettings {
    pub sound_enabled: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    pub recognition: RecognitionSettings,
    pub capture: CaptureSettings,
    pub camera: CameraSettings,
    pub alert: AlertSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring malformed settings in {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> UserSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn recognition(&self) -> RecognitionSettings {
        self.snapshot().recognition
    }

    pub fn capture(&self) -> CaptureSettings {
        self.snapshot().capture
    }

    pub fn camera(&self) -> CameraSettings {
        self.snapshot().camera
    }

    pub fn alert(&self) -> AlertSettings {
        self.snapshot().alert
    }

    /// Apply `change` and write the whole file back.
    pub fn update<F>(&self, change: F) -> Result<UserSettings>
    where
        F: FnOnce(&mut UserSettings),
    {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        let mut next = guard.clone();
        change(&mut next);
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
