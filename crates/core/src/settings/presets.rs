//! Pitch/speed presets: a fixed built-in list plus user presets kept in settings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{SettingsError, SettingsStore};

const CUSTOM_PRESETS_KEY: &str = "custom_presets";

/// A named pitch/speed combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub pitch: i32,
    pub speed: f64,
}

impl Preset {
    fn new(name: &str, pitch: i32, speed: f64) -> Self {
        Self {
            name: name.to_string(),
            pitch,
            speed,
        }
    }
}

/// Built-in and user presets as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetList {
    pub defaults: Vec<Preset>,
    pub custom: Vec<Preset>,
}

#[derive(Debug, Error, PartialEq)]
pub enum PresetError {
    #[error("preset name cannot be empty")]
    EmptyName,

    #[error("preset '{0}' clashes with a built-in preset")]
    BuiltinName(String),

    #[error("pitch {0} is outside -12..=12 semitones")]
    PitchOutOfRange(i32),

    #[error("speed {0} is outside 0.5..=2.0")]
    SpeedOutOfRange(f64),

    #[error("preset not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

pub fn builtin_presets() -> Vec<Preset> {
    vec![
        Preset::new("Nightcore", 3, 1.15),
        Preset::new("Slowed + Reverb", -2, 0.85),
        Preset::new("Daycore", -1, 0.9),
        Preset::new("Double Time", 0, 1.5),
        Preset::new("Half Time", 0, 0.75),
    ]
}

/// Preset catalog backed by the settings table.
pub struct Presets {
    settings: Arc<dyn SettingsStore>,
}

impl Presets {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub fn list(&self) -> Result<PresetList, PresetError> {
        Ok(PresetList {
            defaults: builtin_presets(),
            custom: self.custom()?,
        })
    }

    /// Add or replace a user preset by name.
    pub fn save(&self, preset: Preset) -> Result<PresetList, PresetError> {
        let name = preset.name.trim();
        if name.is_empty() {
            return Err(PresetError::EmptyName);
        }
        if builtin_presets().iter().any(|p| p.name == name) {
            return Err(PresetError::BuiltinName(name.to_string()));
        }
        if !(-12..=12).contains(&preset.pitch) {
            return Err(PresetError::PitchOutOfRange(preset.pitch));
        }
        if !(0.5..=2.0).contains(&preset.speed) {
            return Err(PresetError::SpeedOutOfRange(preset.speed));
        }

        let preset = Preset {
            name: name.to_string(),
            ..preset
        };
        let mut custom = self.custom()?;
        match custom.iter_mut().find(|p| p.name == preset.name) {
            Some(existing) => *existing = preset,
            None => custom.push(preset),
        }
        self.store(&custom)?;
        self.list()
    }

    pub fn delete(&self, name: &str) -> Result<(), PresetError> {
        let mut custom = self.custom()?;
        let before = custom.len();
        custom.retain(|p| p.name != name);
        if custom.len() == before {
            return Err(PresetError::NotFound(name.to_string()));
        }
        self.store(&custom)
    }

    fn custom(&self) -> Result<Vec<Preset>, PresetError> {
        let raw = self.settings.get(CUSTOM_PRESETS_KEY)?;
        Ok(raw
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default())
    }

    fn store(&self, custom: &[Preset]) -> Result<(), PresetError> {
        let json = serde_json::to_string(custom).map_err(|e| SettingsError::InvalidValue {
            key: CUSTOM_PRESETS_KEY.to_string(),
            reason: e.to_string(),
        })?;
        self.settings.set(CUSTOM_PRESETS_KEY, &json)?;
        Ok(())
    }
}
