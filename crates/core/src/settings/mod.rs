//! Persistent application settings and pitch/speed presets.

mod presets;
mod sqlite_store;

pub use presets::{builtin_presets, Preset, PresetError, PresetList, Presets};
pub use sqlite_store::{SettingsError, SettingsStore, SqliteSettingsStore};
