//! Persistent CLI settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use letterbox_core::inference::stub::alphabet;
use letterbox_core::CaptureConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_LANGUAGE: &str = "LETTERBOX_LANGUAGE";
pub const ENV_DURATION_MS: &str = "LETTERBOX_DURATION_MS";

const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub language: String,
    pub duration_ms: u32,
    pub pre_recording_duration_ms: u32,
    pub sample_rate: u32,
    pub input_device: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.into(),
            duration_ms: 2_000,
            pre_recording_duration_ms: 300,
            sample_rate: 16_000,
            input_device: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.language = normalize_language(&self.language);
        self.duration_ms = self.duration_ms.clamp(100, 60_000);
        self.pre_recording_duration_ms = self.pre_recording_duration_ms.min(self.duration_ms);
        self.sample_rate = self.sample_rate.clamp(8_000, 48_000);
        self.input_device = self
            .input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    /// Apply `LETTERBOX_*` overrides read through `lookup`, then re-normalize.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(language) = lookup(ENV_LANGUAGE) {
            self.language = language;
        }
        if let Some(raw) = lookup(ENV_DURATION_MS) {
            match raw.trim().parse::<u32>() {
                Ok(ms) => self.duration_ms = ms,
                Err(_) => warn!(value = raw.as_str(), "ignoring invalid LETTERBOX_DURATION_MS"),
            }
        }
        self.normalize();
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            duration_ms: self.duration_ms,
            pre_recording_duration_ms: self.pre_recording_duration_ms,
        }
    }
}

pub fn normalize_language(raw: &str) -> String {
    let language = raw.trim().to_ascii_lowercase();
    let language = match language.as_str() {
        "english" | "eng" => "en".to_string(),
        "german" | "deutsch" | "deu" | "ger" => "de".to_string(),
        _ => language,
    };
    if alphabet(&language).is_some() {
        language
    } else {
        DEFAULT_LANGUAGE.into()
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Letterbox")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("letterbox")
            .join("settings.json")
    }
}

/// Missing or unreadable files yield the defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
