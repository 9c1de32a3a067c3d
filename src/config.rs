/// Application configuration
///
/// Loaded from `config.json` in the user's config directory:
/// - Linux: ~/.config/photobooth-editor/config.json
/// - macOS: ~/Library/Application Support/photobooth-editor/config.json
/// - Windows: %APPDATA%\photobooth-editor\config.json
///
/// Missing files or fields fall back to defaults. `PHOTOBOOTH_BACKEND_URL`
/// overrides the backend address.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EditorResult;

const BACKEND_URL_ENV: &str = "PHOTOBOOTH_BACKEND_URL";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the composition backend
    pub backend_url: String,
    /// Interval between video progress polls
    pub video_poll_interval_ms: u64,
    /// Screen-pixel distance within which a dragged item snaps to the horizontal center
    pub center_snap_px: f32,
    /// Angular distance (degrees) within which rotation snaps to 0
    pub rotation_snap_deg: f32,
    /// Smallest on-screen sticker edge while resizing
    pub min_sticker_px: f32,
    /// Smallest font size while resizing text
    pub min_font_size: f32,
    /// Font size of a freshly added text box
    pub default_text_size: f32,
    /// New stickers take this fraction of the template width
    pub sticker_width_ratio: f32,
    /// Per-request timeout for backend calls
    pub request_timeout_secs: u64,
    /// Template layout used for imported photos, e.g. `4:3`
    pub aspect_ratio: String,
    /// `{cols}x{rows}`
    pub cell_layout: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".to_string(),
            video_poll_interval_ms: 500,
            center_snap_px: 10.0,
            rotation_snap_deg: 5.0,
            min_sticker_px: 20.0,
            min_font_size: 10.0,
            default_text_size: 40.0,
            sticker_width_ratio: 0.3,
            request_timeout_secs: 120,
            aspect_ratio: "4:3".to_string(),
            cell_layout: "1x4".to_string(),
        }
    }
}

/// Thresholds the interaction engine needs, split out of the full config
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionTuning {
    pub center_snap_px: f32,
    pub rotation_snap_deg: f32,
    pub min_sticker_px: f32,
    pub min_font_size: f32,
}

impl Default for InteractionTuning {
    fn default() -> Self {
        AppConfig::default().interaction()
    }
}

impl AppConfig {
    /// Load the config file, falling back to defaults when it doesn't exist
    pub fn load() -> EditorResult<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(std::env::var(BACKEND_URL_ENV).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EditorResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> EditorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn apply_env(&mut self, backend_url: Option<String>) {
        if let Some(url) = backend_url.filter(|u| !u.trim().is_empty()) {
            self.backend_url = url.trim().to_string();
        }
    }

    fn config_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("photobooth-editor");
        path.push("config.json");
        Some(path)
    }

    pub fn video_poll_interval(&self) -> Duration {
        Duration::from_millis(self.video_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn interaction(&self) -> InteractionTuning {
        InteractionTuning {
            center_snap_px: self.center_snap_px,
            rotation_snap_deg: self.rotation_snap_deg,
            min_sticker_px: self.min_sticker_px,
            min_font_size: self.min_font_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AppConfig::from_json(r#"{ "backend_url": "http://booth:9000" }"#).unwrap();
        assert_eq!(config.backend_url, "http://booth:9000");
        assert_eq!(config.video_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.rotation_snap_deg, 5.0);
        assert_eq!(config.cell_layout, "1x4");
    }

    #[test]
    fn env_override_wins_unless_blank() {
        let mut config = AppConfig::default();
        config.apply_env(Some("  ".to_string()));
        assert_eq!(config.backend_url, "http://127.0.0.1:8000");

        config.apply_env(Some("http://10.0.0.2:8000".to_string()));
        assert_eq!(config.backend_url, "http://10.0.0.2:8000");
    }

    #[test]
    fn interaction_tuning_mirrors_config() {
        let mut config = AppConfig::default();
        config.center_snap_px = 6.0;
        let tuning = config.interaction();
        assert_eq!(tuning.center_snap_px, 6.0);
        assert_eq!(tuning.min_font_size, 10.0);
    }
}
