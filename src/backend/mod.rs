/// Composition backend interface
///
/// The backend does all pixel-heavy work (stylization, background
/// removal, filter baking, final image/video composition). This module
/// owns the request shapes and the `Backend` trait; `http.rs` talks to
/// the real service.

pub mod http;
#[cfg(test)]
pub mod mock;

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::EditorResult;
use crate::state::data::{
    Hole, HoleTransform, ImageBlob, PaletteColor, StickerAsset, StylePreset, Template,
};
use crate::state::decoration::{Sticker, TextBox};
use crate::state::edit::{BackgroundSettings, FilterValues};

pub use http::HttpBackend;

/// Where the backend should read the template from
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// Server-side path of an unmodified template
    Path(String),
    /// Locally recolored template, uploaded as `template.png`
    File(ImageBlob),
}

/// Everything `/compose_image` needs
#[derive(Debug, Clone)]
pub struct ComposeImageRequest {
    pub template: TemplateSource,
    pub holes: Vec<Hole>,
    pub stickers: Vec<Sticker>,
    pub texts: Vec<TextBox>,
    pub filters: FilterValues,
    pub transformations: Vec<HoleTransform>,
    /// Per-hole replacement colors the backend must apply itself; omitted when empty
    pub background_colors: Option<Vec<Option<String>>>,
    pub video_paths: Vec<String>,
    pub is_inverted: bool,
    /// One photo per hole, in hole order
    pub photos: Vec<ImageBlob>,
}

/// Everything `/compose_video` needs
#[derive(Debug, Clone)]
pub struct ComposeVideoRequest {
    pub session_id: String,
    pub template: TemplateSource,
    pub holes: Vec<Hole>,
    pub stickers: Vec<Sticker>,
    pub texts: Vec<TextBox>,
    pub transformations: Vec<HoleTransform>,
    pub is_inverted: bool,
    pub video_paths: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ComposeResult {
    pub result_path: String,
    pub qr_code_path: String,
    pub session_id: String,
}

/// Result of `/compose_video` and of the zip endpoints
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub result_path: String,
    pub qr_code_path: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VideoProgress {
    pub progress: f32,
}

impl VideoProgress {
    pub fn percent(&self) -> u8 {
        self.progress.clamp(0.0, 100.0).round() as u8
    }
}

/// A finished session as stored by the backend
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    #[serde(default)]
    pub holes: Vec<Hole>,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
    #[serde(default)]
    pub texts: Vec<TextBox>,
    #[serde(default)]
    pub transformations: Vec<HoleTransform>,
    pub template_path: String,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub is_inverted: bool,
    pub result_path: String,
    pub qr_code_path: String,
}

/// Operations consumed from the backend service.
///
/// Futures are `Send` so they can run as background tasks.
pub trait Backend: Send + Sync {
    fn stylize(
        &self,
        prompt: &str,
        photo: &ImageBlob,
    ) -> impl Future<Output = EditorResult<ImageBlob>> + Send;

    fn apply_filters(
        &self,
        photo: &ImageBlob,
        filters: &FilterValues,
    ) -> impl Future<Output = EditorResult<ImageBlob>> + Send;

    fn remove_background(
        &self,
        photo: &ImageBlob,
        settings: &BackgroundSettings,
    ) -> impl Future<Output = EditorResult<ImageBlob>> + Send;

    fn compose_image(
        &self,
        request: &ComposeImageRequest,
    ) -> impl Future<Output = EditorResult<ComposeResult>> + Send;

    fn compose_video(
        &self,
        request: &ComposeVideoRequest,
    ) -> impl Future<Output = EditorResult<DeliveryResult>> + Send;

    fn video_progress(
        &self,
        session_id: &str,
    ) -> impl Future<Output = EditorResult<VideoProgress>> + Send;

    /// Upload photos to be zipped server-side
    fn zip_photos(
        &self,
        photos: &[(String, ImageBlob)],
    ) -> impl Future<Output = EditorResult<DeliveryResult>> + Send;

    fn fetch_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = EditorResult<SessionRecord>> + Send;

    /// Download a server-relative asset (template, sticker, result image)
    fn fetch_asset(&self, path: &str) -> impl Future<Output = EditorResult<ImageBlob>> + Send;

    fn list_stickers(&self) -> impl Future<Output = EditorResult<Vec<StickerAsset>>> + Send;

    fn list_styles(&self) -> impl Future<Output = EditorResult<Vec<StylePreset>>> + Send;

    fn list_colors(&self) -> impl Future<Output = EditorResult<Vec<PaletteColor>>> + Send;

    fn list_templates_by_layout(
        &self,
        aspect_ratio: &str,
        cell_layout: &str,
    ) -> impl Future<Output = EditorResult<Vec<Template>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_is_clamped() {
        assert_eq!(VideoProgress { progress: 42.4 }.percent(), 42);
        assert_eq!(VideoProgress { progress: 180.0 }.percent(), 100);
        assert_eq!(VideoProgress { progress: -3.0 }.percent(), 0);
    }

    #[test]
    fn session_record_parses_minimal_payload() {
        let record: SessionRecord = serde_json::from_str(
            r#"{"session_id":"abc","template_path":"/t.png",
                "result_path":"/static/results/abc.png","qr_code_path":"/static/results/qr_abc.png"}"#,
        )
        .unwrap();
        assert_eq!(record.session_id, "abc");
        assert!(record.videos.is_empty());
        assert!(!record.is_inverted);
    }
}
