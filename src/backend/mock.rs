/// In-memory backend that records every call, for tests

use std::sync::Mutex;

use super::{
    Backend, ComposeImageRequest, ComposeResult, ComposeVideoRequest, DeliveryResult,
    SessionRecord, VideoProgress,
};
use crate::error::{EditorError, EditorResult};
use crate::state::data::{ImageBlob, PaletteColor, StickerAsset, StylePreset, Template};
use crate::state::edit::{BackgroundSettings, FilterValues};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Stylize(String),
    ApplyFilters(FilterValues),
    RemoveBackground(BackgroundSettings),
    ComposeImage { photos: usize },
    ComposeVideo { session_id: String },
    VideoProgress(String),
    ZipPhotos(Vec<String>),
    FetchSession(String),
    FetchAsset(String),
}

#[derive(Default)]
pub struct MockBackend {
    pub calls: Mutex<Vec<Call>>,
    /// Returned by stylize / apply_filters / remove_background / fetch_asset
    pub image: Option<ImageBlob>,
    pub fail_filters: bool,
    pub fail_compose: bool,
    pub fail_video: bool,
    pub progress: f32,
}

impl MockBackend {
    pub fn returning(image: ImageBlob) -> Self {
        Self { image: Some(image), ..Default::default() }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn image(&self) -> EditorResult<ImageBlob> {
        self.image.clone().ok_or_else(|| EditorError::backend(500, "no image configured"))
    }
}

impl Backend for MockBackend {
    async fn stylize(&self, prompt: &str, _photo: &ImageBlob) -> EditorResult<ImageBlob> {
        self.record(Call::Stylize(prompt.to_string()));
        self.image()
    }

    async fn apply_filters(&self, _photo: &ImageBlob, filters: &FilterValues) -> EditorResult<ImageBlob> {
        self.record(Call::ApplyFilters(*filters));
        if self.fail_filters {
            return Err(EditorError::backend(500, "Filter application failed"));
        }
        self.image()
    }

    async fn remove_background(
        &self,
        _photo: &ImageBlob,
        settings: &BackgroundSettings,
    ) -> EditorResult<ImageBlob> {
        self.record(Call::RemoveBackground(*settings));
        self.image()
    }

    async fn compose_image(&self, request: &ComposeImageRequest) -> EditorResult<ComposeResult> {
        self.record(Call::ComposeImage { photos: request.photos.len() });
        if self.fail_compose {
            return Err(EditorError::backend(400, "No template provided."));
        }
        Ok(ComposeResult {
            result_path: "/static/results/s1.png".to_string(),
            qr_code_path: "/static/results/qr_s1.png".to_string(),
            session_id: "s1".to_string(),
        })
    }

    async fn compose_video(&self, request: &ComposeVideoRequest) -> EditorResult<DeliveryResult> {
        self.record(Call::ComposeVideo { session_id: request.session_id.clone() });
        if self.fail_video {
            return Err(EditorError::backend(500, "ffmpeg failed"));
        }
        Ok(DeliveryResult {
            result_path: format!("/static/results/{}.mp4", request.session_id),
            qr_code_path: format!("/static/results/qr_{}_video.png", request.session_id),
        })
    }

    async fn video_progress(&self, session_id: &str) -> EditorResult<VideoProgress> {
        self.record(Call::VideoProgress(session_id.to_string()));
        Ok(VideoProgress { progress: self.progress })
    }

    async fn zip_photos(&self, photos: &[(String, ImageBlob)]) -> EditorResult<DeliveryResult> {
        self.record(Call::ZipPhotos(photos.iter().map(|(n, _)| n.clone()).collect()));
        Ok(DeliveryResult {
            result_path: "/static/results/photos.zip".to_string(),
            qr_code_path: "/static/results/qr_zip.png".to_string(),
        })
    }

    async fn fetch_session(&self, session_id: &str) -> EditorResult<SessionRecord> {
        self.record(Call::FetchSession(session_id.to_string()));
        Ok(SessionRecord {
            session_id: session_id.to_string(),
            holes: Vec::new(),
            stickers: Vec::new(),
            texts: Vec::new(),
            transformations: Vec::new(),
            template_path: "/static/templates/strip.png".to_string(),
            photos: Vec::new(),
            videos: vec!["/static/videos/v0.webm".to_string()],
            is_inverted: false,
            result_path: format!("/static/results/{session_id}.png"),
            qr_code_path: format!("/static/results/qr_{session_id}.png"),
        })
    }

    async fn fetch_asset(&self, path: &str) -> EditorResult<ImageBlob> {
        self.record(Call::FetchAsset(path.to_string()));
        self.image()
    }

    async fn list_stickers(&self) -> EditorResult<Vec<StickerAsset>> {
        Ok(Vec::new())
    }

    async fn list_styles(&self) -> EditorResult<Vec<StylePreset>> {
        Ok(Vec::new())
    }

    async fn list_colors(&self) -> EditorResult<Vec<PaletteColor>> {
        Ok(Vec::new())
    }

    async fn list_templates_by_layout(&self, _: &str, _: &str) -> EditorResult<Vec<Template>> {
        Ok(Vec::new())
    }
}
