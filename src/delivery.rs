/// Result composition and delivery
///
/// Finalize bakes every hole's photo and sends one compose_image request.
/// The result screen then offers, on demand:
/// - the composed video (composed lazily once, cached until the user goes
///   back to editing or home; progress is polled while it runs)
/// - zips of the original and the stylized photos
/// - saving any of these into the downloads folder
/// - a QR code per delivery kind
///
/// A previous session can be reopened from its backend record.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::backend::{
    Backend, ComposeImageRequest, ComposeResult, ComposeVideoRequest, DeliveryResult, SessionRecord,
    TemplateSource, VideoProgress,
};
use crate::error::{EditorError, EditorResult};
use crate::state::data::{Hole, HoleTransform, ImageBlob};
use crate::state::decoration::{Sticker, TextBox};
use crate::state::edit::FilterValues;
use crate::state::transform::PhotoTransformModel;

/// Everything finalize needs, captured from the review session
#[derive(Debug, Clone)]
pub struct FinalizeSnapshot {
    pub template: TemplateSource,
    pub holes: Vec<Hole>,
    pub transformations: Vec<HoleTransform>,
    pub stickers: Vec<Sticker>,
    pub texts: Vec<TextBox>,
    pub is_inverted: bool,
    /// Per-hole colors the backend must apply itself
    pub background_colors: Option<Vec<Option<String>>>,
    pub video_paths: Vec<String>,
    /// Edit state of every photo as it was when finalize was pressed
    pub model: PhotoTransformModel,
    /// Photo index shown in each hole
    pub hole_photos: Vec<usize>,
}

impl FinalizeSnapshot {
    /// Video request for the session the image was composed in
    pub fn video_request(&self, session_id: &str) -> ComposeVideoRequest {
        ComposeVideoRequest {
            session_id: session_id.to_string(),
            template: self.template.clone(),
            holes: self.holes.clone(),
            stickers: self.stickers.clone(),
            texts: self.texts.clone(),
            transformations: self.transformations.clone(),
            is_inverted: self.is_inverted,
            video_paths: self.video_paths.clone(),
        }
    }
}

/// Bake filters per photo and compose the final image.
///
/// Filters are already baked into each photo, so the request carries
/// neutral filter values.
pub async fn finalize<B: Backend>(backend: &B, snapshot: &FinalizeSnapshot) -> EditorResult<ComposeResult> {
    let mut model = snapshot.model.clone();
    let mut photos = Vec::with_capacity(snapshot.hole_photos.len());
    for &index in &snapshot.hole_photos {
        photos.push(model.final_blob(index, backend).await?);
    }

    let request = ComposeImageRequest {
        template: snapshot.template.clone(),
        holes: snapshot.holes.clone(),
        stickers: snapshot.stickers.clone(),
        texts: snapshot.texts.clone(),
        filters: FilterValues::default(),
        transformations: snapshot.transformations.clone(),
        background_colors: snapshot.background_colors.clone(),
        video_paths: snapshot.video_paths.clone(),
        is_inverted: snapshot.is_inverted,
        photos,
    };

    let result = backend.compose_image(&request).await?;
    info!(session_id = %result.session_id, "image composed");
    Ok(result)
}

/// Identifies one video composition; a reset makes older ones stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTicket(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum VideoState {
    Idle,
    Composing { percent: u8 },
    Ready(DeliveryResult),
}

/// Lazy, cached video composition with progress polling
#[derive(Debug, Clone)]
pub struct VideoDelivery {
    state: VideoState,
    generation: u64,
}

impl Default for VideoDelivery {
    fn default() -> Self {
        Self { state: VideoState::Idle, generation: 0 }
    }
}

impl VideoDelivery {
    pub fn state(&self) -> &VideoState {
        &self.state
    }

    pub fn result(&self) -> Option<&DeliveryResult> {
        match &self.state {
            VideoState::Ready(result) => Some(result),
            _ => None,
        }
    }

    /// Begin composing. `None` when the video is cached or already being composed.
    pub fn start(&mut self) -> Option<VideoTicket> {
        match self.state {
            VideoState::Idle => {
                self.generation += 1;
                self.state = VideoState::Composing { percent: 0 };
                Some(VideoTicket(self.generation))
            }
            _ => None,
        }
    }

    /// Progress polling runs exactly while a composition is in flight
    pub fn is_polling(&self) -> bool {
        matches!(self.state, VideoState::Composing { percent } if percent < 100)
    }

    pub fn on_progress(&mut self, progress: VideoProgress) {
        if let VideoState::Composing { percent } = &mut self.state {
            *percent = progress.percent().max(*percent);
        }
    }

    /// Settle the composition. Polling stops on both paths. Stale tickets
    /// are ignored and yield `Ok(None)`.
    pub fn finish<E: Display>(
        &mut self,
        ticket: VideoTicket,
        result: Result<DeliveryResult, E>,
    ) -> Result<Option<DeliveryResult>, E> {
        if ticket.0 != self.generation || !matches!(self.state, VideoState::Composing { .. }) {
            return Ok(None);
        }
        match result {
            Ok(video) => {
                self.state = VideoState::Ready(video.clone());
                Ok(Some(video))
            }
            Err(e) => {
                warn!(error = %e, "video composition failed");
                self.state = VideoState::Idle;
                Err(e)
            }
        }
    }

    /// Drop the cached video and any in-flight composition
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = VideoState::Idle;
    }
}

/// Deliverables with their own QR code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrKind {
    Image,
    Video,
    Originals,
    Generated,
}

impl QrKind {
    /// File name used when saving this deliverable
    pub fn file_name(self) -> &'static str {
        match self {
            QrKind::Image => "photobooth_result.png",
            QrKind::Video => "photobooth_video.mp4",
            QrKind::Originals => "original_photos.zip",
            QrKind::Generated => "generated_photos.zip",
        }
    }
}

/// State of the result screen
#[derive(Debug, Clone)]
pub struct DeliveryState {
    pub image: ComposeResult,
    pub video: VideoDelivery,
    video_request: ComposeVideoRequest,
    pub originals_zip: Option<DeliveryResult>,
    pub generated_zip: Option<DeliveryResult>,
    pub shown_qr: Option<QrKind>,
}

impl DeliveryState {
    pub fn from_finalize(image: ComposeResult, snapshot: &FinalizeSnapshot) -> Self {
        let video_request = snapshot.video_request(&image.session_id);
        Self::new(image, video_request)
    }

    /// Result screen for a session reopened from its record
    pub fn from_record(record: SessionRecord) -> Self {
        let image = ComposeResult {
            result_path: record.result_path,
            qr_code_path: record.qr_code_path,
            session_id: record.session_id.clone(),
        };
        let video_request = ComposeVideoRequest {
            session_id: record.session_id,
            template: TemplateSource::Path(record.template_path),
            holes: record.holes,
            stickers: record.stickers,
            texts: record.texts,
            transformations: record.transformations,
            is_inverted: record.is_inverted,
            video_paths: record.videos,
        };
        Self::new(image, video_request)
    }

    fn new(image: ComposeResult, video_request: ComposeVideoRequest) -> Self {
        Self {
            image,
            video: VideoDelivery::default(),
            video_request,
            originals_zip: None,
            generated_zip: None,
            shown_qr: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.image.session_id
    }

    pub fn has_videos(&self) -> bool {
        !self.video_request.video_paths.is_empty()
    }

    /// Request to send when a video composition starts
    pub fn video_request(&self) -> &ComposeVideoRequest {
        &self.video_request
    }

    /// Remote path of a deliverable, once it exists
    pub fn result_path(&self, kind: QrKind) -> Option<&str> {
        match kind {
            QrKind::Image => Some(&self.image.result_path),
            QrKind::Video => self.video.result().map(|v| v.result_path.as_str()),
            QrKind::Originals => self.originals_zip.as_ref().map(|z| z.result_path.as_str()),
            QrKind::Generated => self.generated_zip.as_ref().map(|z| z.result_path.as_str()),
        }
    }

    pub fn qr_path(&self, kind: QrKind) -> Option<&str> {
        match kind {
            QrKind::Image => Some(&self.image.qr_code_path),
            QrKind::Video => self.video.result().map(|v| v.qr_code_path.as_str()),
            QrKind::Originals => self.originals_zip.as_ref().map(|z| z.qr_code_path.as_str()),
            QrKind::Generated => self.generated_zip.as_ref().map(|z| z.qr_code_path.as_str()),
        }
    }

    /// Show a QR code if its deliverable exists
    pub fn show_qr(&mut self, kind: QrKind) {
        self.shown_qr = self.qr_path(kind).is_some().then_some(kind);
    }

    /// Leaving the result screen forgets the cached video
    pub fn leave(&mut self) {
        self.video.reset();
        self.shown_qr = None;
    }
}

/// Zip entry names for the as-captured photos
pub fn originals_entries(originals: Vec<ImageBlob>) -> Vec<(String, ImageBlob)> {
    originals
        .into_iter()
        .enumerate()
        .map(|(i, blob)| (format!("photo_{i}.jpg"), blob))
        .collect()
}

/// Zip entry names for stylized photos: `photo_{index}_{prompt}` with the
/// prompt reduced to `[A-Za-z0-9_]`, at most 20 characters
pub fn generated_entries(stylized: Vec<(usize, String, ImageBlob)>) -> Vec<(String, ImageBlob)> {
    stylized
        .into_iter()
        .map(|(i, prompt, blob)| {
            let safe: String = prompt
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
                .take(20)
                .collect();
            (format!("photo_{i}_{safe}.jpg"), blob)
        })
        .collect()
}

/// Have the backend zip the given photos
pub async fn zip_photos<B: Backend>(backend: &B, entries: &[(String, ImageBlob)]) -> EditorResult<DeliveryResult> {
    if entries.is_empty() {
        return Err(EditorError::validation("there are no photos to download"));
    }
    backend.zip_photos(entries).await
}

/// Fetch the remote video composition, to run alongside progress polling
pub async fn compose_video<B: Backend>(backend: &B, request: &ComposeVideoRequest) -> EditorResult<DeliveryResult> {
    if request.video_paths.is_empty() {
        return Err(EditorError::validation("this session has no videos"));
    }
    let result = backend.compose_video(request).await?;
    info!(session_id = %request.session_id, path = %result.result_path, "video composed");
    Ok(result)
}

/// Reopen a finished session
pub async fn replay_session<B: Backend>(backend: &B, session_id: &str) -> EditorResult<DeliveryState> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(EditorError::validation("session id is required"));
    }
    let record = backend.fetch_session(session_id).await?;
    Ok(DeliveryState::from_record(record))
}

/// Download a remote deliverable into the user's downloads folder
pub async fn save_download<B: Backend>(backend: &B, remote_path: &str, file_name: &str) -> EditorResult<PathBuf> {
    let dir = dirs_next::download_dir()
        .or_else(dirs_next::home_dir)
        .ok_or_else(|| EditorError::not_ready("no downloads folder"))?;
    let bytes = backend.fetch_asset(remote_path).await?;
    save_into(&dir, file_name, bytes.bytes()).await
}

async fn save_into(dir: &Path, file_name: &str, bytes: &[u8]) -> EditorResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = unique_path(dir, file_name);
    tokio::fs::write(&path, bytes).await?;
    info!(path = %path.display(), "download saved");
    Ok(path)
}

/// `name`, or `stem (n).ext` when taken
fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (file_name, String::new()),
    };
    (1..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
