use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::backend::Backend;
use crate::error::{EditorError, EditorResult};
use crate::geometry::Size;
use crate::state::data::{ActiveTemplate, ImageBlob, Template};

/// Supported photo extensions
const PHOTO_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Clip formats recognized next to a photo with the same stem
const VIDEO_EXTENSIONS: [&str; 3] = ["webm", "mp4", "mov"];

/// A photo read from disk
#[derive(Debug, Clone)]
pub struct ImportedPhoto {
    pub path: PathBuf,
    pub blob: ImageBlob,
    pub size: Size,
    /// Clip recorded alongside the photo, if any
    pub video: Option<PathBuf>,
}

/// Result of a folder import operation
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub photos: Vec<ImportedPhoto>,
    pub skipped: usize,
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}

pub fn is_photo(path: &Path) -> bool {
    has_extension(path, &PHOTO_EXTENSIONS)
}

/// All photos below `folder`, sorted by path
pub fn scan_folder(folder: &Path) -> Vec<PathBuf> {
    let mut photos: Vec<PathBuf> = WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_photo(e.path()))
        .map(|e| e.into_path())
        .collect();
    photos.sort();
    photos
}

fn sidecar_video(photo: &Path) -> Option<PathBuf> {
    VIDEO_EXTENSIONS
        .iter()
        .map(|ext| photo.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// Read and validate every photo below `folder`.
/// Unreadable or undecodable files are skipped.
pub async fn import_folder(folder: PathBuf) -> ImportReport {
    info!(folder = %folder.display(), "scanning folder");
    let mut report = ImportReport::default();

    for path in scan_folder(&folder) {
        match read_photo(&path).await {
            Ok(photo) => {
                debug!(path = %path.display(), width = photo.size.width, height = photo.size.height, "photo imported");
                report.photos.push(photo);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping photo");
                report.skipped += 1;
            }
        }
    }

    info!(imported = report.photos.len(), skipped = report.skipped, "import complete");
    report
}

async fn read_photo(path: &Path) -> EditorResult<ImportedPhoto> {
    let blob = ImageBlob::new(tokio::fs::read(path).await?);
    let size = blob.dimensions()?;
    Ok(ImportedPhoto {
        path: path.to_path_buf(),
        blob,
        size,
        video: sidecar_video(path),
    })
}

/// Pick the template for a layout (default first) and fetch its image
pub async fn load_template<B: Backend>(backend: &B, aspect_ratio: &str, cell_layout: &str) -> EditorResult<ActiveTemplate> {
    let templates = backend.list_templates_by_layout(aspect_ratio, cell_layout).await?;
    let template = templates
        .iter()
        .find(|t| t.is_default)
        .or_else(|| templates.first())
        .cloned()
        .ok_or_else(|| EditorError::not_ready(format!("no template for {aspect_ratio} {cell_layout}")))?;
    activate_template(backend, template).await
}

/// Fetch a template's image and measure it
pub async fn activate_template<B: Backend>(backend: &B, info: Template) -> EditorResult<ActiveTemplate> {
    let image = backend.fetch_asset(&info.template_path).await?;
    let size = image.dimensions()?;
    Ok(ActiveTemplate { info, size, image, recolored: None })
}
