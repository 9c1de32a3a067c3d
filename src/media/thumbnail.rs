use image::imageops::FilterType;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{EditorError, EditorResult};
use crate::state::data::ImageBlob;

/// Longest edge of generated thumbnails
const THUMBNAIL_SIZE: u32 = 256;

/// Get the thumbnail cache directory
/// Returns ~/.cache/photobooth-editor/thumbnails on Linux
pub fn thumbnail_cache_dir() -> EditorResult<PathBuf> {
    let mut path = dirs_next::cache_dir()
        .or_else(dirs_next::home_dir)
        .ok_or_else(|| EditorError::not_ready("could not determine cache directory"))?;

    path.push("photobooth-editor");
    path.push("thumbnails");
    fs::create_dir_all(&path)?;
    Ok(path)
}

/// Content-derived file stem, so edits produce a new thumbnail
pub fn cache_key(blob: &ImageBlob) -> String {
    let mut hasher = DefaultHasher::new();
    blob.bytes().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Downscale to fit a 256px square. PNG keeps removed backgrounds transparent.
pub fn render_thumbnail(blob: &ImageBlob) -> EditorResult<ImageBlob> {
    let img = blob.decode()?;
    let thumbnail = img.resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3);
    ImageBlob::encode_png(&thumbnail.to_rgba8())
}

/// Path of the cached thumbnail for `blob`, generating it on a miss
pub fn thumbnail_in(dir: &Path, blob: &ImageBlob) -> EditorResult<PathBuf> {
    let path = dir.join(format!("{}.png", cache_key(blob)));
    if path.exists() {
        return Ok(path);
    }
    let rendered = render_thumbnail(blob)?;
    fs::write(&path, rendered.bytes())?;
    debug!(path = %path.display(), "generated thumbnail");
    Ok(path)
}

/// Cached thumbnail, generated off the UI thread
pub async fn thumbnail(blob: ImageBlob) -> EditorResult<PathBuf> {
    tokio::task::spawn_blocking(move || {
        let dir = thumbnail_cache_dir()?;
        thumbnail_in(&dir, &blob)
    })
    .await
    .map_err(|e| EditorError::not_ready(format!("thumbnail worker stopped: {e}")))?
}
