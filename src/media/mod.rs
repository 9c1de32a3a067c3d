/// Photo import and thumbnail generation
///
/// This module provides:
/// - Folder scanning for photos with optional sidecar videos
/// - Template loading from the backend
/// - Thumbnail generation with on-disk caching

pub mod import;
pub mod thumbnail;
