/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the backend layer, the edit pipeline and the UI layer.

use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use crate::error::EditorResult;
use crate::geometry::Size;

/// Encoded image bytes (JPEG/PNG/...), cheap to clone
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBlob {
    bytes: Arc<[u8]>,
}

impl ImageBlob {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn decode(&self) -> EditorResult<DynamicImage> {
        Ok(image::load_from_memory(&self.bytes)?)
    }

    /// Natural pixel size, decoding only the header when possible
    pub fn dimensions(&self) -> EditorResult<Size> {
        let reader = image::ImageReader::new(Cursor::new(self.bytes()))
            .with_guessed_format()?;
        let (w, h) = reader.into_dimensions()?;
        Ok(Size::new(w as f32, h as f32))
    }

    /// Encode as PNG so transparency survives
    pub fn encode_png(image: &RgbaImage) -> EditorResult<Self> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png)?;
        Ok(Self::new(buf.into_inner()))
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob").field("len", &self.len()).finish()
    }
}

/// Stable identity of a captured/uploaded photo, independent of its index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhotoId(pub u64);

/// One photo of the session as it came in (before any edit)
#[derive(Debug, Clone)]
pub struct Photo {
    pub id: PhotoId,
    pub original: ImageBlob,
    /// Server-side path of the clip recorded alongside the photo, if any
    pub video_path: Option<String>,
}

/// A template-defined slot where a photo is placed (natural template pixels)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Hole {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Hole {
    pub fn aspect_ratio(&self) -> f32 {
        self.w / self.h
    }
}

/// Per-hole presentation transform stored with the template
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct HoleTransform {
    #[serde(default)]
    pub rotation: f32,
}

/// Template description as served by the backend
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Template {
    pub template_path: String,
    pub holes: Vec<Hole>,
    #[serde(default)]
    pub transformations: Vec<HoleTransform>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub cell_layout: Option<String>,
    /// Default templates can be recolored locally
    #[serde(default)]
    pub is_default: bool,
}

/// A template after local recoloring: the recolored PNG is uploaded
/// instead of referencing the server path.
#[derive(Debug, Clone)]
pub struct ActiveTemplate {
    pub info: Template,
    /// Natural pixel size of the template image
    pub size: Size,
    pub image: ImageBlob,
    pub recolored: Option<ImageBlob>,
}

impl ActiveTemplate {
    pub fn display_image(&self) -> &ImageBlob {
        self.recolored.as_ref().unwrap_or(&self.image)
    }

    pub fn hole_transform(&self, hole: usize) -> HoleTransform {
        self.info.transformations.get(hole).copied().unwrap_or_default()
    }
}

/// Sticker entry from the sticker gallery
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StickerAsset {
    pub sticker_path: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Stylization preset
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StylePreset {
    pub id: String,
    pub name: String,
    pub prompt: String,
}

/// Saved palette color
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaletteColor {
    pub hex_code: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use image::Rgba;

    pub fn solid_png(w: u32, h: u32, color: [u8; 4]) -> ImageBlob {
        ImageBlob::encode_png(&RgbaImage::from_pixel(w, h, Rgba(color))).unwrap()
    }

    pub fn template(holes: usize) -> Template {
        Template {
            template_path: "/static/templates/strip.png".to_string(),
            holes: (0..holes)
                .map(|i| Hole { x: 20.0, y: 20.0 + i as f32 * 220.0, w: 300.0, h: 200.0 })
                .collect(),
            transformations: vec![HoleTransform::default(); holes],
            aspect_ratio: Some("1:3".to_string()),
            cell_layout: Some(format!("{holes}x1")),
            is_default: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_dimensions_read_header() {
        let blob = fixtures::solid_png(40, 30, [1, 2, 3, 255]);
        assert_eq!(blob.dimensions().unwrap(), Size::new(40.0, 30.0));
    }

    #[test]
    fn template_json_tolerates_missing_optionals() {
        let t: Template = serde_json::from_str(
            r#"{"template_path":"/t.png","holes":[{"x":1,"y":2,"w":30,"h":20}]}"#,
        )
        .unwrap();
        assert!(t.transformations.is_empty());
        assert!(!t.is_default);
        assert_eq!(t.holes[0].aspect_ratio(), 1.5);
    }

    #[test]
    fn clones_compare_equal() {
        let a = fixtures::solid_png(2, 2, [0, 0, 0, 255]);
        assert_eq!(a, a.clone());
        assert_ne!(a, fixtures::solid_png(2, 2, [1, 0, 0, 255]));
    }
}
