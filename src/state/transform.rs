/// Per-photo layered edit pipeline
///
/// Each photo slot has a `Transform` (what the user asked for) and a
/// `PhotoCache` (pixels derived from it). The pipeline order is fixed:
///
///   base (original | stylized)
///     → background removal (+ flat color replacement)
///     → crop
///     → filters (approximated locally for the preview, baked by the
///       backend at export)
///
/// Every setter invalidates exactly the cache entries that depend on the
/// layer it changes. This model is the only place that touches the caches.

use image::{imageops, RgbaImage};
use tracing::{debug, warn};

use super::data::ImageBlob;
use super::edit::{BackgroundPatch, BaseKind, FilterPatch, FilterValues, Transform};
use crate::backend::Backend;
use crate::color;
use crate::error::{EditorError, EditorResult};
use crate::geometry::Rect;

/// Derived pixels for one slot. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoCache {
    pub stylized: Option<ImageBlob>,
    /// Background-removed version of the *current* base
    pub bg_removed: Option<ImageBlob>,
    pub final_composed: Option<ImageBlob>,
}

#[derive(Debug, Clone, Default)]
pub struct PhotoTransformModel {
    transforms: Vec<Transform>,
    caches: Vec<PhotoCache>,
    originals: Vec<Option<ImageBlob>>,
}

impl PhotoTransformModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate fresh slots for a new session, discarding all prior state
    pub fn init(&mut self, photo_count: usize) {
        self.transforms = vec![Transform::default(); photo_count];
        self.caches = vec![PhotoCache::default(); photo_count];
        self.originals = vec![None; photo_count];
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    fn check(&self, index: usize) -> EditorResult<()> {
        if index < self.transforms.len() {
            Ok(())
        } else {
            Err(EditorError::InvalidIndex { index, len: self.transforms.len() })
        }
    }

    /// Install (or replace, on retake) the as-captured photo of a slot
    pub fn set_original(&mut self, index: usize, blob: ImageBlob) -> EditorResult<()> {
        self.check(index)?;
        self.originals[index] = Some(blob);
        if self.transforms[index].base.kind == BaseKind::Original {
            self.caches[index].bg_removed = None;
        }
        self.caches[index].final_composed = None;
        Ok(())
    }

    pub fn transform(&self, index: usize) -> EditorResult<&Transform> {
        self.check(index)?;
        Ok(&self.transforms[index])
    }

    pub fn cache(&self, index: usize) -> EditorResult<&PhotoCache> {
        self.check(index)?;
        Ok(&self.caches[index])
    }

    /// Stylized blob when the base is stylized and one is cached, the
    /// original otherwise
    pub fn base_blob(&self, index: usize) -> EditorResult<ImageBlob> {
        self.check(index)?;
        let t = &self.transforms[index];
        if t.base.kind == BaseKind::Stylized {
            if let Some(stylized) = &self.caches[index].stylized {
                return Ok(stylized.clone());
            }
        }
        self.originals[index]
            .clone()
            .ok_or_else(|| EditorError::not_ready(format!("photo {index} has no image")))
    }

    pub fn has_stylized(&self, index: usize) -> bool {
        self.transforms
            .get(index)
            .is_some_and(|t| t.base.kind == BaseKind::Stylized)
    }

    /// Switch the base to a stylized image.
    ///
    /// A new base invalidates every mask and composite computed against the
    /// old one. Crop is disabled but its rectangle is kept.
    pub fn set_stylized(
        &mut self,
        index: usize,
        prompt: &str,
        style_id: Option<&str>,
        blob: ImageBlob,
    ) -> EditorResult<()> {
        self.check(index)?;
        let t = &mut self.transforms[index];
        t.base.kind = BaseKind::Stylized;
        t.base.style_prompt = Some(prompt.to_string());
        t.base.style_id = style_id.map(str::to_string);

        t.crop.enabled = false;
        t.background.enabled = false;
        t.background.replaced = false;

        let cache = &mut self.caches[index];
        cache.stylized = Some(blob);
        cache.bg_removed = None;
        cache.final_composed = None;
        debug!(index, prompt, "base switched to stylized");
        Ok(())
    }

    /// Switch the base back to the original photo.
    ///
    /// Crop is always left disabled; it is never re-enabled automatically.
    pub fn reset_to_original(&mut self, index: usize) -> EditorResult<()> {
        self.check(index)?;
        let t = &mut self.transforms[index];
        t.base.kind = BaseKind::Original;
        t.base.style_prompt = None;
        t.base.style_id = None;

        t.crop.enabled = false;
        t.background.enabled = false;

        let cache = &mut self.caches[index];
        cache.bg_removed = None;
        cache.final_composed = None;
        Ok(())
    }

    /// Set or clear the crop rectangle (natural pixels of the base image)
    pub fn set_crop(&mut self, index: usize, rect: Option<Rect>) -> EditorResult<()> {
        self.check(index)?;
        let crop = &mut self.transforms[index].crop;
        crop.enabled = rect.is_some();
        crop.data = rect;
        // Background removal runs on the pre-crop base, so its mask survives
        self.caches[index].final_composed = None;
        Ok(())
    }

    /// Merge filter values. Filters are a presentation layer until export,
    /// so no cached pixels are invalidated.
    pub fn set_filters(&mut self, index: usize, patch: &FilterPatch) -> EditorResult<()> {
        self.check(index)?;
        let filters = &mut self.transforms[index].filters;
        filters.enabled = true;
        filters.values.merge(patch);
        Ok(())
    }

    /// Toggle background removal. The caller fetches the mask and hands it
    /// back through `set_bg_removed_blob`.
    pub fn set_background_removal(
        &mut self,
        index: usize,
        enabled: bool,
        patch: Option<&BackgroundPatch>,
    ) -> EditorResult<()> {
        self.check(index)?;
        let bg = &mut self.transforms[index].background;
        bg.enabled = enabled;
        if let Some(patch) = patch {
            bg.settings.merge(patch);
        }
        self.caches[index].final_composed = None;
        Ok(())
    }

    pub fn set_bg_removed_blob(&mut self, index: usize, blob: ImageBlob) -> EditorResult<()> {
        self.check(index)?;
        let cache = &mut self.caches[index];
        cache.bg_removed = Some(blob);
        cache.final_composed = None;
        Ok(())
    }

    pub fn set_bg_replacement(
        &mut self,
        index: usize,
        replaced: bool,
        color: Option<String>,
    ) -> EditorResult<()> {
        self.check(index)?;
        let bg = &mut self.transforms[index].background;
        bg.replaced = replaced;
        bg.replacement_color = color;
        self.caches[index].final_composed = None;
        Ok(())
    }

    /// Base with background removal/replacement applied, before crop
    pub fn pre_crop_blob(&self, index: usize) -> EditorResult<ImageBlob> {
        let base = self.base_blob(index)?;
        let t = &self.transforms[index];
        let cache = &self.caches[index];

        match (&cache.bg_removed, t.background.enabled) {
            (Some(mask), true) => match (t.background.replaced, &t.background.replacement_color) {
                (true, Some(color)) => apply_bg_replacement(mask, color),
                _ => Ok(mask.clone()),
            },
            _ => Ok(base),
        }
    }

    /// Resolve background → crop into one blob and cache it
    pub fn compose(&mut self, index: usize) -> EditorResult<ImageBlob> {
        self.check(index)?;
        if let Some(cached) = &self.caches[index].final_composed {
            return Ok(cached.clone());
        }

        let mut current = self.pre_crop_blob(index)?;

        let crop = &self.transforms[index].crop;
        if let (true, Some(rect)) = (crop.enabled, crop.data) {
            current = apply_crop(&current, &rect)?;
        }

        self.caches[index].final_composed = Some(current.clone());
        Ok(current)
    }

    /// Composed blob with filters baked in by the backend when any filter
    /// differs from neutral. A failed bake falls back to the unbaked blob.
    pub async fn final_blob<B: Backend>(&mut self, index: usize, backend: &B) -> EditorResult<ImageBlob> {
        let composed = self.compose(index)?;
        let values = self.transforms[index].filters.values;
        Ok(bake_filters(backend, composed, &values).await)
    }

    /// Composed blob with a local approximation of the filters, for the live
    /// preview and thumbnails
    pub fn preview_blob(&mut self, index: usize) -> EditorResult<ImageBlob> {
        let composed = self.compose(index)?;
        let filters = &self.transforms[index].filters;
        if !filters.enabled || filters.values.is_neutral() {
            return Ok(composed);
        }
        let image = composed.decode()?.to_rgba8();
        ImageBlob::encode_png(&preview_filters(image, &filters.values))
    }

    /// CSS-style filter descriptor for the live preview
    pub fn filter_string(&self, index: usize) -> EditorResult<String> {
        let filters = &self.transform(index)?.filters;
        if !filters.enabled {
            return Ok("none".to_string());
        }
        let f = &filters.values;
        Ok(format!(
            "brightness({}%) contrast({}%) saturate({}%) blur({}px)",
            f.brightness, f.contrast, f.saturate, f.blur
        ))
    }

    /// Move a slot, keeping transforms, caches and originals aligned
    pub fn reorder(&mut self, from: usize, to: usize) -> EditorResult<()> {
        self.check(from)?;
        self.check(to)?;
        move_item(&mut self.transforms, from, to);
        move_item(&mut self.caches, from, to);
        move_item(&mut self.originals, from, to);
        Ok(())
    }

    /// Every cached stylized image, with the prompt it was made from
    pub fn stylized_blobs(&self) -> Vec<(usize, String, ImageBlob)> {
        self.caches
            .iter()
            .zip(&self.transforms)
            .enumerate()
            .filter_map(|(i, (cache, t))| {
                let blob = cache.stylized.clone()?;
                let prompt = t.base.style_prompt.clone().unwrap_or_default();
                Some((i, prompt, blob))
            })
            .collect()
    }
}

pub(crate) fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from == to {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}

/// Bake filters through the backend; never fails
pub async fn bake_filters<B: Backend>(backend: &B, blob: ImageBlob, values: &FilterValues) -> ImageBlob {
    if values.is_neutral() {
        return blob;
    }
    match backend.apply_filters(&blob, values).await {
        Ok(baked) => baked,
        Err(e) => {
            warn!(error = %e, "filter baking failed, using unbaked image");
            blob
        }
    }
}

/// Brightness, saturation and warmth per pixel, then contrast and blur.
/// Sharpness and grain only exist in the backend bake.
fn preview_filters(mut image: RgbaImage, f: &FilterValues) -> RgbaImage {
    let brightness = f.brightness / 100.0;
    let saturate = f.saturate / 100.0;
    let warmth = (f.warmth - 100.0) / 100.0;
    let channel = |v: f32| v.round().clamp(0.0, 255.0) as u8;

    for px in image.pixels_mut() {
        let [r, g, b, a] = px.0;
        let (r, g, b) = (r as f32 * brightness, g as f32 * brightness, b as f32 * brightness);
        let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        let mix = |c: f32| luma + (c - luma) * saturate;
        px.0 = [channel(mix(r) * (1.0 + warmth)), channel(mix(g)), channel(mix(b) * (1.0 - warmth)), a];
    }

    if f.contrast != 100.0 {
        image = imageops::contrast(&image, f.contrast - 100.0);
    }
    if f.blur > 0.0 {
        image = imageops::blur(&image, f.blur);
    }
    image
}

/// Flat `color` fill behind the background-removed image, as PNG
fn apply_bg_replacement(mask: &ImageBlob, color: &str) -> EditorResult<ImageBlob> {
    let fill = color::parse_hex(color)?;
    let foreground = mask.decode()?.to_rgba8();
    ImageBlob::encode_png(&color::fill_behind(&foreground, fill))
}

/// Cut `rect` out of the image, keeping alpha
fn apply_crop(blob: &ImageBlob, rect: &Rect) -> EditorResult<ImageBlob> {
    let image = blob.decode()?;
    let r = rect.clamp_to(image.width() as f32, image.height() as f32);
    let cropped = image.crop_imm(
        r.x.round() as u32,
        r.y.round() as u32,
        r.width.round().max(1.0) as u32,
        r.height.round().max(1.0) as u32,
    );
    ImageBlob::encode_png(&cropped.to_rgba8())
}
