/// Non-destructive edit layers for one photo slot
///
/// A `Transform` records *what* the user asked for (stylized base, crop
/// rectangle, filter values, background removal/replacement). The pixels
/// derived from it live in the transform model's cache, never here, so a
/// `Transform` can be serialized and compared freely.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Which source image feeds the pipeline
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BaseKind {
    #[default]
    Original,
    Stylized,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BaseLayer {
    #[serde(rename = "type")]
    pub kind: BaseKind,
    pub style_prompt: Option<String>,
    pub style_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CropLayer {
    pub enabled: bool,
    /// Kept while disabled so the same rectangle can be re-applied
    pub data: Option<Rect>,
}

/// Filter adjustments, CSS-style units
///
/// Percentages are 100 for "no change"; blur/sharpness/grain are 0 for
/// "no change".
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FilterValues {
    /// Brightness in percent (100 = unchanged)
    pub brightness: f32,
    /// Contrast in percent (100 = unchanged)
    pub contrast: f32,
    /// Saturation in percent (0 = grayscale, 100 = unchanged)
    pub saturate: f32,
    /// Gaussian blur radius in pixels
    pub blur: f32,
    /// Color temperature in percent (100 = unchanged)
    pub warmth: f32,
    pub sharpness: f32,
    pub grain: f32,
}

impl Default for FilterValues {
    /// Neutral values (no adjustment)
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturate: 100.0,
            blur: 0.0,
            warmth: 100.0,
            sharpness: 0.0,
            grain: 0.0,
        }
    }
}

impl FilterValues {
    /// Check if every value sits at its neutral default
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    /// Convert to JSON for the backend's `filters` form field
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Overlay the fields present in `patch`
    pub fn merge(&mut self, patch: &FilterPatch) {
        let fields = [
            (&mut self.brightness, patch.brightness),
            (&mut self.contrast, patch.contrast),
            (&mut self.saturate, patch.saturate),
            (&mut self.blur, patch.blur),
            (&mut self.warmth, patch.warmth),
            (&mut self.sharpness, patch.sharpness),
            (&mut self.grain, patch.grain),
        ];
        for (slot, value) in fields {
            if let Some(v) = value {
                *slot = v;
            }
        }
    }
}

/// Partial filter update; absent fields keep their current value
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterPatch {
    pub brightness: Option<f32>,
    pub contrast: Option<f32>,
    pub saturate: Option<f32>,
    pub blur: Option<f32>,
    pub warmth: Option<f32>,
    pub sharpness: Option<f32>,
    pub grain: Option<f32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FilterLayer {
    pub enabled: bool,
    pub values: FilterValues,
}

impl Default for FilterLayer {
    fn default() -> Self {
        Self { enabled: false, values: FilterValues::default() }
    }
}

/// Tuning for the backend's background removal
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundSettings {
    pub threshold: u32,
    pub bg_threshold: u32,
    pub erode_size: u32,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self { threshold: 240, bg_threshold: 10, erode_size: 10 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundPatch {
    pub threshold: Option<u32>,
    pub bg_threshold: Option<u32>,
    pub erode_size: Option<u32>,
}

impl BackgroundSettings {
    pub fn merge(&mut self, patch: &BackgroundPatch) {
        if let Some(v) = patch.threshold {
            self.threshold = v;
        }
        if let Some(v) = patch.bg_threshold {
            self.bg_threshold = v;
        }
        if let Some(v) = patch.erode_size {
            self.erode_size = v;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundLayer {
    pub enabled: bool,
    pub settings: BackgroundSettings,
    pub replaced: bool,
    pub replacement_color: Option<String>,
}

/// All edit layers of one photo slot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Transform {
    pub base: BaseLayer,
    pub crop: CropLayer,
    pub filters: FilterLayer,
    pub background: BackgroundLayer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_neutral() {
        let t = Transform::default();
        assert!(!t.crop.enabled && !t.background.enabled);
        assert!(FilterValues::default().is_neutral());
    }

    #[test]
    fn test_merge_only_touches_given_fields() {
        let mut values = FilterValues::default();
        values.merge(&FilterPatch { brightness: Some(120.0), grain: Some(5.0), ..Default::default() });

        assert_eq!(values.brightness, 120.0);
        assert_eq!(values.grain, 5.0);
        assert_eq!(values.contrast, 100.0);
        assert!(!values.is_neutral());
    }

    #[test]
    fn test_serialization_uses_backend_field_names() {
        let mut t = Transform::default();
        t.base.kind = BaseKind::Stylized;
        t.background.replacement_color = Some("#ff0000".to_string());

        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["base"]["type"], "stylized");
        assert_eq!(json["background"]["replacementColor"], "#ff0000");
        assert_eq!(json["background"]["settings"]["bgThreshold"], 10);

        let restored: Transform = serde_json::from_value(json).unwrap();
        assert_eq!(restored, t);
    }

    #[test]
    fn test_background_merge() {
        let mut s = BackgroundSettings::default();
        s.merge(&BackgroundPatch { erode_size: Some(3), ..Default::default() });
        assert_eq!(s, BackgroundSettings { threshold: 240, bg_threshold: 10, erode_size: 3 });
    }
}
