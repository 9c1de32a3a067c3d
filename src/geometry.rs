/// Natural-image ↔ screen coordinate mapping
///
/// The preview shows the template letterboxed inside its container
/// (`ContentFit::Contain`). Every overlay (photos, stickers, texts, guides)
/// is stored in the template's natural pixel space and mapped through a
/// `PreviewScaling` to land on screen.

use cgmath::Point2;
use serde::{Deserialize, Serialize};

pub type Point = Point2<f32>;

/// Width/height pair in either natural or screen pixels
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite()) || self.width <= 0.0 || self.height <= 0.0
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width / self.height
    }
}

/// Axis-aligned rectangle, top-left origin
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Intersect with `[0, w] x [0, h]`, keeping at least one pixel
    pub fn clamp_to(&self, w: f32, h: f32) -> Rect {
        let x = self.x.clamp(0.0, (w - 1.0).max(0.0));
        let y = self.y.clamp(0.0, (h - 1.0).max(0.0));
        let width = self.width.min(w - x).max(1.0);
        let height = self.height.min(h - y).max(1.0);
        Rect { x, y, width, height }
    }
}

/// How the natural image sits inside its on-screen container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewScaling {
    /// Screen pixels per natural pixel
    pub scale: f32,
    /// Left edge of the rendered image inside the container
    pub offset_x: f32,
    /// Top edge of the rendered image inside the container
    pub offset_y: f32,
    pub rendered_width: f32,
    pub rendered_height: f32,
}

impl PreviewScaling {
    /// Fit `natural` inside `container` preserving aspect ratio, centered.
    ///
    /// Returns `None` while either size is unknown or zero (image not loaded
    /// yet, container not laid out).
    pub fn contain(natural: Size, container: Size) -> Option<Self> {
        if natural.is_degenerate() || container.is_degenerate() {
            return None;
        }

        let scale = (container.width / natural.width).min(container.height / natural.height);
        let rendered_width = natural.width * scale;
        let rendered_height = natural.height * scale;

        Some(Self {
            scale,
            offset_x: (container.width - rendered_width) / 2.0,
            offset_y: (container.height - rendered_height) / 2.0,
            rendered_width,
            rendered_height,
        })
    }

    pub fn to_screen(&self, p: Point) -> Point {
        Point::new(self.offset_x + p.x * self.scale, self.offset_y + p.y * self.scale)
    }

    pub fn to_natural(&self, p: Point) -> Point {
        Point::new((p.x - self.offset_x) / self.scale, (p.y - self.offset_y) / self.scale)
    }

    pub fn rect_to_screen(&self, r: &Rect) -> Rect {
        Rect {
            x: self.offset_x + r.x * self.scale,
            y: self.offset_y + r.y * self.scale,
            width: r.width * self.scale,
            height: r.height * self.scale,
        }
    }

    /// Natural length in screen pixels
    pub fn scale_len(&self, len: f32) -> f32 {
        len * self.scale
    }

    pub fn natural_width(&self) -> f32 {
        self.rendered_width / self.scale
    }

    /// Screen-space x of the rendered image's horizontal center
    pub fn center_x(&self) -> f32 {
        self.offset_x + self.rendered_width / 2.0
    }
}

/// Largest centered rectangle of `target_aspect` that fits the image.
///
/// Used as the starting crop when a photo has none yet, and recomputed
/// against the background-processed image when the base changes.
pub fn default_crop(image_width: f32, image_height: f32, target_aspect: f32) -> Rect {
    let image_aspect = image_width / image_height;

    if image_aspect > target_aspect {
        // Wider than the hole: keep full height, trim the sides
        let width = image_height * target_aspect;
        Rect::new((image_width - width) / 2.0, 0.0, width, image_height)
    } else {
        // Taller than the hole: keep full width, trim top and bottom
        let height = image_width / target_aspect;
        Rect::new(0.0, (image_height - height) / 2.0, image_width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contain_letterboxes_wide_container() {
        let s = PreviewScaling::contain(Size::new(1000.0, 1500.0), Size::new(800.0, 600.0)).unwrap();
        assert_eq!(s.scale, 0.4);
        assert_eq!(s.rendered_width, 400.0);
        assert_eq!(s.rendered_height, 600.0);
        assert_eq!(s.offset_x, 200.0);
        assert_eq!(s.offset_y, 0.0);
    }

    #[test]
    fn contain_rejects_unloaded_sizes() {
        assert!(PreviewScaling::contain(Size::new(0.0, 100.0), Size::new(800.0, 600.0)).is_none());
        assert!(PreviewScaling::contain(Size::new(100.0, 100.0), Size::default()).is_none());
    }

    #[test]
    fn screen_and_natural_are_inverse() {
        let s = PreviewScaling::contain(Size::new(1200.0, 1800.0), Size::new(900.0, 900.0)).unwrap();
        let p = Point::new(321.0, 654.0);
        let back = s.to_natural(s.to_screen(p));
        assert!((back.x - p.x).abs() < 1e-3);
        assert!((back.y - p.y).abs() < 1e-3);
        assert!((s.natural_width() - 1200.0).abs() < 1e-3);
    }

    #[test]
    fn default_crop_is_centered_with_target_aspect() {
        let wide = default_crop(1600.0, 900.0, 1.0);
        assert_eq!(wide, Rect::new(350.0, 0.0, 900.0, 900.0));

        let tall = default_crop(900.0, 1600.0, 1.5);
        assert_eq!(tall.width, 900.0);
        assert_eq!(tall.height, 600.0);
        assert_eq!(tall.y, 500.0);
    }

    #[test]
    fn clamp_keeps_rect_inside_image() {
        let r = Rect::new(-10.0, 50.0, 500.0, 500.0).clamp_to(200.0, 300.0);
        assert_eq!(r, Rect::new(0.0, 50.0, 200.0, 250.0));
    }
}
