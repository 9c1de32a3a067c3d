/// Color utilities
///
/// This module handles the small amount of pixel work the editor does
/// locally instead of delegating to the backend:
/// - Parsing CSS-style hex colors (`#rgb`, `#rrggbb`, `#rrggbbaa`)
/// - Filling a flat color behind an alpha-bearing (background-removed) photo
/// - Recoloring a template's opaque pixels ("source-in" fill)

use image::{Rgba, RgbaImage};

use crate::error::{EditorError, EditorResult};

/// Parse a hex color string into RGBA
pub fn parse_hex(color: &str) -> EditorResult<Rgba<u8>> {
    let hex = color.trim().trim_start_matches('#');

    let channel = |s: &str| {
        u8::from_str_radix(s, 16).map_err(|_| EditorError::validation(format!("invalid color: {color}")))
    };

    match hex.len() {
        3 => {
            // #abc -> #aabbcc
            let expand = |i: usize| channel(&hex[i..i + 1].repeat(2));
            Ok(Rgba([expand(0)?, expand(1)?, expand(2)?, 255]))
        }
        6 => Ok(Rgba([channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?, 255])),
        8 => Ok(Rgba([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            channel(&hex[6..8])?,
        ])),
        _ => Err(EditorError::validation(format!("invalid color: {color}"))),
    }
}

/// Check if a color is plain white (recoloring with it is a no-op)
pub fn is_white(color: &Rgba<u8>) -> bool {
    color.0[..3] == [255, 255, 255]
}

/// Draw `fill` across the whole canvas, then `foreground` on top with
/// standard "source-over" alpha blending.
///
/// The fill only shows through where the foreground is (partially)
/// transparent.
pub fn fill_behind(foreground: &RgbaImage, fill: Rgba<u8>) -> RgbaImage {
    let mut out = RgbaImage::from_pixel(foreground.width(), foreground.height(), fill);

    for (dst, src) in out.pixels_mut().zip(foreground.pixels()) {
        *dst = source_over(*src, *dst);
    }

    out
}

/// Replace the color of every non-transparent template pixel with `color`,
/// keeping the template's alpha.
pub fn recolor_opaque(template: &RgbaImage, color: Rgba<u8>) -> RgbaImage {
    if is_white(&color) {
        return template.clone();
    }

    let mut out = template.clone();
    for px in out.pixels_mut() {
        // source-in: result alpha = src alpha * dst alpha
        let alpha = (px.0[3] as u16 * color.0[3] as u16 / 255) as u8;
        *px = Rgba([color.0[0], color.0[1], color.0[2], alpha]);
    }
    out
}

fn source_over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = src.0[3] as f32 / 255.0;
    let da = dst.0[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);

    if out_a <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = src.0[c] as f32 / 255.0;
        let d = dst.0[c] as f32 / 255.0;
        let v = (s * sa + d * da * (1.0 - sa)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    Rgba(out)
}
