//! RGBA raster primitives used by the compositor.
//!
//! Everything here works on `image::RgbaImage` in straight (non-premultiplied)
//! alpha. Opaque fills go through `imageproc`; translucent shapes and glyph
//! masks are blended source-over by hand so results are identical on every
//! platform.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

/// Color used when a color value cannot be interpreted.
pub const FALLBACK_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("aqua", [0, 255, 255]),
    ("black", [0, 0, 0]),
    ("blue", [0, 0, 255]),
    ("brown", [165, 42, 42]),
    ("coral", [255, 127, 80]),
    ("crimson", [220, 20, 60]),
    ("cyan", [0, 255, 255]),
    ("fuchsia", [255, 0, 255]),
    ("gold", [255, 215, 0]),
    ("gray", [128, 128, 128]),
    ("green", [0, 128, 0]),
    ("grey", [128, 128, 128]),
    ("indigo", [75, 0, 130]),
    ("lime", [0, 255, 0]),
    ("magenta", [255, 0, 255]),
    ("maroon", [128, 0, 0]),
    ("navy", [0, 0, 128]),
    ("olive", [128, 128, 0]),
    ("orange", [255, 165, 0]),
    ("pink", [255, 192, 203]),
    ("purple", [128, 0, 128]),
    ("red", [255, 0, 0]),
    ("silver", [192, 192, 192]),
    ("teal", [0, 128, 128]),
    ("tomato", [255, 99, 71]),
    ("violet", [238, 130, 238]),
    ("white", [255, 255, 255]),
    ("yellow", [255, 255, 0]),
];

/// Interpret a text color: `#rgb`, `#rrggbb`, or a CSS color name
/// (case-insensitive). Anything else renders as [`FALLBACK_COLOR`].
pub fn parse_css_color(value: &str) -> Rgba<u8> {
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex).unwrap_or(FALLBACK_COLOR);
    }
    let lower = value.to_ascii_lowercase();
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, [r, g, b])| Rgba([*r, *g, *b, 255]))
        .unwrap_or(FALLBACK_COLOR)
}

fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (slot, c) in rgb.iter_mut().zip(hex.chars()) {
                let v = c.to_digit(16)? as u8;
                *slot = v * 17;
            }
            Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
        }
        6 => {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
        }
        _ => None,
    }
}

/// An 8-bit alpha mask placed relative to an anchor point.
///
/// `left`/`top` give the offset of the mask's top-left pixel from the
/// anchor, so the same mask can be stamped anywhere on a canvas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Coverage {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
    pub alpha: Vec<u8>,
}

impl Coverage {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
            alpha: vec![0; width as usize * height as usize],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.alpha[(y * self.width + x) as usize]
    }

    /// Keep the maximum of the existing and the given coverage.
    pub fn accumulate(&mut self, x: u32, y: u32, value: u8) {
        let idx = (y * self.width + x) as usize;
        if let Some(slot) = self.alpha.get_mut(idx) {
            *slot = (*slot).max(value);
        }
    }

    /// Grow the mask by a disc of `radius` pixels.
    ///
    /// Used to turn a glyph fill into its outline: a stroke of width `w`
    /// centered on the glyph edge covers the glyph dilated by `w / 2`.
    pub fn dilate(&self, radius: f32) -> Coverage {
        if self.is_empty() || radius <= 0.0 {
            return self.clone();
        }
        let r = radius.ceil() as i32;
        let offsets: Vec<(i32, i32, f32)> = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .filter_map(|(dx, dy)| {
                let dist = ((dx * dx + dy * dy) as f32).sqrt();
                // Anti-aliased disc edge.
                let weight = (radius + 0.5 - dist).clamp(0.0, 1.0);
                (weight > 0.0).then_some((dx, dy, weight))
            })
            .collect();

        let grow = r as u32;
        let mut out = Coverage::new(
            self.left - r,
            self.top - r,
            self.width + 2 * grow,
            self.height + 2 * grow,
        );

        for sy in 0..self.height {
            for sx in 0..self.width {
                let a = self.get(sx, sy);
                if a == 0 {
                    continue;
                }
                let cx = sx as i32 + r;
                let cy = sy as i32 + r;
                for &(dx, dy, weight) in &offsets {
                    let value = (a as f32 * weight).round() as u8;
                    out.accumulate((cx + dx) as u32, (cy + dy) as u32, value);
                }
            }
        }
        out
    }
}

/// Fill the whole canvas with an opaque color.
pub fn fill(canvas: &mut RgbaImage, color: Rgba<u8>) {
    for pixel in canvas.pixels_mut() {
        *pixel = color;
    }
}

/// Fill an axis-aligned rectangle with an opaque color.
pub fn fill_rect(canvas: &mut RgbaImage, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
    if width == 0 || height == 0 {
        return;
    }
    draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(width, height), color);
}

/// Source-over blend of `color` with extra opacity `alpha` in `[0, 1]`.
fn blend_pixel(dst: &mut Rgba<u8>, color: Rgba<u8>, alpha: f32) {
    let src_a = (color[3] as f32 / 255.0) * alpha.clamp(0.0, 1.0);
    if src_a <= 0.0 {
        return;
    }
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    for c in 0..3 {
        let s = color[c] as f32;
        let d = dst[c] as f32;
        let v = (s * src_a + d * dst_a * (1.0 - src_a)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Fill a rounded rectangle blended at opacity `alpha`.
///
/// Corner radius is clamped to half the shorter side. Edges are
/// anti-aliased by pixel-center distance.
#[allow(clippy::too_many_arguments)]
pub fn fill_rounded_rect(
    canvas: &mut RgbaImage,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    radius: f32,
    color: Rgba<u8>,
    alpha: f32,
) {
    if width <= 0.0 || height <= 0.0 || alpha <= 0.0 {
        return;
    }
    let radius = radius.clamp(0.0, width.min(height) / 2.0);
    let (cw, ch) = canvas.dimensions();
    let x0 = x.floor().max(0.0) as u32;
    let y0 = y.floor().max(0.0) as u32;
    let x1 = ((x + width).ceil().max(0.0) as u32).min(cw);
    let y1 = ((y + height).ceil().max(0.0) as u32).min(ch);

    for py in y0..y1 {
        for px in x0..x1 {
            let cx = px as f32 + 0.5;
            let cy = py as f32 + 0.5;
            let coverage = rounded_rect_coverage(cx - x, cy - y, width, height, radius);
            if coverage > 0.0 {
                blend_pixel(canvas.get_pixel_mut(px, py), color, alpha * coverage);
            }
        }
    }
}

/// Coverage of a pixel centered at local coordinates `(lx, ly)`.
fn rounded_rect_coverage(lx: f32, ly: f32, width: f32, height: f32, radius: f32) -> f32 {
    let edge = |d: f32| (d + 0.5).clamp(0.0, 1.0);
    let inside = edge(lx).min(edge(width - lx)).min(edge(ly)).min(edge(height - ly));
    if radius <= 0.0 {
        return inside;
    }
    let corner_x = if lx < radius {
        Some(radius - lx)
    } else if lx > width - radius {
        Some(lx - (width - radius))
    } else {
        None
    };
    let corner_y = if ly < radius {
        Some(radius - ly)
    } else if ly > height - radius {
        Some(ly - (height - radius))
    } else {
        None
    };
    match (corner_x, corner_y) {
        (Some(dx), Some(dy)) => {
            let dist = (dx * dx + dy * dy).sqrt();
            (radius - dist + 0.5).clamp(0.0, 1.0).min(inside)
        }
        _ => inside,
    }
}

/// Stamp a coverage mask in `color`, anchored at `(anchor_x, anchor_y)`.
pub fn blend_coverage(
    canvas: &mut RgbaImage,
    mask: &Coverage,
    anchor_x: i32,
    anchor_y: i32,
    color: Rgba<u8>,
) {
    let (cw, ch) = canvas.dimensions();
    for my in 0..mask.height {
        let py = anchor_y + mask.top + my as i32;
        if py < 0 || py >= ch as i32 {
            continue;
        }
        for mx in 0..mask.width {
            let px = anchor_x + mask.left + mx as i32;
            if px < 0 || px >= cw as i32 {
                continue;
            }
            let a = mask.get(mx, my);
            if a > 0 {
                blend_pixel(
                    canvas.get_pixel_mut(px as u32, py as u32),
                    color,
                    a as f32 / 255.0,
                );
            }
        }
    }
}

/// Scale `image` to fit inside a `box_size` square, preserving aspect
/// ratio, and draw it horizontally centered with its top at `top`.
pub fn draw_image_fit(canvas: &mut RgbaImage, image: &RgbaImage, box_size: f32, top: f32) {
    let (iw, ih) = image.dimensions();
    if iw == 0 || ih == 0 || box_size <= 0.0 {
        return;
    }
    let ratio = (box_size / iw as f32).min(box_size / ih as f32);
    let dest_w = ((iw as f32 * ratio).round() as u32).max(1);
    let dest_h = ((ih as f32 * ratio).round() as u32).max(1);
    let dest_x = ((canvas.width() as f32 - dest_w as f32) / 2.0).round() as i64;
    let dest_y = top.round() as i64;

    let scaled = if (dest_w, dest_h) == (iw, ih) {
        image.clone()
    } else {
        imageops::resize(image, dest_w, dest_h, FilterType::Triangle)
    };
    imageops::overlay(canvas, &scaled, dest_x, dest_y);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_colors() {
        assert_eq!(parse_css_color("#ffff00"), Rgba([255, 255, 0, 255]));
        assert_eq!(parse_css_color("#aaa"), Rgba([170, 170, 170, 255]));
        assert_eq!(parse_css_color("#18181B"), Rgba([0x18, 0x18, 0x1b, 255]));
    }

    #[test]
    fn test_parse_named_and_unknown_colors() {
        assert_eq!(parse_css_color("Red"), Rgba([255, 0, 0, 255]));
        assert_eq!(parse_css_color("notacolor"), FALLBACK_COLOR);
        assert_eq!(parse_css_color("#12"), FALLBACK_COLOR);
    }

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut canvas = RgbaImage::new(4, 4);
        fill_rect(&mut canvas, 2, 2, 10, 10, Rgba([1, 2, 3, 255]));
        assert_eq!(canvas.get_pixel(3, 3), &Rgba([1, 2, 3, 255]));
        assert_eq!(canvas.get_pixel(1, 1), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_rounded_rect_blends_and_rounds_corners() {
        let mut canvas = RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]));
        fill_rounded_rect(&mut canvas, 0.0, 0.0, 40.0, 40.0, 15.0, Rgba([0, 0, 0, 255]), 0.5);
        // Center is half-darkened.
        let center = canvas.get_pixel(20, 20);
        assert!((center[0] as i32 - 128).abs() <= 1);
        // The extreme corner lies outside the rounding.
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_zero_alpha_rect_draws_nothing() {
        let mut canvas = RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 255]));
        let before = canvas.clone();
        fill_rounded_rect(&mut canvas, 0.0, 0.0, 8.0, 8.0, 2.0, Rgba([0, 0, 0, 255]), 0.0);
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_dilate_grows_mask() {
        let mut mask = Coverage::new(0, 0, 1, 1);
        mask.accumulate(0, 0, 255);
        let grown = mask.dilate(2.0);
        assert_eq!((grown.left, grown.top), (-2, -2));
        assert_eq!((grown.width, grown.height), (5, 5));
        assert_eq!(grown.get(2, 2), 255);
        assert_eq!(grown.get(3, 2), 255);
        // Disc rim is anti-aliased.
        assert_eq!(grown.get(4, 2), 128);
        assert_eq!(grown.get(0, 0), 0);
    }

    #[test]
    fn test_blend_coverage_respects_anchor() {
        let mut canvas = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let mut mask = Coverage::new(-1, -1, 2, 2);
        mask.accumulate(0, 0, 255);
        blend_coverage(&mut canvas, &mask, 5, 5, Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(4, 4), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(5, 5), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_image_fit_preserves_aspect() {
        let mut canvas = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let wide = RgbaImage::from_pixel(40, 20, Rgba([255, 0, 0, 255]));
        draw_image_fit(&mut canvas, &wide, 80.0, 10.0);
        // 80x40 image centered horizontally at x=10, top at y=10.
        assert_eq!(canvas.get_pixel(10, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(89, 49), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(50, 51), &Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(9, 10), &Rgba([0, 0, 0, 255]));
    }
}
