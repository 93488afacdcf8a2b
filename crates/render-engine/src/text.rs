//! Text measurement and rasterization.
//!
//! Overlay text is drawn bold, with a black outline under a colored fill.
//! The compositor only needs two things from a font: the advance width of a
//! string and an alpha mask for it, so both live behind [`TextRasterizer`].

use std::path::{Path, PathBuf};

use rusttype::{point, Font, Scale};
use shortcraft_common::error::{ShortcraftError, ShortcraftResult};

use crate::canvas::Coverage;

/// Bold sans-serif fonts tried, in order, when no font is configured.
pub const FONT_SEARCH_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Measures and rasterizes single-line text at a pixel size.
pub trait TextRasterizer: Send + Sync {
    /// Advance width of `text` in pixels.
    fn measure(&self, text: &str, size: f32) -> f32;

    /// Alpha mask of `text`. The mask's offsets are relative to the pen
    /// start on the x axis and to the vertical middle of the em box on the
    /// y axis.
    fn rasterize(&self, text: &str, size: f32) -> Coverage;
}

/// TrueType rasterizer backed by `rusttype`.
pub struct RustTypeRasterizer {
    font: Font<'static>,
    source: Option<PathBuf>,
}

impl RustTypeRasterizer {
    pub fn from_bytes(bytes: Vec<u8>) -> ShortcraftResult<Self> {
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| ShortcraftError::render("Font data is not a valid TrueType font"))?;
        Ok(Self { font, source: None })
    }

    pub fn from_file(path: impl AsRef<Path>) -> ShortcraftResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ShortcraftError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path)?;
        let mut rasterizer = Self::from_bytes(bytes)?;
        rasterizer.source = Some(path.to_path_buf());
        Ok(rasterizer)
    }

    /// Load the configured font, else the first available system font.
    pub fn discover(configured: Option<&Path>) -> ShortcraftResult<Self> {
        if let Some(path) = configured {
            return Self::from_file(path);
        }
        for candidate in FONT_SEARCH_PATHS {
            let path = Path::new(candidate);
            if !path.exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(rasterizer) => {
                    tracing::debug!(font = %path.display(), "Loaded overlay font");
                    return Ok(rasterizer);
                }
                Err(e) => tracing::warn!(font = %path.display(), error = %e, "Skipping font"),
            }
        }
        Err(ShortcraftError::unsupported(
            "No bold TrueType font found; set render.font_path in the config",
        ))
    }

    /// File the font was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Baseline offset below the em-box middle.
    fn baseline_from_middle(&self, scale: Scale) -> f32 {
        let v = self.font.v_metrics(scale);
        (v.ascent + v.descent) / 2.0
    }
}

impl TextRasterizer for RustTypeRasterizer {
    fn measure(&self, text: &str, size: f32) -> f32 {
        let scale = Scale::uniform(size);
        self.font
            .layout(text, scale, point(0.0, 0.0))
            .last()
            .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
            .unwrap_or(0.0)
    }

    fn rasterize(&self, text: &str, size: f32) -> Coverage {
        let scale = Scale::uniform(size);
        let baseline = self.baseline_from_middle(scale);
        let glyphs: Vec<_> = self
            .font
            .layout(text, scale, point(0.0, baseline))
            .filter_map(|g| g.pixel_bounding_box().map(|bb| (g, bb)))
            .collect();

        let Some(min_x) = glyphs.iter().map(|(_, bb)| bb.min.x).min() else {
            return Coverage::default();
        };
        let min_y = glyphs.iter().map(|(_, bb)| bb.min.y).min().unwrap_or(0);
        let max_x = glyphs.iter().map(|(_, bb)| bb.max.x).max().unwrap_or(min_x);
        let max_y = glyphs.iter().map(|(_, bb)| bb.max.y).max().unwrap_or(min_y);

        let mut mask = Coverage::new(
            min_x,
            min_y,
            (max_x - min_x).max(0) as u32,
            (max_y - min_y).max(0) as u32,
        );
        for (glyph, bb) in &glyphs {
            let ox = (bb.min.x - min_x) as u32;
            let oy = (bb.min.y - min_y) as u32;
            glyph.draw(|x, y, v| {
                mask.accumulate(ox + x, oy + y, (v * 255.0).round().clamp(0.0, 255.0) as u8);
            });
        }
        mask
    }
}

/// Font-free rasterizer drawing each visible character as a solid block.
///
/// Deterministic on every machine, which makes it the rasterizer of choice
/// for tests and headless previews.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockRasterizer;

impl BlockRasterizer {
    const ADVANCE: f32 = 0.6;
    const GLYPH_WIDTH: f32 = 0.5;
    const GLYPH_HEIGHT: f32 = 0.7;
}

impl TextRasterizer for BlockRasterizer {
    fn measure(&self, text: &str, size: f32) -> f32 {
        text.chars().count() as f32 * size * Self::ADVANCE
    }

    fn rasterize(&self, text: &str, size: f32) -> Coverage {
        let count = text.chars().count();
        if count == 0 || size <= 0.0 {
            return Coverage::default();
        }
        let advance = size * Self::ADVANCE;
        let glyph_w = (size * Self::GLYPH_WIDTH).round().max(1.0) as u32;
        let glyph_h = (size * Self::GLYPH_HEIGHT).round().max(1.0) as u32;
        let width = (advance * count as f32).ceil() as u32;

        let mut mask = Coverage::new(0, -(glyph_h as i32) / 2, width, glyph_h);
        for (i, c) in text.chars().enumerate() {
            if c.is_whitespace() {
                continue;
            }
            let x0 = (i as f32 * advance).round() as u32;
            for y in 0..glyph_h {
                for x in x0..(x0 + glyph_w).min(width) {
                    mask.accumulate(x, y, 255);
                }
            }
        }
        mask
    }
}
