//! Frame compositor: draws one clip's frame from settings and clip content.
//!
//! The same routine feeds the live preview and the offline export, so its
//! output depends only on its inputs. Drawing order:
//!
//! ```text
//! background #18181b
//!   └── image (fit inside a centered square) | broken-image placeholder
//!         └── title lines 1 and 2 at the top guideline
//!               └── subtitle box + text at the bottom guideline
//!                     └── CTA box + text at the CTA guideline
//! ```

use std::sync::Arc;

use image::{Rgba, RgbaImage};
use shortcraft_project_model::{
    parse_overlay, parse_styled_line, ProjectSettings, StyledRun, TextRole, TextStyle,
};

use crate::canvas::{self, blend_coverage, fill_rounded_rect, parse_css_color};
use crate::text::TextRasterizer;

pub const BACKGROUND_COLOR: Rgba<u8> = Rgba([0x18, 0x18, 0x1b, 255]);
pub const BROKEN_IMAGE_COLOR: Rgba<u8> = Rgba([0x33, 0x33, 0x33, 255]);
pub const BROKEN_IMAGE_LABEL: &str = "Broken Image";
const BROKEN_IMAGE_FONT_SIZE: f32 = 48.0;

const STROKE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const BOX_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const BOX_MAX_ALPHA: f32 = 0.6;
const BOX_RADIUS: f32 = 15.0;
const BOX_PADDING_X: f32 = 24.0;
const BOX_PADDING_Y: f32 = 10.0;
const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// Share of the shorter frame side given to the image square.
const IMAGE_BOX_FACTOR: f32 = 0.8;

/// State of a clip's image slot at draw time.
#[derive(Debug, Clone, Copy)]
pub enum ClipImage<'a> {
    /// The clip has no image.
    None,
    /// Still decoding; nothing is drawn for it yet.
    Pending,
    Loaded(&'a RgbaImage),
    /// Decoding failed; a placeholder is drawn.
    Broken,
}

/// Per-clip inputs to one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameRequest<'a> {
    pub image: ClipImage<'a>,
    /// Raw subtitle text, tags included.
    pub subtitle: &'a str,
}

/// Draws frames with a given text rasterizer.
#[derive(Clone)]
pub struct Compositor {
    rasterizer: Arc<dyn TextRasterizer>,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor").finish_non_exhaustive()
    }
}

impl Compositor {
    pub fn new(rasterizer: Arc<dyn TextRasterizer>) -> Self {
        Self { rasterizer }
    }

    pub fn rasterizer(&self) -> &dyn TextRasterizer {
        self.rasterizer.as_ref()
    }

    /// Allocate a canvas at the settings' resolution and draw into it.
    pub fn render_frame(&self, settings: &ProjectSettings, request: &FrameRequest<'_>) -> RgbaImage {
        let (width, height) = settings.dimensions();
        let mut frame = RgbaImage::new(width, height);
        self.draw_frame(&mut frame, settings, request);
        frame
    }

    /// Draw a full frame over `frame`, replacing its contents.
    pub fn draw_frame(
        &self,
        frame: &mut RgbaImage,
        settings: &ProjectSettings,
        request: &FrameRequest<'_>,
    ) {
        canvas::fill(frame, BACKGROUND_COLOR);
        self.draw_image(frame, request.image);
        self.draw_titles(frame, settings);

        let (_, height) = frame.dimensions();
        let height = height as f32;
        let subtitle_y = height * (settings.bottom_guideline as f32 / 100.0);
        self.draw_boxed_text(
            frame,
            request.subtitle,
            subtitle_y,
            TextRole::Subtitle,
            settings.style(TextRole::Subtitle),
        );

        let cta_y = height * (settings.cta_guideline as f32 / 100.0);
        self.draw_boxed_text(
            frame,
            &settings.cta_text,
            cta_y,
            TextRole::Cta,
            settings.style(TextRole::Cta),
        );
    }

    fn draw_image(&self, frame: &mut RgbaImage, image: ClipImage<'_>) {
        let (width, height) = frame.dimensions();
        match image {
            ClipImage::None | ClipImage::Pending => {}
            ClipImage::Loaded(image) => {
                let side = width.min(height) as f32 * IMAGE_BOX_FACTOR;
                let top = (height as f32 - side) / 2.0;
                canvas::draw_image_fit(frame, image, side, top);
            }
            ClipImage::Broken => {
                canvas::fill_rect(frame, 0, 0, width, height, BROKEN_IMAGE_COLOR);
                let mask = self.rasterizer.rasterize(BROKEN_IMAGE_LABEL, BROKEN_IMAGE_FONT_SIZE);
                let text_w = self.rasterizer.measure(BROKEN_IMAGE_LABEL, BROKEN_IMAGE_FONT_SIZE);
                let x = (width as f32 / 2.0 - text_w / 2.0).round() as i32;
                let y = (height as f32 / 2.0).round() as i32;
                blend_coverage(frame, &mask, x, y, Rgba([255, 255, 255, 255]));
            }
        }
    }

    /// Both title blocks stacked and centered as one block on the top
    /// guideline.
    fn draw_titles(&self, frame: &mut RgbaImage, settings: &ProjectSettings) {
        let blocks = [
            (&settings.title_line1, settings.style(TextRole::TitleLine1)),
            (&settings.title_line2, settings.style(TextRole::TitleLine2)),
        ];
        let blocks: Vec<(Vec<&str>, TextStyle)> = blocks
            .into_iter()
            .map(|(text, style)| {
                let lines = if text.is_empty() {
                    Vec::new()
                } else {
                    text.split('\n').collect()
                };
                (lines, style)
            })
            .collect();

        let block_height = |lines: &[&str], style: &TextStyle| {
            lines.len() as f32 * style.font_size as f32 * LINE_HEIGHT_FACTOR
        };
        let total: f32 = blocks.iter().map(|(l, s)| block_height(l, s)).sum();

        let center_x = frame.width() as f32 / 2.0;
        let title_y = frame.height() as f32 * (settings.top_guideline as f32 / 100.0);
        let mut y = title_y - total / 2.0;

        for (lines, style) in &blocks {
            let line_height = style.font_size as f32 * LINE_HEIGHT_FACTOR;
            for line in lines {
                let runs = parse_styled_line(line);
                let width = self.line_width(&runs, style.font_size as f32);
                self.draw_runs(
                    frame,
                    &runs,
                    center_x - width / 2.0,
                    y + line_height / 2.0,
                    *style,
                );
                y += line_height;
            }
        }
    }

    /// Subtitle and CTA: lines centered on `y`, over an optional rounded
    /// translucent box.
    fn draw_boxed_text(
        &self,
        frame: &mut RgbaImage,
        text: &str,
        y: f32,
        role: TextRole,
        style: TextStyle,
    ) {
        if text.is_empty() {
            return;
        }
        let overlay = parse_overlay(text, role.default_bg_opacity());
        let size = style.font_size as f32;
        let line_height = size * LINE_HEIGHT_FACTOR;
        let widths: Vec<f32> = overlay
            .lines
            .iter()
            .map(|runs| self.line_width(runs, size))
            .collect();
        let max_width = widths.iter().copied().fold(0.0f32, f32::max);
        let center_x = frame.width() as f32 / 2.0;

        if overlay.bg_opacity > 0 {
            let box_w = max_width + BOX_PADDING_X * 2.0;
            let box_h = overlay.lines.len() as f32 * line_height + BOX_PADDING_Y * 2.0;
            fill_rounded_rect(
                frame,
                center_x - box_w / 2.0,
                y - box_h / 2.0,
                box_w,
                box_h,
                BOX_RADIUS,
                BOX_COLOR,
                BOX_MAX_ALPHA * (overlay.bg_opacity as f32 / 100.0),
            );
        }

        let first_y = y - (overlay.lines.len().saturating_sub(1)) as f32 * line_height / 2.0;
        for (index, (runs, width)) in overlay.lines.iter().zip(&widths).enumerate() {
            let line_y = first_y + index as f32 * line_height;
            self.draw_runs(frame, runs, center_x - width / 2.0, line_y, style);
        }
    }

    fn line_width(&self, runs: &[StyledRun], size: f32) -> f32 {
        runs.iter()
            .map(|run| self.rasterizer.measure(run.text(), size))
            .sum()
    }

    /// Draw runs left to right from `start_x`, vertically centered on `y`.
    /// Each run is outlined, then filled in its own color.
    fn draw_runs(&self, frame: &mut RgbaImage, runs: &[StyledRun], start_x: f32, y: f32, style: TextStyle) {
        let size = style.font_size as f32;
        let stroke = style.stroke_width as f32;
        let anchor_y = y.round() as i32;
        let mut x = start_x;

        for run in runs {
            let text = run.text();
            let width = self.rasterizer.measure(text, size);
            let mask = self.rasterizer.rasterize(text, size);
            let anchor_x = x.round() as i32;
            if stroke > 0.0 {
                let outline = mask.dilate(stroke / 2.0);
                blend_coverage(frame, &outline, anchor_x, anchor_y, STROKE_COLOR);
            }
            blend_coverage(frame, &mask, anchor_x, anchor_y, parse_css_color(run.color()));
            x += width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::BlockRasterizer;
    use shortcraft_project_model::{AspectRatio, NumericSetting};

    fn compositor() -> Compositor {
        Compositor::new(Arc::new(BlockRasterizer))
    }

    fn bare_settings() -> ProjectSettings {
        let mut settings = ProjectSettings::default();
        settings.set_aspect_ratio(AspectRatio::Square);
        settings.set_text(TextRole::TitleLine1, "");
        settings.set_text(TextRole::TitleLine2, "");
        settings.set_text(TextRole::Cta, "");
        settings
    }

    fn request<'a>(image: ClipImage<'a>, subtitle: &'a str) -> FrameRequest<'a> {
        FrameRequest { image, subtitle }
    }

    #[test]
    fn test_frame_matches_settings_resolution() {
        let frame = compositor().render_frame(&ProjectSettings::default(), &request(ClipImage::None, ""));
        assert_eq!(frame.dimensions(), (1080, 1920));
    }

    #[test]
    fn test_empty_frame_is_background() {
        let frame = compositor().render_frame(&bare_settings(), &request(ClipImage::None, ""));
        assert!(frame.pixels().all(|p| *p == BACKGROUND_COLOR));
    }

    #[test]
    fn test_pending_image_draws_nothing() {
        let c = compositor();
        let settings = bare_settings();
        let pending = c.render_frame(&settings, &request(ClipImage::Pending, ""));
        let none = c.render_frame(&settings, &request(ClipImage::None, ""));
        assert_eq!(pending, none);
    }

    #[test]
    fn test_loaded_image_fills_centered_square() {
        let c = compositor();
        let settings = bare_settings();
        let red = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let frame = c.render_frame(&settings, &request(ClipImage::Loaded(&red), ""));
        // 864px square centered in 1080x1080, from 108 to 971.
        assert_eq!(frame.get_pixel(540, 540), &Rgba([255, 0, 0, 255]));
        assert_eq!(frame.get_pixel(110, 110), &Rgba([255, 0, 0, 255]));
        assert_eq!(frame.get_pixel(100, 540), &BACKGROUND_COLOR);
    }

    #[test]
    fn test_broken_image_placeholder() {
        let c = compositor();
        let frame = c.render_frame(&bare_settings(), &request(ClipImage::Broken, ""));
        assert_eq!(frame.get_pixel(0, 0), &BROKEN_IMAGE_COLOR);
        // Label is white at the frame center line.
        let width = BlockRasterizer.measure(BROKEN_IMAGE_LABEL, BROKEN_IMAGE_FONT_SIZE);
        let left = (540.0 - width / 2.0).round() as u32;
        assert_eq!(frame.get_pixel(left + 1, 540), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_subtitle_box_darkens_background() {
        let c = compositor();
        let mut settings = bare_settings();
        settings.set_numeric(NumericSetting::BottomGuideline, "50");
        let frame = c.render_frame(&settings, &request(ClipImage::None, "Hi"));

        // Padding area left of the text but inside the box.
        let text_w = BlockRasterizer.measure("Hi", 64.0);
        let x = (540.0 - text_w / 2.0 - 12.0) as u32;
        let px = frame.get_pixel(x, 540);
        assert!(px[0] < BACKGROUND_COLOR[0]);
        // Outside the box the background is untouched.
        assert_eq!(frame.get_pixel(5, 540), &BACKGROUND_COLOR);
    }

    #[test]
    fn test_zero_opacity_skips_box_but_draws_text() {
        let c = compositor();
        let mut settings = bare_settings();
        settings.set_numeric(NumericSetting::BottomGuideline, "50");
        settings.set_numeric(NumericSetting::StrokeWidth(TextRole::Subtitle), "0");
        let frame = c.render_frame(
            &settings,
            &request(ClipImage::None, "[bg_opacity=0][color=#00ff00]Go[/color][/bg_opacity]"),
        );
        let text_w = BlockRasterizer.measure("Go", 64.0);
        let left = (540.0 - text_w / 2.0).round() as u32;
        assert_eq!(frame.get_pixel(left + 2, 540), &Rgba([0, 255, 0, 255]));
        assert_eq!(frame.get_pixel(left - 12, 540), &BACKGROUND_COLOR);
    }

    #[test]
    fn test_stroke_outlines_fill() {
        let c = compositor();
        let mut settings = bare_settings();
        settings.set_numeric(NumericSetting::BottomGuideline, "50");
        let frame = c.render_frame(&settings, &request(ClipImage::None, "[bg_opacity=0]I[/bg_opacity]"));
        // One block glyph of 32x45 px starting at x = 540 - 19.2.
        let left = (540.0f32 - 19.2).round() as u32;
        assert_eq!(frame.get_pixel(left + 4, 540), &Rgba([255, 255, 255, 255]));
        // Just left of the glyph lies the 3 px black outline.
        assert_eq!(frame.get_pixel(left - 2, 540), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_titles_drawn_at_top_guideline() {
        let c = compositor();
        let mut settings = bare_settings();
        settings.set_text(TextRole::TitleLine1, "[color=#ff0000]T[/color]");
        settings.set_numeric(NumericSetting::StrokeWidth(TextRole::TitleLine1), "0");
        let frame = c.render_frame(&settings, &request(ClipImage::None, ""));
        // Block of one 110px line centered on 15% of 1080.
        let y = (1080.0f32 * 0.15).round() as u32;
        let left = (540.0f32 - 33.0).round() as u32;
        assert_eq!(frame.get_pixel(left + 5, y), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_render_is_deterministic() {
        let c = compositor();
        let settings = ProjectSettings::default();
        let image = RgbaImage::from_fn(37, 53, |x, y| Rgba([(x * 7) as u8, (y * 3) as u8, 90, 255]));
        let req = request(ClipImage::Loaded(&image), "[color=yellow]Hello[/color] world");
        let a = c.render_frame(&settings, &req);
        let b = c.render_frame(&settings, &req);
        assert_eq!(a, b);
    }
}
