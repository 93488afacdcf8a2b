//! Global styling and layout settings for a short.

use serde::{Deserialize, Serialize};

/// Output aspect ratio preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[default]
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    /// Fixed render dimensions `(width, height)` in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1080, 1080),
            AspectRatio::Portrait => (1080, 1920),
            AspectRatio::Landscape => (1920, 1080),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Landscape => "16:9",
        }
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1:1" => Ok(AspectRatio::Square),
            "9:16" => Ok(AspectRatio::Portrait),
            "16:9" => Ok(AspectRatio::Landscape),
            other => Err(format!("unknown aspect ratio '{other}' (expected 1:1, 9:16 or 16:9)")),
        }
    }
}

/// Text roles drawn by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextRole {
    TitleLine1,
    TitleLine2,
    Subtitle,
    Cta,
}

impl TextRole {
    /// Background box opacity used when the text carries no valid
    /// `[bg_opacity]` tag. Titles are never boxed.
    pub fn default_bg_opacity(self) -> u8 {
        match self {
            TextRole::Subtitle => 90,
            TextRole::Cta => 70,
            TextRole::TitleLine1 | TextRole::TitleLine2 => 0,
        }
    }
}

/// Font size and stroke width for one text role, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_size: f64,
    pub stroke_width: f64,
}

/// Largest font size drawn, in pixels.
pub const MAX_FONT_SIZE: f64 = 400.0;
/// Largest stroke width drawn, in pixels.
pub const MAX_STROKE_WIDTH: f64 = 50.0;

impl TextStyle {
    /// The style with both sizes kept within `0..=MAX`.
    pub fn bounded(self) -> Self {
        Self {
            font_size: bound(self.font_size, MAX_FONT_SIZE),
            stroke_width: bound(self.stroke_width, MAX_STROKE_WIDTH),
        }
    }
}

fn bound(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}

/// Numeric settings that can be set from free-form input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericSetting {
    TopGuideline,
    BottomGuideline,
    CtaGuideline,
    FontSize(TextRole),
    StrokeWidth(TextRole),
}

/// Global styling/layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub aspect_ratio: AspectRatio,

    /// Title block anchor, percent of frame height.
    pub top_guideline: f64,
    /// Subtitle anchor, percent of frame height.
    pub bottom_guideline: f64,
    /// CTA anchor, percent of frame height.
    pub cta_guideline: f64,

    pub title_line1: String,
    pub title_line1_style: TextStyle,
    pub title_line2: String,
    pub title_line2_style: TextStyle,
    pub subtitle_style: TextStyle,
    pub cta_text: String,
    pub cta_style: TextStyle,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::Portrait,
            top_guideline: 15.0,
            bottom_guideline: 10.0,
            cta_guideline: 85.0,
            title_line1: "[color=#ffffff]Beer Wars[/color]".to_string(),
            title_line1_style: TextStyle {
                font_size: 110.0,
                stroke_width: 8.0,
            },
            title_line2: "[color=#ffff00]Two leaders who stopped a war?[/color]".to_string(),
            title_line2_style: TextStyle {
                font_size: 120.0,
                stroke_width: 8.0,
            },
            subtitle_style: TextStyle {
                font_size: 64.0,
                stroke_width: 6.0,
            },
            cta_text: "[bg_opacity=70][color=#aaaaaa]Try it yourself[/color][/bg_opacity]"
                .to_string(),
            cta_style: TextStyle {
                font_size: 48.0,
                stroke_width: 4.0,
            },
        }
    }
}

impl ProjectSettings {
    pub fn dimensions(&self) -> (u32, u32) {
        self.aspect_ratio.dimensions()
    }

    /// Style for one role, with sizes bounded as by [`TextStyle::bounded`].
    pub fn style(&self, role: TextRole) -> TextStyle {
        let style = match role {
            TextRole::TitleLine1 => self.title_line1_style,
            TextRole::TitleLine2 => self.title_line2_style,
            TextRole::Subtitle => self.subtitle_style,
            TextRole::Cta => self.cta_style,
        };
        style.bounded()
    }

    fn style_mut(&mut self, role: TextRole) -> &mut TextStyle {
        match role {
            TextRole::TitleLine1 => &mut self.title_line1_style,
            TextRole::TitleLine2 => &mut self.title_line2_style,
            TextRole::Subtitle => &mut self.subtitle_style,
            TextRole::Cta => &mut self.cta_style,
        }
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.aspect_ratio = aspect_ratio;
    }

    /// Set one of the styled text strings. The subtitle is per clip, so
    /// [`TextRole::Subtitle`] is ignored here.
    pub fn set_text(&mut self, role: TextRole, text: impl Into<String>) {
        let text = text.into();
        match role {
            TextRole::TitleLine1 => self.title_line1 = text,
            TextRole::TitleLine2 => self.title_line2 = text,
            TextRole::Cta => self.cta_text = text,
            TextRole::Subtitle => {}
        }
    }

    /// Set a numeric field from raw user input. Anything that does not parse
    /// as a finite number is stored as 0. Font sizes and stroke widths are
    /// clamped to `0..=MAX_FONT_SIZE` and `0..=MAX_STROKE_WIDTH`.
    pub fn set_numeric(&mut self, field: NumericSetting, raw: &str) {
        let value = coerce_number(raw);
        match field {
            NumericSetting::TopGuideline => self.top_guideline = value,
            NumericSetting::BottomGuideline => self.bottom_guideline = value,
            NumericSetting::CtaGuideline => self.cta_guideline = value,
            NumericSetting::FontSize(role) => {
                self.style_mut(role).font_size = bound(value, MAX_FONT_SIZE)
            }
            NumericSetting::StrokeWidth(role) => {
                self.style_mut(role).stroke_width = bound(value, MAX_STROKE_WIDTH)
            }
        }
    }
}

/// Empty or whitespace-only input counts as 0, like any other non-number.
fn coerce_number(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
