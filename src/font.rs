use ab_glyph::FontArc;
use imageproc::drawing::text_size;
use tracing::warn;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/SFNS.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Text measurement for hit-test bounds and proxy layout. Falls back to a
/// conservative per-character estimate when no usable font is installed, so
/// measurement never fails outright.
#[derive(Clone, Debug, Default)]
pub struct FontMetrics {
    font: Option<FontArc>,
}

impl FontMetrics {
    pub fn load_system() -> Self {
        for path in FONT_CANDIDATES {
            if let Ok(bytes) = std::fs::read(path) {
                if let Ok(font) = FontArc::try_from_vec(bytes) {
                    return Self { font: Some(font) };
                }
            }
        }
        warn!("no usable system font found, falling back to estimated text metrics");
        Self { font: None }
    }

    pub fn from_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    pub fn none() -> Self {
        Self { font: None }
    }

    pub fn font(&self) -> Option<&FontArc> {
        self.font.as_ref()
    }

    pub fn measure(&self, text: &str, px: f32) -> f32 {
        if text.is_empty() || px <= 0.0 {
            return 0.0;
        }
        match &self.font {
            Some(font) => text_size(px, font, text).0 as f32,
            None => estimate_width(text, px),
        }
    }
}

fn estimate_width(text: &str, px: f32) -> f32 {
    (text.chars().count().max(1) as f32 * px * 0.6).max(20.0)
}
