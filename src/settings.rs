use crate::error::{FitFrameError, Result};
use crate::types::Size;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Width substituted for an unset (zero) width before validation.
const UNSET_WIDTH_FALLBACK: u32 = 640;
/// Exports at or below this width are rejected before any capture work.
pub const MIN_EXPORT_WIDTH: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// PNG over an opaque white background.
    Png0,
    /// PNG with a transparent background.
    Png1,
    Jpg,
    Webp,
    Pdf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Png0,
        ExportFormat::Png1,
        ExportFormat::Jpg,
        ExportFormat::Webp,
        ExportFormat::Pdf,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png0 | ExportFormat::Png1 => "png",
            ExportFormat::Jpg => "jpg",
            ExportFormat::Webp => "webp",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn is_transparent(self) -> bool {
        matches!(self, ExportFormat::Png1)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "png" | "png0" => Some(ExportFormat::Png0),
            "png1" => Some(ExportFormat::Png1),
            "jpg" | "jpeg" => Some(ExportFormat::Jpg),
            "webp" => Some(ExportFormat::Webp),
            "pdf" => Some(ExportFormat::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontFamily {
    #[serde(rename = "serif")]
    Serif,
    #[serde(rename = "sans-serif")]
    SansSerif,
}

impl FontFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            FontFamily::Serif => "serif",
            FontFamily::SansSerif => "sans-serif",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorPosition {
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthorInfo {
    pub show: bool,
    pub name: Option<String>,
    pub remark: Option<String>,
    /// Path or data URI.
    pub avatar: Option<String>,
    pub align: AuthorAlign,
    pub position: AuthorPosition,
}

impl Default for AuthorInfo {
    fn default() -> Self {
        Self {
            show: false,
            name: None,
            remark: None,
            avatar: None,
            align: AuthorAlign::Right,
            position: AuthorPosition::Bottom,
        }
    }
}

impl AuthorInfo {
    /// The bar is only rendered when enabled and there is something to show.
    pub fn is_visible(&self) -> bool {
        self.show && (non_empty(&self.avatar) || non_empty(&self.name))
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkType {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatermarkText {
    pub content: String,
    pub font_size: f32,
    pub color: String,
}

impl Default for WatermarkText {
    fn default() -> Self {
        Self {
            content: String::new(),
            font_size: 28.0,
            color: "#cccccc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkImage {
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Watermark {
    pub enable: bool,
    #[serde(rename = "type")]
    pub kind: WatermarkType,
    pub text: WatermarkText,
    pub image: WatermarkImage,
    pub opacity: f32,
    /// Degrees.
    pub rotate: f32,
    /// Tile height.
    pub height: f32,
    /// Tile width.
    pub width: f32,
    /// Horizontal gap between tiles.
    pub x: f32,
    /// Vertical gap between tiles.
    pub y: f32,
}

impl Default for Watermark {
    fn default() -> Self {
        Self {
            enable: false,
            kind: WatermarkType::Text,
            text: WatermarkText::default(),
            image: WatermarkImage::default(),
            opacity: 0.2,
            rotate: 30.0,
            height: 64.0,
            width: 120.0,
            x: 100.0,
            y: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSettings {
    pub enable: bool,
    pub height: f32,
    pub overlap: f32,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            enable: false,
            height: 1000.0,
            overlap: 80.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "2x")]
    pub high_density: bool,
    pub format: ExportFormat,
    pub show_filename: bool,
    pub show_metadata: bool,
    pub highlight_color: String,
    pub font_family: FontFamily,
    pub author_info: AuthorInfo,
    pub watermark: Watermark,
    pub split: SplitSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            high_density: true,
            format: ExportFormat::Png0,
            show_filename: true,
            show_metadata: false,
            highlight_color: "#FFEBC2".to_string(),
            font_family: FontFamily::SansSerif,
            author_info: AuthorInfo::default(),
            watermark: Watermark::default(),
            split: SplitSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The preview container box: the export canvas size.
    pub fn canvas_size(&self) -> Size {
        Size::new(self.width as f32, self.height as f32)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.canvas_size().aspect_ratio()
    }

    pub fn density(&self) -> f32 {
        if self.high_density { 2.0 } else { 1.0 }
    }

    pub fn apply_preset(&mut self, preset: AspectPreset) {
        self.width = preset.width;
        self.height = preset.height;
    }

    /// Checks run before any capture work starts.
    pub fn validate(&self) -> Result<()> {
        let width = if self.width == 0 {
            UNSET_WIDTH_FALLBACK
        } else {
            self.width
        };
        if width <= MIN_EXPORT_WIDTH {
            return Err(FitFrameError::InvalidConfiguration(format!(
                "export width {width}px must be greater than {MIN_EXPORT_WIDTH}px"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectPreset {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
}

impl AspectPreset {
    pub const WIDE: AspectPreset = AspectPreset {
        label: "16:9",
        width: 1920,
        height: 1080,
    };
    pub const TALL: AspectPreset = AspectPreset {
        label: "9:16",
        width: 1080,
        height: 1920,
    };
    pub const SQUARE: AspectPreset = AspectPreset {
        label: "1:1",
        width: 1080,
        height: 1080,
    };

    pub const ALL: [AspectPreset; 3] = [Self::WIDE, Self::TALL, Self::SQUARE];

    pub fn by_label(label: &str) -> Option<AspectPreset> {
        Self::ALL.into_iter().find(|preset| preset.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_original_defaults() {
        let settings = Settings::from_json_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.width, 1920);
        assert_eq!(settings.height, 1080);
        assert!(settings.high_density);
        assert_eq!(settings.split.height, 1000.0);
        assert_eq!(settings.split.overlap, 80.0);
        assert_eq!(settings.watermark.text.font_size, 28.0);
    }

    #[test]
    fn json_keys_follow_settings_contract() {
        let raw = r##"{
            "width": 1080,
            "height": 1920,
            "2x": false,
            "format": "webp",
            "showFilename": false,
            "fontFamily": "serif",
            "highlightColor": "#c2e0ff",
            "authorInfo": { "show": true, "name": "Ana", "align": "center", "position": "top" },
            "watermark": { "enable": true, "type": "image", "image": { "src": "logo.png" } },
            "split": { "enable": true, "height": 900 }
        }"##;
        let settings = Settings::from_json_str(raw).unwrap();
        assert!(!settings.high_density);
        assert_eq!(settings.format, ExportFormat::Webp);
        assert_eq!(settings.font_family, FontFamily::Serif);
        assert_eq!(settings.author_info.align, AuthorAlign::Center);
        assert_eq!(settings.author_info.position, AuthorPosition::Top);
        assert!(settings.author_info.is_visible());
        assert_eq!(settings.watermark.kind, WatermarkType::Image);
        assert_eq!(settings.watermark.opacity, 0.2);
        assert!(settings.split.enable);
        assert_eq!(settings.split.height, 900.0);
        assert_eq!(settings.split.overlap, 80.0);
    }

    #[test]
    fn narrow_widths_are_rejected_and_zero_means_unset() {
        let mut settings = Settings::default();
        settings.width = 20;
        assert!(matches!(
            settings.validate(),
            Err(FitFrameError::InvalidConfiguration(_))
        ));
        settings.width = 21;
        assert!(settings.validate().is_ok());
        settings.width = 0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn author_bar_needs_name_or_avatar() {
        let mut author = AuthorInfo {
            show: true,
            ..AuthorInfo::default()
        };
        assert!(!author.is_visible());
        author.name = Some("   ".to_string());
        assert!(!author.is_visible());
        author.avatar = Some("me.png".to_string());
        assert!(author.is_visible());
    }

    #[test]
    fn presets_set_canvas_size() {
        let mut settings = Settings::default();
        settings.apply_preset(AspectPreset::by_label("1:1").unwrap());
        assert_eq!(settings.canvas_size(), Size::new(1080.0, 1080.0));
        assert_eq!(settings.aspect_ratio(), 1.0);
    }
}
