//! Text measurement used by wrapping and fitting.
//!
//! Layout never touches font files directly: everything goes through
//! [`TextMeasurer`], so the algorithms stay pure functions of measured inputs.

use std::collections::HashMap;
use std::sync::Arc;

/// Line box height as a multiple of the font size.
pub const LINE_HEIGHT_FACTOR: f32 = 1.5;

pub trait TextMeasurer {
    /// Rendered advance width of `text` set in `family` at `font_size` px.
    fn text_width(&self, family: &str, font_size: f32, text: &str) -> f32;

    fn line_height(&self, _family: &str, font_size: f32) -> f32 {
        font_size * LINE_HEIGHT_FACTOR
    }
}

impl<T: TextMeasurer + ?Sized> TextMeasurer for &T {
    fn text_width(&self, family: &str, font_size: f32, text: &str) -> f32 {
        (**self).text_width(family, font_size, text)
    }

    fn line_height(&self, family: &str, font_size: f32) -> f32 {
        (**self).line_height(family, font_size)
    }
}

impl<T: TextMeasurer + ?Sized> TextMeasurer for Arc<T> {
    fn text_width(&self, family: &str, font_size: f32, text: &str) -> f32 {
        (**self).text_width(family, font_size, text)
    }

    fn line_height(&self, family: &str, font_size: f32) -> f32 {
        (**self).line_height(family, font_size)
    }
}

/// Every char advances by `advance_em × font_size`.
///
/// Used when no font program is available and in tests, where exact widths
/// must be predictable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedAdvanceMeasurer {
    pub advance_em: f32,
}

impl FixedAdvanceMeasurer {
    pub fn new(advance_em: f32) -> Self {
        Self { advance_em }
    }
}

impl Default for FixedAdvanceMeasurer {
    fn default() -> Self {
        Self { advance_em: 0.6 }
    }
}

impl TextMeasurer for FixedAdvanceMeasurer {
    fn text_width(&self, _family: &str, font_size: f32, text: &str) -> f32 {
        text.chars().count() as f32 * font_size * self.advance_em
    }
}

/// Hidden measuring element for one paragraph.
///
/// It shares the paragraph's font family and size, lives only for the
/// duration of a single wrap, and memoizes repeated candidates.
pub struct MeasureProbe<'a, M: TextMeasurer + ?Sized> {
    measurer: &'a M,
    family: &'a str,
    font_size: f32,
    widths: HashMap<String, f32>,
    measurements: usize,
}

impl<'a, M: TextMeasurer + ?Sized> MeasureProbe<'a, M> {
    pub fn new(measurer: &'a M, family: &'a str, font_size: f32) -> Self {
        Self {
            measurer,
            family,
            font_size,
            widths: HashMap::new(),
            measurements: 0,
        }
    }

    pub fn width(&mut self, text: &str) -> f32 {
        if let Some(width) = self.widths.get(text) {
            return *width;
        }
        let width = self.measurer.text_width(self.family, self.font_size, text);
        self.measurements += 1;
        self.widths.insert(text.to_string(), width);
        width
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    /// Distinct strings measured so far.
    pub fn measurements(&self) -> usize {
        self.measurements
    }
}
