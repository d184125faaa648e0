//! Font auto-fit: a two-phase hill climb over integer pixel sizes.
//!
//! The stepping order is part of the contract. A block that already fits at
//! the seed still runs the grow phase, and growth stops on the first overflow
//! after stepping back a single pixel.

use crate::measure::TextMeasurer;
use crate::types::Size;
use crate::wrap::HighlightLine;

pub const MIN_FONT_SIZE: u32 = 8;
pub const MAX_FONT_SIZE: u32 = 200;
pub const WIDE_SEED_FONT_SIZE: u32 = 40;
pub const SEED_FONT_SIZE: u32 = 50;
/// 40px on each side.
pub const HORIZONTAL_PADDING: f32 = 80.0;
const GROW_THRESHOLD: f32 = 0.95;
const WIDE_RATIO: f64 = 16.0 / 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectBucket {
    /// ratio >= 16:9
    Wide,
    /// ratio == 1:1
    Square,
    /// Everything else; named after its 9:16 preset.
    Tall,
}

impl AspectBucket {
    pub fn classify(aspect_ratio: f64) -> Self {
        if aspect_ratio >= WIDE_RATIO {
            AspectBucket::Wide
        } else if aspect_ratio == 1.0 {
            AspectBucket::Square
        } else {
            AspectBucket::Tall
        }
    }

    pub fn vertical_padding(self) -> f32 {
        match self {
            AspectBucket::Wide => 60.0,
            AspectBucket::Square => 140.0,
            AspectBucket::Tall => 120.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddingPolicy {
    pub bucket: AspectBucket,
    pub horizontal: f32,
    pub vertical: f32,
}

impl PaddingPolicy {
    pub fn for_aspect(aspect_ratio: f64) -> Self {
        let bucket = AspectBucket::classify(aspect_ratio);
        Self {
            bucket,
            horizontal: HORIZONTAL_PADDING,
            vertical: bucket.vertical_padding(),
        }
    }

    /// Container box minus the padding allowance. May be negative for tiny
    /// containers, which simply drives the fit to its minimum.
    pub fn available(&self, container: Size) -> Size {
        Size::new(
            container.width - self.horizontal,
            container.height - self.vertical,
        )
    }
}

pub fn seed_font_size(aspect_ratio: f64) -> u32 {
    if aspect_ratio >= WIDE_RATIO {
        WIDE_SEED_FONT_SIZE
    } else {
        SEED_FONT_SIZE
    }
}

/// Anything that can report its scrolled box when set at a font size.
pub trait FitTarget {
    fn scroll_size(&mut self, font_size: u32) -> Size;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub font_size: u32,
    /// Scroll box at `font_size`.
    pub measured: Size,
    /// Number of measurements taken.
    pub probes: u32,
}

pub fn fit_font_size<T: FitTarget + ?Sized>(
    target: &mut T,
    container: Size,
    aspect_ratio: f64,
) -> FitResult {
    let available = PaddingPolicy::for_aspect(aspect_ratio).available(container);
    let overflows = |s: Size| s.width > available.width || s.height > available.height;

    let mut font_size = seed_font_size(aspect_ratio);
    let mut measured = target.scroll_size(font_size);
    let mut probes = 1u32;

    while overflows(measured) && font_size > MIN_FONT_SIZE {
        font_size -= 1;
        measured = target.scroll_size(font_size);
        probes += 1;
    }

    while measured.width < available.width * GROW_THRESHOLD
        && measured.height < available.height * GROW_THRESHOLD
        && font_size < MAX_FONT_SIZE
    {
        font_size += 1;
        measured = target.scroll_size(font_size);
        probes += 1;
        if overflows(measured) {
            font_size -= 1;
            measured = target.scroll_size(font_size);
            probes += 1;
            break;
        }
    }

    tracing::trace!(font_size, probes, ?available, "auto-fit settled");
    FitResult {
        font_size,
        measured,
        probes,
    }
}

/// A wrapped paragraph laid out as a shrink-to-fit box: width is the widest
/// line, height is one line box per line.
pub struct ParagraphBox<'a, M: TextMeasurer + ?Sized> {
    lines: &'a [HighlightLine],
    measurer: &'a M,
    family: &'a str,
}

impl<'a, M: TextMeasurer + ?Sized> ParagraphBox<'a, M> {
    pub fn new(lines: &'a [HighlightLine], measurer: &'a M, family: &'a str) -> Self {
        Self {
            lines,
            measurer,
            family,
        }
    }
}

impl<M: TextMeasurer + ?Sized> FitTarget for ParagraphBox<'_, M> {
    fn scroll_size(&mut self, font_size: u32) -> Size {
        let size = font_size as f32;
        let width = self
            .lines
            .iter()
            .map(|line| self.measurer.text_width(self.family, size, &line.text))
            .fold(0.0f32, f32::max);
        let height = self.lines.len() as f32 * self.measurer.line_height(self.family, size);
        // Scroll metrics are whole pixels.
        Size::new(width.ceil(), height.ceil())
    }
}
