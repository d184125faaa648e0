//! Greedy packing of paragraph words into highlight lines.

use crate::measure::{MeasureProbe, TextMeasurer};

/// Fraction of the container width a highlight line may occupy.
pub const HIGHLIGHT_WIDTH_FRACTION: f32 = 0.75;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightLine {
    pub text: String,
}

impl HighlightLine {
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.text.split(' ')
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A line or the break rendered between two lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Line(&'a HighlightLine),
    Break,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedParagraph {
    pub lines: Vec<HighlightLine>,
}

impl WrappedParagraph {
    /// Lines with a break between each consecutive pair, in render order.
    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        self.lines.iter().enumerate().flat_map(|(idx, line)| {
            let brk = (idx > 0).then_some(Segment::Break);
            brk.into_iter().chain(std::iter::once(Segment::Line(line)))
        })
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Wraps `text` into highlight lines no wider than
/// `0.75 × container_width`, measured with `probe`.
pub fn wrap_highlight_lines<M: TextMeasurer + ?Sized>(
    text: &str,
    container_width: f32,
    probe: &mut MeasureProbe<'_, M>,
) -> WrappedParagraph {
    wrap_to_width(text, container_width * HIGHLIGHT_WIDTH_FRACTION, probe)
}

/// Greedy word packing against an explicit width limit.
///
/// Tokens come from splitting on single spaces only. A token that overflows
/// an empty buffer is kept on its own line, so no line is ever dropped.
pub fn wrap_to_width<M: TextMeasurer + ?Sized>(
    text: &str,
    max_width: f32,
    probe: &mut MeasureProbe<'_, M>,
) -> WrappedParagraph {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split(' ') {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if probe.width(&candidate) > max_width && !current.is_empty() {
            lines.push(HighlightLine {
                text: std::mem::replace(&mut current, word.to_string()),
            });
        } else {
            current = candidate;
        }
    }
    lines.push(HighlightLine { text: current });

    tracing::trace!(
        lines = lines.len(),
        measured = probe.measurements(),
        max_width,
        "wrapped paragraph"
    );
    WrappedParagraph { lines }
}
