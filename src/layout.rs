//! Places a document on the export canvas.
//!
//! Coordinates are absolute within the content root. The preview container
//! occupies the canvas size; an author bar, when shown, sits above or below
//! it and adds to the root height.

use crate::document::{Block, Document};
use crate::fit::{FitResult, HORIZONTAL_PADDING, PaddingPolicy, ParagraphBox, fit_font_size};
use crate::measure::{MeasureProbe, TextMeasurer};
use crate::perf::{PerfLogger, timed};
use crate::settings::{AuthorPosition, Settings};
use crate::types::{Rect, Size};
use crate::wrap::{HighlightLine, wrap_highlight_lines, wrap_to_width};

pub const BASE_FONT_SIZE: f32 = 16.0;
pub const TITLE_FONT_SIZE: f32 = 32.0;
pub const METADATA_FONT_SIZE: f32 = 14.0;
pub const BLOCK_GAP: f32 = 16.0;
pub const AUTHOR_BAR_HEIGHT: f32 = 80.0;

const HEADING_FONT_SIZES: [f32; 6] = [32.0, 28.0, 24.0, 20.0, 18.0, 16.0];

pub fn heading_font_size(level: u8) -> f32 {
    let index = usize::from(level.clamp(1, 6)) - 1;
    HEADING_FONT_SIZES[index]
}

/// A block of plain lines at one font size.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub rect: Rect,
    pub font_size: f32,
    pub line_height: f32,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub rect: Rect,
    pub key: String,
    pub value: String,
    pub type_name: &'static str,
}

/// A paragraph after wrapping and, when a container was found, fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedParagraph {
    pub rect: Rect,
    pub lines: Vec<HighlightLine>,
    /// Widths of `lines` at `font_size`.
    pub line_widths: Vec<f32>,
    pub font_size: u32,
    pub line_height: f32,
    /// False when laid out in natural flow; natural paragraphs get no
    /// highlight bands.
    pub fitted: bool,
    pub fit: Option<FitResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LaidOutBlock {
    Title(TextBlock),
    Metadata(Vec<MetadataRow>),
    Heading(TextBlock),
    Paragraph(SizedParagraph),
}

impl LaidOutBlock {
    pub fn rect(&self) -> Rect {
        match self {
            LaidOutBlock::Title(block) | LaidOutBlock::Heading(block) => block.rect,
            LaidOutBlock::Paragraph(paragraph) => paragraph.rect,
            LaidOutBlock::Metadata(rows) => {
                let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
                    return Rect::default();
                };
                Rect::new(
                    first.rect.x,
                    first.rect.y,
                    first.rect.width,
                    last.rect.bottom() - first.rect.y,
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorBar {
    pub rect: Rect,
    pub position: AuthorPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// The preview container box within the root.
    pub container: Rect,
    pub blocks: Vec<LaidOutBlock>,
    pub author_bar: Option<AuthorBar>,
    /// Height of the whole content root, author bar included.
    pub root_height: f32,
    pub family: String,
}

impl Layout {
    pub fn root_size(&self) -> Size {
        Size::new(self.container.width, self.root_height)
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &SizedParagraph> {
        self.blocks.iter().filter_map(|block| match block {
            LaidOutBlock::Paragraph(paragraph) => Some(paragraph),
            _ => None,
        })
    }
}

pub struct LayoutEngine<'a, M: TextMeasurer + ?Sized> {
    measurer: &'a M,
    perf: Option<&'a PerfLogger>,
}

impl<'a, M: TextMeasurer + ?Sized> LayoutEngine<'a, M> {
    pub fn new(measurer: &'a M) -> Self {
        Self {
            measurer,
            perf: None,
        }
    }

    pub fn with_perf(mut self, perf: Option<&'a PerfLogger>) -> Self {
        self.perf = perf;
        self
    }

    /// Lays out `doc`. `container` is the observed preview container box;
    /// `None` means no container was found and paragraphs keep their
    /// natural size.
    pub fn layout(&self, doc: &Document, settings: &Settings, container: Option<Size>) -> Layout {
        let family = settings.font_family.as_str();
        let canvas = settings.canvas_size();
        let aspect_ratio = settings.aspect_ratio();
        let padding = PaddingPolicy::for_aspect(aspect_ratio);

        let author_bar_height = if settings.author_info.is_visible() {
            AUTHOR_BAR_HEIGHT
        } else {
            0.0
        };
        let container_y = match settings.author_info.position {
            AuthorPosition::Top => author_bar_height,
            AuthorPosition::Bottom => 0.0,
        };
        let container_rect = Rect::new(0.0, container_y, canvas.width, canvas.height);
        let author_bar = (author_bar_height > 0.0).then(|| AuthorBar {
            rect: match settings.author_info.position {
                AuthorPosition::Top => Rect::new(0.0, 0.0, canvas.width, author_bar_height),
                AuthorPosition::Bottom => {
                    Rect::new(0.0, canvas.height, canvas.width, author_bar_height)
                }
            },
            position: settings.author_info.position,
        });

        let x = HORIZONTAL_PADDING / 2.0;
        let content_width = (canvas.width - HORIZONTAL_PADDING).max(0.0);
        let mut y = container_y + padding.vertical / 2.0;
        let mut blocks = Vec::new();

        if settings.show_filename && !doc.title.is_empty() {
            let block = self.text_block(&doc.title, family, TITLE_FONT_SIZE, x, y, content_width);
            y = block.rect.bottom() + BLOCK_GAP;
            blocks.push(LaidOutBlock::Title(block));
        }

        if settings.show_metadata && !doc.front_matter.is_empty() {
            let line_height = self.measurer.line_height(family, METADATA_FONT_SIZE);
            let rows: Vec<MetadataRow> = doc
                .front_matter
                .iter()
                .enumerate()
                .map(|(idx, entry)| MetadataRow {
                    rect: Rect::new(x, y + idx as f32 * line_height, content_width, line_height),
                    key: entry.key.clone(),
                    value: entry.value.display(),
                    type_name: entry.value.type_name(),
                })
                .collect();
            y += rows.len() as f32 * line_height + BLOCK_GAP;
            blocks.push(LaidOutBlock::Metadata(rows));
        }

        for (index, block) in doc.blocks.iter().enumerate() {
            let laid = match block {
                Block::Heading { level, text } => LaidOutBlock::Heading(self.text_block(
                    text,
                    family,
                    heading_font_size(*level),
                    x,
                    y,
                    content_width,
                )),
                Block::Paragraph(text) => LaidOutBlock::Paragraph(match container {
                    Some(container) => {
                        self.fitted_paragraph(text, family, x, y, container, aspect_ratio, index)
                    }
                    None => self.natural_paragraph(text, family, x, y, content_width),
                }),
            };
            y = laid.rect().bottom() + BLOCK_GAP;
            blocks.push(laid);
        }

        tracing::debug!(
            blocks = blocks.len(),
            fitted = container.is_some(),
            "layout complete"
        );
        Layout {
            container: container_rect,
            blocks,
            author_bar,
            root_height: canvas.height + author_bar_height,
            family: family.to_string(),
        }
    }

    fn text_block(
        &self,
        text: &str,
        family: &str,
        font_size: f32,
        x: f32,
        y: f32,
        max_width: f32,
    ) -> TextBlock {
        let mut probe = MeasureProbe::new(self.measurer, family, font_size);
        let wrapped = wrap_to_width(text, max_width, &mut probe);
        let line_height = self.measurer.line_height(family, font_size);
        let lines: Vec<String> = wrapped.lines.into_iter().map(|line| line.text).collect();
        let height = lines.len() as f32 * line_height;
        TextBlock {
            rect: Rect::new(x, y, max_width, height),
            font_size,
            line_height,
            lines,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fitted_paragraph(
        &self,
        text: &str,
        family: &str,
        x: f32,
        y: f32,
        container: Size,
        aspect_ratio: f64,
        index: usize,
    ) -> SizedParagraph {
        let wrapped = timed(self.perf, "layout.wrap", None, || {
            let mut probe = MeasureProbe::new(self.measurer, family, BASE_FONT_SIZE);
            wrap_highlight_lines(text, container.width, &mut probe)
        });
        let fit = timed(self.perf, "layout.fit", None, || {
            let mut target = ParagraphBox::new(&wrapped.lines, self.measurer, family);
            fit_font_size(&mut target, container, aspect_ratio)
        });
        if let Some(perf) = self.perf {
            perf.log_counts(
                "layout.fit",
                None,
                &[
                    ("probes", u64::from(fit.probes)),
                    ("lines", wrapped.line_count() as u64),
                ],
            );
        }
        tracing::trace!(
            paragraph = index,
            font_size = fit.font_size,
            lines = wrapped.line_count(),
            "paragraph fitted"
        );

        let size = fit.font_size as f32;
        let line_height = self.measurer.line_height(family, size);
        let line_widths = self.line_widths(&wrapped.lines, family, size);
        SizedParagraph {
            rect: Rect::new(x, y, fit.measured.width, fit.measured.height),
            lines: wrapped.lines,
            line_widths,
            font_size: fit.font_size,
            line_height,
            fitted: true,
            fit: Some(fit),
        }
    }

    fn natural_paragraph(
        &self,
        text: &str,
        family: &str,
        x: f32,
        y: f32,
        max_width: f32,
    ) -> SizedParagraph {
        let mut probe = MeasureProbe::new(self.measurer, family, BASE_FONT_SIZE);
        let wrapped = wrap_to_width(text, max_width, &mut probe);
        let line_height = self.measurer.line_height(family, BASE_FONT_SIZE);
        let line_widths = self.line_widths(&wrapped.lines, family, BASE_FONT_SIZE);
        let height = wrapped.line_count() as f32 * line_height;
        SizedParagraph {
            rect: Rect::new(x, y, max_width, height),
            lines: wrapped.lines,
            line_widths,
            font_size: BASE_FONT_SIZE as u32,
            line_height,
            fitted: false,
            fit: None,
        }
    }

    fn line_widths(&self, lines: &[HighlightLine], family: &str, font_size: f32) -> Vec<f32> {
        lines
            .iter()
            .map(|line| self.measurer.text_width(family, font_size, &line.text))
            .collect()
    }
}
