use crate::settings::SplitSettings;
use crate::types::Size;
use std::fmt;

/// Smallest distance between two page starts.
const MIN_PAGE_ADVANCE: f32 = 50.0;

/// Page-cut offsets for content of `content_height`.
///
/// The first cut sits one effective page height down; each further cut
/// advances by the page height minus the overlap. Cuts at or past the end
/// of the content are not emitted.
pub fn plan_splits(
    enabled: bool,
    content_height: f32,
    page_height: f32,
    overlap: f32,
) -> Vec<f32> {
    // Written as negations so NaN also yields an empty plan.
    if !enabled || !(content_height > 0.0) || !(page_height > 0.0) {
        return Vec::new();
    }
    let height = effective_page_height(page_height, overlap);
    let advance = height - overlap;
    let mut offsets = Vec::new();
    let mut y = height;
    while y < content_height {
        offsets.push(y);
        y += advance;
    }
    offsets
}

/// Page height actually used, so that pages always advance by at least 50px.
pub fn effective_page_height(page_height: f32, overlap: f32) -> f32 {
    page_height.max(overlap + MIN_PAGE_ADVANCE)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSlice {
    pub index: usize,
    pub start_y: f32,
    pub height: f32,
}

impl PageSlice {
    pub fn end_y(&self) -> f32 {
        self.start_y + self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitPlan {
    offsets: Vec<f32>,
    content_height: f32,
    page_height: f32,
    overlap: f32,
}

impl SplitPlan {
    pub fn compute(enabled: bool, content_height: f32, page_height: f32, overlap: f32) -> Self {
        Self {
            offsets: plan_splits(enabled, content_height, page_height, overlap),
            content_height,
            page_height: effective_page_height(page_height, overlap),
            overlap,
        }
    }

    pub fn from_settings(split: &SplitSettings, content_height: f32) -> Self {
        Self::compute(split.enable, content_height, split.height, split.overlap)
    }

    pub fn offsets(&self) -> &[f32] {
        &self.offsets
    }

    pub fn content_height(&self) -> f32 {
        self.content_height
    }

    pub fn page_height(&self) -> f32 {
        self.page_height
    }

    pub fn page_count(&self) -> usize {
        self.offsets.len() + 1
    }

    pub fn is_single_page(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn pages(&self) -> Vec<PageSlice> {
        let count = self.page_count();
        if count == 1 {
            return vec![PageSlice {
                index: 0,
                start_y: 0.0,
                height: self.content_height.max(0.0),
            }];
        }
        let advance = self.page_height - self.overlap;
        (0..count)
            .map(|index| {
                let start_y = index as f32 * advance;
                let height = if index + 1 == count {
                    self.content_height - start_y
                } else {
                    self.page_height
                };
                PageSlice {
                    index,
                    start_y,
                    height,
                }
            })
            .collect()
    }

    pub fn summary(&self) -> SplitSummary {
        SplitSummary {
            content_height: self.content_height,
            split_height: self.page_height,
            pages: self.page_count(),
        }
    }
}

/// The info line shown while splitting is enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitSummary {
    pub content_height: f32,
    pub split_height: f32,
    pub pages: usize,
}

impl fmt::Display for SplitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Content height {}px, split height {}px, {} page{}",
            self.content_height.round(),
            self.split_height.round(),
            self.pages,
            if self.pages == 1 { "" } else { "s" }
        )
    }
}

/// Smallest zoom for the preview pane so the whole content fits the viewport.
pub fn preview_min_scale(viewport: Size, content: Size) -> f32 {
    let content_height = if content.height > 0.0 {
        content.height
    } else {
        100.0
    };
    let by_height = viewport.height / content_height;
    let by_width = viewport.width / (content.width.max(0.0) + 2.0);
    1.0f32.min(by_height).min(by_width) / 2.0
}
