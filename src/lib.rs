mod canvas;
mod capture;
mod clip;
mod compose;
mod document;
mod error;
mod export;
mod fit;
mod font;
mod layout;
mod measure;
mod metrics;
mod observer;
mod perf;
mod plan;
mod preview;
mod raster;
mod settings;
mod types;
mod wrap;

pub use canvas::{Canvas, Command, Scene};
pub use capture::{
    Artifact, CaptureReport, CaptureRequest, CaptureTarget, CaptureView, ImageEncoder,
    OutputSink, capture_all, capture_single,
};
pub use clip::{ClipControl, ClipGuard, ContentStyle, TargetSurface, WrapperStyle};
pub use compose::{compose, guide_commands, with_guides};
pub use document::{Block, Document, MetadataEntry, MetadataValue};
pub use error::{FitFrameError, Notice, Result};
pub use export::{DirSink, MemorySink, RasterEncoder};
pub use fit::{
    AspectBucket, FitResult, FitTarget, HORIZONTAL_PADDING, MAX_FONT_SIZE, MIN_FONT_SIZE,
    PaddingPolicy, ParagraphBox, fit_font_size, seed_font_size,
};
pub use font::{FontRegistry, RegisteredFont};
pub use layout::{
    AuthorBar, LaidOutBlock, Layout, LayoutEngine, MetadataRow, SizedParagraph, TextBlock,
};
pub use measure::{FixedAdvanceMeasurer, LINE_HEIGHT_FACTOR, MeasureProbe, TextMeasurer};
pub use metrics::{CaptureMetrics, PageCaptureMetrics};
pub use observer::{LayoutObserver, NodeId, Role, Subscription, Trigger, ViewTree};
pub use perf::PerfLogger;
pub use plan::{
    PageSlice, SplitPlan, SplitSummary, effective_page_height, plan_splits, preview_min_scale,
};
pub use preview::Preview;
pub use raster::{render_view, render_window};
pub use settings::{
    AspectPreset, AuthorAlign, AuthorInfo, AuthorPosition, ExportFormat, FontFamily, Settings,
    SplitSettings, Watermark, WatermarkImage, WatermarkText, WatermarkType,
};
pub use types::{Color, Rect, Size};
pub use wrap::{HighlightLine, Segment, WrappedParagraph, wrap_highlight_lines, wrap_to_width};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Fonts, settings and logging shared by every preview and export.
#[derive(Debug, Clone)]
pub struct FitFrame {
    settings: Settings,
    font_registry: Arc<FontRegistry>,
    perf: Option<PerfLogger>,
}

#[derive(Clone)]
pub struct FitFrameBuilder {
    settings: Settings,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    font_bytes: Vec<(Vec<u8>, Option<String>)>,
    system_fonts: bool,
    perf_path: Option<PathBuf>,
}

impl FitFrame {
    pub fn builder() -> FitFrameBuilder {
        FitFrameBuilder::new()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn fonts(&self) -> &Arc<FontRegistry> {
        &self.font_registry
    }

    pub fn perf(&self) -> Option<&PerfLogger> {
        self.perf.as_ref()
    }

    /// Mounts `document` in a live preview measured with the registered fonts.
    pub fn preview(&self, document: Document) -> Preview<Arc<FontRegistry>> {
        Preview::new(
            Arc::clone(&self.font_registry),
            self.settings.clone(),
            document,
        )
        .with_perf(self.perf.clone())
    }

    pub fn encoder(&self) -> RasterEncoder {
        RasterEncoder::new(Some(Arc::clone(&self.font_registry)))
    }

    /// Lays out `document` and captures it into `sink`, one artifact per page
    /// when splitting is enabled.
    pub fn export<S: OutputSink + ?Sized>(
        &self,
        document: Document,
        label: &str,
        sink: &mut S,
    ) -> Result<CaptureReport> {
        self.settings.validate()?;
        let mut preview = self.preview(document);
        let mut encoder = self.encoder();
        let report = preview.capture(&mut encoder, sink, label)?;
        tracing::debug!(
            label,
            pages = report.page_count(),
            bytes = report.metrics.total_bytes,
            "export finished"
        );
        Ok(report)
    }

    pub fn export_to_dir(
        &self,
        document: Document,
        label: &str,
        dir: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>> {
        let mut sink = DirSink::new(dir);
        self.export(document, label, &mut sink)?;
        Ok(sink.written().to_vec())
    }

    pub fn export_to_memory(
        &self,
        document: Document,
        label: &str,
    ) -> Result<Vec<(String, Artifact)>> {
        let mut sink = MemorySink::new();
        self.export(document, label, &mut sink)?;
        Ok(sink.outputs)
    }
}

impl Default for FitFrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FitFrameBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            font_bytes: Vec::new(),
            system_fonts: true,
            perf_path: None,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn register_font_bytes(mut self, data: Vec<u8>, name: Option<&str>) -> Self {
        self.font_bytes.push((data, name.map(str::to_string)));
        self
    }

    // Looks up sans-serif and serif fallbacks in the usual system font
    // directories (plus FITFRAME_FONT_DIR). On by default.
    pub fn system_fonts(mut self, enabled: bool) -> Self {
        self.system_fonts = enabled;
        self
    }

    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<FitFrame> {
        let mut registry = FontRegistry::new();
        for dir in &self.font_dirs {
            registry.register_dir(dir);
        }
        for file in &self.font_files {
            registry.register_file(file)?;
        }
        for (data, name) in self.font_bytes {
            registry.register_bytes(data, name.as_deref())?;
        }
        if self.system_fonts {
            registry.load_system_fallbacks();
        }
        if registry.is_empty() {
            tracing::debug!("no fonts registered, text uses estimated widths");
        }

        let perf = match &self.perf_path {
            Some(path) => Some(PerfLogger::new(path)?),
            None => None,
        };

        Ok(FitFrame {
            settings: self.settings,
            font_registry: Arc::new(registry),
            perf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(settings: Settings) -> FitFrame {
        FitFrame::builder()
            .settings(settings)
            .system_fonts(false)
            .build()
            .unwrap()
    }

    fn small() -> Settings {
        let mut settings = Settings::default();
        settings.width = 120;
        settings.height = 90;
        settings.high_density = false;
        settings
    }

    fn doc() -> Document {
        Document::new("card").with_paragraph("short words fill the card")
    }

    #[test]
    fn export_single_page_to_memory() {
        let outputs = engine(small()).export_to_memory(doc(), "card").unwrap();
        assert_eq!(outputs.len(), 1);
        let (label, artifact) = &outputs[0];
        assert_eq!(label, "card");
        assert_eq!((artifact.width, artifact.height), (120, 90));
        assert!(artifact.bytes.starts_with(b"\x89PNG"));
    }

    #[test]
    fn export_split_pages_to_dir() {
        let mut settings = small();
        settings.format = ExportFormat::Jpg;
        settings.split.enable = true;
        settings.split.height = 60.0;
        settings.split.overlap = 0.0;
        let dir = tempfile::tempdir().unwrap();

        let written = engine(settings)
            .export_to_dir(doc(), "card", dir.path())
            .unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["card_page1.jpg", "card_page2.jpg"]);
        assert!(written.iter().all(|p| p.exists()));
    }

    #[test]
    fn narrow_width_is_rejected_with_notice() {
        let mut settings = small();
        settings.width = 12;
        let err = engine(settings).export_to_memory(doc(), "card").unwrap_err();
        assert_eq!(err.notice(), Notice::InvalidWidth);
    }

    #[test]
    fn unsupported_font_file_fails_build() {
        let err = FitFrame::builder()
            .system_fonts(false)
            .register_font_file("fonts/readme.txt")
            .build()
            .unwrap_err();
        assert!(matches!(err, FitFrameError::Font(_)));
    }

    #[test]
    fn perf_log_records_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.jsonl");
        let engine = FitFrame::builder()
            .settings(small())
            .system_fonts(false)
            .perf_log(&path)
            .build()
            .unwrap();
        engine.export_to_memory(doc(), "card").unwrap();
        engine.perf().unwrap().flush();
        let log = std::fs::read_to_string(&path).unwrap();
        assert!(!log.trim().is_empty());
    }
}
