//! Page-by-page capture of a mounted surface.
//!
//! The content is laid out once. Each page is isolated by clipping the
//! wrapper and shifting the content root, encoded, and released again before
//! the next page is touched.

use crate::canvas::Scene;
use crate::clip::{ClipControl, ClipGuard, TargetSurface};
use crate::error::{FitFrameError, Result};
use crate::metrics::{CaptureMetrics, PageCaptureMetrics};
use crate::perf::{PerfLogger, elapsed_ms};
use crate::plan::{PageSlice, SplitPlan};
use crate::settings::{ExportFormat, Settings};
use std::time::Instant;

/// A window onto a scene: rows `start_y .. start_y + height`.
#[derive(Debug, Clone, Copy)]
pub struct CaptureView<'a> {
    pub scene: &'a Scene,
    pub start_y: f32,
    pub width: f32,
    pub height: f32,
}

pub trait CaptureTarget: ClipControl {
    /// Rendered height of the unsplit content root.
    fn content_height(&self) -> f32;

    /// The clip wrapper as currently clipped.
    fn element(&self) -> Option<CaptureView<'_>>;

    /// The content root, ignoring any clip.
    fn content_element(&self) -> Option<CaptureView<'_>>;
}

impl CaptureTarget for TargetSurface {
    fn content_height(&self) -> f32 {
        self.scene().map(|scene| scene.size.height).unwrap_or(0.0)
    }

    fn element(&self) -> Option<CaptureView<'_>> {
        let scene = self.scene()?;
        let (start_y, height) = self.visible_window()?;
        Some(CaptureView {
            scene,
            start_y,
            width: scene.size.width,
            height,
        })
    }

    fn content_element(&self) -> Option<CaptureView<'_>> {
        let scene = self.scene()?;
        Some(CaptureView {
            scene,
            start_y: 0.0,
            width: scene.size.width,
            height: scene.size.height,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub format: ExportFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

pub trait ImageEncoder {
    fn encode(
        &mut self,
        view: &CaptureView<'_>,
        format: ExportFormat,
        density: f32,
    ) -> Result<Artifact>;
}

pub trait OutputSink {
    fn write(&mut self, label: &str, artifact: &Artifact) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub format: ExportFormat,
    /// Device pixels per CSS pixel.
    pub density: f32,
    pub page_height: f32,
    pub overlap: f32,
    pub label_base: String,
    pub perf: Option<PerfLogger>,
}

impl CaptureRequest {
    pub fn from_settings(settings: &Settings, label_base: impl Into<String>) -> Self {
        Self {
            format: settings.format,
            density: settings.density(),
            page_height: settings.split.height,
            overlap: settings.split.overlap,
            label_base: label_base.into(),
            perf: None,
        }
    }

    pub fn with_perf(mut self, perf: Option<PerfLogger>) -> Self {
        self.perf = perf;
        self
    }

    pub fn page_label(&self, index: usize) -> String {
        format!("{}_page{}", self.label_base, index + 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureReport {
    /// Labels handed to the sink, in order.
    pub labels: Vec<String>,
    pub metrics: CaptureMetrics,
}

impl CaptureReport {
    pub fn page_count(&self) -> usize {
        self.labels.len()
    }
}

/// Captures every page of `target`'s content, or the whole content once when
/// it fits on a single page.
///
/// An encoder failure stops the run; pages already written stay written.
pub fn capture_all<T, E, S>(
    target: &mut T,
    encoder: &mut E,
    sink: &mut S,
    request: &CaptureRequest,
) -> Result<CaptureReport>
where
    T: CaptureTarget + ?Sized,
    E: ImageEncoder + ?Sized,
    S: OutputSink + ?Sized,
{
    let content_height = target.content_height();
    let plan = SplitPlan::compute(true, content_height, request.page_height, request.overlap);
    if plan.is_single_page() {
        return capture_single(target, encoder, sink, request);
    }

    tracing::debug!(
        pages = plan.page_count(),
        content_height,
        page_height = plan.page_height(),
        "capturing split pages"
    );
    let mut report = CaptureReport::default();
    for page in plan.pages() {
        let started = Instant::now();
        let artifact = capture_page(target, encoder, request, page).map_err(|err| {
            tracing::warn!(page = page.index + 1, %err, "page capture failed");
            FitFrameError::PageCapture {
                page: page.index + 1,
                source: Box::new(err),
            }
        })?;
        let encode_ms = elapsed_ms(started);

        let label = request.page_label(page.index);
        sink.write(&label, &artifact)?;
        record(&mut report, request, page, encode_ms, &artifact, label);
    }
    Ok(report)
}

fn capture_page<T, E>(
    target: &mut T,
    encoder: &mut E,
    request: &CaptureRequest,
    page: PageSlice,
) -> Result<Artifact>
where
    T: CaptureTarget + ?Sized,
    E: ImageEncoder + ?Sized,
{
    let guard = ClipGuard::new(target, page.start_y, page.height);
    let view = guard
        .element()
        .ok_or_else(|| FitFrameError::Encode("capture surface is not mounted".to_string()))?;
    encoder.encode(&view, request.format, request.density)
}

/// Encodes the unclipped content root once, labelled with the base name.
pub fn capture_single<T, E, S>(
    target: &mut T,
    encoder: &mut E,
    sink: &mut S,
    request: &CaptureRequest,
) -> Result<CaptureReport>
where
    T: CaptureTarget + ?Sized,
    E: ImageEncoder + ?Sized,
    S: OutputSink + ?Sized,
{
    let mut report = CaptureReport::default();
    let Some(view) = target.content_element() else {
        tracing::debug!("capture surface not mounted, nothing to capture");
        return Ok(report);
    };
    let page = PageSlice {
        index: 0,
        start_y: 0.0,
        height: view.height,
    };
    let started = Instant::now();
    let artifact = encoder.encode(&view, request.format, request.density)?;
    let encode_ms = elapsed_ms(started);

    sink.write(&request.label_base, &artifact)?;
    record(
        &mut report,
        request,
        page,
        encode_ms,
        &artifact,
        request.label_base.clone(),
    );
    Ok(report)
}

fn record(
    report: &mut CaptureReport,
    request: &CaptureRequest,
    page: PageSlice,
    encode_ms: f64,
    artifact: &Artifact,
    label: String,
) {
    if let Some(perf) = &request.perf {
        perf.log_span_ms("capture.page", Some(page.index), encode_ms);
        perf.log_counts(
            "capture.page",
            Some(page.index),
            &[("bytes", artifact.bytes.len() as u64)],
        );
    }
    report.metrics.record(PageCaptureMetrics {
        index: page.index,
        start_y: page.start_y,
        height: page.height,
        encode_ms,
        bytes: artifact.bytes.len(),
    });
    report.labels.push(label);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Set(f32, f32),
        Reset,
    }

    struct Recording {
        scene: Scene,
        calls: Vec<Call>,
        window: Option<(f32, f32)>,
    }

    impl Recording {
        fn new(height: f32) -> Self {
            Self {
                scene: Scene::empty(Size::new(100.0, height)),
                calls: Vec::new(),
                window: None,
            }
        }
    }

    impl ClipControl for Recording {
        fn set_clip(&mut self, start_y: f32, height: f32) {
            self.calls.push(Call::Set(start_y, height));
            self.window = Some((start_y, height));
        }

        fn reset_clip(&mut self) {
            self.calls.push(Call::Reset);
            self.window = None;
        }
    }

    impl CaptureTarget for Recording {
        fn content_height(&self) -> f32 {
            self.scene.size.height
        }

        fn element(&self) -> Option<CaptureView<'_>> {
            let (start_y, height) = self.window.unwrap_or((0.0, self.scene.size.height));
            Some(CaptureView {
                scene: &self.scene,
                start_y,
                width: self.scene.size.width,
                height,
            })
        }

        fn content_element(&self) -> Option<CaptureView<'_>> {
            Some(CaptureView {
                scene: &self.scene,
                start_y: 0.0,
                width: self.scene.size.width,
                height: self.scene.size.height,
            })
        }
    }

    #[derive(Default)]
    struct StubEncoder {
        views: Vec<(f32, f32, f32)>,
        fail_on: Option<usize>,
    }

    impl ImageEncoder for StubEncoder {
        fn encode(
            &mut self,
            view: &CaptureView<'_>,
            format: ExportFormat,
            density: f32,
        ) -> Result<Artifact> {
            if self.fail_on == Some(self.views.len()) {
                return Err(FitFrameError::Encode("boom".to_string()));
            }
            self.views.push((view.start_y, view.height, density));
            Ok(Artifact {
                format,
                width: (view.width * density) as u32,
                height: (view.height * density) as u32,
                bytes: vec![0; self.views.len()],
            })
        }
    }

    #[derive(Default)]
    struct Collect {
        written: Vec<(String, Artifact)>,
    }

    impl OutputSink for Collect {
        fn write(&mut self, label: &str, artifact: &Artifact) -> Result<()> {
            self.written.push((label.to_string(), artifact.clone()));
            Ok(())
        }
    }

    fn request() -> CaptureRequest {
        CaptureRequest {
            format: ExportFormat::Png0,
            density: 2.0,
            page_height: 1000.0,
            overlap: 80.0,
            label_base: "note".to_string(),
            perf: None,
        }
    }

    #[test]
    fn request_takes_density_and_split_from_settings() {
        let mut settings = Settings::default();
        settings.high_density = false;
        settings.split.height = 640.0;
        let req = CaptureRequest::from_settings(&settings, "card");
        assert_eq!(req.density, 1.0);
        assert_eq!(req.page_height, 640.0);
        assert_eq!(req.page_label(1), "card_page2");

        settings.high_density = true;
        assert_eq!(CaptureRequest::from_settings(&settings, "card").density, 2.0);
    }

    #[test]
    fn three_pages_alternate_set_and_reset() {
        let mut target = Recording::new(2000.0);
        let mut encoder = StubEncoder::default();
        let mut sink = Collect::default();

        let report = capture_all(&mut target, &mut encoder, &mut sink, &request()).unwrap();

        assert_eq!(
            target.calls,
            vec![
                Call::Set(0.0, 1000.0),
                Call::Reset,
                Call::Set(920.0, 1000.0),
                Call::Reset,
                Call::Set(1840.0, 160.0),
                Call::Reset,
            ]
        );
        assert_eq!(
            encoder.views,
            vec![(0.0, 1000.0, 2.0), (920.0, 1000.0, 2.0), (1840.0, 160.0, 2.0)]
        );
        let labels: Vec<&str> = sink.written.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["note_page1", "note_page2", "note_page3"]);
        assert_eq!(report.page_count(), 3);
        assert_eq!(report.metrics.total_bytes, 6);
        assert_eq!(sink.written[2].1.height, 320);
    }

    #[test]
    fn single_page_encodes_content_root_without_clipping() {
        let mut target = Recording::new(500.0);
        let mut encoder = StubEncoder::default();
        let mut sink = Collect::default();
        let mut req = request();
        req.density = 1.0;

        let report = capture_all(&mut target, &mut encoder, &mut sink, &req).unwrap();

        assert!(target.calls.is_empty());
        assert_eq!(encoder.views, vec![(0.0, 500.0, 1.0)]);
        assert_eq!(report.labels, vec!["note".to_string()]);
    }

    #[test]
    fn encoder_failure_keeps_earlier_pages_and_resets_clip() {
        let mut target = Recording::new(2000.0);
        let mut encoder = StubEncoder {
            fail_on: Some(1),
            ..StubEncoder::default()
        };
        let mut sink = Collect::default();

        let err = capture_all(&mut target, &mut encoder, &mut sink, &request()).unwrap_err();

        assert!(matches!(err, FitFrameError::PageCapture { page: 2, .. }));
        assert_eq!(sink.written.len(), 1);
        assert_eq!(sink.written[0].0, "note_page1");
        assert_eq!(target.calls.last(), Some(&Call::Reset));
        assert_eq!(target.calls.len(), 4);
        assert!(target.window.is_none());
    }

    #[test]
    fn surface_clip_is_released_after_capture() {
        let mut surface = TargetSurface::new();
        surface.mount(Scene::empty(Size::new(300.0, 2500.0)));
        let mut encoder = StubEncoder::default();
        let mut sink = Collect::default();

        let report = capture_all(&mut surface, &mut encoder, &mut sink, &request()).unwrap();

        assert_eq!(report.page_count(), 3);
        assert!(!surface.is_clipped());
        assert_eq!(encoder.views[2], (1840.0, 660.0, 2.0));
    }

    #[test]
    fn unmounted_surface_captures_nothing() {
        let mut surface = TargetSurface::new();
        let mut encoder = StubEncoder::default();
        let mut sink = Collect::default();
        let report = capture_all(&mut surface, &mut encoder, &mut sink, &request()).unwrap();
        assert_eq!(report.page_count(), 0);
        assert!(sink.written.is_empty());
    }
}
