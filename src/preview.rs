//! The live preview: view nodes, observer, composed surface, and the
//! capture-in-progress state that freezes all three.

use crate::canvas::{Command, Scene};
use crate::capture::{
    CaptureReport, CaptureRequest, ImageEncoder, OutputSink, capture_all, capture_single,
};
use crate::clip::TargetSurface;
use crate::compose::{compose, guide_commands, with_guides};
use crate::document::Document;
use crate::error::Result;
use crate::layout::{Layout, LayoutEngine};
use crate::measure::TextMeasurer;
use crate::observer::{LayoutObserver, NodeId, Role, Subscription, Trigger, ViewTree};
use crate::perf::PerfLogger;
use crate::plan::{SplitPlan, SplitSummary, preview_min_scale};
use crate::settings::Settings;
use crate::types::Size;

pub struct Preview<M: TextMeasurer> {
    measurer: M,
    settings: Settings,
    document: Document,
    tree: ViewTree,
    root_node: NodeId,
    container_node: Option<NodeId>,
    observer: LayoutObserver,
    root_watch: Subscription,
    layout: Option<Layout>,
    surface: TargetSurface,
    content_height: f32,
    processing: bool,
    stale: bool,
    perf: Option<PerfLogger>,
}

impl<M: TextMeasurer> Preview<M> {
    /// Mounts `document` inside a preview container sized by `settings`.
    pub fn new(measurer: M, settings: Settings, document: Document) -> Self {
        Self::build(measurer, settings, document, true)
    }

    /// Mounts without a preview container; text stays in natural flow.
    pub fn without_container(measurer: M, settings: Settings, document: Document) -> Self {
        Self::build(measurer, settings, document, false)
    }

    fn build(measurer: M, settings: Settings, document: Document, with_container: bool) -> Self {
        let tree = ViewTree::new();
        let clip_node = tree.insert(None, Role::ClipWrapper, Size::ZERO);
        let root_node = tree.insert(Some(clip_node), Role::Generic, Size::ZERO);
        let container_node = with_container.then(|| {
            tree.insert(
                Some(root_node),
                Role::PreviewContainer,
                settings.canvas_size(),
            )
        });
        let content_node = tree.insert(
            container_node.or(Some(root_node)),
            Role::ContentRoot,
            Size::ZERO,
        );
        let observer = LayoutObserver::attach(&tree, content_node);
        let root_watch = tree.observe(root_node);

        let mut preview = Self {
            measurer,
            settings,
            document,
            tree,
            root_node,
            container_node,
            observer,
            root_watch,
            layout: None,
            surface: TargetSurface::new(),
            content_height: 0.0,
            processing: false,
            stale: false,
            perf: None,
        };
        preview.relayout();
        // The observer's first delivery is the size just laid out against.
        let _ = preview.observer.poll();
        preview.sync_content_height();
        preview
    }

    pub fn with_perf(mut self, perf: Option<PerfLogger>) -> Self {
        self.perf = perf;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn surface(&self) -> &TargetSurface {
        &self.surface
    }

    pub fn tree(&self) -> &ViewTree {
        &self.tree
    }

    pub fn container_node(&self) -> Option<NodeId> {
        self.container_node
    }

    pub fn content_height(&self) -> f32 {
        self.content_height
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn replace_content(&mut self, document: Document) {
        self.document = document;
        self.request(Trigger::ContentReplaced);
    }

    pub fn update_settings(&mut self, settings: Settings) {
        let resized =
            settings.width != self.settings.width || settings.height != self.settings.height;
        self.settings = settings;
        if resized {
            if let Some(node) = self.container_node {
                self.tree.resize(node, self.settings.canvas_size());
            }
        }
        self.request(Trigger::SettingsChanged);
    }

    fn request(&mut self, trigger: Trigger) {
        if self.observer.is_active() {
            self.observer.notify(trigger);
        } else {
            self.stale = true;
        }
    }

    /// Applies queued changes. Returns the trigger that caused a relayout.
    pub fn poll(&mut self) -> Option<Trigger> {
        let trigger = self.observer.poll();
        let stale = !self.processing && std::mem::take(&mut self.stale);
        if trigger.is_some() || stale {
            tracing::debug!(?trigger, "relayout");
            self.relayout();
        }
        self.sync_content_height();
        trigger
    }

    fn relayout(&mut self) {
        let container = self
            .observer
            .container()
            .and_then(|node| self.tree.size(node));
        let layout = LayoutEngine::new(&self.measurer)
            .with_perf(self.perf.as_ref())
            .layout(&self.document, &self.settings, container);
        let scene = compose(&layout, &self.settings, &self.measurer);
        self.tree.resize(self.root_node, layout.root_size());
        self.surface.mount(scene);
        self.layout = Some(layout);
    }

    fn sync_content_height(&mut self) {
        if self.processing {
            return;
        }
        if let Some(size) = self.root_watch.take() {
            self.content_height = size.height;
        }
    }

    pub fn split_plan(&self) -> SplitPlan {
        SplitPlan::from_settings(&self.settings.split, self.content_height)
    }

    pub fn split_summary(&self) -> Option<SplitSummary> {
        self.settings
            .split
            .enable
            .then(|| self.split_plan().summary())
    }

    /// Page-cut guides for the current zoom; hidden while capturing.
    pub fn split_guides(&self, scale: f32) -> Vec<Command> {
        if self.processing {
            return Vec::new();
        }
        let width = self.settings.canvas_size().width;
        guide_commands(self.split_plan().offsets(), width, scale)
    }

    /// The surface scene with guides drawn on top, for on-screen display.
    pub fn preview_scene(&self, scale: f32) -> Option<Scene> {
        let scene = self.surface.scene()?;
        Some(with_guides(scene, self.split_guides(scale)))
    }

    pub fn min_scale(&self, viewport: Size) -> f32 {
        let content = Size::new(self.settings.canvas_size().width, self.content_height);
        preview_min_scale(viewport, content)
    }

    /// Exports the mounted content. Split pages are captured one by one when
    /// splitting yields more than one page, otherwise the whole root once.
    ///
    /// Layout is frozen for the duration; changes that arrive meanwhile are
    /// applied afterwards.
    pub fn capture<E, S>(
        &mut self,
        encoder: &mut E,
        sink: &mut S,
        label: &str,
    ) -> Result<CaptureReport>
    where
        E: ImageEncoder + ?Sized,
        S: OutputSink + ?Sized,
    {
        self.settings.validate()?;
        if !self.surface.is_mounted() {
            tracing::debug!("nothing mounted, capture skipped");
            return Ok(CaptureReport::default());
        }

        self.processing = true;
        self.observer.suspend();
        let request =
            CaptureRequest::from_settings(&self.settings, label).with_perf(self.perf.clone());
        let split = self.settings.split.enable && self.split_plan().page_count() > 1;
        let result = if split {
            capture_all(&mut self.surface, encoder, sink, &request)
        } else {
            capture_single(&mut self.surface, encoder, sink, &request)
        };
        self.processing = false;

        if let Some(trigger) = self.observer.resume() {
            tracing::debug!(?trigger, "replaying trigger deferred during capture");
            self.relayout();
        }
        self.sync_content_height();
        if let Some(perf) = &self.perf {
            perf.flush();
        }
        if let Err(err) = &result {
            tracing::warn!(%err, notice = %err.notice(), "capture failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Artifact, CaptureView};
    use crate::error::FitFrameError;
    use crate::export::MemorySink;
    use crate::measure::FixedAdvanceMeasurer;
    use crate::settings::ExportFormat;

    fn doc() -> Document {
        Document::new("note").with_paragraph("alpha beta gamma delta epsilon zeta eta theta")
    }

    fn small_settings() -> Settings {
        let mut settings = Settings::default();
        settings.width = 400;
        settings.height = 300;
        settings
    }

    #[derive(Default)]
    struct Windows {
        seen: Vec<(f32, f32)>,
        on_encode: Option<(ViewTree, NodeId, Size)>,
    }

    impl ImageEncoder for Windows {
        fn encode(
            &mut self,
            view: &CaptureView<'_>,
            format: ExportFormat,
            _density: f32,
        ) -> Result<Artifact> {
            if let Some((tree, node, size)) = &self.on_encode {
                tree.resize(*node, *size);
            }
            self.seen.push((view.start_y, view.height));
            Ok(Artifact {
                format,
                width: view.width as u32,
                height: view.height as u32,
                bytes: vec![0],
            })
        }
    }

    #[test]
    fn mount_fits_paragraphs_and_tracks_root_height() {
        let mut preview = Preview::new(FixedAdvanceMeasurer::default(), small_settings(), doc());
        let layout = preview.layout().unwrap();
        assert!(layout.paragraphs().all(|p| p.fitted));
        assert_eq!(preview.content_height(), 300.0);
        assert!(preview.surface().is_mounted());
        assert_eq!(preview.poll(), None);
    }

    #[test]
    fn missing_container_leaves_text_unfitted() {
        let preview =
            Preview::without_container(FixedAdvanceMeasurer::default(), small_settings(), doc());
        assert!(preview.container_node().is_none());
        let layout = preview.layout().unwrap();
        assert!(layout.paragraphs().all(|p| !p.fitted && p.font_size == 16));
    }

    #[test]
    fn resizing_the_canvas_refits() {
        let mut preview = Preview::new(FixedAdvanceMeasurer::default(), small_settings(), doc());
        let before = preview.layout().unwrap().paragraphs().next().unwrap().font_size;

        let mut wide = small_settings();
        wide.apply_preset(crate::settings::AspectPreset::WIDE);
        preview.update_settings(wide);
        assert!(preview.poll().is_some());

        let after = preview.layout().unwrap().paragraphs().next().unwrap().font_size;
        assert!(after > before);
        assert_eq!(preview.content_height(), 1080.0);
    }

    #[test]
    fn replacing_content_refits_through_the_observer() {
        let mut preview = Preview::new(FixedAdvanceMeasurer::default(), small_settings(), doc());
        preview.replace_content(Document::new("other").with_paragraph("fresh words"));

        assert_eq!(preview.poll(), Some(Trigger::ContentReplaced));
        let paragraph = preview.layout().unwrap().paragraphs().next().unwrap();
        assert!(paragraph.fitted);
        assert_eq!(paragraph.lines[0].text, "fresh words");
        let scene = preview.surface().scene().unwrap();
        assert!(scene.text_runs().any(|t| t == "fresh words"));
        assert_eq!(preview.poll(), None);
    }

    #[test]
    fn replacing_content_without_container_still_rerenders() {
        let mut preview =
            Preview::without_container(FixedAdvanceMeasurer::default(), small_settings(), doc());
        preview.replace_content(Document::new("other").with_paragraph("fresh words"));
        preview.poll();
        let scene = preview.surface().scene().unwrap();
        assert!(scene.text_runs().any(|t| t == "fresh words"));
    }

    #[test]
    fn split_capture_labels_pages() {
        let mut settings = small_settings();
        settings.split.enable = true;
        settings.split.height = 150.0;
        settings.split.overlap = 20.0;
        let mut preview = Preview::new(FixedAdvanceMeasurer::default(), settings, doc());
        // Cuts at 150 and 280 below a 300px root.
        assert_eq!(preview.split_plan().offsets(), &[150.0, 280.0]);
        assert_eq!(preview.split_summary().unwrap().pages, 3);
        assert!(!preview.split_guides(1.0).is_empty());

        let mut encoder = Windows::default();
        let mut sink = MemorySink::new();
        let report = preview.capture(&mut encoder, &mut sink, "note").unwrap();

        assert_eq!(report.page_count(), 3);
        assert_eq!(sink.labels(), vec!["note_page1", "note_page2", "note_page3"]);
        assert_eq!(encoder.seen, vec![(0.0, 150.0), (130.0, 150.0), (260.0, 40.0)]);
        assert!(!preview.is_processing());
        assert!(!preview.surface().is_clipped());
    }

    #[test]
    fn single_page_capture_uses_base_label() {
        let mut preview = Preview::new(FixedAdvanceMeasurer::default(), small_settings(), doc());
        assert!(preview.split_summary().is_none());
        assert!(preview.split_guides(1.0).is_empty());
        let mut encoder = Windows::default();
        let mut sink = MemorySink::new();
        preview.capture(&mut encoder, &mut sink, "note").unwrap();
        assert_eq!(sink.labels(), vec!["note"]);
        assert_eq!(encoder.seen, vec![(0.0, 300.0)]);
    }

    #[test]
    fn invalid_width_fails_before_capture() {
        let mut settings = small_settings();
        settings.width = 20;
        let mut preview = Preview::new(FixedAdvanceMeasurer::default(), settings, doc());
        let mut encoder = Windows::default();
        let mut sink = MemorySink::new();
        let err = preview.capture(&mut encoder, &mut sink, "note").unwrap_err();
        assert!(matches!(err, FitFrameError::InvalidConfiguration(_)));
        assert!(encoder.seen.is_empty());
    }

    #[test]
    fn resize_during_capture_is_replayed_afterwards() {
        let mut preview = Preview::new(FixedAdvanceMeasurer::default(), small_settings(), doc());
        let before = preview.layout().unwrap().paragraphs().next().unwrap().font_size;
        let container = preview.container_node().unwrap();
        let mut encoder = Windows {
            on_encode: Some((preview.tree().clone(), container, Size::new(1920.0, 1080.0))),
            ..Windows::default()
        };
        let mut sink = MemorySink::new();

        preview.capture(&mut encoder, &mut sink, "note").unwrap();

        // The capture itself saw the layout from before the resize.
        assert_eq!(encoder.seen, vec![(0.0, 300.0)]);
        let after = preview.layout().unwrap().paragraphs().next().unwrap().font_size;
        assert!(after > before);
    }

    #[test]
    fn min_scale_fits_viewport() {
        let preview = Preview::new(FixedAdvanceMeasurer::default(), small_settings(), doc());
        // min(1, 600 / 300, 800 / 402) / 2
        assert_eq!(preview.min_scale(Size::new(800.0, 600.0)), 0.5);
    }
}
