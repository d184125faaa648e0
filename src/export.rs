//! Default encoder and output sinks.

use crate::capture::{Artifact, CaptureView, ImageEncoder, OutputSink};
use crate::error::{FitFrameError, Result};
use crate::font::FontRegistry;
use crate::raster::render_view;
use crate::settings::ExportFormat;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::Pixmap;

const DEFAULT_JPEG_QUALITY: u8 = 92;
/// CSS pixels are 1/96 in, PDF points 1/72 in.
const PT_PER_PX: f32 = 0.75;

/// Rasterizes views with tiny-skia and encodes them per export format.
#[derive(Debug, Clone)]
pub struct RasterEncoder {
    fonts: Option<Arc<FontRegistry>>,
    jpeg_quality: u8,
}

impl Default for RasterEncoder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RasterEncoder {
    pub fn new(fonts: Option<Arc<FontRegistry>>) -> Self {
        Self {
            fonts,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}

impl ImageEncoder for RasterEncoder {
    fn encode(
        &mut self,
        view: &CaptureView<'_>,
        format: ExportFormat,
        density: f32,
    ) -> Result<Artifact> {
        let pixmap = render_view(view, density, self.fonts.as_deref())?;
        let (width, height) = (pixmap.width(), pixmap.height());
        let bytes = match format {
            ExportFormat::Png0 | ExportFormat::Png1 => pixmap
                .encode_png()
                .map_err(|e| FitFrameError::Encode(format!("png encode failed: {e}")))?,
            ExportFormat::Jpg => encode_jpeg(&pixmap, self.jpeg_quality)?,
            ExportFormat::Webp => encode_webp(&pixmap)?,
            ExportFormat::Pdf => {
                let jpeg = encode_jpeg(&pixmap, self.jpeg_quality)?;
                wrap_jpeg_in_pdf(jpeg, width, height, view.width, view.height)?
            }
        };
        tracing::trace!(?format, width, height, bytes = bytes.len(), "view encoded");
        Ok(Artifact {
            format,
            width,
            height,
            bytes,
        })
    }
}

/// Composites onto white; JPEG has no alpha.
fn flatten_rgb(pixmap: &Pixmap) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixmap.width() as usize * pixmap.height() as usize * 3);
    for px in pixmap.pixels() {
        let backdrop = 255 - px.alpha();
        out.push(px.red().saturating_add(backdrop));
        out.push(px.green().saturating_add(backdrop));
        out.push(px.blue().saturating_add(backdrop));
    }
    out
}

fn straight_rgba(pixmap: &Pixmap) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let color = px.demultiply();
        out.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    out
}

fn encode_jpeg(pixmap: &Pixmap, quality: u8) -> Result<Vec<u8>> {
    let rgb = flatten_rgb(pixmap);
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(&rgb, pixmap.width(), pixmap.height(), ExtendedColorType::Rgb8)
        .map_err(|e| FitFrameError::Encode(format!("jpeg encode failed: {e}")))?;
    Ok(out)
}

fn encode_webp(pixmap: &Pixmap) -> Result<Vec<u8>> {
    let rgba = straight_rgba(pixmap);
    let mut out = Vec::new();
    WebPEncoder::new_lossless(&mut out)
        .encode(&rgba, pixmap.width(), pixmap.height(), ExtendedColorType::Rgba8)
        .map_err(|e| FitFrameError::Encode(format!("webp encode failed: {e}")))?;
    Ok(out)
}

/// A one-page PDF showing the JPEG at the view's CSS size.
fn wrap_jpeg_in_pdf(
    jpeg: Vec<u8>,
    pixel_width: u32,
    pixel_height: u32,
    css_width: f32,
    css_height: f32,
) -> Result<Vec<u8>> {
    let page_w = (css_width * PT_PER_PX).round().max(1.0) as i64;
    let page_h = (css_height * PT_PER_PX).round().max(1.0) as i64;

    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let image_id = doc.add_object(LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(pixel_width),
            "Height" => i64::from(pixel_height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));
    let content = format!("q {page_w} 0 0 {page_h} 0 0 cm /Im0 Do Q").into_bytes();
    let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "MediaBox" => vec![0.into(), 0.into(), page_w.into(), page_h.into()],
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, LoObject::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| FitFrameError::Encode(format!("pdf save failed: {e}")))?;
    Ok(out)
}

/// Writes each artifact as `{label}.{ext}` inside a directory.
#[derive(Debug, Clone)]
pub struct DirSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            written: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl OutputSink for DirSink {
    fn write(&mut self, label: &str, artifact: &Artifact) -> Result<()> {
        let sink_err = |err: std::io::Error| FitFrameError::Sink {
            label: label.to_string(),
            message: err.to_string(),
        };
        fs::create_dir_all(&self.dir).map_err(sink_err)?;
        let path = self
            .dir
            .join(format!("{label}.{}", artifact.format.extension()));
        fs::write(&path, &artifact.bytes).map_err(sink_err)?;
        tracing::debug!(path = %path.display(), bytes = artifact.bytes.len(), "artifact written");
        self.written.push(path);
        Ok(())
    }
}

/// Keeps artifacts in memory, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub outputs: Vec<(String, Artifact)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.outputs.iter().map(|(label, _)| label.as_str()).collect()
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, label: &str, artifact: &Artifact) -> Result<()> {
        self.outputs.push((label.to_string(), artifact.clone()));
        Ok(())
    }
}
