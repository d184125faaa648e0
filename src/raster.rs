use crate::canvas::{Command, Scene};
use crate::capture::CaptureView;
use crate::error::{FitFrameError, Result};
use crate::font::{FontRegistry, detect_direction};
use crate::types::{Color, Rect as FrameRect};
use base64::Engine;
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::HashMap;
use std::path::Path as FsPath;
use tiny_skia::{
    FillRule, FilterQuality, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    StrokeDash, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

#[derive(Clone)]
struct RasterState {
    transform: Transform,
    fill_color: Color,
    stroke_color: Color,
    line_width: f32,
    dash_pattern: Vec<f32>,
    dash_phase: f32,
    opacity: f32,
    font_family: String,
    font_size: f32,
    clip_mask: Option<Mask>,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: 1.0,
            dash_pattern: Vec::new(),
            dash_phase: 0.0,
            opacity: 1.0,
            font_family: String::new(),
            font_size: 16.0,
            clip_mask: None,
        }
    }
}

/// Rasterizes the rows of `view` at `density` device pixels per CSS pixel.
pub fn render_view(
    view: &CaptureView<'_>,
    density: f32,
    fonts: Option<&FontRegistry>,
) -> Result<Pixmap> {
    render_window(view.scene, view.start_y, view.width, view.height, density, fonts)
}

pub fn render_window(
    scene: &Scene,
    start_y: f32,
    width: f32,
    height: f32,
    density: f32,
    fonts: Option<&FontRegistry>,
) -> Result<Pixmap> {
    let density = if density > 0.0 { density } else { 1.0 };
    let width_px = to_px(width, density)?;
    let height_px = to_px(height, density)?;
    let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
        FitFrameError::Encode(format!("invalid raster size {width_px}x{height_px}"))
    })?;

    let base_transform = Transform::from_scale(density, density).pre_translate(0.0, -start_y);
    let mut state = RasterState::default();
    let mut stack: Vec<RasterState> = Vec::new();
    let mut image_cache: HashMap<String, Option<Pixmap>> = HashMap::new();

    for cmd in &scene.commands {
        match cmd {
            Command::SaveState => stack.push(state.clone()),
            Command::RestoreState => {
                if let Some(restored) = stack.pop() {
                    state = restored;
                }
            }
            Command::Translate(x, y) => {
                state.transform = state.transform.pre_translate(*x, *y);
            }
            Command::Rotate(degrees) => {
                state.transform = state.transform.pre_concat(Transform::from_rotate(*degrees));
            }
            Command::SetFillColor(color) => state.fill_color = *color,
            Command::SetStrokeColor(color) => state.stroke_color = *color,
            Command::SetLineWidth(width) => state.line_width = width.max(0.0),
            Command::SetDash { pattern, phase } => {
                state.dash_pattern = pattern.clone();
                state.dash_phase = *phase;
            }
            Command::SetOpacity(opacity) => state.opacity = opacity.clamp(0.0, 1.0),
            Command::SetFontFamily(family) => state.font_family = family.clone(),
            Command::SetFontSize(size) => state.font_size = *size,
            Command::ClipRect(rect) => {
                if let Some(path) = to_sk_rect(*rect).map(PathBuilder::from_rect) {
                    let transform = base_transform.pre_concat(state.transform);
                    apply_clip_path(
                        &mut state,
                        &path,
                        transform,
                        pixmap.width(),
                        pixmap.height(),
                    );
                }
            }
            Command::FillRect(rect) => {
                if let Some(rect) = to_sk_rect(*rect) {
                    let paint = fill_paint(state.fill_color, state.opacity);
                    pixmap.fill_rect(
                        rect,
                        &paint,
                        base_transform.pre_concat(state.transform),
                        state.clip_mask.as_ref(),
                    );
                }
            }
            Command::StrokeLine { x1, y1, x2, y2 } => {
                let mut builder = PathBuilder::new();
                builder.move_to(*x1, *y1);
                builder.line_to(*x2, *y2);
                if let Some(path) = builder.finish() {
                    let paint = fill_paint(state.stroke_color, state.opacity);
                    pixmap.stroke_path(
                        &path,
                        &paint,
                        &build_stroke(&state),
                        base_transform.pre_concat(state.transform),
                        state.clip_mask.as_ref(),
                    );
                }
            }
            Command::DrawString { x, baseline, text } => {
                draw_string(&mut pixmap, &state, *x, *baseline, text, base_transform, fonts);
            }
            Command::DrawImage {
                rect,
                source,
                round,
            } => {
                let image = image_cache
                    .entry(source.clone())
                    .or_insert_with(|| load_image_pixmap(source));
                match image.as_ref() {
                    Some(image) => draw_image(
                        &mut pixmap,
                        &state,
                        image,
                        *rect,
                        *round,
                        base_transform,
                    ),
                    None => {
                        tracing::debug!(source = %truncate(source), "image could not be loaded")
                    }
                }
            }
        }
    }

    Ok(pixmap)
}

fn to_px(css: f32, density: f32) -> Result<u32> {
    let px = (css * density).round();
    if !(px >= 1.0) || px > u32::MAX as f32 {
        return Err(FitFrameError::Encode(format!(
            "capture window of {css}px is not drawable"
        )));
    }
    Ok(px as u32)
}

fn to_sk_rect(rect: FrameRect) -> Option<Rect> {
    Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)
}

fn apply_clip_path(
    state: &mut RasterState,
    path: &Path,
    transform: Transform,
    width: u32,
    height: u32,
) {
    if let Some(mask) = state.clip_mask.as_mut() {
        mask.intersect_path(path, FillRule::Winding, true, transform);
        return;
    }
    let Some(mut mask) = Mask::new(width, height) else {
        return;
    };
    mask.fill_path(path, FillRule::Winding, true, transform);
    state.clip_mask = Some(mask);
}

fn draw_string(
    pixmap: &mut Pixmap,
    state: &RasterState,
    x: f32,
    baseline: f32,
    text: &str,
    base_transform: Transform,
    fonts: Option<&FontRegistry>,
) {
    let font_size = state.font_size.max(0.0);
    if font_size <= 0.0 || text.is_empty() {
        return;
    }
    let Some(font_data) = fonts.and_then(|fonts| fonts.font_data(&state.font_family)) else {
        tracing::trace!(family = %state.font_family, "no font for text run, skipped");
        return;
    };
    let Ok(face) = ttf_parser::Face::parse(font_data.as_slice(), 0) else {
        return;
    };

    let paint = fill_paint(state.fill_color, state.opacity);
    let device_transform = base_transform.pre_concat(state.transform);
    for placement in layout_text_glyphs(font_data.as_slice(), text, font_size, x, baseline) {
        let mut builder =
            GlyphPathBuilder::new(placement.origin_x, placement.origin_y, placement.scale);
        if face
            .outline_glyph(GlyphId(placement.glyph_id), &mut builder)
            .is_none()
        {
            continue;
        }
        let Some(path) = builder.finish() else {
            continue;
        };
        pixmap.fill_path(
            &path,
            &paint,
            FillRule::Winding,
            device_transform,
            state.clip_mask.as_ref(),
        );
    }
}

fn draw_image(
    pixmap: &mut Pixmap,
    state: &RasterState,
    image: &Pixmap,
    rect: FrameRect,
    round: bool,
    base_transform: Transform,
) {
    let src_w = image.width() as f32;
    let src_h = image.height() as f32;
    if src_w <= 0.0 || src_h <= 0.0 || rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }
    let device = base_transform.pre_concat(state.transform);
    let image_ts = device.pre_concat(Transform::from_row(
        rect.width / src_w,
        0.0,
        0.0,
        rect.height / src_h,
        rect.x,
        rect.y,
    ));

    let round_mask;
    let mut mask = state.clip_mask.as_ref();
    if round {
        let radius = rect.width.min(rect.height) / 2.0;
        let circle = PathBuilder::from_circle(
            rect.x + rect.width / 2.0,
            rect.y + rect.height / 2.0,
            radius,
        );
        if let Some(circle) = circle {
            let mut clipped = RasterState {
                clip_mask: state.clip_mask.clone(),
                ..RasterState::default()
            };
            apply_clip_path(&mut clipped, &circle, device, pixmap.width(), pixmap.height());
            round_mask = clipped.clip_mask;
            mask = round_mask.as_ref();
        }
    }

    let mut paint = PixmapPaint::default();
    paint.quality = FilterQuality::Bilinear;
    paint.opacity = state.opacity.clamp(0.0, 1.0);
    pixmap.draw_pixmap(0, 0, image.as_ref(), &paint, image_ts, mask);
}

#[derive(Clone, Copy)]
struct GlyphPlacement {
    glyph_id: u16,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

fn layout_text_glyphs(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> Vec<GlyphPlacement> {
    let Some(face) = HbFace::from_slice(font_data, 0) else {
        return Vec::new();
    };
    let units = face.units_per_em().max(1) as f32;
    let scale = font_size / units;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();

    let mut out = Vec::with_capacity(infos.len());
    let mut pen_x = 0.0f32;
    for (info, pos) in infos.iter().zip(positions.iter()) {
        let advance = pos.x_advance as f32 * scale;
        let gid = info.glyph_id as u16;
        if gid != 0 {
            out.push(GlyphPlacement {
                glyph_id: gid,
                origin_x: baseline_x + pen_x + pos.x_offset as f32 * scale,
                // Font units grow upwards, the canvas grows downwards.
                origin_y: baseline_y - pos.y_offset as f32 * scale,
                scale,
            });
        }
        pen_x += advance;
    }
    out
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn build_stroke(state: &RasterState) -> Stroke {
    let mut stroke = Stroke {
        width: state.line_width.max(0.0),
        ..Stroke::default()
    };
    let mut pattern: Vec<f32> = state.dash_pattern.iter().map(|p| p.abs()).collect();
    if pattern.len() % 2 == 1 {
        pattern.extend(pattern.clone());
    }
    if pattern.len() >= 2 {
        stroke.dash = StrokeDash::new(pattern, state.dash_phase);
    }
    stroke
}

fn fill_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, opacity));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color, opacity: f32) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(
        color.r.clamp(0.0, 1.0),
        color.g.clamp(0.0, 1.0),
        color.b.clamp(0.0, 1.0),
        opacity.clamp(0.0, 1.0),
    )
    .unwrap_or(tiny_skia::Color::BLACK)
}

fn truncate(source: &str) -> String {
    source.chars().take(48).collect()
}

fn load_image_pixmap(source: &str) -> Option<Pixmap> {
    if let Some((_mime, data)) = parse_data_uri(source) {
        return decode_image_to_pixmap(&data);
    }
    let bytes = std::fs::read(FsPath::new(source)).ok()?;
    decode_image_to_pixmap(&bytes)
}

fn decode_image_to_pixmap(data: &[u8]) -> Option<Pixmap> {
    let decoded = image::load_from_memory(data).ok()?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    for (src, dst) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let alpha = src[3];
        dst[0] = premul_u8(src[0], alpha);
        dst[1] = premul_u8(src[1], alpha);
        dst[2] = premul_u8(src[2], alpha);
        dst[3] = alpha;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::types::Size;

    fn striped_scene() -> Scene {
        let mut canvas = Canvas::new(Size::new(10.0, 20.0));
        canvas.set_fill_color(Color::rgb8(255, 0, 0));
        canvas.fill_rect(FrameRect::new(0.0, 0.0, 10.0, 10.0));
        canvas.set_fill_color(Color::rgb8(0, 0, 255));
        canvas.fill_rect(FrameRect::new(0.0, 10.0, 10.0, 10.0));
        canvas.finish()
    }

    fn rgba(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let px = pixmap.pixel(x, y).unwrap();
        (px.red(), px.green(), px.blue(), px.alpha())
    }

    #[test]
    fn window_is_shifted_to_start_row() {
        let scene = striped_scene();
        let pixmap = render_window(&scene, 10.0, 10.0, 10.0, 1.0, None).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (10, 10));
        assert_eq!(rgba(&pixmap, 5, 0), (0, 0, 255, 255));
        assert_eq!(rgba(&pixmap, 5, 9), (0, 0, 255, 255));
    }

    #[test]
    fn density_scales_device_pixels() {
        let scene = striped_scene();
        let pixmap = render_window(&scene, 0.0, 10.0, 20.0, 2.0, None).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (20, 40));
        assert_eq!(rgba(&pixmap, 10, 5), (255, 0, 0, 255));
        assert_eq!(rgba(&pixmap, 10, 35), (0, 0, 255, 255));
    }

    #[test]
    fn clip_rect_limits_fills() {
        let mut canvas = Canvas::new(Size::new(10.0, 10.0));
        canvas.save_state();
        canvas.clip_rect(FrameRect::new(0.0, 0.0, 10.0, 5.0));
        canvas.set_fill_color(Color::rgb8(0, 255, 0));
        canvas.fill_rect(FrameRect::new(0.0, 0.0, 10.0, 10.0));
        canvas.restore_state();
        let pixmap = render_window(&canvas.finish(), 0.0, 10.0, 10.0, 1.0, None).unwrap();
        assert_eq!(rgba(&pixmap, 5, 2), (0, 255, 0, 255));
        assert_eq!(rgba(&pixmap, 5, 8).3, 0);
    }

    #[test]
    fn empty_window_is_an_encode_error() {
        let scene = striped_scene();
        let err = render_window(&scene, 0.0, 10.0, 0.0, 1.0, None).unwrap_err();
        assert!(matches!(err, FitFrameError::Encode(_)));
    }

    #[test]
    fn text_without_fonts_is_skipped() {
        let mut canvas = Canvas::new(Size::new(40.0, 20.0));
        canvas.draw_string(0.0, 15.0, "hello");
        let pixmap = render_window(&canvas.finish(), 0.0, 40.0, 20.0, 1.0, None).unwrap();
        assert!(pixmap.pixels().iter().all(|px| px.alpha() == 0));
    }

    #[test]
    fn data_uri_images_are_drawn() {
        let mut img = image::RgbaImage::new(2, 2);
        for px in img.pixels_mut() {
            *px = image::Rgba([0, 128, 0, 255]);
        }
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );

        let mut canvas = Canvas::new(Size::new(8.0, 8.0));
        canvas.draw_image(FrameRect::new(0.0, 0.0, 8.0, 8.0), uri, false);
        let pixmap = render_window(&canvas.finish(), 0.0, 8.0, 8.0, 1.0, None).unwrap();
        assert_eq!(rgba(&pixmap, 4, 4), (0, 128, 0, 255));
    }

    #[test]
    fn data_uri_parsing() {
        let (mime, data) = parse_data_uri("data:text/plain,hi").unwrap();
        assert_eq!(mime, "text/plain");
        assert_eq!(data, b"hi");
        assert!(parse_data_uri("avatar.png").is_none());
    }
}
