use crate::canvas::{Canvas, Command, Scene};
use crate::layout::{
    AuthorBar, LaidOutBlock, Layout, METADATA_FONT_SIZE, MetadataRow, SizedParagraph, TextBlock,
};
use crate::measure::TextMeasurer;
use crate::settings::{AuthorAlign, AuthorInfo, AuthorPosition, Settings, WatermarkType};
use crate::types::{Color, Rect, Size};

const DEFAULT_HIGHLIGHT: Color = Color {
    r: 1.0,
    g: 235.0 / 255.0,
    b: 194.0 / 255.0,
};
const MUTED_TEXT: &str = "#666666";
const BORDER: &str = "#e0e0e0";
const GUIDE_ACCENT: &str = "#8a5cf5";
const METADATA_KEY_COLUMN: f32 = 200.0;
const AVATAR_SIZE: f32 = 48.0;
const AUTHOR_PADDING: f32 = 24.0;
const AUTHOR_GAP: f32 = 12.0;
const AUTHOR_NAME_SIZE: f32 = 16.0;
const AUTHOR_REMARK_SIZE: f32 = 12.0;

/// Baseline of a line of `font_size` text centred in a line box at `top`.
fn baseline(top: f32, font_size: f32, line_height: f32) -> f32 {
    top + (line_height - font_size) / 2.0 + font_size * 0.8
}

/// Draws the content root for `layout`. Split guides are not part of it.
pub fn compose<M: TextMeasurer + ?Sized>(
    layout: &Layout,
    settings: &Settings,
    measurer: &M,
) -> Scene {
    let mut canvas = Canvas::new(layout.root_size());
    if !settings.format.is_transparent() {
        canvas.fill_background(Color::WHITE);
    }
    canvas.set_font_family(&layout.family);

    canvas.save_state();
    canvas.clip_rect(layout.container);
    let highlight = Color::from_hex_or(&settings.highlight_color, DEFAULT_HIGHLIGHT);
    for block in &layout.blocks {
        match block {
            LaidOutBlock::Title(text) | LaidOutBlock::Heading(text) => {
                draw_text_block(&mut canvas, text);
            }
            LaidOutBlock::Metadata(rows) => draw_metadata(&mut canvas, rows),
            LaidOutBlock::Paragraph(paragraph) => {
                draw_paragraph(&mut canvas, paragraph, highlight);
            }
        }
    }
    if settings.watermark.enable {
        draw_watermark(&mut canvas, layout.container, settings, measurer, &layout.family);
    }
    canvas.restore_state();

    if let Some(bar) = &layout.author_bar {
        draw_author_bar(
            &mut canvas,
            bar,
            &settings.author_info,
            measurer,
            &layout.family,
        );
    }
    canvas.finish()
}

fn draw_text_block(canvas: &mut Canvas, block: &TextBlock) {
    canvas.set_fill_color(Color::BLACK);
    canvas.set_font_size(block.font_size);
    for (idx, line) in block.lines.iter().enumerate() {
        let top = block.rect.y + idx as f32 * block.line_height;
        canvas.draw_string(
            block.rect.x,
            baseline(top, block.font_size, block.line_height),
            line.as_str(),
        );
    }
}

fn draw_metadata(canvas: &mut Canvas, rows: &[MetadataRow]) {
    let font_size = METADATA_FONT_SIZE;
    canvas.set_font_size(font_size);
    let muted = Color::from_hex_or(MUTED_TEXT, Color::BLACK);
    for row in rows {
        let y = baseline(row.rect.y, font_size, row.rect.height);
        canvas.set_fill_color(muted);
        canvas.draw_string(row.rect.x, y, row.key.as_str());
        canvas.set_fill_color(Color::BLACK);
        canvas.draw_string(row.rect.x + METADATA_KEY_COLUMN, y, row.value.as_str());
    }
}

fn draw_paragraph(canvas: &mut Canvas, paragraph: &SizedParagraph, highlight: Color) {
    let size = paragraph.font_size as f32;
    let band_height = (size * 1.2).min(paragraph.line_height);
    let band_inset = (paragraph.line_height - band_height) / 2.0;

    if paragraph.fitted {
        canvas.set_fill_color(highlight);
        for (idx, width) in paragraph.line_widths.iter().enumerate() {
            let top = paragraph.rect.y + idx as f32 * paragraph.line_height;
            canvas.fill_rect(Rect::new(
                paragraph.rect.x,
                top + band_inset,
                *width,
                band_height,
            ));
        }
    }

    canvas.set_fill_color(Color::BLACK);
    canvas.set_font_size(size);
    for (idx, line) in paragraph.lines.iter().enumerate() {
        let top = paragraph.rect.y + idx as f32 * paragraph.line_height;
        canvas.draw_string(
            paragraph.rect.x,
            baseline(top, size, paragraph.line_height),
            line.text.as_str(),
        );
    }
}

/// Repeats the watermark over the container in a grid of rotated tiles.
fn draw_watermark<M: TextMeasurer + ?Sized>(
    canvas: &mut Canvas,
    container: Rect,
    settings: &Settings,
    measurer: &M,
    family: &str,
) {
    let mark = &settings.watermark;
    let has_content = match mark.kind {
        WatermarkType::Text => !mark.text.content.trim().is_empty(),
        WatermarkType::Image => !mark.image.src.trim().is_empty(),
    };
    let step_x = mark.width + mark.x;
    let step_y = mark.height + mark.y;
    if !has_content || mark.width <= 0.0 || mark.height <= 0.0 || step_x <= 0.0 || step_y <= 0.0 {
        return;
    }

    canvas.save_state();
    canvas.set_opacity(mark.opacity);
    let font_size = if mark.text.font_size > 0.0 {
        mark.text.font_size
    } else {
        16.0
    };
    let text_width = measurer.text_width(family, font_size, &mark.text.content);
    let color = Color::from_hex_or(&mark.text.color, Color::rgb8(0xcc, 0xcc, 0xcc));

    let mut ty = container.y;
    while ty < container.bottom() {
        let mut tx = container.x;
        while tx < container.right() {
            canvas.save_state();
            canvas.translate(tx + mark.width / 2.0, ty + mark.height / 2.0);
            canvas.rotate(-mark.rotate);
            match mark.kind {
                WatermarkType::Text => {
                    canvas.set_fill_color(color);
                    canvas.set_font_size(font_size);
                    canvas.draw_string(
                        -text_width / 2.0,
                        font_size * 0.35,
                        mark.text.content.as_str(),
                    );
                }
                WatermarkType::Image => {
                    canvas.draw_image(
                        Rect::new(-mark.width / 2.0, -mark.height / 2.0, mark.width, mark.height),
                        mark.image.src.as_str(),
                        false,
                    );
                }
            }
            canvas.restore_state();
            tx += step_x;
        }
        ty += step_y;
    }
    canvas.restore_state();
}

fn draw_author_bar<M: TextMeasurer + ?Sized>(
    canvas: &mut Canvas,
    bar: &AuthorBar,
    info: &AuthorInfo,
    measurer: &M,
    family: &str,
) {
    let rect = bar.rect;
    canvas.save_state();
    canvas.set_stroke_color(Color::from_hex_or(BORDER, Color::BLACK));
    canvas.set_line_width(1.0);
    let edge = match bar.position {
        AuthorPosition::Bottom => rect.y + 0.5,
        AuthorPosition::Top => rect.bottom() - 0.5,
    };
    canvas.stroke_line(rect.x, edge, rect.right(), edge);

    let name = info.name.as_deref().map(str::trim).filter(|v| !v.is_empty());
    let remark = info.remark.as_deref().map(str::trim).filter(|v| !v.is_empty());
    let avatar = info.avatar.as_deref().map(str::trim).filter(|v| !v.is_empty());

    let name_width = name
        .map(|n| measurer.text_width(family, AUTHOR_NAME_SIZE, n))
        .unwrap_or(0.0);
    let remark_width = match (name, remark) {
        (Some(_), Some(r)) => measurer.text_width(family, AUTHOR_REMARK_SIZE, r),
        _ => 0.0,
    };
    let text_width = name_width.max(remark_width);
    let avatar_width = if avatar.is_some() { AVATAR_SIZE } else { 0.0 };
    let gap = if avatar.is_some() && name.is_some() {
        AUTHOR_GAP
    } else {
        0.0
    };
    let content_width = avatar_width + gap + text_width;

    let start_x = match info.align {
        AuthorAlign::Left => rect.x + AUTHOR_PADDING,
        AuthorAlign::Center => rect.x + (rect.width - content_width) / 2.0,
        AuthorAlign::Right => rect.right() - AUTHOR_PADDING - content_width,
    };
    let center_y = rect.y + rect.height / 2.0;

    if let Some(src) = avatar {
        canvas.draw_image(
            Rect::new(start_x, center_y - AVATAR_SIZE / 2.0, AVATAR_SIZE, AVATAR_SIZE),
            src,
            true,
        );
    }
    if let Some(name) = name {
        let text_x = start_x + avatar_width + gap;
        canvas.set_fill_color(Color::BLACK);
        canvas.set_font_size(AUTHOR_NAME_SIZE);
        if let Some(remark) = remark {
            canvas.draw_string(text_x, center_y - 4.0, name);
            canvas.set_fill_color(Color::from_hex_or(MUTED_TEXT, Color::BLACK));
            canvas.set_font_size(AUTHOR_REMARK_SIZE);
            canvas.draw_string(text_x, center_y + 14.0, remark);
        } else {
            canvas.draw_string(text_x, center_y + AUTHOR_NAME_SIZE * 0.35, name);
        }
    }
    canvas.restore_state();
}

/// Dashed page-cut markers for the preview. Thickness compensates for the
/// preview zoom so the lines stay two screen pixels wide.
pub fn guide_commands(offsets: &[f32], width: f32, scale: f32) -> Vec<Command> {
    if offsets.is_empty() {
        return Vec::new();
    }
    let thickness = 2.0 / scale.max(f32::EPSILON);
    let mut canvas = Canvas::new(Size::new(width, 0.0));
    canvas.save_state();
    canvas.set_stroke_color(Color::from_hex_or(GUIDE_ACCENT, Color::BLACK));
    canvas.set_opacity(0.7);
    canvas.set_line_width(thickness);
    canvas.set_dash(vec![thickness * 3.0, thickness * 2.0], 0.0);
    for y in offsets {
        canvas.stroke_line(0.0, *y, width, *y);
    }
    canvas.restore_state();
    canvas.finish().commands
}

/// `scene` with split guides drawn over it.
pub fn with_guides(scene: &Scene, guides: Vec<Command>) -> Scene {
    let mut out = scene.clone();
    out.commands.extend(guides);
    out
}
