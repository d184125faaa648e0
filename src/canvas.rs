use crate::types::{Color, Rect, Size};

/// Drawing commands in CSS pixel space: origin top-left, y grows downwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    Translate(f32, f32),
    /// Degrees, clockwise.
    Rotate(f32),
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(f32),
    SetDash {
        pattern: Vec<f32>,
        phase: f32,
    },
    /// Global alpha for subsequent fills, strokes, text and images.
    SetOpacity(f32),
    SetFontFamily(String),
    SetFontSize(f32),
    ClipRect(Rect),
    FillRect(Rect),
    StrokeLine {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    DrawString {
        x: f32,
        baseline: f32,
        text: String,
    },
    DrawImage {
        rect: Rect,
        /// Data URI or file path.
        source: String,
        /// Mask the image with the largest inscribed circle.
        round: bool,
    },
}

/// A composed preview: one tall page that capture slices into windows.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub size: Size,
    pub transparent: bool,
    pub commands: Vec<Command>,
}

impl Scene {
    pub fn empty(size: Size) -> Self {
        Self {
            size,
            transparent: true,
            commands: Vec::new(),
        }
    }

    pub fn text_runs(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::DrawString { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: f32,
    font_size: f32,
    font_family: String,
    opacity: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: 1.0,
            font_size: 16.0,
            font_family: String::new(),
            opacity: 1.0,
        }
    }
}

/// Records commands for a [`Scene`], skipping redundant state changes.
pub struct Canvas {
    size: Size,
    transparent: bool,
    commands: Vec<Command>,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Canvas {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            transparent: true,
            commands: Vec::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Paints the full scene with `color` and marks it opaque.
    pub fn fill_background(&mut self, color: Color) {
        self.transparent = false;
        self.set_fill_color(color);
        self.fill_rect(Rect::new(0.0, 0.0, self.size.width, self.size.height));
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.commands.push(Command::RestoreState);
        }
    }

    pub fn translate(&mut self, x: f32, y: f32) {
        self.commands.push(Command::Translate(x, y));
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.commands.push(Command::Rotate(degrees));
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: f32) {
        let width = width.max(0.0);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_dash(&mut self, pattern: Vec<f32>, phase: f32) {
        self.commands.push(Command::SetDash { pattern, phase });
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        if self.current_state.opacity == opacity {
            return;
        }
        self.current_state.opacity = opacity;
        self.commands.push(Command::SetOpacity(opacity));
    }

    pub fn set_font_family(&mut self, family: &str) {
        if self.current_state.font_family == family {
            return;
        }
        self.current_state.font_family = family.to_string();
        self.commands
            .push(Command::SetFontFamily(self.current_state.font_family.clone()));
    }

    pub fn set_font_size(&mut self, size: f32) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.commands.push(Command::SetFontSize(size));
    }

    pub fn clip_rect(&mut self, rect: Rect) {
        self.commands.push(Command::ClipRect(rect));
    }

    pub fn fill_rect(&mut self, rect: Rect) {
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return;
        }
        self.commands.push(Command::FillRect(rect));
    }

    pub fn stroke_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.commands.push(Command::StrokeLine { x1, y1, x2, y2 });
    }

    pub fn draw_string(&mut self, x: f32, baseline: f32, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.commands.push(Command::DrawString { x, baseline, text });
    }

    pub fn draw_image(&mut self, rect: Rect, source: impl Into<String>, round: bool) {
        self.commands.push(Command::DrawImage {
            rect,
            source: source.into(),
            round,
        });
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn finish(self) -> Scene {
        Scene {
            size: self.size,
            transparent: self.transparent,
            commands: self.commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundant_state_changes_are_dropped() {
        let mut canvas = Canvas::new(Size::new(100.0, 100.0));
        canvas.set_fill_color(Color::BLACK);
        canvas.set_font_size(16.0);
        canvas.set_font_family("serif");
        canvas.set_font_family("serif");
        canvas.set_opacity(1.0);
        assert_eq!(canvas.command_count(), 1);
    }

    #[test]
    fn restore_brings_back_saved_state() {
        let mut canvas = Canvas::new(Size::new(10.0, 10.0));
        canvas.save_state();
        canvas.set_fill_color(Color::WHITE);
        canvas.restore_state();
        // Back to black, so white is a change again.
        canvas.set_fill_color(Color::WHITE);
        let scene = canvas.finish();
        assert_eq!(
            scene.commands,
            vec![
                Command::SaveState,
                Command::SetFillColor(Color::WHITE),
                Command::RestoreState,
                Command::SetFillColor(Color::WHITE),
            ]
        );
    }

    #[test]
    fn background_makes_scene_opaque() {
        let mut canvas = Canvas::new(Size::new(20.0, 30.0));
        canvas.draw_string(0.0, 10.0, "");
        canvas.fill_rect(Rect::new(0.0, 0.0, 0.0, 5.0));
        assert_eq!(canvas.command_count(), 0);
        canvas.fill_background(Color::WHITE);
        let scene = canvas.finish();
        assert!(!scene.transparent);
        assert!(scene
            .commands
            .contains(&Command::FillRect(Rect::new(0.0, 0.0, 20.0, 30.0))));
    }
}
