// Frame application: decoded draw commands onto a canvas, audio commands
// into the sound bank.
//
// The client draws nothing of its own — every pixel comes from the server's
// frame stream. `Canvas` is the seam to the actual drawing surface, so the
// core stays backend-free and the tests use a recording double.

use driftmere_protocol::{DrawCommand, decode_frame};

use crate::audio::{SoundBank, SoundLoader};

/// The drawing surface. One implementation per platform backend.
pub trait Canvas {
    fn clear(&mut self, r: u8, g: u8, b: u8);
    fn set_color(&mut self, r: u8, g: u8, b: u8, a: u8);
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32);
    fn set_line_width(&mut self, width: f32);
    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32);
    fn draw_text(&mut self, x: f32, y: f32, text: &str);
}

/// Applies decoded frames to a canvas and a sound bank.
#[derive(Default)]
pub struct Renderer {
    loaded: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once at least one frame has decoded to something. Used to drop
    /// the "connecting" splash.
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// Decode a compressed wire payload and apply it.
    pub fn render_payload(
        &mut self,
        payload: &[u8],
        canvas: &mut dyn Canvas,
        bank: &mut SoundBank,
        loader: &mut dyn SoundLoader,
    ) {
        let commands = decode_frame(payload);
        self.render(&commands, canvas, bank, loader);
    }

    /// Apply a decoded command list. Frames are full redraws, so the list is
    /// replayed in order with no retained state beyond audio.
    pub fn render(
        &mut self,
        commands: &[DrawCommand],
        canvas: &mut dyn Canvas,
        bank: &mut SoundBank,
        loader: &mut dyn SoundLoader,
    ) {
        if !commands.is_empty() {
            self.loaded = true;
        }
        for cmd in commands {
            match cmd {
                DrawCommand::Clear { r, g, b } => canvas.clear(*r, *g, *b),
                DrawCommand::SetColor { r, g, b, a } => canvas.set_color(*r, *g, *b, *a),
                DrawCommand::FillRect { x, y, w, h } => canvas.fill_rect(*x, *y, *w, *h),
                DrawCommand::DrawLine {
                    x1,
                    y1,
                    x2,
                    y2,
                    width,
                } => {
                    // Line width is scoped to the one stroke.
                    canvas.set_line_width(*width);
                    canvas.draw_line(*x1, *y1, *x2, *y2);
                    canvas.set_line_width(1.0);
                }
                DrawCommand::DrawText { x, y, text } => canvas.draw_text(*x, *y, text),
                DrawCommand::LoadSound { .. }
                | DrawCommand::PlaySound { .. }
                | DrawCommand::StopSound { .. }
                | DrawCommand::SetVolume { .. } => bank.apply(cmd, loader),
            }
        }
    }
}

/// Canvas double that records every call, for asserting draw order.
#[derive(Default)]
pub struct RecordingCanvas {
    pub ops: Vec<CanvasOp>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CanvasOp {
    Clear(u8, u8, u8),
    SetColor(u8, u8, u8, u8),
    FillRect(f32, f32, f32, f32),
    SetLineWidth(f32),
    DrawLine(f32, f32, f32, f32),
    DrawText(f32, f32, String),
}

impl Canvas for RecordingCanvas {
    fn clear(&mut self, r: u8, g: u8, b: u8) {
        self.ops.push(CanvasOp::Clear(r, g, b));
    }

    fn set_color(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.ops.push(CanvasOp::SetColor(r, g, b, a));
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.ops.push(CanvasOp::FillRect(x, y, w, h));
    }

    fn set_line_width(&mut self, width: f32) {
        self.ops.push(CanvasOp::SetLineWidth(width));
    }

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.ops.push(CanvasOp::DrawLine(x1, y1, x2, y2));
    }

    fn draw_text(&mut self, x: f32, y: f32, text: &str) {
        self.ops.push(CanvasOp::DrawText(x, y, text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use driftmere_protocol::FrameBuilder;

    use super::*;
    use crate::audio::DecodedSound;

    #[derive(Default)]
    struct NullLoader {
        requested: Vec<String>,
    }

    impl SoundLoader for NullLoader {
        fn request(&mut self, name: &str, _url: &str) {
            self.requested.push(name.to_string());
        }

        fn poll(&mut self) -> Vec<(String, Result<DecodedSound, String>)> {
            Vec::new()
        }
    }

    #[test]
    fn draw_commands_replay_in_order() {
        let mut fb = FrameBuilder::new();
        fb.clear(0, 0, 0);
        fb.set_color(255, 0, 0, 255);
        fb.fill_rect(10.0, 20.0, 16.0, 16.0);
        fb.draw_text(10.0, 10.0, "ada");

        let mut renderer = Renderer::new();
        let mut canvas = RecordingCanvas::default();
        let mut bank = SoundBank::new();
        let mut loader = NullLoader::default();
        renderer.render_payload(
            &fb.finish().unwrap(),
            &mut canvas,
            &mut bank,
            &mut loader,
        );

        assert_eq!(
            canvas.ops,
            vec![
                CanvasOp::Clear(0, 0, 0),
                CanvasOp::SetColor(255, 0, 0, 255),
                CanvasOp::FillRect(10.0, 20.0, 16.0, 16.0),
                CanvasOp::DrawText(10.0, 10.0, "ada".into()),
            ]
        );
    }

    #[test]
    fn line_width_is_restored_after_each_stroke() {
        let mut fb = FrameBuilder::new();
        fb.draw_line(0.0, 0.0, 10.0, 10.0, 3.0);

        let mut renderer = Renderer::new();
        let mut canvas = RecordingCanvas::default();
        let mut bank = SoundBank::new();
        let mut loader = NullLoader::default();
        renderer.render(
            &decode_frame(&fb.finish().unwrap()),
            &mut canvas,
            &mut bank,
            &mut loader,
        );

        assert_eq!(
            canvas.ops,
            vec![
                CanvasOp::SetLineWidth(3.0),
                CanvasOp::DrawLine(0.0, 0.0, 10.0, 10.0),
                CanvasOp::SetLineWidth(1.0),
            ]
        );
    }

    #[test]
    fn audio_commands_route_to_the_bank_not_the_canvas() {
        let mut fb = FrameBuilder::new();
        fb.load_sound("surf", "assets/surf.ogg");
        fb.play_sound("surf", true, 0.0);

        let mut renderer = Renderer::new();
        let mut canvas = RecordingCanvas::default();
        let mut bank = SoundBank::new();
        let mut loader = NullLoader::default();
        renderer.render_payload(
            &fb.finish().unwrap(),
            &mut canvas,
            &mut bank,
            &mut loader,
        );

        assert!(canvas.ops.is_empty());
        assert_eq!(loader.requested, vec!["surf".to_string()]);
    }

    #[test]
    fn loaded_flips_on_the_first_non_empty_frame() {
        let mut renderer = Renderer::new();
        let mut canvas = RecordingCanvas::default();
        let mut bank = SoundBank::new();
        let mut loader = NullLoader::default();

        let empty = FrameBuilder::new().finish().unwrap();
        renderer.render_payload(&empty, &mut canvas, &mut bank, &mut loader);
        assert!(!renderer.loaded());

        let mut fb = FrameBuilder::new();
        fb.clear(1, 2, 3);
        renderer.render_payload(&fb.finish().unwrap(), &mut canvas, &mut bank, &mut loader);
        assert!(renderer.loaded());
    }
}
