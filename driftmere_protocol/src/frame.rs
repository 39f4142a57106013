// Binary draw/audio command stream — the per-tick frame payload.
//
// A frame is a flat sequence of variable-length commands, each starting with
// a one-byte opcode, all multi-byte numerics little-endian. The server builds
// the stream with `FrameBuilder` and compresses it with zlib on `finish()`;
// the client decompresses and decodes with `decode_frame`.
//
// Decoding is strictly sequential and tolerant: an unrecognized opcode, a
// truncated field, or a string length that would read past the buffer all
// terminate decoding at that point, returning every command that decoded
// cleanly before it. Frames are ephemeral full redraws, so there is nothing
// to retry — the next frame replaces this one entirely. This also leaves
// room for protocol extension: an old client simply stops at the first new
// opcode. (The flip side: a genuinely truncated frame is indistinguishable
// from an extension boundary; see the stop-point debug log.)

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Fill the viewport with an opaque color: `r,g,b` (u8 × 3).
pub const OP_CLEAR: u8 = 1;
/// Set the current fill/stroke color: `r,g,b,a` (u8 × 4), alpha/255.
pub const OP_SET_COLOR: u8 = 2;
/// Filled rectangle in the current color: `x,y,w,h` (f32 × 4).
pub const OP_FILL_RECT: u8 = 3;
/// Stroked line: `x1,y1,x2,y2,width` (f32 × 5). Width restores to 1 after.
pub const OP_DRAW_LINE: u8 = 4;
/// Text at baseline-middle: `x,y` (f32 × 2), `len` (u16), UTF-8 bytes.
pub const OP_DRAW_TEXT: u8 = 5;
/// Idempotent async fetch+decode, keyed by name: two `(u16, bytes)` strings.
pub const OP_LOAD_SOUND: u8 = 6;
/// Start playback: name string, `loop` (u8), `volume` (f32).
pub const OP_PLAY_SOUND: u8 = 7;
/// Fade the named source to silence, then stop: name string.
pub const OP_STOP_SOUND: u8 = 8;
/// Ramp the named source's volume toward a target: name string, `volume` (f32).
pub const OP_SET_VOLUME: u8 = 9;

/// Cap on the decompressed size of a single frame. A malicious or corrupt
/// zlib stream must not be able to allocate unboundedly.
const MAX_RAW_FRAME_SIZE: u64 = 4 * 1024 * 1024;

/// A single decoded draw/audio command.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Clear {
        r: u8,
        g: u8,
        b: u8,
    },
    SetColor {
        r: u8,
        g: u8,
        b: u8,
        a: u8,
    },
    FillRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    },
    DrawLine {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
    },
    DrawText {
        x: f32,
        y: f32,
        text: String,
    },
    LoadSound {
        name: String,
        url: String,
    },
    PlaySound {
        name: String,
        looped: bool,
        volume: f32,
    },
    StopSound {
        name: String,
    },
    SetVolume {
        name: String,
        volume: f32,
    },
}

/// Server-side frame encoder. Commands are appended in draw order; `finish()`
/// zlib-compresses the stream into the wire payload.
#[derive(Default)]
pub struct FrameBuilder {
    buf: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self, r: u8, g: u8, b: u8) {
        self.buf.push(OP_CLEAR);
        self.buf.extend_from_slice(&[r, g, b]);
    }

    pub fn set_color(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.buf.push(OP_SET_COLOR);
        self.buf.extend_from_slice(&[r, g, b, a]);
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.buf.push(OP_FILL_RECT);
        self.push_f32(x);
        self.push_f32(y);
        self.push_f32(w);
        self.push_f32(h);
    }

    pub fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width: f32) {
        self.buf.push(OP_DRAW_LINE);
        self.push_f32(x1);
        self.push_f32(y1);
        self.push_f32(x2);
        self.push_f32(y2);
        self.push_f32(width);
    }

    pub fn draw_text(&mut self, x: f32, y: f32, text: &str) {
        self.buf.push(OP_DRAW_TEXT);
        self.push_f32(x);
        self.push_f32(y);
        self.push_str(text);
    }

    pub fn load_sound(&mut self, name: &str, url: &str) {
        self.buf.push(OP_LOAD_SOUND);
        self.push_str(name);
        self.push_str(url);
    }

    pub fn play_sound(&mut self, name: &str, looped: bool, volume: f32) {
        self.buf.push(OP_PLAY_SOUND);
        self.push_str(name);
        self.buf.push(u8::from(looped));
        self.push_f32(volume);
    }

    pub fn stop_sound(&mut self, name: &str) {
        self.buf.push(OP_STOP_SOUND);
        self.push_str(name);
    }

    pub fn set_volume(&mut self, name: &str, volume: f32) {
        self.buf.push(OP_SET_VOLUME);
        self.push_str(name);
        self.push_f32(volume);
    }

    /// Number of encoded bytes so far (uncompressed).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Compress the command stream into the wire payload.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.buf)?;
        encoder.finish()
    }

    /// The raw uncompressed command stream. Used by tests and by transports
    /// that compress elsewhere.
    pub fn into_raw(self) -> Vec<u8> {
        self.buf
    }

    fn push_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// u16 byte length + UTF-8 bytes. Strings longer than `u16::MAX` bytes
    /// are truncated at a char boundary before encoding.
    fn push_str(&mut self, s: &str) {
        let mut end = s.len().min(u16::MAX as usize);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let bytes = &s.as_bytes()[..end];
        #[expect(clippy::cast_possible_truncation)]
        let len = bytes.len() as u16;
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(bytes);
    }
}

/// Decompress and decode a wire frame payload.
///
/// A payload that fails to decompress yields an empty command list (protocol
/// fault — the frame is discarded). Decoding of the decompressed stream stops
/// at the first unrecognized opcode or truncated field.
pub fn decode_frame(payload: &[u8]) -> Vec<DrawCommand> {
    match decompress(payload) {
        Ok(raw) => decode_commands(&raw),
        Err(e) => {
            log::debug!("discarding undecodable frame payload: {e}");
            Vec::new()
        }
    }
}

/// Decode an uncompressed command stream. Consumes commands sequentially
/// until the buffer is exhausted or a fault stops decoding.
pub fn decode_commands(raw: &[u8]) -> Vec<DrawCommand> {
    let mut r = ByteReader { buf: raw, pos: 0 };
    let mut commands = Vec::new();

    while let Some(op) = r.u8() {
        let cmd = match op {
            OP_CLEAR => decode_clear(&mut r),
            OP_SET_COLOR => decode_set_color(&mut r),
            OP_FILL_RECT => decode_fill_rect(&mut r),
            OP_DRAW_LINE => decode_draw_line(&mut r),
            OP_DRAW_TEXT => decode_draw_text(&mut r),
            OP_LOAD_SOUND => decode_load_sound(&mut r),
            OP_PLAY_SOUND => decode_play_sound(&mut r),
            OP_STOP_SOUND => decode_stop_sound(&mut r),
            OP_SET_VOLUME => decode_set_volume(&mut r),
            other => {
                // Unknown opcode: end of stream as far as this client is
                // concerned. Indistinguishable from truncation by design.
                log::debug!("unknown opcode {other} at byte {}, stopping", r.pos - 1);
                None
            }
        };
        match cmd {
            Some(cmd) => commands.push(cmd),
            None => break,
        }
    }
    commands
}

fn decode_clear(r: &mut ByteReader<'_>) -> Option<DrawCommand> {
    Some(DrawCommand::Clear {
        r: r.u8()?,
        g: r.u8()?,
        b: r.u8()?,
    })
}

fn decode_set_color(r: &mut ByteReader<'_>) -> Option<DrawCommand> {
    Some(DrawCommand::SetColor {
        r: r.u8()?,
        g: r.u8()?,
        b: r.u8()?,
        a: r.u8()?,
    })
}

fn decode_fill_rect(r: &mut ByteReader<'_>) -> Option<DrawCommand> {
    Some(DrawCommand::FillRect {
        x: r.f32()?,
        y: r.f32()?,
        w: r.f32()?,
        h: r.f32()?,
    })
}

fn decode_draw_line(r: &mut ByteReader<'_>) -> Option<DrawCommand> {
    Some(DrawCommand::DrawLine {
        x1: r.f32()?,
        y1: r.f32()?,
        x2: r.f32()?,
        y2: r.f32()?,
        width: r.f32()?,
    })
}

fn decode_draw_text(r: &mut ByteReader<'_>) -> Option<DrawCommand> {
    Some(DrawCommand::DrawText {
        x: r.f32()?,
        y: r.f32()?,
        text: r.string()?,
    })
}

fn decode_load_sound(r: &mut ByteReader<'_>) -> Option<DrawCommand> {
    Some(DrawCommand::LoadSound {
        name: r.string()?,
        url: r.string()?,
    })
}

fn decode_play_sound(r: &mut ByteReader<'_>) -> Option<DrawCommand> {
    Some(DrawCommand::PlaySound {
        name: r.string()?,
        looped: r.u8()? != 0,
        volume: r.f32()?,
    })
}

fn decode_stop_sound(r: &mut ByteReader<'_>) -> Option<DrawCommand> {
    Some(DrawCommand::StopSound { name: r.string()? })
}

fn decode_set_volume(r: &mut ByteReader<'_>) -> Option<DrawCommand> {
    Some(DrawCommand::SetVolume {
        name: r.string()?,
        volume: r.f32()?,
    })
}

/// Bounds-checked sequential reader. Every accessor returns `None` instead
/// of advancing past the declared buffer length.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl ByteReader<'_> {
    fn u8(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn u16(&mut self) -> Option<u16> {
        let bytes = self.buf.get(self.pos..self.pos + 2)?;
        self.pos += 2;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn f32(&mut self) -> Option<f32> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// u16 length-prefixed UTF-8 string. A length that would read out of
    /// bounds, or invalid UTF-8, is a fault (`None`).
    fn string(&mut self) -> Option<String> {
        let len = self.u16()? as usize;
        let bytes = self.buf.get(self.pos..self.pos + len)?;
        self.pos += len;
        String::from_utf8(bytes.to_vec()).ok()
    }
}

fn decompress(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(payload);
    let mut raw = Vec::new();
    // +1 so an at-limit stream is distinguishable from an over-limit one.
    decoder
        .by_ref()
        .take(MAX_RAW_FRAME_SIZE + 1)
        .read_to_end(&mut raw)?;
    if raw.len() as u64 > MAX_RAW_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "decompressed frame exceeds size cap",
        ));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build one of every command, in table order.
    fn full_frame() -> (FrameBuilder, Vec<DrawCommand>) {
        let mut fb = FrameBuilder::new();
        fb.clear(10, 20, 30);
        fb.set_color(255, 128, 0, 200);
        fb.fill_rect(1.5, -2.5, 32.0, 32.0);
        fb.draw_line(0.0, 0.0, 100.0, 50.0, 3.0);
        fb.draw_text(12.0, 24.0, "hello, mere");
        fb.load_sound("surf", "assets/surf.ogg");
        fb.play_sound("surf", true, 0.25);
        fb.stop_sound("footsteps");
        fb.set_volume("surf", 0.9);

        let expected = vec![
            DrawCommand::Clear { r: 10, g: 20, b: 30 },
            DrawCommand::SetColor {
                r: 255,
                g: 128,
                b: 0,
                a: 200,
            },
            DrawCommand::FillRect {
                x: 1.5,
                y: -2.5,
                w: 32.0,
                h: 32.0,
            },
            DrawCommand::DrawLine {
                x1: 0.0,
                y1: 0.0,
                x2: 100.0,
                y2: 50.0,
                width: 3.0,
            },
            DrawCommand::DrawText {
                x: 12.0,
                y: 24.0,
                text: "hello, mere".into(),
            },
            DrawCommand::LoadSound {
                name: "surf".into(),
                url: "assets/surf.ogg".into(),
            },
            DrawCommand::PlaySound {
                name: "surf".into(),
                looped: true,
                volume: 0.25,
            },
            DrawCommand::StopSound {
                name: "footsteps".into(),
            },
            DrawCommand::SetVolume {
                name: "surf".into(),
                volume: 0.9,
            },
        ];
        (fb, expected)
    }

    #[test]
    fn roundtrip_all_opcodes_raw() {
        let (fb, expected) = full_frame();
        let raw = fb.into_raw();
        assert_eq!(decode_commands(&raw), expected);
    }

    #[test]
    fn roundtrip_all_opcodes_compressed() {
        let (fb, expected) = full_frame();
        let payload = fb.finish().unwrap();
        assert_eq!(decode_frame(&payload), expected);
    }

    #[test]
    fn compression_shrinks_repetitive_frames() {
        let mut fb = FrameBuilder::new();
        for i in 0..200 {
            fb.fill_rect(i as f32, 0.0, 16.0, 16.0);
        }
        let raw_len = fb.len();
        let payload = fb.finish().unwrap();
        assert!(payload.len() < raw_len, "{} !< {raw_len}", payload.len());
    }

    #[test]
    fn unknown_opcode_stops_decoding() {
        let mut fb = FrameBuilder::new();
        fb.clear(1, 2, 3);
        let mut raw = fb.into_raw();
        raw.push(0xEE); // not a known opcode
        raw.push(OP_CLEAR); // a valid command after the unknown one is lost
        raw.extend_from_slice(&[9, 9, 9]);

        let cmds = decode_commands(&raw);
        assert_eq!(cmds, vec![DrawCommand::Clear { r: 1, g: 2, b: 3 }]);
    }

    #[test]
    fn truncation_mid_command_keeps_prior_commands() {
        let (fb, expected) = full_frame();
        let raw = fb.into_raw();
        // Chop at every possible length; decoding must never panic and must
        // yield a prefix of the full command list.
        for cut in 0..raw.len() {
            let cmds = decode_commands(&raw[..cut]);
            assert!(cmds.len() <= expected.len());
            assert_eq!(cmds[..], expected[..cmds.len()]);
        }
    }

    #[test]
    fn overlong_string_length_is_end_of_stream() {
        let mut raw = vec![OP_DRAW_TEXT];
        raw.extend_from_slice(&1.0f32.to_le_bytes());
        raw.extend_from_slice(&2.0f32.to_le_bytes());
        raw.extend_from_slice(&500u16.to_le_bytes()); // claims 500 bytes
        raw.extend_from_slice(b"short"); // delivers 5
        assert!(decode_commands(&raw).is_empty());
    }

    #[test]
    fn invalid_utf8_is_end_of_stream() {
        let mut raw = vec![OP_STOP_SOUND];
        raw.extend_from_slice(&2u16.to_le_bytes());
        raw.extend_from_slice(&[0xFF, 0xFE]);
        assert!(decode_commands(&raw).is_empty());
    }

    #[test]
    fn garbage_payload_decodes_to_nothing() {
        // Not a zlib stream at all.
        assert!(decode_frame(&[1, 2, 3, 4, 5]).is_empty());
        assert!(decode_frame(&[]).is_empty());
    }

    #[test]
    fn empty_frame_roundtrips() {
        let payload = FrameBuilder::new().finish().unwrap();
        assert!(decode_frame(&payload).is_empty());
    }

    #[test]
    fn non_ascii_text_roundtrips() {
        let mut fb = FrameBuilder::new();
        fb.draw_text(0.0, 0.0, "tidevatn — 潮");
        let cmds = decode_frame(&fb.finish().unwrap());
        assert_eq!(
            cmds,
            vec![DrawCommand::DrawText {
                x: 0.0,
                y: 0.0,
                text: "tidevatn — 潮".into(),
            }]
        );
    }
}
