// Test-only player client for multiplayer integration tests.
//
// Wraps the real `TransportSession` (from `driftmere_client::transport`) to
// provide a synchronous, test-friendly API for exercising the full pipeline:
// connect → welcome → name entry → input → tick → frame → decoded commands.
//
// The only test-specific code here is the blocking wrappers around the
// session's event channel and the keystroke helpers. All networking uses the
// same code paths as a real client.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use driftmere_client::transport::{
    TransportConfig, TransportEvent, TransportSession, TransportState,
};
use driftmere_protocol::{DrawCommand, InputReport, decode_frame};
use driftmere_sim::input::KEY_ENTER;

/// Default timeout for blocking waits.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A test player wrapping a real transport session.
pub struct TestPlayer {
    session: TransportSession,
    pub session_id: String,
}

impl TestPlayer {
    /// Connect to a running server and wait for the session grant.
    pub fn connect(addr: SocketAddr, use_data_channel: bool) -> Self {
        let config = TransportConfig {
            server_addr: addr.to_string(),
            use_data_channel,
            backoff_base: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            backoff_cap: Duration::from_millis(500),
            negotiation_timeout: Duration::from_secs(2),
        };
        let session = TransportSession::connect(config);
        let start = Instant::now();
        loop {
            assert!(
                start.elapsed() < WAIT_TIMEOUT,
                "timed out waiting for session grant"
            );
            if let Some(TransportEvent::SessionEstablished { session_id }) =
                session.wait_event(Duration::from_millis(100))
            {
                return Self {
                    session,
                    session_id,
                };
            }
        }
    }

    /// Press and release a key.
    pub fn tap(&self, key_code: u8) {
        self.session.send_input(InputReport {
            key_code,
            is_down: true,
        });
        self.session.send_input(InputReport {
            key_code,
            is_down: false,
        });
    }

    pub fn press(&self, key_code: u8) {
        self.session.send_input(InputReport {
            key_code,
            is_down: true,
        });
    }

    pub fn release(&self, key_code: u8) {
        self.session.send_input(InputReport {
            key_code,
            is_down: false,
        });
    }

    /// Type ASCII text as a key tap per character. Letters are sent as their
    /// uppercase key codes, which the server lowercases.
    pub fn type_text(&self, text: &str) {
        for ch in text.chars() {
            let code = ch.to_ascii_uppercase() as u8;
            self.tap(code);
        }
    }

    /// Complete name entry: type the name, then confirm with Enter.
    pub fn enter_name(&self, name: &str) {
        self.type_text(name);
        self.tap(KEY_ENTER);
    }

    /// Block until the next non-empty decoded frame.
    pub fn next_frame(&self) -> Vec<DrawCommand> {
        let start = Instant::now();
        loop {
            assert!(
                start.elapsed() < WAIT_TIMEOUT,
                "timed out waiting for a frame"
            );
            if let Some(TransportEvent::Frame(payload)) =
                self.session.wait_event(Duration::from_millis(100))
            {
                let commands = decode_frame(&payload);
                if !commands.is_empty() {
                    return commands;
                }
            }
        }
    }

    /// Block until a frame arrives whose text commands include `needle`.
    /// Returns that frame.
    pub fn wait_for_text(&self, needle: &str) -> Vec<DrawCommand> {
        let start = Instant::now();
        loop {
            assert!(
                start.elapsed() < WAIT_TIMEOUT,
                "timed out waiting for a frame containing {needle:?}"
            );
            let frame = self.next_frame();
            if frame_texts(&frame).iter().any(|t| t.contains(needle)) {
                return frame;
            }
        }
    }

    /// Block until a frame arrives with no text containing `needle`.
    pub fn wait_for_text_gone(&self, needle: &str) -> Vec<DrawCommand> {
        let start = Instant::now();
        loop {
            assert!(
                start.elapsed() < WAIT_TIMEOUT,
                "timed out waiting for {needle:?} to disappear"
            );
            let frame = self.next_frame();
            if !frame_texts(&frame).iter().any(|t| t.contains(needle)) {
                return frame;
            }
        }
    }

    /// Block until the transport reports the given state.
    pub fn wait_for_state(&self, state: TransportState) {
        let start = Instant::now();
        loop {
            assert!(
                start.elapsed() < WAIT_TIMEOUT,
                "timed out waiting for state {state:?}"
            );
            if self.session.wait_event(Duration::from_millis(100))
                == Some(TransportEvent::StatusChanged(state))
            {
                return;
            }
        }
    }

    /// Send BYE and close the session.
    pub fn disconnect(&mut self) {
        self.session.close();
    }
}

/// All DRAW_TEXT strings in a decoded frame, in draw order.
pub fn frame_texts(commands: &[DrawCommand]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|cmd| match cmd {
            DrawCommand::DrawText { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// All FILL_RECT coordinates in a decoded frame, in draw order.
pub fn frame_rects(commands: &[DrawCommand]) -> Vec<(f32, f32, f32, f32)> {
    commands
        .iter()
        .filter_map(|cmd| match cmd {
            DrawCommand::FillRect { x, y, w, h } => Some((*x, *y, *w, *h)),
            _ => None,
        })
        .collect()
}
