// driftmere_client — everything a Driftmere client needs short of a window.
//
// The client is thin by design: the server simulates the world and renders
// each player's view into a compact command stream; the client connects,
// forwards raw key input, and replays the commands onto a canvas. Platform
// backends supply the actual surface and audio device behind the `Canvas`
// and `SoundLoader` traits.
//
// Module overview:
// - `transport.rs`: dual-transport session (TCP signaling + negotiated UDP
//                   data channel), automatic reconnection with resumption.
// - `backoff.rs`:   the capped exponential retry schedule.
// - `render.rs`:    decoded frame -> canvas, with a recording test double.
// - `audio.rs`:     sound loading, playback instances, volume ramps.

pub mod audio;
pub mod backoff;
pub mod render;
pub mod transport;

pub use audio::{DecodedSound, SoundBank, SoundLoader, ThreadedLoader};
pub use backoff::Backoff;
pub use render::{Canvas, CanvasOp, RecordingCanvas, Renderer};
pub use transport::{
    TransportConfig, TransportEvent, TransportSession, TransportState,
};
