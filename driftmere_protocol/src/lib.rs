// driftmere_protocol — wire protocol shared by the Driftmere server and client.
//
// This crate defines every byte that crosses the network between the game
// server and its clients. It is shared by both sides and has no dependency on
// the sim or terrain crates.
//
// Module overview:
// - `framing.rs`: Length-delimited framing over any `Read`/`Write` stream:
//                 4-byte big-endian length prefix, then payload. Payloads are
//                 either JSON signaling text or binary frame bytes; the first
//                 byte discriminates (`is_json_payload`).
// - `signal.rs`:  Signaling messages (JOIN/WELCOME/OFFER/ANSWER/CANDIDATE/BYE)
//                 as serde-tagged JSON enums.
// - `frame.rs`:   The binary draw/audio command stream — opcode table,
//                 `FrameBuilder` (server-side encoder), `decode_frame`
//                 (client-side decoder), zlib payload compression.
// - `input.rs`:   2-byte `{key_code, is_down}` input reports, client → server.
//
// Design decisions:
// - **JSON for signaling, binary for frames.** Signaling is rare and benefits
//   from being debuggable; frames are sent every tick to every client and are
//   byte-packed little-endian, then zlib-compressed.
// - **Decoder stops, never errors.** An unknown opcode or a truncated field
//   ends decoding of that frame — frames are ephemeral full redraws, so the
//   safe response to damage is to keep whatever decoded cleanly and move on.
// - **No async runtime.** Uses `std::io::Read`/`Write` for framing, compatible
//   with blocking TCP streams and buffered wrappers.

pub mod frame;
pub mod framing;
pub mod input;
pub mod signal;

pub use frame::{DrawCommand, FrameBuilder, decode_commands, decode_frame};
pub use framing::{MAX_MESSAGE_SIZE, is_json_payload, read_message, write_message};
pub use input::InputReport;
pub use signal::{ClientSignal, ServerSignal};
