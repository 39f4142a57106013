// Length-delimited message framing over the signaling (TCP) channel.
//
// A simple wire format: a 4-byte big-endian length prefix followed by the
// payload bytes. The payload is either a JSON signaling message or a binary
// frame/input payload; `is_json_payload` discriminates by the first byte.
// Zlib streams begin with 0x78 and input reports with a key code, so `{`
// unambiguously marks JSON.
//
// A `MAX_MESSAGE_SIZE` constant (1 MB) protects against unbounded allocation
// from malformed or malicious length prefixes. Rendered frames are the
// largest expected payloads and compress to a few KB.

use std::io::{self, Read, Write};

/// Maximum allowed message size (1 MB). Protects against unbounded allocation
/// from malformed length prefixes. A compressed frame for a full viewport is
/// a few KB; 1 MB is generous headroom.
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Returns `true` if a framed payload is a JSON signaling message rather than
/// binary frame/input bytes.
pub fn is_json_payload(payload: &[u8]) -> bool {
    payload.first() == Some(&b'{')
}

/// Write one framed message and flush, so buffered write halves deliver
/// signals promptly.
pub fn write_message<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    if msg.len() > MAX_MESSAGE_SIZE as usize {
        return Err(oversize(io::ErrorKind::InvalidInput, msg.len()));
    }
    #[expect(clippy::cast_possible_truncation)]
    let prefix = (msg.len() as u32).to_be_bytes();
    writer.write_all(&prefix)?;
    writer.write_all(msg)?;
    writer.flush()
}

/// Read one framed message. A clean close before or mid-message surfaces as
/// `UnexpectedEof`; a prefix over `MAX_MESSAGE_SIZE` as `InvalidData` —
/// the allocation never happens.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_MESSAGE_SIZE as usize {
        return Err(oversize(io::ErrorKind::InvalidData, len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

fn oversize(kind: io::ErrorKind, len: usize) -> io::Error {
    io::Error::new(
        kind,
        format!("message of {len} bytes exceeds the {MAX_MESSAGE_SIZE}-byte cap"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_simple_message() {
        let original = b"hello, driftmere!";
        let mut buf = Vec::new();
        write_message(&mut buf, original).unwrap();

        let mut cursor = Cursor::new(&buf);
        let recovered = read_message(&mut cursor).unwrap();
        assert_eq!(recovered, original);
    }

    #[test]
    fn roundtrip_empty_message() {
        let original = b"";
        let mut buf = Vec::new();
        write_message(&mut buf, original).unwrap();

        let mut cursor = Cursor::new(&buf);
        let recovered = read_message(&mut cursor).unwrap();
        assert_eq!(recovered, original.to_vec());
    }

    #[test]
    fn rejects_oversized_write() {
        let big = vec![0u8; MAX_MESSAGE_SIZE as usize + 1];
        let mut buf = Vec::new();
        let err = write_message(&mut buf, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_oversized_read() {
        // Craft a length prefix that exceeds MAX_MESSAGE_SIZE.
        let fake_len = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        let mut cursor = Cursor::new(fake_len.to_vec());
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn read_unexpected_eof() {
        // Only 2 bytes when 4 are needed for the length prefix.
        let mut cursor = Cursor::new(vec![0u8, 1]);
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn multiple_messages_in_sequence() {
        let messages: Vec<&[u8]> = vec![b"first", b"second", b"third"];
        let mut buf = Vec::new();
        for msg in &messages {
            write_message(&mut buf, msg).unwrap();
        }

        let mut cursor = Cursor::new(&buf);
        for expected in &messages {
            let recovered = read_message(&mut cursor).unwrap();
            assert_eq!(recovered, *expected);
        }
    }

    #[test]
    fn json_payload_discrimination() {
        assert!(is_json_payload(br#"{"type":"JOIN"}"#));
        // Zlib streams start with 0x78.
        assert!(!is_json_payload(&[0x78, 0x9c, 0x01]));
        // Input reports start with a key code.
        assert!(!is_json_payload(&[37, 1]));
        assert!(!is_json_payload(&[]));
    }
}
