// Signaling messages exchanged as JSON text over the reliable channel.
//
// Two enums define the signaling vocabulary:
// - `ClientSignal`: sent by clients — join/resume a session, negotiate the
//   unreliable data channel, leave gracefully.
// - `ServerSignal`: sent by the server — session grant, negotiation answers.
//
// Wire names are UPPERCASE via serde's `tag`/`rename` so a captured message
// reads `{"type":"WELCOME","session_id":...,"server_instance_id":...}`.
//
// Negotiation carries opaque `sdp`/`candidate` strings. The server never
// interprets them beyond relaying what it needs for its own data socket —
// the transport implementation on each side decides what to put in them.

use serde::{Deserialize, Serialize};

/// Messages sent by a client over the signaling channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientSignal {
    /// Join a session. `session_id` carries the resumption token from a
    /// previous connection, if any; the server may honor or ignore it.
    #[serde(rename = "JOIN")]
    Join { session_id: Option<String> },
    /// Data-channel negotiation offer.
    #[serde(rename = "OFFER")]
    Offer { sdp: String },
    /// Data-channel negotiation answer (unused by the bundled server, which
    /// always answers; kept so either side may offer).
    #[serde(rename = "ANSWER")]
    Answer { sdp: String },
    /// A transport candidate for the data channel.
    #[serde(rename = "CANDIDATE")]
    Candidate {
        candidate: String,
        sdp_mid: String,
        sdp_mline_index: u32,
    },
    /// Client is leaving gracefully.
    #[serde(rename = "BYE")]
    Bye,
}

/// Messages sent by the server over the signaling channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerSignal {
    /// Session granted. `server_instance_id` identifies the running server
    /// process; a client that observes it change across reconnects must
    /// treat the deployment as replaced and fully reload.
    #[serde(rename = "WELCOME")]
    Welcome {
        session_id: String,
        server_instance_id: String,
    },
    /// Data-channel negotiation answer.
    #[serde(rename = "ANSWER")]
    Answer { sdp: String },
    /// A transport candidate for the data channel.
    #[serde(rename = "CANDIDATE")]
    Candidate {
        candidate: String,
        sdp_mid: String,
        sdp_mline_index: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_roundtrip(msg: &ClientSignal) {
        let json = serde_json::to_string(msg).unwrap();
        let recovered: ClientSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(&recovered, msg);
    }

    fn server_roundtrip(msg: &ServerSignal) {
        let json = serde_json::to_string(msg).unwrap();
        let recovered: ServerSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(&recovered, msg);
    }

    #[test]
    fn roundtrip_join_fresh() {
        client_roundtrip(&ClientSignal::Join { session_id: None });
    }

    #[test]
    fn roundtrip_join_resume() {
        client_roundtrip(&ClientSignal::Join {
            session_id: Some("a1b2c3d4".into()),
        });
    }

    #[test]
    fn roundtrip_offer() {
        client_roundtrip(&ClientSignal::Offer {
            sdp: "udp:49152".into(),
        });
    }

    #[test]
    fn roundtrip_candidate() {
        client_roundtrip(&ClientSignal::Candidate {
            candidate: "127.0.0.1:49152".into(),
            sdp_mid: "data".into(),
            sdp_mline_index: 0,
        });
    }

    #[test]
    fn roundtrip_bye() {
        client_roundtrip(&ClientSignal::Bye);
    }

    #[test]
    fn roundtrip_welcome() {
        server_roundtrip(&ServerSignal::Welcome {
            session_id: "deadbeef01".into(),
            server_instance_id: "cafebabe02".into(),
        });
    }

    #[test]
    fn roundtrip_answer() {
        server_roundtrip(&ServerSignal::Answer {
            sdp: "udp:7879".into(),
        });
    }

    #[test]
    fn wire_type_tags_are_uppercase() {
        let json = serde_json::to_string(&ClientSignal::Join { session_id: None }).unwrap();
        assert!(json.contains(r#""type":"JOIN""#), "got {json}");
        let json = serde_json::to_string(&ServerSignal::Welcome {
            session_id: "s".into(),
            server_instance_id: "i".into(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"WELCOME""#), "got {json}");
    }
}
