// Client → server input reports.
//
// The entire upstream game traffic is 2-byte reports: `{key_code, is_down}`.
// They ride the data channel as bare datagrams when it is open, or the
// signaling channel as framed binary payloads otherwise. The server treats
// both paths identically.

/// Length in bytes of an encoded input report.
pub const INPUT_REPORT_LEN: usize = 2;

/// A single key state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputReport {
    pub key_code: u8,
    pub is_down: bool,
}

impl InputReport {
    pub fn encode(self) -> [u8; INPUT_REPORT_LEN] {
        [self.key_code, u8::from(self.is_down)]
    }

    /// Decode a report. Returns `None` unless `bytes` is exactly two bytes —
    /// a stray datagram of any other shape is not an input report.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [key_code, is_down] => Some(Self {
                key_code: *key_code,
                is_down: *is_down != 0,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let report = InputReport {
            key_code: 37,
            is_down: true,
        };
        assert_eq!(InputReport::decode(&report.encode()), Some(report));

        let report = InputReport {
            key_code: 87,
            is_down: false,
        };
        assert_eq!(InputReport::decode(&report.encode()), Some(report));
    }

    #[test]
    fn nonzero_is_down_decodes_true() {
        assert_eq!(
            InputReport::decode(&[65, 7]),
            Some(InputReport {
                key_code: 65,
                is_down: true,
            })
        );
    }

    #[test]
    fn wrong_length_rejected() {
        assert_eq!(InputReport::decode(&[]), None);
        assert_eq!(InputReport::decode(&[37]), None);
        assert_eq!(InputReport::decode(&[37, 1, 0]), None);
    }
}
