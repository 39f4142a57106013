// Key codes, the input bitset, and the key→movement-axis table.
//
// Movement dispatch is pure data: `MOVE_BINDINGS` maps each bound key to the
// axis contribution it makes, and `movement_axes` folds the bitset over that
// table. Arrow keys and WASD are equivalent bindings of the same four axes —
// adding a binding means adding a row, not a branch.
//
// Key codes follow the common keyboard-event numbering the client reports
// (arrows 37–40, letters at their ASCII uppercase values).

pub const KEY_BACKSPACE: u8 = 8;
pub const KEY_ENTER: u8 = 13;
pub const KEY_SPACE: u8 = 32;
pub const KEY_LEFT: u8 = 37;
pub const KEY_UP: u8 = 38;
pub const KEY_RIGHT: u8 = 39;
pub const KEY_DOWN: u8 = 40;
pub const KEY_A: u8 = 65;
pub const KEY_D: u8 = 68;
pub const KEY_S: u8 = 83;
pub const KEY_W: u8 = 87;

/// One row of the movement table: a key and the axis delta it contributes.
pub struct MoveBinding {
    pub key: u8,
    pub dx: f32,
    pub dy: f32,
}

/// Arrows and WASD, bound to the same four axes.
pub const MOVE_BINDINGS: [MoveBinding; 8] = [
    MoveBinding { key: KEY_LEFT, dx: -1.0, dy: 0.0 },
    MoveBinding { key: KEY_A, dx: -1.0, dy: 0.0 },
    MoveBinding { key: KEY_RIGHT, dx: 1.0, dy: 0.0 },
    MoveBinding { key: KEY_D, dx: 1.0, dy: 0.0 },
    MoveBinding { key: KEY_UP, dx: 0.0, dy: -1.0 },
    MoveBinding { key: KEY_W, dx: 0.0, dy: -1.0 },
    MoveBinding { key: KEY_DOWN, dx: 0.0, dy: 1.0 },
    MoveBinding { key: KEY_S, dx: 0.0, dy: 1.0 },
];

/// Per-player pressed-key set, indexed by the 8-bit key code.
#[derive(Clone, Debug, Default)]
pub struct InputBitset {
    words: [u64; 4],
}

impl InputBitset {
    pub fn set(&mut self, key: u8, down: bool) {
        let word = usize::from(key / 64);
        let bit = 1u64 << (key % 64);
        if down {
            self.words[word] |= bit;
        } else {
            self.words[word] &= !bit;
        }
    }

    pub fn is_down(&self, key: u8) -> bool {
        let word = usize::from(key / 64);
        self.words[word] & (1u64 << (key % 64)) != 0
    }

    pub fn clear(&mut self) {
        self.words = [0; 4];
    }
}

/// Fold the bitset over the movement table. Returns the raw (unnormalized)
/// axis sums; opposing keys cancel.
pub fn movement_axes(input: &InputBitset) -> (f32, f32) {
    let mut dx = 0.0;
    let mut dy = 0.0;
    for binding in &MOVE_BINDINGS {
        if input.is_down(binding.key) {
            dx += binding.dx;
            dy += binding.dy;
        }
    }
    // Arrow + WASD held together must not double the speed.
    (dx.clamp(-1.0, 1.0), dy.clamp(-1.0, 1.0))
}

/// Map a key code to the character it types in name/chat entry, if any.
/// Letters produce lowercase; display names keep whatever case policy the
/// registry applies (uniqueness is case-insensitive anyway).
pub fn key_to_char(key: u8) -> Option<char> {
    match key {
        KEY_SPACE => Some(' '),
        b'0'..=b'9' => Some(key as char),
        b'A'..=b'Z' => Some((key + 32) as char),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitset_set_and_clear() {
        let mut input = InputBitset::default();
        assert!(!input.is_down(KEY_LEFT));
        input.set(KEY_LEFT, true);
        assert!(input.is_down(KEY_LEFT));
        input.set(KEY_LEFT, false);
        assert!(!input.is_down(KEY_LEFT));
    }

    #[test]
    fn bitset_covers_full_code_space() {
        let mut input = InputBitset::default();
        input.set(0, true);
        input.set(255, true);
        assert!(input.is_down(0));
        assert!(input.is_down(255));
        input.clear();
        assert!(!input.is_down(0));
        assert!(!input.is_down(255));
    }

    #[test]
    fn arrows_and_wasd_are_equivalent() {
        let mut arrows = InputBitset::default();
        arrows.set(KEY_LEFT, true);
        arrows.set(KEY_UP, true);

        let mut wasd = InputBitset::default();
        wasd.set(KEY_A, true);
        wasd.set(KEY_W, true);

        assert_eq!(movement_axes(&arrows), movement_axes(&wasd));
        assert_eq!(movement_axes(&arrows), (-1.0, -1.0));
    }

    #[test]
    fn opposing_keys_cancel() {
        let mut input = InputBitset::default();
        input.set(KEY_LEFT, true);
        input.set(KEY_RIGHT, true);
        assert_eq!(movement_axes(&input), (0.0, 0.0));
    }

    #[test]
    fn doubled_bindings_do_not_double_speed() {
        let mut input = InputBitset::default();
        input.set(KEY_LEFT, true);
        input.set(KEY_A, true);
        assert_eq!(movement_axes(&input), (-1.0, 0.0));
    }

    #[test]
    fn key_to_char_letters_digits_space() {
        assert_eq!(key_to_char(KEY_A), Some('a'));
        assert_eq!(key_to_char(b'Z'), Some('z'));
        assert_eq!(key_to_char(b'0'), Some('0'));
        assert_eq!(key_to_char(b'9'), Some('9'));
        assert_eq!(key_to_char(KEY_SPACE), Some(' '));
        assert_eq!(key_to_char(KEY_ENTER), None);
        assert_eq!(key_to_char(KEY_LEFT), None);
    }
}
