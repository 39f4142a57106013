// Per-player state.
//
// A player is created in the `EnteringName` phase when its session connects
// and becomes `Active` once the registry accepts its name. The name is
// immutable after that; it is released when the player is destroyed on
// disconnect. The chat compose buffer exists only while the player is typing
// a message — movement keys are swallowed by the buffer during that time.

use crate::chat::ChatHistory;
use crate::input::InputBitset;
use crate::spatial::EntityHandle;

/// Name-entry sub-state machine: `EnteringName → Active`, one-way.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerPhase {
    EnteringName {
        buffer: String,
        /// User-visible rejection text from the last failed submit.
        error: Option<String>,
    },
    Active {
        name: String,
    },
}

pub struct Player {
    pub x: f32,
    pub y: f32,
    pub entity: EntityHandle,
    pub input: InputBitset,
    pub phase: PlayerPhase,
    /// `Some` while the player is composing a chat message.
    pub compose: Option<String>,
    pub chat: ChatHistory,
}

impl Player {
    pub fn new(x: f32, y: f32, entity: EntityHandle, chat_history_max: usize) -> Self {
        Self {
            x,
            y,
            entity,
            input: InputBitset::default(),
            phase: PlayerPhase::EnteringName {
                buffer: String::new(),
                error: None,
            },
            compose: None,
            chat: ChatHistory::new(chat_history_max),
        }
    }

    /// The accepted display name, once Active.
    pub fn name(&self) -> Option<&str> {
        match &self.phase {
            PlayerPhase::Active { name } => Some(name),
            PlayerPhase::EnteringName { .. } => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, PlayerPhase::Active { .. })
    }

    /// Whether movement input applies this tick. Typing (name entry or chat
    /// compose) captures the keyboard.
    pub fn can_move(&self) -> bool {
        self.is_active() && self.compose.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_name_entry() {
        let p = Player::new(0.0, 0.0, EntityHandle(1), 5);
        assert!(!p.is_active());
        assert!(!p.can_move());
        assert_eq!(p.name(), None);
    }

    #[test]
    fn active_player_can_move_unless_composing() {
        let mut p = Player::new(0.0, 0.0, EntityHandle(1), 5);
        p.phase = PlayerPhase::Active {
            name: "Alice".into(),
        };
        assert!(p.can_move());
        assert_eq!(p.name(), Some("Alice"));

        p.compose = Some(String::new());
        assert!(!p.can_move());
    }
}
