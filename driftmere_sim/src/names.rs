// Display-name registry.
//
// Names are unique case-insensitively across all currently-assigned players,
// claimed once when a player finishes name entry and released on disconnect.
// Validation lives here too, so every caller gets the same rules and the
// same user-visible error text.

use std::collections::BTreeSet;
use std::fmt;

/// Why a name claim was rejected. The `Display` text is shown to the player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameError {
    Empty,
    TooLong { max: usize },
    Taken,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameError::Empty => write!(f, "name cannot be empty"),
            NameError::TooLong { max } => write!(f, "name is too long (max {max})"),
            NameError::Taken => write!(f, "that name is taken"),
        }
    }
}

/// The set of currently-assigned names, keyed by lowercase form.
#[derive(Debug, Default)]
pub struct NameRegistry {
    taken: BTreeSet<String>,
    max_len: usize,
}

impl NameRegistry {
    pub fn new(max_len: usize) -> Self {
        Self {
            taken: BTreeSet::new(),
            max_len,
        }
    }

    /// Validate and claim a name. The trimmed name is returned on success and
    /// is unavailable to others until released.
    pub fn claim(&mut self, name: &str) -> Result<String, NameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.chars().count() > self.max_len {
            return Err(NameError::TooLong { max: self.max_len });
        }
        let key = name.to_lowercase();
        if self.taken.contains(&key) {
            return Err(NameError::Taken);
        }
        self.taken.insert(key);
        Ok(name.to_string())
    }

    /// Release a previously-claimed name back to the pool.
    pub fn release(&mut self, name: &str) {
        self.taken.remove(&name.trim().to_lowercase());
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(&name.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }
}
