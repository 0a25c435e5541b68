//! Link state and reentrancy guards.
//!
//! The controller's handlers can trigger each other through collaborator
//! side effects: writing the editor produces a text-changed event, rebuilding
//! the scene produces selection events. Each such write runs with a guard
//! held, and every handler that could be reached from it checks the guard
//! first and returns without side effects.

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;

/// Whether the document and the scene are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// Document is inert text; edits are validated but not mirrored.
    #[default]
    Unlinked,
    /// Full bidirectional mirroring.
    Linked,
}

impl LinkState {
    #[must_use]
    pub fn is_linked(self) -> bool {
        self == Self::Linked
    }
}

/// One reentrancy guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The controller is pushing document text into the editor.
    WritingEditor,
    /// The controller is rebuilding the scene from the document.
    RebuildingScene,
    /// The selection-changed handler is running.
    HandlingSelection,
}

impl Guard {
    fn bit(self) -> u8 {
        match self {
            Self::WritingEditor => 1,
            Self::RebuildingScene => 1 << 1,
            Self::HandlingSelection => 1 << 2,
        }
    }
}

/// Set of currently held guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuardSet {
    bits: u8,
}

impl GuardSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a guard. Returns `false` if it was already held.
    pub fn insert(&mut self, guard: Guard) -> bool {
        let held = self.contains(guard);
        self.bits |= guard.bit();
        !held
    }

    /// Release a guard.
    pub fn remove(&mut self, guard: Guard) {
        self.bits &= !guard.bit();
    }

    #[must_use]
    pub fn contains(&self, guard: Guard) -> bool {
        self.bits & guard.bit() != 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}
