// Copyright (c) 2026 The Keywarden Project

//! Session-scoped authentication cache.
//!
//! Tracks whether the operator has proven possession of the PIN and/or
//! passphrase since the cache was last invalidated. There is exactly one
//! [`Session`] per engine; it is mutated only by the engine's
//! authentication gates and cleared on wipe, PIN change and
//! passphrase-protection toggles.

/// Ephemeral authentication state for the current power cycle
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Session {
    pin_cached: bool,
    passphrase_cached: bool,
}

impl Session {
    pub const fn new() -> Self {
        Self {
            pin_cached: false,
            passphrase_cached: false,
        }
    }

    pub fn is_pin_cached(&self) -> bool {
        self.pin_cached
    }

    pub fn is_passphrase_cached(&self) -> bool {
        self.passphrase_cached
    }

    pub fn cache_pin(&mut self) {
        self.pin_cached = true;
    }

    pub fn cache_passphrase(&mut self) {
        self.passphrase_cached = true;
    }

    pub fn clear_pin(&mut self) {
        self.pin_cached = false;
    }

    pub fn clear_passphrase(&mut self) {
        self.passphrase_cached = false;
    }

    /// Clear cached credentials, optionally retaining the PIN cache
    /// (`Initialize` clears the passphrase only, a wipe clears both).
    pub fn clear(&mut self, clear_pin: bool) {
        self.passphrase_cached = false;
        if clear_pin {
            self.pin_cached = false;
        }
    }
}
