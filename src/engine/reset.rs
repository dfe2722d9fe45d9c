// Copyright (c) 2026 The Keywarden Project

//! Fresh device generation with two-party entropy mixing.
//!
//! The device contributes 32 bytes of internal RNG entropy, the caller
//! answers the `EntropyRequest` with supplementary entropy, and the final
//! seed entropy is SHA-256 over both. Neither side alone controls the
//! resulting secret.

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::storage::{Label, Language, Pin};
use crate::truncated;

use super::Error;

/// Permitted seed strengths in bits
const STRENGTHS: [u32; 3] = [128, 192, 256];

/// In-flight reset context, created by `ResetDevice` and consumed by
/// `EntropyAck`
#[derive(Clone, Debug)]
pub struct ResetFlow {
    strength: u32,
    pub display_random: bool,
    pub pin_protection: bool,
    pub passphrase_protection: bool,
    pub language: Option<Language>,
    pub label: Option<Label>,
    pub pending_pin: Option<Pin>,
    internal_entropy: [u8; 32],
}

impl ResetFlow {
    pub fn new(
        display_random: bool,
        strength: u32,
        passphrase_protection: bool,
        pin_protection: bool,
        language: Option<&str>,
        label: Option<&str>,
        internal_entropy: [u8; 32],
    ) -> Result<Self, Error> {
        if !STRENGTHS.contains(&strength) {
            return Err(Error::SyntaxError("Invalid seed strength"));
        }

        Ok(Self {
            strength,
            display_random,
            pin_protection,
            passphrase_protection,
            language: language.map(truncated),
            label: label.map(truncated),
            pending_pin: None,
            internal_entropy,
        })
    }

    pub fn internal_entropy(&self) -> &[u8; 32] {
        &self.internal_entropy
    }

    /// Mix caller entropy with the internal entropy, returning the final
    /// seed entropy truncated to the requested strength
    pub fn mix(&self, external: &[u8]) -> ([u8; 32], usize) {
        let mut hasher = Sha256::new();
        hasher.update(self.internal_entropy);
        hasher.update(external);

        (hasher.finalize().into(), self.strength as usize / 8)
    }
}

impl Drop for ResetFlow {
    fn drop(&mut self) {
        self.internal_entropy.zeroize();
    }
}
