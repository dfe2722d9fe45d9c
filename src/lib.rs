// Copyright (c) 2026 The Keywarden Project

//! Keywarden hardware key custodian core
//!
//! This provides a common [Engine][engine] implementing the command-processing
//! state machine of a hardware key custodian device: PIN and passphrase
//! session gating, operator confirmation, policy management, device
//! initialization (load / reset / recovery) and the CipherKeyValue
//! symmetric-key operation.
//!
//! Interactions with the [Engine][engine] are performed via
//! [Event][engine::Event]s and [Output][engine::Output]s; wire framing and
//! message serialization are the transport layer's concern and are not
//! handled here.
//!
//! Platform capabilities (HD key derivation, mnemonic encoding and checksum
//! validation, the confirmation display, PIN and passphrase entry) are
//! provided through the [Driver][engine::Driver] trait, and durable storage
//! through the [Persist][storage::Persist] trait, so the engine itself stays
//! hardware-independent and testable on the host.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod coins;
pub mod engine;
pub mod policy;
pub mod session;
pub mod storage;

use heapless::String;

/// Copy `s` into a fixed-capacity string, truncating on a character
/// boundary when it does not fit.
pub(crate) fn truncated<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
