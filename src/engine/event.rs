// Copyright (c) 2026 The Keywarden Project

use strum::AsRefStr;

/// [`Engine`][super::Engine] input events, decoded from request messages by
/// the transport layer.
///
/// Optional protobuf-style fields are modeled as `Option`; buffers and
/// strings borrow from the decoded frame for the duration of one dispatch.
#[derive(Clone, Debug, AsRefStr)]
pub enum Event<'a> {
    /// Session start: abort in-flight flows, clear the passphrase cache and
    /// report features
    Initialize,

    /// Fetch device features and state flags
    GetFeatures,

    /// Liveness check, optionally exercising each protection gate
    Ping {
        message: Option<&'a str>,
        button_protection: bool,
        pin_protection: bool,
        passphrase_protection: bool,
    },

    /// Create, change or remove the PIN
    ChangePin {
        remove: bool,
    },

    /// Erase secrets and settings
    WipeDevice,

    /// Bootloader-only operations, always rejected in application mode
    FirmwareErase,
    FirmwareUpload,

    /// Fetch entropy from the hardware RNG
    GetEntropy {
        size: u32,
    },

    /// Import an existing mnemonic or HD node directly
    LoadDevice {
        mnemonic: Option<&'a str>,
        node: Option<&'a [u8; 64]>,
        pin: Option<&'a str>,
        passphrase_protection: bool,
        language: Option<&'a str>,
        label: Option<&'a str>,
        skip_checksum: bool,
    },

    /// Begin fresh generation with two-party entropy mixing
    ResetDevice {
        display_random: bool,
        strength: Option<u32>,
        passphrase_protection: bool,
        pin_protection: bool,
        language: Option<&'a str>,
        label: Option<&'a str>,
    },

    /// Caller-supplied supplementary entropy for an in-flight reset
    EntropyAck {
        entropy: Option<&'a [u8]>,
    },

    /// Abort any in-flight flow
    Cancel,

    /// Update label, language and/or passphrase protection
    ApplySettings {
        label: Option<&'a str>,
        language: Option<&'a str>,
        use_passphrase: Option<bool>,
    },

    /// Encrypt or decrypt a value under a derived, identifier-bound key
    CipherKeyValue {
        key: Option<&'a str>,
        value: Option<&'a [u8]>,
        encrypt: bool,
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
        iv: Option<&'a [u8]>,
        path: &'a [u32],
    },

    /// Begin mnemonic recovery (word dictation or character cipher entry)
    RecoveryDevice {
        use_character_cipher: bool,
        word_count: Option<u32>,
        passphrase_protection: bool,
        pin_protection: bool,
        language: Option<&'a str>,
        label: Option<&'a str>,
        enforce_wordlist: bool,
    },

    /// One dictated word for an in-flight word recovery
    WordAck {
        word: &'a str,
    },

    /// One character, delete, or done for an in-flight cipher recovery
    CharacterAck {
        character: Option<char>,
        delete: bool,
        done: bool,
    },

    /// Toggle optional policies
    ApplyPolicies {
        policies: &'a [PolicyRequest<'a>],
    },

    /// Fetch a chunk of the static coin table
    GetCoinTable {
        start: Option<usize>,
        end: Option<usize>,
    },
}

/// One requested policy toggle, name matched against the closed policy set
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PolicyRequest<'a> {
    pub policy_name: &'a str,
    pub enabled: bool,
}
