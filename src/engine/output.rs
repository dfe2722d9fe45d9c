// Copyright (c) 2026 The Keywarden Project

use heapless::{String, Vec};

use crate::coins::CoinInfo;
use crate::policy::{PolicyEntry, POLICY_COUNT};
use crate::storage::{Label, Language};
use crate::truncated;

use super::cipher::CipherValue;

/// Maximum bytes returned by `GetEntropy`
pub const ENTROPY_BUF: usize = 1024;

/// Maximum success message length (Ping echoes caller text)
pub const SUCCESS_MSG_LEN: usize = 256;

/// [`Engine`][super::Engine] outputs, encoded to response messages by the
/// transport layer. Failures travel as [`Error`][super::Error] instead.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    /// Operation completed, with a one-line reason
    Success { message: String<SUCCESS_MSG_LEN> },

    /// Device features and state flags
    Features(Features),

    /// RNG bytes
    Entropy(Vec<u8, ENTROPY_BUF>),

    /// Coin table chunk
    CoinTable {
        chunk_size: usize,
        num_coins: usize,
        table: &'static [CoinInfo],
    },

    /// Transformed CipherKeyValue buffer, same length as the request value
    CipheredKeyValue { value: CipherValue },

    /// Reset flow awaits caller entropy
    EntropyRequest,

    /// Word recovery awaits the next dictated word
    WordRequest,

    /// Character recovery awaits the next character
    CharacterRequest { word_pos: u8, character_pos: u8 },
}

impl Output {
    /// Success response, message truncated to the response buffer
    pub fn success(message: &str) -> Self {
        Output::Success {
            message: truncated(message),
        }
    }
}

/// `GetFeatures` response body
#[derive(Clone, Debug, PartialEq)]
pub struct Features {
    pub vendor: &'static str,
    pub major_version: u8,
    pub minor_version: u8,
    pub patch_version: u8,
    pub device_id: String<24>,
    pub model: String<32>,
    pub firmware_variant: String<32>,
    pub pin_protection: bool,
    pub passphrase_protection: bool,
    pub bootloader_hash: Option<[u8; 32]>,
    pub firmware_hash: Option<[u8; 32]>,
    pub language: Option<Language>,
    pub label: Option<Label>,
    pub initialized: bool,
    pub imported: bool,
    pub pin_cached: bool,
    pub passphrase_cached: bool,
    pub policies: [PolicyEntry; POLICY_COUNT],
}

/// Parse a single decimal version component at compile time
const fn parse_version(s: &str) -> u8 {
    let b = s.as_bytes();
    let mut v = 0u8;
    let mut i = 0;
    while i < b.len() {
        v = v * 10 + (b[i] - b'0');
        i += 1;
    }
    v
}

pub const MAJOR_VERSION: u8 = parse_version(env!("CARGO_PKG_VERSION_MAJOR"));
pub const MINOR_VERSION: u8 = parse_version(env!("CARGO_PKG_VERSION_MINOR"));
pub const PATCH_VERSION: u8 = parse_version(env!("CARGO_PKG_VERSION_PATCH"));
