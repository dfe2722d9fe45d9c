// Copyright (c) 2026 The Keywarden Project

//! CipherKeyValue: authenticated key derivation plus the symmetric
//! transform.
//!
//! The per-invocation key is bound to the exact key-identifier string and to
//! the caller's own ask-on-encrypt / ask-on-decrypt flags via the
//! domain-separation suffixes, so a value encrypted under one identifier or
//! flag combination can never be decrypted under another, and no two
//! identifiers share a derived key.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use heapless::Vec;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroize;

use super::{Error, NodeKey};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha512 = Hmac<Sha512>;

/// Maximum key-identifier length in bytes
pub const MAX_KEY_LEN: usize = 256;

/// Maximum value buffer length in bytes
pub const MAX_VALUE_LEN: usize = 1024;

/// CipherKeyValue value buffer
pub type CipherValue = Vec<u8, MAX_VALUE_LEN>;

/// CipherKeyValue request parameters after dispatch-level validation
#[derive(Clone, Debug)]
pub struct CipherParams<'a> {
    pub key: &'a str,
    pub encrypt: bool,
    pub ask_on_encrypt: bool,
    pub ask_on_decrypt: bool,
    pub iv: Option<&'a [u8]>,
}

/// Derive the 64-byte cipher secret: HMAC-SHA512 keyed by the node private
/// key over `key-identifier ‖ "E1"/"E0" ‖ "D1"/"D0"`. The first 32 bytes are
/// the AES-256 key, bytes 32..48 the fallback IV.
fn derive_secret(node: &NodeKey, params: &CipherParams<'_>) -> Result<[u8; 64], Error> {
    let mut data: Vec<u8, { MAX_KEY_LEN + 4 }> = Vec::new();

    data.extend_from_slice(params.key.as_bytes())
        .map_err(|_| Error::SyntaxError("Key identifier too long"))?;
    let _ = data.extend_from_slice(if params.ask_on_encrypt { b"E1" } else { b"E0" });
    let _ = data.extend_from_slice(if params.ask_on_decrypt { b"D1" } else { b"D0" });

    let mut mac = HmacSha512::new_from_slice(&node.0)
        .map_err(|_| Error::Other("Cipher key derivation failed"))?;
    mac.update(&data);

    Ok(mac.finalize().into_bytes().into())
}

/// Apply AES-256-CBC over `value` in place.
///
/// `value.len()` must already be a multiple of 16; the IV is the caller's
/// when exactly 16 bytes were supplied, otherwise the derived fallback.
pub fn cipher_key_value(
    node: &NodeKey,
    params: &CipherParams<'_>,
    value: &mut [u8],
) -> Result<(), Error> {
    if value.len() % 16 != 0 {
        return Err(Error::SyntaxError("Value length must be a multiple of 16"));
    }

    let mut secret = derive_secret(node, params)?;

    let mut iv = [0u8; 16];
    match params.iv {
        Some(v) if v.len() == 16 => iv.copy_from_slice(v),
        _ => iv.copy_from_slice(&secret[32..48]),
    }

    let r = if params.encrypt {
        let n = value.len();
        Aes256CbcEnc::new_from_slices(&secret[..32], &iv)
            .map_err(|_| Error::Other("Cipher init failed"))
            .and_then(|c| {
                c.encrypt_padded_mut::<NoPadding>(value, n)
                    .map(|_| ())
                    .map_err(|_| Error::Other("Cipher failed"))
            })
    } else {
        Aes256CbcDec::new_from_slices(&secret[..32], &iv)
            .map_err(|_| Error::Other("Cipher init failed"))
            .and_then(|c| {
                c.decrypt_padded_mut::<NoPadding>(value)
                    .map(|_| ())
                    .map_err(|_| Error::Other("Cipher failed"))
            })
    };

    secret.zeroize();
    iv.zeroize();

    r
}
