// Copyright (c) 2026 The Keywarden Project

#![allow(unused)]

use std::fmt::Write;
use std::sync::{Arc, Mutex};

use hmac::{Hmac, Mac};
use log::debug;
use sha2::Sha512;

use keywarden_core::engine::{ButtonRequest, Driver, NodeKey, PinPrompt};
use keywarden_core::policy::{CompiledTxOut, TxOutput};
use keywarden_core::storage::{CommitError, DeviceRecord, Mnemonic, Persist, Pin, RootKey};

pub const MNEMONIC: &str =
    "alcohol woman abuse must during monitor noble actual mixed trade anger aisle";

/// Driver implementation for test use
pub struct TestDriver {
    pub approve: bool,
    pub pin: Option<&'static str>,
}

impl TestDriver {
    pub fn new() -> Self {
        Self {
            approve: true,
            pin: Some("1234"),
        }
    }
}

impl Driver for TestDriver {
    fn derive_node(&self, root: &RootKey, path: &[u32]) -> Option<NodeKey> {
        // Deterministic stand-in for HD derivation
        let key = match root {
            RootKey::Mnemonic(m) => m.as_bytes(),
            RootKey::Node(n) => &n[..],
        };
        let mut mac = Hmac::<Sha512>::new_from_slice(key).ok()?;
        for p in path {
            mac.update(&p.to_be_bytes());
        }
        let digest = mac.finalize().into_bytes();

        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..32]);
        Some(NodeKey(out))
    }

    fn confirm(&mut self, req: &ButtonRequest, title: &str, message: &str) -> bool {
        debug!("confirm {}: {} / {}", req.code, title, message);
        self.approve
    }

    fn request_pin(&mut self, prompt: PinPrompt) -> Option<Pin> {
        debug!("pin entry: {:?}", prompt);
        self.pin.and_then(|p| Pin::try_from(p).ok())
    }

    fn request_passphrase(&mut self) -> bool {
        true
    }

    fn mnemonic_check(&self, mnemonic: &str) -> bool {
        !mnemonic.is_empty()
    }

    fn word_in_list(&self, _word: &str) -> bool {
        true
    }

    fn mnemonic_from_entropy(&self, entropy: &[u8]) -> Option<Mnemonic> {
        // Deterministic stand-in for wordlist encoding
        let mut m = Mnemonic::new();
        for (i, c) in entropy.chunks(2).enumerate() {
            if i != 0 {
                m.push(' ').ok()?;
            }
            let b0 = c[0];
            let b1 = c.get(1).copied().unwrap_or(0);
            write!(&mut m, "w{b0:02x}{b1:02x}").ok()?;
        }
        Some(m)
    }

    fn display_mnemonic(&mut self, mnemonic: &str) -> bool {
        debug!("backup: {} words", mnemonic.split_whitespace().count());
        self.approve
    }

    fn negotiate_exchange(&mut self, _output: &TxOutput<'_>, _needs_confirm: bool) -> bool {
        true
    }

    fn compile_output(
        &mut self,
        _output: &TxOutput<'_>,
        _needs_confirm: bool,
    ) -> Option<CompiledTxOut> {
        None
    }
}

/// Shared in-memory persistence backend, for restart tests
#[derive(Clone, Default)]
pub struct MemPersist(Arc<Mutex<Option<DeviceRecord>>>);

impl MemPersist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Option<DeviceRecord> {
        self.0.lock().unwrap().clone()
    }
}

impl Persist for MemPersist {
    fn save(&mut self, record: &DeviceRecord) -> Result<(), CommitError> {
        *self.0.lock().unwrap() = Some(record.clone());
        Ok(())
    }
}
