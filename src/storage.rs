// Copyright (c) 2026 The Keywarden Project

//! Persisted device state and the transactional commit discipline.
//!
//! [`DeviceRecord`] is the single persisted record: initialization state,
//! PIN, passphrase protection, label, language, policy bits and the root
//! key material. All mutation goes through [`Store::update`], which applies
//! a closure to a working copy and persists the result in one step, so a
//! failed request can never leave a half-mutated record behind.

use heapless::String;
use zeroize::Zeroize;

use crate::engine::Error;
use crate::policy::{Policy, PolicyEntry, POLICY_COUNT, POLICY_TABLE};
use crate::truncated;

/// Maximum PIN digits
pub const PIN_MAX_LEN: usize = 10;

/// Device UUID length in bytes
pub const UUID_LEN: usize = 12;

pub type Pin = String<PIN_MAX_LEN>;
pub type Label = String<32>;
pub type Language = String<16>;

/// BIP-39 style sentence, up to 24 words
pub type Mnemonic = String<241>;

/// Root key material, set exactly once between wipes
#[derive(Clone, Debug, PartialEq)]
pub enum RootKey {
    /// Recovery sentence, expanded to a seed by the platform
    Mnemonic(Mnemonic),
    /// Directly imported HD node (chain code followed by private key)
    Node([u8; 64]),
}

impl Zeroize for RootKey {
    fn zeroize(&mut self) {
        match self {
            RootKey::Mnemonic(m) => {
                let v = unsafe { m.as_mut_vec() };
                v.as_mut_slice().zeroize();
                v.clear();
            }
            RootKey::Node(n) => n.zeroize(),
        }
    }
}

/// Persisted device state
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceRecord {
    initialized: bool,
    imported: bool,
    uuid: [u8; UUID_LEN],
    pin: Option<Pin>,
    passphrase_protected: bool,
    label: Option<Label>,
    language: Option<Language>,
    policies: [PolicyEntry; POLICY_COUNT],
    root: Option<RootKey>,
}

impl Default for DeviceRecord {
    fn default() -> Self {
        Self {
            initialized: false,
            imported: false,
            uuid: [0u8; UUID_LEN],
            pin: None,
            passphrase_protected: false,
            label: None,
            language: None,
            policies: POLICY_TABLE,
            root: None,
        }
    }
}

impl DeviceRecord {
    /// Create a factory-fresh record with the given UUID
    pub fn new(uuid: [u8; UUID_LEN]) -> Self {
        Self {
            uuid,
            ..Default::default()
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_imported(&self) -> bool {
        self.imported
    }

    pub fn uuid(&self) -> &[u8; UUID_LEN] {
        &self.uuid
    }

    pub fn has_pin(&self) -> bool {
        self.pin.is_some()
    }

    pub fn check_pin(&self, entered: &str) -> bool {
        match &self.pin {
            Some(pin) => pin.as_str() == entered,
            None => false,
        }
    }

    pub fn set_pin(&mut self, pin: &str) {
        self.pin = Some(truncated(pin));
    }

    pub fn clear_pin(&mut self) {
        if let Some(pin) = &mut self.pin {
            let v = unsafe { pin.as_mut_vec() };
            v.as_mut_slice().zeroize();
        }
        self.pin = None;
    }

    pub fn passphrase_protected(&self) -> bool {
        self.passphrase_protected
    }

    pub fn set_passphrase_protected(&mut self, protected: bool) {
        self.passphrase_protected = protected;
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = Some(truncated(label));
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: &str) {
        self.language = Some(truncated(language));
    }

    pub fn root(&self) -> Option<&RootKey> {
        self.root.as_ref()
    }

    /// Install root key material and mark the device initialized.
    ///
    /// Rejected once initialized; the caller must gate on
    /// [`is_initialized`][Self::is_initialized] first and a full wipe is the
    /// only way back.
    pub fn set_root(&mut self, root: RootKey) -> Result<(), Error> {
        if self.initialized {
            return Err(Error::UnexpectedMessage(
                "Device is already initialized. Use Wipe first.",
            ));
        }
        self.root = Some(root);
        self.initialized = true;
        Ok(())
    }

    pub fn set_imported(&mut self, imported: bool) {
        self.imported = imported;
    }

    pub fn policies(&self) -> &[PolicyEntry; POLICY_COUNT] {
        &self.policies
    }

    pub fn policy_enabled(&self, policy: Policy) -> bool {
        self.policies[policy as usize].enabled
    }

    pub fn set_policy(&mut self, policy: Policy, enabled: bool) {
        self.policies[policy as usize].enabled = enabled;
    }

    /// Erase all secrets and settings, assigning a fresh UUID
    pub fn wipe(&mut self, uuid: [u8; UUID_LEN]) {
        self.zeroize_secrets();
        *self = Self::new(uuid);
    }

    fn zeroize_secrets(&mut self) {
        if let Some(root) = &mut self.root {
            root.zeroize();
        }
        self.clear_pin();
    }
}

/// Storage commit failure
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CommitError;

/// Durable storage backend, called once per committed transaction
pub trait Persist {
    fn save(&mut self, record: &DeviceRecord) -> Result<(), CommitError>;
}

/// Committed device state plus its persistence backend.
///
/// [`update`][Self::update] is the only mutation path: the closure runs
/// against a working copy, and commit-or-discard is applied atomically so no
/// call site is responsible for remembering to commit.
pub struct Store<P: Persist> {
    record: DeviceRecord,
    persist: P,
}

impl<P: Persist> Store<P> {
    pub fn new(persist: P, record: DeviceRecord) -> Self {
        Self { record, persist }
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    /// Run a mutation transactionally: on success the working copy is
    /// persisted and becomes the committed record, on failure it is
    /// discarded and the committed record is untouched.
    pub fn update<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut DeviceRecord) -> Result<(), Error>,
    {
        let mut working = self.record.clone();
        f(&mut working)?;

        self.persist
            .save(&working)
            .map_err(|_| Error::Other("Storage commit failed"))?;

        let mut old = core::mem::replace(&mut self.record, working);
        old.zeroize_secrets();
        Ok(())
    }
}
