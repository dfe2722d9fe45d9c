// Copyright (c) 2026 The Keywarden Project

//! Request dispatch engine.
//!
//! [`Engine::update`] consumes one decoded [`Event`] and produces one
//! [`Output`] or [`Error`]. All security gating happens here: operator
//! confirmation, PIN and passphrase verification, initialization-state
//! checks, and the exclusive reset/recovery flow context. Handlers validate
//! first, gate second, and commit persistent state last, in a single
//! [`Store::update`][crate::storage::Store::update] transaction.

use core::fmt::Write;
use core::str::FromStr;

use heapless::{String, Vec};
use rand_core::{CryptoRngCore, OsRng};
use strum::{Display, EnumIter, EnumString};
use zeroize::Zeroize;

use crate::coins::{coin_range, COINS, COIN_CHUNK_SIZE};
use crate::policy::{CompiledTxOut, Policy, TxOutput};
use crate::session::Session;
use crate::storage::{DeviceRecord, Mnemonic, Persist, Pin, RootKey, Store, UUID_LEN};
use crate::truncated;

mod cipher;
pub use cipher::{cipher_key_value, CipherParams, CipherValue, MAX_KEY_LEN, MAX_VALUE_LEN};

mod error;
pub use error::{Error, FailureCode};

mod event;
pub use event::{Event, PolicyRequest};

mod flow;
pub use flow::Flow;

mod output;
pub use output::{Features, Output, ENTROPY_BUF, MAJOR_VERSION, MINOR_VERSION, PATCH_VERSION};

mod recovery;
pub use recovery::{RecoveryFlow, RecoveryMode};

mod reset;
pub use reset::ResetFlow;

/// Model strings programmable via `Ping` while in manufacturing mode
pub const VALID_MODELS: &[&str] = &["K1-14AM", "K1-14WL"];

/// Vendor string reported in `Features`
pub const VENDOR: &str = "keywarden.io";

/// Engine states, computed from the active flow context
#[derive(Copy, Clone, PartialEq, Debug, EnumString, Display, EnumIter)]
pub enum State {
    /// No flow in progress
    Idle,
    /// Reset started, awaiting caller entropy
    AwaitEntropy,
    /// Word recovery in progress, n words received
    AwaitWord(u8),
    /// Character-cipher recovery in progress
    AwaitCharacter,
}

/// Derived HD node private key
#[derive(Clone, Debug, PartialEq)]
pub struct NodeKey(pub [u8; 32]);

impl Zeroize for NodeKey {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Confirmation request kind, forwarded to the host alongside the prompt
#[derive(Copy, Clone, Debug, PartialEq, Display)]
pub enum ButtonRequestCode {
    Other,
    Ping,
    CreatePin,
    ChangePin,
    RemovePin,
    WipeDevice,
    GetEntropy,
    ChangeLabel,
    ChangeLanguage,
    EnablePassphrase,
    DisablePassphrase,
    ImportPrivateKey,
    ImportRecoverySentence,
    ResetDevice,
    CipherKeyValue,
    ApplyPolicies,
}

/// One operator confirmation request.
///
/// `data` is a machine-readable summary of the pending action (empty for
/// most requests), distinct from the human-readable title and body text.
#[derive(Clone, Debug, PartialEq)]
pub struct ButtonRequest {
    pub code: ButtonRequestCode,
    pub data: String<64>,
}

/// Which PIN the entry flow should collect
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PinPrompt {
    /// Verify the currently-set PIN
    Current,
    /// Collect a new PIN (with re-entry, handled by the driver)
    New,
}

/// Platform capability seam.
///
/// Everything the engine cannot do portably lives behind this trait: key
/// derivation, mnemonic encoding and validation, the confirmation display,
/// PIN and passphrase entry, and coin-specific output compilation. Blocking
/// entry flows return `None`/`false` on operator cancel.
pub trait Driver {
    /// Derive an HD node private key from the root key material
    fn derive_node(&self, root: &RootKey, path: &[u32]) -> Option<NodeKey>;

    /// Present a yes/no decision to the operator, blocking until answered
    fn confirm(&mut self, req: &ButtonRequest, title: &str, message: &str) -> bool;

    /// Run the PIN entry flow
    fn request_pin(&mut self, prompt: PinPrompt) -> Option<Pin>;

    /// Run the passphrase entry flow
    fn request_passphrase(&mut self) -> bool;

    /// Validate a full sentence checksum
    fn mnemonic_check(&self, mnemonic: &str) -> bool;

    /// Check one word against the wordlist
    fn word_in_list(&self, word: &str) -> bool;

    /// Encode seed entropy as a sentence
    fn mnemonic_from_entropy(&self, entropy: &[u8]) -> Option<Mnemonic>;

    /// Show a freshly generated sentence for backup
    fn display_mnemonic(&mut self, mnemonic: &str) -> bool;

    /// Negotiate an exchange contract for the given output
    fn negotiate_exchange(&mut self, output: &TxOutput<'_>, needs_confirm: bool) -> bool;

    /// Compile a coin-specific transaction output
    fn compile_output(&mut self, output: &TxOutput<'_>, needs_confirm: bool)
        -> Option<CompiledTxOut>;

    /// Model string programmed at manufacture, if any
    fn model(&self) -> Option<&str> {
        None
    }

    /// Firmware variant name
    fn firmware_variant(&self) -> &str {
        "keywarden"
    }

    fn bootloader_hash(&self) -> Option<[u8; 32]> {
        None
    }

    fn firmware_hash(&self) -> Option<[u8; 32]> {
        None
    }

    /// Whether the device is still in manufacturing mode
    fn mfg_mode(&self) -> bool {
        false
    }

    /// Program the model string, leaving manufacturing mode
    fn program_model(&mut self, model: &str) {
        let _ = model;
    }
}

/// Command-processing engine: one instance per device.
///
/// Generic over the platform [`Driver`], the storage backend
/// [`Persist`][crate::storage::Persist] and the RNG so the full state
/// machine runs unchanged on hardware and in host tests.
pub struct Engine<DRV: Driver, P: Persist, RNG: CryptoRngCore = OsRng> {
    drv: DRV,
    rng: RNG,
    store: Store<P>,
    session: Session,
    flow: Flow,
}

impl<DRV: Driver, P: Persist> Engine<DRV, P, OsRng> {
    /// Create an engine over a factory-fresh record with an RNG-assigned UUID
    pub fn new(drv: DRV, persist: P) -> Self {
        Self::new_with_rng(drv, persist, OsRng)
    }
}

impl<DRV: Driver, P: Persist, RNG: CryptoRngCore> Engine<DRV, P, RNG> {
    pub fn new_with_rng(drv: DRV, persist: P, mut rng: RNG) -> Self {
        let mut uuid = [0u8; UUID_LEN];
        rng.fill_bytes(&mut uuid);

        Self::with_record(drv, persist, DeviceRecord::new(uuid), rng)
    }

    /// Resume from a previously persisted record
    pub fn with_record(drv: DRV, persist: P, record: DeviceRecord, rng: RNG) -> Self {
        Self {
            drv,
            rng,
            store: Store::new(persist, record),
            session: Session::new(),
            flow: Flow::None,
        }
    }

    /// Fetch current engine state
    pub fn state(&self) -> State {
        match &self.flow {
            Flow::None => State::Idle,
            Flow::Reset(_) => State::AwaitEntropy,
            Flow::Recovery(r) if r.is_character_mode() => State::AwaitCharacter,
            Flow::Recovery(r) => State::AwaitWord(r.words_received() as u8),
        }
    }

    /// Committed device record
    pub fn record(&self) -> &DeviceRecord {
        self.store.record()
    }

    /// Session authentication cache
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Update engine state with an incoming event, producing the response
    /// (or failure) for the transport layer to encode.
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn update(&mut self, evt: &Event<'_>) -> Result<Output, Error> {
        #[cfg(feature = "log")]
        {
            let name: &str = evt.as_ref();
            log::debug!("event: {}", name);
        }

        let r = self.dispatch(evt);

        #[cfg(feature = "log")]
        if let Err(e) = &r {
            log::debug!("request failed: {:?}", e);
        }

        r
    }

    fn dispatch(&mut self, evt: &Event<'_>) -> Result<Output, Error> {
        match evt {
            Event::Initialize => self.handle_initialize(),
            Event::GetFeatures => Ok(Output::Features(self.features())),
            Event::Cancel => self.handle_cancel(),
            Event::Ping {
                message,
                button_protection,
                pin_protection,
                passphrase_protection,
            } => self.handle_ping(
                *message,
                *button_protection,
                *pin_protection,
                *passphrase_protection,
            ),
            Event::ChangePin { remove } => self.handle_change_pin(*remove),
            Event::WipeDevice => self.handle_wipe(),
            Event::FirmwareErase | Event::FirmwareUpload => {
                Err(Error::UnexpectedMessage("Not in bootloader mode"))
            }
            Event::GetEntropy { size } => self.handle_get_entropy(*size),
            Event::LoadDevice {
                mnemonic,
                node,
                pin,
                passphrase_protection,
                language,
                label,
                skip_checksum,
            } => self.handle_load(
                *mnemonic,
                *node,
                *pin,
                *passphrase_protection,
                *language,
                *label,
                *skip_checksum,
            ),
            Event::ResetDevice {
                display_random,
                strength,
                passphrase_protection,
                pin_protection,
                language,
                label,
            } => self.handle_reset(
                *display_random,
                *strength,
                *passphrase_protection,
                *pin_protection,
                *language,
                *label,
            ),
            Event::EntropyAck { entropy } => self.handle_entropy_ack(*entropy),
            Event::ApplySettings {
                label,
                language,
                use_passphrase,
            } => self.handle_apply_settings(*label, *language, *use_passphrase),
            Event::CipherKeyValue {
                key,
                value,
                encrypt,
                ask_on_encrypt,
                ask_on_decrypt,
                iv,
                path,
            } => self.handle_cipher_key_value(
                *key,
                *value,
                *encrypt,
                *ask_on_encrypt,
                *ask_on_decrypt,
                *iv,
                path,
            ),
            Event::RecoveryDevice {
                use_character_cipher,
                word_count,
                passphrase_protection,
                pin_protection,
                language,
                label,
                enforce_wordlist,
            } => self.handle_recovery(
                *use_character_cipher,
                *word_count,
                *passphrase_protection,
                *pin_protection,
                *language,
                *label,
                *enforce_wordlist,
            ),
            Event::WordAck { word } => self.handle_word_ack(word),
            Event::CharacterAck {
                character,
                delete,
                done,
            } => self.handle_character_ack(*character, *delete, *done),
            Event::ApplyPolicies { policies } => self.handle_apply_policies(policies),
            Event::GetCoinTable { start, end } => self.handle_get_coin_table(*start, *end),
        }
    }

    // Gates

    fn confirm(&mut self, code: ButtonRequestCode, title: &str, message: &str) -> bool {
        let req = ButtonRequest {
            code,
            data: String::new(),
        };
        self.drv.confirm(&req, title, message)
    }

    fn confirm_with_data(
        &mut self,
        code: ButtonRequestCode,
        data: &str,
        title: &str,
        message: &str,
    ) -> bool {
        let req = ButtonRequest {
            code,
            data: truncated(data),
        };
        self.drv.confirm(&req, title, message)
    }

    fn verify_pin_entry(&mut self) -> Result<(), Error> {
        match self.drv.request_pin(PinPrompt::Current) {
            Some(pin) if self.store.record().check_pin(&pin) => {
                self.session.cache_pin();
                Ok(())
            }
            Some(_) => {
                self.session.clear_pin();
                Err(Error::ActionCancelled("PIN invalid"))
            }
            None => Err(Error::ActionCancelled("PIN entry cancelled")),
        }
    }

    /// Require a valid PIN, accepting the session cache
    fn pin_protect_cached(&mut self) -> Result<(), Error> {
        if !self.store.record().has_pin() || self.session.is_pin_cached() {
            return Ok(());
        }
        self.verify_pin_entry()
    }

    /// Require a fresh PIN entry regardless of the session cache
    fn pin_protect_uncached(&mut self) -> Result<(), Error> {
        if !self.store.record().has_pin() {
            return Ok(());
        }
        self.verify_pin_entry()
    }

    /// Require the passphrase entry flow, accepting the session cache
    fn passphrase_protect(&mut self) -> Result<(), Error> {
        if !self.store.record().passphrase_protected() || self.session.is_passphrase_cached() {
            return Ok(());
        }

        if self.drv.request_passphrase() {
            self.session.cache_passphrase();
            Ok(())
        } else {
            Err(Error::ActionCancelled("Passphrase entry cancelled"))
        }
    }

    // Handlers

    fn handle_initialize(&mut self) -> Result<Output, Error> {
        self.flow.clear();
        self.session.clear(false);
        Ok(Output::Features(self.features()))
    }

    fn handle_cancel(&mut self) -> Result<Output, Error> {
        self.flow.clear();
        Err(Error::ActionCancelled("Aborted"))
    }

    fn features(&self) -> Features {
        let rec = self.store.record();

        let mut device_id = String::new();
        for b in rec.uuid() {
            let _ = write!(&mut device_id, "{b:02x}");
        }

        Features {
            vendor: VENDOR,
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            patch_version: PATCH_VERSION,
            device_id,
            model: truncated(self.drv.model().unwrap_or("Unknown")),
            firmware_variant: truncated(self.drv.firmware_variant()),
            pin_protection: rec.has_pin(),
            passphrase_protection: rec.passphrase_protected(),
            bootloader_hash: self.drv.bootloader_hash(),
            firmware_hash: self.drv.firmware_hash(),
            language: rec.language().map(truncated),
            label: rec.label().map(truncated),
            initialized: rec.is_initialized(),
            imported: rec.is_imported(),
            pin_cached: self.session.is_pin_cached(),
            passphrase_cached: self.session.is_passphrase_cached(),
            policies: *rec.policies(),
        }
    }

    fn handle_ping(
        &mut self,
        message: Option<&str>,
        button_protection: bool,
        pin_protection: bool,
        passphrase_protection: bool,
    ) -> Result<Output, Error> {
        // Manufacturing-mode devices take the model string via Ping
        if self.drv.mfg_mode() {
            if let Some(m) = message {
                if VALID_MODELS.contains(&m) {
                    self.drv.program_model(m);
                }
            }
        }

        if button_protection && !self.confirm(ButtonRequestCode::Ping, "Ping", message.unwrap_or(""))
        {
            return Err(Error::ActionCancelled("Ping cancelled"));
        }

        if pin_protection {
            self.pin_protect_cached()?;
        }

        if passphrase_protection {
            self.passphrase_protect()
                .map_err(|_| Error::ActionCancelled("Ping cancelled"))?;
        }

        Ok(Output::success(message.unwrap_or("")))
    }

    fn handle_change_pin(&mut self, remove: bool) -> Result<Output, Error> {
        let has_pin = self.store.record().has_pin();

        // Removing a PIN that is not set is a no-op
        if remove && !has_pin {
            return Ok(Output::success("PIN removed"));
        }

        let (code, title, message, cancelled) = if remove {
            (
                ButtonRequestCode::RemovePin,
                "Remove PIN",
                "Do you want to remove PIN protection?",
                "PIN removal cancelled",
            )
        } else if has_pin {
            (
                ButtonRequestCode::ChangePin,
                "Change PIN",
                "Do you want to change your PIN?",
                "PIN change cancelled",
            )
        } else {
            (
                ButtonRequestCode::CreatePin,
                "Create PIN",
                "Do you want to add PIN protection?",
                "PIN change cancelled",
            )
        };

        if !self.confirm(code, title, message) {
            return Err(Error::ActionCancelled(cancelled));
        }

        // The current PIN is always re-verified here, cache or not
        self.pin_protect_uncached()?;

        if remove {
            self.store.update(|rec| {
                rec.clear_pin();
                Ok(())
            })?;
            self.session.clear_pin();
            return Ok(Output::success("PIN removed"));
        }

        let new_pin = self
            .drv
            .request_pin(PinPrompt::New)
            .ok_or(Error::ActionCancelled("PIN change cancelled"))?;

        self.store.update(|rec| {
            rec.set_pin(&new_pin);
            Ok(())
        })?;
        self.session.clear_pin();

        Ok(Output::success("PIN changed"))
    }

    fn handle_wipe(&mut self) -> Result<Output, Error> {
        if !self.confirm(
            ButtonRequestCode::WipeDevice,
            "Wipe Device",
            "Do you want to erase your private keys and settings?",
        ) {
            return Err(Error::ActionCancelled("Wipe cancelled"));
        }

        let mut uuid = [0u8; UUID_LEN];
        self.rng.fill_bytes(&mut uuid);

        self.store.update(|rec| {
            rec.wipe(uuid);
            Ok(())
        })?;

        self.session.clear(true);
        self.flow.clear();

        Ok(Output::success("Device wiped"))
    }

    fn handle_get_entropy(&mut self, size: u32) -> Result<Output, Error> {
        if !self.confirm(
            ButtonRequestCode::GetEntropy,
            "Generate Entropy",
            "Do you want to generate and return entropy using the hardware RNG?",
        ) {
            return Err(Error::ActionCancelled("Entropy cancelled"));
        }

        let n = (size as usize).min(ENTROPY_BUF);

        let mut buf: Vec<u8, ENTROPY_BUF> = Vec::new();
        let _ = buf.resize_default(n);
        self.rng.fill_bytes(&mut buf);

        Ok(Output::Entropy(buf))
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_load(
        &mut self,
        mnemonic: Option<&str>,
        node: Option<&[u8; 64]>,
        pin: Option<&str>,
        passphrase_protection: bool,
        language: Option<&str>,
        label: Option<&str>,
        skip_checksum: bool,
    ) -> Result<Output, Error> {
        if self.store.record().is_initialized() {
            return Err(Error::UnexpectedMessage(
                "Device is already initialized. Use Wipe first.",
            ));
        }
        self.flow.clear();

        let (mut root, code, title) = match (mnemonic, node) {
            (Some(m), _) => (
                RootKey::Mnemonic(
                    Mnemonic::try_from(m).map_err(|_| Error::SyntaxError("Mnemonic too long"))?,
                ),
                ButtonRequestCode::ImportRecoverySentence,
                "Import Recovery Sentence",
            ),
            (None, Some(n)) => (
                RootKey::Node(*n),
                ButtonRequestCode::ImportPrivateKey,
                "Import Private Key",
            ),
            (None, None) => return Err(Error::SyntaxError("No seed provided")),
        };

        if !self.confirm(
            code,
            title,
            "Importing is not recommended unless you understand the risks. \
             Do you want to continue?",
        ) {
            root.zeroize();
            return Err(Error::ActionCancelled("Load cancelled"));
        }

        if let (Some(m), false) = (mnemonic, skip_checksum) {
            if !self.drv.mnemonic_check(m) {
                root.zeroize();
                return Err(Error::ActionCancelled(
                    "Mnemonic with wrong checksum provided",
                ));
            }
        }

        self.store.update(move |rec| {
            rec.set_root(root)?;
            rec.set_imported(true);
            if let Some(p) = pin {
                rec.set_pin(p);
            }
            rec.set_passphrase_protected(passphrase_protection);
            if let Some(l) = language {
                rec.set_language(l);
            }
            if let Some(l) = label {
                rec.set_label(l);
            }
            Ok(())
        })?;

        Ok(Output::success("Device loaded"))
    }

    fn handle_reset(
        &mut self,
        display_random: bool,
        strength: Option<u32>,
        passphrase_protection: bool,
        pin_protection: bool,
        language: Option<&str>,
        label: Option<&str>,
    ) -> Result<Output, Error> {
        if self.store.record().is_initialized() {
            return Err(Error::UnexpectedMessage(
                "Device is already initialized. Use Wipe first.",
            ));
        }
        self.flow.clear();

        let mut internal = [0u8; 32];
        self.rng.fill_bytes(&mut internal);

        let flow = ResetFlow::new(
            display_random,
            strength.unwrap_or(128),
            passphrase_protection,
            pin_protection,
            language,
            label,
            internal,
        );
        internal.zeroize();
        let mut flow = flow?;

        if flow.display_random {
            let mut msg: String<64> = String::new();
            for b in flow.internal_entropy() {
                let _ = write!(&mut msg, "{b:02x}");
            }
            if !self.confirm(ButtonRequestCode::ResetDevice, "Internal Entropy", &msg) {
                return Err(Error::ActionCancelled("Reset cancelled"));
            }
        }

        if flow.pin_protection {
            let pin = self
                .drv
                .request_pin(PinPrompt::New)
                .ok_or(Error::ActionCancelled("Reset cancelled"))?;
            flow.pending_pin = Some(pin);
        }

        self.flow = Flow::Reset(flow);

        Ok(Output::EntropyRequest)
    }

    fn handle_entropy_ack(&mut self, entropy: Option<&[u8]>) -> Result<Output, Error> {
        // Any failure past this point aborts the reset
        let flow = match core::mem::take(&mut self.flow) {
            Flow::Reset(f) => f,
            other => {
                self.flow = other;
                return Err(Error::UnexpectedMessage("Not in Reset mode"));
            }
        };

        let (mut seed, n) = flow.mix(entropy.unwrap_or(&[]));

        let mnemonic = match self.drv.mnemonic_from_entropy(&seed[..n]) {
            Some(m) => m,
            None => {
                seed.zeroize();
                return Err(Error::Other("Mnemonic generation failed"));
            }
        };
        seed.zeroize();

        if !self.drv.display_mnemonic(&mnemonic) {
            let mut root = RootKey::Mnemonic(mnemonic);
            root.zeroize();
            return Err(Error::ActionCancelled("Reset cancelled"));
        }

        self.store.update(move |rec| {
            rec.set_root(RootKey::Mnemonic(mnemonic))?;
            if let Some(pin) = &flow.pending_pin {
                rec.set_pin(pin);
            }
            rec.set_passphrase_protected(flow.passphrase_protection);
            if let Some(l) = &flow.language {
                rec.set_language(l);
            }
            if let Some(l) = &flow.label {
                rec.set_label(l);
            }
            Ok(())
        })?;

        Ok(Output::success("Device reset"))
    }

    fn handle_apply_settings(
        &mut self,
        label: Option<&str>,
        language: Option<&str>,
        use_passphrase: Option<bool>,
    ) -> Result<Output, Error> {
        if label.is_none() && language.is_none() && use_passphrase.is_none() {
            return Err(Error::SyntaxError("No setting provided"));
        }

        if let Some(l) = label {
            let mut msg: String<128> = String::new();
            let _ = write!(&mut msg, "Do you want to change the label to \"{l}\"?");
            if !self.confirm(ButtonRequestCode::ChangeLabel, "Change Label", &msg) {
                return Err(Error::ActionCancelled("Apply settings cancelled"));
            }
        }

        if let Some(l) = language {
            let mut msg: String<128> = String::new();
            let _ = write!(&mut msg, "Do you want to change the language to {l}?");
            if !self.confirm(ButtonRequestCode::ChangeLanguage, "Change Language", &msg) {
                return Err(Error::ActionCancelled("Apply settings cancelled"));
            }
        }

        if let Some(enable) = use_passphrase {
            let (code, title, msg) = if enable {
                (
                    ButtonRequestCode::EnablePassphrase,
                    "Enable Passphrase",
                    "Do you want to enable passphrase encryption?",
                )
            } else {
                (
                    ButtonRequestCode::DisablePassphrase,
                    "Disable Passphrase",
                    "Do you want to disable passphrase encryption?",
                )
            };
            if !self.confirm(code, title, msg) {
                return Err(Error::ActionCancelled("Apply settings cancelled"));
            }
        }

        self.pin_protect_cached()?;

        self.store.update(|rec| {
            if let Some(l) = label {
                rec.set_label(l);
            }
            if let Some(l) = language {
                rec.set_language(l);
            }
            if let Some(enable) = use_passphrase {
                rec.set_passphrase_protected(enable);
            }
            Ok(())
        })?;

        // A protection toggle invalidates the cached passphrase
        if use_passphrase.is_some() {
            self.session.clear_passphrase();
        }

        Ok(Output::success("Settings applied"))
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_cipher_key_value(
        &mut self,
        key: Option<&str>,
        value: Option<&[u8]>,
        encrypt: bool,
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
        iv: Option<&[u8]>,
        path: &[u32],
    ) -> Result<Output, Error> {
        if !self.store.record().is_initialized() {
            return Err(Error::NotInitialized);
        }

        let key = key.ok_or(Error::SyntaxError("No key provided"))?;
        let value = value.ok_or(Error::SyntaxError("No value provided"))?;

        if key.len() > MAX_KEY_LEN {
            return Err(Error::SyntaxError("Key identifier too long"));
        }
        if value.len() % 16 != 0 {
            return Err(Error::SyntaxError("Value length must be a multiple of 16"));
        }

        let mut buf =
            CipherValue::from_slice(value).map_err(|_| Error::SyntaxError("Value too long"))?;

        self.pin_protect_cached()?;

        let mut node = {
            let rec = self.store.record();
            let root = rec.root().ok_or(Error::NotInitialized)?;
            self.drv
                .derive_node(root, path)
                .ok_or(Error::Other("Key derivation failed"))?
        };

        if (encrypt && ask_on_encrypt) || (!encrypt && ask_on_decrypt) {
            let title = if encrypt {
                "Encrypt Key Value"
            } else {
                "Decrypt Key Value"
            };
            if !self.confirm(ButtonRequestCode::CipherKeyValue, title, key) {
                node.zeroize();
                return Err(Error::ActionCancelled("CipherKeyValue cancelled"));
            }
        }

        let params = CipherParams {
            key,
            encrypt,
            ask_on_encrypt,
            ask_on_decrypt,
            iv,
        };
        let r = cipher_key_value(&node, &params, &mut buf);
        node.zeroize();
        r?;

        Ok(Output::CipheredKeyValue { value: buf })
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_recovery(
        &mut self,
        use_character_cipher: bool,
        word_count: Option<u32>,
        passphrase_protection: bool,
        pin_protection: bool,
        language: Option<&str>,
        label: Option<&str>,
        enforce_wordlist: bool,
    ) -> Result<Output, Error> {
        if self.store.record().is_initialized() {
            return Err(Error::UnexpectedMessage(
                "Device is already initialized. Use Wipe first.",
            ));
        }
        self.flow.clear();

        let mut flow = if use_character_cipher {
            RecoveryFlow::characters(passphrase_protection, language, label)
        } else {
            RecoveryFlow::words(
                word_count.unwrap_or(12),
                passphrase_protection,
                language,
                label,
                enforce_wordlist,
            )?
        };

        if pin_protection {
            let pin = self
                .drv
                .request_pin(PinPrompt::New)
                .ok_or(Error::ActionCancelled("Recovery cancelled"))?;
            flow.pending_pin = Some(pin);
        }

        let out = if use_character_cipher {
            Output::CharacterRequest {
                word_pos: 0,
                character_pos: 0,
            }
        } else {
            Output::WordRequest
        };

        self.flow = Flow::Recovery(flow);
        Ok(out)
    }

    fn handle_word_ack(&mut self, word: &str) -> Result<Output, Error> {
        // Any failure past this point aborts the recovery
        let mut flow = match core::mem::take(&mut self.flow) {
            Flow::Recovery(f) if !f.is_character_mode() => f,
            other => {
                self.flow = other;
                return Err(Error::UnexpectedMessage("Not in recovery mode"));
            }
        };

        if flow.enforce_wordlist && !self.drv.word_in_list(word) {
            return Err(Error::SyntaxError("Word not found in a wordlist"));
        }

        match flow.add_word(word)? {
            None => {
                self.flow = Flow::Recovery(flow);
                Ok(Output::WordRequest)
            }
            Some(mnemonic) => self.finish_recovery(flow, mnemonic),
        }
    }

    fn handle_character_ack(
        &mut self,
        character: Option<char>,
        delete: bool,
        done: bool,
    ) -> Result<Output, Error> {
        if character.is_none() && !delete && !done {
            return Err(Error::SyntaxError("No character provided"));
        }

        // Any failure past this point aborts the recovery
        let mut flow = match core::mem::take(&mut self.flow) {
            Flow::Recovery(f) if f.is_character_mode() => f,
            other => {
                self.flow = other;
                return Err(Error::UnexpectedMessage("Not in recovery mode"));
            }
        };

        if delete {
            flow.delete_character();
        } else if done {
            let mnemonic = flow.finalize_characters();
            return self.finish_recovery(flow, mnemonic);
        } else if let Some(c) = character {
            flow.add_character(c)?;
        }

        let (word_pos, character_pos) = flow.character_positions();
        self.flow = Flow::Recovery(flow);

        Ok(Output::CharacterRequest {
            word_pos,
            character_pos,
        })
    }

    /// Validate and commit an assembled recovery sentence
    fn finish_recovery(&mut self, flow: RecoveryFlow, mnemonic: Mnemonic) -> Result<Output, Error> {
        if !self.drv.mnemonic_check(&mnemonic) {
            let mut root = RootKey::Mnemonic(mnemonic);
            root.zeroize();
            return Err(Error::SyntaxError(
                "Invalid mnemonic, are words in correct order?",
            ));
        }

        self.store.update(move |rec| {
            rec.set_root(RootKey::Mnemonic(mnemonic))?;
            if let Some(pin) = &flow.pending_pin {
                rec.set_pin(pin);
            }
            rec.set_passphrase_protected(flow.passphrase_protection);
            if let Some(l) = &flow.language {
                rec.set_language(l);
            }
            if let Some(l) = &flow.label {
                rec.set_label(l);
            }
            Ok(())
        })?;

        Ok(Output::success("Device recovered"))
    }

    fn handle_apply_policies(&mut self, policies: &[PolicyRequest<'_>]) -> Result<Output, Error> {
        let req = *policies
            .first()
            .ok_or(Error::SyntaxError("No policy provided"))?;

        // Machine-readable payload: "<name>:Enable" / "<name>:Disable"
        let mut data: String<64> = String::new();
        let suffix = if req.enabled { ":Enable" } else { ":Disable" };
        for c in req.policy_name.chars().chain(suffix.chars()) {
            if data.push(c).is_err() {
                break;
            }
        }

        let (title, verb) = if req.enabled {
            ("Enable Policy", "enable")
        } else {
            ("Disable Policy", "disable")
        };
        let mut msg: String<128> = String::new();
        let _ = write!(&mut msg, "Do you want to {verb} {} policy?", req.policy_name);

        if !self.confirm_with_data(ButtonRequestCode::ApplyPolicies, &data, title, &msg) {
            return Err(Error::ActionCancelled("Apply policies cancelled"));
        }

        self.pin_protect_cached()?;

        let policy = Policy::from_str(req.policy_name)
            .map_err(|_| Error::Other("Policy could not be applied"))?;

        self.store.update(|rec| {
            rec.set_policy(policy, req.enabled);
            Ok(())
        })?;

        Ok(Output::success("Policies applied"))
    }

    fn handle_get_coin_table(
        &mut self,
        start: Option<usize>,
        end: Option<usize>,
    ) -> Result<Output, Error> {
        let table = coin_range(start, end)
            .map_err(|_| Error::SyntaxError("Incorrect GetCoinTable parameters"))?;

        Ok(Output::CoinTable {
            chunk_size: COIN_CHUNK_SIZE,
            num_coins: COINS.len(),
            table,
        })
    }
}
