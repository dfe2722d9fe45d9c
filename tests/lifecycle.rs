// Copyright (c) 2026 The Keywarden Project

//! Full device lifecycle over the public engine API

use rand::rngs::StdRng;
use rand::SeedableRng;

use keywarden_core::engine::{Engine, Event, Output};

mod helpers;
use helpers::*;

#[test]
fn provision_cipher_wipe() -> anyhow::Result<()> {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());

    let mut e = Engine::new(TestDriver::new(), MemPersist::new());

    // Provision from an existing sentence
    e.update(&Event::LoadDevice {
        mnemonic: Some(MNEMONIC),
        node: None,
        pin: Some("1234"),
        passphrase_protection: false,
        language: None,
        label: Some("lifecycle"),
        skip_checksum: false,
    })?;

    let f = match e.update(&Event::GetFeatures)? {
        Output::Features(f) => f,
        _ => unreachable!(),
    };
    assert!(f.initialized);
    assert!(f.pin_protection);
    assert_eq!(f.label.as_deref(), Some("lifecycle"));

    // Cipher a value under the derived key and back
    let plain = [0x5au8; 32];

    fn cipher(value: &[u8], encrypt: bool) -> Event<'_> {
        Event::CipherKeyValue {
            key: Some("lifecycle"),
            value: Some(value),
            encrypt,
            ask_on_encrypt: false,
            ask_on_decrypt: false,
            iv: None,
            path: &[0x8000_002c, 0],
        }
    }

    let ct = match e.update(&cipher(&plain, true))? {
        Output::CipheredKeyValue { value } => value,
        _ => unreachable!(),
    };
    assert_ne!(ct.as_slice(), &plain[..]);

    let pt = match e.update(&cipher(&ct, false))? {
        Output::CipheredKeyValue { value } => value,
        _ => unreachable!(),
    };
    assert_eq!(pt.as_slice(), &plain[..]);

    // Wipe back to factory state
    e.update(&Event::WipeDevice)?;

    let f = match e.update(&Event::GetFeatures)? {
        Output::Features(f) => f,
        _ => unreachable!(),
    };
    assert!(!f.initialized);
    assert!(!f.pin_protection);

    Ok(())
}

#[test]
fn reset_persists_across_restart() -> anyhow::Result<()> {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());

    let persist = MemPersist::new();
    let mut e = Engine::new(TestDriver::new(), persist.clone());

    let r = e.update(&Event::ResetDevice {
        display_random: false,
        strength: Some(128),
        passphrase_protection: false,
        pin_protection: false,
        language: None,
        label: Some("fresh"),
    })?;
    assert_eq!(r, Output::EntropyRequest);

    e.update(&Event::EntropyAck {
        entropy: Some(&[0x42; 32]),
    })?;

    // "restart": a new engine over the committed record
    let saved = persist.saved().expect("record committed");
    let e2 = Engine::with_record(
        TestDriver::new(),
        persist,
        saved,
        StdRng::seed_from_u64(7),
    );

    assert!(e2.record().is_initialized());
    assert!(!e2.record().is_imported());
    assert_eq!(e2.record().label(), Some("fresh"));

    Ok(())
}
