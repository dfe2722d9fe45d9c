// Copyright (c) 2026 The Keywarden Project

//! Mnemonic recovery entry: word-by-word dictation or character-cipher
//! entry.
//!
//! The context accumulates one unit per `WordAck`/`CharacterAck` until the
//! expected word count is reached or the caller signals done. Checksum
//! validation happens at finalize; `enforce_wordlist` additionally rejects
//! non-dictionary words as they arrive.

use heapless::{String, Vec};

use crate::storage::{Label, Language, Mnemonic, Pin};
use crate::truncated;

use super::Error;

/// Accepted dictation word counts
const WORD_COUNTS: [u32; 3] = [12, 18, 24];

/// Maximum words per sentence
pub const MAX_WORDS: usize = 24;

/// Single recovery word
pub type Word = String<12>;

/// Entry mode and accumulated input
#[derive(Clone, Debug)]
pub enum RecoveryMode {
    /// Word-by-word dictation toward a fixed count
    Words {
        expected: u8,
        words: Vec<Word, MAX_WORDS>,
    },
    /// Character-cipher entry, terminated by an explicit done
    Characters { text: Mnemonic },
}

/// In-flight recovery context
#[derive(Clone, Debug)]
pub struct RecoveryFlow {
    pub mode: RecoveryMode,
    pub enforce_wordlist: bool,
    pub passphrase_protection: bool,
    pub language: Option<Language>,
    pub label: Option<Label>,
    pub pending_pin: Option<Pin>,
}

impl RecoveryFlow {
    /// Start word-by-word dictation (12, 18 or 24 words)
    pub fn words(
        word_count: u32,
        passphrase_protection: bool,
        language: Option<&str>,
        label: Option<&str>,
        enforce_wordlist: bool,
    ) -> Result<Self, Error> {
        if !WORD_COUNTS.contains(&word_count) {
            return Err(Error::SyntaxError("Invalid word count"));
        }

        Ok(Self {
            mode: RecoveryMode::Words {
                expected: word_count as u8,
                words: Vec::new(),
            },
            enforce_wordlist,
            passphrase_protection,
            language: language.map(truncated),
            label: label.map(truncated),
            pending_pin: None,
        })
    }

    /// Start character-cipher entry. Wordlist enforcement applies to word
    /// mode only; character input is validated per character and at the
    /// final checksum.
    pub fn characters(
        passphrase_protection: bool,
        language: Option<&str>,
        label: Option<&str>,
    ) -> Self {
        Self {
            mode: RecoveryMode::Characters {
                text: String::new(),
            },
            enforce_wordlist: false,
            passphrase_protection,
            language: language.map(truncated),
            label: label.map(truncated),
            pending_pin: None,
        }
    }

    pub fn is_character_mode(&self) -> bool {
        matches!(self.mode, RecoveryMode::Characters { .. })
    }

    /// Number of words received so far (word mode)
    pub fn words_received(&self) -> usize {
        match &self.mode {
            RecoveryMode::Words { words, .. } => words.len(),
            RecoveryMode::Characters { .. } => 0,
        }
    }

    /// Accept one dictated word; returns the assembled sentence once the
    /// expected count is reached
    pub fn add_word(&mut self, word: &str) -> Result<Option<Mnemonic>, Error> {
        let (expected, words) = match &mut self.mode {
            RecoveryMode::Words { expected, words } => (*expected, words),
            RecoveryMode::Characters { .. } => {
                return Err(Error::UnexpectedMessage("Not in word recovery mode"))
            }
        };

        if word.is_empty() {
            return Err(Error::SyntaxError("No word provided"));
        }

        let w = Word::try_from(word).map_err(|_| Error::SyntaxError("Word too long"))?;
        words
            .push(w)
            .map_err(|_| Error::SyntaxError("Too many words"))?;

        if words.len() < expected as usize {
            return Ok(None);
        }

        let mut sentence = Mnemonic::new();
        for (i, w) in words.iter().enumerate() {
            if i != 0 {
                sentence
                    .push(' ')
                    .map_err(|_| Error::SyntaxError("Mnemonic too long"))?;
            }
            sentence
                .push_str(w)
                .map_err(|_| Error::SyntaxError("Mnemonic too long"))?;
        }

        Ok(Some(sentence))
    }

    /// Append one character (lowercase letter or word separator)
    pub fn add_character(&mut self, c: char) -> Result<(), Error> {
        let text = match &mut self.mode {
            RecoveryMode::Characters { text } => text,
            RecoveryMode::Words { .. } => {
                return Err(Error::UnexpectedMessage("Not in character recovery mode"))
            }
        };

        if !(c.is_ascii_lowercase() || c == ' ') {
            return Err(Error::SyntaxError("Invalid character"));
        }

        text.push(c)
            .map_err(|_| Error::SyntaxError("Too many characters"))
    }

    /// Delete the most recent character, if any
    pub fn delete_character(&mut self) {
        if let RecoveryMode::Characters { text } = &mut self.mode {
            text.pop();
        }
    }

    /// Assemble the character-mode sentence
    pub fn finalize_characters(&self) -> Mnemonic {
        match &self.mode {
            RecoveryMode::Characters { text } => truncated(text.trim_end()),
            RecoveryMode::Words { .. } => Mnemonic::new(),
        }
    }

    /// Cursor position for the next `CharacterRequest`
    pub fn character_positions(&self) -> (u8, u8) {
        match &self.mode {
            RecoveryMode::Characters { text } => {
                let word_pos = text.chars().filter(|c| *c == ' ').count() as u8;
                let character_pos = text
                    .chars()
                    .rev()
                    .take_while(|c| *c != ' ')
                    .count() as u8;
                (word_pos, character_pos)
            }
            RecoveryMode::Words { .. } => (0, 0),
        }
    }
}
