// Copyright (c) 2026 The Keywarden Project

use super::recovery::RecoveryFlow;
use super::reset::ResetFlow;

/// Exclusive holder for the active multi-step initialization flow.
///
/// At most one reset or recovery context exists at a time; starting a new
/// flow replaces the prior one, and `Cancel`/`Initialize` clear it without
/// committing partial state.
#[derive(Clone, Debug, Default)]
pub enum Flow {
    #[default]
    None,
    Reset(ResetFlow),
    Recovery(RecoveryFlow),
}

impl Flow {
    pub fn clear(&mut self) {
        *self = Flow::None;
    }
}
