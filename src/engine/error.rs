// Copyright (c) 2026 The Keywarden Project

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// [Engine][super::Engine] failure taxonomy.
///
/// Every failure carries a one-line operator-readable reason alongside the
/// closed wire-level [`FailureCode`]. Gate failures are terminal for the
/// current request; no partial mutation is ever committed on the error path.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum Error {
    /// Operator declined a confirmation, cancelled an entry flow, or sent Cancel
    #[cfg_attr(feature = "thiserror", error("action cancelled: {0}"))]
    ActionCancelled(&'static str),

    /// Malformed, missing or inconsistent request fields
    #[cfg_attr(feature = "thiserror", error("syntax error: {0}"))]
    SyntaxError(&'static str),

    /// Request invalid in the current device state
    #[cfg_attr(feature = "thiserror", error("unexpected message: {0}"))]
    UnexpectedMessage(&'static str),

    /// Request requires an initialized device
    #[cfg_attr(feature = "thiserror", error("device not initialized"))]
    NotInitialized,

    /// Contract-specific failure
    #[cfg_attr(feature = "thiserror", error("{0}"))]
    Other(&'static str),
}

impl Error {
    /// Wire-level failure code
    pub fn code(&self) -> FailureCode {
        match self {
            Error::ActionCancelled(_) => FailureCode::ActionCancelled,
            Error::SyntaxError(_) => FailureCode::SyntaxError,
            Error::UnexpectedMessage(_) => FailureCode::UnexpectedMessage,
            Error::NotInitialized => FailureCode::NotInitialized,
            Error::Other(_) => FailureCode::Other,
        }
    }

    /// Operator-readable one-line reason
    pub fn reason(&self) -> &'static str {
        match self {
            Error::ActionCancelled(r)
            | Error::SyntaxError(r)
            | Error::UnexpectedMessage(r)
            | Error::Other(r) => r,
            Error::NotInitialized => "Device not initialized",
        }
    }
}

/// Closed wire encoding for [`Error`] variants
#[derive(Copy, Clone, Debug, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FailureCode {
    UnexpectedMessage = 1,
    SyntaxError = 3,
    ActionCancelled = 4,
    Other = 9,
    NotInitialized = 11,
}
