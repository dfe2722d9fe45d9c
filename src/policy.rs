// Copyright (c) 2026 The Keywarden Project

//! Optional device policies and policy-gated output compilation.
//!
//! The policy set is closed and fixed at build time; wire-level policy names
//! are matched against [`Policy`] and unknown names are rejected. Enabled
//! bits live in the [`DeviceRecord`][crate::storage::DeviceRecord] and are
//! only toggled through the `ApplyPolicies` flow (confirmation, then PIN,
//! then a single committed mutation).

use heapless::Vec;
use strum::{Display, EnumIter, EnumString};

use crate::engine::Driver;
use crate::storage::DeviceRecord;

/// Number of supported policies
pub const POLICY_COUNT: usize = 1;

/// Closed set of optional device policies
#[derive(Copy, Clone, Debug, PartialEq, EnumString, Display, EnumIter)]
pub enum Policy {
    /// Third-party value-exchange output routing
    ShapeShift = 0,
}

/// One policy table entry, reported verbatim in `Features`
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PolicyEntry {
    pub name: &'static str,
    pub enabled: bool,
}

/// Build-time policy table with factory defaults
pub const POLICY_TABLE: [PolicyEntry; POLICY_COUNT] = [PolicyEntry {
    name: "ShapeShift",
    enabled: false,
}];

/// Destination class for a transaction output
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum OutputAddressType {
    Spend,
    Transfer,
    Exchange,
}

/// Pre-compilation transaction output, payload opaque to the policy layer
#[derive(Clone, Debug, PartialEq)]
pub struct TxOutput<'a> {
    pub address_type: OutputAddressType,
    pub payload: &'a [u8],
}

/// Compiled output bytes, produced by the coin-specific compiler
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledTxOut(pub Vec<u8, 256>);

/// Output compilation failures, one variant per early-exit path
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum OutputError {
    /// Exchange output requested while the ShapeShift policy is disabled
    #[cfg_attr(
        feature = "thiserror",
        error("exchange policy disabled")
    )]
    PolicyDisabled,

    /// Exchange contract negotiation failed
    #[cfg_attr(
        feature = "thiserror",
        error("exchange contract negotiation failed")
    )]
    ExchangeContract,

    /// Coin-specific output compilation failed
    #[cfg_attr(feature = "thiserror", error("output compile failed"))]
    Compile,
}

/// Policy wrapper around output compilation.
///
/// Exchange outputs are only compiled when the ShapeShift policy is enabled
/// and contract negotiation succeeds; a disabled policy fails the whole
/// compilation with a distinct error rather than silently downgrading to a
/// normal output. Successful negotiation already confirmed the destination
/// with the operator, so the duplicate output confirmation is suppressed.
pub fn run_compile_output<D: Driver>(
    drv: &mut D,
    record: &DeviceRecord,
    output: &TxOutput<'_>,
    mut needs_confirm: bool,
) -> Result<CompiledTxOut, OutputError> {
    if output.address_type == OutputAddressType::Exchange {
        if !record.policy_enabled(Policy::ShapeShift) {
            return Err(OutputError::PolicyDisabled);
        }

        if !drv.negotiate_exchange(output, needs_confirm) {
            return Err(OutputError::ExchangeContract);
        }

        needs_confirm = false;
    }

    drv.compile_output(output, needs_confirm)
        .ok_or(OutputError::Compile)
}
