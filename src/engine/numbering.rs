// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::Connection;

use crate::engine::store;
use crate::errors::BillingError;

pub const DEFAULT_PREFIX: &str = "INV-";
const SEQUENCE_WIDTH: usize = 4;

/// Number following `latest` under `prefix`: `{prefix}0001` when there is no
/// previous number, otherwise the incremented suffix padded to four digits.
/// The suffix grows past four digits rather than wrapping.
pub fn next_number(latest: Option<&str>, prefix: &str) -> Result<String, BillingError> {
    let Some(latest) = latest else {
        return Ok(format!("{}{:0width$}", prefix, 1, width = SEQUENCE_WIDTH));
    };
    let corrupt = || BillingError::NumberingCorruption {
        prefix: prefix.to_string(),
        number: latest.to_string(),
    };
    let suffix = latest.strip_prefix(prefix).ok_or_else(corrupt)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(corrupt());
    }
    let seq: u64 = suffix.parse().map_err(|_| corrupt())?;
    let next = seq.checked_add(1).ok_or_else(corrupt)?;
    Ok(format!("{}{:0width$}", prefix, next, width = SEQUENCE_WIDTH))
}

/// Reads the owner's latest number for `prefix` and returns its successor.
///
/// This is a read-then-write pattern: call it inside the transaction that
/// inserts the invoice (see `store::begin_immediate`), and rely on the
/// UNIQUE(owner_id, invoice_number) constraint to reject any duplicate.
pub fn allocate(conn: &Connection, owner_id: &str, prefix: &str) -> Result<String, BillingError> {
    let latest = store::find_latest_invoice_number(conn, owner_id, prefix)?;
    next_number(latest.as_deref(), prefix)
}
