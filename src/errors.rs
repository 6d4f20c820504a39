// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::models::InvoiceStatus;

/// Errors raised by the billing engine.
///
/// Item-level variants (`Validation`, `NumberingCorruption`, `Transport`,
/// `Render`, `Conflict`) are collected into batch reports; `StoreUnavailable`
/// aborts a whole run.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid status transition from '{from}' to '{to}'")]
    InvalidStatusTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    #[error("invoice number '{number}' does not end in a sequence for prefix '{prefix}'")]
    NumberingCorruption { prefix: String, number: String },

    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("template rendering failed: {0}")]
    Render(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] rusqlite::Error),

    #[error("store error: {0}")]
    Store(#[source] rusqlite::Error),
}

impl BillingError {
    /// Conflicts come from races with another run and are safe to retry on
    /// the next trigger.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::Conflict(_) | BillingError::StoreUnavailable(_)
        )
    }
}

impl From<rusqlite::Error> for BillingError {
    fn from(err: rusqlite::Error) -> Self {
        let (code, extended) = match &err {
            rusqlite::Error::SqliteFailure(e, _) => (Some(e.code), e.extended_code),
            _ => (None, 0),
        };
        if extended == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            return BillingError::Conflict(err.to_string());
        }
        match code {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::SystemIoFailure,
            ) => BillingError::StoreUnavailable(err),
            _ => BillingError::Store(err),
        }
    }
}
