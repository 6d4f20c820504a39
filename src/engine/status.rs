// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;

use crate::engine::store;
use crate::errors::BillingError;
use crate::models::{Invoice, InvoiceStatus};

use InvoiceStatus::*;

/// Checks whether `current -> requested` is a legal move.
///
/// `sent -> overdue` is normally applied by [`sweep_overdue`]; when asked
/// for explicitly it is only allowed once the due date has passed.
pub fn check_transition(
    current: InvoiceStatus,
    requested: InvoiceStatus,
    due_date: NaiveDate,
    today: NaiveDate,
) -> Result<(), BillingError> {
    let allowed = match (current, requested) {
        (Draft, Sent) => true,
        (Sent, Paid) | (Overdue, Paid) => true,
        (Sent, Overdue) => due_date < today,
        (Draft | Sent | Overdue, Cancelled) => true,
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(BillingError::InvalidStatusTransition {
            from: current,
            to: requested,
        })
    }
}

/// Applies a requested status change to a stored invoice.
pub fn transition(
    conn: &Connection,
    invoice_id: i64,
    owner_id: &str,
    requested: InvoiceStatus,
    today: NaiveDate,
) -> Result<Invoice, BillingError> {
    let invoice = store::get_invoice(conn, invoice_id, owner_id)?
        .ok_or_else(|| BillingError::NotFound(format!("invoice {}", invoice_id)))?;
    check_transition(invoice.status, requested, invoice.due_date, today)?;
    if !store::update_status(conn, invoice_id, owner_id, invoice.status, requested)? {
        return Err(BillingError::Conflict(format!(
            "invoice {} changed status concurrently",
            invoice.invoice_number
        )));
    }
    info!(
        invoice_number = %invoice.invoice_number,
        from = %invoice.status,
        to = %requested,
        "invoice status changed"
    );
    store::get_invoice(conn, invoice_id, owner_id)?
        .ok_or_else(|| BillingError::NotFound(format!("invoice {}", invoice_id)))
}

/// Marks the owner's unpaid invoices past their due date as overdue.
/// Re-running it on a consistent store changes nothing.
pub fn sweep_overdue(
    conn: &Connection,
    owner_id: &str,
    today: NaiveDate,
) -> Result<usize, BillingError> {
    let changed = store::sweep_overdue(conn, owner_id, today)?;
    if changed > 0 {
        info!(owner_id, changed, %today, "invoices marked overdue");
    }
    Ok(changed)
}

/// Runs [`sweep_overdue`] for every owner with open invoices.
pub fn sweep_all_overdue(conn: &Connection, today: NaiveDate) -> Result<usize, BillingError> {
    let mut changed = 0;
    for owner in store::owners_with_open_invoices(conn)? {
        changed += sweep_overdue(conn, &owner, today)?;
    }
    Ok(changed)
}
