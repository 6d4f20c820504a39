// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{status, store};
use crate::errors::BillingError;
use crate::models::{Invoice, InvoiceStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Hosted checkout provider.
pub trait PaymentProcessor {
    fn create_checkout_session(&self, invoice: &Invoice) -> Result<CheckoutSession, BillingError>;
}

/// Opens a checkout session for an invoice that is awaiting payment.
pub fn request_checkout(
    conn: &Connection,
    processor: &dyn PaymentProcessor,
    invoice_id: i64,
    owner_id: &str,
) -> Result<CheckoutSession, BillingError> {
    let invoice = store::get_invoice(conn, invoice_id, owner_id)?
        .ok_or_else(|| BillingError::NotFound(format!("invoice {}", invoice_id)))?;
    if !invoice.status.is_outstanding() {
        return Err(BillingError::Validation(format!(
            "invoice {} is {} and cannot be paid",
            invoice.invoice_number, invoice.status
        )));
    }
    if invoice.total <= Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "invoice {} has nothing to pay",
            invoice.invoice_number
        )));
    }
    processor.create_checkout_session(&invoice)
}

/// Payment confirmation callback. Delivered at least once by the provider,
/// so an invoice that is already paid is returned unchanged.
pub fn settle_payment(
    conn: &Connection,
    invoice_id: i64,
    owner_id: &str,
    today: NaiveDate,
) -> Result<Invoice, BillingError> {
    let invoice = store::get_invoice(conn, invoice_id, owner_id)?
        .ok_or_else(|| BillingError::NotFound(format!("invoice {}", invoice_id)))?;
    if invoice.status == InvoiceStatus::Paid {
        info!(invoice_number = %invoice.invoice_number, "payment already recorded");
        return Ok(invoice);
    }
    status::transition(conn, invoice_id, owner_id, InvoiceStatus::Paid, today)
}
