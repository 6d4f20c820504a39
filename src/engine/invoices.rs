// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::info;

use crate::engine::templates::{validate_items, validate_tax_rate};
use crate::engine::{money, numbering, store};
use crate::errors::BillingError;
use crate::models::{Invoice, InvoiceStatus, ItemSpec, NewInvoice, Totals};

/// Input for a manually created invoice.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub owner_id: String,
    pub client_id: Option<i64>,
    /// Explicit number; allocated from `prefix` when absent.
    pub invoice_number: Option<String>,
    pub prefix: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub items: Vec<ItemSpec>,
    pub tax_rate: Decimal,
    pub discount: Decimal,
    pub notes: Option<String>,
    pub payment_terms: Option<String>,
}

/// Prices `items` and checks the discount against subtotal plus tax.
pub fn price(
    items: &[ItemSpec],
    tax_rate: Decimal,
    discount: Decimal,
) -> Result<(Vec<crate::models::LineItem>, Totals), BillingError> {
    validate_items(items)?;
    validate_tax_rate(tax_rate)?;
    if discount.is_sign_negative() {
        return Err(BillingError::Validation("discount cannot be negative".into()));
    }
    let lines = money::price_items(items)?;
    let totals = money::compute_totals(&lines, tax_rate, discount)?;
    if totals.discount > totals.subtotal + totals.tax_amount {
        return Err(BillingError::Validation(format!(
            "discount {} exceeds subtotal plus tax {}",
            totals.discount,
            totals.subtotal + totals.tax_amount
        )));
    }
    Ok((lines, totals))
}

pub fn create_invoice(conn: &Connection, req: InvoiceRequest) -> Result<Invoice, BillingError> {
    if req.due_date < req.issue_date {
        return Err(BillingError::Validation(format!(
            "due date {} is before issue date {}",
            req.due_date, req.issue_date
        )));
    }
    if let Some(client_id) = req.client_id {
        store::get_client(conn, &req.owner_id, client_id)?
            .ok_or_else(|| BillingError::NotFound(format!("client {}", client_id)))?;
    }
    let (items, totals) = price(&req.items, req.tax_rate, req.discount)?;

    let tx = store::begin_immediate(conn)?;
    let invoice_number = match req.invoice_number.map(|n| n.trim().to_string()) {
        Some(n) if !n.is_empty() => n,
        _ => {
            let prefix = req.prefix.as_deref().unwrap_or(numbering::DEFAULT_PREFIX);
            numbering::allocate(&tx, &req.owner_id, prefix)?
        }
    };
    let id = store::insert_invoice(
        &tx,
        &NewInvoice {
            owner_id: req.owner_id.clone(),
            client_id: req.client_id,
            invoice_number,
            issue_date: req.issue_date,
            due_date: req.due_date,
            currency: req.currency.trim().to_uppercase(),
            items,
            totals,
            notes: req.notes,
            payment_terms: req.payment_terms,
            recurring_template_id: None,
        },
    )?;
    tx.commit()?;

    let invoice = store::get_invoice(conn, id, &req.owner_id)?
        .ok_or_else(|| BillingError::NotFound(format!("invoice {}", id)))?;
    info!(invoice_number = %invoice.invoice_number, total = %invoice.total, "invoice created");
    Ok(invoice)
}

/// Replaces the line items of a draft wholesale and recomputes totals,
/// keeping the stored tax rate and discount.
pub fn update_items(
    conn: &Connection,
    invoice_id: i64,
    owner_id: &str,
    items: &[ItemSpec],
) -> Result<Invoice, BillingError> {
    let invoice = store::get_invoice(conn, invoice_id, owner_id)?
        .ok_or_else(|| BillingError::NotFound(format!("invoice {}", invoice_id)))?;
    if invoice.status != InvoiceStatus::Draft {
        return Err(BillingError::Validation(format!(
            "invoice {} is {}; only drafts can be edited",
            invoice.invoice_number, invoice.status
        )));
    }
    let (lines, totals) = price(items, invoice.tax_rate, invoice.discount)?;
    store::replace_invoice_items(conn, invoice_id, &lines, &totals)?;
    store::get_invoice(conn, invoice_id, owner_id)?
        .ok_or_else(|| BillingError::NotFound(format!("invoice {}", invoice_id)))
}

/// Recomputes totals from stored line items; used to audit stored values.
pub fn recompute_totals(invoice: &Invoice) -> Result<Totals, BillingError> {
    let lines = invoice
        .items
        .iter()
        .map(|i| {
            Ok(crate::models::LineItem {
                amount: money::line_amount(i.quantity, i.rate)?,
                ..i.clone()
            })
        })
        .collect::<Result<Vec<_>, BillingError>>()?;
    money::compute_totals(&lines, invoice.tax_rate, invoice.discount)
}
