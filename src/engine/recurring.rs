// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Turns due recurring templates into draft invoices.
//!
//! Each template is generated in its own transaction: number allocation,
//! invoice insert and the schedule advance commit together or not at all, so
//! a re-run after a crash either sees the advanced anchor or regenerates the
//! same cycle exactly once.

use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::{money, numbering, schedule, store, templates};
use crate::errors::BillingError;
use crate::models::{Invoice, NewInvoice, RecurringTemplate};

#[derive(Debug, Clone, Serialize)]
pub struct GenerationFailure {
    pub template_id: i64,
    pub error: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub succeeded: Vec<i64>,
    pub failed: Vec<GenerationFailure>,
}

/// Generates one invoice for every template due on `today`.
///
/// Errors for an individual template, including a template row that cannot
/// be loaded, are recorded in the report and the batch continues. Failing to
/// list due templates or losing the store mid-batch
/// ([`BillingError::StoreUnavailable`]) fails the whole run; invoices already
/// committed stay committed and the next run picks up the rest.
pub fn run_due_generation(
    conn: &Connection,
    today: NaiveDate,
) -> Result<GenerationReport, BillingError> {
    let due = store::find_due_template_ids(conn, today)?;
    let mut report = GenerationReport::default();
    for (template_id, owner_id) in &due {
        let result = store::get_template(conn, *template_id, owner_id).and_then(|t| match t {
            Some(template) if is_due(&template, today) => {
                generate_from_template(conn, &template, today).map(Some)
            }
            // Paused, advanced or deleted since the listing.
            _ => Ok(None),
        });
        match result {
            Ok(Some(invoice)) => {
                info!(
                    template_id,
                    owner_id = %owner_id,
                    invoice_number = %invoice.invoice_number,
                    total = %invoice.total,
                    "recurring invoice generated"
                );
                report.succeeded.push(*template_id);
            }
            Ok(None) => debug!(template_id, "template no longer due"),
            Err(err @ BillingError::StoreUnavailable(_)) => {
                error!(
                    template_id,
                    generated = report.succeeded.len(),
                    error = %err,
                    "store unavailable, aborting recurring generation"
                );
                return Err(err);
            }
            Err(err) => {
                warn!(template_id, error = %err, "recurring generation failed");
                report.failed.push(GenerationFailure {
                    template_id: *template_id,
                    retryable: err.is_retryable(),
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}

fn is_due(template: &RecurringTemplate, today: NaiveDate) -> bool {
    template.is_active
        && template.next_generation_date <= today
        && template.end_date.is_none_or(|end| end >= today)
}

/// Generates the current cycle of one template right away. The cycle is
/// consumed: the template's anchor advances exactly as in a scheduled run.
pub fn generate_one(
    conn: &Connection,
    template_id: i64,
    owner_id: &str,
    today: NaiveDate,
) -> Result<Invoice, BillingError> {
    let template = store::get_template(conn, template_id, owner_id)?
        .ok_or_else(|| BillingError::NotFound(format!("recurring template {}", template_id)))?;
    if let Some(end) = template.end_date {
        if end < today {
            return Err(BillingError::Validation(format!(
                "recurring template {} ended on {}",
                template_id, end
            )));
        }
    }
    let invoice = generate_from_template(conn, &template, today)?;
    info!(
        template_id,
        invoice_number = %invoice.invoice_number,
        "recurring invoice generated on demand"
    );
    Ok(invoice)
}

fn generate_from_template(
    conn: &Connection,
    template: &RecurringTemplate,
    today: NaiveDate,
) -> Result<Invoice, BillingError> {
    templates::validate_items(&template.items)?;
    let terms = u64::try_from(template.payment_terms).map_err(|_| {
        BillingError::Validation(format!("negative payment terms {}", template.payment_terms))
    })?;
    let due_date = today
        .checked_add_days(Days::new(terms))
        .ok_or_else(|| BillingError::Validation("due date out of range".into()))?;
    let next_anchor = schedule::next_date(template.next_generation_date, template.frequency)?;

    let items = money::price_items(&template.items)?;
    let totals = money::compute_totals(&items, template.tax_rate, Decimal::ZERO)?;

    let tx = store::begin_immediate(conn)?;
    let invoice_number = numbering::allocate(&tx, &template.owner_id, &template.invoice_number_prefix)?;
    let new_invoice = NewInvoice {
        owner_id: template.owner_id.clone(),
        client_id: Some(template.client_id),
        invoice_number,
        issue_date: today,
        due_date,
        currency: template.currency.clone(),
        items,
        totals,
        notes: template.notes.clone(),
        payment_terms: Some(format!("Net {}", template.payment_terms)),
        recurring_template_id: Some(template.id),
    };
    let invoice_id = store::insert_invoice(&tx, &new_invoice)?;
    if !store::advance_template(&tx, template.id, template.next_generation_date, next_anchor)? {
        // Dropping the transaction rolls back the insert.
        return Err(BillingError::Conflict(format!(
            "recurring template {} was advanced by another run",
            template.id
        )));
    }
    tx.commit()?;

    store::get_invoice(conn, invoice_id, &template.owner_id)?
        .ok_or_else(|| BillingError::NotFound(format!("invoice {}", invoice_id)))
}
