// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::{Local, NaiveDate};
use rusqlite::Connection;

use crate::engine::invoices::recompute_totals;
use crate::engine::{numbering, store};
use crate::models::InvoiceStatus;
use crate::utils::pretty_table;

pub fn handle(conn: &Connection) -> Result<()> {
    let rows = diagnose(conn, Local::now().date_naive())?;
    if rows.is_empty() {
        println!("✅ doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}

/// Returns one `[issue, detail]` row per problem found.
pub fn diagnose(conn: &Connection, today: NaiveDate) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();

    let mut stmt = conn.prepare("SELECT DISTINCT owner_id FROM invoices ORDER BY owner_id")?;
    let owners = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    // 1) Stored totals that no longer match their line items
    for owner_id in &owners {
        for invoice in store::list_invoices(conn, owner_id, None)? {
            match recompute_totals(&invoice) {
                Ok(expected)
                    if expected.subtotal != invoice.subtotal
                        || expected.tax_amount != invoice.tax_amount
                        || expected.total != invoice.total =>
                {
                    rows.push(vec![
                        "totals_mismatch".into(),
                        format!(
                            "{} stored {} expected {}",
                            invoice.invoice_number, invoice.total, expected.total
                        ),
                    ]);
                }
                Ok(_) => {}
                Err(err) => rows.push(vec![
                    "totals_mismatch".into(),
                    format!("{}: {}", invoice.invoice_number, err),
                ]),
            }
            // 2) Open invoices the overdue sweep has not caught up with
            if invoice.due_date < today
                && matches!(invoice.status, InvoiceStatus::Draft | InvoiceStatus::Sent)
            {
                rows.push(vec![
                    "overdue_not_swept".into(),
                    format!("{} due {}", invoice.invoice_number, invoice.due_date),
                ]);
            }
        }
    }

    // 3) Templates that cannot allocate their next number, or outlived their end date
    let mut stmt = conn.prepare("SELECT DISTINCT owner_id FROM recurring_templates ORDER BY owner_id")?;
    let template_owners = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for owner_id in &template_owners {
        for t in store::list_templates(conn, owner_id)? {
            let latest =
                store::find_latest_invoice_number(conn, owner_id, &t.invoice_number_prefix)?;
            if let Err(err) = numbering::next_number(latest.as_deref(), &t.invoice_number_prefix) {
                rows.push(vec!["numbering".into(), format!("template {}: {}", t.id, err)]);
            }
            match t.end_date {
                Some(end) if t.is_active && end < today => rows.push(vec![
                    "template_expired".into(),
                    format!("template {} ended {} but is still active", t.id, end),
                ]),
                _ => {}
            }
        }
    }

    // 4) Outstanding invoices whose client cannot receive reminders
    for r in store::find_reminder_candidate_refs(conn)? {
        match store::load_reminder_candidate(conn, r.invoice_id) {
            Ok(Some(c)) if c.client_email.is_none() => rows.push(vec![
                "client_no_email".into(),
                format!(
                    "{} ({})",
                    c.invoice.invoice_number,
                    c.client_name.unwrap_or_default()
                ),
            ]),
            Ok(_) => {}
            Err(err) => rows.push(vec![
                "invalid_data".into(),
                format!("{}: {}", r.invoice_number, err),
            ]),
        }
    }

    Ok(rows)
}
