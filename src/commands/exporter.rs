// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;
use serde_json::json;

use crate::commands::{owner, required};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("invoices", sub)) => export_invoices(conn, sub),
        _ => Ok(()),
    }
}

fn export_invoices(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner_id = owner(sub);
    let fmt = required(sub, "format")?.to_lowercase();
    let out = required(sub, "out")?;

    let mut stmt = conn.prepare(
        "SELECT i.invoice_number, c.name as client, i.issue_date, i.due_date, i.status,
                i.currency, i.subtotal, i.tax_amount, i.discount, i.total
         FROM invoices i
         LEFT JOIN clients c ON i.client_id=c.id
         WHERE i.owner_id=?1
         ORDER BY i.issue_date, i.id",
    )?;
    let rows = stmt.query_map([&owner_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, Option<String>>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, String>(4)?,
            r.get::<_, String>(5)?,
            r.get::<_, String>(6)?,
            r.get::<_, String>(7)?,
            r.get::<_, String>(8)?,
            r.get::<_, String>(9)?,
        ))
    })?;

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "number", "client", "issue_date", "due_date", "status", "currency", "subtotal",
                "tax", "discount", "total",
            ])?;
            for row in rows {
                let (num, client, issued, due, status, ccy, sub_t, tax, disc, total) = row?;
                wtr.write_record([
                    num,
                    client.unwrap_or_default(),
                    issued,
                    due,
                    status,
                    ccy,
                    sub_t,
                    tax,
                    disc,
                    total,
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            let mut items = Vec::new();
            for row in rows {
                let (num, client, issued, due, status, ccy, sub_t, tax, disc, total) = row?;
                items.push(json!({
                    "number": num, "client": client, "issue_date": issued, "due_date": due,
                    "status": status, "currency": ccy, "subtotal": sub_t, "tax": tax,
                    "discount": disc, "total": total
                }));
            }
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        _ => anyhow::bail!("Unknown format: {} (use csv|json)", fmt),
    }
    println!("Exported invoices to {}", out);
    Ok(())
}
