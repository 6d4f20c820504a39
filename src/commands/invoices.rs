// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Days;
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::commands::{json_flags, mailer_for, owner, required};
use crate::config::Config;
use crate::engine::invoices::{InvoiceRequest, create_invoice};
use crate::engine::{delivery, payments, status, store};
use crate::models::{Invoice, InvoiceStatus};
use crate::utils::{
    fmt_money, get_default_currency, id_for_client, id_for_invoice, maybe_print_json, parse_date,
    parse_decimal, parse_item, pretty_table, today_or,
};

pub fn handle(conn: &Connection, m: &clap::ArgMatches, config: &Config) -> Result<()> {
    match m.subcommand() {
        Some(("new", sub)) => new_invoice(conn, sub),
        Some(("list", sub)) => list(conn, sub),
        Some(("show", sub)) => show(conn, sub),
        Some(("status", sub)) => {
            let owner_id = owner(sub);
            let id = id_for_invoice(conn, &owner_id, required(sub, "number")?)?;
            let to: InvoiceStatus = required(sub, "to")?.parse()?;
            let today = today_or(sub.get_one::<String>("today"))?;
            let invoice = status::transition(conn, id, &owner_id, to, today)?;
            println!("Invoice {} is now {}", invoice.invoice_number, invoice.status);
            Ok(())
        }
        Some(("send", sub)) => {
            let owner_id = owner(sub);
            let id = id_for_invoice(conn, &owner_id, required(sub, "number")?)?;
            let today = today_or(sub.get_one::<String>("today"))?;
            let mailer = mailer_for(config, sub.get_flag("dry_run"))?;
            let receipt = delivery::send_invoice(conn, mailer.as_ref(), None, id, &owner_id, today)?;
            println!(
                "Sent invoice {} to {} ({}), status {}",
                receipt.invoice.invoice_number,
                receipt.recipient,
                receipt.message_id,
                receipt.invoice.status
            );
            Ok(())
        }
        Some(("paid", sub)) => {
            let owner_id = owner(sub);
            let id = id_for_invoice(conn, &owner_id, required(sub, "number")?)?;
            let today = today_or(sub.get_one::<String>("today"))?;
            let invoice = payments::settle_payment(conn, id, &owner_id, today)?;
            println!(
                "Invoice {} marked paid ({})",
                invoice.invoice_number,
                fmt_money(&invoice.total, &invoice.currency)
            );
            Ok(())
        }
        Some(("sweep-overdue", sub)) => {
            let today = today_or(sub.get_one::<String>("today"))?;
            let n = if sub.get_flag("all") {
                status::sweep_all_overdue(conn, today)?
            } else {
                status::sweep_overdue(conn, &owner(sub), today)?
            };
            println!("Marked {} invoice(s) overdue", n);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn new_invoice(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner_id = owner(sub);
    let client_id = match sub.get_one::<String>("client") {
        Some(name) => Some(id_for_client(conn, &owner_id, name)?),
        None => None,
    };
    let issue_date = match sub.get_one::<String>("issue") {
        Some(s) => parse_date(s)?,
        None => today_or(None)?,
    };
    let terms = sub.get_one::<i64>("terms").copied().unwrap_or(30);
    let due_date = match sub.get_one::<String>("due") {
        Some(s) => parse_date(s)?,
        None => {
            let days = u64::try_from(terms).context("--terms cannot be negative")?;
            issue_date
                .checked_add_days(Days::new(days))
                .context("Due date out of range")?
        }
    };
    let items = sub
        .get_many::<String>("item")
        .into_iter()
        .flatten()
        .map(|s| parse_item(s))
        .collect::<Result<Vec<_>>>()?;
    let tax_rate = match sub.get_one::<String>("tax") {
        Some(s) => parse_decimal(s)?,
        None => Decimal::ZERO,
    };
    let discount = match sub.get_one::<String>("discount") {
        Some(s) => parse_decimal(s)?,
        None => Decimal::ZERO,
    };
    let currency = match sub.get_one::<String>("currency") {
        Some(c) => c.to_uppercase(),
        None => get_default_currency(conn)?,
    };

    let invoice = create_invoice(
        conn,
        InvoiceRequest {
            owner_id,
            client_id,
            invoice_number: sub.get_one::<String>("number").cloned(),
            prefix: sub.get_one::<String>("prefix").cloned(),
            issue_date,
            due_date,
            currency,
            items,
            tax_rate,
            discount,
            notes: sub.get_one::<String>("notes").cloned(),
            payment_terms: Some(format!("Net {}", terms)),
        },
    )?;
    println!(
        "Created invoice {} for {} (due {})",
        invoice.invoice_number,
        fmt_money(&invoice.total, &invoice.currency),
        invoice.due_date
    );
    Ok(())
}

fn client_names(conn: &Connection, owner_id: &str) -> Result<HashMap<i64, String>> {
    Ok(store::list_clients(conn, owner_id)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner_id = owner(sub);
    let status = sub
        .get_one::<String>("status")
        .map(|s| s.parse::<InvoiceStatus>())
        .transpose()?;
    let invoices = store::list_invoices(conn, &owner_id, status)?;
    let (json, jsonl) = json_flags(sub);
    if maybe_print_json(json, jsonl, &invoices)? {
        return Ok(());
    }
    let names = client_names(conn, &owner_id)?;
    let data = invoices
        .iter()
        .map(|inv| {
            vec![
                inv.invoice_number.clone(),
                inv.client_id
                    .and_then(|id| names.get(&id).cloned())
                    .unwrap_or_default(),
                inv.issue_date.to_string(),
                inv.due_date.to_string(),
                inv.status.to_string(),
                fmt_money(&inv.total, &inv.currency),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Number", "Client", "Issued", "Due", "Status", "Total"], data)
    );
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner_id = owner(sub);
    let number = required(sub, "number")?;
    let invoice: Invoice = store::find_invoice_by_number(conn, &owner_id, number.trim())?
        .with_context(|| format!("Invoice '{}' not found", number.trim()))?;
    let (json, jsonl) = json_flags(sub);
    if maybe_print_json(json, jsonl, &invoice)? {
        return Ok(());
    }
    let items = invoice
        .items
        .iter()
        .map(|i| {
            vec![
                i.description.clone(),
                i.quantity.to_string(),
                i.rate.to_string(),
                fmt_money(&i.amount, &invoice.currency),
            ]
        })
        .collect();
    println!(
        "Invoice {} [{}]  issued {}  due {}",
        invoice.invoice_number, invoice.status, invoice.issue_date, invoice.due_date
    );
    println!(
        "{}",
        pretty_table(&["Description", "Qty", "Rate", "Amount"], items)
    );
    let summary = vec![
        vec!["Subtotal".into(), fmt_money(&invoice.subtotal, &invoice.currency)],
        vec![
            format!("Tax ({}%)", invoice.tax_rate),
            fmt_money(&invoice.tax_amount, &invoice.currency),
        ],
        vec!["Discount".into(), fmt_money(&invoice.discount, &invoice.currency)],
        vec!["Total".into(), fmt_money(&invoice.total, &invoice.currency)],
        vec!["Reminders sent".into(), invoice.reminder_count.to_string()],
    ];
    println!("{}", pretty_table(&["", ""], summary));
    Ok(())
}
