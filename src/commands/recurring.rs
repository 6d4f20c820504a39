// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::info;

use crate::commands::{json_flags, owner, required};
use crate::engine::templates::{self, TemplateRequest};
use crate::engine::{recurring, store};
use crate::models::Frequency;
use crate::utils::{
    fmt_money, get_default_currency, id_for_client, maybe_print_json, parse_date, parse_decimal,
    parse_item, pretty_table, today_or,
};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub),
        Some(("list", sub)) => list(conn, sub),
        Some(("pause", sub)) => {
            let id = template_id(sub)?;
            templates::set_active(conn, id, &owner(sub), false)?;
            println!("Paused recurring template {}", id);
            Ok(())
        }
        Some(("resume", sub)) => {
            let id = template_id(sub)?;
            templates::set_active(conn, id, &owner(sub), true)?;
            println!("Resumed recurring template {}", id);
            Ok(())
        }
        Some(("rm", sub)) => {
            let id = template_id(sub)?;
            templates::delete(conn, id, &owner(sub))?;
            println!("Removed recurring template {}", id);
            Ok(())
        }
        Some(("generate", sub)) => {
            let id = template_id(sub)?;
            let today = today_or(sub.get_one::<String>("today"))?;
            let invoice = recurring::generate_one(conn, id, &owner(sub), today)?;
            println!(
                "Generated invoice {} for {} (due {})",
                invoice.invoice_number,
                fmt_money(&invoice.total, &invoice.currency),
                invoice.due_date
            );
            Ok(())
        }
        Some(("run", sub)) => {
            let today = today_or(sub.get_one::<String>("today"))?;
            let report = recurring::run_due_generation(conn, today)?;
            info!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "recurring run finished"
            );
            let (json, jsonl) = json_flags(sub);
            if maybe_print_json(json, jsonl, &report)? {
                return Ok(());
            }
            println!(
                "Generated {} invoice(s), {} failure(s)",
                report.succeeded.len(),
                report.failed.len()
            );
            if !report.failed.is_empty() {
                let rows = report
                    .failed
                    .iter()
                    .map(|f| {
                        vec![
                            f.template_id.to_string(),
                            f.error.clone(),
                            if f.retryable { "yes" } else { "no" }.to_string(),
                        ]
                    })
                    .collect();
                println!("{}", pretty_table(&["Template", "Error", "Retryable"], rows));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn template_id(sub: &clap::ArgMatches) -> Result<i64> {
    sub.get_one::<i64>("id").copied().context("--id is required")
}

fn add(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner_id = owner(sub);
    let client_id = id_for_client(conn, &owner_id, required(sub, "client")?)?;
    let frequency: Frequency = required(sub, "frequency")?.parse()?;
    let start_date = parse_date(required(sub, "start")?)?;
    let end_date = sub
        .get_one::<String>("end")
        .map(|s| parse_date(s))
        .transpose()?;
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
    let currency = match sub.get_one::<String>("currency") {
        Some(c) => c.to_uppercase(),
        None => get_default_currency(conn)?,
    };

    let template = templates::create_template(
        conn,
        TemplateRequest {
            owner_id,
            client_id,
            frequency,
            start_date,
            end_date,
            invoice_number_prefix: required(sub, "prefix")?.clone(),
            payment_terms: sub.get_one::<i64>("terms").copied().unwrap_or(30),
            tax_rate,
            currency,
            notes: sub.get_one::<String>("notes").cloned(),
            items,
        },
    )?;
    println!(
        "Added {} recurring template {} (first invoice on {})",
        template.frequency, template.id, template.next_generation_date
    );
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let owner_id = owner(sub);
    let list = store::list_templates(conn, &owner_id)?;
    let (json, jsonl) = json_flags(sub);
    if maybe_print_json(json, jsonl, &list)? {
        return Ok(());
    }
    let clients = store::list_clients(conn, &owner_id)?;
    let data = list
        .into_iter()
        .map(|t| {
            let client = clients
                .iter()
                .find(|c| c.id == t.client_id)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            vec![
                t.id.to_string(),
                client,
                t.frequency.to_string(),
                t.next_generation_date.to_string(),
                t.end_date.map(|d| d.to_string()).unwrap_or_default(),
                if t.is_active { "active" } else { "paused" }.to_string(),
                t.items.len().to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Client", "Frequency", "Next", "Ends", "State", "Items"],
            data
        )
    );
    Ok(())
}
