// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;

use crate::models::ItemSpec;

const UA: &str = concat!(
    "billcycle/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/alphavelocity/billcycle)"
);

pub fn http_client() -> Result<reqwest::blocking::Client> {
    let c = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent(UA)
        .build()?;
    Ok(c)
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

/// `--today` override, or the local calendar date.
pub fn today_or(arg: Option<&String>) -> Result<NaiveDate> {
    match arg {
        Some(s) => parse_date(s),
        None => Ok(Local::now().date_naive()),
    }
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

/// Parses `description:quantity:rate`. The description may itself contain
/// colons; quantity and rate are taken from the end.
pub fn parse_item(s: &str) -> Result<ItemSpec> {
    let mut parts = s.rsplitn(3, ':');
    let rate = parts.next();
    let quantity = parts.next();
    let description = parts.next();
    match (description, quantity, rate) {
        (Some(d), Some(q), Some(r)) if !d.trim().is_empty() => Ok(ItemSpec {
            description: d.trim().to_string(),
            quantity: parse_decimal(q)?,
            rate: parse_decimal(r)?,
        }),
        _ => Err(anyhow!(
            "Invalid item '{}', expected DESCRIPTION:QUANTITY:RATE",
            s
        )),
    }
}

/// Parses a comma-separated list of day offsets such as `7,3,1`.
pub fn parse_offsets(s: &str) -> Result<Vec<i64>> {
    let mut out = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let v: i64 = part
            .parse()
            .with_context(|| format!("Invalid day offset '{}'", part))?;
        if v < 1 {
            return Err(anyhow!("Day offsets must be positive, got {}", v));
        }
        if !out.contains(&v) {
            out.push(v);
        }
    }
    Ok(out)
}

pub fn fmt_money(d: &Decimal, ccy: &str) -> String {
    format!("{} {:.2}", ccy, d.round_dp(2))
}

/// e.g. `January 15, 2025`
pub fn fmt_long_date(d: NaiveDate) -> String {
    d.format("%B %-d, %Y").to_string()
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn id_for_client(conn: &Connection, owner_id: &str, name: &str) -> Result<i64> {
    let client = crate::engine::store::find_client_by_name(conn, owner_id, name.trim())?
        .with_context(|| format!("Client '{}' not found", name.trim()))?;
    Ok(client.id)
}

pub fn id_for_invoice(conn: &Connection, owner_id: &str, number: &str) -> Result<i64> {
    let mut stmt =
        conn.prepare("SELECT id FROM invoices WHERE owner_id=?1 AND invoice_number=?2")?;
    let id: i64 = stmt
        .query_row(params![owner_id, number.trim()], |r| r.get(0))
        .with_context(|| format!("Invoice '{}' not found", number.trim()))?;
    Ok(id)
}

pub fn get_default_currency(conn: &Connection) -> Result<String> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key='default_currency'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v.unwrap_or_else(|| "USD".to_string()))
}

pub fn set_default_currency(conn: &Connection, ccy: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES('default_currency', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![ccy],
    )?;
    Ok(())
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        // If v is an array, stream each element; else stream single line
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}
