// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

use crate::config::Config;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Billcycle", "billcycle"));

pub fn db_path(config: &Config) -> Result<PathBuf> {
    if let Some(path) = &config.db_path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        return Ok(path.clone());
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("billcycle.sqlite"))
}

pub fn open_or_init(config: &Config) -> Result<Connection> {
    let path = db_path(config)?;
    let conn =
        Connection::open(&path).with_context(|| format!("Open DB at {}", path.display()))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS profiles(
        owner_id TEXT PRIMARY KEY,
        full_name TEXT,
        email TEXT,
        company_name TEXT,
        company_email TEXT,
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS clients(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        email TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(owner_id, name)
    );

    CREATE TABLE IF NOT EXISTS recurring_templates(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id TEXT NOT NULL,
        client_id INTEGER NOT NULL,
        frequency TEXT NOT NULL CHECK(frequency IN ('weekly','monthly','quarterly','yearly')),
        start_date TEXT NOT NULL,
        end_date TEXT,
        next_generation_date TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        invoice_number_prefix TEXT NOT NULL,
        payment_terms INTEGER NOT NULL,
        tax_rate TEXT NOT NULL DEFAULT '0',
        currency TEXT NOT NULL,
        notes TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(client_id) REFERENCES clients(id)
    );
    CREATE INDEX IF NOT EXISTS idx_templates_next ON recurring_templates(next_generation_date);

    CREATE TABLE IF NOT EXISTS recurring_template_items(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        template_id INTEGER NOT NULL,
        description TEXT NOT NULL,
        quantity TEXT NOT NULL,
        rate TEXT NOT NULL,
        sort_order INTEGER NOT NULL,
        FOREIGN KEY(template_id) REFERENCES recurring_templates(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS invoices(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id TEXT NOT NULL,
        client_id INTEGER,
        invoice_number TEXT NOT NULL,
        issue_date TEXT NOT NULL,
        due_date TEXT NOT NULL,
        status TEXT NOT NULL CHECK(status IN ('draft','sent','paid','overdue','cancelled')),
        currency TEXT NOT NULL,
        subtotal TEXT NOT NULL,
        tax_rate TEXT NOT NULL,
        tax_amount TEXT NOT NULL,
        discount TEXT NOT NULL DEFAULT '0',
        total TEXT NOT NULL,
        notes TEXT,
        payment_terms TEXT,
        recurring_template_id INTEGER,
        last_reminder_sent_at TEXT,
        reminder_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(owner_id, invoice_number),
        FOREIGN KEY(client_id) REFERENCES clients(id) ON DELETE SET NULL,
        FOREIGN KEY(recurring_template_id) REFERENCES recurring_templates(id) ON DELETE SET NULL
    );
    CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);

    CREATE TABLE IF NOT EXISTS invoice_items(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id INTEGER NOT NULL,
        description TEXT NOT NULL,
        quantity TEXT NOT NULL,
        rate TEXT NOT NULL,
        amount TEXT NOT NULL,
        sort_order INTEGER NOT NULL,
        FOREIGN KEY(invoice_id) REFERENCES invoices(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS reminder_policies(
        owner_id TEXT PRIMARY KEY,
        days_before_due TEXT NOT NULL, -- JSON array of day offsets
        days_after_due TEXT NOT NULL,
        subject_template TEXT NOT NULL,
        body_template TEXT NOT NULL,
        is_enabled INTEGER NOT NULL DEFAULT 1,
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- Append-only: rows are never updated or deleted by the engine
    CREATE TABLE IF NOT EXISTS reminder_log(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id INTEGER NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('before_due','on_due','after_due')),
        days_offset INTEGER NOT NULL,
        email_to TEXT NOT NULL,
        email_subject TEXT NOT NULL,
        sent_on TEXT NOT NULL,
        sent_at TEXT NOT NULL,
        FOREIGN KEY(invoice_id) REFERENCES invoices(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_reminder_log_invoice ON reminder_log(invoice_id, sent_on);
    "#,
    )?;
    Ok(())
}
