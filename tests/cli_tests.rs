// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use billcycle::commands::{clients, doctor, exporter, invoices, profile, recurring, reminders};
use billcycle::config::{Config, LogFormat};
use billcycle::engine::store;
use billcycle::models::InvoiceStatus;
use billcycle::{cli, db};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;
use tempfile::tempdir;

fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    conn
}

fn offline_config() -> Config {
    Config::from_lookup(|_| None).unwrap()
}

/// Parses `args` and hands the top-level subcommand to the matching handler.
fn run(conn: &Connection, args: &[&str]) {
    let config = offline_config();
    let mut argv = vec!["billcycle"];
    argv.extend_from_slice(args);
    let matches = cli::build_cli().get_matches_from(argv);
    match matches.subcommand() {
        Some(("client", m)) => clients::handle(conn, m).unwrap(),
        Some(("profile", m)) => profile::handle(conn, m).unwrap(),
        Some(("invoice", m)) => invoices::handle(conn, m, &config).unwrap(),
        Some(("recurring", m)) => recurring::handle(conn, m).unwrap(),
        Some(("reminders", m)) => reminders::handle(conn, m, &config).unwrap(),
        Some(("export", m)) => exporter::handle(conn, m).unwrap(),
        other => panic!("unexpected subcommand {:?}", other.map(|(n, _)| n)),
    }
}

fn seed_invoice(conn: &Connection) {
    run(conn, &["client", "add", "--name", "Acme Corp", "--email", "ap@acme.test", "--owner", "alice"]);
    run(
        conn,
        &[
            "invoice", "new", "--owner", "alice", "--client", "Acme Corp", "--issue", "2025-01-01",
            "--terms", "14", "--item", "Design: phase 1:2:150", "--tax", "10", "--currency", "usd",
        ],
    );
}

#[test]
fn invoice_new_send_and_pay() {
    let conn = setup();
    seed_invoice(&conn);

    let inv = store::find_invoice_by_number(&conn, "alice", "INV-0001")
        .unwrap()
        .unwrap();
    assert_eq!(inv.items[0].description, "Design: phase 1");
    assert_eq!(inv.due_date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
    assert_eq!(inv.total, Decimal::from_str("330.00").unwrap());
    assert_eq!(inv.currency, "USD");
    assert_eq!(inv.payment_terms.as_deref(), Some("Net 14"));

    run(&conn, &["invoice", "send", "--owner", "alice", "--number", "INV-0001", "--dry-run", "--today", "2025-01-02"]);
    run(&conn, &["invoice", "paid", "--owner", "alice", "--number", "INV-0001", "--today", "2025-01-10"]);
    let inv = store::get_invoice(&conn, inv.id, "alice").unwrap().unwrap();
    assert_eq!(inv.status, InvoiceStatus::Paid);
}

#[test]
fn default_owner_is_isolated_from_named_owner() {
    let conn = setup();
    seed_invoice(&conn);
    assert!(store::list_invoices(&conn, "default", None).unwrap().is_empty());
    assert!(store::list_clients(&conn, "default").unwrap().is_empty());
}

#[test]
fn export_invoices_to_csv() {
    let conn = setup();
    seed_invoice(&conn);
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("invoices.csv");
    let out_str = out_path.to_string_lossy().to_string();

    run(&conn, &["export", "invoices", "--owner", "alice", "--format", "csv", "--out", &out_str]);

    let contents = std::fs::read_to_string(&out_path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(
        lines.next().unwrap(),
        "number,client,issue_date,due_date,status,currency,subtotal,tax,discount,total"
    );
    assert_eq!(
        lines.next().unwrap(),
        "INV-0001,Acme Corp,2025-01-01,2025-01-15,draft,USD,300.00,30.00,0.00,330.00"
    );
    assert!(lines.next().is_none());
}

#[test]
fn recurring_add_and_run() {
    let conn = setup();
    run(&conn, &["client", "add", "--name", "Globex", "--email", "billing@globex.test"]);
    run(
        &conn,
        &[
            "recurring", "add", "--client", "Globex", "--frequency", "quarterly", "--start",
            "2025-01-31", "--prefix", "GLX-", "--terms", "7", "--item", "Licence:1:99.99",
        ],
    );
    run(&conn, &["recurring", "run", "--today", "2025-02-01"]);

    let invoices = store::list_invoices(&conn, "default", None).unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].invoice_number, "GLX-0001");
    assert_eq!(invoices[0].due_date, NaiveDate::from_ymd_opt(2025, 2, 8).unwrap());

    let templates = store::list_templates(&conn, "default").unwrap();
    assert_eq!(
        templates[0].next_generation_date,
        NaiveDate::from_ymd_opt(2025, 4, 30).unwrap()
    );

    run(&conn, &["recurring", "pause", "--id", &templates[0].id.to_string()]);
    assert!(!store::list_templates(&conn, "default").unwrap()[0].is_active);
}

#[test]
fn reminder_policy_and_dry_run_sweep() {
    let conn = setup();
    seed_invoice(&conn);
    run(&conn, &["profile", "set", "--owner", "alice", "--company-name", "Smith Studio"]);
    run(&conn, &["reminders", "set-policy", "--owner", "alice", "--before", "3,1", "--after", "2"]);
    let policy = store::get_or_create_policy(&conn, "alice").unwrap();
    assert_eq!(policy.days_before_due, vec![3, 1]);
    assert_eq!(policy.days_after_due, vec![2]);

    run(&conn, &["invoice", "status", "--owner", "alice", "--number", "INV-0001", "--to", "sent", "--today", "2025-01-02"]);
    run(&conn, &["reminders", "run", "--dry-run", "--today", "2025-01-12"]);
    let inv = store::find_invoice_by_number(&conn, "alice", "INV-0001")
        .unwrap()
        .unwrap();
    assert_eq!(inv.reminder_count, 1);
    let log = store::list_reminder_log(&conn, inv.id).unwrap();
    assert_eq!(log[0].days_offset, 3);
}

#[test]
fn doctor_flags_tampered_totals_and_stale_status() {
    let conn = setup();
    seed_invoice(&conn);
    conn.execute("UPDATE invoices SET total='999.00'", []).unwrap();
    let rows = doctor::diagnose(&conn, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()).unwrap();
    let kinds: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert!(kinds.contains(&"totals_mismatch"));
    assert!(kinds.contains(&"overdue_not_swept"));
}

#[test]
fn config_reads_mail_and_log_settings() {
    let cfg = Config::from_lookup(|k| match k {
        "BILLCYCLE_MAIL_API_KEY" => Some("re_test".into()),
        "BILLCYCLE_FROM_EMAIL" => Some("billing@studio.test".into()),
        "BILLCYCLE_LOG_FORMAT" => Some("json".into()),
        "BILLCYCLE_DB" => Some("/tmp/billcycle-test.sqlite".into()),
        _ => None,
    })
    .unwrap();
    let mail = cfg.mail.unwrap();
    assert_eq!(mail.api_url, billcycle::config::DEFAULT_MAIL_API_URL);
    assert_eq!(mail.from_email, "billing@studio.test");
    assert_eq!(cfg.log_format, LogFormat::Json);
    assert!(cfg.db_path.is_some());

    assert!(
        Config::from_lookup(|k| (k == "BILLCYCLE_MAIL_API_KEY").then(|| "re_test".to_string()))
            .is_err()
    );
    assert!(Config::from_lookup(|k| (k == "BILLCYCLE_LOG_FORMAT").then(|| "xml".to_string())).is_err());
    assert!(offline_config().mail.is_none());
}
