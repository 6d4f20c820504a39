// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use billcycle::db;
use billcycle::engine::invoices::{InvoiceRequest, create_invoice};
use billcycle::engine::recurring::{generate_one, run_due_generation};
use billcycle::engine::store;
use billcycle::engine::templates::{TemplateRequest, create_template, delete, set_active};
use billcycle::errors::BillingError;
use billcycle::models::{Frequency, InvoiceStatus, ItemSpec, RecurringTemplate};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tempfile::tempdir;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn setup() -> (Connection, i64) {
    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    let client = store::insert_client(&conn, "alice", "Acme Corp", Some("ap@acme.test")).unwrap();
    (conn, client)
}

fn template_req(client_id: i64, start: &str) -> TemplateRequest {
    TemplateRequest {
        owner_id: "alice".into(),
        client_id,
        frequency: Frequency::Monthly,
        start_date: date(start),
        end_date: None,
        invoice_number_prefix: "INV-".into(),
        payment_terms: 30,
        tax_rate: d("10"),
        currency: "usd".into(),
        notes: Some("Monthly retainer".into()),
        items: vec![ItemSpec {
            description: "Support hours".into(),
            quantity: d("2"),
            rate: d("50.00"),
        }],
    }
}

fn reload(conn: &Connection, t: &RecurringTemplate) -> RecurringTemplate {
    store::get_template(conn, t.id, "alice").unwrap().unwrap()
}

#[test]
fn due_template_generates_a_draft_and_advances() {
    let (conn, client) = setup();
    let t = create_template(&conn, template_req(client, "2025-01-15")).unwrap();
    assert_eq!(t.next_generation_date, date("2025-01-15"));

    let report = run_due_generation(&conn, date("2025-01-15")).unwrap();
    assert_eq!(report.succeeded, vec![t.id]);
    assert!(report.failed.is_empty());

    let invoices = store::list_invoices(&conn, "alice", None).unwrap();
    assert_eq!(invoices.len(), 1);
    let inv = &invoices[0];
    assert_eq!(inv.invoice_number, "INV-0001");
    assert_eq!(inv.status, InvoiceStatus::Draft);
    assert_eq!(inv.issue_date, date("2025-01-15"));
    assert_eq!(inv.due_date, date("2025-02-14"));
    assert_eq!(inv.subtotal, d("100.00"));
    assert_eq!(inv.tax_amount, d("10.00"));
    assert_eq!(inv.total, d("110.00"));
    assert_eq!(inv.currency, "USD");
    assert_eq!(inv.client_id, Some(client));
    assert_eq!(inv.recurring_template_id, Some(t.id));
    assert_eq!(inv.payment_terms.as_deref(), Some("Net 30"));
    assert_eq!(inv.items.len(), 1);
    assert_eq!(inv.items[0].amount, d("100.00"));

    assert_eq!(reload(&conn, &t).next_generation_date, date("2025-02-15"));
}

#[test]
fn rerun_on_same_day_generates_nothing() {
    let (conn, client) = setup();
    create_template(&conn, template_req(client, "2025-01-15")).unwrap();
    run_due_generation(&conn, date("2025-01-15")).unwrap();
    let again = run_due_generation(&conn, date("2025-01-15")).unwrap();
    assert!(again.succeeded.is_empty());
    assert!(again.failed.is_empty());
    assert_eq!(store::list_invoices(&conn, "alice", None).unwrap().len(), 1);
}

#[test]
fn missed_cycles_catch_up_one_per_run() {
    let (conn, client) = setup();
    let t = create_template(&conn, template_req(client, "2025-01-15")).unwrap();
    let today = date("2025-03-20");
    for expected_next in ["2025-02-15", "2025-03-15", "2025-04-15"] {
        let report = run_due_generation(&conn, today).unwrap();
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(reload(&conn, &t).next_generation_date, date(expected_next));
    }
    assert!(run_due_generation(&conn, today).unwrap().succeeded.is_empty());

    let numbers: Vec<String> = store::list_invoices(&conn, "alice", None)
        .unwrap()
        .into_iter()
        .map(|i| i.invoice_number)
        .collect();
    assert_eq!(numbers.len(), 3);
    assert!(numbers.contains(&"INV-0003".to_string()));
}

#[test]
fn one_failure_does_not_stop_the_batch() {
    let (conn, client) = setup();
    let mut broken = template_req(client, "2025-01-01");
    broken.invoice_number_prefix = "BAD-".into();
    let broken = create_template(&conn, broken).unwrap();
    let good = create_template(&conn, template_req(client, "2025-01-01")).unwrap();

    // A hand-entered number the allocator cannot continue from.
    let manual = InvoiceRequest {
        owner_id: "alice".into(),
        client_id: Some(client),
        invoice_number: Some("BAD-12X".into()),
        prefix: None,
        issue_date: date("2024-12-01"),
        due_date: date("2024-12-31"),
        currency: "USD".into(),
        items: template_req(client, "2025-01-01").items,
        tax_rate: Decimal::ZERO,
        discount: Decimal::ZERO,
        notes: None,
        payment_terms: None,
    };
    create_invoice(&conn, manual).unwrap();

    let report = run_due_generation(&conn, date("2025-01-01")).unwrap();
    assert_eq!(report.succeeded, vec![good.id]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].template_id, broken.id);
    assert!(!report.failed[0].retryable);
    assert!(report.failed[0].error.contains("BAD-12X"));

    // The failed template keeps its anchor and is retried next run.
    assert_eq!(reload(&conn, &broken).next_generation_date, date("2025-01-01"));
    assert_eq!(reload(&conn, &good).next_generation_date, date("2025-02-01"));
}

#[test]
fn overflowing_template_fails_alone() {
    let (conn, client) = setup();
    let mut huge = template_req(client, "2025-01-01");
    huge.items[0].quantity = d("79228162514264337593543950335");
    let huge = create_template(&conn, huge).unwrap();
    let good = create_template(&conn, template_req(client, "2025-01-01")).unwrap();

    let report = run_due_generation(&conn, date("2025-01-01")).unwrap();
    assert_eq!(report.succeeded, vec![good.id]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].template_id, huge.id);
    assert!(report.failed[0].error.contains("amount out of range"));
    assert_eq!(reload(&conn, &huge).next_generation_date, date("2025-01-01"));
}

#[test]
fn corrupt_template_row_fails_alone() {
    let (conn, client) = setup();
    let broken = create_template(&conn, template_req(client, "2025-01-01")).unwrap();
    let good = create_template(&conn, template_req(client, "2025-01-01")).unwrap();
    conn.execute(
        "UPDATE recurring_templates SET tax_rate='ten' WHERE id=?1",
        [broken.id],
    )
    .unwrap();

    let report = run_due_generation(&conn, date("2025-01-01")).unwrap();
    assert_eq!(report.succeeded, vec![good.id]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].template_id, broken.id);
    assert!(!report.failed[0].retryable);
    assert!(report.failed[0].error.contains("tax_rate"));

    let invoices = store::list_invoices(&conn, "alice", None).unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].recurring_template_id, Some(good.id));
}

#[test]
fn locked_store_aborts_the_run() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("billing.db");
    let conn = Connection::open(&path).unwrap();
    db::init_schema(&conn).unwrap();
    let client = store::insert_client(&conn, "alice", "Acme Corp", Some("ap@acme.test")).unwrap();
    let first = create_template(&conn, template_req(client, "2025-01-01")).unwrap();
    let second = create_template(&conn, template_req(client, "2025-01-01")).unwrap();

    let other = Connection::open(&path).unwrap();
    other.execute_batch("BEGIN IMMEDIATE").unwrap();
    conn.busy_timeout(Duration::ZERO).unwrap();

    let err = run_due_generation(&conn, date("2025-01-01")).unwrap_err();
    assert!(matches!(err, BillingError::StoreUnavailable(_)));

    other.execute_batch("ROLLBACK").unwrap();
    let report = run_due_generation(&conn, date("2025-01-01")).unwrap();
    assert_eq!(report.succeeded, vec![first.id, second.id]);
}

#[test]
fn paused_and_ended_templates_are_not_due() {
    let (conn, client) = setup();
    let paused = create_template(&conn, template_req(client, "2025-01-01")).unwrap();
    set_active(&conn, paused.id, "alice", false).unwrap();
    let mut ended = template_req(client, "2025-01-01");
    ended.end_date = Some(date("2025-01-10"));
    let ended = create_template(&conn, ended).unwrap();
    // The end date is inclusive.
    let mut last_day = template_req(client, "2025-01-01");
    last_day.end_date = Some(date("2025-01-20"));
    let last_day = create_template(&conn, last_day).unwrap();

    let report = run_due_generation(&conn, date("2025-01-20")).unwrap();
    assert_eq!(report.succeeded, vec![last_day.id]);
    assert!(report.failed.is_empty());
    let invoices = store::list_invoices(&conn, "alice", None).unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].recurring_template_id, Some(last_day.id));

    // On demand generation works for a paused template but not past the end date.
    let inv = generate_one(&conn, paused.id, "alice", date("2025-01-20")).unwrap();
    assert_eq!(inv.recurring_template_id, Some(paused.id));
    let err = generate_one(&conn, ended.id, "alice", date("2025-01-20")).unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
}

#[test]
fn template_validation() {
    let (conn, client) = setup();
    let mut no_items = template_req(client, "2025-01-01");
    no_items.items.clear();
    assert!(matches!(
        create_template(&conn, no_items).unwrap_err(),
        BillingError::Validation(_)
    ));

    let mut backwards = template_req(client, "2025-01-01");
    backwards.end_date = Some(date("2024-12-31"));
    assert!(create_template(&conn, backwards).is_err());

    let mut heavy_tax = template_req(client, "2025-01-01");
    heavy_tax.tax_rate = d("120");
    assert!(create_template(&conn, heavy_tax).is_err());

    assert!(matches!(
        create_template(&conn, template_req(client + 99, "2025-01-01")).unwrap_err(),
        BillingError::NotFound(_)
    ));
}

#[test]
fn deleting_a_template_keeps_its_invoices() {
    let (conn, client) = setup();
    let t = create_template(&conn, template_req(client, "2025-01-15")).unwrap();
    run_due_generation(&conn, date("2025-01-15")).unwrap();
    delete(&conn, t.id, "alice").unwrap();

    let invoices = store::list_invoices(&conn, "alice", None).unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].recurring_template_id, None);
    assert!(matches!(
        delete(&conn, t.id, "alice").unwrap_err(),
        BillingError::NotFound(_)
    ));
}
