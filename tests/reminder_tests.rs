// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use billcycle::db;
use billcycle::engine::invoices::{InvoiceRequest, create_invoice};
use billcycle::engine::mailer::{EmailSender, OutboxMailer, OutgoingEmail};
use billcycle::engine::reminders::{TemplateContext, render_template, run_reminder_sweep};
use billcycle::engine::{status, store};
use billcycle::errors::BillingError;
use billcycle::models::{Invoice, InvoiceStatus, ItemSpec, Profile, ReminderKind};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::time::Duration;
use tempfile::tempdir;

struct FailingMailer;

impl EmailSender for FailingMailer {
    fn send(&self, _email: &OutgoingEmail) -> Result<String, BillingError> {
        Err(BillingError::Transport("connection refused".into()))
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    seed(&conn);
    conn
}

fn seed(conn: &Connection) {
    db::init_schema(conn).unwrap();
    store::upsert_profile(
        conn,
        &Profile {
            owner_id: "alice".into(),
            full_name: Some("Alice Smith".into()),
            email: Some("alice@studio.test".into()),
            company_name: Some("Smith Studio".into()),
            company_email: None,
        },
    )
    .unwrap();
}

fn sent_invoice(conn: &Connection, client: &str, email: Option<&str>, due: &str) -> Invoice {
    let client_id = store::insert_client(conn, "alice", client, email).unwrap();
    let inv = create_invoice(
        conn,
        InvoiceRequest {
            owner_id: "alice".into(),
            client_id: Some(client_id),
            invoice_number: None,
            prefix: None,
            issue_date: date("2025-02-08"),
            due_date: date(due),
            currency: "USD".into(),
            items: vec![ItemSpec {
                description: "Design work".into(),
                quantity: Decimal::ONE,
                rate: Decimal::ONE_HUNDRED,
            }],
            tax_rate: Decimal::ZERO,
            discount: Decimal::ZERO,
            notes: None,
            payment_terms: None,
        },
    )
    .unwrap();
    status::transition(conn, inv.id, "alice", InvoiceStatus::Sent, date("2025-02-08")).unwrap()
}

#[test]
fn sends_rendered_reminder_and_records_it() {
    let conn = setup();
    let inv = sent_invoice(&conn, "Acme Corp", Some("ap@acme.test"), "2025-03-10");
    let outbox = OutboxMailer::new();

    let report = run_reminder_sweep(&conn, &outbox, date("2025-03-07")).unwrap();
    assert_eq!((report.sent, report.skipped, report.failed), (1, 0, 0));

    let messages = outbox.messages();
    assert_eq!(messages.len(), 1);
    let email = &messages[0];
    assert_eq!(email.to, "ap@acme.test");
    assert_eq!(email.subject, "Payment Reminder: Invoice INV-0001");
    assert!(email.text_body.starts_with("Hello Acme Corp,"));
    assert!(email.text_body.contains("dated February 8, 2025"));
    assert!(email.text_body.contains("Amount Due: USD 100.00"));
    assert!(email.text_body.contains("Due Date: March 10, 2025"));
    assert_eq!(email.from_name.as_deref(), Some("Smith Studio"));
    assert_eq!(email.reply_to.as_deref(), Some("alice@studio.test"));

    let log = store::list_reminder_log(&conn, inv.id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, ReminderKind::BeforeDue);
    assert_eq!(log[0].days_offset, 3);
    assert_eq!(log[0].sent_on, date("2025-03-07"));

    let stored = store::get_invoice(&conn, inv.id, "alice").unwrap().unwrap();
    assert_eq!(stored.reminder_count, 1);
    assert_eq!(
        stored.last_reminder_sent_at.map(|t| t.date_naive()),
        Some(date("2025-03-07"))
    );
}

#[test]
fn same_day_rerun_sends_nothing() {
    let conn = setup();
    sent_invoice(&conn, "Acme Corp", Some("ap@acme.test"), "2025-03-10");
    let outbox = OutboxMailer::new();
    run_reminder_sweep(&conn, &outbox, date("2025-03-10")).unwrap();
    let again = run_reminder_sweep(&conn, &outbox, date("2025-03-10")).unwrap();
    assert_eq!((again.sent, again.skipped), (0, 1));
    assert_eq!(outbox.messages().len(), 1);
}

#[test]
fn transport_failure_is_reported_and_not_logged() {
    let conn = setup();
    let inv = sent_invoice(&conn, "Acme Corp", Some("ap@acme.test"), "2025-03-10");
    let report = run_reminder_sweep(&conn, &FailingMailer, date("2025-03-10")).unwrap();
    assert_eq!((report.sent, report.failed), (0, 1));
    assert!(
        report.errors[0].starts_with("Failed to send reminder for invoice INV-0001:"),
        "{}",
        report.errors[0]
    );
    assert!(store::list_reminder_log(&conn, inv.id).unwrap().is_empty());

    // Nothing was recorded, so the next sweep retries.
    let outbox = OutboxMailer::new();
    let retry = run_reminder_sweep(&conn, &outbox, date("2025-03-10")).unwrap();
    assert_eq!(retry.sent, 1);
}

#[test]
fn clients_without_email_are_skipped() {
    let conn = setup();
    sent_invoice(&conn, "Walk-in", None, "2025-03-10");
    sent_invoice(&conn, "Acme Corp", Some("ap@acme.test"), "2025-03-10");
    let outbox = OutboxMailer::new();
    let report = run_reminder_sweep(&conn, &outbox, date("2025-03-10")).unwrap();
    assert_eq!((report.sent, report.skipped), (1, 1));
}

#[test]
fn disabled_policy_skips_the_owner() {
    let conn = setup();
    sent_invoice(&conn, "Acme Corp", Some("ap@acme.test"), "2025-03-10");
    let mut policy = store::get_or_create_policy(&conn, "alice").unwrap();
    policy.is_enabled = false;
    store::save_policy(&conn, &policy).unwrap();

    let outbox = OutboxMailer::new();
    let report = run_reminder_sweep(&conn, &outbox, date("2025-03-10")).unwrap();
    assert_eq!((report.sent, report.skipped), (0, 1));
    assert!(outbox.messages().is_empty());
}

#[test]
fn unknown_placeholder_fails_the_invoice() {
    let conn = setup();
    sent_invoice(&conn, "Acme Corp", Some("ap@acme.test"), "2025-03-10");
    let mut policy = store::get_or_create_policy(&conn, "alice").unwrap();
    policy.subject_template = "Pay {{amount_due}} now".into();
    store::save_policy(&conn, &policy).unwrap();

    let outbox = OutboxMailer::new();
    let report = run_reminder_sweep(&conn, &outbox, date("2025-03-10")).unwrap();
    assert_eq!(report.failed, 1);
    assert!(report.errors[0].contains("amount_due"));
    assert!(outbox.messages().is_empty());
}

#[test]
fn policy_defaults_are_created_once() {
    let conn = setup();
    let first = store::get_or_create_policy(&conn, "alice").unwrap();
    assert_eq!(first.days_before_due, vec![7, 3, 1]);
    assert_eq!(first.days_after_due, vec![1, 7, 14]);
    assert!(first.is_enabled);
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM reminder_policies", [], |r| r.get(0))
        .unwrap();
    store::get_or_create_policy(&conn, "alice").unwrap();
    let again: i64 = conn
        .query_row("SELECT COUNT(*) FROM reminder_policies", [], |r| r.get(0))
        .unwrap();
    assert_eq!((count, again), (1, 1));
}

#[test]
fn render_falls_back_to_customer() {
    let conn = setup();
    let inv = sent_invoice(&conn, "Acme Corp", Some("ap@acme.test"), "2025-03-10");
    let profile = store::get_profile(&conn, "alice").unwrap().unwrap();
    let ctx = TemplateContext::new(&inv, None, &profile);
    assert_eq!(
        render_template("Hi {{ client_name }}, from {{company_name}}", &ctx).unwrap(),
        "Hi Customer, from Smith Studio"
    );
}

#[test]
fn corrupt_invoice_row_fails_alone() {
    let conn = setup();
    let broken = sent_invoice(&conn, "Acme Corp", Some("ap@acme.test"), "2025-03-10");
    sent_invoice(&conn, "Globex", Some("billing@globex.test"), "2025-03-10");
    conn.execute("UPDATE invoices SET total='abc' WHERE id=?1", [broken.id])
        .unwrap();
    let outbox = OutboxMailer::new();

    let report = run_reminder_sweep(&conn, &outbox, date("2025-03-07")).unwrap();
    assert_eq!((report.sent, report.skipped, report.failed), (1, 0, 1));
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("INV-0001"));
    assert!(report.errors[0].contains("total"));
    assert_eq!(outbox.messages()[0].to, "billing@globex.test");
}

#[test]
fn locked_store_aborts_the_sweep() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("billing.db");
    let conn = Connection::open(&path).unwrap();
    seed(&conn);
    let inv = sent_invoice(&conn, "Acme Corp", Some("ap@acme.test"), "2025-03-10");
    store::get_or_create_policy(&conn, "alice").unwrap();

    let other = Connection::open(&path).unwrap();
    other.execute_batch("BEGIN IMMEDIATE").unwrap();
    conn.busy_timeout(Duration::ZERO).unwrap();

    let outbox = OutboxMailer::new();
    let err = run_reminder_sweep(&conn, &outbox, date("2025-03-07")).unwrap_err();
    assert!(matches!(err, BillingError::StoreUnavailable(_)));
    assert!(store::list_reminder_log(&conn, inv.id).unwrap().is_empty());

    // Nothing was recorded, so the next run sends again.
    other.execute_batch("ROLLBACK").unwrap();
    let report = run_reminder_sweep(&conn, &outbox, date("2025-03-07")).unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(store::list_reminder_log(&conn, inv.id).unwrap().len(), 1);
}
