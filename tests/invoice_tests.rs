// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use billcycle::db;
use billcycle::engine::delivery::{PdfRenderer, send_invoice};
use billcycle::engine::invoices::{InvoiceRequest, create_invoice, recompute_totals, update_items};
use billcycle::engine::mailer::OutboxMailer;
use billcycle::engine::payments::{
    CheckoutSession, PaymentProcessor, request_checkout, settle_payment,
};
use billcycle::engine::{status, store};
use billcycle::errors::BillingError;
use billcycle::models::{Invoice, InvoiceStatus, ItemSpec, Profile};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn item(desc: &str, qty: &str, rate: &str) -> ItemSpec {
    ItemSpec {
        description: desc.into(),
        quantity: d(qty),
        rate: d(rate),
    }
}

fn setup() -> (Connection, i64) {
    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    let client = store::insert_client(&conn, "alice", "Acme Corp", Some("ap@acme.test")).unwrap();
    (conn, client)
}

fn request(client_id: Option<i64>) -> InvoiceRequest {
    InvoiceRequest {
        owner_id: "alice".into(),
        client_id,
        invoice_number: None,
        prefix: None,
        issue_date: date("2025-04-01"),
        due_date: date("2025-05-01"),
        currency: "EUR".into(),
        items: vec![item("Workshop", "2", "450"), item("Travel", "1", "120.40")],
        tax_rate: d("19"),
        discount: d("20"),
        notes: None,
        payment_terms: Some("Net 30".into()),
    }
}

struct StaticPdf;

impl PdfRenderer for StaticPdf {
    fn render(
        &self,
        invoice: &Invoice,
        _profile: &Profile,
        watermark: bool,
    ) -> Result<Vec<u8>, BillingError> {
        assert!(!watermark);
        Ok(format!("%PDF {}", invoice.invoice_number).into_bytes())
    }
}

struct FakeCheckout;

impl PaymentProcessor for FakeCheckout {
    fn create_checkout_session(&self, invoice: &Invoice) -> Result<CheckoutSession, BillingError> {
        Ok(CheckoutSession {
            id: format!("cs_{}", invoice.id),
            url: format!("https://pay.test/{}", invoice.invoice_number),
        })
    }
}

#[test]
fn create_prices_and_stores_items() {
    let (conn, client) = setup();
    let inv = create_invoice(&conn, request(Some(client))).unwrap();
    assert_eq!(inv.status, InvoiceStatus::Draft);
    assert_eq!(inv.subtotal, d("1020.40"));
    assert_eq!(inv.tax_amount, d("193.88"));
    assert_eq!(inv.total, d("1194.28"));
    assert_eq!(inv.items.len(), 2);
    assert_eq!(inv.items[0].description, "Workshop");
    assert_eq!(recompute_totals(&inv).unwrap().total, inv.total);
}

#[test]
fn create_rejects_invalid_input() {
    let (conn, client) = setup();

    let mut backwards = request(Some(client));
    backwards.due_date = date("2025-03-01");
    assert!(matches!(
        create_invoice(&conn, backwards).unwrap_err(),
        BillingError::Validation(_)
    ));

    let mut negative = request(Some(client));
    negative.items = vec![item("Refund", "-1", "10")];
    assert!(create_invoice(&conn, negative).is_err());

    let mut too_generous = request(Some(client));
    too_generous.discount = d("5000");
    assert!(create_invoice(&conn, too_generous).is_err());

    assert!(matches!(
        create_invoice(&conn, request(Some(client + 50))).unwrap_err(),
        BillingError::NotFound(_)
    ));
    assert!(store::list_invoices(&conn, "alice", None).unwrap().is_empty());
}

#[test]
fn amounts_beyond_decimal_range_are_rejected() {
    let (conn, client) = setup();
    let mut huge = request(Some(client));
    huge.items = vec![item("Everything", "79228162514264337593543950335", "2")];
    let err = create_invoice(&conn, huge).unwrap_err();
    assert!(matches!(err, BillingError::Validation(ref msg) if msg == "amount out of range"));
    assert!(store::list_invoices(&conn, "alice", None).unwrap().is_empty());

    let inv = create_invoice(&conn, request(Some(client))).unwrap();
    let err = update_items(
        &conn,
        inv.id,
        "alice",
        &[item("Everything", "79228162514264337593543950335", "2")],
    )
    .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
    let stored = store::get_invoice(&conn, inv.id, "alice").unwrap().unwrap();
    assert_eq!(stored.total, d("1194.28"));
}

#[test]
fn only_drafts_can_be_edited() {
    let (conn, client) = setup();
    let inv = create_invoice(&conn, request(Some(client))).unwrap();
    let edited = update_items(&conn, inv.id, "alice", &[item("Workshop", "1", "450")]).unwrap();
    assert_eq!(edited.items.len(), 1);
    assert_eq!(edited.subtotal, d("450.00"));
    assert_eq!(edited.tax_amount, d("85.50"));
    assert_eq!(edited.total, d("515.50"));

    status::transition(&conn, inv.id, "alice", InvoiceStatus::Sent, date("2025-04-02")).unwrap();
    let err = update_items(&conn, inv.id, "alice", &[item("x", "1", "1")]).unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
}

#[test]
fn sending_attaches_pdf_and_promotes_draft() {
    let (conn, client) = setup();
    let inv = create_invoice(&conn, request(Some(client))).unwrap();
    let outbox = OutboxMailer::new();

    let pdf: &dyn PdfRenderer = &StaticPdf;
    let receipt = send_invoice(&conn, &outbox, Some(pdf), inv.id, "alice", date("2025-04-02")).unwrap();
    assert_eq!(receipt.recipient, "ap@acme.test");
    assert_eq!(receipt.invoice.status, InvoiceStatus::Sent);

    let messages = outbox.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].attachments[0].filename, "invoice-INV-0001.pdf");
    assert!(messages[0].text_body.contains("Total: EUR 1194.28"));

    // Re-sending keeps the status.
    let again = send_invoice(&conn, &outbox, None, inv.id, "alice", date("2025-04-03")).unwrap();
    assert_eq!(again.invoice.status, InvoiceStatus::Sent);
}

#[test]
fn sending_requires_an_emailable_client() {
    let (conn, _) = setup();
    let no_mail = store::insert_client(&conn, "alice", "Walk-in", None).unwrap();
    let inv = create_invoice(&conn, request(Some(no_mail))).unwrap();
    let outbox = OutboxMailer::new();
    let err = send_invoice(&conn, &outbox, None, inv.id, "alice", date("2025-04-02")).unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
    let stored = store::get_invoice(&conn, inv.id, "alice").unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Draft);
    assert!(outbox.messages().is_empty());
}

#[test]
fn checkout_and_settlement() {
    let (conn, client) = setup();
    let inv = create_invoice(&conn, request(Some(client))).unwrap();

    // Drafts are not payable yet.
    assert!(request_checkout(&conn, &FakeCheckout, inv.id, "alice").is_err());

    status::transition(&conn, inv.id, "alice", InvoiceStatus::Sent, date("2025-04-02")).unwrap();
    let session = request_checkout(&conn, &FakeCheckout, inv.id, "alice").unwrap();
    assert_eq!(session.url, "https://pay.test/INV-0001");

    let paid = settle_payment(&conn, inv.id, "alice", date("2025-04-10")).unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    // Duplicate provider callback.
    let again = settle_payment(&conn, inv.id, "alice", date("2025-04-10")).unwrap();
    assert_eq!(again.status, InvoiceStatus::Paid);
    assert!(request_checkout(&conn, &FakeCheckout, inv.id, "alice").is_err());
}
