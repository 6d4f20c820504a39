// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! SQLite-backed read/write contracts used by the engine.
//!
//! Functions take `&Connection` so they compose inside a caller-owned
//! `Transaction` (which derefs to a connection).

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use rust_decimal::Decimal;

use crate::errors::BillingError;
use crate::models::{
    CandidateRef, Client, Frequency, Invoice, InvoiceStatus, ItemSpec, LineItem, NewInvoice,
    Profile, RecurringTemplate, ReminderCandidate, ReminderKind, ReminderLogEntry, ReminderPolicy,
    Totals,
};

type StoreResult<T> = Result<T, BillingError>;

/// Opens a write transaction up front so number allocation and insert are
/// serialized against other writers.
pub fn begin_immediate(conn: &Connection) -> StoreResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

fn dec(raw: &str, field: &str) -> StoreResult<Decimal> {
    raw.parse::<Decimal>()
        .map_err(|_| BillingError::InvalidData(format!("invalid {} '{}'", field, raw)))
}

fn offsets_from_json(raw: &str) -> StoreResult<Vec<i64>> {
    serde_json::from_str(raw)
        .map_err(|e| BillingError::InvalidData(format!("invalid offsets '{}': {}", raw, e)))
}

fn offsets_to_json(offsets: &[i64]) -> StoreResult<String> {
    serde_json::to_string(offsets)
        .map_err(|e| BillingError::InvalidData(format!("cannot encode offsets: {}", e)))
}

// ---------------------------------------------------------------------------
// Clients and profiles

pub fn insert_client(
    conn: &Connection,
    owner_id: &str,
    name: &str,
    email: Option<&str>,
) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO clients(owner_id, name, email) VALUES (?1, ?2, ?3)",
        params![owner_id, name, email],
    )?;
    Ok(conn.last_insert_rowid())
}

fn client_from_row(r: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: r.get(0)?,
        owner_id: r.get(1)?,
        name: r.get(2)?,
        email: r.get(3)?,
    })
}

pub fn list_clients(conn: &Connection, owner_id: &str) -> StoreResult<Vec<Client>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, name, email FROM clients WHERE owner_id=?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![owner_id], client_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn get_client(conn: &Connection, owner_id: &str, client_id: i64) -> StoreResult<Option<Client>> {
    Ok(conn
        .query_row(
            "SELECT id, owner_id, name, email FROM clients WHERE owner_id=?1 AND id=?2",
            params![owner_id, client_id],
            client_from_row,
        )
        .optional()?)
}

pub fn find_client_by_name(
    conn: &Connection,
    owner_id: &str,
    name: &str,
) -> StoreResult<Option<Client>> {
    Ok(conn
        .query_row(
            "SELECT id, owner_id, name, email FROM clients WHERE owner_id=?1 AND name=?2",
            params![owner_id, name],
            client_from_row,
        )
        .optional()?)
}

pub fn upsert_profile(conn: &Connection, profile: &Profile) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO profiles(owner_id, full_name, email, company_name, company_email)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(owner_id) DO UPDATE SET
            full_name=excluded.full_name,
            email=excluded.email,
            company_name=excluded.company_name,
            company_email=excluded.company_email,
            updated_at=datetime('now')",
        params![
            profile.owner_id,
            profile.full_name,
            profile.email,
            profile.company_name,
            profile.company_email
        ],
    )?;
    Ok(())
}

pub fn get_profile(conn: &Connection, owner_id: &str) -> StoreResult<Option<Profile>> {
    Ok(conn
        .query_row(
            "SELECT owner_id, full_name, email, company_name, company_email
             FROM profiles WHERE owner_id=?1",
            params![owner_id],
            |r| {
                Ok(Profile {
                    owner_id: r.get(0)?,
                    full_name: r.get(1)?,
                    email: r.get(2)?,
                    company_name: r.get(3)?,
                    company_email: r.get(4)?,
                })
            },
        )
        .optional()?)
}

// ---------------------------------------------------------------------------
// Recurring templates

const TEMPLATE_COLUMNS: &str = "id, owner_id, client_id, frequency, start_date, end_date, \
     next_generation_date, is_active, invoice_number_prefix, payment_terms, tax_rate, \
     currency, notes";

struct TemplateRow {
    id: i64,
    owner_id: String,
    client_id: i64,
    frequency: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    next_generation_date: NaiveDate,
    is_active: bool,
    invoice_number_prefix: String,
    payment_terms: i64,
    tax_rate: String,
    currency: String,
    notes: Option<String>,
}

fn template_row(r: &Row<'_>) -> rusqlite::Result<TemplateRow> {
    Ok(TemplateRow {
        id: r.get(0)?,
        owner_id: r.get(1)?,
        client_id: r.get(2)?,
        frequency: r.get(3)?,
        start_date: r.get(4)?,
        end_date: r.get(5)?,
        next_generation_date: r.get(6)?,
        is_active: r.get(7)?,
        invoice_number_prefix: r.get(8)?,
        payment_terms: r.get(9)?,
        tax_rate: r.get(10)?,
        currency: r.get(11)?,
        notes: r.get(12)?,
    })
}

fn load_template_items(conn: &Connection, template_id: i64) -> StoreResult<Vec<ItemSpec>> {
    let mut stmt = conn.prepare_cached(
        "SELECT description, quantity, rate FROM recurring_template_items
         WHERE template_id=?1 ORDER BY sort_order, id",
    )?;
    let mut rows = stmt.query(params![template_id])?;
    let mut items = Vec::new();
    while let Some(r) = rows.next()? {
        let quantity: String = r.get(1)?;
        let rate: String = r.get(2)?;
        items.push(ItemSpec {
            description: r.get(0)?,
            quantity: dec(&quantity, "quantity")?,
            rate: dec(&rate, "rate")?,
        });
    }
    Ok(items)
}

fn hydrate_template(conn: &Connection, row: TemplateRow) -> StoreResult<RecurringTemplate> {
    let frequency = row
        .frequency
        .parse::<Frequency>()
        .map_err(|e| BillingError::InvalidData(e.to_string()))?;
    Ok(RecurringTemplate {
        items: load_template_items(conn, row.id)?,
        id: row.id,
        owner_id: row.owner_id,
        client_id: row.client_id,
        frequency,
        start_date: row.start_date,
        end_date: row.end_date,
        next_generation_date: row.next_generation_date,
        is_active: row.is_active,
        invoice_number_prefix: row.invoice_number_prefix,
        payment_terms: row.payment_terms,
        tax_rate: dec(&row.tax_rate, "tax_rate")?,
        currency: row.currency,
        notes: row.notes,
    })
}

fn query_templates(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> StoreResult<Vec<RecurringTemplate>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, template_row)?;
    let mut raw = Vec::new();
    for row in rows {
        raw.push(row?);
    }
    raw.into_iter().map(|r| hydrate_template(conn, r)).collect()
}

/// Inserts a template and its items; the `id` field of `template` is ignored.
pub fn insert_template(conn: &Connection, template: &RecurringTemplate) -> StoreResult<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO recurring_templates(owner_id, client_id, frequency, start_date, end_date,
            next_generation_date, is_active, invoice_number_prefix, payment_terms, tax_rate,
            currency, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            template.owner_id,
            template.client_id,
            template.frequency.as_str(),
            template.start_date,
            template.end_date,
            template.next_generation_date,
            template.is_active,
            template.invoice_number_prefix,
            template.payment_terms,
            template.tax_rate.to_string(),
            template.currency,
            template.notes,
        ],
    )?;
    let id = tx.last_insert_rowid();
    for (idx, item) in template.items.iter().enumerate() {
        tx.execute(
            "INSERT INTO recurring_template_items(template_id, description, quantity, rate, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                item.description,
                item.quantity.to_string(),
                item.rate.to_string(),
                idx as i64
            ],
        )?;
    }
    tx.commit()?;
    Ok(id)
}

pub fn get_template(
    conn: &Connection,
    template_id: i64,
    owner_id: &str,
) -> StoreResult<Option<RecurringTemplate>> {
    let sql = format!(
        "SELECT {} FROM recurring_templates WHERE id=?1 AND owner_id=?2",
        TEMPLATE_COLUMNS
    );
    let mut found = query_templates(conn, &sql, &[&template_id, &owner_id])?;
    Ok(found.pop())
}

pub fn list_templates(conn: &Connection, owner_id: &str) -> StoreResult<Vec<RecurringTemplate>> {
    let sql = format!(
        "SELECT {} FROM recurring_templates WHERE owner_id=?1 ORDER BY next_generation_date, id",
        TEMPLATE_COLUMNS
    );
    query_templates(conn, &sql, &[&owner_id])
}

/// `(id, owner_id)` of templates due on `today`: active, anchor reached, and
/// not past their end. Rows are hydrated one at a time by the caller so a
/// corrupt template fails on its own.
pub fn find_due_template_ids(conn: &Connection, today: NaiveDate) -> StoreResult<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id FROM recurring_templates
         WHERE is_active=1 AND next_generation_date<=?1 AND (end_date IS NULL OR end_date>=?1)
         ORDER BY owner_id, id",
    )?;
    let rows = stmt.query_map(params![today], |r| Ok((r.get(0)?, r.get(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Compare-and-set on the anchor: returns false when another run already
/// moved it, in which case the caller must roll back.
pub fn advance_template(
    conn: &Connection,
    template_id: i64,
    previous: NaiveDate,
    next: NaiveDate,
) -> StoreResult<bool> {
    let n = conn.execute(
        "UPDATE recurring_templates SET next_generation_date=?3
         WHERE id=?1 AND next_generation_date=?2",
        params![template_id, previous, next],
    )?;
    Ok(n == 1)
}

pub fn set_template_active(
    conn: &Connection,
    template_id: i64,
    owner_id: &str,
    active: bool,
) -> StoreResult<bool> {
    let n = conn.execute(
        "UPDATE recurring_templates SET is_active=?3 WHERE id=?1 AND owner_id=?2",
        params![template_id, owner_id, active],
    )?;
    Ok(n == 1)
}

/// Invoices produced by the template survive; their link is cleared.
pub fn delete_template(conn: &Connection, template_id: i64, owner_id: &str) -> StoreResult<bool> {
    let n = conn.execute(
        "DELETE FROM recurring_templates WHERE id=?1 AND owner_id=?2",
        params![template_id, owner_id],
    )?;
    Ok(n == 1)
}

// ---------------------------------------------------------------------------
// Invoices

const INVOICE_COLUMNS: &str = "i.id, i.owner_id, i.client_id, i.invoice_number, i.issue_date, \
     i.due_date, i.status, i.currency, i.subtotal, i.tax_rate, i.tax_amount, i.discount, i.total, \
     i.notes, i.payment_terms, i.recurring_template_id, i.last_reminder_sent_at, i.reminder_count";

struct InvoiceRow {
    id: i64,
    owner_id: String,
    client_id: Option<i64>,
    invoice_number: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    status: String,
    currency: String,
    subtotal: String,
    tax_rate: String,
    tax_amount: String,
    discount: String,
    total: String,
    notes: Option<String>,
    payment_terms: Option<String>,
    recurring_template_id: Option<i64>,
    last_reminder_sent_at: Option<DateTime<Utc>>,
    reminder_count: i64,
}

fn invoice_row(r: &Row<'_>) -> rusqlite::Result<InvoiceRow> {
    Ok(InvoiceRow {
        id: r.get(0)?,
        owner_id: r.get(1)?,
        client_id: r.get(2)?,
        invoice_number: r.get(3)?,
        issue_date: r.get(4)?,
        due_date: r.get(5)?,
        status: r.get(6)?,
        currency: r.get(7)?,
        subtotal: r.get(8)?,
        tax_rate: r.get(9)?,
        tax_amount: r.get(10)?,
        discount: r.get(11)?,
        total: r.get(12)?,
        notes: r.get(13)?,
        payment_terms: r.get(14)?,
        recurring_template_id: r.get(15)?,
        last_reminder_sent_at: r.get(16)?,
        reminder_count: r.get(17)?,
    })
}

fn load_invoice_items(conn: &Connection, invoice_id: i64) -> StoreResult<Vec<LineItem>> {
    let mut stmt = conn.prepare_cached(
        "SELECT description, quantity, rate, amount, sort_order FROM invoice_items
         WHERE invoice_id=?1 ORDER BY sort_order, id",
    )?;
    let mut rows = stmt.query(params![invoice_id])?;
    let mut items = Vec::new();
    while let Some(r) = rows.next()? {
        let quantity: String = r.get(1)?;
        let rate: String = r.get(2)?;
        let amount: String = r.get(3)?;
        items.push(LineItem {
            description: r.get(0)?,
            quantity: dec(&quantity, "quantity")?,
            rate: dec(&rate, "rate")?,
            amount: dec(&amount, "amount")?,
            sort_order: r.get(4)?,
        });
    }
    Ok(items)
}

fn hydrate_invoice(conn: &Connection, row: InvoiceRow) -> StoreResult<Invoice> {
    let status = row
        .status
        .parse::<InvoiceStatus>()
        .map_err(|e| BillingError::InvalidData(e.to_string()))?;
    Ok(Invoice {
        items: load_invoice_items(conn, row.id)?,
        id: row.id,
        owner_id: row.owner_id,
        client_id: row.client_id,
        invoice_number: row.invoice_number,
        issue_date: row.issue_date,
        due_date: row.due_date,
        status,
        currency: row.currency,
        subtotal: dec(&row.subtotal, "subtotal")?,
        tax_rate: dec(&row.tax_rate, "tax_rate")?,
        tax_amount: dec(&row.tax_amount, "tax_amount")?,
        discount: dec(&row.discount, "discount")?,
        total: dec(&row.total, "total")?,
        notes: row.notes,
        payment_terms: row.payment_terms,
        recurring_template_id: row.recurring_template_id,
        last_reminder_sent_at: row.last_reminder_sent_at,
        reminder_count: row.reminder_count,
    })
}

fn insert_items(conn: &Connection, invoice_id: i64, items: &[LineItem]) -> StoreResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO invoice_items(invoice_id, description, quantity, rate, amount, sort_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for item in items {
        stmt.execute(params![
            invoice_id,
            item.description,
            item.quantity.to_string(),
            item.rate.to_string(),
            item.amount.to_string(),
            item.sort_order
        ])?;
    }
    Ok(())
}

/// Most recently created invoice number for `owner_id` starting with `prefix`.
pub fn find_latest_invoice_number(
    conn: &Connection,
    owner_id: &str,
    prefix: &str,
) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT invoice_number FROM invoices
             WHERE owner_id=?1 AND substr(invoice_number, 1, length(?2))=?2
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![owner_id, prefix],
            |r| r.get(0),
        )
        .optional()?)
}

/// Inserts the invoice (as `draft`) and its items. Not transactional on its
/// own; run it inside the caller's transaction.
pub fn insert_invoice(conn: &Connection, invoice: &NewInvoice) -> StoreResult<i64> {
    let t = &invoice.totals;
    conn.execute(
        "INSERT INTO invoices(owner_id, client_id, invoice_number, issue_date, due_date, status,
            currency, subtotal, tax_rate, tax_amount, discount, total, notes, payment_terms,
            recurring_template_id)
         VALUES (?1, ?2, ?3, ?4, ?5, 'draft', ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            invoice.owner_id,
            invoice.client_id,
            invoice.invoice_number,
            invoice.issue_date,
            invoice.due_date,
            invoice.currency,
            t.subtotal.to_string(),
            t.tax_rate.to_string(),
            t.tax_amount.to_string(),
            t.discount.to_string(),
            t.total.to_string(),
            invoice.notes,
            invoice.payment_terms,
            invoice.recurring_template_id,
        ],
    )?;
    let id = conn.last_insert_rowid();
    insert_items(conn, id, &invoice.items)?;
    Ok(id)
}

/// Replaces all line items and the derived totals in one transaction.
pub fn replace_invoice_items(
    conn: &Connection,
    invoice_id: i64,
    items: &[LineItem],
    totals: &Totals,
) -> StoreResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM invoice_items WHERE invoice_id=?1", params![invoice_id])?;
    insert_items(&tx, invoice_id, items)?;
    tx.execute(
        "UPDATE invoices SET subtotal=?2, tax_rate=?3, tax_amount=?4, discount=?5, total=?6,
            updated_at=datetime('now')
         WHERE id=?1",
        params![
            invoice_id,
            totals.subtotal.to_string(),
            totals.tax_rate.to_string(),
            totals.tax_amount.to_string(),
            totals.discount.to_string(),
            totals.total.to_string()
        ],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn get_invoice(conn: &Connection, invoice_id: i64, owner_id: &str) -> StoreResult<Option<Invoice>> {
    let sql = format!(
        "SELECT {} FROM invoices i WHERE i.id=?1 AND i.owner_id=?2",
        INVOICE_COLUMNS
    );
    let row = conn
        .query_row(&sql, params![invoice_id, owner_id], invoice_row)
        .optional()?;
    row.map(|r| hydrate_invoice(conn, r)).transpose()
}

pub fn find_invoice_by_number(
    conn: &Connection,
    owner_id: &str,
    number: &str,
) -> StoreResult<Option<Invoice>> {
    let sql = format!(
        "SELECT {} FROM invoices i WHERE i.owner_id=?1 AND i.invoice_number=?2",
        INVOICE_COLUMNS
    );
    let row = conn
        .query_row(&sql, params![owner_id, number], invoice_row)
        .optional()?;
    row.map(|r| hydrate_invoice(conn, r)).transpose()
}

pub fn list_invoices(
    conn: &Connection,
    owner_id: &str,
    status: Option<InvoiceStatus>,
) -> StoreResult<Vec<Invoice>> {
    let sql = format!(
        "SELECT {} FROM invoices i WHERE i.owner_id=?1 AND (?2 IS NULL OR i.status=?2)
         ORDER BY i.issue_date DESC, i.id DESC",
        INVOICE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner_id, status.map(|s| s.as_str())], invoice_row)?;
    let mut raw = Vec::new();
    for row in rows {
        raw.push(row?);
    }
    raw.into_iter().map(|r| hydrate_invoice(conn, r)).collect()
}

/// Conditional status write; false when the stored status is no longer `from`.
pub fn update_status(
    conn: &Connection,
    invoice_id: i64,
    owner_id: &str,
    from: InvoiceStatus,
    to: InvoiceStatus,
) -> StoreResult<bool> {
    let n = conn.execute(
        "UPDATE invoices SET status=?4, updated_at=datetime('now')
         WHERE id=?1 AND owner_id=?2 AND status=?3",
        params![invoice_id, owner_id, from.as_str(), to.as_str()],
    )?;
    Ok(n == 1)
}

/// Moves every `draft`/`sent` invoice of `owner_id` due strictly before
/// `today` to `overdue`. Returns the number of invoices changed.
pub fn sweep_overdue(conn: &Connection, owner_id: &str, today: NaiveDate) -> StoreResult<usize> {
    Ok(conn.execute(
        "UPDATE invoices SET status='overdue', updated_at=datetime('now')
         WHERE owner_id=?1 AND due_date<?2 AND status IN ('draft','sent')",
        params![owner_id, today],
    )?)
}

pub fn owners_with_open_invoices(conn: &Connection) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT owner_id FROM invoices WHERE status IN ('draft','sent') ORDER BY owner_id",
    )?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Reminders

/// `sent`/`overdue` invoices that reference a client, ordered by owner and
/// due date. Only identifying columns are read here; see
/// [`load_reminder_candidate`].
pub fn find_reminder_candidate_refs(conn: &Connection) -> StoreResult<Vec<CandidateRef>> {
    let mut stmt = conn.prepare(
        "SELECT i.id, i.owner_id, i.invoice_number
         FROM invoices i JOIN clients c ON c.id=i.client_id
         WHERE i.status IN ('sent','overdue')
         ORDER BY i.owner_id, i.due_date, i.id",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(CandidateRef {
            invoice_id: r.get(0)?,
            owner_id: r.get(1)?,
            invoice_number: r.get(2)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Loads one reminder candidate with its client fields. The last-reminder
/// timestamp is the later of the tracking column and the newest log entry.
/// Returns `None` once the invoice is no longer `sent`/`overdue`.
pub fn load_reminder_candidate(
    conn: &Connection,
    invoice_id: i64,
) -> StoreResult<Option<ReminderCandidate>> {
    let sql = format!(
        "SELECT {}, c.name, c.email,
            (SELECT MAX(l.sent_at) FROM reminder_log l WHERE l.invoice_id=i.id)
         FROM invoices i JOIN clients c ON c.id=i.client_id
         WHERE i.id=?1 AND i.status IN ('sent','overdue')",
        INVOICE_COLUMNS
    );
    let raw = conn
        .query_row(&sql, params![invoice_id], |r| {
            Ok((
                invoice_row(r)?,
                r.get::<_, Option<String>>(18)?,
                r.get::<_, Option<String>>(19)?,
                r.get::<_, Option<DateTime<Utc>>>(20)?,
            ))
        })
        .optional()?;
    let Some((row, client_name, client_email, logged_at)) = raw else {
        return Ok(None);
    };
    let mut invoice = hydrate_invoice(conn, row)?;
    invoice.last_reminder_sent_at = match (invoice.last_reminder_sent_at, logged_at) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    Ok(Some(ReminderCandidate {
        invoice,
        client_name,
        client_email: client_email.filter(|e| !e.trim().is_empty()),
    }))
}

fn load_policy(conn: &Connection, owner_id: &str) -> StoreResult<Option<ReminderPolicy>> {
    let row = conn
        .query_row(
            "SELECT days_before_due, days_after_due, subject_template, body_template, is_enabled
             FROM reminder_policies WHERE owner_id=?1",
            params![owner_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, bool>(4)?,
                ))
            },
        )
        .optional()?;
    row.map(|(before, after, subject, body, enabled)| {
        Ok(ReminderPolicy {
            owner_id: owner_id.to_string(),
            days_before_due: offsets_from_json(&before)?,
            days_after_due: offsets_from_json(&after)?,
            subject_template: subject,
            body_template: body,
            is_enabled: enabled,
        })
    })
    .transpose()
}

pub fn save_policy(conn: &Connection, policy: &ReminderPolicy) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO reminder_policies(owner_id, days_before_due, days_after_due,
            subject_template, body_template, is_enabled)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(owner_id) DO UPDATE SET
            days_before_due=excluded.days_before_due,
            days_after_due=excluded.days_after_due,
            subject_template=excluded.subject_template,
            body_template=excluded.body_template,
            is_enabled=excluded.is_enabled,
            updated_at=datetime('now')",
        params![
            policy.owner_id,
            offsets_to_json(&policy.days_before_due)?,
            offsets_to_json(&policy.days_after_due)?,
            policy.subject_template,
            policy.body_template,
            policy.is_enabled
        ],
    )?;
    Ok(())
}

/// Loads the owner's policy, persisting the defaults on first access.
pub fn get_or_create_policy(conn: &Connection, owner_id: &str) -> StoreResult<ReminderPolicy> {
    if let Some(policy) = load_policy(conn, owner_id)? {
        return Ok(policy);
    }
    let policy = ReminderPolicy::defaults(owner_id);
    conn.execute(
        "INSERT OR IGNORE INTO reminder_policies(owner_id, days_before_due, days_after_due,
            subject_template, body_template, is_enabled)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            policy.owner_id,
            offsets_to_json(&policy.days_before_due)?,
            offsets_to_json(&policy.days_after_due)?,
            policy.subject_template,
            policy.body_template,
            policy.is_enabled
        ],
    )?;
    // Another writer may have won the insert race.
    load_policy(conn, owner_id)?.ok_or_else(|| BillingError::NotFound("reminder policy".into()))
}

pub fn append_reminder_log(conn: &Connection, entry: &ReminderLogEntry) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO reminder_log(invoice_id, kind, days_offset, email_to, email_subject,
            sent_on, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.invoice_id,
            entry.kind.as_str(),
            entry.days_offset,
            entry.email_to,
            entry.email_subject,
            entry.sent_on,
            entry.sent_at
        ],
    )?;
    Ok(())
}

pub fn update_reminder_tracking(
    conn: &Connection,
    invoice_id: i64,
    sent_at: DateTime<Utc>,
) -> StoreResult<()> {
    conn.execute(
        "UPDATE invoices SET last_reminder_sent_at=?2, reminder_count=reminder_count+1
         WHERE id=?1",
        params![invoice_id, sent_at],
    )?;
    Ok(())
}

/// Log entry and tracking counters are written together.
pub fn record_reminder(conn: &Connection, entry: &ReminderLogEntry) -> StoreResult<()> {
    let tx = conn.unchecked_transaction()?;
    append_reminder_log(&tx, entry)?;
    update_reminder_tracking(&tx, entry.invoice_id, entry.sent_at)?;
    tx.commit()?;
    Ok(())
}

pub fn list_reminder_log(conn: &Connection, invoice_id: i64) -> StoreResult<Vec<ReminderLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT invoice_id, kind, days_offset, email_to, email_subject, sent_on, sent_at
         FROM reminder_log WHERE invoice_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![invoice_id], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, i64>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, String>(4)?,
            r.get::<_, NaiveDate>(5)?,
            r.get::<_, DateTime<Utc>>(6)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (invoice_id, kind, days_offset, email_to, email_subject, sent_on, sent_at) = row?;
        out.push(ReminderLogEntry {
            invoice_id,
            kind: kind.parse::<ReminderKind>()?,
            days_offset,
            email_to,
            email_subject,
            sent_on,
            sent_at,
        });
    }
    Ok(out)
}
