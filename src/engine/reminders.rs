// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Daily payment reminder sweep.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::cadence::{self, ReminderDecision};
use crate::engine::mailer::{EmailSender, OutgoingEmail};
use crate::engine::store;
use crate::errors::BillingError;
use crate::models::{
    CandidateRef, Invoice, Profile, ReminderCandidate, ReminderLogEntry, ReminderPolicy,
};
use crate::utils::{fmt_long_date, fmt_money};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_]+)\s*\}\}").expect("placeholder regex"));

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReminderReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Values substituted into reminder subject/body templates.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub invoice_number: String,
    pub client_name: String,
    pub issue_date: String,
    pub due_date: String,
    pub total: String,
    pub company_name: String,
}

impl TemplateContext {
    pub fn new(invoice: &Invoice, client_name: Option<&str>, profile: &Profile) -> Self {
        TemplateContext {
            invoice_number: invoice.invoice_number.clone(),
            client_name: client_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or("Customer")
                .to_string(),
            issue_date: fmt_long_date(invoice.issue_date),
            due_date: fmt_long_date(invoice.due_date),
            total: fmt_money(&invoice.total, &invoice.currency),
            company_name: profile.display_name(),
        }
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        match key {
            "invoice_number" => Some(&self.invoice_number),
            "client_name" => Some(&self.client_name),
            "issue_date" => Some(&self.issue_date),
            "due_date" => Some(&self.due_date),
            "total" => Some(&self.total),
            "company_name" => Some(&self.company_name),
            _ => None,
        }
    }
}

/// Replaces `{{name}}` placeholders. Unknown names are an error rather than
/// being sent verbatim to a client.
pub fn render_template(template: &str, ctx: &TemplateContext) -> Result<String, BillingError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = ctx.lookup(name.as_str()).ok_or_else(|| {
            BillingError::Render(format!("unknown placeholder '{{{{{}}}}}'", name.as_str()))
        })?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wraps a plain-text body in the reminder email layout.
pub fn html_layout(heading: &str, body: &str, profile: &Profile) -> String {
    let footer_email = profile.reply_email().unwrap_or_default();
    format!(
        r#"<div style="font-family: sans-serif; max-width: 600px; margin: 0 auto;">
  <div style="background: #f8f9fa; padding: 20px; border-radius: 8px; margin-bottom: 20px;">
    <h2 style="margin: 0; color: #1f2937;">{heading}</h2>
  </div>
  <div style="white-space: pre-wrap; line-height: 1.6; color: #374151;">{body}</div>
  <div style="margin-top: 30px; padding-top: 20px; border-top: 1px solid #e5e7eb;">
    <p style="margin: 0; color: #6b7280; font-size: 14px;">{name}<br>{email}</p>
  </div>
</div>"#,
        heading = escape_html(heading),
        body = escape_html(body),
        name = escape_html(&profile.display_name()),
        email = escape_html(&footer_email),
    )
}

pub fn build_reminder_email(
    candidate: &ReminderCandidate,
    email_to: &str,
    policy: &ReminderPolicy,
    profile: &Profile,
) -> Result<OutgoingEmail, BillingError> {
    let ctx = TemplateContext::new(&candidate.invoice, candidate.client_name.as_deref(), profile);
    let subject = render_template(&policy.subject_template, &ctx)?;
    let text_body = render_template(&policy.body_template, &ctx)?;
    Ok(OutgoingEmail {
        from_name: Some(profile.display_name()),
        reply_to: profile.reply_email(),
        to: email_to.to_string(),
        html_body: html_layout("Payment Reminder", &text_body, profile),
        subject,
        text_body,
        attachments: Vec::new(),
    })
}

/// Sends one reminder and records it. The log entry and tracking fields are
/// written only after the transport accepted the message.
#[allow(clippy::too_many_arguments)]
fn dispatch_one(
    conn: &Connection,
    mailer: &dyn EmailSender,
    candidate: &ReminderCandidate,
    email_to: &str,
    decision: ReminderDecision,
    policy: &ReminderPolicy,
    profile: &Profile,
    today: NaiveDate,
) -> Result<String, BillingError> {
    let email = build_reminder_email(candidate, email_to, policy, profile)?;
    let message_id = mailer.send(&email)?;
    let entry = ReminderLogEntry {
        invoice_id: candidate.invoice.id,
        kind: decision.kind,
        days_offset: decision.offset,
        email_to: email_to.to_string(),
        email_subject: email.subject,
        sent_on: today,
        sent_at: today.and_time(Utc::now().time()).and_utc(),
    };
    store::record_reminder(conn, &entry)?;
    Ok(message_id)
}

/// Evaluates every outstanding invoice with a client and sends the
/// reminders due on `today`.
///
/// Failing to list candidates, or losing the store mid-sweep
/// ([`BillingError::StoreUnavailable`]), aborts the sweep with an error.
/// Otherwise every invoice is accounted for as sent, skipped, or failed, and
/// failures carry the invoice number in `errors`. A candidate whose stored
/// row cannot be loaded fails on its own.
pub fn run_reminder_sweep(
    conn: &Connection,
    mailer: &dyn EmailSender,
    today: NaiveDate,
) -> Result<ReminderReport, BillingError> {
    let refs = store::find_reminder_candidate_refs(conn)?;
    let mut by_owner: BTreeMap<String, Vec<CandidateRef>> = BTreeMap::new();
    for r in refs {
        by_owner.entry(r.owner_id.clone()).or_default().push(r);
    }

    let mut report = ReminderReport::default();
    for (owner_id, invoices) in by_owner {
        let policy = match store::get_or_create_policy(conn, &owner_id) {
            Ok(p) => p,
            Err(err @ BillingError::StoreUnavailable(_)) => return Err(abort(err, &report)),
            Err(err) => {
                report.failed += invoices.len();
                report
                    .errors
                    .push(format!("Failed to load reminder policy for {}: {}", owner_id, err));
                continue;
            }
        };
        if !policy.is_enabled {
            debug!(owner_id = %owner_id, count = invoices.len(), "reminders disabled");
            report.skipped += invoices.len();
            continue;
        }
        let profile = match store::get_profile(conn, &owner_id) {
            Ok(Some(p)) => p,
            Ok(None) => {
                warn!(owner_id = %owner_id, "no sender profile, skipping reminders");
                report.skipped += invoices.len();
                continue;
            }
            Err(err @ BillingError::StoreUnavailable(_)) => return Err(abort(err, &report)),
            Err(err) => {
                report.failed += invoices.len();
                report
                    .errors
                    .push(format!("Failed to load sender profile for {}: {}", owner_id, err));
                continue;
            }
        };

        for r in &invoices {
            let candidate = match store::load_reminder_candidate(conn, r.invoice_id) {
                Ok(Some(c)) => c,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(err @ BillingError::StoreUnavailable(_)) => return Err(abort(err, &report)),
                Err(err) => {
                    warn!(invoice_number = %r.invoice_number, error = %err, "cannot load invoice");
                    report.failed += 1;
                    report.errors.push(format!(
                        "Failed to load invoice {}: {}",
                        r.invoice_number, err
                    ));
                    continue;
                }
            };
            let Some(email_to) = candidate.client_email.as_deref() else {
                report.skipped += 1;
                continue;
            };
            let Some(decision) = cadence::evaluate(&candidate.invoice, &policy, today) else {
                report.skipped += 1;
                continue;
            };
            match dispatch_one(
                conn, mailer, &candidate, email_to, decision, &policy, &profile, today,
            ) {
                Ok(message_id) => {
                    info!(
                        invoice_number = %candidate.invoice.invoice_number,
                        kind = %decision.kind,
                        offset = decision.offset,
                        message_id = %message_id,
                        "payment reminder sent"
                    );
                    report.sent += 1;
                }
                Err(err @ BillingError::StoreUnavailable(_)) => return Err(abort(err, &report)),
                Err(err) => {
                    warn!(
                        invoice_number = %candidate.invoice.invoice_number,
                        error = %err,
                        "payment reminder failed"
                    );
                    report.failed += 1;
                    report.errors.push(format!(
                        "Failed to send reminder for invoice {}: {}",
                        candidate.invoice.invoice_number, err
                    ));
                }
            }
        }
    }
    Ok(report)
}

fn abort(err: BillingError, report: &ReminderReport) -> BillingError {
    error!(sent = report.sent, error = %err, "store unavailable, aborting reminder sweep");
    err
}
