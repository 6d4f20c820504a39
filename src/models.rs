// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::BillingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// Statuses that still expect a payment from the client.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Overdue)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(BillingError::Validation(format!(
                "unknown status '{}', expected draft|sent|paid|overdue|cancelled",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(BillingError::Validation(format!(
                "unknown frequency '{}', expected weekly|monthly|quarterly|yearly",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    BeforeDue,
    OnDue,
    AfterDue,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::BeforeDue => "before_due",
            ReminderKind::OnDue => "on_due",
            ReminderKind::AfterDue => "after_due",
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before_due" => Ok(ReminderKind::BeforeDue),
            "on_due" => Ok(ReminderKind::OnDue),
            "after_due" => Ok(ReminderKind::AfterDue),
            other => Err(BillingError::InvalidData(format!(
                "unknown reminder kind '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub email: Option<String>,
}

/// Sender details used when emailing on behalf of an owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub owner_id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub company_email: Option<String>,
}

impl Profile {
    pub fn display_name(&self) -> String {
        self.company_name
            .clone()
            .or_else(|| self.full_name.clone())
            .unwrap_or_else(|| self.owner_id.clone())
    }

    pub fn reply_email(&self) -> Option<String> {
        self.company_email.clone().or_else(|| self.email.clone())
    }
}

/// Description/quantity/rate triple, as stored on recurring templates and
/// accepted when creating invoices. Amounts are computed from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub owner_id: String,
    pub client_id: Option<i64>,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub currency: String,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub payment_terms: Option<String>,
    pub recurring_template_id: Option<i64>,
    pub last_reminder_sent_at: Option<DateTime<Utc>>,
    pub reminder_count: i64,
}

/// Invoice ready to be persisted. New invoices always start as `draft`.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub owner_id: String,
    pub client_id: Option<i64>,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub items: Vec<LineItem>,
    pub totals: Totals,
    pub notes: Option<String>,
    pub payment_terms: Option<String>,
    pub recurring_template_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringTemplate {
    pub id: i64,
    pub owner_id: String,
    pub client_id: i64,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_generation_date: NaiveDate,
    pub is_active: bool,
    pub invoice_number_prefix: String,
    pub payment_terms: i64, // net days
    pub tax_rate: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    pub items: Vec<ItemSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderPolicy {
    pub owner_id: String,
    pub days_before_due: Vec<i64>,
    pub days_after_due: Vec<i64>,
    pub subject_template: String,
    pub body_template: String,
    pub is_enabled: bool,
}

pub const DEFAULT_REMINDER_SUBJECT: &str = "Payment Reminder: Invoice {{invoice_number}}";

pub const DEFAULT_REMINDER_BODY: &str = "Hello {{client_name}},

This is a friendly reminder regarding Invoice {{invoice_number}} dated {{issue_date}}.

Amount Due: {{total}}
Due Date: {{due_date}}

Please submit payment at your earliest convenience.

Thank you for your business!";

impl ReminderPolicy {
    pub fn defaults(owner_id: &str) -> Self {
        ReminderPolicy {
            owner_id: owner_id.to_string(),
            days_before_due: vec![7, 3, 1],
            days_after_due: vec![1, 7, 14],
            subject_template: DEFAULT_REMINDER_SUBJECT.to_string(),
            body_template: DEFAULT_REMINDER_BODY.to_string(),
            is_enabled: true,
        }
    }
}

/// Append-only record of one reminder email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderLogEntry {
    pub invoice_id: i64,
    pub kind: ReminderKind,
    pub days_offset: i64,
    pub email_to: String,
    pub email_subject: String,
    pub sent_on: NaiveDate,
    pub sent_at: DateTime<Utc>,
}

/// Identifies an outstanding invoice before its full row is loaded.
#[derive(Debug, Clone)]
pub struct CandidateRef {
    pub invoice_id: i64,
    pub owner_id: String,
    pub invoice_number: String,
}

/// Outstanding invoice joined with the client fields the reminder flow needs.
#[derive(Debug, Clone)]
pub struct ReminderCandidate {
    pub invoice: Invoice,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
}
