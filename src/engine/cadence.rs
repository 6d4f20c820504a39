// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Invoice, ReminderKind, ReminderPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReminderDecision {
    pub kind: ReminderKind,
    pub offset: i64,
}

/// Decides whether `invoice` gets a reminder on `today`.
///
/// At most one reminder per invoice per calendar day: a reminder already
/// sent today suppresses any further decision. Only `sent` and `overdue`
/// invoices are considered.
pub fn evaluate(
    invoice: &Invoice,
    policy: &ReminderPolicy,
    today: NaiveDate,
) -> Option<ReminderDecision> {
    if !invoice.status.is_outstanding() {
        return None;
    }
    if invoice
        .last_reminder_sent_at
        .is_some_and(|at| at.date_naive() == today)
    {
        return None;
    }

    let days_diff = (invoice.due_date - today).num_days();
    if days_diff > 0 && policy.days_before_due.contains(&days_diff) {
        return Some(ReminderDecision {
            kind: ReminderKind::BeforeDue,
            offset: days_diff,
        });
    }
    if days_diff == 0 {
        return Some(ReminderDecision {
            kind: ReminderKind::OnDue,
            offset: 0,
        });
    }
    let overdue_by = days_diff.abs();
    if days_diff < 0 && policy.days_after_due.contains(&overdue_by) {
        return Some(ReminderDecision {
            kind: ReminderKind::AfterDue,
            offset: overdue_by,
        });
    }
    None
}
