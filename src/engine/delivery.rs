// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;

use crate::engine::mailer::{Attachment, EmailSender, OutgoingEmail};
use crate::engine::reminders::html_layout;
use crate::engine::{status, store};
use crate::errors::BillingError;
use crate::models::{Invoice, InvoiceStatus, Profile};
use crate::utils::{fmt_long_date, fmt_money};

/// Renders an invoice document for attachment.
pub trait PdfRenderer {
    fn render(&self, invoice: &Invoice, profile: &Profile, watermark: bool)
    -> Result<Vec<u8>, BillingError>;
}

#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub recipient: String,
    pub invoice: Invoice,
}

fn invoice_text(invoice: &Invoice, client_name: &str, profile: &Profile) -> String {
    let mut lines = vec![
        format!("Hello {},", client_name),
        String::new(),
        format!(
            "Please find invoice {} from {} below.",
            invoice.invoice_number,
            profile.display_name()
        ),
        String::new(),
    ];
    for item in &invoice.items {
        lines.push(format!(
            "  {} x {} @ {} = {}",
            item.description,
            item.quantity,
            item.rate,
            fmt_money(&item.amount, &invoice.currency)
        ));
    }
    lines.push(String::new());
    lines.push(format!("Subtotal: {}", fmt_money(&invoice.subtotal, &invoice.currency)));
    lines.push(format!(
        "Tax ({}%): {}",
        invoice.tax_rate,
        fmt_money(&invoice.tax_amount, &invoice.currency)
    ));
    if !invoice.discount.is_zero() {
        lines.push(format!("Discount: {}", fmt_money(&invoice.discount, &invoice.currency)));
    }
    lines.push(format!("Total: {}", fmt_money(&invoice.total, &invoice.currency)));
    lines.push(format!("Due Date: {}", fmt_long_date(invoice.due_date)));
    lines.join("\n")
}

/// Emails an invoice to its client and promotes a draft to `sent`.
///
/// Already-sent and overdue invoices can be re-sent; their status is left
/// alone. The status only changes after the transport accepted the message.
pub fn send_invoice(
    conn: &Connection,
    mailer: &dyn EmailSender,
    renderer: Option<&dyn PdfRenderer>,
    invoice_id: i64,
    owner_id: &str,
    today: NaiveDate,
) -> Result<DeliveryReceipt, BillingError> {
    let invoice = store::get_invoice(conn, invoice_id, owner_id)?
        .ok_or_else(|| BillingError::NotFound(format!("invoice {}", invoice_id)))?;
    if invoice.status.is_terminal() {
        return Err(BillingError::Validation(format!(
            "invoice {} is {} and cannot be sent",
            invoice.invoice_number, invoice.status
        )));
    }
    let client_id = invoice.client_id.ok_or_else(|| {
        BillingError::Validation(format!("invoice {} has no client", invoice.invoice_number))
    })?;
    let client = store::get_client(conn, owner_id, client_id)?
        .ok_or_else(|| BillingError::NotFound(format!("client {}", client_id)))?;
    let recipient = client
        .email
        .clone()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| {
            BillingError::Validation(format!("client '{}' has no email address", client.name))
        })?;
    let profile = store::get_profile(conn, owner_id)?.unwrap_or_else(|| Profile {
        owner_id: owner_id.to_string(),
        ..Profile::default()
    });

    let attachments = match renderer {
        Some(r) => vec![Attachment {
            filename: format!("invoice-{}.pdf", invoice.invoice_number),
            content: r.render(&invoice, &profile, false)?,
        }],
        None => Vec::new(),
    };
    let text_body = invoice_text(&invoice, &client.name, &profile);
    let email = OutgoingEmail {
        from_name: Some(profile.display_name()),
        reply_to: profile.reply_email(),
        to: recipient.clone(),
        subject: format!(
            "Invoice {} from {}",
            invoice.invoice_number,
            profile.display_name()
        ),
        html_body: html_layout(&format!("Invoice {}", invoice.invoice_number), &text_body, &profile),
        text_body,
        attachments,
    };
    let message_id = mailer.send(&email)?;
    info!(invoice_number = %invoice.invoice_number, to = %recipient, "invoice emailed");

    let invoice = if invoice.status == InvoiceStatus::Draft {
        status::transition(conn, invoice_id, owner_id, InvoiceStatus::Sent, today)?
    } else {
        invoice
    };
    Ok(DeliveryReceipt {
        message_id,
        recipient,
        invoice,
    })
}
