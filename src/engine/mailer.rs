// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::Mutex;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::config::MailConfig;
use crate::errors::BillingError;
use crate::utils::http_client;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    /// Display name for the From header; the address comes from the sender.
    pub from_name: Option<String>,
    pub reply_to: Option<String>,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub attachments: Vec<Attachment>,
}

/// Outbound email transport. Returns the provider's message id.
pub trait EmailSender {
    fn send(&self, email: &OutgoingEmail) -> Result<String, BillingError>;
}

/// Sends through a Resend-compatible JSON API.
pub struct HttpMailer {
    client: reqwest::blocking::Client,
    config: MailConfig,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Result<Self, BillingError> {
        let client = http_client().map_err(|e| BillingError::Transport(e.to_string()))?;
        Ok(HttpMailer { client, config })
    }

    fn from_header(&self, email: &OutgoingEmail) -> String {
        match email.from_name.as_ref().or(self.config.from_name.as_ref()) {
            Some(name) => format!("{} <{}>", name, self.config.from_email),
            None => self.config.from_email.clone(),
        }
    }
}

impl EmailSender for HttpMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<String, BillingError> {
        let attachments: Vec<_> = email
            .attachments
            .iter()
            .map(|a| json!({ "filename": a.filename, "content": BASE64.encode(&a.content) }))
            .collect();
        let mut payload = json!({
            "from": self.from_header(email),
            "to": [email.to],
            "subject": email.subject,
            "html": email.html_body,
            "text": email.text_body,
        });
        if !attachments.is_empty() {
            payload["attachments"] = json!(attachments);
        }
        if let Some(reply_to) = &email.reply_to {
            payload["reply_to"] = json!(reply_to);
        }

        let resp = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .map_err(|e| BillingError::Transport(format!("mail API request failed: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(BillingError::Transport(format!(
                "mail API returned {}: {}",
                status,
                body.trim()
            )));
        }
        let parsed: SendResponse = resp
            .json()
            .map_err(|e| BillingError::Transport(format!("unreadable mail API response: {}", e)))?;
        Ok(parsed.id)
    }
}

/// Keeps messages in memory instead of delivering them. Used for dry runs
/// and when no mail API is configured.
#[derive(Debug, Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl EmailSender for OutboxMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<String, BillingError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| BillingError::Transport("outbox lock poisoned".into()))?;
        sent.push(email.clone());
        let id = format!("outbox-{}", sent.len());
        info!(to = %email.to, subject = %email.subject, message_id = %id, "email queued in outbox");
        Ok(id)
    }
}
