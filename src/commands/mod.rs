// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use clap::ArgMatches;

use crate::config::Config;
use crate::engine::mailer::{EmailSender, HttpMailer, OutboxMailer};

pub mod clients;
pub mod doctor;
pub mod exporter;
pub mod invoices;
pub mod profile;
pub mod recurring;
pub mod reminders;

/// `--owner`, propagated from the top-level command.
pub(crate) fn owner(m: &ArgMatches) -> String {
    m.get_one::<String>("owner")
        .cloned()
        .unwrap_or_else(|| "default".to_string())
}

pub(crate) fn required<'a>(m: &'a ArgMatches, name: &str) -> Result<&'a String> {
    m.get_one::<String>(name)
        .with_context(|| format!("--{} is required", name.replace('_', "-")))
}

pub(crate) fn json_flags(m: &ArgMatches) -> (bool, bool) {
    (m.get_flag("json"), m.get_flag("jsonl"))
}

/// HTTP delivery when a mail API is configured, otherwise an in-memory outbox.
pub(crate) fn mailer_for(config: &Config, dry_run: bool) -> Result<Box<dyn EmailSender>> {
    match (&config.mail, dry_run) {
        (Some(mail), false) => Ok(Box::new(HttpMailer::new(mail.clone())?)),
        (None, false) => {
            tracing::warn!("no mail API configured; emails are queued in the outbox only");
            Ok(Box::new(OutboxMailer::new()))
        }
        (_, true) => Ok(Box::new(OutboxMailer::new())),
    }
}
