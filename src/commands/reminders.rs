// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::commands::{json_flags, mailer_for, owner, required};
use crate::config::Config;
use crate::engine::{reminders, store};
use crate::utils::{id_for_invoice, maybe_print_json, parse_offsets, pretty_table, today_or};

fn join(offsets: &[i64]) -> String {
    offsets
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches, config: &Config) -> Result<()> {
    match m.subcommand() {
        Some(("policy", sub)) => {
            let policy = store::get_or_create_policy(conn, &owner(sub))?;
            let (json, jsonl) = json_flags(sub);
            if maybe_print_json(json, jsonl, &policy)? {
                return Ok(());
            }
            let rows = vec![
                vec![
                    "Enabled".into(),
                    if policy.is_enabled { "yes" } else { "no" }.to_string(),
                ],
                vec!["Days before due".into(), join(&policy.days_before_due)],
                vec!["Days after due".into(), join(&policy.days_after_due)],
                vec!["Subject".into(), policy.subject_template.clone()],
                vec!["Body".into(), policy.body_template.clone()],
            ];
            println!("{}", pretty_table(&["Setting", "Value"], rows));
        }
        Some(("set-policy", sub)) => {
            let owner_id = owner(sub);
            let mut policy = store::get_or_create_policy(conn, &owner_id)?;
            if let Some(s) = sub.get_one::<String>("before") {
                policy.days_before_due = parse_offsets(s)?;
            }
            if let Some(s) = sub.get_one::<String>("after") {
                policy.days_after_due = parse_offsets(s)?;
            }
            if let Some(s) = sub.get_one::<String>("subject") {
                policy.subject_template = s.clone();
            }
            if let Some(s) = sub.get_one::<String>("body") {
                policy.body_template = s.clone();
            }
            if sub.get_flag("enable") {
                policy.is_enabled = true;
            }
            if sub.get_flag("disable") {
                policy.is_enabled = false;
            }
            store::save_policy(conn, &policy)?;
            println!("Saved reminder policy for '{}'", owner_id);
        }
        Some(("run", sub)) => {
            let today = today_or(sub.get_one::<String>("today"))?;
            let mailer = mailer_for(config, sub.get_flag("dry_run"))?;
            let report = reminders::run_reminder_sweep(conn, mailer.as_ref(), today)?;
            info!(
                sent = report.sent,
                skipped = report.skipped,
                failed = report.failed,
                "reminder sweep finished"
            );
            for err in &report.errors {
                warn!("{}", err);
            }
            let (json, jsonl) = json_flags(sub);
            if maybe_print_json(json, jsonl, &report)? {
                return Ok(());
            }
            println!(
                "Reminders: {} sent, {} skipped, {} failed",
                report.sent, report.skipped, report.failed
            );
        }
        Some(("log", sub)) => {
            let id = id_for_invoice(conn, &owner(sub), required(sub, "number")?)?;
            let log = store::list_reminder_log(conn, id)?;
            let (json, jsonl) = json_flags(sub);
            if maybe_print_json(json, jsonl, &log)? {
                return Ok(());
            }
            let rows = log
                .into_iter()
                .map(|e| {
                    vec![
                        e.sent_at.format("%Y-%m-%d %H:%M").to_string(),
                        e.kind.to_string(),
                        e.days_offset.to_string(),
                        e.email_to,
                        e.email_subject,
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["Sent", "Kind", "Days", "To", "Subject"], rows)
            );
        }
        _ => {}
    }
    Ok(())
}
