// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::commands::{json_flags, owner};
use crate::engine::store;
use crate::models::Profile;
use crate::utils::{maybe_print_json, pretty_table};

fn opt(sub: &clap::ArgMatches, name: &str) -> Option<String> {
    sub.get_one::<String>(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set", sub)) => {
            let owner_id = owner(sub);
            // Unspecified fields keep their stored value.
            let mut profile = store::get_profile(conn, &owner_id)?.unwrap_or_else(|| Profile {
                owner_id: owner_id.clone(),
                ..Profile::default()
            });
            if let Some(v) = opt(sub, "full_name") {
                profile.full_name = Some(v);
            }
            if let Some(v) = opt(sub, "email") {
                profile.email = Some(v);
            }
            if let Some(v) = opt(sub, "company_name") {
                profile.company_name = Some(v);
            }
            if let Some(v) = opt(sub, "company_email") {
                profile.company_email = Some(v);
            }
            store::upsert_profile(conn, &profile)?;
            println!("Saved sender profile for '{}'", owner_id);
        }
        Some(("show", sub)) => {
            let owner_id = owner(sub);
            let Some(profile) = store::get_profile(conn, &owner_id)? else {
                println!("No sender profile for '{}'", owner_id);
                return Ok(());
            };
            let (json, jsonl) = json_flags(sub);
            if maybe_print_json(json, jsonl, &profile)? {
                return Ok(());
            }
            let rows = vec![
                vec!["Full name".into(), profile.full_name.clone().unwrap_or_default()],
                vec!["Email".into(), profile.email.clone().unwrap_or_default()],
                vec!["Company".into(), profile.company_name.clone().unwrap_or_default()],
                vec!["Company email".into(), profile.company_email.clone().unwrap_or_default()],
                vec!["Sends as".into(), profile.display_name()],
            ];
            println!("{}", pretty_table(&["Field", "Value"], rows));
        }
        _ => {}
    }
    Ok(())
}
