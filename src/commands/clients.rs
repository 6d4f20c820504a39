// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::commands::{json_flags, owner, required};
use crate::engine::store;
use crate::utils::{maybe_print_json, pretty_table};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let owner_id = owner(sub);
            let name = required(sub, "name")?.trim();
            let email = sub
                .get_one::<String>("email")
                .map(|e| e.trim())
                .filter(|e| !e.is_empty());
            if name.is_empty() {
                anyhow::bail!("Client name cannot be empty");
            }
            store::insert_client(conn, &owner_id, name, email)?;
            println!("Added client '{}'", name);
        }
        Some(("list", sub)) => {
            let clients = store::list_clients(conn, &owner(sub))?;
            let (json, jsonl) = json_flags(sub);
            if maybe_print_json(json, jsonl, &clients)? {
                return Ok(());
            }
            let data = clients
                .into_iter()
                .map(|c| vec![c.id.to_string(), c.name, c.email.unwrap_or_default()])
                .collect();
            println!("{}", pretty_table(&["ID", "Name", "Email"], data));
        }
        _ => {}
    }
    Ok(())
}
