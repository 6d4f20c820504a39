// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use billcycle::config::{self, Config};
use billcycle::{cli, commands, db, utils};

fn main() -> Result<()> {
    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let config = Config::load()?;
    config::init_tracing(config.log_format);

    let conn = db::open_or_init(&config)?;

    match matches.subcommand() {
        Some(("init", sub)) => {
            if let Some(ccy) = sub.get_one::<String>("currency") {
                utils::set_default_currency(&conn, &ccy.to_uppercase())?;
            }
            println!("Database initialized at {}", db::db_path(&config)?.display());
        }
        Some(("client", sub)) => commands::clients::handle(&conn, sub)?,
        Some(("profile", sub)) => commands::profile::handle(&conn, sub)?,
        Some(("invoice", sub)) => commands::invoices::handle(&conn, sub, &config)?,
        Some(("recurring", sub)) => commands::recurring::handle(&conn, sub)?,
        Some(("reminders", sub)) => commands::reminders::handle(&conn, sub, &config)?,
        Some(("export", sub)) => commands::exporter::handle(&conn, sub)?,
        Some(("doctor", _)) => commands::doctor::handle(&conn)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
