// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, crate_version, value_parser};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print one JSON document per line"),
    )
}

fn today_arg() -> Arg {
    Arg::new("today")
        .long("today")
        .value_name("YYYY-MM-DD")
        .help("Evaluate as of this date instead of the local date")
}

fn dry_run_arg() -> Arg {
    Arg::new("dry_run")
        .long("dry-run")
        .action(ArgAction::SetTrue)
        .help("Queue emails in a local outbox instead of sending them")
}

fn item_arg() -> Arg {
    Arg::new("item")
        .long("item")
        .value_name("DESCRIPTION:QUANTITY:RATE")
        .action(ArgAction::Append)
        .required(true)
        .help("Line item; repeat for several items")
}

fn number_arg() -> Arg {
    Arg::new("number")
        .long("number")
        .required(true)
        .help("Invoice number")
}

fn template_id_arg() -> Arg {
    Arg::new("id")
        .long("id")
        .required(true)
        .value_parser(value_parser!(i64))
        .help("Recurring template id")
}

pub fn build_cli() -> Command {
    Command::new("billcycle")
        .version(crate_version!())
        .about("Recurring invoices, payment reminders, and invoice lifecycle")
        .arg(
            Arg::new("owner")
                .long("owner")
                .global(true)
                .default_value("default")
                .help("Account that owns the invoices"),
        )
        .subcommand(
            Command::new("init")
                .about("Create the database")
                .arg(Arg::new("currency").long("currency").help("Default currency code")),
        )
        .subcommand(
            Command::new("client")
                .about("Manage clients")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(Arg::new("email").long("email")),
                )
                .subcommand(json_flags(Command::new("list"))),
        )
        .subcommand(
            Command::new("profile")
                .about("Sender details used in emails")
                .subcommand(
                    Command::new("set")
                        .arg(Arg::new("full_name").long("full-name"))
                        .arg(Arg::new("email").long("email"))
                        .arg(Arg::new("company_name").long("company-name"))
                        .arg(Arg::new("company_email").long("company-email")),
                )
                .subcommand(json_flags(Command::new("show"))),
        )
        .subcommand(
            Command::new("invoice")
                .about("Create and manage invoices")
                .subcommand(
                    Command::new("new")
                        .arg(Arg::new("client").long("client").help("Client name"))
                        .arg(Arg::new("number").long("number").help("Explicit invoice number"))
                        .arg(
                            Arg::new("prefix")
                                .long("prefix")
                                .conflicts_with("number")
                                .help("Number prefix (default INV-)"),
                        )
                        .arg(Arg::new("issue").long("issue").value_name("YYYY-MM-DD"))
                        .arg(Arg::new("due").long("due").value_name("YYYY-MM-DD"))
                        .arg(
                            Arg::new("terms")
                                .long("terms")
                                .value_parser(value_parser!(i64))
                                .conflicts_with("due")
                                .help("Net payment days, default 30"),
                        )
                        .arg(item_arg())
                        .arg(Arg::new("tax").long("tax").help("Tax rate in percent"))
                        .arg(Arg::new("discount").long("discount"))
                        .arg(Arg::new("currency").long("currency"))
                        .arg(Arg::new("notes").long("notes")),
                )
                .subcommand(
                    json_flags(Command::new("list")).arg(
                        Arg::new("status")
                            .long("status")
                            .help("draft|sent|paid|overdue|cancelled"),
                    ),
                )
                .subcommand(json_flags(Command::new("show")).arg(number_arg()))
                .subcommand(
                    Command::new("status")
                        .arg(number_arg())
                        .arg(Arg::new("to").long("to").required(true))
                        .arg(today_arg()),
                )
                .subcommand(
                    Command::new("send")
                        .arg(number_arg())
                        .arg(today_arg())
                        .arg(dry_run_arg()),
                )
                .subcommand(Command::new("paid").arg(number_arg()).arg(today_arg()))
                .subcommand(
                    Command::new("sweep-overdue").arg(today_arg()).arg(
                        Arg::new("all")
                            .long("all")
                            .action(ArgAction::SetTrue)
                            .help("Sweep every owner"),
                    ),
                ),
        )
        .subcommand(
            Command::new("recurring")
                .about("Recurring invoice templates")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("client").long("client").required(true))
                        .arg(
                            Arg::new("frequency")
                                .long("frequency")
                                .required(true)
                                .help("weekly|monthly|quarterly|yearly"),
                        )
                        .arg(Arg::new("start").long("start").required(true))
                        .arg(Arg::new("end").long("end"))
                        .arg(Arg::new("prefix").long("prefix").default_value("INV-"))
                        .arg(
                            Arg::new("terms")
                                .long("terms")
                                .value_parser(value_parser!(i64))
                                .default_value("30"),
                        )
                        .arg(Arg::new("tax").long("tax"))
                        .arg(Arg::new("currency").long("currency"))
                        .arg(Arg::new("notes").long("notes"))
                        .arg(item_arg()),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(Command::new("pause").arg(template_id_arg()))
                .subcommand(Command::new("resume").arg(template_id_arg()))
                .subcommand(Command::new("rm").arg(template_id_arg()))
                .subcommand(
                    Command::new("generate")
                        .about("Generate the current cycle of one template now")
                        .arg(template_id_arg())
                        .arg(today_arg()),
                )
                .subcommand(
                    json_flags(Command::new("run"))
                        .about("Generate invoices for all due templates")
                        .arg(today_arg()),
                ),
        )
        .subcommand(
            Command::new("reminders")
                .about("Payment reminders")
                .subcommand(json_flags(Command::new("policy")))
                .subcommand(
                    Command::new("set-policy")
                        .arg(Arg::new("before").long("before").help("Days before due, e.g. 7,3,1"))
                        .arg(Arg::new("after").long("after").help("Days after due, e.g. 1,7,14"))
                        .arg(Arg::new("subject").long("subject"))
                        .arg(Arg::new("body").long("body"))
                        .arg(
                            Arg::new("enable")
                                .long("enable")
                                .action(ArgAction::SetTrue)
                                .conflicts_with("disable"),
                        )
                        .arg(Arg::new("disable").long("disable").action(ArgAction::SetTrue)),
                )
                .subcommand(
                    json_flags(Command::new("run"))
                        .about("Send reminders due today")
                        .arg(today_arg())
                        .arg(dry_run_arg()),
                )
                .subcommand(json_flags(Command::new("log")).arg(number_arg())),
        )
        .subcommand(
            Command::new("export").about("Export data").subcommand(
                Command::new("invoices")
                    .arg(
                        Arg::new("format")
                            .long("format")
                            .default_value("csv")
                            .help("csv|json"),
                    )
                    .arg(Arg::new("out").long("out").required(true)),
            ),
        )
        .subcommand(Command::new("doctor").about("Check stored data for inconsistencies"))
}
