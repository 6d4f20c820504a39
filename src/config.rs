// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_MAIL_API_URL: &str = "https://api.resend.com/emails";

/// Credentials for the HTTP email API. Absent when no API key is set.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from_email: String,
    pub from_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: Option<PathBuf>,
    pub mail: Option<MailConfig>,
    pub log_format: LogFormat,
}

impl Config {
    /// Reads `.env` (when present) and the `BILLCYCLE_*` environment.
    pub fn load() -> Result<Config> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mail = match get("BILLCYCLE_MAIL_API_KEY") {
            Some(api_key) => {
                let from_email = get("BILLCYCLE_FROM_EMAIL")
                    .context("BILLCYCLE_FROM_EMAIL must be set when BILLCYCLE_MAIL_API_KEY is")?;
                Some(MailConfig {
                    api_url: get("BILLCYCLE_MAIL_API_URL")
                        .unwrap_or_else(|| DEFAULT_MAIL_API_URL.to_string()),
                    api_key,
                    from_email,
                    from_name: get("BILLCYCLE_FROM_NAME"),
                })
            }
            None => None,
        };

        let log_format = match get("BILLCYCLE_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("text") | None => LogFormat::Text,
            Some(other) => anyhow::bail!("Invalid BILLCYCLE_LOG_FORMAT '{}', expected text|json", other),
        };

        Ok(Config {
            db_path: get("BILLCYCLE_DB").map(PathBuf::from),
            mail,
            log_format,
        })
    }
}

/// Installs the global tracing subscriber. Logs go to stderr so table and
/// JSON output on stdout stay machine-readable.
pub fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = match format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Text => builder.compact().try_init(),
    };
    if let Err(err) = installed {
        eprintln!("tracing already initialised: {}", err);
    }
}
