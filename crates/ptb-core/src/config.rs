use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, retention::RetentionWindow, Result};

/// Typed configuration, loaded once at process start and shared as `Arc<Config>`.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub button_label_max_length: usize,

    // Storage
    pub database_url: String,

    // Carrier
    pub carrier_api_url: String,
    pub carrier_timeout: Duration,

    // Scan cycle
    pub scan_interval: Duration,
    pub retention: RetentionWindow,
}

const DEFAULT_DATABASE_URL: &str = "sqlite://ptb.db?mode=rwc";
const DEFAULT_CARRIER_API_URL: &str = "https://api.belpost.by/api/v1/tracking";

impl Config {
    /// Load from the process environment, after importing `.env` if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = lookup("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let database_url = lookup("DATABASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let carrier_api_url = lookup("BELPOST_API_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_CARRIER_API_URL.to_string());

        let carrier_timeout =
            Duration::from_secs(parse_u64(&lookup, "CARRIER_TIMEOUT_SECS")?.unwrap_or(20));
        let scan_interval =
            Duration::from_secs(parse_u64(&lookup, "SCAN_INTERVAL_SECS")?.unwrap_or(3600));
        if scan_interval.is_zero() {
            return Err(Error::Config(
                "SCAN_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        // RETENTION_DAYS wins over RETENTION_MONTHS when both are set.
        let retention = match parse_u64(&lookup, "RETENTION_DAYS")? {
            Some(days) => RetentionWindow::Days(days),
            None => RetentionWindow::Months(
                parse_u64(&lookup, "RETENTION_MONTHS")?
                    .map(|m| m.min(u32::MAX as u64) as u32)
                    .unwrap_or(4),
            ),
        };

        let button_label_max_length =
            parse_u64(&lookup, "BUTTON_LABEL_MAX_LENGTH")?.unwrap_or(30) as usize;

        Ok(Self {
            telegram_bot_token,
            button_label_max_length,
            database_url,
            carrier_api_url,
            carrier_timeout,
            scan_interval,
            retention,
        })
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|e| Error::Config(format!("{key} must be a non-negative integer: {e}")))
}

/// Import `KEY=value` pairs from a dotenv file. Variables already present in
/// the environment win.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, value) in parse_dotenv(&contents) {
        if env::var_os(&key).is_none() {
            env::set_var(key, value);
        }
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
