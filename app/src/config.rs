use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use common::constant::{DEFAULT_SUPERVISOR_INTERVAL_MS, MIN_SUPERVISOR_INTERVAL_MS};

/// Process configuration pulled from the environment (or `.env`).
///
/// `DATABASE_URL` is the only required variable; everything else has a
/// default or is optional. Validation failures abort startup before any
/// worker or adapter is created.
#[derive(Clone, Debug)]
pub struct EnvConfig {
    pub interval: Duration,
    pub storage_url: String,
    pub slack_hook: Option<String>,
    pub metrics_port: Option<u16>,
}

impl EnvConfig {
    pub fn from_env() -> Result<EnvConfig> {
        let interval = parse_interval(env::var("INTERVAL_MS").ok())?;
        let storage_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow!("DATABASE_URL must be set"))?;
        let slack_hook = env::var("SLACK_HOOK").ok().filter(|hook| !hook.is_empty());
        let metrics_port = parse_port(env::var("METRICS_PORT").ok())?;

        Ok(EnvConfig {
            interval,
            storage_url,
            slack_hook,
            metrics_port,
        })
    }
}

fn parse_interval(raw: Option<String>) -> Result<Duration> {
    let ms = match raw {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow!("INTERVAL_MS {value:?} is not a number"))?,
        None => DEFAULT_SUPERVISOR_INTERVAL_MS,
    };
    if ms < MIN_SUPERVISOR_INTERVAL_MS {
        bail!("INTERVAL_MS must be at least {MIN_SUPERVISOR_INTERVAL_MS}ms, got {ms}");
    }
    Ok(Duration::from_millis(ms))
}

fn parse_port(raw: Option<String>) -> Result<Option<u16>> {
    match raw {
        Some(value) if !value.is_empty() => {
            let port = value
                .trim()
                .parse::<u16>()
                .map_err(|_| anyhow!("METRICS_PORT {value:?} is not a port"))?;
            Ok(Some(port))
        }
        _ => Ok(None),
    }
}
