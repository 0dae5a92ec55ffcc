use std::{num::NonZeroUsize, str::FromStr, time::Duration};

use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HISTORY_LIMIT: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(limit) => limit,
    None => panic!("history limit must be non-zero"),
};

pub const DEFAULT_OUTBOX_CAPACITY: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(capacity) => capacity,
    None => panic!("outbox capacity must be non-zero"),
};

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Messages retained per room. `None` keeps everything.
    pub history_limit: Option<NonZeroUsize>,
    /// A session with no inbound frame for this long is treated as disconnected.
    pub idle_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Events queued for a connection before it is considered stuck and dropped.
    pub outbox_capacity: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
            idle_timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(20),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| dotenv::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let defaults = Config::default();

        let port = parse(&lookup, "PORT")?.unwrap_or(defaults.port);
        let history_limit = match parse::<usize>(&lookup, "HISTORY_LIMIT")? {
            Some(n) => NonZeroUsize::new(n),
            None => defaults.history_limit,
        };
        let idle_timeout = parse(&lookup, "IDLE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_timeout);
        let heartbeat_interval = parse(&lookup, "HEARTBEAT_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.heartbeat_interval);

        let outbox_capacity = match parse::<usize>(&lookup, "OUTBOX_CAPACITY")? {
            Some(n) => NonZeroUsize::new(n).ok_or(Error::Config {
                key: "OUTBOX_CAPACITY",
                message: "must be greater than zero".to_owned(),
            })?,
            None => defaults.outbox_capacity,
        };

        if heartbeat_interval.is_zero() {
            return Err(Error::Config {
                key: "HEARTBEAT_INTERVAL_SECS",
                message: "must be greater than zero".to_owned(),
            });
        }
        if idle_timeout <= heartbeat_interval {
            return Err(Error::Config {
                key: "IDLE_TIMEOUT_SECS",
                message: format!(
                    "must be longer than the heartbeat interval ({}s)",
                    heartbeat_interval.as_secs()
                ),
            });
        }

        Ok(Config { port, history_limit, idle_timeout, heartbeat_interval, outbox_capacity })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };

    raw.trim()
        .parse()
        .map(Some)
        .map_err(|err: T::Err| Error::Config { key, message: format!("{raw:?}: {err}") })
}
