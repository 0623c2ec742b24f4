//! Runtime configuration from environment variables, plus the fixed limits
//! the handlers validate against.
//!
//! Every setting has a default so the server starts with no configuration
//! for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::warn;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 30;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_BIO_LENGTH: usize = 35;
pub const MAX_RELATIONSHIP_STATUS_LENGTH: usize = 40;
pub const MAX_POST_LENGTH: usize = 500;
pub const MAX_COMMENT_LENGTH: usize = 300;
pub const MAX_MESSAGE_LENGTH: usize = 1000;
pub const MAX_IMAGE_REF_LENGTH: usize = 300;
pub const MIN_AGE: u32 = 18;
pub const MAX_SEARCH_RESULTS: usize = 20;

pub const SESSION_COOKIE: &str = "session";
/// Upper bound for `HEARTH_SESSION_HOURS`: one year.
pub const MAX_SESSION_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct Config {
    /// Native listen address.
    /// Env: `HEARTH_BIND_ADDR`, default `0.0.0.0:3000`.
    pub bind_addr: SocketAddr,

    /// Directory holding the JSON documents.
    /// Env: `HEARTH_DATA_DIR`, default `./data`.
    pub data_dir: PathBuf,

    /// Env: `HEARTH_SESSION_HOURS`, default `24`.
    pub session_hours: i64,

    /// Empty the post board when the first request of a new UTC day arrives.
    /// Env: `HEARTH_DAILY_RESET`, default `true`.
    pub daily_reset: bool,

    /// Env: `HEARTH_SEED_DEMO`, default `false`.
    pub seed_demo: bool,

    /// Seconds after the last presence ping during which a user shows as online.
    /// Env: `HEARTH_ONLINE_SECS`, default `90`.
    pub online_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 3000).into(),
            data_dir: PathBuf::from("./data"),
            session_hours: 24,
            daily_reset: true,
            seed_demo: false,
            online_secs: 90,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source, falling back to
    /// defaults for missing or unparseable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HEARTH_BIND_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.bind_addr = parsed,
                Err(_) => warn!(value = %addr, "Invalid HEARTH_BIND_ADDR, using default"),
            }
        }

        if let Some(dir) = lookup("HEARTH_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Some(hours) = lookup("HEARTH_SESSION_HOURS") {
            match hours.parse::<i64>() {
                Ok(n) if n > MAX_SESSION_HOURS => {
                    warn!(value = n, max = MAX_SESSION_HOURS, "HEARTH_SESSION_HOURS too large, capping");
                    config.session_hours = MAX_SESSION_HOURS;
                }
                Ok(n) if n > 0 => config.session_hours = n,
                _ => warn!(value = %hours, "Invalid HEARTH_SESSION_HOURS, using default"),
            }
        }

        if let Some(val) = lookup("HEARTH_DAILY_RESET") {
            config.daily_reset = val != "false" && val != "0";
        }

        if let Some(val) = lookup("HEARTH_SEED_DEMO") {
            config.seed_demo = val == "true" || val == "1";
        }

        if let Some(secs) = lookup("HEARTH_ONLINE_SECS") {
            match secs.parse::<i64>() {
                Ok(n) if n > 0 => config.online_secs = n,
                _ => warn!(value = %secs, "Invalid HEARTH_ONLINE_SECS, using default"),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.bind_addr, ([0, 0, 0, 0], 3000).into());
        assert_eq!(config.session_hours, 24);
        assert!(config.daily_reset);
        assert!(!config.seed_demo);
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("HEARTH_BIND_ADDR", "127.0.0.1:8081"),
            ("HEARTH_DATA_DIR", "/tmp/hearth"),
            ("HEARTH_SESSION_HOURS", "2"),
            ("HEARTH_DAILY_RESET", "false"),
            ("HEARTH_SEED_DEMO", "1"),
        ]));
        assert_eq!(config.bind_addr.port(), 8081);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/hearth"));
        assert_eq!(config.session_hours, 2);
        assert!(!config.daily_reset);
        assert!(config.seed_demo);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("HEARTH_BIND_ADDR", "not an address"),
            ("HEARTH_SESSION_HOURS", "-5"),
            ("HEARTH_ONLINE_SECS", "soon"),
        ]));
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.session_hours, 24);
        assert_eq!(config.online_secs, 90);
    }

    #[test]
    fn session_hours_are_capped() {
        let config = Config::from_lookup(lookup(&[(
            "HEARTH_SESSION_HOURS",
            "9223372036854775807",
        )]));
        assert_eq!(config.session_hours, MAX_SESSION_HOURS);
    }
}
