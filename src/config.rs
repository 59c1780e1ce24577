//! Pool configuration read from `PG*` environment variables.
//!
//! Variables left unset fall back to the defaults below. Numeric values must be base-10
//! integers; anything else is rejected with [`GatewayError::ConfigError`] instead of being
//! carried into the pool as a nonsense value.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::GatewayError;

pub const PGHOST: &str = "PGHOST";
pub const PGPORT: &str = "PGPORT";
pub const PGDATABASE: &str = "PGDATABASE";
pub const PGUSER: &str = "PGUSER";
pub const PGPASSWORD: &str = "PGPASSWORD";
pub const PGSSL: &str = "PGSSL";
pub const PGSSL_REJECT_UNAUTHORIZED: &str = "PGSSL_REJECT_UNAUTHORIZED";
pub const PGPOOL_MAX: &str = "PGPOOL_MAX";
pub const PGPOOL_IDLE_TIMEOUT_MS: &str = "PGPOOL_IDLE_TIMEOUT_MS";
pub const PGPOOL_CONN_TIMEOUT_MS: &str = "PGPOOL_CONN_TIMEOUT_MS";
pub const PG_KEEPALIVE: &str = "PG_KEEPALIVE";
pub const PG_KEEPALIVE_IDLE_MS: &str = "PG_KEEPALIVE_IDLE_MS";

pub const DEFAULT_MAX_CONNECTIONS: usize = 20;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_KEEPALIVE_IDLE_MS: u64 = 10_000;

/// TLS policy for new connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SslPolicy {
    Disabled,
    /// `reject_unauthorized = false` accepts any server certificate and hostname.
    Enabled { reject_unauthorized: bool },
}

/// Everything needed to build the connection pool.
///
/// `None` for a connection field leaves the driver default in place. Serializes with
/// durations in milliseconds; serialize [`PoolConfig::redacted`] to keep the password out.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct PoolConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl: SslPolicy,
    pub max_connections: usize,
    /// Zero disables idle reaping.
    #[serde(rename = "idle_timeout_ms", serialize_with = "as_millis")]
    pub idle_timeout: Duration,
    /// Zero waits for a connection indefinitely.
    #[serde(rename = "connection_timeout_ms", serialize_with = "as_millis")]
    pub connection_timeout: Duration,
    pub keep_alive: bool,
    #[serde(rename = "keep_alive_initial_delay_ms", serialize_with = "as_millis")]
    pub keep_alive_initial_delay: Duration,
}

fn as_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            database: None,
            user: None,
            password: None,
            ssl: SslPolicy::Enabled {
                reject_unauthorized: false,
            },
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            connection_timeout: Duration::from_millis(DEFAULT_CONNECTION_TIMEOUT_MS),
            keep_alive: true,
            keep_alive_initial_delay: Duration::from_millis(DEFAULT_KEEPALIVE_IDLE_MS),
        }
    }
}

impl PoolConfig {
    /// Build the configuration from the process environment.
    ///
    /// # Errors
    /// Returns `GatewayError::ConfigError` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// ```rust
    /// use pg_gateway::config::PoolConfig;
    ///
    /// let cfg = PoolConfig::from_lookup(|name| match name {
    ///     "PGHOST" => Some("db.internal".to_string()),
    ///     "PGPOOL_MAX" => Some("5".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(cfg.max_connections, 5);
    /// ```
    ///
    /// # Errors
    /// Returns `GatewayError::ConfigError` if a numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let port = parse_number::<u16>(PGPORT, text(PGPORT))?;

        // Absent, "true" and "1" keep TLS on; anything else (including "") turns it off.
        let ssl = match lookup(PGSSL).as_deref() {
            None | Some("true" | "1") => SslPolicy::Enabled {
                reject_unauthorized: lookup(PGSSL_REJECT_UNAUTHORIZED).as_deref() == Some("true"),
            },
            Some(_) => SslPolicy::Disabled,
        };

        let max_connections =
            parse_number::<usize>(PGPOOL_MAX, text(PGPOOL_MAX))?.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        if max_connections == 0 {
            return Err(GatewayError::invalid_env(PGPOOL_MAX, "0", "pool size (must be >= 1)"));
        }

        let keep_alive = lookup(PG_KEEPALIVE).is_none_or(|v| v == "true");

        Ok(Self {
            host: text(PGHOST),
            port,
            database: text(PGDATABASE),
            user: text(PGUSER),
            password: text(PGPASSWORD),
            ssl,
            max_connections,
            idle_timeout: parse_millis(
                PGPOOL_IDLE_TIMEOUT_MS,
                text(PGPOOL_IDLE_TIMEOUT_MS),
                DEFAULT_IDLE_TIMEOUT_MS,
            )?,
            connection_timeout: parse_millis(
                PGPOOL_CONN_TIMEOUT_MS,
                text(PGPOOL_CONN_TIMEOUT_MS),
                DEFAULT_CONNECTION_TIMEOUT_MS,
            )?,
            keep_alive,
            keep_alive_initial_delay: parse_millis(
                PG_KEEPALIVE_IDLE_MS,
                text(PG_KEEPALIVE_IDLE_MS),
                DEFAULT_KEEPALIVE_IDLE_MS,
            )?,
        })
    }

    /// Copy of this config with the password masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("ssl", &self.ssl)
            .field("max_connections", &self.max_connections)
            .field("idle_timeout", &self.idle_timeout)
            .field("connection_timeout", &self.connection_timeout)
            .field("keep_alive", &self.keep_alive)
            .field("keep_alive_initial_delay", &self.keep_alive_initial_delay)
            .finish()
    }
}

/// Load `.env` from the working directory into the process environment.
///
/// Variables already set in the environment are left alone. A missing file is not an error;
/// a malformed one is logged and otherwise ignored.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded environment file"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(error = %err, "ignoring unreadable .env file"),
    }
}

fn parse_number<T: FromStr>(name: &str, value: Option<String>) -> Result<Option<T>, GatewayError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| GatewayError::invalid_env(name, &raw, "base-10 integer"))
}

fn parse_millis(name: &str, value: Option<String>, default_ms: u64) -> Result<Duration, GatewayError> {
    let ms = parse_number::<u64>(name, value)?.unwrap_or(default_ms);
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<PoolConfig, GatewayError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        PoolConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg, PoolConfig::default());
        assert_eq!(cfg.max_connections, 20);
        assert_eq!(cfg.port, None);
        assert_eq!(cfg.idle_timeout, Duration::from_millis(60_000));
        assert_eq!(cfg.connection_timeout, Duration::from_millis(10_000));
        assert_eq!(cfg.keep_alive_initial_delay, Duration::from_millis(10_000));
        assert!(cfg.keep_alive);
        assert_eq!(
            cfg.ssl,
            SslPolicy::Enabled {
                reject_unauthorized: false
            }
        );
    }

    #[test]
    fn connection_fields_are_read() {
        let cfg = config_from(&[
            (PGHOST, "db.internal"),
            (PGPORT, "6543"),
            (PGDATABASE, "shop"),
            (PGUSER, "app"),
            (PGPASSWORD, "s3cret"),
            (PGPOOL_MAX, "5"),
            (PGPOOL_IDLE_TIMEOUT_MS, "1500"),
            (PGPOOL_CONN_TIMEOUT_MS, "250"),
            (PG_KEEPALIVE_IDLE_MS, "3000"),
        ])
        .unwrap();

        assert_eq!(cfg.host.as_deref(), Some("db.internal"));
        assert_eq!(cfg.port, Some(6543));
        assert_eq!(cfg.database.as_deref(), Some("shop"));
        assert_eq!(cfg.user.as_deref(), Some("app"));
        assert_eq!(cfg.password.as_deref(), Some("s3cret"));
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.idle_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.connection_timeout, Duration::from_millis(250));
        assert_eq!(cfg.keep_alive_initial_delay, Duration::from_millis(3000));
    }

    #[test]
    fn ssl_stays_on_for_true_and_one() {
        for value in ["true", "1"] {
            let cfg = config_from(&[(PGSSL, value)]).unwrap();
            assert_eq!(
                cfg.ssl,
                SslPolicy::Enabled {
                    reject_unauthorized: false
                }
            );
        }
    }

    #[test]
    fn ssl_turns_off_for_any_other_value() {
        for value in ["false", "0", "no", "TRUE", ""] {
            let cfg = config_from(&[(PGSSL, value)]).unwrap();
            assert_eq!(cfg.ssl, SslPolicy::Disabled, "PGSSL={value:?}");
        }
    }

    #[test]
    fn reject_unauthorized_requires_exact_true() {
        let cfg = config_from(&[(PGSSL_REJECT_UNAUTHORIZED, "true")]).unwrap();
        assert_eq!(
            cfg.ssl,
            SslPolicy::Enabled {
                reject_unauthorized: true
            }
        );

        let cfg = config_from(&[(PGSSL_REJECT_UNAUTHORIZED, "1")]).unwrap();
        assert_eq!(
            cfg.ssl,
            SslPolicy::Enabled {
                reject_unauthorized: false
            }
        );
    }

    #[test]
    fn keepalive_is_only_true_for_exact_true() {
        assert!(config_from(&[(PG_KEEPALIVE, "true")]).unwrap().keep_alive);
        assert!(!config_from(&[(PG_KEEPALIVE, "false")]).unwrap().keep_alive);
        assert!(!config_from(&[(PG_KEEPALIVE, "1")]).unwrap().keep_alive);
        assert!(!config_from(&[(PG_KEEPALIVE, "")]).unwrap().keep_alive);
    }

    #[test]
    fn empty_numeric_values_fall_back_to_defaults() {
        let cfg = config_from(&[(PGPORT, ""), (PGPOOL_MAX, "")]).unwrap();
        assert_eq!(cfg.port, None);
        assert_eq!(cfg.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn numeric_values_are_trimmed() {
        let cfg = config_from(&[(PGPORT, " 5433 ")]).unwrap();
        assert_eq!(cfg.port, Some(5433));
    }

    #[test]
    fn invalid_numbers_fail_fast() {
        for (name, value) in [
            (PGPORT, "abc"),
            (PGPORT, "70000"),
            (PGPOOL_MAX, "-1"),
            (PGPOOL_IDLE_TIMEOUT_MS, "10s"),
            (PGPOOL_CONN_TIMEOUT_MS, "1e3"),
            (PG_KEEPALIVE_IDLE_MS, "ten"),
        ] {
            let err = config_from(&[(name, value)]).unwrap_err();
            match err {
                GatewayError::ConfigError(msg) => assert!(msg.contains(name), "{msg}"),
                other => panic!("expected ConfigError for {name}, got {other:?}"),
            }
        }
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        assert!(matches!(
            config_from(&[(PGPOOL_MAX, "0")]),
            Err(GatewayError::ConfigError(_))
        ));
    }

    #[test]
    fn debug_output_masks_password() {
        let cfg = config_from(&[(PGPASSWORD, "hunter2")]).unwrap();
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("********"));
        assert_eq!(cfg.redacted().password.as_deref(), Some("********"));
    }

    #[test]
    fn serializes_durations_as_millis() {
        let cfg = config_from(&[(PGPOOL_IDLE_TIMEOUT_MS, "1500"), (PGSSL, "0")]).unwrap();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["idle_timeout_ms"], 1500);
        assert_eq!(json["connection_timeout_ms"], 10_000);
        assert_eq!(json["ssl"], "disabled");
        assert_eq!(json["max_connections"], 20);
    }
}
