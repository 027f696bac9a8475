//! # Configuration
//!
//! Read once from the environment in `main` and injected into
//! [`AppState`](crate::state::AppState). Library code never reads the
//! environment itself.
//!
//! | Variable                     | Default | Meaning                                  |
//! |------------------------------|---------|------------------------------------------|
//! | `PORT`                       | 8080    | HTTP listen port                         |
//! | `DATABASE_URL`               | unset   | Postgres URL; unset runs in-memory only  |
//! | `PLATFORM_FEE_PERCENT`       | 5       | Platform fee on every sale, 0–100        |
//! | `SETTLEMENT_CURRENCY`        | usd     | ISO currency code for intents            |
//! | `PAYMENT_CONFIRM_TIMEOUT_MS` | 5000    | Upper bound on one gateway confirm call  |
//! | `PAYMENT_CONFIRM_RETRIES`    | 3       | Confirm attempts before giving up        |
//! | `PAYMENT_ACTION_RECHECK_MS`  | 30000   | Delay between checks of a payment awaiting buyer action |
//! | `PAYMENT_ACTION_WINDOW_SECS` | 86400   | How long a payment may await buyer action before it fails |
//! | `LOG_FORMAT`                 | json    | `json` or `pretty`                       |
//! | `ACCOUNTS_FILE`              | unset   | JSON array of accounts to seed the directory |

use std::path::PathBuf;
use std::time::Duration;

use rights_core::Percent;
use rights_settlement::{FeeSchedule, RetryPolicy};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Business parameters of the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub fees: FeeSchedule,
    pub currency: String,
    pub payment_retry: RetryPolicy,
    /// Delay before a payment awaiting buyer action is reconciled again.
    pub action_recheck: Duration,
    /// Age after which a payment still awaiting buyer action is failed and
    /// its units released.
    pub action_window: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            currency: "usd".to_string(),
            payment_retry: RetryPolicy::default(),
            action_recheck: Duration::from_secs(30),
            action_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Postgres connection URL. `None` means in-memory only.
    pub database_url: Option<String>,
    pub log_format: LogFormat,
    /// Accounts loaded into the in-memory directory at startup.
    pub accounts_file: Option<PathBuf>,
    pub platform: PlatformConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("log_format", &self.log_format)
            .field("accounts_file", &self.accounts_file)
            .field("platform", &self.platform)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: None,
            log_format: LogFormat::Json,
            accounts_file: None,
            platform: PlatformConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Unset variables take their
    /// defaults; set but unparsable ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let retry_defaults = defaults.platform.payment_retry;

        let port = parse_var(&lookup, "PORT", defaults.port)?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let fee_raw: Decimal = parse_var(
            &lookup,
            "PLATFORM_FEE_PERCENT",
            Decimal::from(rights_settlement::DEFAULT_PLATFORM_FEE_PERCENT),
        )?;
        let fee = Percent::new(fee_raw).map_err(|e| ConfigError::Invalid {
            var: "PLATFORM_FEE_PERCENT",
            value: fee_raw.to_string(),
            reason: e.to_string(),
        })?;

        let currency = match lookup("SETTLEMENT_CURRENCY") {
            None => defaults.platform.currency,
            Some(raw) => {
                let code = raw.trim().to_ascii_lowercase();
                if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
                    return Err(ConfigError::Invalid {
                        var: "SETTLEMENT_CURRENCY",
                        value: raw,
                        reason: "expected a three-letter currency code".to_string(),
                    });
                }
                code
            }
        };

        let timeout_ms: u64 = parse_var(
            &lookup,
            "PAYMENT_CONFIRM_TIMEOUT_MS",
            retry_defaults.timeout.as_millis() as u64,
        )?;
        let attempts: u32 = parse_var(&lookup, "PAYMENT_CONFIRM_RETRIES", retry_defaults.max_attempts)?;
        if attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "PAYMENT_CONFIRM_RETRIES",
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        let recheck_ms: u64 = parse_var(
            &lookup,
            "PAYMENT_ACTION_RECHECK_MS",
            defaults.platform.action_recheck.as_millis() as u64,
        )?;
        if recheck_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "PAYMENT_ACTION_RECHECK_MS",
                value: "0".to_string(),
                reason: "the recheck delay must be positive".to_string(),
            });
        }
        let window_secs: u64 = parse_var(
            &lookup,
            "PAYMENT_ACTION_WINDOW_SECS",
            defaults.platform.action_window.as_secs(),
        )?;

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected json or pretty".to_string(),
                })
            }
        };

        let accounts_file = lookup("ACCOUNTS_FILE")
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            port,
            database_url,
            log_format,
            accounts_file,
            platform: PlatformConfig {
                fees: FeeSchedule::new(fee),
                currency,
                payment_retry: RetryPolicy {
                    timeout: Duration::from_millis(timeout_ms),
                    max_attempts: attempts,
                    ..retry_defaults
                },
                action_recheck: Duration::from_millis(recheck_ms),
                action_window: Duration::from_secs(window_secs),
            },
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
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
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.database_url.is_none());
        assert_eq!(config.platform, PlatformConfig::default());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn reads_every_variable() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/rights"),
            ("PLATFORM_FEE_PERCENT", "7.5"),
            ("SETTLEMENT_CURRENCY", "EUR"),
            ("PAYMENT_CONFIRM_TIMEOUT_MS", "250"),
            ("PAYMENT_CONFIRM_RETRIES", "5"),
            ("PAYMENT_ACTION_RECHECK_MS", "1500"),
            ("PAYMENT_ACTION_WINDOW_SECS", "600"),
            ("LOG_FORMAT", "pretty"),
            ("ACCOUNTS_FILE", "/etc/rights/accounts.json"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.platform.currency, "eur");
        assert_eq!(
            config.platform.fees.platform_fee_percent.value(),
            Decimal::new(75, 1)
        );
        assert_eq!(config.platform.payment_retry.timeout, Duration::from_millis(250));
        assert_eq!(config.platform.payment_retry.max_attempts, 5);
        assert_eq!(config.platform.action_recheck, Duration::from_millis(1500));
        assert_eq!(config.platform.action_window, Duration::from_secs(600));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(
            config.accounts_file,
            Some(PathBuf::from("/etc/rights/accounts.json"))
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("PLATFORM_FEE_PERCENT", "120")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SETTLEMENT_CURRENCY", "dollars")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("PAYMENT_CONFIRM_RETRIES", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("PAYMENT_ACTION_RECHECK_MS", "0")])).is_err());
    }

    #[test]
    fn debug_redacts_database_url() {
        let config = AppConfig::from_lookup(lookup(&[(
            "DATABASE_URL",
            "postgres://user:secret@db/rights",
        )]))
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
