//! # Configuration
//!
//! `LoyaltyConfig` is layered with the `config` crate:
//!
//! 1. built-in defaults from [`crate::constants`]
//! 2. an optional file, `config/loyalty.{toml,yaml,json}` or an explicit path
//! 3. `LOYALTY_`-prefixed environment variables (`LOYALTY_MAX_CONCURRENT_QUERIES=20`)
//! 4. the deployment variables `DATABASE_URL` and `ACCRUAL_SYSTEM_ADDRESS`

use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::accrual::client::normalize_base_url;
use crate::accrual::HttpAccrualClientConfig;
use crate::constants::{accrual, database, worker};
use crate::error::{LoyaltyError, Result};
use crate::logging::LogFormat;
use crate::reconciliation::WorkerConfig;

const DEFAULT_CONFIG_FILE: &str = "config/loyalty";
const ENV_PREFIX: &str = "LOYALTY";

#[derive(Debug, Clone, Deserialize)]
pub struct LoyaltyConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Accrual service address; absent or empty disables the worker
    #[serde(default)]
    pub accrual_system_address: Option<String>,
    pub accrual_poll_interval_ms: u64,
    pub accrual_request_timeout_ms: u64,
    pub max_concurrent_queries: usize,
    pub max_rate_limit_retries: u32,
    pub default_retry_after_secs: u64,
    #[serde(default)]
    pub log_level: Option<String>,
    pub log_format: LogFormat,
    pub migrations_path: String,
    pub run_migrations: bool,
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            database_url: database::DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: database::DEFAULT_MAX_CONNECTIONS,
            accrual_system_address: None,
            accrual_poll_interval_ms: worker::DEFAULT_POLL_INTERVAL_MS,
            accrual_request_timeout_ms: accrual::DEFAULT_REQUEST_TIMEOUT_MS,
            max_concurrent_queries: worker::DEFAULT_MAX_CONCURRENT_QUERIES,
            max_rate_limit_retries: worker::DEFAULT_MAX_RATE_LIMIT_RETRIES,
            default_retry_after_secs: accrual::DEFAULT_RETRY_AFTER_SECS,
            log_level: None,
            log_format: LogFormat::default(),
            migrations_path: database::DEFAULT_MIGRATIONS_PATH.to_string(),
            run_migrations: true,
        }
    }
}

impl LoyaltyConfig {
    /// Load from `config/loyalty.*` (if present) and the process environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load with an explicit configuration file; a missing explicit file is an error
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources(path, env)
    }

    /// Layer defaults, file and the given environment snapshot
    pub fn from_sources(path: Option<&Path>, env: HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .set_default("database_url", defaults.database_url)?
            .set_default(
                "database_max_connections",
                i64::from(defaults.database_max_connections),
            )?
            .set_default(
                "accrual_poll_interval_ms",
                defaults.accrual_poll_interval_ms as i64,
            )?
            .set_default(
                "accrual_request_timeout_ms",
                defaults.accrual_request_timeout_ms as i64,
            )?
            .set_default(
                "max_concurrent_queries",
                defaults.max_concurrent_queries as i64,
            )?
            .set_default(
                "max_rate_limit_retries",
                i64::from(defaults.max_rate_limit_retries),
            )?
            .set_default(
                "default_retry_after_secs",
                defaults.default_retry_after_secs as i64,
            )?
            .set_default("log_format", "pretty")?
            .set_default("migrations_path", defaults.migrations_path)?
            .set_default("run_migrations", defaults.run_migrations)?
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(Some(env.clone().into_iter().collect())),
            )
            .set_override_option("database_url", env.get("DATABASE_URL").cloned())?
            .set_override_option(
                "accrual_system_address",
                env.get("ACCRUAL_SYSTEM_ADDRESS").cloned(),
            )?
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(invalid("database_url must not be empty"));
        }
        if self.database_max_connections == 0 {
            return Err(invalid("database_max_connections must be positive"));
        }
        if self.accrual_poll_interval_ms == 0 {
            return Err(invalid("accrual_poll_interval_ms must be positive"));
        }
        if self.accrual_request_timeout_ms == 0 {
            return Err(invalid("accrual_request_timeout_ms must be positive"));
        }
        if self.max_concurrent_queries == 0 {
            return Err(invalid("max_concurrent_queries must be positive"));
        }
        if self.default_retry_after_secs == 0 {
            return Err(invalid("default_retry_after_secs must be positive"));
        }
        if let Some(address) = self.accrual_address() {
            normalize_base_url(address)?;
        }
        Ok(())
    }

    /// The accrual service address, if the worker is enabled
    pub fn accrual_address(&self) -> Option<&str> {
        self.accrual_system_address
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
    }

    pub fn accrual_client_config(&self) -> Option<HttpAccrualClientConfig> {
        self.accrual_address().map(|address| HttpAccrualClientConfig {
            base_url: address.to_string(),
            request_timeout: Duration::from_millis(self.accrual_request_timeout_ms),
            default_retry_after: Duration::from_secs(self.default_retry_after_secs),
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(self.accrual_poll_interval_ms),
            max_concurrent_queries: self.max_concurrent_queries,
            max_rate_limit_retries: self.max_rate_limit_retries,
        }
    }
}

fn invalid(message: &str) -> LoyaltyError {
    LoyaltyError::ConfigurationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = LoyaltyConfig::from_sources(None, HashMap::new()).unwrap();
        assert_eq!(config.max_concurrent_queries, 10);
        assert_eq!(config.max_rate_limit_retries, 3);
        assert_eq!(config.default_retry_after_secs, 60);
        assert_eq!(config.accrual_request_timeout_ms, 10_000);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.run_migrations);
        assert!(config.accrual_client_config().is_none());
    }

    #[test]
    fn test_prefixed_environment_overrides_defaults() {
        let config = LoyaltyConfig::from_sources(
            None,
            env(&[
                ("LOYALTY_MAX_CONCURRENT_QUERIES", "4"),
                ("LOYALTY_LOG_FORMAT", "json"),
                ("LOYALTY_RUN_MIGRATIONS", "false"),
            ]),
        )
        .unwrap();
        assert_eq!(config.max_concurrent_queries, 4);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(!config.run_migrations);
    }

    #[test]
    fn test_deployment_variables_win() {
        let config = LoyaltyConfig::from_sources(
            None,
            env(&[
                ("LOYALTY_ACCRUAL_SYSTEM_ADDRESS", "http://ignored:1"),
                ("ACCRUAL_SYSTEM_ADDRESS", "localhost:8081"),
                ("DATABASE_URL", "postgres://u:p@db/loyalty"),
            ]),
        )
        .unwrap();
        assert_eq!(config.database_url, "postgres://u:p@db/loyalty");

        let client = config.accrual_client_config().unwrap();
        assert_eq!(client.base_url, "localhost:8081");
        assert_eq!(client.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_file_layer() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "accrual_system_address = \"http://accrual:8080\"\naccrual_poll_interval_ms = 500\nmax_rate_limit_retries = 5"
        )
        .unwrap();

        let config = LoyaltyConfig::from_sources(
            Some(file.path()),
            env(&[("LOYALTY_MAX_RATE_LIMIT_RETRIES", "1")]),
        )
        .unwrap();

        assert_eq!(config.accrual_address(), Some("http://accrual:8080"));
        let worker = config.worker_config();
        assert_eq!(worker.poll_interval, Duration::from_millis(500));
        assert_eq!(worker.max_rate_limit_retries, 1);
    }

    #[test]
    fn test_blank_address_disables_worker() {
        let config =
            LoyaltyConfig::from_sources(None, env(&[("ACCRUAL_SYSTEM_ADDRESS", "   ")])).unwrap();
        assert_eq!(config.accrual_address(), None);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        for (key, value) in [
            ("LOYALTY_MAX_CONCURRENT_QUERIES", "0"),
            ("LOYALTY_ACCRUAL_POLL_INTERVAL_MS", "0"),
            ("LOYALTY_ACCRUAL_REQUEST_TIMEOUT_MS", "0"),
        ] {
            assert!(matches!(
                LoyaltyConfig::from_sources(None, env(&[(key, value)])),
                Err(LoyaltyError::ConfigurationError(_))
            ));
        }
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(LoyaltyConfig::from_sources(Some(&missing), HashMap::new()).is_err());
    }
}
