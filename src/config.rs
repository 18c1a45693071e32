//! Configuration loader for the `campus-compliance-stats` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). The campus exclusion list lives here too, so the
//! aggregator receives it as a plain value instead of a hardcoded constant.
//!
use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::models::CampusId;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Port the HTTP server listens on.
    pub bind_port: u16,

    /// Campuses removed before aggregation.
    pub excluded_campus_ids: Vec<CampusId>,

    /// Upper bound, in seconds, for each reporting query.
    pub report_timeout_secs: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_PORT` – HTTP listen port (default: 8080)
/// - `EXCLUDED_CAMPUS_IDS` – comma-separated campus ids (default: none)
/// - `REPORT_TIMEOUT_SECS` – reporting query timeout (default: 10)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let bind_port = parse_env_u32!("BIND_PORT", 8080);
    let report_timeout_secs = parse_env_u32!("REPORT_TIMEOUT_SECS", 10);
    let excluded_campus_ids = match env::var("EXCLUDED_CAMPUS_IDS") {
        Ok(raw) => parse_campus_id_list(&raw)?,
        Err(_) => Vec::new(),
    };

    let bind_port =
        u16::try_from(bind_port).map_err(|_| anyhow!("Invalid BIND_PORT: {} is out of range", bind_port))?;
    if report_timeout_secs == 0 {
        return Err(anyhow!("Invalid REPORT_TIMEOUT_SECS: must be at least 1"));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        bind_port,
        excluded_campus_ids,
        report_timeout_secs,
    })
}

/// Parse a comma-separated list of campus ids.
///
/// Blank segments are skipped and duplicates dropped, keeping the first
/// occurrence.
pub fn parse_campus_id_list(raw: &str) -> Result<Vec<CampusId>> {
    // ---
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = part
            .parse::<CampusId>()
            .map_err(|e| anyhow!("Invalid EXCLUDED_CAMPUS_IDS entry '{}': {}", part, e))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

impl Config {
    // ---
    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.report_timeout_secs))
    }

    /// Database URL with the password replaced by `****`.
    pub fn masked_db_url(&self) -> String {
        // ---
        if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                return format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                );
            }
        }
        self.db_url.clone()
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL        : {}", self.masked_db_url());
        tracing::info!("  DB_POOL_MAX         : {}", self.db_pool_max);
        tracing::info!("  BIND_PORT           : {}", self.bind_port);
        tracing::info!("  EXCLUDED_CAMPUS_IDS : {:?}", self.excluded_campus_ids);
        tracing::info!("  REPORT_TIMEOUT_SECS : {}", self.report_timeout_secs);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn sample_config(db_url: &str) -> Config {
        // ---
        Config {
            db_url: db_url.to_string(),
            db_pool_max: 5,
            bind_port: 8080,
            excluded_campus_ids: vec![],
            report_timeout_secs: 10,
        }
    }

    #[test]
    fn test_parse_campus_id_list() {
        // ---
        assert_eq!(parse_campus_id_list("").unwrap(), Vec::<CampusId>::new());
        assert_eq!(parse_campus_id_list("3").unwrap(), vec![3]);
        assert_eq!(parse_campus_id_list(" 3, 17 ,,41 ").unwrap(), vec![3, 17, 41]);
        assert_eq!(parse_campus_id_list("5,2,5").unwrap(), vec![5, 2]);
    }

    #[test]
    fn test_parse_campus_id_list_rejects_garbage() {
        // ---
        let err = parse_campus_id_list("3,abc").unwrap_err();
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_masked_db_url() {
        // ---
        let cfg = sample_config("postgres://stats:s3cret@db:5432/compliance");
        assert_eq!(cfg.masked_db_url(), "postgres://stats:****@db:5432/compliance");

        let cfg = sample_config("postgres://localhost/compliance");
        assert_eq!(cfg.masked_db_url(), "postgres://localhost/compliance");
    }

    #[test]
    fn test_report_timeout() {
        // ---
        let cfg = sample_config("postgres://localhost/compliance");
        assert_eq!(cfg.report_timeout(), Duration::from_secs(10));
    }
}
