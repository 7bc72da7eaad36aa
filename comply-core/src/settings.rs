//! Process settings
//!
//! Reads config from env vars (a `.env` file is honoured):
//!   COMPLY_BAAS_URL              - hosted backend base URL (required)
//!   COMPLY_BAAS_KEY              - backend API key (required)
//!   COMPLY_MAIL_FUNCTION_URL     - mail relay URL (default: {BAAS_URL}/functions/v1/send-email)
//!   COMPLY_FALLBACK_CONFIG       - YAML/JSON fallback configuration file (optional)
//!   COMPLY_LOCK_TIMEOUT_SECS     - submission lock auto-release (default: 30)
//!   COMPLY_LEDGER_RETENTION_SECS - idempotency retention window (default: 300)
//!   COMPLY_LEDGER_SWEEP_SECS     - idempotency sweep interval (default: 120)
//!   COMPLY_HTTP_TIMEOUT_SECS     - backend/relay request timeout (default: 15)

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::guard::{DEFAULT_LOCK_TIMEOUT, DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct Settings {
    pub baas_url: String,
    pub baas_key: String,
    pub mail_function_url: String,
    pub fallback_config_path: Option<PathBuf>,
    pub lock_timeout: Duration,
    pub ledger_retention: Duration,
    pub ledger_sweep_interval: Duration,
    pub http_timeout: Duration,
}

impl Settings {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let baas_url = lookup("COMPLY_BAAS_URL")
            .ok_or_else(|| anyhow!("COMPLY_BAAS_URL environment variable not set"))?
            .trim_end_matches('/')
            .to_string();
        let baas_key = lookup("COMPLY_BAAS_KEY")
            .ok_or_else(|| anyhow!("COMPLY_BAAS_KEY environment variable not set"))?;
        let mail_function_url = lookup("COMPLY_MAIL_FUNCTION_URL")
            .unwrap_or_else(|| format!("{}/functions/v1/send-email", baas_url));

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{} must be a whole number of seconds", key)),
                None => Ok(default),
            }
        };

        let nonzero_secs = |key: &str, default: Duration| -> Result<Duration> {
            let value = secs(key, default)?;
            if value.is_zero() {
                return Err(anyhow!("{} must be greater than zero", key));
            }
            Ok(value)
        };

        Ok(Self {
            fallback_config_path: lookup("COMPLY_FALLBACK_CONFIG").map(PathBuf::from),
            lock_timeout: nonzero_secs("COMPLY_LOCK_TIMEOUT_SECS", DEFAULT_LOCK_TIMEOUT)?,
            ledger_retention: secs("COMPLY_LEDGER_RETENTION_SECS", DEFAULT_RETENTION)?,
            ledger_sweep_interval: nonzero_secs(
                "COMPLY_LEDGER_SWEEP_SECS",
                DEFAULT_SWEEP_INTERVAL,
            )?,
            http_timeout: secs("COMPLY_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT)?,
            baas_url,
            baas_key,
            mail_function_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[
            ("COMPLY_BAAS_URL", "https://proj.example.co/"),
            ("COMPLY_BAAS_KEY", "anon"),
        ]))
        .unwrap();

        assert_eq!(settings.baas_url, "https://proj.example.co");
        assert_eq!(
            settings.mail_function_url,
            "https://proj.example.co/functions/v1/send-email"
        );
        assert_eq!(settings.lock_timeout, Duration::from_secs(30));
        assert_eq!(settings.ledger_retention, Duration::from_secs(300));
        assert_eq!(settings.ledger_sweep_interval, Duration::from_secs(120));
        assert!(settings.fallback_config_path.is_none());
    }

    #[test]
    fn test_missing_required_and_bad_number() {
        assert!(Settings::from_lookup(lookup(&[("COMPLY_BAAS_KEY", "k")])).is_err());

        let err = Settings::from_lookup(lookup(&[
            ("COMPLY_BAAS_URL", "https://x"),
            ("COMPLY_BAAS_KEY", "k"),
            ("COMPLY_LOCK_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("COMPLY_LOCK_TIMEOUT_SECS"));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let err = Settings::from_lookup(lookup(&[
            ("COMPLY_BAAS_URL", "https://x"),
            ("COMPLY_BAAS_KEY", "k"),
            ("COMPLY_LEDGER_SWEEP_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("COMPLY_LEDGER_SWEEP_SECS"));

        // retention of zero is allowed: every sweep forgets everything
        let settings = Settings::from_lookup(lookup(&[
            ("COMPLY_BAAS_URL", "https://x"),
            ("COMPLY_BAAS_KEY", "k"),
            ("COMPLY_LEDGER_RETENTION_SECS", "0"),
        ]))
        .unwrap();
        assert!(settings.ledger_retention.is_zero());
    }
}
