use std::env;
use std::time::Duration;

use crate::services::achievement_cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL_SECS};
use crate::services::achievement_service::DEFAULT_CALC_BUDGET_MS;
use crate::services::ledger_service::{
    DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_MAX_CODE_ATTEMPTS, LedgerSettings,
};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub achievement_cache_ttl_secs: u64,
    pub achievement_cache_max_entries: usize,
    pub lock_timeout_ms: u64,
    pub redeem_code_max_attempts: u32,
    pub achievement_calc_budget_ms: u64,
    pub seed_demo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        }

        Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://berries.db?mode=rwc".to_string()),
            port: parsed(lookup("PORT"), 8000),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            achievement_cache_ttl_secs: parsed(
                lookup("ACHIEVEMENT_CACHE_TTL_SECS"),
                DEFAULT_TTL_SECS,
            ),
            achievement_cache_max_entries: parsed(
                lookup("ACHIEVEMENT_CACHE_MAX_ENTRIES"),
                DEFAULT_MAX_ENTRIES,
            ),
            lock_timeout_ms: parsed(lookup("LOCK_TIMEOUT_MS"), DEFAULT_LOCK_TIMEOUT_MS),
            redeem_code_max_attempts: parsed(
                lookup("REDEEM_CODE_MAX_ATTEMPTS"),
                DEFAULT_MAX_CODE_ATTEMPTS,
            ),
            achievement_calc_budget_ms: parsed(
                lookup("ACHIEVEMENT_CALC_BUDGET_MS"),
                DEFAULT_CALC_BUDGET_MS,
            ),
            seed_demo: lookup("SEED_DEMO").is_some(),
        }
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            max_code_attempts: self.redeem_code_max_attempts.max(1),
        }
    }

    pub fn calc_budget(&self) -> Duration {
        Duration::from_millis(self.achievement_calc_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]);

        assert_eq!(config.database_url, "sqlite://berries.db?mode=rwc");
        assert_eq!(config.port, 8000);
        assert_eq!(config.achievement_cache_ttl_secs, 3600);
        assert_eq!(config.achievement_cache_max_entries, 1000);
        assert_eq!(config.lock_timeout_ms, 5000);
        assert_eq!(config.redeem_code_max_attempts, 10);
        assert_eq!(config.achievement_calc_budget_ms, 200);
        assert!(config.cors_allowed_origins.is_empty());
        assert!(!config.seed_demo);
    }

    #[test]
    fn values_are_read_and_bad_ones_ignored() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://ledger@localhost/berries"),
            ("PORT", "9100"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
            ("ACHIEVEMENT_CACHE_TTL_SECS", "60"),
            ("LOCK_TIMEOUT_MS", "not-a-number"),
            ("SEED_DEMO", "1"),
        ]);

        assert_eq!(config.database_url, "postgres://ledger@localhost/berries");
        assert_eq!(config.port, 9100);
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert_eq!(config.achievement_cache_ttl_secs, 60);
        assert_eq!(config.lock_timeout_ms, 5000);
        assert!(config.seed_demo);
    }

    #[test]
    fn ledger_settings_never_allow_zero_attempts() {
        let config = config_from(&[("REDEEM_CODE_MAX_ATTEMPTS", "0")]);
        assert_eq!(config.ledger_settings().max_code_attempts, 1);
    }
}
