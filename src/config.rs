//! Runtime configuration
//!
//! Every knob has a default and can be overridden from the command line.
//! Invalid values (zero counts, non-positive rates) fall back to the default
//! with a warning instead of failing startup.

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Points credited per kilogram of deposited plastic
pub const DEFAULT_POINTS_PER_KG: u32 = 10;

/// Points credited per unit of paid currency (1 XOF = 1 point)
pub const DEFAULT_POINTS_PER_CURRENCY_UNIT: u32 = 1;

/// Backoff policy for store transactions aborted by a conflicting commit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a new RetryPolicy, replacing zero values with defaults
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        let default = Self::default();

        let max_attempts = if max_attempts == 0 {
            warn!(
                "Invalid max_attempts ({}), using default ({})",
                max_attempts, default.max_attempts
            );
            default.max_attempts
        } else {
            max_attempts
        };

        let initial_delay = if initial_delay.is_zero() {
            warn!(
                "Invalid initial_delay ({:?}), using default ({:?})",
                initial_delay, default.initial_delay
            );
            default.initial_delay
        } else {
            initial_delay
        };

        Self {
            max_attempts,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    ///
    /// Doubles on every attempt, capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Conversion rates and store behaviour for the ledger
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerConfig {
    pub points_per_kg: Decimal,
    pub points_per_currency_unit: Decimal,
    pub retry: RetryPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            points_per_kg: Decimal::from(DEFAULT_POINTS_PER_KG),
            points_per_currency_unit: Decimal::from(DEFAULT_POINTS_PER_CURRENCY_UNIT),
            retry: RetryPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Create a new LedgerConfig, replacing non-positive rates with defaults
    pub fn new(
        points_per_kg: Decimal,
        points_per_currency_unit: Decimal,
        retry: RetryPolicy,
    ) -> Self {
        let default = Self::default();

        let points_per_kg = if points_per_kg <= Decimal::ZERO {
            warn!(
                "Invalid points_per_kg ({}), using default ({})",
                points_per_kg, default.points_per_kg
            );
            default.points_per_kg
        } else {
            points_per_kg
        };

        let points_per_currency_unit = if points_per_currency_unit <= Decimal::ZERO {
            warn!(
                "Invalid points_per_currency_unit ({}), using default ({})",
                points_per_currency_unit, default.points_per_currency_unit
            );
            default.points_per_currency_unit
        } else {
            points_per_currency_unit
        };

        Self {
            points_per_kg,
            points_per_currency_unit,
            retry,
        }
    }
}

/// Configuration for replaying an operations file
#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// Number of operations read per batch
    pub batch_size: usize,
    /// Maximum number of operations in flight at once
    pub max_concurrent: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent: num_cpus::get(),
        }
    }
}

impl ReplayConfig {
    /// Create a new ReplayConfig with custom values
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                "Invalid batch_size ({}), using default ({})",
                batch_size, default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent = if max_concurrent == 0 {
            warn!(
                "Invalid max_concurrent ({}), using default ({})",
                max_concurrent, default.max_concurrent
            );
            default.max_concurrent
        } else {
            max_concurrent
        };

        Self {
            batch_size,
            max_concurrent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing environment variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
}

/// Credentials and endpoints for the PayDunya checkout API
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaydunyaConfig {
    pub master_key: String,
    pub private_key: String,
    pub token: String,
    pub api_base_url: String,
    /// Public domain of this service, used to build the callback URL
    pub app_domain: String,
}

impl PaydunyaConfig {
    pub const MASTER_KEY_VAR: &'static str = "PAYDUNYA_MASTER_KEY";
    pub const PRIVATE_KEY_VAR: &'static str = "PAYDUNYA_PRIVATE_KEY";
    pub const TOKEN_VAR: &'static str = "PAYDUNYA_TOKEN";
    pub const API_BASE_URL_VAR: &'static str = "PAYDUNYA_API_BASE_URL";
    pub const APP_DOMAIN_VAR: &'static str = "APP_DOMAIN";

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    ///
    /// Reports every missing (or blank) variable at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut fetch = |name: &str| match lookup(name) {
            Some(value) if !value.trim().is_empty() => value,
            _ => {
                missing.push(name.to_string());
                String::new()
            }
        };

        let config = Self {
            master_key: fetch(Self::MASTER_KEY_VAR),
            private_key: fetch(Self::PRIVATE_KEY_VAR),
            token: fetch(Self::TOKEN_VAR),
            api_base_url: fetch(Self::API_BASE_URL_VAR),
            app_domain: fetch(Self::APP_DOMAIN_VAR),
        };

        if missing.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::MissingVariables(missing))
        }
    }

    /// URL the gateway calls back once an invoice changes state
    pub fn callback_url(&self) -> String {
        format!("{}/api/paydunya-webhook", self.app_domain.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    #[rstest]
    #[case::first_attempt(1, 10)]
    #[case::second_attempt(2, 20)]
    #[case::third_attempt(3, 40)]
    #[case::capped(10, 100)]
    fn test_retry_delay_doubles_and_caps(#[case] attempt: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy::new(
            10,
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        assert_eq!(policy.delay_after(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn test_retry_policy_zero_values_fall_back() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        let default = RetryPolicy::default();
        assert_eq!(policy.max_attempts, default.max_attempts);
        assert_eq!(policy.initial_delay, default.initial_delay);
        assert_eq!(policy.max_delay, default.initial_delay);
    }

    #[rstest]
    #[case::zero_kg_rate(Decimal::ZERO, Decimal::ONE, Decimal::from(10), Decimal::ONE)]
    #[case::negative_currency_rate(Decimal::from(5), Decimal::from(-1), Decimal::from(5), Decimal::ONE)]
    #[case::custom(Decimal::new(125, 1), Decimal::from(2), Decimal::new(125, 1), Decimal::from(2))]
    fn test_ledger_config_rates(
        #[case] per_kg: Decimal,
        #[case] per_unit: Decimal,
        #[case] expected_per_kg: Decimal,
        #[case] expected_per_unit: Decimal,
    ) {
        let config = LedgerConfig::new(per_kg, per_unit, RetryPolicy::default());
        assert_eq!(config.points_per_kg, expected_per_kg);
        assert_eq!(config.points_per_currency_unit, expected_per_unit);
    }

    #[rstest]
    #[case::zero_batch_size(0, 4, 1000, 4)]
    #[case::zero_max_concurrent(50, 0, 50, num_cpus::get())]
    fn test_replay_config_zero_values_fallback(
        #[case] batch_size: usize,
        #[case] max_concurrent: usize,
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let config = ReplayConfig::new(batch_size, max_concurrent);
        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent, expected_max_concurrent);
    }

    #[test]
    fn test_paydunya_config_reports_all_missing_variables() {
        let vars: HashMap<&str, &str> = [
            ("PAYDUNYA_MASTER_KEY", "master"),
            ("PAYDUNYA_TOKEN", "  "),
            ("APP_DOMAIN", "https://example.org"),
        ]
        .into_iter()
        .collect();

        let result = PaydunyaConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(
            result,
            Err(ConfigError::MissingVariables(vec![
                "PAYDUNYA_PRIVATE_KEY".to_string(),
                "PAYDUNYA_TOKEN".to_string(),
                "PAYDUNYA_API_BASE_URL".to_string(),
            ]))
        );
    }

    #[test]
    fn test_paydunya_callback_url() {
        let config = PaydunyaConfig::from_lookup(|name| {
            Some(match name {
                "APP_DOMAIN" => "https://agents.example.org/".to_string(),
                other => format!("{}-value", other),
            })
        })
        .unwrap();

        assert_eq!(
            config.callback_url(),
            "https://agents.example.org/api/paydunya-webhook"
        );
    }
}
