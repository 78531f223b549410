/// Configuration for the live session engine
///
/// Loads configuration from environment variables with sensible defaults, so
/// an embedding service can run with zero configuration in development.
use serde::{Deserialize, Serialize};

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Compare-and-update retry budget for contended writes
    pub retry: RetryConfig,
    /// Battle reward rates applied at settlement
    pub rewards: RewardRates,
    /// Defaults for vouchers created without explicit limits
    pub vouchers: VoucherDefaults,
}

/// Bounded retry with exponential backoff for version conflicts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of compare-and-update attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Multiplier applied to the backoff after each conflict
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Add random jitter (±30%) to each backoff
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

/// Reward rates for battle settlement, as fractions of the final score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRates {
    #[serde(default = "default_winner_rate")]
    pub winner_rate: f64,
    #[serde(default = "default_loser_rate")]
    pub loser_rate: f64,
    /// Rate applied to the combined score when the battle is a draw
    #[serde(default = "default_draw_rate")]
    pub draw_rate: f64,
}

/// Defaults for voucher creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherDefaults {
    /// Usage limit when the host does not supply one
    #[serde(default = "default_voucher_usage_limit")]
    pub usage_limit: u32,
    /// Voucher lifetime in hours when no expiry is supplied
    #[serde(default = "default_voucher_ttl_hours")]
    pub ttl_hours: u32,
}

fn default_max_attempts() -> u32 {
    16
}

fn default_initial_backoff_ms() -> u64 {
    1
}

fn default_max_backoff_ms() -> u64 {
    50
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

fn default_winner_rate() -> f64 {
    0.10
}

fn default_loser_rate() -> f64 {
    0.05
}

fn default_draw_rate() -> f64 {
    0.075
}

fn default_voucher_usage_limit() -> u32 {
    100
}

fn default_voucher_ttl_hours() -> u32 {
    24
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl Default for RewardRates {
    fn default() -> Self {
        Self {
            winner_rate: default_winner_rate(),
            loser_rate: default_loser_rate(),
            draw_rate: default_draw_rate(),
        }
    }
}

impl Default for VoucherDefaults {
    fn default() -> Self {
        Self {
            usage_limit: default_voucher_usage_limit(),
            ttl_hours: default_voucher_ttl_hours(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            rewards: RewardRates::default(),
            vouchers: VoucherDefaults::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let retry = RetryConfig {
            max_attempts: env_parse("SESSION_RETRY_MAX_ATTEMPTS", default_max_attempts()),
            initial_backoff_ms: env_parse(
                "SESSION_RETRY_INITIAL_BACKOFF_MS",
                default_initial_backoff_ms(),
            ),
            max_backoff_ms: env_parse("SESSION_RETRY_MAX_BACKOFF_MS", default_max_backoff_ms()),
            backoff_multiplier: env_parse(
                "SESSION_RETRY_BACKOFF_MULTIPLIER",
                default_backoff_multiplier(),
            ),
            jitter: env_parse("SESSION_RETRY_JITTER", default_jitter()),
        };

        let rewards = RewardRates {
            winner_rate: env_parse("SESSION_REWARD_WINNER_RATE", default_winner_rate()),
            loser_rate: env_parse("SESSION_REWARD_LOSER_RATE", default_loser_rate()),
            draw_rate: env_parse("SESSION_REWARD_DRAW_RATE", default_draw_rate()),
        };

        let vouchers = VoucherDefaults {
            usage_limit: env_parse("SESSION_VOUCHER_USAGE_LIMIT", default_voucher_usage_limit()),
            ttl_hours: env_parse("SESSION_VOUCHER_TTL_HOURS", default_voucher_ttl_hours()),
        };

        Self {
            retry,
            rewards,
            vouchers,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = EngineConfig::default();

        assert_eq!(config.retry.max_attempts, 16);
        assert_eq!(config.retry.initial_backoff_ms, 1);
        assert_eq!(config.retry.max_backoff_ms, 50);
        assert!(config.retry.jitter);
        assert_eq!(config.rewards.winner_rate, 0.10);
        assert_eq!(config.rewards.loser_rate, 0.05);
        assert_eq!(config.rewards.draw_rate, 0.075);
        assert_eq!(config.vouchers.usage_limit, 100);
        assert_eq!(config.vouchers.ttl_hours, 24);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("SESSION_RETRY_MAX_ATTEMPTS", "42");

        let config = EngineConfig::from_env();
        assert_eq!(config.retry.max_attempts, 42);

        std::env::remove_var("SESSION_RETRY_MAX_ATTEMPTS");
    }
}
