use std::collections::HashMap;
use thiserror::Error;

/// Runtime configuration, loaded once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub bus_endpoint: String,
    pub venue_a_url: String,
    pub venue_b_url: String,
    pub loan_events_topic: String,
    /// Ticks older than this are treated as stale.
    pub max_tick_age_seconds: u64,
    /// LTV at or above which an active loan is liquidated (percent).
    pub liquidation_threshold_pct: u32,
    /// LTV at or below which a new loan activates (percent).
    pub activation_threshold_pct: u32,
    /// Size of the liquidation worker pool.
    pub liquidation_workers: usize,
    /// Total timeout for venue order calls.
    pub venue_http_timeout_ms: u64,
    /// Cap on the jittered retry backoff between venue attempts.
    pub venue_retry_cap_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_with_default(&env_map, "PORT", "8080")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let bus_endpoint = env_map
            .get("BUS_ENDPOINT")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("BUS_ENDPOINT".to_string()))?;

        let venue_a_url = env_map
            .get("VENUE_A_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("VENUE_A_URL".to_string()))?;

        let venue_b_url = env_map
            .get("VENUE_B_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("VENUE_B_URL".to_string()))?;

        let loan_events_topic = env_map
            .get("BUS_LOAN_EVENTS_TOPIC")
            .cloned()
            .unwrap_or_else(|| "coruscant-bank-loan-events".to_string());

        let max_tick_age_seconds = parse_with_default(&env_map, "MAX_TICK_AGE_SECONDS", "30")?;
        let liquidation_threshold_pct =
            parse_with_default(&env_map, "LIQUIDATION_THRESHOLD_PCT", "80")?;
        let activation_threshold_pct =
            parse_with_default(&env_map, "ACTIVATION_THRESHOLD_PCT", "50")?;
        let liquidation_workers = parse_with_default(&env_map, "LIQUIDATION_WORKERS", "16")?;
        let venue_http_timeout_ms = parse_with_default(&env_map, "VENUE_HTTP_TIMEOUT_MS", "15000")?;
        let venue_retry_cap_ms = parse_with_default(&env_map, "VENUE_RETRY_CAP_MS", "30000")?;

        if activation_threshold_pct >= liquidation_threshold_pct {
            return Err(ConfigError::InvalidValue(
                "ACTIVATION_THRESHOLD_PCT".to_string(),
                format!(
                    "must be below LIQUIDATION_THRESHOLD_PCT ({} >= {})",
                    activation_threshold_pct, liquidation_threshold_pct
                ),
            ));
        }

        if liquidation_workers == 0 {
            return Err(ConfigError::InvalidValue(
                "LIQUIDATION_WORKERS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            bus_endpoint,
            venue_a_url,
            venue_b_url,
            loan_events_topic,
            max_tick_age_seconds,
            liquidation_threshold_pct,
            activation_threshold_pct,
            liquidation_workers,
            venue_http_timeout_ms,
            venue_retry_cap_ms,
        })
    }
}

fn parse_with_default<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<T>()
        .map_err(|_| {
            ConfigError::InvalidValue(
                key.to_string(),
                format!("must parse as {}", std::any::type_name::<T>()),
            )
        })
}
