//! Process configuration read from the environment (`.env` is loaded first by `main`).

use std::str::FromStr;
use std::time::Duration;
use rust_decimal::Decimal;
use thiserror::Error;
use crate::domain::aggregates::PricingPolicy;
use crate::domain::value_objects::ExchangeRate;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    /// In-memory storage is used when unset.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub port: u16,
    pub jwt_secret: String,
    pub nats_url: Option<String>,
    pub nats_subject_prefix: String,
    pub admin_email: Option<String>,
    pub low_stock_threshold: i32,
    pub low_stock_scan_interval: Duration,
    pub pricing: PricingPolicy,
    pub exchange_rate: ExchangeRate,
}

fn var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn non_negative(name: &'static str, default: Decimal) -> Result<Decimal, ConfigError> {
    let value = parsed(name, default)?;
    if value.is_sign_negative() {
        return Err(ConfigError::Invalid { name, value: value.to_string() });
    }
    Ok(value)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let defaults = PricingPolicy::default();
        let pricing = PricingPolicy {
            free_shipping_threshold: non_negative("FREE_SHIPPING_THRESHOLD", defaults.free_shipping_threshold)?,
            flat_shipping_fee: non_negative("SHIPPING_FLAT_FEE", defaults.flat_shipping_fee)?,
            tax_rate: non_negative("TAX_RATE", defaults.tax_rate)?,
        };

        let mns_per_usd = parsed("MNS_PER_USD", ExchangeRate::DEFAULT_MNS_PER_USD)?;
        let exchange_rate = ExchangeRate::new(mns_per_usd)
            .ok_or(ConfigError::Invalid { name: "MNS_PER_USD", value: mns_per_usd.to_string() })?;

        let scan_secs: u64 = parsed("LOW_STOCK_SCAN_INTERVAL_SECS", 86_400)?;
        if scan_secs == 0 {
            return Err(ConfigError::Invalid { name: "LOW_STOCK_SCAN_INTERVAL_SECS", value: "0".into() });
        }

        Ok(Self {
            database_url: var("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            port: parsed("PORT", 8083)?,
            jwt_secret,
            nats_url: var("NATS_URL"),
            nats_subject_prefix: var("NATS_SUBJECT_PREFIX").unwrap_or_else(|| "ecommerce".into()),
            admin_email: var("ADMIN_EMAIL"),
            low_stock_threshold: parsed("LOW_STOCK_THRESHOLD", 10)?,
            low_stock_scan_interval: Duration::from_secs(scan_secs),
            pricing,
            exchange_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-wide; keep every env-touching assertion in one test.
    #[test]
    fn test_from_env() {
        std::env::remove_var("JWT_SECRET");
        assert!(matches!(Config::from_env(), Err(ConfigError::Missing("JWT_SECRET"))));

        std::env::set_var("JWT_SECRET", "secret");
        std::env::set_var("TAX_RATE", "21");
        std::env::remove_var("PORT");
        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.nats_subject_prefix, "ecommerce");
        assert_eq!(config.pricing.tax_rate, Decimal::from(21));
        assert_eq!(config.low_stock_scan_interval, Duration::from_secs(86_400));

        std::env::set_var("PORT", "not-a-port");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid { name: "PORT", .. })));

        std::env::remove_var("PORT");
        std::env::remove_var("TAX_RATE");
    }
}
