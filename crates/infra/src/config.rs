//! Runtime configuration, read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use retailerp_core::LocationId;
use retailerp_restock::DEFAULT_CEILING_PERCENT;

use crate::keyed_mutex::DEFAULT_GATE_TIMEOUT;

pub const ENV_GATE_TIMEOUT_MS: &str = "RETAILERP_GATE_TIMEOUT_MS";
pub const ENV_RESTOCK_CEILING_PERCENT: &str = "RETAILERP_RESTOCK_CEILING_PERCENT";
pub const ENV_FINISHED_GOODS_LOCATION: &str = "RETAILERP_FINISHED_GOODS_LOCATION";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_BIND_ADDR: &str = "RETAILERP_BIND_ADDR";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is invalid ({value:?}): {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// How long a caller waits for a keyed gate.
    pub gate_timeout: Duration,
    /// Restock receipt ceiling, percent of the requested quantity.
    pub restock_ceiling_percent: u32,
    /// Where completed production is credited.
    pub finished_goods_location: LocationId,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub bind_addr: SocketAddr,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            gate_timeout: DEFAULT_GATE_TIMEOUT,
            restock_ceiling_percent: DEFAULT_CEILING_PERCENT,
            finished_goods_location: LocationId::from_uuid(Uuid::nil()),
            database_url: None,
            redis_url: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset or blank variables take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let gate_timeout = match get(ENV_GATE_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(parse(ENV_GATE_TIMEOUT_MS, &raw)?),
            None => defaults.gate_timeout,
        };

        let restock_ceiling_percent = match get(ENV_RESTOCK_CEILING_PERCENT) {
            Some(raw) => {
                let pct: u32 = parse(ENV_RESTOCK_CEILING_PERCENT, &raw)?;
                if pct < 100 {
                    return Err(invalid(
                        ENV_RESTOCK_CEILING_PERCENT,
                        &raw,
                        "ceiling must be at least 100",
                    ));
                }
                pct
            }
            None => defaults.restock_ceiling_percent,
        };

        let finished_goods_location = match get(ENV_FINISHED_GOODS_LOCATION) {
            Some(raw) => parse(ENV_FINISHED_GOODS_LOCATION, &raw)?,
            None => defaults.finished_goods_location,
        };

        let bind_addr = match get(ENV_BIND_ADDR) {
            Some(raw) => parse(ENV_BIND_ADDR, &raw)?,
            None => defaults.bind_addr,
        };

        Ok(Self {
            gate_timeout,
            restock_ceiling_percent,
            finished_goods_location,
            database_url: get(ENV_DATABASE_URL),
            redis_url: get(ENV_REDIS_URL),
            bind_addr,
        })
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(name, raw, &e.to_string()))
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
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
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, LedgerConfig::default());
        assert_eq!(cfg.gate_timeout, Duration::from_millis(5_000));
        assert_eq!(cfg.restock_ceiling_percent, 150);
        assert_eq!(cfg.bind_addr.port(), 8080);
    }

    #[test]
    fn values_are_read_and_blank_ones_ignored() {
        let location = Uuid::now_v7();
        let location_raw = location.to_string();
        let cfg = LedgerConfig::from_lookup(lookup(&[
            (ENV_GATE_TIMEOUT_MS, "250"),
            (ENV_RESTOCK_CEILING_PERCENT, "120"),
            (ENV_FINISHED_GOODS_LOCATION, location_raw.as_str()),
            (ENV_DATABASE_URL, "  "),
            (ENV_BIND_ADDR, "127.0.0.1:9000"),
        ]))
        .unwrap();

        assert_eq!(cfg.gate_timeout, Duration::from_millis(250));
        assert_eq!(cfg.restock_ceiling_percent, 120);
        assert_eq!(cfg.finished_goods_location, LocationId::from_uuid(location));
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.bind_addr.port(), 9000);
    }

    #[test]
    fn malformed_values_are_rejected_with_the_variable_name() {
        let err = LedgerConfig::from_lookup(lookup(&[(ENV_GATE_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(err.to_string().contains(ENV_GATE_TIMEOUT_MS));

        let err = LedgerConfig::from_lookup(lookup(&[(ENV_RESTOCK_CEILING_PERCENT, "90")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: ENV_RESTOCK_CEILING_PERCENT, .. }));
    }
}
