//! Gateway configuration
//!
//! Defaults suit a single gateway with connectors on the same host. Any
//! field can be overridden from the environment:
//!
//! | Variable                      | Field               |
//! |-------------------------------|---------------------|
//! | `RIC_EDGE_ID`                 | `edge_id`           |
//! | `RIC_EDGE_CALL_TIMEOUT_MS`    | `call_timeout`      |
//! | `RIC_EDGE_CHANNEL_CAPACITY`   | `channel_capacity`  |
//! | `RIC_EDGE_CONNECTOR_ADDR`     | `connector_addr`    |
//! | `RIC_EDGE_COMMAND_ADDR`       | `command_addr`      |
//! | `RIC_EDGE_DATA_DIR`           | `data_dir`          |
//! | `RIC_EDGE_MAX_SUBSTITUTIONS`  | `max_substitutions` |
//! | `RIC_EDGE_CLEAN_START`        | `clean_start`       |

use anyhow::{Context, Result};
use ric_edge_shared::defaults;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Edge object this gateway manages
    pub edge_id: String,
    /// Time a call waits for its connector response
    pub call_timeout: Duration,
    /// Capacity of the state and inbound queues; senders wait when full
    pub channel_capacity: usize,
    /// Address connectors attach to
    pub connector_addr: String,
    /// Address outside callers send commands to
    pub command_addr: String,
    /// Directory holding cloud objects and models
    pub data_dir: PathBuf,
    /// Cap on placeholder substitutions per payload
    pub max_substitutions: usize,
    /// Start from empty state instead of the snapshot in `data_dir`
    pub clean_start: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            edge_id: "edge-001".into(),
            call_timeout: Duration::from_millis(defaults::CALL_TIMEOUT_MS),
            channel_capacity: defaults::CHANNEL_CAPACITY,
            connector_addr: "127.0.0.1:9100".into(),
            command_addr: "127.0.0.1:9101".into(),
            data_dir: PathBuf::from("data"),
            max_substitutions: defaults::MAX_SUBSTITUTIONS,
            clean_start: true,
        }
    }
}

impl GatewayConfig {
    /// Defaults overridden by `RIC_EDGE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(id) = lookup("RIC_EDGE_ID") {
            config.edge_id = id;
        }
        if let Some(ms) = parsed::<u64>(&lookup, "RIC_EDGE_CALL_TIMEOUT_MS")? {
            config.call_timeout = Duration::from_millis(ms);
        }
        if let Some(capacity) = parsed::<usize>(&lookup, "RIC_EDGE_CHANNEL_CAPACITY")? {
            anyhow::ensure!(capacity > 0, "RIC_EDGE_CHANNEL_CAPACITY must be positive");
            config.channel_capacity = capacity;
        }
        if let Some(addr) = lookup("RIC_EDGE_CONNECTOR_ADDR") {
            config.connector_addr = addr;
        }
        if let Some(addr) = lookup("RIC_EDGE_COMMAND_ADDR") {
            config.command_addr = addr;
        }
        if let Some(dir) = lookup("RIC_EDGE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(max) = parsed::<usize>(&lookup, "RIC_EDGE_MAX_SUBSTITUTIONS")? {
            config.max_substitutions = max;
        }
        if let Some(clean) = parsed::<bool>(&lookup, "RIC_EDGE_CLEAN_START")? {
            config.clean_start = clean;
        }

        Ok(config)
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid {}: {:?}", key, raw)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.edge_id, "edge-001");
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.command_addr, "127.0.0.1:9101");
        assert!(config.clean_start);
    }

    #[test]
    fn test_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("RIC_EDGE_ID", "gw-7"),
            ("RIC_EDGE_CALL_TIMEOUT_MS", "250"),
            ("RIC_EDGE_DATA_DIR", "/var/lib/ric"),
            ("RIC_EDGE_CLEAN_START", "false"),
            ("RIC_EDGE_COMMAND_ADDR", "0.0.0.0:7000"),
        ]))
        .unwrap();
        assert_eq!(config.command_addr, "0.0.0.0:7000");
        assert!(!config.clean_start);
        assert_eq!(config.edge_id, "gw-7");
        assert_eq!(config.call_timeout, Duration::from_millis(250));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ric"));
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = GatewayConfig::from_lookup(lookup(&[("RIC_EDGE_CALL_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("RIC_EDGE_CALL_TIMEOUT_MS"));

        assert!(GatewayConfig::from_lookup(lookup(&[("RIC_EDGE_CHANNEL_CAPACITY", "0")])).is_err());
    }
}
