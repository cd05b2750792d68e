//! Declarative device configuration.
//!
//! [`DeviceConfig`] is the serde-facing description of one target device,
//! deserialized from camelCase JSON with defaults for everything except the
//! host. It converts into the runtime tuning structs consumed by
//! [`crate::client::EipClient`] and [`crate::poller::Poller`].

use crate::{
    poller::PollerConfig,
    protocol::{planner::PlannerConfig, session::SessionConfig, Error, Result},
};
use serde::{Deserialize, Serialize};
use std::{net::ToSocketAddrs, time::Duration};

/// Endpoint and tuning for one polled device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Target host name or IP address.
    pub host: String,
    /// Encapsulation TCP port (default 44818).
    #[serde(default = "DeviceConfig::default_port")]
    pub port: u16,
    /// TCP connect budget in milliseconds (default 10000).
    #[serde(default = "DeviceConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Request/reply exchange budget in milliseconds (default 5000).
    #[serde(default = "DeviceConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Scan period in milliseconds (default 1000).
    #[serde(default = "DeviceConfig::default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Fixed delay between reconnect attempts in milliseconds (default 5000).
    #[serde(default = "DeviceConfig::default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Largest address gap that still coalesces adjacent array spans
    /// (default 1, exactly-adjacent only).
    #[serde(default = "DeviceConfig::default_coalesce_gap")]
    pub coalesce_gap: u16,
    /// Byte budget for one multiple-service request (default 480).
    #[serde(default = "DeviceConfig::default_msr_budget_bytes")]
    pub msr_budget_bytes: usize,
    /// Optional hard cap on tags per batch regardless of byte budget.
    #[serde(default)]
    pub max_tags_per_batch: Option<usize>,
}

impl DeviceConfig {
    fn default_port() -> u16 {
        44818
    }

    fn default_connect_timeout_ms() -> u64 {
        10_000
    }

    fn default_request_timeout_ms() -> u64 {
        5_000
    }

    fn default_scan_interval_ms() -> u64 {
        1_000
    }

    fn default_reconnect_delay_ms() -> u64 {
        5_000
    }

    fn default_coalesce_gap() -> u16 {
        1
    }

    fn default_msr_budget_bytes() -> usize {
        480
    }

    /// Deserialize a configuration from a JSON value.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::Config {
            message: format!("invalid device config: {e}"),
        })
    }

    /// Resolve the endpoint and produce session tuning. Fields without a
    /// JSON counterpart keep their [`SessionConfig`] defaults.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let socket_addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Config {
                message: format!("no address resolved for host {}", self.host),
            })?;
        Ok(SessionConfig {
            socket_addr,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            ..SessionConfig::default()
        })
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig::new()
            .with_coalesce_gap(self.coalesce_gap)
            .with_msr_budget_bytes(self.msr_budget_bytes)
            .with_max_tags_per_batch(self.max_tags_per_batch)
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            scan_interval: Duration::from_millis(self.scan_interval_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            planner: self.planner_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_config_applies_defaults() {
        let config = DeviceConfig::from_json(json!({ "host": "10.0.0.5" })).unwrap();
        assert_eq!(config.port, 44818);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.request_timeout_ms, 5_000);
        assert_eq!(config.scan_interval_ms, 1_000);
        assert_eq!(config.reconnect_delay_ms, 5_000);
        assert_eq!(config.coalesce_gap, 1);
        assert_eq!(config.msr_budget_bytes, 480);
        assert_eq!(config.max_tags_per_batch, None);
    }

    #[test]
    fn camel_case_keys_are_honored() {
        let config = DeviceConfig::from_json(json!({
            "host": "plc.local",
            "port": 2222,
            "scanIntervalMs": 250,
            "msrBudgetBytes": 256,
            "maxTagsPerBatch": 4,
        }))
        .unwrap();
        assert_eq!(config.port, 2222);
        assert_eq!(config.scan_interval_ms, 250);
        assert_eq!(config.msr_budget_bytes, 256);
        assert_eq!(config.max_tags_per_batch, Some(4));

        let poller = config.poller_config();
        assert_eq!(poller.scan_interval, Duration::from_millis(250));
        assert_eq!(poller.planner.max_tags_per_batch, Some(4));
    }

    #[test]
    fn missing_host_is_rejected() {
        let err = DeviceConfig::from_json(json!({ "port": 44818 })).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn session_config_resolves_literal_addresses() {
        let config = DeviceConfig::from_json(json!({ "host": "127.0.0.1" })).unwrap();
        let session = config.session_config().unwrap();
        assert_eq!(session.socket_addr.port(), 44818);
        assert!(session.socket_addr.ip().is_loopback());
        assert_eq!(session.connect_timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn planner_config_carries_batching_knobs() {
        let config = DeviceConfig::from_json(json!({
            "host": "10.0.0.5",
            "coalesceGap": 3,
            "msrBudgetBytes": 128,
        }))
        .unwrap();
        let planner = config.planner_config();
        assert_eq!(planner.coalesce_gap, 3);
        assert_eq!(planner.msr_budget_bytes, 128);
        assert_eq!(planner.max_tags_per_batch, None);
    }
}
