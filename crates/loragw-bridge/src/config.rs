//! Configuration types for the gateway bridge
//!
//! This module provides the configuration consumed at bridge construction:
//! how to reach the router, the uplink rate ceiling, per-gateway identity
//! overrides and the status defaults merged into every status report.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::bootstrap::SERVICE_NAME;
use crate::error::{BridgeError, Result};
use crate::gateway::{GatewayAddress, GatewayConfig};
use crate::rate::TICK_INTERVAL;

/// Default capacity of the shared outbound TX channel
pub const DEFAULT_TX_QUEUE_SIZE: usize = 128;

/// Main configuration for the gateway bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Router endpoint and bridge identity
    #[serde(default)]
    pub router: RouterConfig,

    /// Uplink admission settings
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Per-gateway router identity overrides
    #[serde(default)]
    pub gateways: Vec<GatewayOverride>,

    /// Defaults merged into every status report
    #[serde(default)]
    pub status: StatusConfig,

    /// Capacity of the shared outbound TX channel
    #[serde(default = "default_tx_queue_size")]
    pub tx_queue_size: usize,
}

fn default_tx_queue_size() -> usize {
    DEFAULT_TX_QUEUE_SIZE
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            rate_limit: RateLimitConfig::default(),
            gateways: Vec::new(),
            status: StatusConfig::default(),
            tx_queue_size: DEFAULT_TX_QUEUE_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check the configuration for values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        match &self.router.endpoint {
            RouterEndpoint::Static { address } if address.is_empty() => {
                return Err(BridgeError::InvalidConfig(
                    "router address must not be empty".to_string(),
                ));
            }
            RouterEndpoint::Discovery { server, router_id } => {
                if server.is_empty() || router_id.is_empty() {
                    return Err(BridgeError::InvalidConfig(
                        "discovery server and router id are required".to_string(),
                    ));
                }
            }
            _ => {}
        }

        let limit = self.rate_limit.rx_rate_limit;
        if !limit.is_finite() || limit < 0.0 {
            return Err(BridgeError::InvalidConfig(format!(
                "rx_rate_limit must be a non-negative number, got {limit}"
            )));
        }
        if self.rate_limit.tick_interval.is_zero() {
            return Err(BridgeError::InvalidConfig(
                "tick_interval must be positive".to_string(),
            ));
        }
        if self.tx_queue_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "tx_queue_size must be positive".to_string(),
            ));
        }

        for gateway in &self.gateways {
            gateway.parse()?;
        }
        Ok(())
    }
}

/// Router endpoint and bridge identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Where the router is
    #[serde(default)]
    pub endpoint: RouterEndpoint,

    /// Id announced to discovery, unique per process unless configured
    #[serde(default = "default_bridge_id")]
    pub bridge_id: String,
}

fn default_bridge_id() -> String {
    format!("{SERVICE_NAME}-{}", Uuid::new_v4().simple())
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            endpoint: RouterEndpoint::default(),
            bridge_id: default_bridge_id(),
        }
    }
}

/// How the router address is obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RouterEndpoint {
    /// Fixed network address
    Static {
        /// host:port of the router
        address: String,
    },
    /// Looked up on a discovery server
    Discovery {
        /// host:port of the discovery server
        server: String,
        /// Router id to look up
        router_id: String,
    },
}

impl Default for RouterEndpoint {
    fn default() -> Self {
        RouterEndpoint::Static {
            address: "localhost:1901".to_string(),
        }
    }
}

/// Uplink admission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Uplink ceiling per gateway in events per minute, 0 disables limiting
    #[serde(default)]
    pub rx_rate_limit: f64,

    /// Decay tick period of the rate counters
    #[serde(with = "humantime_serde", default = "default_tick_interval")]
    pub tick_interval: Duration,
}

fn default_tick_interval() -> Duration {
    TICK_INTERVAL
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rx_rate_limit: 0.0,
            tick_interval: TICK_INTERVAL,
        }
    }
}

/// Router identity override for one gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOverride {
    /// Gateway EUI as 16 hex characters
    pub eui: String,
    /// Logical gateway id
    pub id: String,
    /// Router access token
    pub token: String,
}

impl GatewayOverride {
    /// Parsed address and identity
    pub fn parse(&self) -> Result<(GatewayAddress, GatewayConfig)> {
        let address: GatewayAddress = self.eui.parse()?;
        Ok((address, GatewayConfig::new(&self.id, &self.token)))
    }
}

/// Defaults merged into every status report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Frequency plan region label
    #[serde(default)]
    pub region: String,

    /// Round-trip time estimate in milliseconds
    #[serde(default)]
    pub rtt: u32,
}

/// Builder for BridgeConfig
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Reach the router at a fixed address
    pub fn router_address(mut self, address: impl Into<String>) -> Self {
        self.config.router.endpoint = RouterEndpoint::Static {
            address: address.into(),
        };
        self
    }

    /// Look the router up on a discovery server
    pub fn discovery(mut self, server: impl Into<String>, router_id: impl Into<String>) -> Self {
        self.config.router.endpoint = RouterEndpoint::Discovery {
            server: server.into(),
            router_id: router_id.into(),
        };
        self
    }

    /// Set the id announced to discovery
    pub fn bridge_id(mut self, id: impl Into<String>) -> Self {
        self.config.router.bridge_id = id.into();
        self
    }

    /// Set the uplink ceiling in events per minute
    pub fn rx_rate_limit(mut self, limit: f64) -> Self {
        self.config.rate_limit.rx_rate_limit = limit;
        self
    }

    /// Set the rate counter tick period
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.rate_limit.tick_interval = interval;
        self
    }

    /// Add a gateway identity override
    pub fn gateway(
        mut self,
        eui: impl Into<String>,
        id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        self.config.gateways.push(GatewayOverride {
            eui: eui.into(),
            id: id.into(),
            token: token.into(),
        });
        self
    }

    /// Set the default status region
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.status.region = region.into();
        self
    }

    /// Set the default status RTT
    pub fn rtt(mut self, rtt: u32) -> Self {
        self.config.status.rtt = rtt;
        self
    }

    /// Set the outbound TX channel capacity
    pub fn tx_queue_size(mut self, size: usize) -> Self {
        self.config.tx_queue_size = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.rate_limit.rx_rate_limit, 0.0);
        assert_eq!(config.rate_limit.tick_interval, Duration::from_secs(5));
        assert!(config.router.bridge_id.starts_with("lora-gateway-bridge-"));
        assert_ne!(config.router.bridge_id, BridgeConfig::default().router.bridge_id);
        assert_eq!(config.tx_queue_size, DEFAULT_TX_QUEUE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_defaults_are_valid() {
        let config = BridgeConfigBuilder::new().build();
        assert_eq!(config.tx_queue_size, DEFAULT_TX_QUEUE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfigBuilder::new()
            .discovery("discovery.example.org:1900", "ttn-router-eu")
            .bridge_id("bridge-7")
            .rx_rate_limit(30.0)
            .gateway("0102030405060708", "my-gateway", "secret")
            .region("EU868")
            .rtt(42)
            .tx_queue_size(16)
            .build();

        assert_eq!(
            config.router.endpoint,
            RouterEndpoint::Discovery {
                server: "discovery.example.org:1900".to_string(),
                router_id: "ttn-router-eu".to_string(),
            }
        );
        assert_eq!(config.router.bridge_id, "bridge-7");
        assert_eq!(config.rate_limit.rx_rate_limit, 30.0);
        assert_eq!(config.gateways.len(), 1);
        assert_eq!(config.status.region, "EU868");
        assert_eq!(config.status.rtt, 42);
        assert_eq!(config.tx_queue_size, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let config = BridgeConfig::from_json(
            r#"{
                "router": {"endpoint": {"type": "static", "address": "10.0.0.1:1901"}},
                "rate_limit": {"rx_rate_limit": 12.5, "tick_interval": "10s"},
                "gateways": [{"eui": "B827EBFFFE000001", "id": "roof", "token": "abc"}],
                "status": {"region": "US915"}
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.router.endpoint,
            RouterEndpoint::Static {
                address: "10.0.0.1:1901".to_string()
            }
        );
        assert_eq!(config.rate_limit.tick_interval, Duration::from_secs(10));
        assert_eq!(config.tx_queue_size, DEFAULT_TX_QUEUE_SIZE);
        assert_eq!(config.status.rtt, 0);

        let (address, gateway) = config.gateways[0].parse().unwrap();
        assert_eq!(address.to_string(), "b827ebfffe000001");
        assert_eq!(gateway.id, "roof");
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        assert!(matches!(
            BridgeConfig::from_json("{\"tx_queue_size\": \"many\"}"),
            Err(BridgeError::Json(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = BridgeConfigBuilder::new().rx_rate_limit(-1.0).build();
        assert!(matches!(config.validate(), Err(BridgeError::InvalidConfig(_))));

        let config = BridgeConfigBuilder::new().tx_queue_size(0).build();
        assert!(config.validate().is_err());

        let config = BridgeConfigBuilder::new().router_address("").build();
        assert!(config.validate().is_err());

        let config = BridgeConfigBuilder::new()
            .gateway("not-hex", "id", "token")
            .build();
        assert!(matches!(
            config.validate(),
            Err(BridgeError::InvalidGatewayEui(_))
        ));
    }

    #[test]
    fn test_tick_interval_roundtrips_humantime() {
        let config = BridgeConfigBuilder::new()
            .tick_interval(Duration::from_millis(1500))
            .build();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"1s 500ms\""));

        let parsed = BridgeConfig::from_json(&json).unwrap();
        assert_eq!(parsed.rate_limit.tick_interval, Duration::from_millis(1500));
    }
}
