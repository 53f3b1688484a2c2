//! Gateway identity
//!
//! Gateways are keyed by their 8-byte hardware address (EUI-64). The router
//! knows them by a logical gateway id and an access token; when no override
//! is configured both are derived from the address.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Placeholder access token for gateways without a configured override
pub const DEFAULT_GATEWAY_TOKEN: &str = "token";

/// Prefix of logical ids derived from a gateway address
pub const GATEWAY_ID_PREFIX: &str = "eui-";

/// 8-byte gateway hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GatewayAddress([u8; 8]);

impl GatewayAddress {
    /// Create an address from raw bytes
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Logical gateway id derived from this address (`eui-` + lowercase hex)
    ///
    /// Used both for registry defaults and for the gateway id stamped on
    /// translated uplinks, so the two always agree.
    pub fn default_gateway_id(&self) -> String {
        format!("{}{}", GATEWAY_ID_PREFIX, self)
    }
}

impl From<[u8; 8]> for GatewayAddress {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl From<u64> for GatewayAddress {
    fn from(value: u64) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Display for GatewayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for GatewayAddress {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| BridgeError::InvalidGatewayEui(format!("{s}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for GatewayAddress {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GatewayAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Router identity override for a single gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Logical gateway id known to the router
    pub id: String,
    /// Access token forwarded to the router
    pub token: String,
}

impl GatewayConfig {
    /// Create a new override
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
        }
    }

    /// Identity used for a gateway with no registered override
    pub fn derived(addr: &GatewayAddress) -> Self {
        Self {
            id: addr.default_gateway_id(),
            token: DEFAULT_GATEWAY_TOKEN.to_string(),
        }
    }
}
