//! Bridge-wide status defaults
//!
//! Every outgoing [`GatewayStatus`] starts as a copy of these fields. They
//! are changed only through the setters, never per gateway.

use parking_lot::RwLock;

use crate::config::StatusConfig;
use crate::router::GatewayStatus;

/// Default fields merged into every status report
#[derive(Debug, Default)]
pub struct StatusDefaults {
    fields: RwLock<GatewayStatus>,
}

impl StatusDefaults {
    /// Defaults with the given region and RTT
    pub fn new(region: impl Into<String>, rtt: u32) -> Self {
        Self {
            fields: RwLock::new(GatewayStatus {
                region: region.into(),
                rtt,
                ..Default::default()
            }),
        }
    }

    /// Set the region label
    pub fn set_region(&self, region: impl Into<String>) {
        self.fields.write().region = region.into();
    }

    /// Set the round-trip time estimate
    pub fn set_rtt(&self, rtt: u32) {
        self.fields.write().rtt = rtt;
    }

    /// Current region label
    pub fn region(&self) -> String {
        self.fields.read().region.clone()
    }

    /// Current round-trip time estimate
    pub fn rtt(&self) -> u32 {
        self.fields.read().rtt
    }

    /// Copy of the current defaults
    pub fn snapshot(&self) -> GatewayStatus {
        self.fields.read().clone()
    }
}

impl From<&StatusConfig> for StatusDefaults {
    fn from(config: &StatusConfig) -> Self {
        Self::new(config.region.clone(), config.rtt)
    }
}
