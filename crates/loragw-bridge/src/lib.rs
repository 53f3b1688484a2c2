//! LoRa Gateway Bridge to a Network-Server Router
//!
//! This crate connects many physical LoRa gateways to one network-server
//! router. Traffic for every gateway is multiplexed over a single shared
//! router connection; each gateway, identified by its 8-byte EUI, gets its
//! own logical session with an uplink, a status and a downlink stream.
//!
//! # Architecture
//!
//! The bridge is built from four layers:
//!
//! 1. **Bootstrap** - resolves the router (static address or discovery) and
//!    dials the shared connection
//! 2. **Sessions** - a lazily populated registry holding one session per
//!    gateway, each with its own uplink rate counter
//! 3. **Protocol Translation** - local packets <-> router wire messages
//! 4. **Bridge Facade** - publish / subscribe operations used by the
//!    packet-forwarder side
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use loragw_bridge::{BridgeConfigBuilder, GatewayBridge};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfigBuilder::new()
//!         .router_address("router.example.org:1901")
//!         .rx_rate_limit(60.0)
//!         .region("EU868")
//!         .build();
//!
//!     // `dialer` is the transport's RouterDialer implementation
//!     let (bridge, mut tx_packets) = GatewayBridge::connect(config, &dialer, None).await?;
//!
//!     bridge.subscribe_gateway_tx("b827ebfffe000001".parse()?).await?;
//!     while let Some(packet) = tx_packets.recv().await {
//!         println!("Transmit {} bytes on {}", packet.phy_payload.len(), packet.tx_info.mac);
//!     }
//!
//!     bridge.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Message Flow
//!
//! ## Gateway -> Router
//!
//! 1. `publish_gateway_rx` gets or creates the gateway's session
//! 2. The session's rate counter records the uplink and the admission gate
//!    drops it if the gateway is over the configured ceiling
//! 3. ProtocolTranslator converts the RX packet to an `UplinkMessage`
//! 4. The uplink is sent on the gateway's uplink stream
//!
//! Statistics follow the same path through `publish_gateway_stats`, merged
//! with the bridge-wide status defaults, without admission.
//!
//! ## Router -> Gateway
//!
//! 1. `subscribe_gateway_tx` opens the gateway's downlink stream
//! 2. A delivery task reads each `DownlinkMessage`
//! 3. ProtocolTranslator converts it to a `TxPacket`; untranslatable
//!    downlinks are logged and skipped
//! 4. The packet is forwarded onto the TX channel shared by all gateways
//!
//! # Datarates
//!
//! LoRa bandwidth is carried in Hz on the local side and in kHz inside the
//! router's `SF{sf}BW{bw}` datarate string. FSK uses a plain bit rate.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Core types
pub mod config;
pub mod error;
pub mod gateway;
pub mod packet;
pub mod router;

// Session management
pub mod rate;
pub mod registry;
pub mod session;

// Translation and delivery
pub mod downlink;
pub mod status;
pub mod translator;

// Bridge
pub mod bootstrap;
pub mod bridge;
pub mod stats;

// Testing utilities
pub mod test_utils;

// Re-exports for convenience - core types
pub use config::{
    BridgeConfig, BridgeConfigBuilder, GatewayOverride, RateLimitConfig, RouterConfig,
    RouterEndpoint, StatusConfig,
};
pub use error::{BridgeError, Result};
pub use gateway::{GatewayAddress, GatewayConfig};
pub use packet::{
    DataRate, ExtensionField, FromExtension, GatewayStatsPacket, Modulation, RxInfo, RxPacket,
    TxInfo, TxPacket,
};
pub use router::{
    DownlinkStream, GatewayClient, RouterConnection, StatusStream, StreamKind, UplinkStream,
};

// Re-exports for convenience - sessions
pub use rate::RateCounter;
pub use registry::SessionRegistry;
pub use session::Session;

// Re-exports for convenience - translation and delivery
pub use downlink::{DownlinkSubscriber, SubscriptionState};
pub use status::StatusDefaults;
pub use translator::ProtocolTranslator;

// Re-exports for convenience - bridge
pub use bootstrap::{Announcement, Discovery, DiscoveryClient, RouterDialer};
pub use bridge::GatewayBridge;
pub use stats::BridgeStats;

// Constants re-exports
pub use bootstrap::SERVICE_NAME;
pub use config::DEFAULT_TX_QUEUE_SIZE;
pub use gateway::{DEFAULT_GATEWAY_TOKEN, GATEWAY_ID_PREFIX};
pub use rate::TICK_INTERVAL;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
