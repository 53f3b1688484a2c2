//! Router client abstractions
//!
//! The bridge does not own a transport. It talks to the network-server
//! router through these traits, which a transport crate (gRPC, in-process,
//! test mocks) implements:
//!
//! - [`RouterConnection`] - the shared connection, one per bridge
//! - [`GatewayClient`] - a gateway-scoped handle carrying id and token
//! - [`UplinkStream`], [`StatusStream`], [`DownlinkStream`] - monitored
//!   per-gateway streams
//!
//! Stream `close` operations must be idempotent. A closed downlink stream
//! yields `None` from [`DownlinkStream::recv`] once any buffered messages
//! have been drained.

pub mod messages;

pub use messages::{
    DownlinkMessage, GatewayRxMetadata, GatewayStatus, GatewayTxConfiguration, GpsMetadata,
    LorawanMetadata, LorawanTxConfiguration, Modulation, RxMetadata, TxConfiguration,
    UplinkMessage,
};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// Shared connection to the router
#[async_trait]
pub trait RouterConnection: Send + Sync {
    /// Create a client handle scoped to one gateway
    fn gateway_client(&self, gateway_id: &str, token: &str) -> Arc<dyn GatewayClient>;

    /// Close the connection
    async fn close(&self);
}

/// Gateway-scoped router client
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Open the uplink stream
    async fn open_uplink_stream(&self) -> Result<Arc<dyn UplinkStream>>;

    /// Open the status stream
    async fn open_status_stream(&self) -> Result<Arc<dyn StatusStream>>;

    /// Open the downlink stream
    async fn open_downlink_stream(&self) -> Result<Arc<dyn DownlinkStream>>;

    /// Close the client
    async fn close(&self);
}

/// Uplink stream of one gateway
#[async_trait]
pub trait UplinkStream: Send + Sync {
    /// Send an uplink
    async fn send(&self, message: UplinkMessage) -> Result<()>;

    /// Close the stream
    async fn close(&self);
}

/// Status stream of one gateway
#[async_trait]
pub trait StatusStream: Send + Sync {
    /// Send a status report
    async fn send(&self, status: GatewayStatus) -> Result<()>;

    /// Close the stream
    async fn close(&self);
}

/// Downlink stream of one gateway
#[async_trait]
pub trait DownlinkStream: Send + Sync {
    /// Next downlink, or `None` once the stream is closed and drained
    async fn recv(&self) -> Option<DownlinkMessage>;

    /// Close the stream
    async fn close(&self);
}

/// Stream kind, used in logs and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Gateway -> router data
    Uplink,
    /// Router -> gateway commands
    Downlink,
    /// Gateway status reports
    Status,
}

impl StreamKind {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Uplink => "uplink",
            StreamKind::Downlink => "downlink",
            StreamKind::Status => "status",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
