//! Error types for gateway bridge operations
//!
//! This module provides error handling for the whole bridge: bootstrapping
//! the router connection, per-gateway stream traffic, protocol translation
//! and configuration.

use thiserror::Error;

/// Main error type for gateway bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Bootstrap Errors =====
    /// Router address could not be resolved
    #[error("Failed to resolve router address: {0}")]
    AddressResolution(String),

    /// Discovery server connection failed
    #[error("Failed to connect to discovery server {server}: {reason}")]
    DiscoveryFailed {
        /// Discovery server address
        server: String,
        /// Failure reason
        reason: String,
    },

    /// Dialing the router failed
    #[error("Failed to connect to router at {address}: {reason}")]
    ConnectionFailed {
        /// Router network address
        address: String,
        /// Failure reason
        reason: String,
    },

    // ===== Stream Errors =====
    /// Opening a gateway stream failed
    #[error("Failed to open {kind} stream for gateway {gateway_id}: {reason}")]
    StreamOpenFailed {
        /// Stream kind (uplink, downlink, status)
        kind: &'static str,
        /// Logical gateway identifier
        gateway_id: String,
        /// Failure reason
        reason: String,
    },

    /// Sending on a gateway stream failed
    #[error("Send failed on {kind} stream: {reason}")]
    SendFailed {
        /// Stream kind (uplink, status)
        kind: &'static str,
        /// Failure reason
        reason: String,
    },

    /// The stream was already closed
    #[error("{0} stream closed")]
    StreamClosed(&'static str),

    // ===== Translation Errors =====
    /// Downlink carries a radio protocol the bridge cannot forward
    #[error("Unsupported downlink protocol: {0}")]
    UnsupportedProtocol(String),

    /// LoRa datarate string could not be parsed
    #[error("Invalid datarate: {0}")]
    InvalidDataRate(String),

    // ===== Gateway Identity Errors =====
    /// Gateway EUI could not be parsed
    #[error("Invalid gateway EUI: {0}")]
    InvalidGatewayEui(String),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ===== General Errors =====
    /// The bridge has been shut down
    #[error("Gateway bridge is closed")]
    BridgeClosed,

    /// Outbound channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Check if this error is recoverable/retriable
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionFailed { .. }
                | BridgeError::DiscoveryFailed { .. }
                | BridgeError::StreamOpenFailed { .. }
                | BridgeError::SendFailed { .. }
        )
    }

    /// Check if this is a protocol error (bad data from the router)
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            BridgeError::UnsupportedProtocol(_) | BridgeError::InvalidDataRate(_)
        )
    }

    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::AddressResolution(_) => "ADDRESS_RESOLUTION",
            BridgeError::DiscoveryFailed { .. } => "DISCOVERY_FAILED",
            BridgeError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            BridgeError::StreamOpenFailed { .. } => "STREAM_OPEN_FAILED",
            BridgeError::SendFailed { .. } => "SEND_FAILED",
            BridgeError::StreamClosed(_) => "STREAM_CLOSED",
            BridgeError::UnsupportedProtocol(_) => "UNSUPPORTED_PROTOCOL",
            BridgeError::InvalidDataRate(_) => "INVALID_DATARATE",
            BridgeError::InvalidGatewayEui(_) => "INVALID_GATEWAY_EUI",
            BridgeError::InvalidConfig(_) => "INVALID_CONFIG",
            BridgeError::BridgeClosed => "BRIDGE_CLOSED",
            BridgeError::ChannelClosed => "CHANNEL_CLOSED",
            BridgeError::Json(_) => "JSON_ERROR",
            BridgeError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BridgeError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BridgeError::ChannelClosed
    }
}
