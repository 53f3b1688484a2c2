//! Router wire messages
//!
//! Protobuf schema spoken on the gateway streams of the router. Field tags
//! follow the router's published `.proto` definitions, so encoded messages
//! can be handed to any transport as-is.

use bytes::Bytes;

/// Radio modulation in the router schema
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Modulation {
    /// LoRa
    Lora = 0,
    /// FSK
    Fsk = 1,
}

/// LoRaWAN receive metadata
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LorawanMetadata {
    /// Modulation
    #[prost(enumeration = "Modulation", tag = "11")]
    pub modulation: i32,
    /// LoRa datarate, `SF<sf>BW<khz>`; empty for FSK
    #[prost(string, tag = "12")]
    pub data_rate: String,
    /// FSK bit rate
    #[prost(uint32, tag = "13")]
    pub bit_rate: u32,
    /// Coding rate
    #[prost(string, tag = "14")]
    pub coding_rate: String,
}

/// Protocol-specific receive metadata
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RxMetadata {
    /// Radio protocol
    #[prost(oneof = "rx_metadata::Protocol", tags = "1")]
    pub protocol: Option<rx_metadata::Protocol>,
}

/// Nested types of [`RxMetadata`]
pub mod rx_metadata {
    /// Radio protocol of an uplink
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Protocol {
        /// LoRaWAN
        #[prost(message, tag = "1")]
        Lorawan(super::LorawanMetadata),
    }
}

/// Gateway-side receive metadata
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GatewayRxMetadata {
    /// Logical gateway id
    #[prost(string, tag = "1")]
    pub gateway_id: String,
    /// Concentrator counter
    #[prost(uint32, tag = "11")]
    pub timestamp: u32,
    /// Receive time (unix nanoseconds)
    #[prost(int64, tag = "12")]
    pub time: i64,
    /// RF chain
    #[prost(uint32, tag = "21")]
    pub rf_chain: u32,
    /// IF channel
    #[prost(uint32, tag = "22")]
    pub channel: u32,
    /// Frequency (Hz)
    #[prost(uint64, tag = "31")]
    pub frequency: u64,
    /// RSSI (dBm)
    #[prost(float, tag = "32")]
    pub rssi: f32,
    /// SNR (dB)
    #[prost(float, tag = "33")]
    pub snr: f32,
}

/// Uplink sent to the router
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UplinkMessage {
    /// PHY payload
    #[prost(bytes = "bytes", tag = "1")]
    pub payload: Bytes,
    /// Protocol metadata
    #[prost(message, optional, tag = "11")]
    pub protocol_metadata: Option<RxMetadata>,
    /// Gateway metadata
    #[prost(message, optional, tag = "12")]
    pub gateway_metadata: Option<GatewayRxMetadata>,
}

/// LoRaWAN transmit configuration
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LorawanTxConfiguration {
    /// Modulation
    #[prost(enumeration = "Modulation", tag = "11")]
    pub modulation: i32,
    /// LoRa datarate, `SF<sf>BW<khz>`
    #[prost(string, tag = "12")]
    pub data_rate: String,
    /// FSK bit rate
    #[prost(uint32, tag = "13")]
    pub bit_rate: u32,
    /// Coding rate
    #[prost(string, tag = "14")]
    pub coding_rate: String,
    /// Frame counter
    #[prost(uint32, tag = "15")]
    pub f_cnt: u32,
}

/// Protocol-specific transmit configuration
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxConfiguration {
    /// Radio protocol
    #[prost(oneof = "tx_configuration::Protocol", tags = "1")]
    pub protocol: Option<tx_configuration::Protocol>,
}

/// Nested types of [`TxConfiguration`]
pub mod tx_configuration {
    /// Radio protocol of a downlink
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Protocol {
        /// LoRaWAN
        #[prost(message, tag = "1")]
        Lorawan(super::LorawanTxConfiguration),
    }
}

/// Gateway-side transmit configuration
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GatewayTxConfiguration {
    /// Concentrator counter at which to transmit
    #[prost(uint32, tag = "11")]
    pub timestamp: u32,
    /// RF chain
    #[prost(uint32, tag = "21")]
    pub rf_chain: u32,
    /// Frequency (Hz)
    #[prost(uint64, tag = "22")]
    pub frequency: u64,
    /// TX power (dBm)
    #[prost(int32, tag = "23")]
    pub power: i32,
    /// Polarization inversion
    #[prost(bool, tag = "31")]
    pub polarization_inversion: bool,
}

/// Downlink received from the router
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DownlinkMessage {
    /// PHY payload
    #[prost(bytes = "bytes", tag = "1")]
    pub payload: Bytes,
    /// Protocol configuration
    #[prost(message, optional, tag = "11")]
    pub protocol_configuration: Option<TxConfiguration>,
    /// Gateway configuration
    #[prost(message, optional, tag = "12")]
    pub gateway_configuration: Option<GatewayTxConfiguration>,
}

/// Gateway location
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GpsMetadata {
    /// Latitude
    #[prost(float, tag = "2")]
    pub latitude: f32,
    /// Longitude
    #[prost(float, tag = "3")]
    pub longitude: f32,
    /// Altitude (m)
    #[prost(int32, tag = "4")]
    pub altitude: i32,
}

/// Gateway status report
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GatewayStatus {
    /// Concentrator counter
    #[prost(uint32, tag = "1")]
    pub timestamp: u32,
    /// Report time (unix nanoseconds)
    #[prost(int64, tag = "2")]
    pub time: i64,
    /// Gateway IP addresses
    #[prost(string, repeated, tag = "11")]
    pub ip: Vec<String>,
    /// Platform description
    #[prost(string, tag = "12")]
    pub platform: String,
    /// Owner contact
    #[prost(string, tag = "13")]
    pub contact_email: String,
    /// Free-text description
    #[prost(string, tag = "14")]
    pub description: String,
    /// Frequency plan region
    #[prost(string, tag = "15")]
    pub region: String,
    /// Location
    #[prost(message, optional, tag = "21")]
    pub gps: Option<GpsMetadata>,
    /// Round-trip time to the router (ms)
    #[prost(uint32, tag = "31")]
    pub rtt: u32,
    /// Frames received
    #[prost(uint32, tag = "41")]
    pub rx_in: u32,
    /// Frames received with a valid CRC
    #[prost(uint32, tag = "42")]
    pub rx_ok: u32,
}
