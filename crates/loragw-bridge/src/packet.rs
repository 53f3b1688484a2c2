//! Local gateway packet types
//!
//! These are the structures exchanged with the packet-forwarder side of the
//! bridge: received radio frames ([`RxPacket`]), frames to transmit
//! ([`TxPacket`]) and periodic gateway statistics ([`GatewayStatsPacket`]).
//!
//! Frequencies are in Hz and LoRa bandwidth is in Hz. The router schema
//! carries bandwidth in kHz inside its datarate string; see
//! [`crate::translator`].

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::gateway::GatewayAddress;

/// Radio modulation of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modulation {
    /// LoRa chirp spread spectrum
    #[default]
    Lora,
    /// Frequency shift keying
    Fsk,
}

/// Modulation-dependent datarate
///
/// `spread_factor` and `bandwidth` apply to LoRa, `bit_rate` to FSK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataRate {
    /// Modulation
    pub modulation: Modulation,
    /// LoRa spreading factor
    #[serde(default)]
    pub spread_factor: u32,
    /// LoRa bandwidth (Hz)
    #[serde(default)]
    pub bandwidth: u32,
    /// FSK bit rate (bits/s)
    #[serde(default)]
    pub bit_rate: u32,
}

impl DataRate {
    /// LoRa datarate
    pub fn lora(spread_factor: u32, bandwidth: u32) -> Self {
        Self {
            modulation: Modulation::Lora,
            spread_factor,
            bandwidth,
            bit_rate: 0,
        }
    }

    /// FSK datarate
    pub fn fsk(bit_rate: u32) -> Self {
        Self {
            modulation: Modulation::Fsk,
            spread_factor: 0,
            bandwidth: 0,
            bit_rate,
        }
    }
}

/// Receive metadata of an uplink frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RxInfo {
    /// Gateway that received the frame
    pub mac: GatewayAddress,
    /// Wall-clock receive time, when the gateway has a time source
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    /// Concentrator counter (microseconds)
    pub timestamp: u32,
    /// Frequency (Hz)
    pub frequency: u32,
    /// Concentrator IF channel
    pub channel: u32,
    /// RF chain
    pub rf_chain: u32,
    /// Datarate
    pub data_rate: DataRate,
    /// Coding rate, e.g. `4/5`
    pub code_rate: String,
    /// RSSI (dBm)
    pub rssi: i32,
    /// LoRa SNR (dB)
    pub lora_snr: f64,
    /// Payload size
    #[serde(default)]
    pub size: u32,
}

/// Uplink frame received by a gateway
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RxPacket {
    /// Receive metadata
    pub rx_info: RxInfo,
    /// PHY payload
    pub phy_payload: Bytes,
}

/// Transmit parameters of a downlink frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TxInfo {
    /// Gateway that must transmit the frame
    pub mac: GatewayAddress,
    /// Concentrator counter at which to transmit
    pub timestamp: u32,
    /// Frequency (Hz)
    pub frequency: u32,
    /// TX power (dBm)
    pub power: i32,
    /// Datarate
    pub data_rate: DataRate,
    /// Coding rate
    pub code_rate: String,
}

/// Downlink frame for a gateway to transmit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TxPacket {
    /// Transmit parameters
    pub tx_info: TxInfo,
    /// PHY payload
    pub phy_payload: Bytes,
}

/// Periodic gateway statistics
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GatewayStatsPacket {
    /// Reporting gateway
    pub mac: GatewayAddress,
    /// Report time
    pub time: DateTime<Utc>,
    /// GPS latitude
    #[serde(default)]
    pub latitude: f64,
    /// GPS longitude
    #[serde(default)]
    pub longitude: f64,
    /// GPS altitude (m)
    #[serde(default)]
    pub altitude: f64,
    /// Frames received
    pub rx_packets_received: u64,
    /// Frames received with a valid CRC
    pub rx_packets_received_ok: u64,
    /// Free-form extension fields
    #[serde(default)]
    pub custom_data: HashMap<String, Value>,
}

impl GatewayStatsPacket {
    /// Typed lookup of an extension field
    pub fn extension<'a, T: FromExtension<'a>>(&'a self, key: &str) -> ExtensionField<T> {
        match self.custom_data.get(key) {
            None => ExtensionField::Absent,
            Some(value) => match T::from_extension(value) {
                Some(v) => ExtensionField::Present(v),
                None => ExtensionField::WrongType,
            },
        }
    }

    /// Whether any GPS coordinate is set
    pub fn has_location(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0 || self.altitude != 0.0
    }
}

/// Outcome of a typed extension lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionField<T> {
    /// Key not present
    Absent,
    /// Key present but holding another type
    WrongType,
    /// Key present with the expected type
    Present(T),
}

impl<T> ExtensionField<T> {
    /// The value, treating absent and mistyped fields alike
    pub fn present(self) -> Option<T> {
        match self {
            ExtensionField::Present(v) => Some(v),
            ExtensionField::Absent | ExtensionField::WrongType => None,
        }
    }
}

/// Conversion from a raw extension value
pub trait FromExtension<'a>: Sized {
    /// `None` when the value has another type
    fn from_extension(value: &'a Value) -> Option<Self>;
}

impl<'a> FromExtension<'a> for &'a str {
    fn from_extension(value: &'a Value) -> Option<Self> {
        value.as_str()
    }
}

impl<'a> FromExtension<'a> for Vec<String> {
    fn from_extension(value: &'a Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}
