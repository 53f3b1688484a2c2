//! Translation between local gateway packets and router messages
//!
//! | Local | Router |
//! |-------|--------|
//! | [`RxPacket`] | [`UplinkMessage`] |
//! | [`TxPacket`] | [`DownlinkMessage`] |
//! | [`GatewayStatsPacket`] | [`GatewayStatus`] |
//!
//! # Datarates
//!
//! LoRa datarates travel as `SF<spreading factor>BW<bandwidth kHz>` strings
//! (`SF7BW125`), with the bit rate left at zero. FSK datarates travel as a
//! plain bit rate with an empty datarate string. Locally the LoRa bandwidth
//! is kept in Hz.
//!
//! # Status extension fields
//!
//! `platform`, `contactEmail`, `description` (strings) and `ip` (list of
//! strings) are read from the stats packet's custom data. A field is applied
//! only when present with the expected type; otherwise the default value is
//! kept.

use tracing::trace;

use crate::error::{BridgeError, Result};
use crate::gateway::GatewayAddress;
use crate::packet::{DataRate, GatewayStatsPacket, Modulation, RxPacket, TxInfo, TxPacket};
use crate::router::messages::{
    rx_metadata, tx_configuration, GatewayRxMetadata, GpsMetadata, LorawanMetadata,
    Modulation as WireModulation, RxMetadata,
};
use crate::router::{DownlinkMessage, GatewayStatus, UplinkMessage};

/// Custom data key: platform description
pub const EXT_PLATFORM: &str = "platform";
/// Custom data key: owner contact
pub const EXT_CONTACT_EMAIL: &str = "contactEmail";
/// Custom data key: free-text description
pub const EXT_DESCRIPTION: &str = "description";
/// Custom data key: IP address list
pub const EXT_IP: &str = "ip";

/// Stateless translator between local packets and router messages
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolTranslator;

impl ProtocolTranslator {
    /// Create a translator
    pub fn new() -> Self {
        Self
    }

    /// Translate a received frame into a router uplink
    pub fn rx_to_uplink(&self, packet: &RxPacket) -> UplinkMessage {
        let rx = &packet.rx_info;

        let (modulation, data_rate, bit_rate) = match rx.data_rate.modulation {
            Modulation::Lora => (
                WireModulation::Lora,
                format_lora_datarate(rx.data_rate.spread_factor, rx.data_rate.bandwidth),
                0,
            ),
            Modulation::Fsk => (WireModulation::Fsk, String::new(), rx.data_rate.bit_rate),
        };

        trace!(gateway = %rx.mac, data_rate = %data_rate, "Translating uplink");

        UplinkMessage {
            payload: packet.phy_payload.clone(),
            protocol_metadata: Some(RxMetadata {
                protocol: Some(rx_metadata::Protocol::Lorawan(LorawanMetadata {
                    modulation: modulation as i32,
                    data_rate,
                    bit_rate,
                    coding_rate: rx.code_rate.clone(),
                })),
            }),
            gateway_metadata: Some(GatewayRxMetadata {
                gateway_id: rx.mac.default_gateway_id(),
                timestamp: rx.timestamp,
                time: rx
                    .time
                    .and_then(|t| t.timestamp_nanos_opt())
                    .unwrap_or_default(),
                rf_chain: rx.rf_chain,
                channel: rx.channel,
                frequency: u64::from(rx.frequency),
                rssi: rx.rssi as f32,
                snr: rx.lora_snr as f32,
            }),
        }
    }

    /// Translate a router downlink into a frame for `mac` to transmit
    ///
    /// Fails with [`BridgeError::UnsupportedProtocol`] when the downlink is
    /// not LoRaWAN or uses an unknown modulation, and with
    /// [`BridgeError::InvalidDataRate`] when a LoRa datarate cannot be parsed.
    pub fn downlink_to_tx(
        &self,
        mac: GatewayAddress,
        message: &DownlinkMessage,
    ) -> Result<TxPacket> {
        let lora = match message
            .protocol_configuration
            .as_ref()
            .and_then(|c| c.protocol.as_ref())
        {
            Some(tx_configuration::Protocol::Lorawan(lora)) => lora,
            None => {
                return Err(BridgeError::UnsupportedProtocol(
                    "no LoRaWAN configuration".to_string(),
                ))
            }
        };

        let data_rate = match WireModulation::try_from(lora.modulation) {
            Ok(WireModulation::Lora) => {
                let (spread_factor, bandwidth_khz) = parse_lora_datarate(&lora.data_rate)?;
                DataRate::lora(spread_factor, bandwidth_khz.saturating_mul(1000))
            }
            Ok(WireModulation::Fsk) => DataRate::fsk(lora.bit_rate),
            Err(_) => {
                return Err(BridgeError::UnsupportedProtocol(format!(
                    "unknown modulation {}",
                    lora.modulation
                )))
            }
        };

        let gateway = message.gateway_configuration.clone().unwrap_or_default();
        let frequency = u32::try_from(gateway.frequency).map_err(|_| {
            let reason = format!("frequency {} out of range", gateway.frequency);
            BridgeError::UnsupportedProtocol(reason)
        })?;

        Ok(TxPacket {
            tx_info: TxInfo {
                mac,
                timestamp: gateway.timestamp,
                frequency,
                power: gateway.power,
                data_rate,
                code_rate: lora.coding_rate.clone(),
            },
            phy_payload: message.payload.clone(),
        })
    }

    /// Translate gateway statistics into a router status report
    ///
    /// Starts from a copy of `defaults`; the translator never overrides the
    /// default region or RTT.
    pub fn stats_to_status(
        &self,
        defaults: &GatewayStatus,
        stats: &GatewayStatsPacket,
    ) -> GatewayStatus {
        let mut status = defaults.clone();

        status.time = stats.time.timestamp_nanos_opt().unwrap_or_default();
        status.rx_in = saturating_u32(stats.rx_packets_received);
        status.rx_ok = saturating_u32(stats.rx_packets_received_ok);

        if let Some(platform) = stats.extension::<&str>(EXT_PLATFORM).present() {
            status.platform = platform.to_string();
        }
        if let Some(contact_email) = stats.extension::<&str>(EXT_CONTACT_EMAIL).present() {
            status.contact_email = contact_email.to_string();
        }
        if let Some(description) = stats.extension::<&str>(EXT_DESCRIPTION).present() {
            status.description = description.to_string();
        }
        if let Some(ip) = stats.extension::<Vec<String>>(EXT_IP).present() {
            status.ip = ip;
        }

        if stats.has_location() {
            status.gps = Some(GpsMetadata {
                latitude: stats.latitude as f32,
                longitude: stats.longitude as f32,
                altitude: stats.altitude as i32,
            });
        }

        status
    }
}

/// Format a LoRa datarate string; `bandwidth` is in Hz
pub fn format_lora_datarate(spread_factor: u32, bandwidth: u32) -> String {
    format!("SF{}BW{}", spread_factor, bandwidth / 1000)
}

/// Parse `SF<n>BW<m>` into spreading factor and bandwidth in kHz
pub fn parse_lora_datarate(data_rate: &str) -> Result<(u32, u32)> {
    let invalid = || BridgeError::InvalidDataRate(data_rate.to_string());

    let rest = data_rate.strip_prefix("SF").ok_or_else(invalid)?;
    let (sf, bw) = rest.split_once("BW").ok_or_else(invalid)?;
    let spread_factor: u32 = sf.parse().map_err(|_| invalid())?;
    let bandwidth: u32 = bw.parse().map_err(|_| invalid())?;

    if spread_factor == 0 || bandwidth == 0 {
        return Err(invalid());
    }
    Ok((spread_factor, bandwidth))
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::RxInfo;
    use crate::router::messages::{GatewayTxConfiguration, LorawanTxConfiguration, TxConfiguration};
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn gateway() -> GatewayAddress {
        GatewayAddress::from(0x0102030405060708u64)
    }

    fn rx_packet(data_rate: DataRate) -> RxPacket {
        RxPacket {
            rx_info: RxInfo {
                mac: gateway(),
                time: Some(Utc.timestamp_opt(1_500_000_000, 250).unwrap()),
                timestamp: 123_456,
                frequency: 868_100_000,
                channel: 2,
                rf_chain: 1,
                data_rate,
                code_rate: "4/5".to_string(),
                rssi: -57,
                lora_snr: 7.5,
                size: 3,
            },
            phy_payload: Bytes::from_static(&[0x40, 0x01, 0x02]),
        }
    }

    fn lorawan(message: &UplinkMessage) -> &LorawanMetadata {
        match message
            .protocol_metadata
            .as_ref()
            .and_then(|m| m.protocol.as_ref())
        {
            Some(rx_metadata::Protocol::Lorawan(lora)) => lora,
            None => panic!("uplink without LoRaWAN metadata"),
        }
    }

    fn downlink(modulation: i32, data_rate: &str, bit_rate: u32) -> DownlinkMessage {
        DownlinkMessage {
            payload: Bytes::from_static(b"\x60\xAA"),
            protocol_configuration: Some(TxConfiguration {
                protocol: Some(tx_configuration::Protocol::Lorawan(LorawanTxConfiguration {
                    modulation,
                    data_rate: data_rate.to_string(),
                    bit_rate,
                    coding_rate: "4/5".to_string(),
                    f_cnt: 3,
                })),
            }),
            gateway_configuration: Some(GatewayTxConfiguration {
                timestamp: 2_000_000,
                frequency: 869_525_000,
                power: 14,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_lora_uplink_datarate() {
        let uplink = ProtocolTranslator::new().rx_to_uplink(&rx_packet(DataRate::lora(7, 125_000)));
        let lora = lorawan(&uplink);

        assert_eq!(lora.modulation, WireModulation::Lora as i32);
        assert_eq!(lora.data_rate, "SF7BW125");
        assert_eq!(lora.bit_rate, 0);
        assert_eq!(lora.coding_rate, "4/5");
    }

    #[test]
    fn test_fsk_uplink_datarate() {
        let uplink = ProtocolTranslator::new().rx_to_uplink(&rx_packet(DataRate::fsk(50_000)));
        let lora = lorawan(&uplink);

        assert_eq!(lora.modulation, WireModulation::Fsk as i32);
        assert_eq!(lora.data_rate, "");
        assert_eq!(lora.bit_rate, 50_000);
    }

    #[test]
    fn test_uplink_gateway_metadata() {
        let uplink = ProtocolTranslator::new().rx_to_uplink(&rx_packet(DataRate::lora(9, 125_000)));
        let meta = uplink.gateway_metadata.unwrap();

        assert_eq!(meta.gateway_id, gateway().default_gateway_id());
        assert_eq!(meta.timestamp, 123_456);
        assert_eq!(meta.time, 1_500_000_000_000_000_250);
        assert_eq!(meta.frequency, 868_100_000);
        assert_eq!(meta.channel, 2);
        assert_eq!(meta.rf_chain, 1);
        assert_eq!(meta.rssi, -57.0);
        assert_eq!(meta.snr, 7.5);
        assert_eq!(uplink.payload.as_ref(), &[0x40, 0x01, 0x02]);
    }

    #[test]
    fn test_uplink_without_time() {
        let mut packet = rx_packet(DataRate::lora(7, 125_000));
        packet.rx_info.time = None;
        let uplink = ProtocolTranslator::new().rx_to_uplink(&packet);
        assert_eq!(uplink.gateway_metadata.unwrap().time, 0);
    }

    #[test]
    fn test_parse_lora_datarate() {
        assert_eq!(parse_lora_datarate("SF7BW125").unwrap(), (7, 125));
        assert_eq!(parse_lora_datarate("SF12BW500").unwrap(), (12, 500));
        assert!(parse_lora_datarate("").is_err());
        assert!(parse_lora_datarate("SF7").is_err());
        assert!(parse_lora_datarate("BW125SF7").is_err());
        assert!(parse_lora_datarate("SF0BW125").is_err());
        assert!(parse_lora_datarate("SFxBW125").is_err());
    }

    #[test]
    fn test_lora_downlink() {
        let tx = ProtocolTranslator::new()
            .downlink_to_tx(gateway(), &downlink(WireModulation::Lora as i32, "SF7BW125", 0))
            .unwrap();

        assert_eq!(tx.tx_info.mac, gateway());
        assert_eq!(tx.tx_info.data_rate, DataRate::lora(7, 125_000));
        assert_eq!(tx.tx_info.timestamp, 2_000_000);
        assert_eq!(tx.tx_info.frequency, 869_525_000);
        assert_eq!(tx.tx_info.power, 14);
        assert_eq!(tx.tx_info.code_rate, "4/5");
        assert_eq!(tx.phy_payload.as_ref(), b"\x60\xAA");
    }

    #[test]
    fn test_fsk_downlink() {
        let tx = ProtocolTranslator::new()
            .downlink_to_tx(gateway(), &downlink(WireModulation::Fsk as i32, "", 50_000))
            .unwrap();
        assert_eq!(tx.tx_info.data_rate, DataRate::fsk(50_000));
    }

    #[test]
    fn test_lora_datarate_survives_both_directions() {
        let translator = ProtocolTranslator::new();
        let uplink = translator.rx_to_uplink(&rx_packet(DataRate::lora(10, 250_000)));
        let data_rate = lorawan(&uplink).data_rate.clone();

        let tx = translator
            .downlink_to_tx(gateway(), &downlink(WireModulation::Lora as i32, &data_rate, 0))
            .unwrap();
        assert_eq!(tx.tx_info.data_rate, DataRate::lora(10, 250_000));
    }

    #[test]
    fn test_downlink_rejections() {
        let translator = ProtocolTranslator::new();

        let unknown = translator.downlink_to_tx(gateway(), &downlink(7, "SF7BW125", 0));
        assert!(matches!(unknown, Err(BridgeError::UnsupportedProtocol(_))));

        let mut no_protocol = downlink(WireModulation::Lora as i32, "SF7BW125", 0);
        no_protocol.protocol_configuration = None;
        assert!(matches!(
            translator.downlink_to_tx(gateway(), &no_protocol),
            Err(BridgeError::UnsupportedProtocol(_))
        ));

        let bad_rate = translator.downlink_to_tx(gateway(), &downlink(0, "fast", 0));
        assert!(matches!(bad_rate, Err(BridgeError::InvalidDataRate(_))));
    }

    #[test]
    fn test_status_merges_defaults_and_typed_extensions() {
        let defaults = GatewayStatus {
            region: "EU868".to_string(),
            rtt: 40,
            ..Default::default()
        };
        let mut stats = GatewayStatsPacket {
            mac: gateway(),
            time: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            rx_packets_received: 12,
            rx_packets_received_ok: 10,
            ..Default::default()
        };
        stats.custom_data.insert(EXT_PLATFORM.to_string(), json!("IMST + Rpi"));
        stats.custom_data.insert(EXT_IP.to_string(), json!("10.0.0.1"));
        stats.custom_data.insert(EXT_DESCRIPTION.to_string(), json!(42));

        let status = ProtocolTranslator::new().stats_to_status(&defaults, &stats);

        assert_eq!(status.region, "EU868");
        assert_eq!(status.rtt, 40);
        assert_eq!(status.platform, "IMST + Rpi");
        assert!(status.ip.is_empty());
        assert_eq!(status.description, "");
        assert_eq!(status.contact_email, "");
        assert_eq!(status.rx_in, 12);
        assert_eq!(status.rx_ok, 10);
        assert_eq!(status.time, 1_600_000_000_000_000_000);
        assert!(status.gps.is_none());
    }

    #[test]
    fn test_status_ip_list_and_gps() {
        let mut stats = GatewayStatsPacket {
            latitude: 52.37,
            longitude: 4.89,
            altitude: 0.0,
            ..Default::default()
        };
        stats
            .custom_data
            .insert(EXT_IP.to_string(), json!(["192.168.1.2", "10.0.0.1"]));
        stats
            .custom_data
            .insert(EXT_CONTACT_EMAIL.to_string(), json!("ops@example.org"));

        let status = ProtocolTranslator::new().stats_to_status(&GatewayStatus::default(), &stats);

        assert_eq!(status.ip, vec!["192.168.1.2".to_string(), "10.0.0.1".to_string()]);
        assert_eq!(status.contact_email, "ops@example.org");
        let gps = status.gps.unwrap();
        assert!((gps.latitude - 52.37).abs() < 1e-4);
        assert!((gps.longitude - 4.89).abs() < 1e-4);
        assert_eq!(gps.altitude, 0);
    }

    #[test]
    fn test_status_counters_saturate() {
        let stats = GatewayStatsPacket {
            rx_packets_received: u64::from(u32::MAX) + 10,
            ..Default::default()
        };
        let status = ProtocolTranslator::new().stats_to_status(&GatewayStatus::default(), &stats);
        assert_eq!(status.rx_in, u32::MAX);
    }
}
