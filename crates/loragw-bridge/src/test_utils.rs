//! Test utilities for exercising the bridge without a real router
//!
//! [`MockRouter`] is an in-memory [`RouterConnection`] that records every
//! client, stream and message it sees. Downlinks are injected per gateway
//! with [`MockRouter::push_downlink`]. Opens and sends can be made to fail to
//! exercise error paths. [`MockDialer`] and [`MockDiscovery`] stand in for
//! the bootstrap collaborators.
//!
//! # Example
//!
//! ```rust,ignore
//! use loragw_bridge::test_utils::{lora_rx_packet, MockDialer, MockRouter};
//! use loragw_bridge::{BridgeConfigBuilder, GatewayBridge};
//!
//! let router = MockRouter::new();
//! let dialer = MockDialer::new(router.clone());
//! let config = BridgeConfigBuilder::new().build();
//! let (bridge, mut tx) = GatewayBridge::connect(config, &dialer, None).await?;
//!
//! bridge.publish_gateway_rx(lora_rx_packet(1u64.into())).await?;
//! assert_eq!(router.uplinks().len(), 1);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use crate::bootstrap::{Announcement, Discovery, DiscoveryClient, RouterDialer};
use crate::error::{BridgeError, Result};
use crate::gateway::GatewayAddress;
use crate::packet::{DataRate, GatewayStatsPacket, RxInfo, RxPacket};
use crate::router::messages::tx_configuration;
use crate::router::{
    DownlinkMessage, DownlinkStream, GatewayClient, GatewayStatus, GatewayTxConfiguration,
    LorawanTxConfiguration, Modulation, RouterConnection, StatusStream, StreamKind,
    TxConfiguration, UplinkMessage, UplinkStream,
};

#[derive(Default)]
struct RouterState {
    clients_opened: Mutex<Vec<(String, String)>>,
    clients_closed: AtomicUsize,
    uplink_opens: Mutex<HashMap<String, usize>>,
    status_opens: Mutex<HashMap<String, usize>>,
    downlinks: Mutex<HashMap<String, Vec<Arc<MockDownlinkStream>>>>,
    uplinks: Mutex<Vec<(String, UplinkMessage)>>,
    statuses: Mutex<Vec<(String, GatewayStatus)>>,
    fail_opens: AtomicBool,
    fail_sends: AtomicBool,
    closed: AtomicBool,
}

impl RouterState {
    fn check_open(&self, kind: &'static str, gateway_id: &str) -> Result<()> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(BridgeError::StreamOpenFailed {
                kind,
                gateway_id: gateway_id.to_string(),
                reason: "mock open failure".to_string(),
            });
        }
        Ok(())
    }

    fn check_send(&self, kind: &'static str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BridgeError::SendFailed {
                kind,
                reason: "mock send failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Recording in-memory router connection
#[derive(Clone, Default)]
pub struct MockRouter {
    state: Arc<RouterState>,
}

impl MockRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// `(gateway_id, token)` of every client handed out, in order
    pub fn clients_opened(&self) -> Vec<(String, String)> {
        self.state.clients_opened.lock().clone()
    }

    /// Number of client close calls
    pub fn clients_closed(&self) -> usize {
        self.state.clients_closed.load(Ordering::SeqCst)
    }

    /// Number of uplink streams opened for a gateway id
    pub fn uplink_streams_opened(&self, gateway_id: &str) -> usize {
        self.state
            .uplink_opens
            .lock()
            .get(gateway_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of status streams opened for a gateway id
    pub fn status_streams_opened(&self, gateway_id: &str) -> usize {
        self.state
            .status_opens
            .lock()
            .get(gateway_id)
            .copied()
            .unwrap_or(0)
    }

    /// Every downlink stream opened for a gateway id, oldest first
    pub fn downlink_streams(&self, gateway_id: &str) -> Vec<Arc<MockDownlinkStream>> {
        self.state
            .downlinks
            .lock()
            .get(gateway_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Deliver a downlink on the gateway's newest open downlink stream
    ///
    /// Returns `false` when no open stream exists.
    pub fn push_downlink(&self, gateway_id: &str, message: DownlinkMessage) -> bool {
        let stream = self
            .downlink_streams(gateway_id)
            .into_iter()
            .rev()
            .find(|s| !s.is_closed() && !s.is_ended());
        match stream {
            Some(stream) => stream.push(message),
            None => false,
        }
    }

    /// Uplinks sent, tagged with the sending gateway id
    pub fn uplinks(&self) -> Vec<(String, UplinkMessage)> {
        self.state.uplinks.lock().clone()
    }

    /// Status reports sent, tagged with the sending gateway id
    pub fn statuses(&self) -> Vec<(String, GatewayStatus)> {
        self.state.statuses.lock().clone()
    }

    /// Make stream opens fail
    pub fn set_fail_opens(&self, fail: bool) {
        self.state.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Make uplink and status sends fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Whether the connection was closed
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouterConnection for MockRouter {
    fn gateway_client(&self, gateway_id: &str, token: &str) -> Arc<dyn GatewayClient> {
        self.state
            .clients_opened
            .lock()
            .push((gateway_id.to_string(), token.to_string()));
        Arc::new(MockGatewayClient {
            gateway_id: gateway_id.to_string(),
            state: Arc::clone(&self.state),
        })
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

struct MockGatewayClient {
    gateway_id: String,
    state: Arc<RouterState>,
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    async fn open_uplink_stream(&self) -> Result<Arc<dyn UplinkStream>> {
        self.state.check_open(StreamKind::Uplink.as_str(), &self.gateway_id)?;
        *self
            .state
            .uplink_opens
            .lock()
            .entry(self.gateway_id.clone())
            .or_default() += 1;
        Ok(Arc::new(MockUplinkStream {
            gateway_id: self.gateway_id.clone(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_status_stream(&self) -> Result<Arc<dyn StatusStream>> {
        self.state.check_open(StreamKind::Status.as_str(), &self.gateway_id)?;
        *self
            .state
            .status_opens
            .lock()
            .entry(self.gateway_id.clone())
            .or_default() += 1;
        Ok(Arc::new(MockStatusStream {
            gateway_id: self.gateway_id.clone(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_downlink_stream(&self) -> Result<Arc<dyn DownlinkStream>> {
        self.state.check_open(StreamKind::Downlink.as_str(), &self.gateway_id)?;
        let stream = Arc::new(MockDownlinkStream::new());
        self.state
            .downlinks
            .lock()
            .entry(self.gateway_id.clone())
            .or_default()
            .push(Arc::clone(&stream));
        Ok(stream)
    }

    async fn close(&self) {
        self.state.clients_closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockUplinkStream {
    gateway_id: String,
    state: Arc<RouterState>,
    closed: AtomicBool,
}

#[async_trait]
impl UplinkStream for MockUplinkStream {
    async fn send(&self, message: UplinkMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::StreamClosed(StreamKind::Uplink.as_str()));
        }
        self.state.check_send(StreamKind::Uplink.as_str())?;
        self.state
            .uplinks
            .lock()
            .push((self.gateway_id.clone(), message));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MockStatusStream {
    gateway_id: String,
    state: Arc<RouterState>,
    closed: AtomicBool,
}

#[async_trait]
impl StatusStream for MockStatusStream {
    async fn send(&self, status: GatewayStatus) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::StreamClosed(StreamKind::Status.as_str()));
        }
        self.state.check_send(StreamKind::Status.as_str())?;
        self.state
            .statuses
            .lock()
            .push((self.gateway_id.clone(), status));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Downlink stream fed by [`MockRouter::push_downlink`]
pub struct MockDownlinkStream {
    tx: mpsc::UnboundedSender<DownlinkMessage>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<DownlinkMessage>>,
    closed: AtomicBool,
    ended: AtomicBool,
    close_calls: AtomicUsize,
    closing: Notify,
}

impl MockDownlinkStream {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            closing: Notify::new(),
        }
    }

    /// Queue a downlink; `false` once the stream is closed or ended
    pub fn push(&self, message: DownlinkMessage) -> bool {
        !self.is_closed() && !self.is_ended() && self.tx.send(message).is_ok()
    }

    /// Whether the stream was closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// End the stream from the router side, as a dropped transport would
    pub fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
        self.closing.notify_one();
    }

    /// Whether the router side ended the stream
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Number of close calls, including repeated ones
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownlinkStream for MockDownlinkStream {
    async fn recv(&self) -> Option<DownlinkMessage> {
        let mut rx = self.rx.lock().await;
        if self.is_closed() || self.is_ended() {
            return rx.try_recv().ok();
        }
        tokio::select! {
            message = rx.recv() => message,
            _ = self.closing.notified() => rx.try_recv().ok(),
        }
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.closing.notify_one();
    }
}

/// Router dialer handing out one [`MockRouter`]
pub struct MockDialer {
    router: Option<MockRouter>,
    dialed: Mutex<Vec<String>>,
}

impl MockDialer {
    /// Dialer that always connects to `router`
    pub fn new(router: MockRouter) -> Self {
        Self {
            router: Some(router),
            dialed: Mutex::new(Vec::new()),
        }
    }

    /// Dialer whose every dial fails
    pub fn failing() -> Self {
        Self {
            router: None,
            dialed: Mutex::new(Vec::new()),
        }
    }

    /// Addresses dialed, in order
    pub fn dialed(&self) -> Vec<String> {
        self.dialed.lock().clone()
    }
}

#[async_trait]
impl RouterDialer for MockDialer {
    async fn dial(&self, net_address: &str) -> Result<Arc<dyn RouterConnection>> {
        self.dialed.lock().push(net_address.to_string());
        match &self.router {
            Some(router) => Ok(Arc::new(router.clone())),
            None => Err(BridgeError::ConnectionFailed {
                address: net_address.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct DiscoveryState {
    routers: HashMap<String, String>,
    reachable: bool,
    announced: Mutex<Vec<Announcement>>,
    clients_closed: AtomicUsize,
}

/// In-memory discovery server
#[derive(Clone)]
pub struct MockDiscovery {
    state: Arc<DiscoveryState>,
}

impl Default for MockDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDiscovery {
    /// Reachable discovery server with no routers
    pub fn new() -> Self {
        Self {
            state: Arc::new(DiscoveryState {
                reachable: true,
                ..Default::default()
            }),
        }
    }

    /// Announce a router at `net_address`
    pub fn with_router(self, id: &str, net_address: &str) -> Self {
        self.rebuild(|state| {
            state
                .routers
                .insert(id.to_string(), net_address.to_string());
        })
    }

    /// Make every connect attempt fail
    pub fn unreachable(self) -> Self {
        self.rebuild(|state| state.reachable = false)
    }

    fn rebuild(self, apply: impl FnOnce(&mut DiscoveryState)) -> Self {
        let mut state = DiscoveryState {
            routers: self.state.routers.clone(),
            reachable: self.state.reachable,
            ..Default::default()
        };
        apply(&mut state);
        Self {
            state: Arc::new(state),
        }
    }

    /// Announcements received on connect
    pub fn announced(&self) -> Vec<Announcement> {
        self.state.announced.lock().clone()
    }

    /// Number of discovery clients closed
    pub fn clients_closed(&self) -> usize {
        self.state.clients_closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Discovery for MockDiscovery {
    async fn connect(
        &self,
        server: &str,
        local: &Announcement,
    ) -> Result<Box<dyn DiscoveryClient>> {
        if !self.state.reachable {
            return Err(BridgeError::ConnectionFailed {
                address: server.to_string(),
                reason: "discovery unreachable".to_string(),
            });
        }
        self.state.announced.lock().push(local.clone());
        Ok(Box::new(MockDiscoveryClient {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockDiscoveryClient {
    state: Arc<DiscoveryState>,
}

#[async_trait]
impl DiscoveryClient for MockDiscoveryClient {
    async fn get(&self, service_name: &str, id: &str) -> Result<Announcement> {
        let net_address = self.state.routers.get(id).cloned().ok_or_else(|| {
            BridgeError::AddressResolution(format!("{service_name}/{id} not found"))
        })?;
        Ok(Announcement {
            service_name: service_name.to_string(),
            id: id.to_string(),
            net_address,
        })
    }

    async fn close(&self) {
        self.state.clients_closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// LoRa SF7/125 kHz uplink received by `mac`
pub fn lora_rx_packet(mac: GatewayAddress) -> RxPacket {
    RxPacket {
        rx_info: RxInfo {
            mac,
            time: Utc.timestamp_opt(1_500_000_000, 0).single(),
            timestamp: 1_234_567,
            frequency: 868_100_000,
            channel: 1,
            rf_chain: 0,
            data_rate: DataRate::lora(7, 125_000),
            code_rate: "4/5".to_string(),
            rssi: -57,
            lora_snr: 7.5,
            size: 4,
        },
        phy_payload: Bytes::from_static(&[0x40, 0x01, 0x02, 0x03]),
    }
}

/// Statistics report from `mac` without location or extensions
pub fn stats_packet(mac: GatewayAddress) -> GatewayStatsPacket {
    GatewayStatsPacket {
        mac,
        time: Utc
            .timestamp_opt(1_500_000_000, 0)
            .single()
            .unwrap_or_default(),
        rx_packets_received: 10,
        rx_packets_received_ok: 8,
        ..Default::default()
    }
}

/// LoRaWAN downlink at 869.525 MHz with the given modulation and datarate
pub fn lorawan_downlink(modulation: i32, data_rate: &str, bit_rate: u32) -> DownlinkMessage {
    DownlinkMessage {
        payload: Bytes::from_static(&[0x60, 0x04, 0x03, 0x02]),
        protocol_configuration: Some(TxConfiguration {
            protocol: Some(tx_configuration::Protocol::Lorawan(LorawanTxConfiguration {
                modulation,
                data_rate: data_rate.to_string(),
                bit_rate,
                coding_rate: "4/5".to_string(),
                f_cnt: 1,
            })),
        }),
        gateway_configuration: Some(GatewayTxConfiguration {
            timestamp: 2_000_000,
            rf_chain: 0,
            frequency: 869_525_000,
            power: 14,
            polarization_inversion: true,
        }),
    }
}

/// LoRa SF9/125 kHz downlink
pub fn lora_downlink() -> DownlinkMessage {
    lorawan_downlink(Modulation::Lora as i32, "SF9BW125", 0)
}
