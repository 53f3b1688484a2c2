//! Gateway bridge facade
//!
//! [`GatewayBridge`] is the entry point used by the packet-forwarder side.
//! It owns the session registry, the rate ticker, the status defaults and
//! the downlink subscriber, and exposes the publish / subscribe operations.
//!
//! # Message Flow
//!
//! - RX packet -> session (created on first traffic) -> admission gate ->
//!   translator -> uplink stream
//! - stats packet -> translator, merged with the status defaults -> status
//!   stream
//! - router downlink -> delivery task -> translator -> TX channel returned by
//!   [`GatewayBridge::connect`]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::bootstrap::{connect_router, Discovery, RouterDialer};
use crate::config::BridgeConfig;
use crate::downlink::{DownlinkSubscriber, SubscriptionState};
use crate::error::Result;
use crate::gateway::{GatewayAddress, GatewayConfig};
use crate::packet::{GatewayStatsPacket, RxPacket, TxPacket};
use crate::registry::SessionRegistry;
use crate::router::RouterConnection;
use crate::stats::{BridgeStats, Counters};
use crate::status::StatusDefaults;
use crate::translator::ProtocolTranslator;

/// Bridge between local gateways and the router
pub struct GatewayBridge {
    registry: Arc<SessionRegistry>,
    downlinks: DownlinkSubscriber,
    translator: ProtocolTranslator,
    status_defaults: Arc<StatusDefaults>,
    /// f64 bits of the uplink ceiling, events per minute
    rx_rate_limit: AtomicU64,
    counters: Arc<Counters>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl GatewayBridge {
    /// Resolve and dial the router, then build the bridge
    ///
    /// Returns the bridge and the receiving end of the TX channel onto which
    /// translated downlinks of every subscribed gateway are forwarded. Any
    /// resolution or dial failure is returned and no bridge is built.
    pub async fn connect(
        config: BridgeConfig,
        dialer: &dyn RouterDialer,
        discovery: Option<&dyn Discovery>,
    ) -> Result<(Self, mpsc::Receiver<TxPacket>)> {
        config.validate()?;
        let router = connect_router(
            &config.router.endpoint,
            &config.router.bridge_id,
            discovery,
            dialer,
        )
        .await?;
        Self::with_router(router, &config)
    }

    /// Build the bridge on an already open router connection
    ///
    /// Must be called within a Tokio runtime; the rate ticker is spawned here.
    pub fn with_router(
        router: Arc<dyn RouterConnection>,
        config: &BridgeConfig,
    ) -> Result<(Self, mpsc::Receiver<TxPacket>)> {
        let overrides = config
            .gateways
            .iter()
            .map(|gateway| gateway.parse())
            .collect::<Result<Vec<_>>>()?;

        let registry = Arc::new(SessionRegistry::new(
            router,
            config.rate_limit.tick_interval,
        ));
        for (address, gateway) in overrides {
            registry.add_gateway(address, gateway);
        }

        let (tx, rx) = mpsc::channel(config.tx_queue_size.max(1));
        let counters = Arc::new(Counters::default());
        let downlinks =
            DownlinkSubscriber::with_counters(Arc::clone(&registry), tx, Arc::clone(&counters));
        let ticker = registry.spawn_rate_ticker();

        info!(
            rx_rate_limit = config.rate_limit.rx_rate_limit,
            region = %config.status.region,
            gateways = config.gateways.len(),
            "Gateway bridge started"
        );

        let bridge = Self {
            registry,
            downlinks,
            translator: ProtocolTranslator::new(),
            status_defaults: Arc::new(StatusDefaults::from(&config.status)),
            rx_rate_limit: AtomicU64::new(config.rate_limit.rx_rate_limit.to_bits()),
            counters,
            ticker: Mutex::new(Some(ticker)),
        };
        Ok((bridge, rx))
    }

    /// Set the per-gateway uplink ceiling in events per minute
    ///
    /// Zero, negative or NaN disables rate limiting.
    pub fn set_rx_rate_limit(&self, limit: f64) {
        self.rx_rate_limit.store(limit.to_bits(), Ordering::Relaxed);
        debug!(rx_rate_limit = limit, "Updated uplink rate limit");
    }

    /// Current per-gateway uplink ceiling in events per minute
    pub fn rx_rate_limit(&self) -> f64 {
        f64::from_bits(self.rx_rate_limit.load(Ordering::Relaxed))
    }

    /// Register a router identity for a gateway given by its hex EUI
    ///
    /// Applies to sessions created afterwards.
    pub fn add_gateway(&self, eui: &str, id: &str, token: &str) -> Result<()> {
        let address: GatewayAddress = eui.parse()?;
        self.registry.add_gateway(address, GatewayConfig::new(id, token));
        Ok(())
    }

    /// Set the region reported in every status
    pub fn inject_region(&self, region: &str) {
        self.status_defaults.set_region(region);
    }

    /// Set the round-trip time reported in every status
    pub fn inject_rtt(&self, rtt: u32) {
        self.status_defaults.set_rtt(rtt);
    }

    /// Status defaults shared by every gateway
    pub fn status_defaults(&self) -> &Arc<StatusDefaults> {
        &self.status_defaults
    }

    /// Gateway session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Forward a received frame to the router
    ///
    /// Frames over the rate limit are dropped and `Ok(())` is returned.
    pub async fn publish_gateway_rx(&self, packet: RxPacket) -> Result<()> {
        let address = packet.rx_info.mac;
        let session = self.registry.get_or_create(address).await?;

        let limit = self.rx_rate_limit();
        if !session.rx_rate().admit(limit) {
            Counters::incr(&self.counters.uplinks_rate_limited);
            warn!(
                gateway = %address,
                rate = session.rx_rate().rate_per_minute(),
                limit,
                "Uplink rate limit exceeded, dropping uplink"
            );
            return Ok(());
        }

        let uplink = self.translator.rx_to_uplink(&packet);
        trace!(gateway = %address, size = packet.phy_payload.len(), "Sending uplink");
        session.send_uplink(uplink).await?;
        Counters::incr(&self.counters.uplinks_forwarded);
        Ok(())
    }

    /// Forward gateway statistics to the router as a status report
    pub async fn publish_gateway_stats(&self, stats: GatewayStatsPacket) -> Result<()> {
        let address = stats.mac;
        let session = self.registry.get_or_create(address).await?;

        let status = self
            .translator
            .stats_to_status(&self.status_defaults.snapshot(), &stats);
        trace!(gateway = %address, rx_in = status.rx_in, rx_ok = status.rx_ok, "Sending status");
        session.send_status(status).await?;
        Counters::incr(&self.counters.status_forwarded);
        Ok(())
    }

    /// Start forwarding router downlinks for a gateway onto the TX channel
    pub async fn subscribe_gateway_tx(&self, address: GatewayAddress) -> Result<()> {
        self.downlinks.subscribe(address).await
    }

    /// Stop forwarding router downlinks for a gateway
    pub async fn unsubscribe_gateway_tx(&self, address: GatewayAddress) -> Result<()> {
        self.downlinks.unsubscribe(address).await
    }

    /// Downlink state of a gateway
    pub async fn subscription_state(&self, address: &GatewayAddress) -> SubscriptionState {
        self.downlinks.state(address).await
    }

    /// Traffic counters
    pub fn stats(&self) -> BridgeStats {
        self.counters.snapshot(self.registry.len())
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    /// Shut the bridge down
    ///
    /// Stops the rate ticker, closes every session and then the router
    /// connection. The TX channel closes once all delivery tasks are gone.
    /// Later publish and subscribe calls fail with
    /// [`BridgeError::BridgeClosed`](crate::BridgeError::BridgeClosed).
    pub async fn close(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }
        self.downlinks.shutdown();
        self.registry.close_all().await;
        info!("Gateway bridge closed");
    }
}

impl std::fmt::Debug for GatewayBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayBridge")
            .field("registry", &self.registry)
            .field("rx_rate_limit", &self.rx_rate_limit())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfigBuilder;
    use crate::error::BridgeError;
    use crate::test_utils::{
        lora_rx_packet, stats_packet, MockDialer, MockDiscovery, MockRouter,
    };

    async fn bridge(router: &MockRouter, config: BridgeConfig) -> GatewayBridge {
        let dialer = MockDialer::new(router.clone());
        let (bridge, _rx) = GatewayBridge::connect(config, &dialer, None).await.unwrap();
        bridge
    }

    #[tokio::test]
    async fn test_connect_through_discovery() {
        let router = MockRouter::new();
        let dialer = MockDialer::new(router.clone());
        let discovery = MockDiscovery::new().with_router("ttn-router-eu", "10.1.1.1:1901");
        let config = BridgeConfigBuilder::new()
            .discovery("discovery.example.org:1900", "ttn-router-eu")
            .build();

        let (bridge, _rx) = GatewayBridge::connect(config, &dialer, Some(&discovery))
            .await
            .unwrap();

        assert_eq!(dialer.dialed(), vec!["10.1.1.1:1901".to_string()]);
        assert!(!bridge.is_closed());
    }

    #[tokio::test]
    async fn test_connect_with_builder_defaults() {
        let router = MockRouter::new();
        let dialer = MockDialer::new(router.clone());

        let config = BridgeConfigBuilder::new().build();

        let (bridge, _rx) = GatewayBridge::connect(config, &dialer, None).await.unwrap();

        assert_eq!(dialer.dialed(), vec!["localhost:1901".to_string()]);
        assert!(!bridge.is_closed());
    }

    #[tokio::test]
    async fn test_connect_fails_on_dial_error() {
        let config = BridgeConfigBuilder::new().build();
        let result = GatewayBridge::connect(config, &MockDialer::failing(), None).await;
        assert!(matches!(result, Err(BridgeError::ConnectionFailed { .. })));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let dialer = MockDialer::new(MockRouter::new());
        let config = BridgeConfigBuilder::new().gateway("xyz", "id", "token").build();

        let result = GatewayBridge::connect(config, &dialer, None).await;
        assert!(matches!(result, Err(BridgeError::InvalidGatewayEui(_))));
        assert!(dialer.dialed().is_empty());
    }

    #[tokio::test]
    async fn test_configured_gateway_identity() {
        let router = MockRouter::new();
        let config = BridgeConfigBuilder::new()
            .gateway("0000000000000001", "roof", "s3cret")
            .build();
        let bridge = bridge(&router, config).await;

        bridge
            .publish_gateway_rx(lora_rx_packet(GatewayAddress::from(1u64)))
            .await
            .unwrap();

        assert_eq!(
            router.clients_opened(),
            vec![("roof".to_string(), "s3cret".to_string())]
        );
        assert_eq!(router.uplinks()[0].0, "roof");
    }

    #[tokio::test]
    async fn test_add_gateway_rejects_bad_eui() {
        let bridge = bridge(&MockRouter::new(), BridgeConfig::default()).await;
        assert!(matches!(
            bridge.add_gateway("01020304", "id", "token"),
            Err(BridgeError::InvalidGatewayEui(_))
        ));
        bridge.add_gateway("0102030405060708", "id", "token").unwrap();
    }

    #[tokio::test]
    async fn test_rate_limited_uplink_is_dropped() {
        let router = MockRouter::new();
        let bridge = bridge(&router, BridgeConfig::default()).await;
        let address = GatewayAddress::from(1u64);
        // let the ticker run its immediate first tick on the empty registry
        tokio::task::yield_now().await;

        for _ in 0..10 {
            bridge.publish_gateway_rx(lora_rx_packet(address)).await.unwrap();
        }
        bridge.registry().tick();
        assert_eq!(router.uplinks().len(), 10);

        bridge.set_rx_rate_limit(60.0);
        bridge.publish_gateway_rx(lora_rx_packet(address)).await.unwrap();

        assert_eq!(router.uplinks().len(), 10);
        let stats = bridge.stats();
        assert_eq!(stats.uplinks_forwarded, 10);
        assert_eq!(stats.uplinks_rate_limited, 1);
    }

    #[tokio::test]
    async fn test_nan_rate_limit_admits_uplinks() {
        let router = MockRouter::new();
        let bridge = bridge(&router, BridgeConfig::default()).await;
        let address = GatewayAddress::from(1u64);
        tokio::task::yield_now().await;

        for _ in 0..10 {
            bridge.publish_gateway_rx(lora_rx_packet(address)).await.unwrap();
        }
        bridge.registry().tick();

        bridge.set_rx_rate_limit(f64::NAN);
        for _ in 0..5 {
            bridge.publish_gateway_rx(lora_rx_packet(address)).await.unwrap();
        }

        assert_eq!(router.uplinks().len(), 15);
        assert_eq!(bridge.stats().uplinks_rate_limited, 0);
    }

    #[tokio::test]
    async fn test_status_uses_injected_defaults() {
        let router = MockRouter::new();
        let bridge = bridge(&router, BridgeConfigBuilder::new().region("EU868").build()).await;
        bridge.inject_rtt(30);

        bridge
            .publish_gateway_stats(stats_packet(GatewayAddress::from(2u64)))
            .await
            .unwrap();
        bridge.inject_region("US915");
        bridge
            .publish_gateway_stats(stats_packet(GatewayAddress::from(2u64)))
            .await
            .unwrap();

        let statuses = router.statuses();
        assert_eq!(statuses[0].1.region, "EU868");
        assert_eq!(statuses[0].1.rtt, 30);
        assert_eq!(statuses[0].1.rx_in, 10);
        assert_eq!(statuses[1].1.region, "US915");
        assert_eq!(bridge.stats().status_forwarded, 2);
    }

    #[tokio::test]
    async fn test_send_failure_is_returned() {
        let router = MockRouter::new();
        let bridge = bridge(&router, BridgeConfig::default()).await;
        let address = GatewayAddress::from(1u64);
        bridge.publish_gateway_rx(lora_rx_packet(address)).await.unwrap();

        router.set_fail_sends(true);
        let err = bridge.publish_gateway_rx(lora_rx_packet(address)).await.unwrap_err();
        assert!(matches!(err, BridgeError::SendFailed { kind: "uplink", .. }));

        router.set_fail_sends(false);
        bridge.publish_gateway_rx(lora_rx_packet(address)).await.unwrap();
        assert_eq!(router.uplinks().len(), 2);
        assert_eq!(bridge.stats().sessions, 1);
    }

    #[tokio::test]
    async fn test_close() {
        let router = MockRouter::new();
        let dialer = MockDialer::new(router.clone());
        let (bridge, mut rx) = GatewayBridge::connect(BridgeConfig::default(), &dialer, None)
            .await
            .unwrap();
        let address = GatewayAddress::from(1u64);
        bridge.subscribe_gateway_tx(address).await.unwrap();

        bridge.close().await;

        assert!(bridge.is_closed());
        assert!(router.is_closed());
        assert_eq!(router.downlink_streams("eui-0000000000000001")[0].close_calls(), 1);
        assert!(matches!(
            bridge.publish_gateway_rx(lora_rx_packet(address)).await,
            Err(BridgeError::BridgeClosed)
        ));
        assert!(matches!(
            bridge.subscribe_gateway_tx(address).await,
            Err(BridgeError::BridgeClosed)
        ));
        assert!(rx.recv().await.is_none());
    }
}
