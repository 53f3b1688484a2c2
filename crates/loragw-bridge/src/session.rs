//! Per-gateway router session
//!
//! A [`Session`] bundles the gateway-scoped router client with the gateway's
//! uplink, status and downlink streams and its uplink [`RateCounter`]. Each
//! stream is opened on first need and then reused; the three are independent,
//! so closing one leaves the others usable.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::gateway::{GatewayAddress, GatewayConfig};
use crate::rate::RateCounter;
use crate::router::{
    DownlinkStream, GatewayClient, GatewayStatus, StatusStream, StreamKind, UplinkMessage,
    UplinkStream,
};

/// An open downlink stream and the task draining it
pub(crate) struct DownlinkSubscription {
    pub(crate) stream: Arc<dyn DownlinkStream>,
    pub(crate) task: JoinHandle<()>,
}

impl DownlinkSubscription {
    /// Whether the delivery task is still draining the stream
    pub(crate) fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Router session of one gateway
pub struct Session {
    address: GatewayAddress,
    gateway_id: String,
    client: Arc<dyn GatewayClient>,
    uplink: OnceCell<Arc<dyn UplinkStream>>,
    status: OnceCell<Arc<dyn StatusStream>>,
    downlink: Mutex<Option<DownlinkSubscription>>,
    rx_rate: RateCounter,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        address: GatewayAddress,
        config: &GatewayConfig,
        client: Arc<dyn GatewayClient>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            address,
            gateway_id: config.id.clone(),
            client,
            uplink: OnceCell::new(),
            status: OnceCell::new(),
            downlink: Mutex::new(None),
            rx_rate: RateCounter::with_interval(tick_interval),
            closed: AtomicBool::new(false),
        }
    }

    /// Gateway hardware address
    pub fn address(&self) -> GatewayAddress {
        self.address
    }

    /// Logical gateway id used with the router
    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    /// Uplink rate estimate
    pub fn rx_rate(&self) -> &RateCounter {
        &self.rx_rate
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::BridgeClosed);
        }
        Ok(())
    }

    /// Uplink stream, opened on first use
    pub async fn uplink(&self) -> Result<Arc<dyn UplinkStream>> {
        self.ensure_open()?;
        self.uplink
            .get_or_try_init(|| async {
                debug!(gateway = %self.address, kind = %StreamKind::Uplink, "Opening stream");
                self.client.open_uplink_stream().await
            })
            .await
            .map(Arc::clone)
    }

    /// Status stream, opened on first use
    pub async fn status(&self) -> Result<Arc<dyn StatusStream>> {
        self.ensure_open()?;
        self.status
            .get_or_try_init(|| async {
                debug!(gateway = %self.address, kind = %StreamKind::Status, "Opening stream");
                self.client.open_status_stream().await
            })
            .await
            .map(Arc::clone)
    }

    /// Open the uplink and status streams if they are not open yet
    pub async fn open_streams(&self) -> Result<()> {
        self.uplink().await?;
        self.status().await?;
        Ok(())
    }

    /// Send an uplink on this gateway's stream
    pub async fn send_uplink(&self, message: UplinkMessage) -> Result<()> {
        self.uplink().await?.send(message).await
    }

    /// Send a status report on this gateway's stream
    pub async fn send_status(&self, status: GatewayStatus) -> Result<()> {
        self.status().await?.send(status).await
    }

    /// Whether a downlink stream is open and still being drained
    pub async fn is_subscribed(&self) -> bool {
        self.downlink
            .lock()
            .await
            .as_ref()
            .is_some_and(DownlinkSubscription::is_active)
    }

    pub(crate) fn downlink_slot(&self) -> &Mutex<Option<DownlinkSubscription>> {
        &self.downlink
    }

    pub(crate) fn client(&self) -> &Arc<dyn GatewayClient> {
        &self.client
    }

    /// Close every open stream, then the client
    ///
    /// A running downlink delivery task is aborted; downlinks still queued
    /// on its stream are dropped. Streams are never opened again afterwards.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(uplink) = self.uplink.get() {
            uplink.close().await;
        }
        if let Some(subscription) = self.downlink.lock().await.take() {
            subscription.stream.close().await;
            subscription.task.abort();
        }
        if let Some(status) = self.status.get() {
            status.close().await;
        }
        self.client.close().await;
        debug!(gateway = %self.address, "Session closed");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("gateway_id", &self.gateway_id)
            .field("uplink_open", &self.uplink.initialized())
            .field("status_open", &self.status.initialized())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
