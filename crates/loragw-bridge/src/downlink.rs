//! Downlink subscriptions
//!
//! A gateway is either [`SubscriptionState::Unsubscribed`] (the initial
//! state) or [`SubscriptionState::Subscribed`]. Subscribing opens the
//! gateway's downlink stream and spawns one delivery task that drains it,
//! translates each downlink and forwards the resulting [`TxPacket`] onto the
//! shared TX channel. Unsubscribing closes the stream; the task then drains
//! whatever was already buffered and exits.
//!
//! # Backpressure
//!
//! All delivery tasks share one bounded channel. When the consumer falls
//! behind, every subscribed gateway waits on it, not only the busy one.
//! Per gateway, downlinks reach the channel in the order they were received.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::{BridgeError, Result};
use crate::gateway::GatewayAddress;
use crate::packet::TxPacket;
use crate::registry::SessionRegistry;
use crate::router::DownlinkStream;
use crate::session::DownlinkSubscription;
use crate::stats::Counters;
use crate::translator::ProtocolTranslator;

/// Downlink state of one gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No downlink stream is open
    Unsubscribed,
    /// A downlink stream is open and being drained
    Subscribed,
}

/// Manages downlink streams and their delivery tasks
pub struct DownlinkSubscriber {
    registry: Arc<SessionRegistry>,
    translator: ProtocolTranslator,
    sink: RwLock<Option<mpsc::Sender<TxPacket>>>,
    counters: Arc<Counters>,
}

impl DownlinkSubscriber {
    /// Create a subscriber forwarding onto `sink`
    pub fn new(registry: Arc<SessionRegistry>, sink: mpsc::Sender<TxPacket>) -> Self {
        Self::with_counters(registry, sink, Arc::new(Counters::default()))
    }

    pub(crate) fn with_counters(
        registry: Arc<SessionRegistry>,
        sink: mpsc::Sender<TxPacket>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            registry,
            translator: ProtocolTranslator::new(),
            sink: RwLock::new(Some(sink)),
            counters,
        }
    }

    /// Start delivering downlinks for a gateway
    ///
    /// Creates the gateway's session if needed. Does nothing when the
    /// gateway is already subscribed. A stream the router ended on its own
    /// is replaced by a fresh one.
    pub async fn subscribe(&self, address: GatewayAddress) -> Result<()> {
        let sink = self.sink.read().clone().ok_or(BridgeError::BridgeClosed)?;
        let session = self.registry.get_or_create(address).await?;

        let mut slot = session.downlink_slot().lock().await;
        session.ensure_open()?;
        if slot.as_ref().is_some_and(DownlinkSubscription::is_active) {
            debug!(gateway = %address, "Already subscribed to downlinks");
            return Ok(());
        }
        if let Some(ended) = slot.take() {
            debug!(gateway = %address, "Downlink stream ended, reopening");
            ended.stream.close().await;
        }

        let stream = session.client().open_downlink_stream().await?;
        let task = tokio::spawn(deliver(
            address,
            Arc::clone(&stream),
            self.translator,
            sink,
            Arc::clone(&self.counters),
        ));
        *slot = Some(DownlinkSubscription { stream, task });

        info!(gateway = %address, gateway_id = %session.gateway_id(), "Subscribed to downlinks");
        Ok(())
    }

    /// Stop delivering downlinks for a gateway
    ///
    /// Unknown gateways and gateways without an open downlink stream are
    /// left untouched.
    pub async fn unsubscribe(&self, address: GatewayAddress) -> Result<()> {
        let Some(session) = self.registry.get(&address) else {
            debug!(gateway = %address, "Unsubscribe for unknown gateway");
            return Ok(());
        };

        let subscription = session.downlink_slot().lock().await.take();
        match subscription {
            Some(subscription) => {
                subscription.stream.close().await;
                info!(gateway = %address, "Unsubscribed from downlinks");
            }
            None => debug!(gateway = %address, "Not subscribed to downlinks"),
        }
        Ok(())
    }

    /// Current downlink state of a gateway
    pub async fn state(&self, address: &GatewayAddress) -> SubscriptionState {
        match self.registry.get(address) {
            Some(session) if session.is_subscribed().await => SubscriptionState::Subscribed,
            _ => SubscriptionState::Unsubscribed,
        }
    }

    /// Drop the subscriber's handle on the TX channel
    ///
    /// Later subscribes fail with [`BridgeError::BridgeClosed`]. The channel
    /// closes once every delivery task has ended too.
    pub fn shutdown(&self) {
        self.sink.write().take();
    }
}

impl std::fmt::Debug for DownlinkSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownlinkSubscriber")
            .field("registry", &self.registry)
            .field("open", &self.sink.read().is_some())
            .finish_non_exhaustive()
    }
}

async fn deliver(
    address: GatewayAddress,
    stream: Arc<dyn DownlinkStream>,
    translator: ProtocolTranslator,
    sink: mpsc::Sender<TxPacket>,
    counters: Arc<Counters>,
) {
    while let Some(message) = stream.recv().await {
        let packet = match translator.downlink_to_tx(address, &message) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(gateway = %address, error = %e, "Dropping untranslatable downlink");
                Counters::incr(&counters.downlinks_rejected);
                continue;
            }
        };

        trace!(gateway = %address, frequency = packet.tx_info.frequency, "Forwarding downlink");
        if sink.send(packet).await.is_err() {
            debug!(gateway = %address, "TX channel closed, stopping downlink delivery");
            return;
        }
        Counters::incr(&counters.downlinks_forwarded);
    }
    debug!(gateway = %address, "Downlink stream ended");
}
