//! Gateway session registry
//!
//! Maps gateway addresses to their [`Session`]. Sessions are created lazily
//! on first traffic and live until [`SessionRegistry::close_all`].
//!
//! # Thread Safety
//!
//! The map sits behind a reader/writer lock. Lookups and the rate tick sweep
//! take the read side; only insertion and shutdown take the write side. A
//! miss on the read lookup is re-checked under the write lock before a session
//! is inserted, so concurrent callers for the same address always share one
//! session. Streams are opened after the lock is released.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use crate::error::{BridgeError, Result};
use crate::gateway::{GatewayAddress, GatewayConfig};
use crate::router::RouterConnection;
use crate::session::Session;

/// Concurrency-safe registry of gateway sessions
pub struct SessionRegistry {
    router: Arc<dyn RouterConnection>,
    gateway_conf: RwLock<HashMap<GatewayAddress, GatewayConfig>>,
    sessions: RwLock<HashMap<GatewayAddress, Arc<Session>>>,
    tick_interval: Duration,
    closed: AtomicBool,
}

impl SessionRegistry {
    /// Create an empty registry on top of a router connection
    pub fn new(router: Arc<dyn RouterConnection>, tick_interval: Duration) -> Self {
        Self {
            router,
            gateway_conf: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            tick_interval,
            closed: AtomicBool::new(false),
        }
    }

    /// Register a router identity override for a gateway
    ///
    /// Only affects sessions created afterwards.
    pub fn add_gateway(&self, address: GatewayAddress, config: GatewayConfig) {
        debug!(gateway = %address, gateway_id = %config.id, "Registered gateway override");
        self.gateway_conf.write().insert(address, config);
    }

    /// Router identity for a gateway, derived from its address if no
    /// override is registered
    pub fn gateway_config(&self, address: &GatewayAddress) -> GatewayConfig {
        self.gateway_conf
            .read()
            .get(address)
            .cloned()
            .unwrap_or_else(|| GatewayConfig::derived(address))
    }

    /// Existing session, without creating one
    pub fn get(&self, address: &GatewayAddress) -> Option<Arc<Session>> {
        self.sessions.read().get(address).cloned()
    }

    /// Existing session, or a new one with its uplink and status streams open
    pub async fn get_or_create(&self, address: GatewayAddress) -> Result<Arc<Session>> {
        let session = match self.get(&address) {
            Some(session) => session,
            None => self.insert_if_absent(address)?,
        };
        session.open_streams().await?;
        Ok(session)
    }

    fn insert_if_absent(&self, address: GatewayAddress) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.write();
        if self.is_closed() {
            return Err(BridgeError::BridgeClosed);
        }
        if let Some(session) = sessions.get(&address) {
            return Ok(Arc::clone(session));
        }

        let config = self.gateway_config(&address);
        let client = self.router.gateway_client(&config.id, &config.token);
        let session = Arc::new(Session::new(address, &config, client, self.tick_interval));
        sessions.insert(address, Arc::clone(&session));

        info!(gateway = %address, gateway_id = %config.id, "Created gateway session");
        Ok(session)
    }

    /// Advance every session's rate counter by one decay step
    pub fn tick(&self) {
        let sessions = self.sessions.read();
        for session in sessions.values() {
            session.rx_rate().tick();
        }
        trace!(sessions = sessions.len(), "Ticked gateway rates");
    }

    /// Spawn the periodic rate tick task
    ///
    /// The task stops once the registry is closed or dropped.
    pub fn spawn_rate_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.tick_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(registry) = weak.upgrade() else {
                    break;
                };
                if registry.is_closed() {
                    break;
                }
                registry.tick();
            }
            debug!("Rate ticker stopped");
        })
    }

    /// Number of sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session exists
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Whether [`close_all`](Self::close_all) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every session and then the router connection
    ///
    /// Sessions are removed under the write lock and closed after it is
    /// released. Later [`get_or_create`](Self::get_or_create) calls fail with
    /// [`BridgeError::BridgeClosed`].
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            sessions.drain().map(|(_, session)| session).collect()
        };

        info!(sessions = drained.len(), "Closing gateway sessions");
        futures::future::join_all(drained.iter().map(|session| session.close())).await;

        self.router.close().await;
        info!("Router connection closed");
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockRouter;

    fn registry(router: &MockRouter) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(router.clone()),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_single_session() {
        let router = MockRouter::new();
        let registry = registry(&router);
        let address = GatewayAddress::from(0x0102030405060708u64);

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_or_create(address).await.unwrap() })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(registry.len(), 1);
        assert_eq!(router.clients_opened().len(), 1);
        assert_eq!(router.uplink_streams_opened("eui-0102030405060708"), 1);
        assert_eq!(router.status_streams_opened("eui-0102030405060708"), 1);
    }

    #[tokio::test]
    async fn test_get_does_not_create() {
        let router = MockRouter::new();
        let registry = registry(&router);

        assert!(registry.get(&GatewayAddress::from(1u64)).is_none());
        assert!(registry.is_empty());
        assert!(router.clients_opened().is_empty());
    }

    #[tokio::test]
    async fn test_default_identity() {
        let router = MockRouter::new();
        let registry = registry(&router);
        let address = GatewayAddress::from(0xB827EBFFFE000001u64);

        let session = registry.get_or_create(address).await.unwrap();

        assert_eq!(session.gateway_id(), address.default_gateway_id());
        assert_eq!(
            router.clients_opened(),
            vec![("eui-b827ebfffe000001".to_string(), "token".to_string())]
        );
    }

    #[tokio::test]
    async fn test_override_identity() {
        let router = MockRouter::new();
        let registry = registry(&router);
        let address = GatewayAddress::from(7u64);
        registry.add_gateway(address, GatewayConfig::new("my-gateway", "secret"));

        let session = registry.get_or_create(address).await.unwrap();

        assert_eq!(session.gateway_id(), "my-gateway");
        assert_eq!(
            router.clients_opened(),
            vec![("my-gateway".to_string(), "secret".to_string())]
        );
    }

    #[tokio::test]
    async fn test_downlink_not_opened_eagerly() {
        let router = MockRouter::new();
        let registry = registry(&router);
        let session = registry.get_or_create(GatewayAddress::from(3u64)).await.unwrap();

        assert!(!session.is_subscribed().await);
        assert!(router.downlink_streams("eui-0000000000000003").is_empty());
    }

    #[tokio::test]
    async fn test_tick_advances_every_session() {
        let router = MockRouter::new();
        let registry = registry(&router);
        let a = registry.get_or_create(GatewayAddress::from(1u64)).await.unwrap();
        let b = registry.get_or_create(GatewayAddress::from(2u64)).await.unwrap();

        a.rx_rate().update(10);
        registry.tick();

        assert!(a.rx_rate().rate_per_minute() > 0.0);
        assert_eq!(b.rx_rate().rate_per_minute(), 0.0);
    }

    #[tokio::test]
    async fn test_close_all() {
        let router = MockRouter::new();
        let registry = registry(&router);
        registry.get_or_create(GatewayAddress::from(1u64)).await.unwrap();
        registry.get_or_create(GatewayAddress::from(2u64)).await.unwrap();

        registry.close_all().await;

        assert!(registry.is_closed());
        assert!(registry.is_empty());
        assert_eq!(router.clients_closed(), 2);
        assert!(router.is_closed());

        let err = registry
            .get_or_create(GatewayAddress::from(3u64))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::BridgeClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_ticker_runs_until_closed() {
        let router = MockRouter::new();
        let registry = registry(&router);
        let session = registry.get_or_create(GatewayAddress::from(1u64)).await.unwrap();
        session.rx_rate().update(10);

        let ticker = registry.spawn_rate_ticker();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(session.rx_rate().rate_per_minute() > 0.0);

        registry.close_all().await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(ticker.is_finished());
    }
}
