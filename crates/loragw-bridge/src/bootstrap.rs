//! Router resolution and connection
//!
//! The router is either reached at a static address or looked up through a
//! discovery server. In the discovery case the bridge announces itself as
//! [`SERVICE_NAME`] with its bridge id, asks for the configured router and
//! dials the address from the returned announcement. Resolution runs once,
//! at bridge construction; any failure aborts construction.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RouterEndpoint;
use crate::error::{BridgeError, Result};
use crate::router::RouterConnection;

/// Service name announced to the discovery server
pub const SERVICE_NAME: &str = "lora-gateway-bridge";

/// Service name of routers in discovery
pub const ROUTER_SERVICE: &str = "router";

/// A service announcement as known to discovery
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Announcement {
    /// Service name
    pub service_name: String,
    /// Service instance id
    pub id: String,
    /// Dialable network address
    pub net_address: String,
}

impl Announcement {
    /// Announcement of this bridge
    pub fn bridge(bridge_id: &str) -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
            id: bridge_id.to_string(),
            net_address: String::new(),
        }
    }
}

/// Factory for discovery clients
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Connect to a discovery server, announcing `local`
    async fn connect(&self, server: &str, local: &Announcement) -> Result<Box<dyn DiscoveryClient>>;
}

/// Connected discovery client
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Look up a service instance
    async fn get(&self, service_name: &str, id: &str) -> Result<Announcement>;

    /// Close the client
    async fn close(&self);
}

/// Opens the shared router connection
#[async_trait]
pub trait RouterDialer: Send + Sync {
    /// Dial the router at `net_address`
    async fn dial(&self, net_address: &str) -> Result<Arc<dyn RouterConnection>>;
}

/// Resolve the router's network address
pub async fn resolve_router(
    endpoint: &RouterEndpoint,
    bridge_id: &str,
    discovery: Option<&dyn Discovery>,
) -> Result<String> {
    match endpoint {
        RouterEndpoint::Static { address } => {
            if address.is_empty() {
                return Err(BridgeError::AddressResolution(
                    "empty static router address".to_string(),
                ));
            }
            Ok(address.clone())
        }
        RouterEndpoint::Discovery { server, router_id } => {
            let discovery = discovery.ok_or_else(|| {
                BridgeError::AddressResolution(format!(
                    "discovery server {server} configured without a discovery client"
                ))
            })?;

            info!(server = %server, "Connecting to discovery server");
            let client = discovery
                .connect(server, &Announcement::bridge(bridge_id))
                .await
                .map_err(|e| BridgeError::DiscoveryFailed {
                    server: server.clone(),
                    reason: e.to_string(),
                })?;

            info!(router_id = %router_id, "Getting router from discovery server");
            let lookup = client.get(ROUTER_SERVICE, router_id).await;
            client.close().await;

            let announcement = lookup.map_err(|e| {
                BridgeError::AddressResolution(format!("router {router_id}: {e}"))
            })?;
            if announcement.net_address.is_empty() {
                warn!(router_id = %router_id, "Router announcement has no address");
                return Err(BridgeError::AddressResolution(format!(
                    "router {router_id} announced without a network address"
                )));
            }
            Ok(announcement.net_address)
        }
    }
}

/// Resolve the router and dial it
pub async fn connect_router(
    endpoint: &RouterEndpoint,
    bridge_id: &str,
    discovery: Option<&dyn Discovery>,
    dialer: &dyn RouterDialer,
) -> Result<Arc<dyn RouterConnection>> {
    let address = resolve_router(endpoint, bridge_id, discovery).await?;

    info!(address = %address, "Connecting to router");
    let router = dialer.dial(&address).await?;
    info!(address = %address, "Connected to router");

    Ok(router)
}
