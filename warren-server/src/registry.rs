//! Tunnel registry and the contracts the ingress path consumes.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use crate::conn::PublicConn;

/// Metadata handed to a tunnel along with a public connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnMeta {
    /// Effective hostname the connection was routed by.
    pub host: String,
    /// Host plus path of the detected request, for diagnostics.
    pub url: String,
}

/// A registered tunnel, as seen from the public-ingress path.
///
/// The tunnel's relay and heartbeat machinery live behind this trait; the
/// ingress path only reads the required credential and transfers ownership
/// of admitted connections.
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Required `Authorization` header value, if the tunnel demands one.
    fn required_http_auth(&self) -> Option<&str>;

    /// Take ownership of an admitted public connection. Errors past this
    /// point are the tunnel's to handle.
    async fn handle_public_connection(&self, conn: PublicConn, meta: ConnMeta);
}

/// Lookup interface the ingress multiplexer depends on.
///
/// Injected rather than global so the multiplexer can be exercised against
/// a fake in tests.
pub trait Registry: Send + Sync {
    /// Pure lookup by `"<scheme>://<host>"` key.
    fn get(&self, key: &str) -> Option<Arc<dyn Tunnel>>;
}

/// Registry of active tunnels keyed by public endpoint.
pub struct TunnelRegistry {
    tunnels: DashMap<String, Arc<dyn Tunnel>>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self {
            tunnels: DashMap::new(),
        }
    }

    /// Register a tunnel under its public key, replacing any previous owner.
    pub fn register(&self, key: String, tunnel: Arc<dyn Tunnel>) {
        info!("Registering tunnel at {key}");
        self.tunnels.insert(key, tunnel);
    }

    /// Remove a tunnel when its session goes away.
    pub fn unregister(&self, key: &str) {
        if self.tunnels.remove(key).is_some() {
            info!("Unregistering tunnel at {key}");
        }
    }

    /// Number of registered tunnels.
    pub fn count(&self) -> usize {
        self.tunnels.len()
    }
}

impl Default for TunnelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry for TunnelRegistry {
    fn get(&self, key: &str) -> Option<Arc<dyn Tunnel>> {
        self.tunnels.get(key).map(|t| t.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct IdleTunnel;

    #[async_trait]
    impl Tunnel for IdleTunnel {
        fn required_http_auth(&self) -> Option<&str> {
            None
        }

        async fn handle_public_connection(&self, _conn: PublicConn, _meta: ConnMeta) {}
    }

    #[test]
    fn test_register_lookup_unregister() {
        let registry = TunnelRegistry::new();
        assert!(registry.get("https://foo.example.com").is_none());

        registry.register("https://foo.example.com".to_string(), Arc::new(IdleTunnel));
        assert_eq!(registry.count(), 1);
        assert!(registry.get("https://foo.example.com").is_some());
        // key includes the scheme
        assert!(registry.get("http://foo.example.com").is_none());

        registry.unregister("https://foo.example.com");
        assert_eq!(registry.count(), 0);
        assert!(registry.get("https://foo.example.com").is_none());
    }
}
