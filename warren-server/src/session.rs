//! Client session gate: authorization, tunnel-request checks, registration.
//!
//! A session is authorized exactly once, when it is opened; the rights it
//! receives are immutable and adjudicate every tunnel the session requests
//! afterwards. The wire protocol that carries those requests from the
//! client agent is out of scope here; this is the surface it calls into.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;
use warren_core::rights::normalize;
use warren_core::{PolicyError, Rights, TunnelRequest};

use crate::extauth::{AuthError, ExtAuth};
use crate::registry::{Tunnel, TunnelRegistry};

/// One authenticated client session.
pub struct Session {
    id: Uuid,
    rights: Rights,
}

impl Session {
    /// Open a session by exchanging `token` for its access rights. This is
    /// the only authorization call the session ever makes.
    pub async fn open(extauth: &ExtAuth, token: &str) -> Result<Self, AuthError> {
        let rights = extauth.authorize(token).await?;
        let id = Uuid::new_v4();
        debug!("Session {id} authorized");
        Ok(Self { id, rights })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn rights(&self) -> &Rights {
        &self.rights
    }

    /// Check a tunnel request against this session's rights. Denials are
    /// safe to send back to the client verbatim.
    pub fn request_tunnel(&self, req: &TunnelRequest) -> Result<(), PolicyError> {
        self.rights.evaluate(req)
    }

    /// Evaluate an `http`/`https` tunnel request and, when granted, register
    /// `tunnel` under its public key.
    ///
    /// The key is `<proto>://<hostname>` when the request names a hostname,
    /// `<proto>://<subdomain>.<domain>` when it names a subdomain, and a
    /// server-chosen subdomain under `domain` when the grant was automatic.
    pub fn register_http_tunnel(
        &self,
        registry: &TunnelRegistry,
        req: &TunnelRequest,
        domain: &str,
        tunnel: Arc<dyn Tunnel>,
    ) -> Result<String, PolicyError> {
        self.rights.evaluate(req)?;

        let host = match req.protocol.as_str() {
            "http" | "https" => {
                let hostname = normalize(&req.hostname);
                let subdomain = normalize(&req.subdomain);
                if !hostname.is_empty() {
                    hostname
                } else if !subdomain.is_empty() {
                    format!("{subdomain}.{domain}")
                } else {
                    format!("{}.{domain}", random_subdomain())
                }
            }
            other => return Err(PolicyError::UnsupportedProtocol(other.to_string())),
        };

        let key = format!("{}://{host}", req.protocol);
        registry.register(key.clone(), tunnel);
        info!("Session {} registered tunnel at {key}", self.id);
        Ok(key)
    }
}

/// Server-chosen subdomain for automatic grants.
fn random_subdomain() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
