//! Ingress multiplexing for public HTTP(S) connections.
//!
//! Decides, from the first bytes of an accepted connection, which registered
//! tunnel owns it, enforces that tunnel's HTTP auth, and hands the raw
//! connection off for relay. Connections that cannot be multiplexed are
//! answered with a synthesized response and closed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::conn::PublicConn;
use crate::registry::{ConnMeta, Registry};

/// How long a connection gets to present a parseable request before it is
/// rejected. The same fixed deadline applies to every connection; it bounds
/// the resources a slow or dead peer can hold while ownership of the
/// connection is still undecided.
pub const CONN_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on bytes buffered while detecting the request.
const DETECT_BUFFER_LIMIT: usize = 8 * 1024;

/// Header count cap for the detection parser.
const MAX_HEADERS: usize = 64;

const BAD_REQUEST: &[u8] = b"HTTP/1.0 400 Bad Request\nContent-Length: 12\n\nBad Request\n";

const NOT_AUTHORIZED: &[u8] = b"HTTP/1.0 401 Not Authorized\nWWW-Authenticate: Basic realm=\"ngrok\"\nContent-Length: 23\n\nAuthorization required\n";

fn not_found(host: &str) -> Vec<u8> {
    format!(
        "HTTP/1.0 404 Not Found\nContent-Length: {}\n\nTunnel {} not found\n",
        host.len() + 18,
        host
    )
    .into_bytes()
}

fn redirect_https(url: &str) -> Vec<u8> {
    format!(
        "HTTP/1.0 301 Moved Permanently\nContent-Length: {}\nLocation: https://{}\n\nContent Moved to https://{}\n",
        url.len() + 26,
        url,
        url
    )
    .into_bytes()
}

/// Listener protocol label. Used for diagnostics and for selecting the
/// http-to-https redirect fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    Http,
    Https,
}

impl Proto {
    pub fn as_str(self) -> &'static str {
        match self {
            Proto::Http => "http",
            Proto::Https => "https",
        }
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What detection extracts from the front of a request.
struct Detected {
    host: String,
    auth: String,
    path: String,
}

/// Per-connection admission logic for one public listener.
pub struct IngressMux {
    registry: Arc<dyn Registry>,
    proto: Proto,
    findme_host: Option<String>,
}

impl IngressMux {
    /// `findme_host` is the fully-qualified diagnostic hostname
    /// (`<label>.<domain>`), or `None` when the feature is disabled.
    pub fn new(registry: Arc<dyn Registry>, proto: Proto, findme_host: Option<String>) -> Self {
        Self {
            registry,
            proto,
            findme_host,
        }
    }

    pub fn proto(&self) -> Proto {
        self.proto
    }

    /// Handle one accepted public connection to completion: either reject it
    /// with a synthesized response, or hand it off to the owning tunnel.
    pub async fn handle_connection(&self, mut conn: PublicConn) {
        let detected = match timeout(CONN_READ_TIMEOUT, detect(&mut conn)).await {
            Ok(Ok(detected)) => detected,
            Ok(Err(e)) => {
                warn!("Failed to read valid {} request: {e}", self.proto);
                reject(&mut conn, BAD_REQUEST).await;
                return;
            }
            Err(_) => {
                warn!("Timed out reading {} request", self.proto);
                reject(&mut conn, BAD_REQUEST).await;
                return;
            }
        };

        let Detected { host, auth, path } = detected;
        let url = format!("{host}{path}");

        // Registry keys are host-only; a findme request is routed by the
        // caller's own address instead of the Host header.
        let mut lookup_host = strip_port(&host).to_string();
        if self.findme_host.as_deref() == Some(host.as_str()) {
            lookup_host = conn.peer_addr().ip().to_string();
            info!("Hostname set to {lookup_host}");
        }

        debug!("Found hostname {lookup_host} in request");
        let tunnel = match self.registry.get(&format!("{}://{lookup_host}", self.proto)) {
            Some(tunnel) => tunnel,
            None => {
                if self.proto == Proto::Http {
                    debug!("No http tunnel found, checking for one at https://{lookup_host}");
                    if self.registry.get(&format!("https://{lookup_host}")).is_some() {
                        debug!("Redirecting to https for request {url}");
                        reject(&mut conn, &redirect_https(&url)).await;
                        return;
                    }
                }
                info!("No tunnel found for hostname {lookup_host}");
                reject(&mut conn, &not_found(&lookup_host)).await;
                return;
            }
        };

        // The credential must match the Authorization header exactly.
        if let Some(required) = tunnel.required_http_auth() {
            if !required.is_empty() && auth != required {
                info!("Authentication failed: {auth}");
                reject(&mut conn, NOT_AUTHORIZED).await;
                return;
            }
        }

        // Liveness is the tunnel's responsibility from here on (its own
        // heartbeating); no deadline is re-armed by this path.
        let meta = ConnMeta {
            host: lookup_host,
            url,
        };
        tunnel.handle_public_connection(conn, meta).await;
    }
}

/// Read just far enough to extract the Host header, the Authorization
/// header and the request target, leaving every consumed byte queued for
/// replay on `conn`.
async fn detect(conn: &mut PublicConn) -> Result<Detected> {
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        let n = conn.read_buf(&mut buf).await?;
        if n == 0 {
            anyhow::bail!("connection closed before the request was complete");
        }

        if let Some(detected) = parse_request(&buf)? {
            conn.set_replay(buf.freeze());
            return Ok(detected);
        }

        if buf.len() >= DETECT_BUFFER_LIMIT {
            anyhow::bail!("request header section exceeds {DETECT_BUFFER_LIMIT} bytes");
        }
    }
}

/// Parse the front of the byte stream as an HTTP request. Returns `None`
/// while the header section is still incomplete. Parser scratch does not
/// outlive this call; only the extracted strings do.
fn parse_request(buf: &[u8]) -> Result<Option<Detected>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(buf) {
        Ok(httparse::Status::Partial) => Ok(None),
        Ok(httparse::Status::Complete(_)) => {
            let path = req.path.unwrap_or("/").to_string();
            let mut host = String::new();
            let mut auth = String::new();
            for header in req.headers.iter() {
                // first occurrence wins for repeated headers
                if host.is_empty() && header.name.eq_ignore_ascii_case("host") {
                    host = String::from_utf8_lossy(header.value).trim().to_lowercase();
                } else if auth.is_empty() && header.name.eq_ignore_ascii_case("authorization") {
                    auth = String::from_utf8_lossy(header.value).to_string();
                }
            }
            if host.is_empty() {
                anyhow::bail!("request has no Host header");
            }
            Ok(Some(Detected { host, auth, path }))
        }
        Err(e) => Err(anyhow::anyhow!("invalid HTTP request: {e}")),
    }
}

fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

/// Write a synthesized response and close. Bounded by the same fixed
/// deadline as detection; a peer that will not take the response is
/// abandoned and the write error ignored, the connection is closing either
/// way.
async fn reject(conn: &mut PublicConn, response: &[u8]) {
    let _ = timeout(CONN_READ_TIMEOUT, async {
        conn.write_all(response).await?;
        conn.shutdown().await
    })
    .await;
}
