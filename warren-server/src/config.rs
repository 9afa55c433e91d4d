//! Server configuration.

use clap::{Parser, ValueEnum};

/// Body encoding for the external authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthEncoding {
    /// POST a JSON body: `{"Token":"<token>"}`
    Json,
    /// POST a url-encoded form field: `Token=<token>`
    Form,
}

/// Warren Server - public ingress for reverse tunnels.
#[derive(Parser, Debug, Clone)]
#[command(name = "warren-server")]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Domain this server serves tunnels under (e.g., tunnel.example.com)
    #[arg(long, env = "WARREN_DOMAIN", default_value = "localhost")]
    pub domain: String,

    /// Port for public plain-HTTP traffic
    #[arg(long, env = "WARREN_HTTP_PORT", default_value = "80")]
    pub http_port: u16,

    /// Port for public HTTPS traffic (served when cert and key are set)
    #[arg(long, env = "WARREN_HTTPS_PORT", default_value = "443")]
    pub https_port: u16,

    /// Path to TLS certificate chain file (PEM format)
    #[arg(long, env = "WARREN_CERT_PATH")]
    pub cert_path: Option<String>,

    /// Path to TLS private key file (PEM format)
    #[arg(long, env = "WARREN_KEY_PATH")]
    pub key_path: Option<String>,

    /// External authorization service URL.
    /// When unset, every session is granted full rights.
    #[arg(long, env = "WARREN_AUTH_URL")]
    pub auth_url: Option<String>,

    /// Body encoding for the authorization request
    #[arg(long, env = "WARREN_AUTH_ENCODING", value_enum, default_value = "json")]
    pub auth_encoding: AuthEncoding,

    /// Diagnostic hostname label: requests for <findme>.<domain> are routed
    /// by the caller's own IP address instead of the Host header.
    /// Empty disables the feature.
    #[arg(long, env = "WARREN_FINDME", default_value = "")]
    pub findme: String,

    /// Enable debug logging
    #[arg(long, env = "WARREN_DEBUG")]
    pub debug: bool,
}

impl ServerConfig {
    /// Whether the HTTPS listener should be started.
    pub fn tls_enabled(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }

    /// The findme hostname, when the feature is enabled.
    pub fn findme_host(&self) -> Option<String> {
        if self.findme.is_empty() {
            None
        } else {
            Some(format!("{}.{}", self.findme, self.domain))
        }
    }
}
