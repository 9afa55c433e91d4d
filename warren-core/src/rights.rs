//! Session access rights and tunnel-request evaluation.
//!
//! A session is authorized once; the resulting [`Rights`] object is immutable
//! for the session's lifetime and adjudicates every tunnel request it makes.
//! Allowlists are sorted exactly once at construction so that the hot path
//! (tunnel requests on a busy server) is a binary search, not a scan.

use serde::Deserialize;

use crate::error::PolicyError;

/// Authorization result for one session, as returned by the external
/// authorization service.
///
/// Field names are part of the service wire contract and are matched
/// case-sensitively.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RightsDocument {
    #[serde(rename = "AllowedHostnames")]
    pub allowed_hostnames: Vec<String>,
    #[serde(rename = "AllowedSubdomains")]
    pub allowed_subdomains: Vec<String>,
    #[serde(rename = "AllowedPorts")]
    pub allowed_ports: Vec<u16>,
    #[serde(rename = "AutomaticPortAllowed")]
    pub automatic_port_allowed: bool,
    #[serde(rename = "AutomaticSubdomainAllowed")]
    pub automatic_subdomain_allowed: bool,
    #[serde(rename = "AllowAll")]
    pub allow_all: bool,
}

/// A tunnel requested by a client session.
///
/// `protocol` is an open set on the wire; anything other than `tcp`, `http`
/// or `https` is denied rather than rejected at parse time. A `remote_port`
/// of 0 and empty `hostname`/`subdomain` mean "not requested".
#[derive(Debug, Clone, Default)]
pub struct TunnelRequest {
    pub protocol: String,
    pub remote_port: u16,
    pub hostname: String,
    pub subdomain: String,
}

/// Evaluated, immutable access rights for one session.
///
/// Constructed exactly once per session and never mutated afterwards, so it
/// can be shared across tasks without synchronization.
#[derive(Debug, Clone)]
pub struct Rights {
    doc: RightsDocument,
}

impl Rights {
    /// Rights that permit everything. Used when no external authorization
    /// service is configured (standalone deployments).
    pub fn allow_all() -> Self {
        Self {
            doc: RightsDocument {
                allow_all: true,
                ..RightsDocument::default()
            },
        }
    }

    /// Build rights from a decoded document, sorting the allowlists for
    /// binary-search membership checks.
    pub fn from_document(mut doc: RightsDocument) -> Self {
        doc.allowed_hostnames.sort();
        doc.allowed_subdomains.sort();
        doc.allowed_ports.sort_unstable();
        Self { doc }
    }

    /// Whether these rights permit everything unconditionally.
    pub fn is_allow_all(&self) -> bool {
        self.doc.allow_all
    }

    /// Decide whether `req` is permitted under these rights.
    ///
    /// Hostname takes precedence over subdomain: a request naming a hostname
    /// is adjudicated against the hostname allowlist only, and never falls
    /// through to the subdomain allowlist when the hostname does not match.
    pub fn evaluate(&self, req: &TunnelRequest) -> Result<(), PolicyError> {
        if self.doc.allow_all {
            return Ok(());
        }

        match req.protocol.as_str() {
            "tcp" => {
                if req.remote_port != 0 {
                    if self.doc.allowed_ports.binary_search(&req.remote_port).is_ok() {
                        return Ok(());
                    }
                    return Err(PolicyError::PortNotAllowed(req.remote_port));
                }
                if self.doc.automatic_port_allowed {
                    return Ok(());
                }
                Err(PolicyError::AutoPortNotAllowed)
            }
            "http" | "https" => {
                let hostname = normalize(&req.hostname);
                if !hostname.is_empty() {
                    if self.doc.allowed_hostnames.binary_search(&hostname).is_ok() {
                        return Ok(());
                    }
                    return Err(PolicyError::HostnameNotAllowed(hostname));
                }

                let subdomain = normalize(&req.subdomain);
                if !subdomain.is_empty() {
                    if self.doc.allowed_subdomains.binary_search(&subdomain).is_ok() {
                        return Ok(());
                    }
                    return Err(PolicyError::SubdomainNotAllowed(subdomain));
                }

                if self.doc.automatic_subdomain_allowed {
                    return Ok(());
                }
                Err(PolicyError::AutoSubdomainNotAllowed)
            }
            other => Err(PolicyError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// Name normalization applied to requested hostnames and subdomains before
/// any membership check: membership is case- and whitespace-insensitive.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_request(hostname: &str, subdomain: &str) -> TunnelRequest {
        TunnelRequest {
            protocol: "http".to_string(),
            hostname: hostname.to_string(),
            subdomain: subdomain.to_string(),
            ..TunnelRequest::default()
        }
    }

    fn tcp_request(port: u16) -> TunnelRequest {
        TunnelRequest {
            protocol: "tcp".to_string(),
            remote_port: port,
            ..TunnelRequest::default()
        }
    }

    #[test]
    fn test_allow_all_permits_everything() {
        let rights = Rights::allow_all();
        assert!(rights.evaluate(&tcp_request(22)).is_ok());
        assert!(rights.evaluate(&tcp_request(0)).is_ok());
        assert!(rights.evaluate(&http_request("anything.example.com", "")).is_ok());
        assert!(rights.evaluate(&http_request("", "")).is_ok());
        // even protocols that would otherwise be unsupported
        assert!(rights
            .evaluate(&TunnelRequest {
                protocol: "gopher".to_string(),
                ..TunnelRequest::default()
            })
            .is_ok());
    }

    #[test]
    fn test_tcp_port_membership_is_exact() {
        let rights = Rights::from_document(RightsDocument {
            allowed_ports: vec![8080, 22, 443],
            ..RightsDocument::default()
        });

        for port in [22, 443, 8080] {
            assert!(rights.evaluate(&tcp_request(port)).is_ok());
        }
        assert_eq!(
            rights.evaluate(&tcp_request(23)),
            Err(PolicyError::PortNotAllowed(23))
        );
    }

    #[test]
    fn test_tcp_automatic_port() {
        let denied = Rights::from_document(RightsDocument::default());
        assert_eq!(
            denied.evaluate(&tcp_request(0)),
            Err(PolicyError::AutoPortNotAllowed)
        );

        let granted = Rights::from_document(RightsDocument {
            automatic_port_allowed: true,
            ..RightsDocument::default()
        });
        assert!(granted.evaluate(&tcp_request(0)).is_ok());
    }

    #[test]
    fn test_hostname_membership_ignores_case_and_whitespace() {
        let rights = Rights::from_document(RightsDocument {
            allowed_hostnames: vec!["foo.com".to_string()],
            ..RightsDocument::default()
        });

        for host in ["foo.com", "FOO.COM", " Foo.com "] {
            assert!(rights.evaluate(&http_request(host, "")).is_ok(), "{host:?}");
        }
        assert_eq!(
            rights.evaluate(&http_request("bar.com", "")),
            Err(PolicyError::HostnameNotAllowed("bar.com".to_string()))
        );
    }

    #[test]
    fn test_hostname_takes_precedence_over_subdomain() {
        // subdomain would match, but the request names a hostname that does
        // not: the outcome must be the hostname denial, never a subdomain
        // result.
        let rights = Rights::from_document(RightsDocument {
            allowed_subdomains: vec!["app".to_string()],
            automatic_subdomain_allowed: true,
            ..RightsDocument::default()
        });

        assert_eq!(
            rights.evaluate(&http_request("denied.com", "app")),
            Err(PolicyError::HostnameNotAllowed("denied.com".to_string()))
        );
    }

    #[test]
    fn test_subdomain_checked_when_no_hostname() {
        let rights = Rights::from_document(RightsDocument {
            allowed_subdomains: vec!["app".to_string()],
            ..RightsDocument::default()
        });

        assert!(rights.evaluate(&http_request("", "app")).is_ok());
        assert!(rights.evaluate(&http_request("", " APP ")).is_ok());
        assert_eq!(
            rights.evaluate(&http_request("", "other")),
            Err(PolicyError::SubdomainNotAllowed("other".to_string()))
        );
    }

    #[test]
    fn test_automatic_subdomain() {
        let denied = Rights::from_document(RightsDocument::default());
        assert_eq!(
            denied.evaluate(&http_request("", "")),
            Err(PolicyError::AutoSubdomainNotAllowed)
        );

        let granted = Rights::from_document(RightsDocument {
            automatic_subdomain_allowed: true,
            ..RightsDocument::default()
        });
        assert!(granted.evaluate(&http_request("", "")).is_ok());
    }

    #[test]
    fn test_unknown_protocol_denied() {
        let rights = Rights::from_document(RightsDocument {
            automatic_port_allowed: true,
            automatic_subdomain_allowed: true,
            ..RightsDocument::default()
        });
        assert_eq!(
            rights.evaluate(&TunnelRequest {
                protocol: "udp".to_string(),
                ..TunnelRequest::default()
            }),
            Err(PolicyError::UnsupportedProtocol("udp".to_string()))
        );
    }

    #[test]
    fn test_document_round_trip_sorts_ports() {
        let doc: RightsDocument =
            serde_json::from_str(r#"{"AllowedPorts":[443,80,22]}"#).unwrap();
        let rights = Rights::from_document(doc);

        assert_eq!(rights.doc.allowed_ports, vec![22, 80, 443]);
        for port in [22, 80, 443] {
            assert!(rights.evaluate(&tcp_request(port)).is_ok());
        }
        assert!(rights.evaluate(&tcp_request(8080)).is_err());
    }

    #[test]
    fn test_document_missing_fields_decode_to_zero_values() {
        let doc: RightsDocument = serde_json::from_str("{}").unwrap();
        assert!(!doc.allow_all);
        assert!(doc.allowed_hostnames.is_empty());
        assert!(doc.allowed_ports.is_empty());

        let doc: RightsDocument =
            serde_json::from_str(r#"{"AllowAll":true}"#).unwrap();
        assert!(doc.allow_all);
    }
}
