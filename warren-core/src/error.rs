//! Policy denial errors returned to a session requesting a tunnel.

use thiserror::Error;

/// Why a tunnel request was denied.
///
/// Every message names only parameters the requester supplied, so these are
/// safe to send back to the client session verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Port {0} not allowed for this session")]
    PortNotAllowed(u16),
    #[error("Automatic port not allowed for this session")]
    AutoPortNotAllowed,
    #[error("Hostname {0} not allowed for this session")]
    HostnameNotAllowed(String),
    #[error("Subdomain {0} not allowed for this session")]
    SubdomainNotAllowed(String),
    #[error("Automatic subdomain not allowed for this session")]
    AutoSubdomainNotAllowed,
    #[error("Protocol {0} is not supported")]
    UnsupportedProtocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denials_name_only_request_parameters() {
        assert_eq!(
            PolicyError::PortNotAllowed(2222).to_string(),
            "Port 2222 not allowed for this session"
        );
        assert_eq!(
            PolicyError::HostnameNotAllowed("foo.com".into()).to_string(),
            "Hostname foo.com not allowed for this session"
        );
        assert_eq!(
            PolicyError::UnsupportedProtocol("gopher".into()).to_string(),
            "Protocol gopher is not supported"
        );
    }
}
