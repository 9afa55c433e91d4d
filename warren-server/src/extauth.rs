//! External authorization client.
//!
//! Translates a session token into that session's access rights by calling
//! the configured authorization service once. With no service configured the
//! server runs in default-permit mode and every session gets full rights.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use warren_core::rights::{Rights, RightsDocument};

use crate::config::AuthEncoding;

/// Timeout for the outbound authorization call.
const AUTH_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Authorization failure as seen by the session awaiting authorization.
///
/// Deliberately cause-free: the transport or decode error is logged on the
/// server, never surfaced to the client-facing error path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("External authorization unavailable")]
    Unavailable,
}

/// Logging capability for the authorization client.
///
/// Injected at construction so tests can substitute a no-op or recording
/// logger.
pub trait AuthLog: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
}

/// Default [`AuthLog`]: forwards to the `tracing` macros.
pub struct TracingLog;

impl AuthLog for TracingLog {
    fn debug(&self, msg: &str) {
        debug!("{msg}");
    }

    fn info(&self, msg: &str) {
        info!("{msg}");
    }

    fn warn(&self, msg: &str) {
        warn!("{msg}");
    }
}

#[derive(Serialize)]
struct TokenPayload<'a> {
    #[serde(rename = "Token")]
    token: &'a str,
}

/// Client for the external authorization service.
pub struct ExtAuth {
    auth_url: Option<String>,
    encoding: AuthEncoding,
    http: reqwest::Client,
    log: Arc<dyn AuthLog>,
}

impl ExtAuth {
    pub fn new(auth_url: Option<String>, encoding: AuthEncoding) -> Self {
        Self::with_logger(auth_url, encoding, Arc::new(TracingLog))
    }

    pub fn with_logger(
        auth_url: Option<String>,
        encoding: AuthEncoding,
        log: Arc<dyn AuthLog>,
    ) -> Self {
        Self {
            auth_url,
            encoding,
            http: reqwest::Client::builder()
                .timeout(AUTH_CALL_TIMEOUT)
                .build()
                .unwrap_or_default(),
            log,
        }
    }

    /// Whether an external service is configured, for startup diagnostics.
    pub fn is_external(&self) -> bool {
        self.auth_url.is_some()
    }

    /// Exchange a session token for that session's access rights.
    ///
    /// Called exactly once per session; the caller caches the result for the
    /// session's lifetime. Transport and decode failures both collapse into
    /// [`AuthError::Unavailable`].
    pub async fn authorize(&self, token: &str) -> Result<Rights, AuthError> {
        let url = match &self.auth_url {
            Some(url) => url,
            None => return Ok(Rights::allow_all()),
        };

        self.log
            .debug(&format!("External authorization request for token: {token}"));

        let request = match self.encoding {
            AuthEncoding::Json => self.http.post(url).json(&TokenPayload { token }),
            AuthEncoding::Form => self.http.post(url).form(&[("Token", token)]),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                self.log.warn(&e.to_string());
                return Err(AuthError::Unavailable);
            }
        };

        let doc: RightsDocument = match response.json().await {
            Ok(doc) => doc,
            Err(e) => {
                self.log.warn(&e.to_string());
                return Err(AuthError::Unavailable);
            }
        };

        Ok(Rights::from_document(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use warren_core::TunnelRequest;

    #[derive(Default)]
    struct RecordingLog {
        warnings: Mutex<Vec<String>>,
    }

    impl AuthLog for RecordingLog {
        fn debug(&self, _msg: &str) {}

        fn info(&self, _msg: &str) {}

        fn warn(&self, msg: &str) {
            self.warnings.lock().unwrap().push(msg.to_string());
        }
    }

    /// Stub authorization service: records request bodies, answers with a
    /// fixed payload.
    async fn stub_service(reply: &'static str) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let captured = bodies.clone();
        let app = Router::new().route(
            "/auth",
            post(move |body: String| {
                let captured = captured.clone();
                async move {
                    captured.lock().unwrap().push(body);
                    reply
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, bodies)
    }

    fn tcp_request(port: u16) -> TunnelRequest {
        TunnelRequest {
            protocol: "tcp".to_string(),
            remote_port: port,
            ..TunnelRequest::default()
        }
    }

    #[tokio::test]
    async fn test_no_endpoint_grants_full_rights() {
        let extauth = ExtAuth::new(None, AuthEncoding::Json);
        assert!(!extauth.is_external());

        let rights = extauth.authorize("anything").await.unwrap();
        assert!(rights.is_allow_all());
        assert!(rights.evaluate(&tcp_request(12345)).is_ok());
    }

    #[tokio::test]
    async fn test_json_encoding_and_decoded_rights() {
        let (addr, bodies) =
            stub_service(r#"{"AllowedHostnames":["foo.com"],"AllowedPorts":[443,80,22]}"#).await;

        let extauth = ExtAuth::new(Some(format!("http://{addr}/auth")), AuthEncoding::Json);
        let rights = extauth.authorize("secret").await.unwrap();

        assert_eq!(
            *bodies.lock().unwrap(),
            vec![r#"{"Token":"secret"}"#.to_string()]
        );
        assert!(rights.evaluate(&tcp_request(80)).is_ok());
        assert!(rights.evaluate(&tcp_request(8080)).is_err());
    }

    #[tokio::test]
    async fn test_form_encoding() {
        let (addr, bodies) = stub_service("{}").await;

        let extauth = ExtAuth::new(Some(format!("http://{addr}/auth")), AuthEncoding::Form);
        extauth.authorize("secret").await.unwrap();

        assert_eq!(*bodies.lock().unwrap(), vec!["Token=secret".to_string()]);
    }

    #[tokio::test]
    async fn test_transport_failure_is_generic_unavailable() {
        // Bind and immediately drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let log = Arc::new(RecordingLog::default());
        let extauth = ExtAuth::with_logger(
            Some(format!("http://{addr}/auth")),
            AuthEncoding::Json,
            log.clone(),
        );

        let err = extauth.authorize("secret").await.unwrap_err();
        assert_eq!(err, AuthError::Unavailable);
        assert_eq!(err.to_string(), "External authorization unavailable");
        // the cause went to the log, not to the caller
        assert_eq!(log.warnings.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_generic_unavailable() {
        let (addr, _bodies) = stub_service("not json at all").await;

        let log = Arc::new(RecordingLog::default());
        let extauth = ExtAuth::with_logger(
            Some(format!("http://{addr}/auth")),
            AuthEncoding::Json,
            log.clone(),
        );

        let err = extauth.authorize("secret").await.unwrap_err();
        assert_eq!(err, AuthError::Unavailable);
        assert_eq!(log.warnings.lock().unwrap().len(), 1);
    }
}
