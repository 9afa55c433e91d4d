//! Public connection listeners.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures::FutureExt;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::conn::{AsyncStream, PublicConn};
use crate::ingress::IngressMux;

/// Listener for public connections, plain or TLS-wrapped.
///
/// Binding failure is fatal and surfaces from [`PublicListener::bind`]; the
/// server cannot run without its ingress point. Everything after bind is
/// per-connection and never takes the listener down.
pub struct PublicListener {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    mux: Arc<IngressMux>,
}

impl PublicListener {
    pub async fn bind(
        addr: SocketAddr,
        tls: Option<TlsAcceptor>,
        mux: Arc<IngressMux>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "Listening for public {} connections on {}",
            mux.proto(),
            listener.local_addr()?
        );
        Ok(Self { listener, tls, mux })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept forever, spawning one independent handling task per
    /// connection. The accept loop never waits on a handling task.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {e}");
                    continue;
                }
            };

            let mux = self.mux.clone();
            let tls = self.tls.clone();
            tokio::spawn(async move {
                // The TLS handshake happens here so a slow handshake cannot
                // stall the accept loop.
                let stream: Box<dyn AsyncStream> = match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(stream) => Box::new(stream),
                        Err(e) => {
                            warn!("TLS handshake with {peer} failed: {e}");
                            return;
                        }
                    },
                    None => Box::new(stream),
                };

                // Error boundary: a panic in the handler is confined to this
                // connection, which Drop closes on every exit path.
                let conn = PublicConn::new(stream, peer);
                if let Err(panic) = AssertUnwindSafe(mux.handle_connection(conn))
                    .catch_unwind()
                    .await
                {
                    error!(
                        "Connection handler for {peer} panicked: {}",
                        panic_message(&panic)
                    );
                }
            });
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic payload"
    }
}
