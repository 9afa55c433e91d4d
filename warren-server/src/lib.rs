//! Public-ingress path of the warren reverse-tunnel server.
//!
//! Untrusted internet clients connect to a shared listener; each connection
//! is routed to the registered tunnel that owns its hostname, checked
//! against that tunnel's HTTP auth, and handed off for relay. Sessions that
//! register tunnels are gated by access rights obtained from an external
//! authorization service (or granted in full when none is configured).

pub mod config;
pub mod conn;
pub mod extauth;
pub mod ingress;
pub mod listener;
pub mod registry;
pub mod session;
pub mod tls;
