//! Core policy types for the warren tunnel server.
//!
//! This crate holds the session access-rights model shared between the
//! server's authorization path and anything that needs to reason about
//! tunnel requests: the rights document, the evaluator, and the policy
//! denial errors.

pub mod error;
pub mod rights;

pub use error::PolicyError;
pub use rights::{Rights, RightsDocument, TunnelRequest};
