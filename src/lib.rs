//! JSON-RPC audit gateway
//!
//! A transparent forwarding proxy that records every inbound JSON-RPC call and
//! its outcome, keyed by a per-call request ID, whether or not forwarding
//! succeeds.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};
