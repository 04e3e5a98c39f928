//! Domain types for the audit gateway
//!
//! Audit records, their identifiers, and the small amount of JSON-RPC and
//! event-stream knowledge the gateway needs to index and store traffic.

pub mod audit;
pub mod event_stream;
pub mod jsonrpc;
pub mod types;

pub use audit::*;
pub use types::*;
