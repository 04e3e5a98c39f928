//! Application lifecycle
//!
//! Loads settings, opens the audit backends, and serves the gateway router.

pub mod app;

pub use app::Application;
