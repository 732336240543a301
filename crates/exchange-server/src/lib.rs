//! exchange-server
//!
//! Multi-client async TCP server for the simulated exchange.

pub mod config;
pub mod types;
pub mod server;
pub mod ticker;

// these are internal modules, not re-exported
mod client;
mod router;
