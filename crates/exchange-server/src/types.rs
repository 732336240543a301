//! Shared types for the exchange TCP server.
//!
//! This module defines:
//! - `ClientId`: a lightweight handle for connected clients
//! - channel aliases for responses flowing back to clients
//! - the client registry used for broadcast routing

use std::collections::HashMap;
use std::sync::Arc;

use exchange_core::Response;
use tokio::sync::mpsc;
use tokio::sync::RwLock;

/// Identifier for a connected client.
///
/// This is intentionally opaque; we just guarantee uniqueness
/// over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound responses from the exchange to a given client.
pub type OutboundTx = mpsc::UnboundedSender<Response>;
pub type OutboundRx = mpsc::UnboundedReceiver<Response>;

/// Registry of connected clients and their outbound channels.
///
/// - Key: `ClientId`
/// - Value: `OutboundTx` to send `Response`s to that client.
pub type ClientRegistry = Arc<RwLock<HashMap<ClientId, OutboundTx>>>;
