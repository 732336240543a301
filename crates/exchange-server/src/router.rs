//! Response routing.
//!
//! Routing policy:
//! - `Trade`, `TopOfBook`: broadcast to **all** connected clients.
//! - everything else: sent **only** to the originating client.

use std::collections::HashMap;

use exchange_core::Response;

use crate::types::{ClientId, ClientRegistry, OutboundTx};

/// Route every response produced by one request.
pub async fn route_outputs(origin: ClientId, outputs: Vec<Response>, clients: &ClientRegistry) {
    if outputs.is_empty() {
        return;
    }

    // Snapshot of current clients to minimize lock hold time.
    let current_clients = {
        let guard = clients.read().await;
        guard.clone()
    };

    for out in outputs {
        route_output(origin, out, &current_clients);
    }
}

fn route_output(origin: ClientId, msg: Response, clients: &HashMap<ClientId, OutboundTx>) {
    if msg.is_market_event() {
        for tx in clients.values() {
            let _ = tx.send(msg.clone());
        }
    } else if let Some(tx) = clients.get(&origin) {
        let _ = tx.send(msg);
    }
}
