//! TCP listener and top-level server wiring.
//!
//! This module:
//! - Listens on the configured address/port.
//! - Accepts new TCP connections.
//! - Assigns each connection a `ClientId`.
//! - Spawns:
//!   - a per-client task to handle I/O,
//!   - a single ticker task advancing the price feed.
//!
//! Client tasks share one `Arc<Exchange>` and call it directly; the
//! exchange does its own locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use exchange_core::Exchange;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::client;
use crate::config::Config;
use crate::ticker::run_ticker;
use crate::types::{ClientId, ClientRegistry, OutboundRx, OutboundTx};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_client_id() -> ClientId {
    let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    ClientId(id)
}

/// Run the TCP server with the given configuration.
pub async fn run(config: Config) -> Result<()> {
    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    let exchange = Arc::new(Exchange::new(config.exchange.clone()));

    {
        let exchange = exchange.clone();
        let period = config.tick_interval();
        tokio::spawn(async move {
            run_ticker(exchange, period, StdRng::from_entropy()).await;
        });
    }

    serve(listener, exchange, config.max_clients).await
}

/// Accept connections on `listener` until it fails.
pub async fn serve(listener: TcpListener, exchange: Arc<Exchange>, max_clients: usize) -> Result<()> {
    // Shared registry of clients → outbound channels.
    let clients: ClientRegistry = Arc::new(RwLock::new(Default::default()));

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let current_clients = {
            let guard = clients.read().await;
            guard.len()
        };

        if current_clients >= max_clients {
            warn!(%peer_addr, max_clients, "rejecting connection: max_clients reached");
            // Just drop the stream; client will see connection closed.
            continue;
        }

        let client_id = next_client_id();
        info!(client = %client_id, %peer_addr, "accepted connection");

        let (out_tx, out_rx): (OutboundTx, OutboundRx) = mpsc::unbounded_channel();

        {
            let mut guard = clients.write().await;
            guard.insert(client_id, out_tx.clone());
        }

        let clients = clients.clone();
        let exchange = exchange.clone();

        tokio::spawn(async move {
            if let Err(err) = client::run_client(client_id, stream, exchange, out_tx, out_rx, clients).await {
                warn!(client = %client_id, %err, "client error");
            }
        });
    }
}
