//! Per-connection I/O.
//!
//! The reader half splits the byte stream into lines, picks the protocol
//! from the first non-blank line, and hands each decoded request straight
//! to the shared [`Exchange`]. A writer task, started as soon as the
//! client connects, drains the client's outbound channel and encodes
//! responses in the client's protocol (CSV until the first line says
//! otherwise).

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use bytes::BytesMut;
use exchange_core::{Exchange, Response};
use exchange_protocol::Protocol;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::router::route_outputs;
use crate::types::{ClientId, ClientRegistry, OutboundRx, OutboundTx};

/// Longest accepted request line, in bytes.
const MAX_LINE_LEN: usize = 8 * 1024;

/// Run the client I/O loop for a single connection.
///
/// Returns once the peer closes the connection; the client is removed
/// from the registry in every case.
pub async fn run_client(
    client_id: ClientId,
    stream: TcpStream,
    exchange: Arc<Exchange>,
    out_tx: OutboundTx,
    out_rx: OutboundRx,
    clients: ClientRegistry,
) -> Result<()> {
    let (read_stream, write_stream) = stream.into_split();
    let protocol = Arc::new(OnceLock::new());

    tokio::spawn(write_loop(client_id, write_stream, out_rx, protocol.clone()));

    let result = read_loop(client_id, read_stream, &exchange, &out_tx, &protocol, &clients).await;

    {
        let mut guard = clients.write().await;
        guard.remove(&client_id);
    }

    result
}

async fn read_loop(
    client_id: ClientId,
    mut read_stream: tokio::net::tcp::OwnedReadHalf,
    exchange: &Exchange,
    out_tx: &OutboundTx,
    protocol: &OnceLock<Protocol>,
    clients: &ClientRegistry,
) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);

    // Set after an over-long line was rejected, until its end arrives.
    let mut discarding = false;

    loop {
        let n = read_stream.read_buf(&mut buffer).await?;
        if n == 0 {
            break;
        }

        while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
            let line = buffer.split_to(newline_pos + 1);
            if std::mem::take(&mut discarding) {
                continue;
            }
            if line.len() > MAX_LINE_LEN {
                reject_long_line(client_id, out_tx);
                continue;
            }

            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let proto = *protocol.get_or_init(|| {
                let p = Protocol::detect(line.as_bytes()[0]);
                info!(client = %client_id, protocol = ?p, "protocol selected");
                p
            });

            match proto.decode_request(line) {
                Ok(Some(request)) => {
                    debug!(client = %client_id, ?request, "request");
                    let outputs = exchange.process(request);
                    route_outputs(client_id, outputs, clients).await;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(client = %client_id, %err, line, "invalid input");
                    let _ = out_tx.send(Response::invalid_request(err.to_string()));
                }
            }
        }

        if buffer.len() > MAX_LINE_LEN {
            if !discarding {
                reject_long_line(client_id, out_tx);
            }
            buffer.clear();
            discarding = true;
        }
    }

    info!(client = %client_id, "client disconnected");
    Ok(())
}

fn reject_long_line(client_id: ClientId, out_tx: &OutboundTx) {
    warn!(client = %client_id, max = MAX_LINE_LEN, "line too long");
    let _ = out_tx.send(Response::invalid_request(format!(
        "line longer than {MAX_LINE_LEN} bytes"
    )));
}

async fn write_loop(
    client_id: ClientId,
    mut write_stream: OwnedWriteHalf,
    mut out_rx: OutboundRx,
    protocol: Arc<OnceLock<Protocol>>,
) {
    while let Some(msg) = out_rx.recv().await {
        let proto = protocol.get().copied().unwrap_or(Protocol::Csv);
        if let Err(err) = write_message(&mut write_stream, &msg, proto).await {
            warn!(client = %client_id, %err, "write error");
            break;
        }
    }
}

async fn write_message(
    stream: &mut OwnedWriteHalf,
    msg: &Response,
    protocol: Protocol,
) -> Result<()> {
    let mut text = protocol.encode_response(msg)?;
    text.push('\n');

    stream.write_all(text.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
