//! TCP server: accepts terminal connections and drives the protocol path.
//!
//! Each accepted connection gets two tasks: a reader that owns the growing
//! receive buffer and drives the framer, and a writer that owns the write
//! half and drains the connection's command channel. Replies from the
//! handler and closes from the session sweeper both travel through that
//! channel, so writes stay ordered and the socket is closed exactly once.
//!
//! A closing connection does not touch the session map; a vehicle that went
//! away stops refreshing its session and the sweeper evicts it.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::handler::{ConnState, ProtocolHandler};
use crate::protocol::{Framer, Packet};
use crate::session::{ConnCommand, ConnHandle};

const READ_CHUNK: usize = 4096;

/// Accept loop over the gateway's listener socket.
pub struct GatewayServer {
    handler: Arc<ProtocolHandler>,
    framer: Framer,
}

impl GatewayServer {
    /// Create a server dispatching to `handler`, with the given frame-size
    /// cap.
    pub fn new(handler: Arc<ProtocolHandler>, max_packet_size: usize) -> Self {
        Self { handler, framer: Framer::new(max_packet_size) }
    }

    /// Accept connections until `shutdown` flips to true.
    pub async fn run(&self, listener: TcpListener, shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "gateway listening");
        }
        let mut accept_shutdown = shutdown.clone();
        loop {
            tokio::select! {
                changed = accept_shutdown.changed() => {
                    if changed.is_err() || *accept_shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(peer = %addr, "connection opened");
                        let handler = Arc::clone(&self.handler);
                        let framer = self.framer;
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            let (read_half, write_half) = stream.into_split();
                            let (tx, rx) = mpsc::unbounded_channel();
                            let conn = ConnState::new(ConnHandle::new(addr.to_string(), tx));
                            let writer = tokio::spawn(writer_loop(write_half, rx));
                            read_loop(read_half, conn, handler, framer, shutdown).await;
                            let _ = writer.await;
                            debug!(peer = %addr, "connection closed");
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        }
        info!("gateway listener stopped");
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    mut conn: ConnState,
    handler: Arc<ProtocolHandler>,
    framer: Framer,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buffer: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            read = read_half.read(&mut chunk) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(peer = %conn.handle.peer(), error = %e, "read failed");
                    break;
                }
            },
        };
        buffer.extend_from_slice(&chunk[..n]);

        loop {
            let step = framer.step(&buffer);
            if let Some(frame) = &step.frame {
                match Packet::decode(frame) {
                    Ok(packet) => {
                        if let Err(e) = handler.handle(&mut conn, &packet) {
                            warn!(peer = %conn.handle.peer(), vin = %packet.vin, error = %e, "packet handling failed");
                        }
                    }
                    Err(e) => warn!(peer = %conn.handle.peer(), error = %e, "frame decode failed"),
                }
            }
            if step.advance == 0 {
                break;
            }
            buffer.drain(..step.advance);
        }
    }

    // Stop the writer if it is still running; idempotent when the writer
    // already closed the socket.
    conn.handle.close();
}

async fn writer_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<ConnCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            ConnCommand::Send(bytes) => {
                if let Err(e) = write_half.write_all(&bytes).await {
                    error!(error = %e, "write failed, closing connection");
                    break;
                }
            }
            ConnCommand::Close => break,
        }
    }
    let _ = write_half.shutdown().await;
}
