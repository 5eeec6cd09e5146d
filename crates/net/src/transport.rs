//! TCP transport adapter
//!
//! Turns TCP connections into channels for the sync engine. Every channel
//! gets a reader task and a writer task; both report into one event queue
//! owned by the node loop.

use std::net::SocketAddr;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::ChannelId;
use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Message;

/// Outbound messages buffered per channel before sends start dropping
const OUTBOUND_QUEUE: usize = 64;

/// Transport events waiting for the node loop
const EVENT_QUEUE: usize = 256;

/// What the transport reports to the node loop
#[derive(Debug)]
pub enum TransportEvent {
    Opened {
        channel: ChannelId,
        outbound: mpsc::Sender<Message>,
        remote: SocketAddr,
    },
    Received {
        channel: ChannelId,
        message: Message,
    },
    Closed {
        channel: ChannelId,
        reason: Option<String>,
    },
}

/// Event queue shared by every channel
pub struct Transport {
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: mpsc::Receiver<TransportEvent>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        Self {
            events_tx,
            events_rx,
        }
    }

    /// Accept incoming channels on `port` (0 picks a free port)
    pub async fn listen(&self, port: u16) -> Result<Listener> {
        Listener::bind(SocketAddr::from(([0, 0, 0, 0], port)), self.events_tx.clone()).await
    }

    /// Open a channel to `addr`; connect failures are returned, not retried
    pub async fn connect(&self, addr: &str) -> Result<ChannelId> {
        connect(addr, self.events_tx.clone()).await
    }

    pub(crate) fn into_parts(self) -> (Connector, mpsc::Receiver<TransportEvent>) {
        (
            Connector {
                events_tx: self.events_tx,
            },
            self.events_rx,
        )
    }
}

/// Cloneable handle for opening outgoing channels
#[derive(Clone)]
pub struct Connector {
    events_tx: mpsc::Sender<TransportEvent>,
}

impl Connector {
    pub async fn connect(&self, addr: &str) -> Result<ChannelId> {
        connect(addr, self.events_tx.clone()).await
    }
}

/// Running accept loop
pub struct Listener {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl Listener {
    async fn bind(addr: SocketAddr, events_tx: mpsc::Sender<TransportEvent>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;
        info!(addr = %bound_addr, "Listening for peers");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(accept_loop(listener, events_tx, shutdown_rx));

        Ok(Self {
            addr: bound_addr,
            shutdown_tx,
        })
    }

    /// Get the bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting; open channels are unaffected
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(
    listener: TcpListener,
    events_tx: mpsc::Sender<TransportEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        if open_channel(stream, addr, events_tx.clone()).await.is_err() {
                            debug!("Node loop gone, stopping accept loop");
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

async fn connect(addr: &str, events_tx: mpsc::Sender<TransportEvent>) -> Result<ChannelId> {
    info!(addr = %addr, "Connecting to peer");
    let stream = TcpStream::connect(addr).await?;
    let remote = stream.peer_addr()?;
    open_channel(stream, remote, events_tx).await
}

/// Split the stream, spawn its tasks and announce the channel
async fn open_channel(
    stream: TcpStream,
    remote: SocketAddr,
    events_tx: mpsc::Sender<TransportEvent>,
) -> Result<ChannelId> {
    let _ = stream.set_nodelay(true);
    let channel = Uuid::new_v4();
    let (reader, writer) = stream.into_split();
    let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

    events_tx
        .send(TransportEvent::Opened {
            channel,
            outbound,
            remote,
        })
        .await
        .map_err(|_| Error::NotConnected)?;

    tokio::spawn(writer_task(channel, writer, outbound_rx));
    tokio::spawn(reader_task(channel, reader, events_tx));
    Ok(channel)
}

/// Writer task - drains the channel's outbound queue onto the socket
async fn writer_task(
    channel: ChannelId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        match write_frame(&mut writer, &msg).await {
            Ok(()) => {}
            // Nothing reached the socket; only this message is lost
            Err(Error::Protocol(reason)) => {
                warn!(%channel, kind = msg.kind(), %reason, "Dropping unsendable message");
            }
            Err(e) => {
                debug!(%channel, error = %e, "Write failed");
                break;
            }
        }
    }
}

/// Reader task - forwards frames until the peer goes away
async fn reader_task(
    channel: ChannelId,
    mut reader: OwnedReadHalf,
    events_tx: mpsc::Sender<TransportEvent>,
) {
    let reason = loop {
        match read_frame(&mut reader).await {
            Ok(message) => {
                if events_tx
                    .send(TransportEvent::Received { channel, message })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(Error::ConnectionClosed) => {
                debug!(%channel, "Connection closed");
                break None;
            }
            Err(e) => {
                warn!(%channel, error = %e, "Read error");
                break Some(e.to_string());
            }
        }
    };
    let _ = events_tx
        .send(TransportEvent::Closed { channel, reason })
        .await;
}
