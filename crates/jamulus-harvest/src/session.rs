// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport sessions.
//!
//! A [`Connector`] opens one [`Session`] per endpoint. Every session pushes
//! its decoded inbound messages into a queue shared by all sessions, so the
//! harvester reads a single interleaved stream. Outbound messages go through
//! a per-session writer task and never block the caller.

use crate::endpoint::{Endpoint, EndpointId};
use crate::protocol::{Frame, FrameError, InboundMessage, MessageType};
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Sending side of the shared inbound queue.
pub type InboundSender = mpsc::UnboundedSender<InboundMessage>;

/// Time granted to a writer task to flush pending frames on close.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Opens sessions to endpoints.
pub trait Connector {
    /// Establish a session to `endpoint` within `connect_timeout`.
    ///
    /// Messages received on the session must be tagged with `origin` and
    /// pushed into `inbound`.
    fn open(
        &self,
        endpoint: &Endpoint,
        origin: EndpointId,
        inbound: InboundSender,
        connect_timeout: Duration,
    ) -> impl Future<Output = Result<Session, ConnectError>> + Send;
}

/// An open session bound to exactly one endpoint.
///
/// Dropping the session aborts its tasks; [`Session::close`] lets queued
/// outbound messages drain first.
pub struct Session {
    endpoint: Endpoint,
    origin: EndpointId,
    outbound: Option<mpsc::UnboundedSender<MessageType>>,
    writer: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Create a session whose outbound messages are consumed by `writer`.
    pub fn new(
        endpoint: Endpoint,
        origin: EndpointId,
        outbound: mpsc::UnboundedSender<MessageType>,
        writer: JoinHandle<()>,
    ) -> Self {
        Self {
            endpoint,
            origin,
            outbound: Some(outbound),
            writer: Some(writer),
            tasks: Vec::new(),
        }
    }

    /// Attach a background task (typically the reader) owned by this session.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn origin(&self) -> EndpointId {
        self.origin
    }

    /// Queue a named message for sending. Fire-and-forget.
    ///
    /// Returns `false` if the session's writer has already stopped.
    pub fn send(&self, message: MessageType) -> bool {
        match &self.outbound {
            Some(tx) => match tx.send(message) {
                Ok(()) => true,
                Err(mpsc::error::SendError(message)) => {
                    debug!("Session {} closed, dropping {}", self.endpoint, message);
                    false
                }
            },
            None => false,
        }
    }

    /// Close the session, letting the writer flush what is already queued.
    pub async fn close(mut self) {
        self.outbound.take();
        if let Some(mut writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
                writer.abort();
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(writer) = &self.writer {
            writer.abort();
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Connects over TCP and exchanges length-prefixed JSON frames.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    local_port: u16,
    max_frame_size: usize,
}

impl TcpConnector {
    /// `local_port` 0 lets the OS pick an ephemeral port.
    pub fn new(local_port: u16, max_frame_size: usize) -> Self {
        Self {
            local_port,
            max_frame_size,
        }
    }

    fn socket_for(&self, remote: &SocketAddr) -> std::io::Result<TcpSocket> {
        let (socket, unspecified) = match remote {
            SocketAddr::V4(_) => (TcpSocket::new_v4()?, IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            SocketAddr::V6(_) => (TcpSocket::new_v6()?, IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
        };

        // Every session shares the configured local port.
        socket.set_reuseaddr(true)?;
        if self.local_port != 0 {
            socket.bind(SocketAddr::new(unspecified, self.local_port))?;
        }
        Ok(socket)
    }
}

impl Connector for TcpConnector {
    async fn open(
        &self,
        endpoint: &Endpoint,
        origin: EndpointId,
        inbound: InboundSender,
        connect_timeout: Duration,
    ) -> Result<Session, ConnectError> {
        let remote = endpoint.resolve().await.map_err(|e| ConnectError::Resolve {
            endpoint: endpoint.to_string(),
            source: e,
        })?;

        let socket = self.socket_for(&remote).map_err(|e| ConnectError::Io {
            endpoint: endpoint.to_string(),
            source: e,
        })?;

        let stream = match tokio::time::timeout(connect_timeout, socket.connect(remote)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ConnectError::Io {
                    endpoint: endpoint.to_string(),
                    source: e,
                })
            }
            Err(_) => {
                return Err(ConnectError::Timeout {
                    endpoint: endpoint.to_string(),
                    timeout: connect_timeout,
                })
            }
        };

        debug!("Connected to {} ({})", endpoint, remote);

        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(
            write_half,
            outbound_rx,
            endpoint.clone(),
            self.max_frame_size,
        ));
        let reader = tokio::spawn(read_loop(
            read_half,
            origin,
            endpoint.clone(),
            inbound,
            self.max_frame_size,
        ));

        Ok(Session::new(endpoint.clone(), origin, outbound_tx, writer).with_task(reader))
    }
}

async fn read_loop(
    mut stream: OwnedReadHalf,
    origin: EndpointId,
    endpoint: Endpoint,
    inbound: InboundSender,
    max_frame_size: usize,
) {
    let mut buffer = Vec::with_capacity(4096);

    loop {
        let frame = match read_frame(&mut stream, &mut buffer, max_frame_size).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Connection closed by {}", endpoint);
                break;
            }
            Err(e) if e.is_recoverable() => {
                warn!("Dropping malformed frame from {}: {}", endpoint, e);
                continue;
            }
            Err(e) => {
                warn!("Read error from {}: {}", endpoint, e);
                break;
            }
        };

        trace!(
            "<- {} {} count={:?} values={}",
            endpoint,
            frame.message,
            frame.count,
            DataDump(&frame.values)
        );

        match frame.into_inbound(origin) {
            Ok(msg) => {
                if inbound.send(msg).is_err() {
                    // Harvester is gone.
                    break;
                }
            }
            Err(e) => warn!("Dropping undecodable frame from {}: {}", endpoint, e),
        }
    }
}

/// Frame values as compact JSON, for `--log-data`.
struct DataDump<'a>(&'a [serde_json::Value]);

impl fmt::Display for DataDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", value)?;
        }
        f.write_str("]")
    }
}

async fn write_loop(
    mut stream: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<MessageType>,
    endpoint: Endpoint,
    max_frame_size: usize,
) {
    while let Some(message) = outbound.recv().await {
        trace!("-> {} {}", endpoint, message);
        if let Err(e) = write_frame(&mut stream, &Frame::named(message), max_frame_size).await {
            warn!("Failed to send to {}: {}", endpoint, e);
            break;
        }
    }

    let _ = stream.shutdown().await;
}

/// Read one frame.
///
/// Returns `Ok(None)` if the peer closed the connection on a frame boundary.
pub async fn read_frame<R>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    max_frame_size: usize,
) -> Result<Option<Frame>, FrameError>
where
    R: AsyncRead + Unpin,
{
    // Length prefix (4 bytes, big-endian)
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > max_frame_size {
        return Err(FrameError::TooLarge {
            len,
            max: max_frame_size,
        });
    }

    buffer.clear();
    buffer.resize(len, 0);
    reader.read_exact(buffer).await?;

    Ok(Some(serde_json::from_slice(buffer)?))
}

/// Write one frame and flush.
pub async fn write_frame<W>(
    writer: &mut W,
    frame: &Frame,
    max_frame_size: usize,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(frame)?;
    if json.len() > max_frame_size {
        return Err(FrameError::TooLarge {
            len: json.len(),
            max: max_frame_size,
        });
    }

    writer.write_all(&(json.len() as u32).to_be_bytes()).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

/// Session establishment errors.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot resolve {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("cannot connect to {endpoint}: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
}
