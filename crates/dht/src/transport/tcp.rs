//! TCP transport: one length-prefixed bincode frame per message.
//!
//! Frame layout: `u32` big-endian payload length, then the payload.

use super::Transport;
use crate::node::Node;
use crate::protocol::{Envelope, Request, Response};
use async_trait::async_trait;
use corelib::NodeAddr;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Largest frame accepted in either direction.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Client side: a fresh connection per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        TcpTransport
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, to: &NodeAddr, request: Envelope<Request>) -> io::Result<Envelope<Response>> {
        let mut stream = TcpStream::connect(to.as_str()).await?;
        stream.set_nodelay(true)?;
        write_frame(&mut stream, &request).await?;
        read_frame(&mut stream).await?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before response")
        })
    }
}

/// Serves `node` on `listener` until `cancel` fires.
pub async fn serve(listener: TcpListener, node: Arc<Node>, cancel: CancellationToken) -> io::Result<()> {
    info!(node = %node.info(), addr = ?listener.local_addr().ok(), "TCP server listening");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(node = %node.info(), "TCP server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let node = Arc::clone(&node);
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, node).await {
                                debug!(%peer, error = %e, "connection closed with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }
    }
}

async fn serve_connection(mut stream: TcpStream, node: Arc<Node>) -> io::Result<()> {
    stream.set_nodelay(true)?;
    while let Some(request) = read_frame::<_, Envelope<Request>>(&mut stream).await? {
        let response = node.handle(request).await;
        write_frame(&mut stream, &response).await?;
    }
    Ok(())
}

async fn write_frame<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds limit", payload.len()),
        ));
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await
}

/// Reads one frame; `None` on a clean end of stream before a frame starts.
async fn read_frame<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    bincode::deserialize(&payload)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
