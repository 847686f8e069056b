//! Tunnel client channel.
//!
//! This module provides the channel abstraction that carries tunneled
//! requests: it allocates frame ids and matches each response to the call
//! that sent the request.

use futures::SinkExt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::dispatch::{Request, Response};
use crate::wire::{Frame, FrameCodec, Message};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Request/response channel to a remote daemon.
///
/// The channel handles frame id allocation and request/response matching.
/// It can be cloned so the four tunnel drivers share one connection.
#[derive(Clone)]
pub struct TunnelChannel {
    inner: Arc<Mutex<TunnelChannelInner>>,
}

struct TunnelChannelInner {
    writer: FramedWrite<BoxedWriter, FrameCodec>,
    reader: FramedRead<BoxedReader, FrameCodec>,
    next_id: u8,
}

impl TunnelChannel {
    /// Create a channel over any byte stream carrying the wire protocol.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            inner: Arc::new(Mutex::new(TunnelChannelInner {
                writer: FramedWrite::new(Box::new(writer), FrameCodec),
                reader: FramedRead::new(Box::new(reader), FrameCodec),
                next_id: 0,
            })),
        }
    }

    /// Send one request and wait for its response.
    pub async fn call(&self, request: Request) -> io::Result<Response> {
        // Acquire lock with timeout to prevent deadlocks
        let lock_timeout = Duration::from_secs(2);
        let mut inner = time::timeout(lock_timeout, self.inner.lock())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    "Tunnel channel lock timeout (possible deadlock)",
                )
            })?;

        // Assign frame ID
        let id = inner.next_id;
        inner.next_id = inner.next_id.wrapping_add(1);

        // Send the request with timeout
        let write_timeout = Duration::from_secs(1);
        time::timeout(write_timeout, inner.writer.send(Frame::request(id, request)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "Tunnel write timeout"))??;

        // Wait for the response with matching ID
        let read_timeout = Duration::from_secs(5);
        let response = time::timeout(read_timeout, async {
            match inner.reader.next().await {
                Some(Ok(frame)) => {
                    if frame.id != id {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("Response ID mismatch: expected {}, got {}", id, frame.id),
                        ));
                    }
                    match frame.message {
                        Message::Response { response, .. } => Ok(response),
                        Message::Request(_) => Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "Request frame received where response expected",
                        )),
                    }
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Tunnel stream closed",
                )),
            }
        })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "Tunnel read timeout"))??;

        Ok(response)
    }
}
