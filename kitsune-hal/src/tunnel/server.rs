//! Tunnel server: one connection's decode-dispatch-respond loop.

use futures::SinkExt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::tracing::prelude::*;
use crate::wire::{Frame, FrameCodec, Message};

/// Drive one guest connection until it closes, errors, or the daemon shuts
/// down.
///
/// The dispatcher is shared across connections behind an async mutex; calls
/// are serialized around it, which also upholds the per-handle serialization
/// the contract requires of the runtime.
pub async fn serve<S>(
    stream: S,
    dispatcher: Arc<Mutex<Dispatcher>>,
    running: CancellationToken,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = FramedRead::new(reader, FrameCodec);
    let mut writer = FramedWrite::new(writer, FrameCodec);

    trace!("Connection task started.");
    loop {
        tokio::select! {
            _ = running.cancelled() => break,
            frame = reader.next() => {
                let frame = match frame {
                    None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "Dropping connection on decode error.");
                        return Err(e);
                    }
                    Some(Ok(frame)) => frame,
                };

                let Message::Request(request) = frame.message else {
                    warn!(id = frame.id, "Ignoring response frame from guest.");
                    continue;
                };

                let class = request.class();
                let verb = request.verb();
                let response = dispatcher.lock().await.execute(request).await;
                writer.send(Frame::response(frame.id, class, verb, response)).await?;
            }
        }
    }
    trace!("Connection task stopped.");

    Ok(())
}
