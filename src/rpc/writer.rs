//! Outbound write loop.
//!
//! Receives [`Message`]s from a tokio [`mpsc`] channel, frames each one with
//! [`RpcCodec`] and writes it to the peer's stdin. The task owns stdin, so
//! ending the task closes the pipe.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::rpc::codec::RpcCodec;
use crate::rpc::message::Message;
use crate::rpc::transport::Shared;
use crate::{ClientError, Result};

/// Writer task body.
///
/// Exits cleanly when `cancel` fires or every sender is dropped, shutting
/// stdin down on the way out.
///
/// # Errors
///
/// Returns [`ClientError::TransportFailed`]`("write failed: …")` when the
/// write to stdin fails; the transport is failed before returning.
pub(crate) async fn run_writer<W>(
    mut stdin: W,
    mut msg_rx: mpsc::Receiver<Message>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut codec = RpcCodec::new();
    let mut buf = BytesMut::new();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(message) = msg else {
                    debug!("writer: message channel closed, stopping");
                    break;
                };

                buf.clear();
                if let Err(e) = codec.encode(&message, &mut buf) {
                    warn!(error = %e, method = message.method(), "writer: failed to encode message, dropping");
                    continue;
                }

                if let Err(e) = write_frame(&mut stdin, &buf).await {
                    warn!(error = %e, "writer: write to stdin failed");
                    let reason = format!("write failed: {e}");
                    shared.stream_failed(&reason);
                    return Err(ClientError::TransportFailed(reason));
                }
            }
        }
    }

    if let Err(e) = stdin.shutdown().await {
        debug!(error = %e, "writer: stdin already closed");
    }
    Ok(())
}

async fn write_frame<W>(stdin: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stdin.write_all(frame).await?;
    stdin.flush().await
}
