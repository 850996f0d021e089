//! Inbound read loop.
//!
//! Drains the peer's stdout through a [`FramedRead`] backed by [`RpcCodec`]
//! and routes each decoded message:
//!
//! | Shape          | Destination                                         |
//! |----------------|-----------------------------------------------------|
//! | Response       | pending registry, by numeric id                     |
//! | Notification   | [`NotificationRouter`](crate::rpc::router::NotificationRouter) |
//! | Request        | answered with `-32601` (no server role)             |
//! | framing error  | logged and published, stream continues              |
//!
//! End of stream or an I/O error fails the transport unless a shutdown is
//! already in progress.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::rpc::codec::RpcCodec;
use crate::rpc::message::{Message, Request, RequestId, Response, RpcErrorObject, METHOD_NOT_FOUND};
use crate::rpc::transport::Shared;
use crate::ClientError;

/// Reader task body; returns when the stream ends, breaks, or `cancel` fires.
pub(crate) async fn run_reader<R>(
    stdout: R,
    max_line_bytes: usize,
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, RpcCodec::with_max_line_bytes(max_line_bytes));

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("reader: EOF detected");
                        shared.stream_failed("peer closed its output stream");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "reader: IO error, stopping");
                        shared.stream_failed(&format!("stream error: {e}"));
                        break;
                    }
                    Some(Ok(Err(e))) => {
                        warn!(error = %e, "reader: framing error, skipping unit");
                        shared.framing_error(&e);
                    }
                    Some(Ok(Ok(message))) => route(&shared, &outbound, message),
                }
            }
        }
    }
}

fn route(shared: &Shared, outbound: &mpsc::Sender<Message>, message: Message) {
    match message {
        Message::Response(response) => route_response(shared, response),
        Message::Notification(notification) => {
            debug!(method = notification.method.as_str(), "reader: notification");
            shared.router().dispatch(&notification);
        }
        Message::Request(request) => reject_server_request(outbound, request),
    }
}

fn route_response(shared: &Shared, response: Response) {
    let RequestId::Integer(id) = response.id else {
        debug!(id = %response.id, "reader: response with non-numeric id ignored");
        return;
    };
    debug!(id, ok = response.outcome.is_ok(), "reader: response");
    shared
        .pending()
        .resolve(id, response.outcome.map_err(ClientError::from));
}

fn reject_server_request(outbound: &mpsc::Sender<Message>, request: Request) {
    warn!(
        id = %request.id,
        method = request.method.as_str(),
        "reader: server-initiated request is not supported, answering with method-not-found"
    );
    let reply = Message::Response(Response {
        id: request.id,
        outcome: Err(RpcErrorObject {
            code: METHOD_NOT_FOUND,
            message: format!("client does not handle {}", request.method),
            data: None,
        }),
    });
    if outbound.try_send(reply).is_err() {
        debug!("reader: outbound queue unavailable, reply dropped");
    }
}
