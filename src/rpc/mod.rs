//! JSON-RPC link to the app server.
//!
//! This module manages the bidirectional line-delimited JSON-RPC stream with
//! the app server process. A [`Transport`] owns a read task, a write task and
//! an exit monitor over the peer's stdio.
//!
//! Submodules:
//! - `message`: JSON-RPC message shapes and classification.
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing and
//!   the chunk-driven [`Framer`].
//! - `pending`: registry of requests awaiting a response.
//! - `router`: fan-out of inbound notifications to subscriptions.
//! - `reader` / `writer`: the background stream tasks.
//! - `lifecycle`: process termination handling.
//! - `spawner`: process launch with environment isolation and stdio capture.
//! - `transport`: the handle tying the above together.

pub mod codec;
pub mod lifecycle;
pub mod message;
pub mod pending;
mod reader;
pub mod router;
pub mod spawner;
pub mod transport;
mod writer;

pub use codec::{Frame, Framer, RpcCodec};
pub use lifecycle::{ExitReport, PeerProcess, ProcessFuture, TransportEvent};
pub use message::{Message, Notification, Request, RequestId, Response, RpcErrorObject};
pub use router::{NotificationRouter, Subscription};
pub use transport::{PeerIo, Transport, TransportOptions};
