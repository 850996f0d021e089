//! Protocol model module declarations.
//!
//! Wire payloads use camelCase field names. Response and item structs keep
//! unrecognised fields in a flattened `extra` map so nothing the server sends
//! is lost on a round trip.

pub mod command;
pub mod handshake;
pub mod item;
pub mod notification;
pub mod review;
pub mod thread;
pub mod turn;

pub use item::{ItemDetails, ThreadItem};
pub use notification::ServerNotification;
pub use turn::{Turn, TurnError, TurnStatus};
