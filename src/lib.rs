#![forbid(unsafe_code)]

//! Client for JSON-RPC app servers spoken over a child process's stdio.
//!
//! The [`rpc`] module frames, correlates and routes messages; [`client`]
//! performs the handshake and exposes one call per request method;
//! [`aggregator`] runs a turn or review to completion and returns everything
//! it produced.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod rpc;

pub use client::AppServerClient;
pub use config::ClientConfig;
pub use errors::{ClientError, Result};
