//! Core protocol engine for xAPI-style JSON-over-WebSocket trading APIs.
//!
//! The API exposes two logical channels, usually over two physical sockets: a
//! request/response channel, where every request carries a correlation tag
//! echoed back by the server, and a streaming channel, where subscription
//! pushes are identified only by their `command` string. This crate owns the
//! multiplexing problem those channels share:
//!
//! - one rate-limited write loop per socket, honoring the server's minimum
//!   inter-request interval ([`RateLimiter`]),
//! - a pending-call table matching replies to suspended callers by tag
//!   ([`PendingCallTable`]),
//! - a subscription registry fanning push frames out to typed subscriber
//!   channels ([`SubscriptionRegistry`]),
//! - a [`Connection`] tying a read and a write loop together and converting
//!   any transport failure into exactly one synthetic error per waiter.
//!
//! Command payloads are opaque [`serde_json::Value`]s here; the typed command
//! surface lives in the `xapi-client` crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use xapi_core::{Connection, ConnectionOptions, Request};
//!
//! # async fn example() -> xapi_core::Result<()> {
//! let connection = Connection::connect(
//!     "wss://ws.xtb.com/demo",
//!     ConnectionOptions::default(),
//! )
//! .await?;
//!
//! let response = connection.call(Request::new("ping")).await?;
//! assert!(response.status);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod message;
pub mod pending;
pub mod rate_limiter;
pub mod registry;
pub mod state;

pub use config::{
    ClientConfig, TradingMode, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST,
    DEFAULT_KEEP_ALIVE_INTERVAL, MIN_REQUEST_INTERVAL,
};
pub use connection::{Connection, ConnectionOptions, StreamHandle};
pub use error::{ApiError, Error, Result};
pub use logging::{init_logging, try_init_logging, LogConfig, LogFormat, LogLevel};
pub use message::{
    InboundFrame, Request, Response, StreamFrame, StreamRequest, TRANSPORT_CLOSED_CODE,
};
pub use pending::PendingCallTable;
pub use rate_limiter::RateLimiter;
pub use registry::SubscriptionRegistry;
pub use state::{ConnectionState, ConnectionStats, ConnectionStatsSnapshot};

// Re-export of the cancellation primitive used across the public API.
pub use tokio_util::sync::CancellationToken;
