//! Typed client for xAPI-style JSON-over-WebSocket trading APIs.
//!
//! Builds the user-facing surface on top of the `xapi-core` protocol engine:
//! a [`Client`] owning the request/response and streaming connections, typed
//! wrappers for the RPC commands (login, account data, ping, logout) and one
//! subscribe function per streaming data type (balance, candles, ticks,
//! trades, news, profits, trade status, keep-alive).
//!
//! # Example
//!
//! ```rust,no_run
//! use xapi_client::{Client, ClientConfig, Credentials, TradingMode};
//!
//! # async fn example() -> xapi_client::Result<()> {
//! let client = Client::connect(
//!     ClientConfig::new(TradingMode::Demo),
//!     Credentials::new("10000", "secret"),
//! )
//! .await?;
//!
//! let account = client.get_current_user_data().await?;
//! println!("trading in {}", account.currency);
//!
//! let (mut candles, subscription) = client.subscribe_candles("EURUSD").await?;
//! while let Some(candle) = candles.recv().await {
//!     println!("{}: close {}", candle.symbol, candle.close);
//! }
//! subscription.unsubscribe();
//! client.close().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod commands;
pub mod stream;

pub use client::Client;
pub use commands::{Credentials, LoginResponse, Quote, UserData};
pub use stream::{
    BalanceUpdate, CandleUpdate, KeepAliveTick, NewsUpdate, ProfitUpdate, TickPriceUpdate,
    TickPricesRequest, TradeStatusUpdate, TradeUpdate,
};

// The engine types that surface through this crate's API.
pub use xapi_core::{
    logging, ApiError, ClientConfig, ConnectionState, Error, Request, Response, Result,
    StreamHandle, StreamRequest, TradingMode,
};

/// Convenience imports for applications.
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::commands::{Credentials, LoginResponse, Quote, UserData};
    pub use crate::stream::{
        BalanceUpdate, CandleUpdate, KeepAliveTick, NewsUpdate, ProfitUpdate, TickPriceUpdate,
        TickPricesRequest, TradeStatusUpdate, TradeUpdate,
    };
    pub use xapi_core::{
        ApiError, ClientConfig, ConnectionState, Error, Result, StreamHandle, TradingMode,
    };
}
