//! Typed streaming subscriptions.
//!
//! Push frames carry no correlation tag; the engine routes them by their wire
//! `command` alone. Each subscribe function below therefore keys its registry
//! slot on the command string of the pushes it expects, and at most one
//! subscription per push type can be open at a time: a second subscribe for
//! the same type fails with `DuplicateSubscription` until the first one is
//! unsubscribed.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use xapi_core::{Result, StreamHandle, StreamRequest};

use crate::client::Client;
use crate::commands::Quote;

const CMD_GET_KEEP_ALIVE: &str = "getKeepAlive";
const CMD_STOP_KEEP_ALIVE: &str = "stopKeepAlive";
const CMD_GET_BALANCE: &str = "getBalance";
const CMD_STOP_BALANCE: &str = "stopBalance";
const CMD_GET_CANDLES: &str = "getCandles";
const CMD_STOP_CANDLES: &str = "stopCandles";
const CMD_GET_NEWS: &str = "getNews";
const CMD_STOP_NEWS: &str = "stopNews";
const CMD_GET_PROFITS: &str = "getProfits";
const CMD_STOP_PROFITS: &str = "stopProfits";
const CMD_GET_TICK_PRICES: &str = "getTickPrices";
const CMD_STOP_TICK_PRICES: &str = "stopTickPrices";
const CMD_GET_TRADES: &str = "getTrades";
const CMD_STOP_TRADES: &str = "stopTrades";
const CMD_GET_TRADE_STATUS: &str = "getTradeStatus";
const CMD_STOP_TRADE_STATUS: &str = "stopTradeStatus";

// Wire commands of the inbound push frames, used as stream keys.
const KEY_KEEP_ALIVE: &str = "keepAlive";
const KEY_BALANCE: &str = "balance";
const KEY_CANDLE: &str = "candle";
const KEY_NEWS: &str = "news";
const KEY_PROFIT: &str = "profit";
const KEY_TICK_PRICES: &str = "tickPrices";
const KEY_TRADE: &str = "trade";
const KEY_TRADE_STATUS: &str = "tradeStatus";

/// Keep-alive push confirming the streaming session is alive.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct KeepAliveTick {
    /// Server timestamp in milliseconds.
    pub timestamp: i64,
}

/// Account balance push.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BalanceUpdate {
    /// Balance in the account currency.
    pub balance: f64,
    /// Credit.
    pub credit: f64,
    /// Equity (balance + credit + floating profit).
    pub equity: f64,
    /// Margin requirements.
    pub margin: f64,
    /// Free margin.
    pub margin_free: f64,
    /// Margin level percentage.
    pub margin_level: f64,
}

/// Candle push for a subscribed symbol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleUpdate {
    /// Close price.
    pub close: f64,
    /// Candle start time in milliseconds.
    pub ctm: i64,
    /// Candle start time as a string.
    pub ctm_string: String,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Open price.
    pub open: f64,
    /// Price mode of the quote.
    pub quote_id: Quote,
    /// Symbol the candle belongs to.
    pub symbol: String,
    /// Volume.
    pub vol: f64,
}

/// News push.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct NewsUpdate {
    /// Message body.
    pub body: String,
    /// News item key.
    pub key: String,
    /// Publication time in milliseconds.
    pub time: i64,
    /// Title.
    pub title: String,
}

/// Profit push for an open position.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ProfitUpdate {
    /// Order number.
    pub order: i64,
    /// Transaction id.
    pub order2: i64,
    /// Position number.
    pub position: i64,
    /// Current profit.
    pub profit: f64,
}

/// Arguments of a tick-price subscription.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPricesRequest {
    /// Symbol to subscribe.
    pub symbol: String,
    /// Minimum milliseconds between consecutive ticks; 0 sends every tick.
    pub min_arrival_time: i64,
    /// Deepest quote level to deliver; 0 is top-of-book only.
    pub max_level: i64,
}

impl TickPricesRequest {
    /// Creates a top-of-book subscription for `symbol` with no throttling.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            min_arrival_time: 0,
            max_level: 0,
        }
    }
}

/// Tick price push.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPriceUpdate {
    /// Ask price.
    pub ask: f64,
    /// Ask volume; absent on some quote levels.
    #[serde(default)]
    pub ask_volume: Option<i64>,
    /// Bid price.
    pub bid: f64,
    /// Bid volume; absent on some quote levels.
    #[serde(default)]
    pub bid_volume: Option<i64>,
    /// Session high; absent below top-of-book.
    #[serde(default)]
    pub high: Option<f64>,
    /// Quote level this tick belongs to.
    pub level: i64,
    /// Session low; absent below top-of-book.
    #[serde(default)]
    pub low: Option<f64>,
    /// Price mode of the quote.
    pub quote_id: Quote,
    /// Raw spread.
    pub spread_raw: f64,
    /// Spread in the symbol's table units.
    pub spread_table: f64,
    /// Symbol the tick belongs to.
    pub symbol: String,
    /// Tick timestamp in milliseconds.
    pub timestamp: i64,
}

/// Trade push for an opened, modified or closed trade.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct TradeUpdate {
    /// Open price.
    #[serde(rename = "open_price")]
    pub open_price: f64,
    /// Open time in milliseconds.
    #[serde(rename = "open_time")]
    pub open_time: i64,
    /// Close price; meaningful only when `closed`.
    #[serde(rename = "close_price")]
    pub close_price: f64,
    /// Close time in milliseconds; absent while the trade is open.
    #[serde(rename = "close_time")]
    pub close_time: Option<i64>,
    /// Whether the trade is closed.
    pub closed: bool,
    /// Order number.
    pub order: i64,
    /// Transaction id.
    pub order2: i64,
    /// Operation code (buy, sell, pending variants).
    pub cmd: i64,
    /// Broker comment.
    pub comment: String,
    /// Commission charged.
    pub commission: f64,
    /// Client-assigned comment.
    #[serde(rename = "customComment")]
    pub custom_comment: Option<String>,
    /// Price digits of the symbol.
    pub digits: i64,
    /// Pending-order expiration in milliseconds.
    pub expiration: Option<i64>,
    /// Margin rate.
    #[serde(rename = "margin_rate")]
    pub margin_rate: f64,
    /// Trailing offset.
    pub offset: i64,
    /// Position number.
    pub position: i64,
    /// Current profit; absent on pending orders.
    pub profit: Option<f64>,
    /// Stop-loss price, zero when unset.
    pub sl: f64,
    /// Trade lifecycle state.
    pub state: String,
    /// Swap storage charged.
    pub storage: f64,
    /// Symbol.
    pub symbol: String,
    /// Take-profit price, zero when unset.
    pub tp: f64,
    /// Trade record type.
    #[serde(rename = "type")]
    pub trade_type: i64,
    /// Volume in lots.
    pub volume: f64,
}

/// Trade status push reporting the progress of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TradeStatusUpdate {
    /// Client-assigned comment.
    pub custom_comment: Option<String>,
    /// Broker message, if any.
    pub message: Option<String>,
    /// Order number the status refers to.
    pub order: i64,
    /// Execution price.
    pub price: f64,
    /// Request status code.
    pub request_status: i64,
}

impl Client {
    /// Composes a streaming command carrying the session id from login.
    async fn stream_request(&self, command: &str) -> StreamRequest {
        let session = self.stream_session_id.read().await.clone();
        let mut request = StreamRequest::new(command);
        if let Some(session) = session {
            request = request.with_session(session);
        }
        request
    }

    /// Subscribes to streaming-session keep-alive ticks.
    pub async fn subscribe_keep_alive(
        &self,
    ) -> Result<(UnboundedReceiver<KeepAliveTick>, StreamHandle)> {
        let start = self.stream_request(CMD_GET_KEEP_ALIVE).await;
        self.stream
            .open_stream(KEY_KEEP_ALIVE, start, StreamRequest::new(CMD_STOP_KEEP_ALIVE))
    }

    /// Subscribes to account balance updates.
    pub async fn subscribe_balance(
        &self,
    ) -> Result<(UnboundedReceiver<BalanceUpdate>, StreamHandle)> {
        let start = self.stream_request(CMD_GET_BALANCE).await;
        self.stream
            .open_stream(KEY_BALANCE, start, StreamRequest::new(CMD_STOP_BALANCE))
    }

    /// Subscribes to minute candles for `symbol`.
    ///
    /// Candle pushes of every symbol share one push type, so only one candle
    /// subscription can be open at a time.
    pub async fn subscribe_candles(
        &self,
        symbol: &str,
    ) -> Result<(UnboundedReceiver<CandleUpdate>, StreamHandle)> {
        let start = self
            .stream_request(CMD_GET_CANDLES)
            .await
            .with_extra(&serde_json::json!({ "symbol": symbol }))?;
        self.stream
            .open_stream(KEY_CANDLE, start, StreamRequest::new(CMD_STOP_CANDLES))
    }

    /// Subscribes to news.
    pub async fn subscribe_news(&self) -> Result<(UnboundedReceiver<NewsUpdate>, StreamHandle)> {
        let start = self.stream_request(CMD_GET_NEWS).await;
        self.stream
            .open_stream(KEY_NEWS, start, StreamRequest::new(CMD_STOP_NEWS))
    }

    /// Subscribes to profit updates for open positions.
    pub async fn subscribe_profits(
        &self,
    ) -> Result<(UnboundedReceiver<ProfitUpdate>, StreamHandle)> {
        let start = self.stream_request(CMD_GET_PROFITS).await;
        self.stream
            .open_stream(KEY_PROFIT, start, StreamRequest::new(CMD_STOP_PROFITS))
    }

    /// Subscribes to tick prices for the symbol in `request`.
    ///
    /// Tick pushes of every symbol share one push type, so only one tick
    /// subscription can be open at a time.
    pub async fn subscribe_tick_prices(
        &self,
        request: TickPricesRequest,
    ) -> Result<(UnboundedReceiver<TickPriceUpdate>, StreamHandle)> {
        let symbol = request.symbol.clone();
        let start = self
            .stream_request(CMD_GET_TICK_PRICES)
            .await
            .with_extra(&request)?;
        let stop = StreamRequest::new(CMD_STOP_TICK_PRICES)
            .with_extra(&serde_json::json!({ "symbol": symbol }))?;
        self.stream.open_stream(KEY_TICK_PRICES, start, stop)
    }

    /// Subscribes to trade updates.
    pub async fn subscribe_trades(
        &self,
    ) -> Result<(UnboundedReceiver<TradeUpdate>, StreamHandle)> {
        let start = self.stream_request(CMD_GET_TRADES).await;
        self.stream
            .open_stream(KEY_TRADE, start, StreamRequest::new(CMD_STOP_TRADES))
    }

    /// Subscribes to trade status updates for submitted transactions.
    pub async fn subscribe_trade_status(
        &self,
    ) -> Result<(UnboundedReceiver<TradeStatusUpdate>, StreamHandle)> {
        let start = self.stream_request(CMD_GET_TRADE_STATUS).await;
        self.stream.open_stream(
            KEY_TRADE_STATUS,
            start,
            StreamRequest::new(CMD_STOP_TRADE_STATUS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn balance_update_decodes_from_wire_shape() {
        let update: BalanceUpdate = serde_json::from_value(json!({
            "balance": 995800269.43,
            "credit": 1000.0,
            "equity": 995985397.56,
            "margin": 572634.43,
            "marginFree": 995227635.0,
            "marginLevel": 173930.41,
        }))
        .unwrap();
        assert_eq!(update.credit, 1000.0);
        assert_eq!(update.margin_free, 995227635.0);
    }

    #[test]
    fn candle_update_decodes_from_wire_shape() {
        let update: CandleUpdate = serde_json::from_value(json!({
            "close": 4.1849,
            "ctm": 1378369375000i64,
            "ctmString": "Sep 05, 2013 10:22:55 AM",
            "high": 4.1854,
            "low": 4.1848,
            "open": 4.1848,
            "quoteId": 2,
            "symbol": "EURUSD",
            "vol": 0.0,
        }))
        .unwrap();
        assert_eq!(update.symbol, "EURUSD");
        assert_eq!(update.quote_id, Quote::Float);
    }

    #[test]
    fn tick_price_update_tolerates_absent_volumes() {
        let update: TickPriceUpdate = serde_json::from_value(json!({
            "ask": 4000.0,
            "bid": 4000.0,
            "level": 1,
            "quoteId": 1,
            "spreadRaw": 0.000_003,
            "spreadTable": 0.000_03,
            "symbol": "KOMB.CZ",
            "timestamp": 1272529_161_605i64,
        }))
        .unwrap();
        assert_eq!(update.level, 1);
        assert!(update.ask_volume.is_none());
        assert!(update.high.is_none());
    }

    #[test]
    fn trade_update_decodes_mixed_name_styles() {
        let update: TradeUpdate = serde_json::from_value(json!({
            "open_price": 1.4,
            "open_time": 1272380927000i64,
            "close_price": 1.3,
            "close_time": null,
            "closed": false,
            "order": 7497776,
            "order2": 1234567,
            "cmd": 0,
            "comment": "Web Trader",
            "commission": 0.0,
            "customComment": "Some text",
            "digits": 4,
            "expiration": null,
            "margin_rate": 3.9149,
            "offset": 0,
            "position": 1234567,
            "profit": 68.392,
            "sl": 0.0,
            "state": "Modified",
            "storage": -4.46,
            "symbol": "EURUSD",
            "tp": 0.0,
            "type": 0,
            "volume": 0.10,
        }))
        .unwrap();
        assert_eq!(update.open_price, 1.4);
        assert!(!update.closed);
        assert_eq!(update.close_time, None);
        assert_eq!(update.trade_type, 0);
        assert_eq!(update.custom_comment.as_deref(), Some("Some text"));
    }

    #[test]
    fn trade_status_update_decodes_from_wire_shape() {
        let update: TradeStatusUpdate = serde_json::from_value(json!({
            "customComment": "Some text",
            "message": null,
            "order": 43,
            "price": 1.392,
            "requestStatus": 3,
        }))
        .unwrap();
        assert_eq!(update.order, 43);
        assert_eq!(update.request_status, 3);
        assert!(update.message.is_none());
    }

    #[test]
    fn tick_prices_request_serializes_to_wire_names() {
        let request = TickPricesRequest {
            symbol: "EURUSD".to_string(),
            min_arrival_time: 5000,
            max_level: 2,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"symbol": "EURUSD", "minArrivalTime": 5000, "maxLevel": 2})
        );
    }
}
