//! Typed wrappers for the request/response commands.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use xapi_core::{Request, Result};

use crate::client::Client;

pub(crate) const CMD_LOGIN: &str = "login";
pub(crate) const CMD_LOGOUT: &str = "logout";
pub(crate) const CMD_PING: &str = "ping";
pub(crate) const CMD_GET_CURRENT_USER_DATA: &str = "getCurrentUserData";

/// Login credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Account number.
    pub user_id: String,
    /// Account password.
    pub password: String,
    /// Deprecated application id, kept for older accounts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Application name shown in the account's connection history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

impl Credentials {
    /// Creates credentials from an account number and password.
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            password: password.into(),
            app_id: None,
            app_name: None,
        }
    }

    /// Sets the application name.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

/// Successful login result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    /// Session handle required by streaming subscriptions.
    pub stream_session_id: String,
}

/// Account information returned by `getCurrentUserData`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UserData {
    /// Unit the account is assigned to.
    pub company_unit: i64,
    /// Account base currency.
    pub currency: String,
    /// Group the account belongs to.
    pub group: String,
    /// Whether this is an IB account.
    pub ib_account: bool,
    /// Account leverage.
    pub leverage: i64,
    /// Leverage multiplier applied to margin calculations.
    pub leverage_multiplier: f64,
    /// Spread type configured for the account.
    pub spread_type: Option<String>,
    /// Whether trailing stops are enabled.
    pub trailing_stop: bool,
}

/// Price mode of a quoted instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Quote {
    /// Fixed quotes
    Fixed,
    /// Floating quotes
    Float,
    /// Market depth quotes
    Depth,
    /// Cross rates
    Cross,
    /// A mode this crate does not know about
    Other(i64),
}

impl From<i64> for Quote {
    fn from(value: i64) -> Self {
        match value {
            1 => Self::Fixed,
            2 => Self::Float,
            3 => Self::Depth,
            4 => Self::Cross,
            other => Self::Other(other),
        }
    }
}

impl From<Quote> for i64 {
    fn from(quote: Quote) -> Self {
        match quote {
            Quote::Fixed => 1,
            Quote::Float => 2,
            Quote::Depth => 3,
            Quote::Cross => 4,
            Quote::Other(value) => value,
        }
    }
}

impl Client {
    /// Logs in and stores the stream session id for later subscriptions.
    ///
    /// Performed automatically by [`Client::connect`]; exposed for sessions
    /// built over [`Client::connect_to`] flows that defer it.
    pub async fn login(&self, credentials: Credentials) -> Result<LoginResponse> {
        let request = Request::new(CMD_LOGIN)
            .with_arguments(&credentials)?
            .with_random_tag();
        let response = self.rpc.call(request).await?;

        let stream_session_id = response.stream_session_id.unwrap_or_default();
        if stream_session_id.is_empty() {
            return Err(serde_json::Error::custom("login reply carried no streamSessionId").into());
        }
        *self.stream_session_id.write().await = Some(stream_session_id.clone());
        info!("logged in");
        Ok(LoginResponse { stream_session_id })
    }

    /// Ends the session on the server side.
    ///
    /// The connections stay open; call [`Client::close`] to unwind them.
    pub async fn logout(&self) -> Result<()> {
        self.call::<(), ()>(CMD_LOGOUT, None).await
    }

    /// No-op round trip, useful as a liveness probe.
    pub async fn ping(&self) -> Result<()> {
        self.call::<(), ()>(CMD_PING, None).await
    }

    /// Fetches information about the logged-in account.
    pub async fn get_current_user_data(&self) -> Result<UserData> {
        self.call::<(), UserData>(CMD_GET_CURRENT_USER_DATA, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credentials_serialize_to_wire_names() {
        let credentials = Credentials::new("10000", "secret");
        assert_eq!(
            serde_json::to_value(&credentials).unwrap(),
            json!({"userId": "10000", "password": "secret"})
        );

        let with_app = Credentials::new("10000", "secret").with_app_name("my-bot");
        assert_eq!(
            serde_json::to_value(&with_app).unwrap(),
            json!({"userId": "10000", "password": "secret", "appName": "my-bot"})
        );
    }

    #[test]
    fn user_data_decodes_from_wire_shape() {
        let data: UserData = serde_json::from_value(json!({
            "companyUnit": 8,
            "currency": "PLN",
            "group": "demoPLeurSTANDARD200",
            "ibAccount": false,
            "leverage": 1,
            "leverageMultiplier": 0.0033,
            "spreadType": "FLOAT",
            "trailingStop": false,
        }))
        .unwrap();
        assert_eq!(data.currency, "PLN");
        assert_eq!(data.company_unit, 8);
        assert_eq!(data.spread_type.as_deref(), Some("FLOAT"));
    }

    #[test]
    fn user_data_tolerates_missing_fields() {
        let data: UserData = serde_json::from_value(json!({"currency": "USD"})).unwrap();
        assert_eq!(data.currency, "USD");
        assert_eq!(data.leverage, 0);
        assert!(data.spread_type.is_none());
    }

    #[test]
    fn quote_round_trips_through_i64() {
        assert_eq!(Quote::from(1), Quote::Fixed);
        assert_eq!(Quote::from(4), Quote::Cross);
        assert_eq!(Quote::from(9), Quote::Other(9));
        assert_eq!(i64::from(Quote::Depth), 3);
        assert_eq!(i64::from(Quote::Other(9)), 9);

        let quote: Quote = serde_json::from_value(json!(2)).unwrap();
        assert_eq!(quote, Quote::Float);
        assert_eq!(serde_json::to_value(quote).unwrap(), json!(2));
    }
}
