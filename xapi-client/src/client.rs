//! The client facade: two connections, the dial sequence and keep-alive.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use xapi_core::{
    ClientConfig, Connection, ConnectionOptions, ConnectionState, Error, Request, Response,
    Result, StreamRequest,
};

use crate::commands::{Credentials, CMD_PING};

/// One logged-in API session over a request/response connection and a
/// streaming connection.
///
/// Construct with [`Client::connect`]; it dials both sockets, logs in and
/// starts the keep-alive loop. A broken connection is terminal: calls fail
/// with [`Error::TransportClosed`] and subscription channels close; build a
/// fresh client to reconnect.
#[derive(Debug)]
pub struct Client {
    pub(crate) rpc: Arc<Connection>,
    pub(crate) stream: Arc<Connection>,
    pub(crate) config: ClientConfig,
    pub(crate) stream_session_id: RwLock<Option<String>>,
    keep_alive: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Client {
    /// Dials the endpoints derived from `config`, logs in and starts the
    /// keep-alive loop.
    ///
    /// # Errors
    ///
    /// [`Error::Dial`]/[`Error::Timeout`] when a socket cannot be
    /// established, [`Error::Api`] when the server rejects the login.
    pub async fn connect(config: ClientConfig, credentials: Credentials) -> Result<Self> {
        let rpc_url = config.rpc_url();
        let stream_url = config.stream_url();
        Self::connect_to(&rpc_url, &stream_url, config, credentials).await
    }

    /// Same as [`Client::connect`] against explicit endpoint URLs.
    #[instrument(name = "client_connect", skip(config, credentials), fields(rpc = %rpc_url, stream = %stream_url))]
    pub async fn connect_to(
        rpc_url: &str,
        stream_url: &str,
        config: ClientConfig,
        credentials: Credentials,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let options = ConnectionOptions {
            request_interval: config.request_interval,
            connect_timeout: config.connect_timeout,
            cancel_token: Some(cancel.clone()),
        };

        let rpc = Arc::new(Connection::connect(rpc_url, options.clone()).await?);
        let stream = match Connection::connect(stream_url, options).await {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        };

        let client = Self {
            rpc,
            stream,
            config,
            stream_session_id: RwLock::new(None),
            keep_alive: Mutex::new(None),
            cancel,
        };

        if let Err(e) = client.login(credentials).await {
            client.cancel.cancel();
            return Err(e);
        }
        client.start_keep_alive().await;
        Ok(client)
    }

    /// Performs a correlated call and decodes its `returnData` into `T`.
    ///
    /// Commands without a result payload decode into `()`.
    ///
    /// # Errors
    ///
    /// [`Error::Api`] on server rejection, [`Error::TransportClosed`] when
    /// the connection died, [`Error::Decode`] when `returnData` does not
    /// match `T`.
    pub async fn call<A, T>(&self, command: &str, arguments: Option<&A>) -> Result<T>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        let mut request = Request::new(command).with_random_tag();
        if let Some(arguments) = arguments {
            request = request.with_arguments(arguments)?;
        }
        let response = self.rpc.call(request).await?;
        let data = response.return_data.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(Error::from)
    }

    /// Performs a correlated call and returns the raw reply.
    pub async fn call_raw(&self, request: Request) -> Result<Response> {
        self.rpc.call(request).await
    }

    /// Cancels the keep-alive loop and unwinds both connections.
    pub async fn close(&self) {
        info!("closing client");
        self.cancel.cancel();
        if let Some(handle) = self.keep_alive.lock().await.take() {
            let _ = handle.await;
        }
        self.rpc.close();
        self.stream.close();
    }

    /// Session handle issued by the login reply; `None` before login.
    pub async fn stream_session_id(&self) -> Option<String> {
        self.stream_session_id.read().await.clone()
    }

    /// State of the request/response connection.
    pub fn rpc_state(&self) -> ConnectionState {
        self.rpc.state()
    }

    /// State of the streaming connection.
    pub fn stream_state(&self) -> ConnectionState {
        self.stream.state()
    }

    /// The request/response connection.
    pub fn rpc_connection(&self) -> &Connection {
        &self.rpc
    }

    /// The streaming connection.
    pub fn stream_connection(&self) -> &Connection {
        &self.stream
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts the periodic keep-alive task: one correlated `ping` on the
    /// request/response connection and one fire-and-forget `ping` frame on
    /// the streaming connection per period. The task stops on cancellation
    /// or as soon as either connection reports the transport gone.
    async fn start_keep_alive(&self) {
        let period = self.config.keep_alive_interval;
        if period.is_zero() {
            return;
        }

        let rpc = Arc::clone(&self.rpc);
        let stream = Arc::clone(&self.stream);
        let session = self.stream_session_id.read().await.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match rpc.call(Request::new(CMD_PING)).await {
                            Ok(_) => {}
                            Err(e) if e.is_transport_closed() => {
                                warn!(error = %e, "keep-alive stopped, transport closed");
                                break;
                            }
                            Err(e) => warn!(error = %e, "keep-alive ping rejected"),
                        }

                        let mut ping = StreamRequest::new(CMD_PING);
                        if let Some(session) = &session {
                            ping = ping.with_session(session.clone());
                        }
                        if stream.send_control(ping).is_err() {
                            warn!("keep-alive stopped, streaming socket closed");
                            break;
                        }
                    }
                }
            }
            debug!("keep-alive loop exited");
        });
        *self.keep_alive.lock().await = Some(handle);
    }
}
