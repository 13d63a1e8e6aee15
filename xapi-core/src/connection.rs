//! One physical socket: rate-limited write loop, demultiplexing read loop,
//! and the correlated-call / typed-subscription surfaces built on them.
//!
//! Every outbound frame funnels through one queue drained by a single write
//! task, which spaces writes by the configured interval. Inbound frames are
//! classified by payload shape and routed either to the pending-call table
//! (by correlation tag) or the subscription registry (by push command). Any
//! I/O failure tears the whole connection down: after both loops exit, a
//! supervisor task broadcasts a synthetic failure to every pending call and
//! closes every subscription channel, exactly once. There is no automatic
//! reconnection; a dead connection stays dead and reports itself as such.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::config::{DEFAULT_CONNECT_TIMEOUT, MIN_REQUEST_INTERVAL};
use crate::error::{Error, Result};
use crate::message::{InboundFrame, Request, Response, StreamFrame, StreamRequest};
use crate::pending::PendingCallTable;
use crate::rate_limiter::RateLimiter;
use crate::registry::SubscriptionRegistry;
use crate::state::{ConnectionState, ConnectionStats, ConnectionStatsSnapshot};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Options for establishing one connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Minimum spacing between outbound frames.
    pub request_interval: Duration,
    /// Socket dial timeout.
    pub connect_timeout: Duration,
    /// Parent cancellation token; the connection derives a child token, so
    /// cancelling the parent unwinds both loops.
    pub cancel_token: Option<CancellationToken>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            request_interval: MIN_REQUEST_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            cancel_token: None,
        }
    }
}

/// One entry in the outbound queue.
///
/// `tag` is the pending-call registration to fail if this frame never makes
/// it onto the wire; control and subscription frames carry none.
#[derive(Debug)]
struct Outbound {
    frame: Value,
    tag: Option<String>,
}

/// One WebSocket connection with its read/write loop pair.
#[derive(Debug)]
pub struct Connection {
    url: String,
    state: Arc<AtomicU8>,
    pending: Arc<PendingCallTable>,
    registry: Arc<SubscriptionRegistry>,
    stats: Arc<ConnectionStats>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl Connection {
    /// Dials `url` and starts the read/write loops.
    ///
    /// # Errors
    ///
    /// [`Error::Dial`] when the socket cannot be established,
    /// [`Error::Timeout`] when dialing exceeds the configured timeout.
    #[instrument(name = "connect", skip(options), fields(url = %url))]
    pub async fn connect(url: &str, options: ConnectionOptions) -> Result<Self> {
        let cancel = match options.cancel_token {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));

        let (socket, _response) =
            match tokio::time::timeout(options.connect_timeout, connect_async(url)).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    error!(error = %e, "dial failed");
                    return Err(Error::dial(format!("{url}: {e}")));
                }
                Err(_) => {
                    error!(timeout = ?options.connect_timeout, "dial timed out");
                    return Err(Error::timeout(format!("dialing {url} timed out")));
                }
            };
        info!("connection established");

        let (writer, reader) = socket.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingCallTable::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let stats = Arc::new(ConnectionStats::new());
        let limiter = RateLimiter::new(options.request_interval);

        stats.record_connected();
        state.store(ConnectionState::Connected.as_u8(), Ordering::Release);

        let write_handle = tokio::spawn(write_loop(
            writer,
            outbound_rx,
            limiter,
            Arc::clone(&pending),
            Arc::clone(&state),
            cancel.clone(),
            Arc::clone(&stats),
        ));
        let read_handle = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&registry),
            Arc::clone(&state),
            cancel.clone(),
            Arc::clone(&stats),
        ));

        // Supervisor: the sole failure-broadcast path. Runs after both loops
        // have exited, so every waiter observes termination exactly once.
        {
            let pending = Arc::clone(&pending);
            let registry = Arc::clone(&registry);
            let state = Arc::clone(&state);
            let url = url.to_string();
            tokio::spawn(async move {
                let _ = tokio::join!(write_handle, read_handle);
                pending.fail_all("connection closed");
                registry.close_all();
                state.store(ConnectionState::Closed.as_u8(), Ordering::Release);
                info!(url = %url, "connection closed");
            });
        }

        Ok(Self {
            url: url.to_string(),
            state,
            pending,
            registry,
            stats,
            outbound_tx,
            cancel,
        })
    }

    /// Performs one correlated call: registers the tag, enqueues the request
    /// and suspends until the matching reply (or a synthetic failure) arrives.
    ///
    /// A missing correlation tag is filled in with a generated one.
    ///
    /// # Errors
    ///
    /// [`Error::Api`] when the server rejects the command,
    /// [`Error::TransportClosed`] when the connection dies first,
    /// [`Error::DuplicateTag`] when the tag is already in flight.
    #[instrument(name = "call", skip(self, request), fields(command = %request.command))]
    pub async fn call(&self, mut request: Request) -> Result<Response> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::transport_closed("connection is not open"));
        }
        if request.tag_is_empty() {
            request.custom_tag = Some(Uuid::new_v4().to_string());
        }
        let tag = request.custom_tag.clone().unwrap_or_default();

        let receiver = self.pending.register(&tag)?;
        let frame = serde_json::to_value(&request)?;
        if self
            .outbound_tx
            .send(Outbound {
                frame,
                tag: Some(tag.clone()),
            })
            .is_err()
        {
            self.pending.discard(&tag);
            return Err(Error::transport_closed("connection closed"));
        }
        debug!(tag = %tag, "call enqueued");

        match receiver.await {
            Ok(response) => response.into_result(),
            Err(_) => Err(Error::transport_closed("reply channel dropped")),
        }
    }

    /// Opens a typed subscription.
    ///
    /// Registers `key` in the subscription registry, enqueues the start
    /// command and spawns a forwarding task that decodes each push frame's
    /// `data` into `T`. A frame that fails to decode is logged and dropped;
    /// the subscription stays alive. The typed channel closes exactly when
    /// the subscription is closed, by [`StreamHandle::unsubscribe`] or by
    /// connection teardown.
    ///
    /// `key` must equal the `command` string of the pushes this subscription
    /// expects; the wire carries no other routing information, so at most one
    /// subscription per push-command type can be open.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateSubscription`] when `key` is already open,
    /// [`Error::TransportClosed`] when the connection is gone.
    pub fn open_stream<T>(
        &self,
        key: &str,
        start: StreamRequest,
        stop: StreamRequest,
    ) -> Result<(mpsc::UnboundedReceiver<T>, StreamHandle)>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if self.state() != ConnectionState::Connected {
            return Err(Error::transport_closed("connection is not open"));
        }
        let start_command = start.command.clone();
        let start_frame = serde_json::to_value(&start)?;
        let stop_frame = serde_json::to_value(&stop)?;

        let raw_receiver = self.registry.open(key)?;
        if self
            .outbound_tx
            .send(Outbound {
                frame: start_frame,
                tag: None,
            })
            .is_err()
        {
            self.registry.close(key);
            return Err(Error::transport_closed("connection closed"));
        }
        info!(key = %key, command = %start_command, "subscription opened");

        let (typed_tx, typed_rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_stream::<T>(key.to_string(), raw_receiver, typed_tx));

        let handle = StreamHandle {
            key: key.to_string(),
            stop_frame,
            outbound_tx: self.outbound_tx.clone(),
            registry: Arc::clone(&self.registry),
            closed: AtomicBool::new(false),
        };
        Ok((typed_rx, handle))
    }

    /// Enqueues a fire-and-forget control frame (keep-alive ping, etc.).
    ///
    /// # Errors
    ///
    /// [`Error::TransportClosed`] when the connection is gone.
    pub fn send_control(&self, request: StreamRequest) -> Result<()> {
        let frame = serde_json::to_value(&request)?;
        self.outbound_tx
            .send(Outbound { frame, tag: None })
            .map_err(|_| Error::transport_closed("connection closed"))
    }

    /// Requests a local close; both loops unwind and every waiter is failed.
    pub fn close(&self) {
        info!(url = %self.url, "local close requested");
        begin_close(&self.state, &self.cancel);
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` while both loops are running.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> ConnectionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Number of open subscriptions.
    pub fn open_subscriptions(&self) -> usize {
        self.registry.len()
    }

    /// The URL this connection was dialed with.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Unsubscribe handle for one open subscription.
#[derive(Debug)]
pub struct StreamHandle {
    key: String,
    stop_frame: Value,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    registry: Arc<SubscriptionRegistry>,
    closed: AtomicBool,
}

impl StreamHandle {
    /// The stream key this handle controls.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Enqueues the stop command and closes the registry entry.
    ///
    /// The stop command races with in-flight pushes; a push arriving after
    /// the entry is closed is dropped by the registry. Calling this a second
    /// time is a no-op.
    pub fn unsubscribe(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self
            .outbound_tx
            .send(Outbound {
                frame: self.stop_frame.clone(),
                tag: None,
            })
            .is_err()
        {
            debug!(key = %self.key, "stop command skipped, connection already closed");
        }
        self.registry.close(&self.key);
        info!(key = %self.key, "subscription closed");
    }
}

/// Marks the connection as closing (unless already terminal) and cancels both
/// loops.
fn begin_close(state: &AtomicU8, cancel: &CancellationToken) {
    let current = ConnectionState::from_u8(state.load(Ordering::Acquire));
    if !current.is_terminal() {
        state.store(ConnectionState::Closing.as_u8(), Ordering::Release);
    }
    cancel.cancel();
}

/// Fails the pending-call registration of a frame that never reached the
/// wire, if it had one.
fn fail_outbound(pending: &PendingCallTable, outbound: &Outbound, description: &str) {
    if let Some(tag) = &outbound.tag {
        pending.resolve(tag, Response::synthetic_failure(tag.clone(), description));
    }
}

/// Single writer per socket: drains the outbound queue, paces every frame
/// through the rate limiter and writes it. A write failure fails that frame's
/// own pending entry and tears the whole connection down.
async fn write_loop(
    mut writer: WsWriter,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    limiter: RateLimiter,
    pending: Arc<PendingCallTable>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    stats: Arc<ConnectionStats>,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = outbound_rx.recv() => {
                let Some(outbound) = next else { break };
                limiter.acquire().await;
                let text = match serde_json::to_string(&outbound.frame) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(error = %e, "outbound frame serialization failed");
                        fail_outbound(&pending, &outbound, &format!("serialization failed: {e}"));
                        break;
                    }
                };
                let frame_len = text.len() as u64;
                if let Err(e) = writer.send(Message::Text(text.into())).await {
                    error!(error = %e, "socket write failed");
                    fail_outbound(&pending, &outbound, &format!("write failed: {e}"));
                    break;
                }
                stats.record_sent(frame_len);
            }
        }
    }
    begin_close(&state, &cancel);

    // Fail whatever is still queued so no caller waits forever.
    outbound_rx.close();
    while let Ok(outbound) = outbound_rx.try_recv() {
        fail_outbound(&pending, &outbound, "connection closing");
    }
    let _ = writer.send(Message::Close(None)).await;
}

/// Single reader per socket: classifies each inbound frame and routes it to
/// the pending-call table or the subscription registry. Exits on read error,
/// server close or an unclassifiable frame; exit triggers full teardown.
async fn read_loop(
    mut reader: WsReader,
    pending: Arc<PendingCallTable>,
    registry: Arc<SubscriptionRegistry>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    stats: Arc<ConnectionStats>,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = reader.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    stats.record_received(text.len() as u64);
                    if !dispatch_frame(&text, &pending, &registry) {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    stats.record_received(data.len() as u64);
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            if !dispatch_frame(&text, &pending, &registry) {
                                break;
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "non-UTF-8 frame received");
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "socket read failed");
                    break;
                }
                None => {
                    warn!("socket stream ended");
                    break;
                }
            }
        }
    }
    begin_close(&state, &cancel);
}

/// Routes one classified frame. Returns `false` when the frame could not be
/// classified, which terminates the read loop.
fn dispatch_frame(text: &str, pending: &PendingCallTable, registry: &SubscriptionRegistry) -> bool {
    match InboundFrame::classify(text) {
        Ok(InboundFrame::Reply(response)) => {
            let tag = response.custom_tag.clone().unwrap_or_default();
            if !pending.resolve(&tag, response) {
                debug!(tag = %tag, "reply for unknown correlation tag dropped");
            }
            true
        }
        Ok(InboundFrame::Push(frame)) => {
            let key = frame.command.clone();
            if !registry.route(&key, frame) {
                trace!(key = %key, "push frame for closed stream key dropped");
            }
            true
        }
        Err(e) => {
            error!(error = %e, "inbound frame could not be classified");
            false
        }
    }
}

/// Decodes raw push frames into `T` and forwards them until the raw channel
/// closes. A frame that fails to decode is dropped; the loop keeps going.
async fn forward_stream<T: DeserializeOwned>(
    key: String,
    mut raw_receiver: mpsc::UnboundedReceiver<StreamFrame>,
    typed_tx: mpsc::UnboundedSender<T>,
) {
    while let Some(frame) = raw_receiver.recv().await {
        let Some(data) = frame.data else {
            if let Some(code) = frame.error_code {
                warn!(
                    key = %key,
                    code = %code,
                    descr = frame.error_descr.as_deref().unwrap_or(""),
                    "server stream error frame"
                );
            }
            continue;
        };
        match serde_json::from_value::<T>(data) {
            Ok(update) => {
                if typed_tx.send(update).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "push payload decode failed, frame dropped");
            }
        }
    }
    // Dropping typed_tx closes the subscriber's channel.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = ConnectionOptions::default();
        assert_eq!(options.request_interval, MIN_REQUEST_INTERVAL);
        assert_eq!(options.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(options.cancel_token.is_none());
    }

    #[tokio::test]
    async fn forward_stream_decodes_and_skips_bad_frames() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Tick {
            n: i64,
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (typed_tx, mut typed_rx) = mpsc::unbounded_channel::<Tick>();
        let task = tokio::spawn(forward_stream::<Tick>("tick".to_string(), raw_rx, typed_tx));

        let good = |n: i64| crate::message::StreamFrame {
            command: "tick".to_string(),
            data: Some(serde_json::json!({"n": n})),
            error_code: None,
            error_descr: None,
        };
        let bad = crate::message::StreamFrame {
            command: "tick".to_string(),
            data: Some(serde_json::json!({"n": "not a number"})),
            error_code: None,
            error_descr: None,
        };

        raw_tx.send(good(1)).unwrap();
        raw_tx.send(bad).unwrap();
        raw_tx.send(good(2)).unwrap();
        drop(raw_tx);

        assert_eq!(typed_rx.recv().await, Some(Tick { n: 1 }));
        assert_eq!(typed_rx.recv().await, Some(Tick { n: 2 }));
        assert_eq!(typed_rx.recv().await, None);
        task.await.unwrap();
    }
}
