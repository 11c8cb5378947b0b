//! The live protocol client: one WebSocket connection at a time, a reader task
//! per connection, and a broadcast channel of [`LiveEvent`]s.

use crate::{
    error::{LiveError, Result},
    events::{ConnectionId, ConnectionState, LiveEvent},
    turn::TurnAccumulator,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use gemini_realtime_types::{
    ClientContent, ClientMessage, Content, MediaChunk, Part, RealtimeInput, SessionConfig,
    ToolResponse, decode, encode,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{
    Arc, Mutex as StdMutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::{
    net::TcpStream,
    sync::{Mutex, broadcast},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, info, warn};

/// Gemini Live `BidiGenerateContent` endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

const EVENT_CAPACITY: usize = 256;
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(3);
const ERROR_PRELUDE: &str = "ERROR]";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

struct Connection {
    id: ConnectionId,
    sink: Arc<Mutex<WsSink>>,
    reader: JoinHandle<()>,
}

struct Slot {
    current: Option<Connection>,
    state: ConnectionState,
}

/// A client for the live streaming protocol.
///
/// Holds at most one transport connection. Inbound frames are decoded and
/// processed in arrival order by a single reader task per connection; the
/// resulting events fan out to every [`LiveClient::subscribe`] receiver.
pub struct LiveClient {
    endpoint: String,
    api_key: StdMutex<Option<SecretString>>,
    slot: Arc<Mutex<Slot>>,
    connect_lock: Mutex<()>,
    events: broadcast::Sender<LiveEvent>,
    next_id: AtomicU64,
    close_timeout: Duration,
}

impl LiveClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            endpoint: endpoint.into(),
            api_key: StdMutex::new(None),
            slot: Arc::new(Mutex::new(Slot {
                current: None,
                state: ConnectionState::Idle,
            })),
            connect_lock: Mutex::new(()),
            events,
            next_id: AtomicU64::new(0),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn with_api_key(self, api_key: SecretString) -> Self {
        self.set_api_key(Some(api_key));
        self
    }

    /// How long a close waits for the peer to finish the close handshake
    /// before the reader is aborted.
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Replaces the credential used for the next connection.
    pub fn set_api_key(&self, api_key: Option<SecretString>) {
        *self.api_key.lock().unwrap_or_else(|e| e.into_inner()) = api_key;
    }

    /// Registers a new event subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        self.slot.lock().await.state
    }

    pub async fn current_connection(&self) -> Option<ConnectionId> {
        self.slot.lock().await.current.as_ref().map(|c| c.id)
    }

    /// Opens a connection and sends `setup` carrying `config`.
    ///
    /// Any existing connection is closed first, and this waits until its reader
    /// has finished. Returns once the transport is open and `setup` has been
    /// written; it does not wait for `setupComplete`. A failed handshake leaves
    /// the client idle and emits no `Close` event.
    pub async fn connect(&self, config: SessionConfig) -> Result<ConnectionId> {
        let _serialized = self.connect_lock.lock().await;

        let previous = {
            let mut slot = self.slot.lock().await;
            let previous = slot.current.take();
            if previous.is_some() {
                slot.state = ConnectionState::Closing;
            }
            previous
        };
        if let Some(previous) = previous {
            self.close_connection(previous).await;
        }

        self.slot.lock().await.state = ConnectionState::Connecting;
        let (id, sink, source) = match self.open(config).await {
            Ok(opened) => opened,
            Err(e) => {
                self.slot.lock().await.state = ConnectionState::Idle;
                warn!(error = %e, "Live connection failed");
                return Err(e);
            }
        };

        // The reader is spawned under the slot lock so that a connection which
        // closes immediately cannot release itself before it is stored.
        let mut slot = self.slot.lock().await;
        let reader = tokio::spawn(read_frames(
            id,
            source,
            self.slot.clone(),
            self.events.clone(),
        ));
        slot.current = Some(Connection {
            id,
            sink: Arc::new(Mutex::new(sink)),
            reader,
        });
        slot.state = ConnectionState::Open;
        let _ = self.events.send(LiveEvent::Open { connection: id });
        Ok(id)
    }

    async fn open(&self, config: SessionConfig) -> Result<(ConnectionId, WsSink, WsSource)> {
        let url = self.request_url()?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| LiveError::Connection(e.to_string()))?;

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        info!(connection = %id, model = %config.model, "Connected to live endpoint");
        let (mut sink, source) = ws_stream.split();

        debug!(connection = %id, tools = config.declaration_count(), "Sending setup");
        let setup = encode(&ClientMessage::Setup(config))?;
        sink.send(Message::Text(setup.into()))
            .await
            .map_err(|e| LiveError::Connection(format!("failed to send setup: {e}")))?;

        Ok((id, sink, source))
    }

    fn request_url(&self) -> Result<String> {
        let mut url = url::Url::parse(&self.endpoint)?;
        if let Some(key) = self
            .api_key
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            url.query_pairs_mut().append_pair("key", key.expose_secret());
        }
        Ok(url.into())
    }

    /// Closes the current connection, if any. Returns whether a close happened.
    pub async fn disconnect(&self) -> bool {
        let _serialized = self.connect_lock.lock().await;
        let connection = {
            let mut slot = self.slot.lock().await;
            let connection = slot.current.take();
            if connection.is_some() {
                slot.state = ConnectionState::Closing;
            }
            connection
        };
        self.finish_close(connection).await
    }

    /// Closes the connection identified by `id` only if it is still the current
    /// one. A stale handle never closes a newer connection.
    pub async fn disconnect_connection(&self, id: ConnectionId) -> bool {
        let _serialized = self.connect_lock.lock().await;
        let connection = {
            let mut slot = self.slot.lock().await;
            if slot.current.as_ref().is_some_and(|c| c.id == id) {
                slot.state = ConnectionState::Closing;
                slot.current.take()
            } else {
                debug!(connection = %id, "Ignoring disconnect for a superseded connection");
                None
            }
        };
        self.finish_close(connection).await
    }

    async fn finish_close(&self, connection: Option<Connection>) -> bool {
        let Some(connection) = connection else {
            return false;
        };
        self.close_connection(connection).await;
        let mut slot = self.slot.lock().await;
        if slot.current.is_none() {
            slot.state = ConnectionState::Idle;
        }
        true
    }

    /// Sends a close frame and waits for the reader to observe the end of the
    /// stream, which is the acknowledgement that the transport is released.
    async fn close_connection(&self, connection: Connection) {
        let Connection {
            id,
            sink,
            mut reader,
        } = connection;
        debug!(connection = %id, "Closing connection");
        if let Err(e) = sink.lock().await.send(Message::Close(None)).await {
            debug!(connection = %id, error = %e, "Close frame not sent");
        }
        if timeout(self.close_timeout, &mut reader).await.is_err() {
            warn!(connection = %id, "Close was not acknowledged in time; aborting reader");
            reader.abort();
            let _ = self.events.send(LiveEvent::Close {
                connection: id,
                reason: "close timed out".to_string(),
            });
        }
    }

    /// Sends a user turn made of `parts`.
    pub async fn send(&self, parts: Vec<Part>, turn_complete: bool) -> Result<()> {
        self.transmit(ClientMessage::ClientContent(ClientContent {
            turns: vec![Content::user(parts)],
            turn_complete,
        }))
        .await
    }

    pub async fn send_realtime_input(&self, media_chunks: Vec<MediaChunk>) -> Result<()> {
        self.transmit(ClientMessage::RealtimeInput(RealtimeInput { media_chunks }))
            .await
    }

    pub async fn send_tool_response(&self, response: ToolResponse) -> Result<()> {
        debug!(responses = response.function_responses.len(), "Sending tool response");
        self.transmit(ClientMessage::ToolResponse(response)).await
    }

    async fn transmit(&self, message: ClientMessage) -> Result<()> {
        let payload = encode(&message)?;
        let sink = {
            let slot = self.slot.lock().await;
            match &slot.current {
                Some(connection) if slot.state == ConnectionState::Open => connection.sink.clone(),
                _ => return Err(LiveError::NotConnected),
            }
        };
        sink.lock()
            .await
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| LiveError::Send(e.to_string()))
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.try_lock() {
            if let Some(connection) = slot.current.take() {
                connection.reader.abort();
            }
        }
    }
}

async fn read_frames(
    id: ConnectionId,
    mut source: WsSource,
    slot: Arc<Mutex<Slot>>,
    events: broadcast::Sender<LiveEvent>,
) {
    let mut turn = TurnAccumulator::new();
    let mut reason = String::new();

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatch(id, &mut turn, text.as_bytes(), &events),
            Ok(Message::Binary(data)) => dispatch(id, &mut turn, &data, &events),
            Ok(Message::Close(frame)) => {
                if let Some(frame) = frame {
                    reason = frame.reason.to_string();
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(connection = %id, error = %e, "WebSocket read error");
                if reason.is_empty() {
                    reason = e.to_string();
                }
                break;
            }
        }
    }

    {
        let mut slot = slot.lock().await;
        if slot.current.as_ref().is_some_and(|c| c.id == id) {
            slot.current = None;
            slot.state = ConnectionState::Idle;
        }
    }

    let reason = close_reason(&reason);
    info!(connection = %id, %reason, "Live connection closed");
    let _ = events.send(LiveEvent::Close {
        connection: id,
        reason,
    });
}

fn dispatch(
    id: ConnectionId,
    turn: &mut TurnAccumulator,
    raw: &[u8],
    events: &broadcast::Sender<LiveEvent>,
) {
    match decode(raw) {
        Ok(message) => {
            for event in turn.handle(message) {
                let _ = events.send(event);
            }
        }
        Err(e) => warn!(connection = %id, error = %e, "Dropping unrecognized frame"),
    }
}

/// Strips everything up to and including an `ERROR]` prelude from a close
/// reason.
fn close_reason(raw: &str) -> String {
    match raw.find(ERROR_PRELUDE) {
        Some(idx) => raw[idx + ERROR_PRELUDE.len()..].trim_start().to_string(),
        None => raw.to_string(),
    }
}
