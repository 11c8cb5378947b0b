use futures_util::{SinkExt, StreamExt};
use gemini_realtime::{
    ConnectionState, LiveClient, LiveError, LiveEvent,
    types::{FunctionResponse, MediaChunk, Part, SessionConfig, ToolResponse},
};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
    time::timeout,
};
use tokio_tungstenite::{
    accept_async,
    tungstenite::protocol::{CloseFrame, Message, frame::coding::CloseCode},
};

const WAIT: Duration = Duration::from_secs(5);

/// One accepted connection on the fake service.
struct ServerConn {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl ServerConn {
    async fn next_json(&mut self) -> Value {
        let text = timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("connection ended");
        serde_json::from_str(&text).unwrap()
    }

    fn push(&self, frame: Value) {
        self.outbound
            .send(Message::Text(frame.to_string().into()))
            .unwrap();
    }

    /// Resolves once the client side has gone away.
    async fn closed(&mut self) {
        timeout(WAIT, async { while self.inbound.recv().await.is_some() {} })
            .await
            .expect("server connection was not closed");
    }
}

struct MockServer {
    url: String,
    connections: mpsc::UnboundedReceiver<ServerConn>,
}

impl MockServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (conn_tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_tx = conn_tx.clone();
                tokio::spawn(async move {
                    let Ok(ws) = accept_async(stream).await else {
                        return;
                    };
                    let (mut sink, mut source) = ws.split();
                    let (in_tx, inbound) = mpsc::unbounded_channel();
                    let (outbound, mut out_rx) = mpsc::unbounded_channel::<Message>();
                    let _ = conn_tx.send(ServerConn { inbound, outbound });

                    loop {
                        tokio::select! {
                            frame = source.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = in_tx.send(text.to_string());
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            Some(out) = out_rx.recv() => {
                                if sink.send(out).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        Self { url, connections }
    }

    async fn accept(&mut self) -> ServerConn {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for a connection")
            .unwrap()
    }
}

async fn next_event(events: &mut broadcast::Receiver<LiveEvent>) -> LiveEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .unwrap()
}

fn config() -> SessionConfig {
    SessionConfig::new("models/test-model").with_system_instruction("Be helpful.")
}

#[tokio::test]
async fn test_setup_is_first_frame_and_turn_events_follow() {
    let mut server = MockServer::start().await;
    let client = LiveClient::new(&server.url);
    let mut events = client.subscribe();

    let id = client.connect(config()).await.unwrap();
    assert_eq!(client.state().await, ConnectionState::Open);
    assert_eq!(next_event(&mut events).await, LiveEvent::Open { connection: id });

    let mut conn = server.accept().await;
    let setup = conn.next_json().await;
    assert_eq!(setup["setup"]["model"], "models/test-model");
    assert_eq!(
        setup["setup"]["systemInstruction"]["parts"][0]["text"],
        "Be helpful."
    );

    conn.push(json!({"setupComplete": {}}));
    conn.push(json!({"serverContent": {"modelTurn": {"parts": [{"text": "Hello "}]}}}));
    conn.push(json!({"serverContent": {"modelTurn": {"parts": [{"text": "world"}]}}}));
    conn.push(json!({"serverContent": {"turnComplete": true}}));

    assert_eq!(next_event(&mut events).await, LiveEvent::SetupComplete);
    assert_eq!(
        next_event(&mut events).await,
        LiveEvent::Content(vec![Part::text("Hello ")])
    );
    assert_eq!(
        next_event(&mut events).await,
        LiveEvent::Content(vec![Part::text("world")])
    );
    assert_eq!(
        next_event(&mut events).await,
        LiveEvent::TurnComplete("Hello world".to_string())
    );
}

#[tokio::test]
async fn test_unrecognized_frames_are_dropped_without_ending_the_session() {
    let mut server = MockServer::start().await;
    let client = LiveClient::new(&server.url);
    let mut events = client.subscribe();

    client.connect(config()).await.unwrap();
    next_event(&mut events).await;
    let mut conn = server.accept().await;
    conn.next_json().await;

    conn.outbound.send(Message::Text("not json".into())).unwrap();
    conn.push(json!({"usageMetadata": {"totalTokenCount": 3}}));
    conn.push(json!({"toolCallCancellation": {"ids": ["c1"]}}));

    let LiveEvent::ToolCallCancellation(info) = next_event(&mut events).await else {
        panic!("expected cancellation");
    };
    assert_eq!(info.ids, vec!["c1".to_string()]);
    assert_eq!(client.state().await, ConnectionState::Open);
}

#[tokio::test]
async fn test_second_connect_closes_first_and_stale_handle_is_ignored() {
    let mut server = MockServer::start().await;
    let client = LiveClient::new(&server.url);
    let mut events = client.subscribe();

    let first = client.connect(config()).await.unwrap();
    let mut conn1 = server.accept().await;
    conn1.next_json().await;

    let second = client.connect(config()).await.unwrap();
    assert_ne!(first, second);
    conn1.closed().await;

    let mut conn2 = server.accept().await;
    conn2.next_json().await;

    assert_eq!(next_event(&mut events).await, LiveEvent::Open { connection: first });
    assert!(matches!(
        next_event(&mut events).await,
        LiveEvent::Close { connection, .. } if connection == first
    ));
    assert_eq!(next_event(&mut events).await, LiveEvent::Open { connection: second });

    assert!(!client.disconnect_connection(first).await);
    assert_eq!(client.current_connection().await, Some(second));
    assert_eq!(client.state().await, ConnectionState::Open);

    client.send(vec![Part::text("still here")], true).await.unwrap();
    let frame = conn2.next_json().await;
    assert_eq!(frame["clientContent"]["turns"][0]["parts"][0]["text"], "still here");

    assert!(client.disconnect_connection(second).await);
    conn2.closed().await;
    assert_eq!(client.state().await, ConnectionState::Idle);
    assert!(!client.disconnect().await);
}

#[tokio::test]
async fn test_server_close_emits_reason_and_clears_connection() {
    let mut server = MockServer::start().await;
    let client = LiveClient::new(&server.url);
    let mut events = client.subscribe();

    let id = client.connect(config()).await.unwrap();
    next_event(&mut events).await;
    let mut conn = server.accept().await;
    conn.next_json().await;

    conn.outbound
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::Policy,
            reason: "generic::resource_exhausted: ERROR] Quota exceeded".into(),
        })))
        .unwrap();

    assert_eq!(
        next_event(&mut events).await,
        LiveEvent::Close {
            connection: id,
            reason: "Quota exceeded".to_string()
        }
    );
    assert_eq!(client.state().await, ConnectionState::Idle);
    assert_eq!(client.current_connection().await, None);
    assert!(matches!(
        client.send(vec![Part::text("late")], true).await,
        Err(LiveError::NotConnected)
    ));
}

#[tokio::test]
async fn test_outbound_frame_shapes() {
    let mut server = MockServer::start().await;
    let client = LiveClient::new(&server.url);

    client.connect(config()).await.unwrap();
    let mut conn = server.accept().await;
    conn.next_json().await;

    client
        .send(vec![Part::text("draft")], false)
        .await
        .unwrap();
    client
        .send_realtime_input(vec![MediaChunk {
            mime_type: "audio/pcm;rate=16000".to_string(),
            data: "AAE=".to_string(),
        }])
        .await
        .unwrap();
    client
        .send_tool_response(ToolResponse {
            function_responses: vec![
                FunctionResponse {
                    id: "c1".to_string(),
                    response: json!({"result": "ok"}),
                },
                FunctionResponse::error("c2", "no such tab"),
            ],
        })
        .await
        .unwrap();

    assert_eq!(
        conn.next_json().await,
        json!({"clientContent": {"turns": [{"role": "user", "parts": [{"text": "draft"}]}], "turnComplete": false}})
    );
    assert_eq!(
        conn.next_json().await,
        json!({"realtimeInput": {"mediaChunks": [{"mimeType": "audio/pcm;rate=16000", "data": "AAE="}]}})
    );
    assert_eq!(
        conn.next_json().await,
        json!({"toolResponse": {"functionResponses": [
            {"id": "c1", "response": {"result": "ok"}},
            {"id": "c2", "response": {"error": "no such tab"}}
        ]}})
    );
}

#[tokio::test]
async fn test_unacknowledged_close_times_out_and_still_reports_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (release, hold) = tokio::sync::oneshot::channel::<()>();

    // Reads the setup frame, then stops reading so the close frame is never answered.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _setup = ws.next().await;
        let _ = hold.await;
    });

    let client = LiveClient::new(&url).with_close_timeout(Duration::from_millis(100));
    let mut events = client.subscribe();
    let id = client.connect(config()).await.unwrap();
    assert_eq!(next_event(&mut events).await, LiveEvent::Open { connection: id });

    assert!(client.disconnect().await);
    assert_eq!(
        next_event(&mut events).await,
        LiveEvent::Close {
            connection: id,
            reason: "close timed out".to_string()
        }
    );
    assert_eq!(client.state().await, ConnectionState::Idle);
    assert_eq!(client.current_connection().await, None);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
    drop(release);
}
