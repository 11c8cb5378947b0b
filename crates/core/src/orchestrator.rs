//! Binds one tool provider to one live stream session.
//!
//! The orchestrator owns the provider connection and the stream connection as
//! a unit: binding a provider opens a stream whose setup declares exactly that
//! provider's tools, and unbinding tears both down, stream first. Tool calls
//! arriving on the stream are fanned out to the bound provider and answered
//! with a single aggregated response.

use crate::{
    audio::{AudioStream, pcm_chunk},
    declarations::to_function_declarations,
    error::{OrchestratorError, Result},
    provider::{ToolDescriptor, ToolProvider, ToolProviderConnector},
    stream::LiveStream,
};
use futures::{StreamExt, future::join_all};
use gemini_realtime::{
    ConnectionId, LiveError, LiveEvent,
    types::{
        FunctionCall, FunctionDeclaration, FunctionResponse, GenerationConfig, Part,
        SessionConfig, ToolCall, ToolResponse,
    },
};
use secrecy::SecretString;
use serde::Serialize;
use std::sync::{Arc, OnceLock, Weak};
use tokio::{
    sync::{Mutex, broadcast, broadcast::error::RecvError},
    task::{AbortHandle, JoinHandle},
};
use tracing::{debug, error, info, instrument, warn};

const NO_PROVIDER: &str = "no tool provider is connected";

/// What every stream session is opened with, apart from the tools.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub model: String,
    pub generation: GenerationConfig,
    pub system_instruction: Option<String>,
}

impl OrchestratorConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            generation: GenerationConfig::default(),
            system_instruction: None,
        }
    }

    pub fn session_config(&self, declarations: Vec<FunctionDeclaration>) -> SessionConfig {
        let mut config = SessionConfig::new(&self.model)
            .with_generation_config(self.generation.clone())
            .with_function_declarations(declarations);
        if let Some(text) = &self.system_instruction {
            config = config.with_system_instruction(text.clone());
        }
        config
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub provider: Option<String>,
    pub tool_count: usize,
    pub stream_connected: bool,
    pub voice_active: bool,
}

/// Everything the presentation layer needs to render a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Stream(LiveEvent),
    Status(SessionStatus),
    /// Binding a provider failed and the session was rolled back.
    ProviderFailed { provider: String, error: String },
    ToolResponseFailed { error: String },
}

struct Binding {
    provider_id: String,
    provider: Arc<dyn ToolProvider>,
    tools: Vec<ToolDescriptor>,
}

#[derive(Default)]
struct SessionState {
    binding: Option<Binding>,
    stream: Option<ConnectionId>,
    // Highest connection id the stream has reported closed.
    last_closed: Option<ConnectionId>,
    voice: Option<JoinHandle<()>>,
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        SessionStatus {
            provider: self.binding.as_ref().map(|b| b.provider_id.clone()),
            tool_count: self.binding.as_ref().map_or(0, |b| b.tools.len()),
            stream_connected: self.stream.is_some(),
            voice_active: self.voice.as_ref().is_some_and(|task| !task.is_finished()),
        }
    }

    fn stop_voice(&mut self) {
        if let Some(task) = self.voice.take() {
            task.abort();
        }
    }
}

pub struct SessionOrchestrator {
    stream: Arc<dyn LiveStream>,
    connector: Arc<dyn ToolProviderConnector>,
    config: OrchestratorConfig,
    state: Mutex<SessionState>,
    // Serializes connect/disconnect so teardown and setup never interleave.
    operations: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    bridge: OnceLock<AbortHandle>,
}

impl SessionOrchestrator {
    /// Creates the orchestrator and starts forwarding stream events. Must be
    /// called within a tokio runtime.
    pub fn new(
        stream: Arc<dyn LiveStream>,
        connector: Arc<dyn ToolProviderConnector>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let stream_events = stream.subscribe();
        let (events, _) = broadcast::channel(256);
        let orchestrator = Arc::new(Self {
            stream,
            connector,
            config,
            state: Mutex::new(SessionState::default()),
            operations: Mutex::new(()),
            events,
            bridge: OnceLock::new(),
        });

        let bridge = tokio::spawn(run_bridge(Arc::downgrade(&orchestrator), stream_events));
        let _ = orchestrator.bridge.set(bridge.abort_handle());
        orchestrator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status()
    }

    /// Tools of the bound provider, as discovered.
    pub async fn tools(&self) -> Vec<ToolDescriptor> {
        self.state
            .lock()
            .await
            .binding
            .as_ref()
            .map(|b| b.tools.clone())
            .unwrap_or_default()
    }

    /// Applies to the next stream connection.
    pub fn set_api_key(&self, api_key: SecretString) {
        self.stream.set_api_key(Some(api_key));
    }

    /// Binds `provider_id`, replacing any other binding.
    ///
    /// Binding the provider that is already bound keeps its connection and
    /// only rediscovers tools and reopens the stream. On failure the session
    /// is left with nothing bound.
    #[instrument(skip(self))]
    pub async fn connect_to_provider(&self, provider_id: &str) -> Result<SessionStatus> {
        let _operation = self.operations.lock().await;

        let current = self
            .state
            .lock()
            .await
            .binding
            .as_ref()
            .map(|b| (b.provider_id.clone(), b.provider.clone()));

        let provider = match current {
            Some((id, provider)) if id == provider_id => {
                debug!("Reusing bound provider connection");
                provider
            }
            current => {
                if current.is_some() {
                    self.teardown().await;
                }
                match self.connector.connect(provider_id).await {
                    Ok(provider) => provider,
                    Err(e) => {
                        let err = OrchestratorError::ProviderConnect {
                            provider: provider_id.to_string(),
                            message: format!("{e:#}"),
                        };
                        self.fail(provider_id, None, &err).await;
                        return Err(err);
                    }
                }
            }
        };

        let tools = match provider.discover_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                let err = OrchestratorError::Discovery {
                    provider: provider_id.to_string(),
                    message: format!("{e:#}"),
                };
                self.fail(provider_id, Some(&provider), &err).await;
                return Err(err);
            }
        };
        info!(count = tools.len(), "Discovered tools");

        let session_config = self
            .config
            .session_config(to_function_declarations(&tools));
        match self.stream.connect(session_config).await {
            Ok(connection) => {
                let status = {
                    let mut state = self.state.lock().await;
                    if state.last_closed.is_some_and(|closed| closed >= connection) {
                        None
                    } else {
                        state.binding = Some(Binding {
                            provider_id: provider_id.to_string(),
                            provider: provider.clone(),
                            tools,
                        });
                        state.stream = Some(connection);
                        Some(state.status())
                    }
                };
                let Some(status) = status else {
                    let err = OrchestratorError::StreamConnect(LiveError::Connection(
                        "stream closed during setup".to_string(),
                    ));
                    self.fail(provider_id, Some(&provider), &err).await;
                    return Err(err);
                };
                info!(%connection, "Provider bound to live stream");
                self.emit(SessionEvent::Status(status.clone()));
                Ok(status)
            }
            Err(e) => {
                let err = OrchestratorError::StreamConnect(e);
                self.fail(provider_id, Some(&provider), &err).await;
                Err(err)
            }
        }
    }

    /// Tears down the stream and then the provider. Safe to call when nothing
    /// is bound.
    #[instrument(skip(self))]
    pub async fn disconnect_provider(&self) -> Result<SessionStatus> {
        let _operation = self.operations.lock().await;
        if !self.teardown().await {
            debug!("Nothing to disconnect");
        }
        let status = self.status().await;
        self.emit(SessionEvent::Status(status.clone()));
        Ok(status)
    }

    /// Invokes every call in the batch against the bound provider and sends
    /// one aggregated response. A failing call only fails its own entry.
    #[instrument(skip(self, call), fields(calls = call.function_calls.len()))]
    pub async fn dispatch_tool_call(&self, call: ToolCall) -> Result<ToolResponse> {
        let provider = self
            .state
            .lock()
            .await
            .binding
            .as_ref()
            .map(|b| b.provider.clone());

        let function_responses = match provider {
            Some(provider) => {
                join_all(
                    call.function_calls
                        .into_iter()
                        .map(|function_call| invoke_one(provider.clone(), function_call)),
                )
                .await
            }
            None => {
                warn!("Tool call received with no provider bound");
                call.function_calls
                    .iter()
                    .map(|function_call| FunctionResponse::error(&function_call.id, NO_PROVIDER))
                    .collect()
            }
        };

        let response = ToolResponse { function_responses };
        self.stream
            .send_tool_response(response.clone())
            .await
            .map_err(OrchestratorError::Send)?;
        Ok(response)
    }

    /// Sends a complete user turn.
    #[instrument(skip(self, message))]
    pub async fn send_text(&self, message: &str) -> Result<()> {
        if self.state.lock().await.stream.is_none() {
            warn!("Dropping text message, live stream is not connected");
            return Err(OrchestratorError::NotConnected);
        }
        self.stream
            .send(vec![Part::text(message)], true)
            .await
            .map_err(OrchestratorError::Send)
    }

    /// Starts forwarding `source` as realtime input, or stops an active
    /// capture. Returns whether capture is active afterwards.
    #[instrument(skip(self, source))]
    pub async fn toggle_voice_capture(&self, source: AudioStream) -> Result<bool> {
        let status = {
            let mut state = self.state.lock().await;
            match state.voice.take() {
                Some(task) if !task.is_finished() => {
                    task.abort();
                    info!("Voice capture stopped");
                }
                _ => {
                    if state.stream.is_none() {
                        return Err(OrchestratorError::NotConnected);
                    }
                    state.voice = Some(tokio::spawn(forward_audio(self.stream.clone(), source)));
                    info!("Voice capture started");
                }
            }
            state.status()
        };
        let active = status.voice_active;
        self.emit(SessionEvent::Status(status));
        Ok(active)
    }

    /// Stops an active voice capture. Returns whether one was running.
    #[instrument(skip(self))]
    pub async fn stop_voice_capture(&self) -> bool {
        let status = {
            let mut state = self.state.lock().await;
            match state.voice.take() {
                Some(task) if !task.is_finished() => task.abort(),
                _ => return false,
            }
            info!("Voice capture stopped");
            state.status()
        };
        self.emit(SessionEvent::Status(status));
        true
    }

    /// Clears all state, closing the stream and then the provider. Returns
    /// whether anything was torn down.
    async fn teardown(&self) -> bool {
        let (binding, stream) = {
            let mut state = self.state.lock().await;
            state.stop_voice();
            (state.binding.take(), state.stream.take())
        };

        if stream.is_some() {
            self.stream.disconnect().await;
        }
        if let Some(binding) = &binding {
            info!(provider = %binding.provider_id, "Closing tool provider");
            close_provider(&binding.provider).await;
        }
        binding.is_some() || stream.is_some()
    }

    /// Rolls a failed bind back to the unbound state.
    async fn fail(
        &self,
        provider_id: &str,
        provider: Option<&Arc<dyn ToolProvider>>,
        err: &OrchestratorError,
    ) {
        error!(provider = %provider_id, error = %err, "Failed to bind tool provider");

        let bound = {
            let mut state = self.state.lock().await;
            state.stop_voice();
            state.stream = None;
            state.binding.take()
        };
        self.stream.disconnect().await;

        match (bound, provider) {
            (Some(binding), _) => close_provider(&binding.provider).await,
            (None, Some(provider)) => close_provider(provider).await,
            (None, None) => {}
        }

        self.emit(SessionEvent::ProviderFailed {
            provider: provider_id.to_string(),
            error: err.to_string(),
        });
        let status = self.status().await;
        self.emit(SessionEvent::Status(status));
    }

    async fn on_stream_event(self: &Arc<Self>, event: LiveEvent) {
        match &event {
            LiveEvent::ToolCall(call) => {
                let this = Arc::clone(self);
                let call = call.clone();
                tokio::spawn(async move {
                    if let Err(e) = this.dispatch_tool_call(call).await {
                        error!(error = %e, "Failed to send tool response");
                        this.emit(SessionEvent::ToolResponseFailed {
                            error: e.to_string(),
                        });
                    }
                });
            }
            LiveEvent::ToolCallCancellation(cancellation) => {
                info!(ids = ?cancellation.ids, "Tool calls cancelled by the model");
            }
            LiveEvent::Close { connection, reason } => {
                let status = {
                    let mut state = self.state.lock().await;
                    state.last_closed = state.last_closed.max(Some(*connection));
                    if state.stream != Some(*connection) {
                        debug!(%connection, "Ignoring close of a previous connection");
                        None
                    } else {
                        info!(%connection, %reason, "Live stream closed");
                        state.stream = None;
                        state.stop_voice();
                        Some(state.status())
                    }
                };
                if let Some(status) = status {
                    self.emit(SessionEvent::Status(status));
                }
            }
            _ => {}
        }
        self.emit(SessionEvent::Stream(event));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.get() {
            bridge.abort();
        }
        if let Ok(mut state) = self.state.try_lock() {
            state.stop_voice();
        }
    }
}

async fn run_bridge(
    orchestrator: Weak<SessionOrchestrator>,
    mut events: broadcast::Receiver<LiveEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Session bridge lagged behind the live stream");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(orchestrator) = orchestrator.upgrade() else {
            break;
        };
        orchestrator.on_stream_event(event).await;
    }
    debug!("Session bridge stopped");
}

async fn invoke_one(provider: Arc<dyn ToolProvider>, call: FunctionCall) -> FunctionResponse {
    match provider.invoke(&call.name, call.args).await {
        Ok(response) => FunctionResponse {
            id: call.id,
            response,
        },
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool invocation failed");
            FunctionResponse::error(call.id, format!("{e:#}"))
        }
    }
}

async fn close_provider(provider: &Arc<dyn ToolProvider>) {
    if let Err(e) = provider.close().await {
        warn!(provider = %provider.id(), error = %e, "Tool provider did not close cleanly");
    }
}

async fn forward_audio(stream: Arc<dyn LiveStream>, mut source: AudioStream) {
    while let Some(pcm) = source.next().await {
        if let Err(e) = stream.send_realtime_input(vec![pcm_chunk(&pcm)]).await {
            warn!(error = %e, "Stopping voice capture");
            break;
        }
    }
    debug!("Voice capture source ended");
}
