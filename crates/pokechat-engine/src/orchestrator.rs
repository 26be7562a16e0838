//! Drives one chat turn: streams the backend, runs requested tools
//! concurrently, and serializes everything onto a single ordered event
//! channel that always ends with `done`.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use pokechat_core::events::OutboundEvent;
use pokechat_core::ids::{TurnId, ToolCallId};
use pokechat_core::messages::Message;
use pokechat_core::provider::{GenerationBackend, GenerationRequest, GenerationStream};
use pokechat_core::stream::{GenerationEvent, ToolInvocationRequest};
use pokechat_core::tools::{Tool, ToolOutcome};

use crate::registry::ToolRegistry;
use crate::routing::ToolRouter;

const UNKNOWN_TOOL: &str = "unknown tool";
const TOOL_CRASHED: &str = "internal error: tool crashed";

#[derive(Clone, Debug, Default)]
pub struct OrchestratorConfig {
    /// Used when the request carries no system instructions of its own.
    pub system_prompt: Option<String>,
    /// Per-tool execution limit. `None` lets tools run until they settle.
    pub tool_timeout: Option<Duration>,
}

#[derive(Clone, Debug, Default)]
pub struct TurnRequest {
    pub history: Vec<Message>,
    pub system: Option<String>,
}

impl TurnRequest {
    pub fn new(history: Vec<Message>) -> Self {
        Self { history, system: None }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Lifecycle of a turn. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TurnState {
    Idle,
    Streaming,
    AwaitingTools,
    Closing,
    Closed,
}

/// Ledger entry for one requested tool call. `result` is set exactly once,
/// when the execution settles; abandoned executions keep `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    pub call_id: ToolCallId,
    pub tool_name: String,
    pub input: Value,
    pub result: Option<ToolOutcome>,
}

#[derive(Clone, Debug)]
pub struct TurnSummary {
    pub turn_id: TurnId,
    pub state: TurnState,
    /// Every state the turn passed through, in order.
    pub states: Vec<TurnState>,
    /// Concatenated text forwarded to the client.
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
    pub cancelled: bool,
    pub backend_error: Option<String>,
}

/// A turn running on its own task.
#[derive(Debug)]
pub struct TurnHandle {
    pub events: mpsc::Receiver<OutboundEvent>,
    pub join: JoinHandle<TurnSummary>,
}

pub struct Orchestrator {
    backend: Arc<dyn GenerationBackend>,
    registry: Arc<ToolRegistry>,
    router: Arc<dyn ToolRouter>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        registry: Arc<ToolRegistry>,
        router: Arc<dyn ToolRouter>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            router,
            config,
        }
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run one turn on a new task with a bounded event channel.
    pub fn spawn_turn(self: &Arc<Self>, request: TurnRequest, cancel: CancellationToken, capacity: usize) -> TurnHandle {
        let (tx, events) = mpsc::channel(capacity.max(1));
        let this = Arc::clone(self);
        let join = tokio::spawn(async move { this.run_turn(request, tx, cancel).await });
        TurnHandle { events, join }
    }

    /// Run one turn to completion, writing events to `tx`. Returns once `done`
    /// has been sent (or the receiver is gone); `tx` is dropped on return.
    #[instrument(skip_all, fields(turn_id = tracing::field::Empty, backend = self.backend.name(), messages = request.history.len()))]
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        tx: mpsc::Sender<OutboundEvent>,
        cancel: CancellationToken,
    ) -> TurnSummary {
        let mut turn = Turn::new(self, tx, cancel);
        tracing::Span::current().record("turn_id", turn.turn_id.as_str());

        let generation = GenerationRequest {
            tool_choice: self.router.choose_tool(&request.history),
            tools: self.registry.definitions(),
            system: request.system.or_else(|| self.config.system_prompt.clone()),
            messages: request.history,
        };
        info!(tool_choice = ?generation.tool_choice, tools = generation.tools.len(), "turn started");

        turn.advance(TurnState::Streaming);
        let opened = tokio::select! {
            biased;
            _ = turn.cancel.cancelled() => None,
            result = self.backend.stream(&generation) => Some(result),
        };

        match opened {
            None => turn.cancelled = true,
            Some(Err(e)) => turn.fail(e.error_kind(), e.to_string()).await,
            Some(Ok(stream)) => turn.drive(stream).await,
        }

        turn.close().await
    }
}

/// A tool execution that has settled.
struct Settled {
    call_id: ToolCallId,
    outcome: ToolOutcome,
}

/// Mutable state of one running turn. Only this struct writes to `tx`.
struct Turn<'a> {
    orchestrator: &'a Orchestrator,
    turn_id: TurnId,
    tx: mpsc::Sender<OutboundEvent>,
    cancel: CancellationToken,
    settled_tx: mpsc::UnboundedSender<Settled>,
    settled_rx: mpsc::UnboundedReceiver<Settled>,
    pending: HashSet<ToolCallId>,
    invocations: Vec<ToolInvocation>,
    states: Vec<TurnState>,
    text: String,
    cancelled: bool,
    receiver_gone: bool,
    backend_error: Option<String>,
}

impl<'a> Turn<'a> {
    fn new(orchestrator: &'a Orchestrator, tx: mpsc::Sender<OutboundEvent>, cancel: CancellationToken) -> Self {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        Self {
            orchestrator,
            turn_id: TurnId::new(),
            tx,
            cancel,
            settled_tx,
            settled_rx,
            pending: HashSet::new(),
            invocations: Vec::new(),
            states: vec![TurnState::Idle],
            text: String::new(),
            cancelled: false,
            receiver_gone: false,
            backend_error: None,
        }
    }

    fn state(&self) -> TurnState {
        self.states.last().copied().unwrap_or(TurnState::Idle)
    }

    fn advance(&mut self, next: TurnState) {
        let current = self.state();
        if next > current {
            debug!(from = ?current, to = ?next, "turn state");
            self.states.push(next);
        }
    }

    /// Send one event unless the turn is cancelled first. Returns whether the
    /// event was delivered. A dropped receiver ends the turn as if it were
    /// cancelled.
    async fn emit(&mut self, event: OutboundEvent) -> bool {
        if self.receiver_gone || self.cancel.is_cancelled() {
            return false;
        }
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            sent = self.tx.send(event) => sent,
        };
        if sent.is_err() {
            debug!("event receiver dropped");
            self.receiver_gone = true;
            return false;
        }
        true
    }

    fn stopped(&self) -> bool {
        self.receiver_gone || self.cancel.is_cancelled()
    }

    async fn fail(&mut self, kind: &'static str, message: String) {
        warn!(error_kind = kind, error = %message, "backend failed");
        if !self.pending.is_empty() {
            debug!(abandoned = self.pending.len(), "abandoning pending tools");
        }
        self.emit(OutboundEvent::error(message.clone())).await;
        self.backend_error = Some(message);
    }

    async fn drive(&mut self, mut stream: GenerationStream) {
        let mut backend_done = false;
        let mut message_seen = false;

        loop {
            if self.stopped() {
                self.cancelled = true;
                return;
            }
            if backend_done && self.pending.is_empty() {
                return;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.cancelled = true;
                    return;
                }
                Some(settled) = self.settled_rx.recv(), if !self.pending.is_empty() => {
                    self.settle(settled).await;
                }
                event = stream.next(), if !backend_done => match event {
                    Some(GenerationEvent::TextDelta { delta }) => {
                        if message_seen {
                            debug!("ignoring text after final message");
                            continue;
                        }
                        self.text.push_str(&delta);
                        self.emit(OutboundEvent::text(delta)).await;
                    }
                    Some(GenerationEvent::Message { message }) => {
                        if message_seen {
                            debug!("ignoring repeated final message");
                            continue;
                        }
                        message_seen = true;
                        if self.text.is_empty() && !message.text.is_empty() {
                            self.text.push_str(&message.text);
                            self.emit(OutboundEvent::text(message.text)).await;
                        }
                        for call in message.tool_calls {
                            if !self.dispatch(call).await {
                                debug!("turn stopped while dispatching tool calls");
                                break;
                            }
                        }
                    }
                    Some(GenerationEvent::Error { error }) => {
                        self.fail(error.error_kind(), error.to_string()).await;
                        return;
                    }
                    None => {
                        backend_done = true;
                        if !self.pending.is_empty() {
                            self.advance(TurnState::AwaitingTools);
                        }
                    }
                },
            }
        }
    }

    /// Announce a tool call and launch its execution. Nothing is recorded or
    /// launched unless the `tool_call` reached the receiver; returns false
    /// once the turn has stopped.
    async fn dispatch(&mut self, call: ToolInvocationRequest) -> bool {
        let ToolInvocationRequest { id, name, input } = call;
        if !self
            .emit(OutboundEvent::tool_call(name.clone(), input.clone(), id.clone()))
            .await
        {
            debug!(tool = %name, call_id = %id, "tool call not delivered, skipping launch");
            return false;
        }
        self.invocations.push(ToolInvocation {
            call_id: id.clone(),
            tool_name: name.clone(),
            input: input.clone(),
            result: None,
        });

        let Some(tool) = self.orchestrator.registry.get(&name) else {
            warn!(tool = %name, call_id = %id, "model requested unknown tool");
            self.record(&id, ToolOutcome::failure(UNKNOWN_TOOL)).await;
            return !self.stopped();
        };

        debug!(tool = %name, call_id = %id, "launching tool");
        self.pending.insert(id.clone());
        let settled_tx = self.settled_tx.clone();
        let timeout = self.orchestrator.config.tool_timeout;
        tokio::spawn(async move {
            let outcome = run_tool(tool, input, timeout).await;
            // The turn may already be closed; a late result is discarded.
            let _ = settled_tx.send(Settled { call_id: id, outcome });
        });
        true
    }

    async fn settle(&mut self, settled: Settled) {
        if !self.pending.remove(&settled.call_id) {
            return;
        }
        self.record(&settled.call_id, settled.outcome).await;
    }

    /// Store the outcome in the ledger and forward it as a `tool_result`.
    async fn record(&mut self, call_id: &ToolCallId, outcome: ToolOutcome) {
        let Some(entry) = self
            .invocations
            .iter_mut()
            .find(|inv| &inv.call_id == call_id && inv.result.is_none())
        else {
            return;
        };
        debug!(tool = %entry.tool_name, call_id = %call_id, ok = outcome.ok, "tool settled");
        entry.result = Some(outcome.clone());
        let event = OutboundEvent::tool_result(entry.tool_name.clone(), outcome, call_id.clone());
        self.emit(event).await;
    }

    async fn close(mut self) -> TurnSummary {
        if self.cancel.is_cancelled() || self.receiver_gone {
            self.cancelled = true;
        }
        self.advance(TurnState::Closing);
        if !self.pending.is_empty() {
            debug!(abandoned = self.pending.len(), "closing with tools still running");
        }
        if !self.receiver_gone {
            // `done` goes out even after cancellation.
            if self.tx.send(OutboundEvent::Done).await.is_err() {
                self.receiver_gone = true;
            }
        }
        self.advance(TurnState::Closed);

        info!(
            cancelled = self.cancelled,
            tools = self.invocations.len(),
            failed = self.backend_error.is_some(),
            "turn finished"
        );

        TurnSummary {
            turn_id: self.turn_id,
            state: TurnState::Closed,
            states: self.states,
            text: self.text,
            invocations: self.invocations,
            cancelled: self.cancelled,
            backend_error: self.backend_error,
        }
    }
}

/// Execute a tool, converting errors, panics and timeouts into a failed outcome.
async fn run_tool(tool: Arc<dyn Tool>, input: Value, timeout: Option<Duration>) -> ToolOutcome {
    let execution = AssertUnwindSafe(tool.execute(input)).catch_unwind();
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, execution).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = tool.name(), timeout_secs = limit.as_secs(), "tool timed out");
                return ToolOutcome::failure(format!("tool timed out after {}s", limit.as_secs()));
            }
        },
        None => execution.await,
    };
    match result {
        Ok(result) => ToolOutcome::from(result),
        Err(panic) => {
            error!(tool = tool.name(), panic = %panic_message(&panic), "tool panicked");
            ToolOutcome::failure(TOOL_CRASHED)
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
