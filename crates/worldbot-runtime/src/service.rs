//! [`BridgeService`] – the dispatch loop between the wire and the engine.
//!
//! One task owns the engine, the per-sender histories and the link monitor,
//! and processes work strictly in arrival order:
//!
//! 1. **Inbound** bridge messages (from the transport's queue).
//! 2. **Commands** from [`ServiceHandle`]s (console input, outbound chat,
//!    interaction notices, history queries).
//! 3. **Link ticks**, which check reply deadlines.
//!
//! Every finished reply is published on [`Topic::Conversation`], handed to
//! each registered [`DisplaySink`] and, when enabled, mirrored to the VRChat
//! chatbox.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use worldbot_bridge::protocol::{self, ChatRequest, Inbound, InteractionNotice};
use worldbot_bridge::{BridgeAdapter, EventBus, LinkMonitor, Topic};
use worldbot_types::{BotError, BridgeMessage, Event, EventPayload, LinkState, StatusSnapshot};

use crate::engine::KnowledgeEngine;
use crate::notifier::InteractionNotifier;
use crate::sessions::{DEFAULT_MAX_SESSIONS, LOCAL_SENDER_ID, SessionRegistry};

const EVENT_SOURCE: &str = "worldbot-runtime::service";
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Receives every bot message meant for people to read.
pub trait DisplaySink: Send + Sync {
    fn display_bot_message(&self, text: &str);
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// How long a chat request may wait for its reply before the link is
    /// considered degraded.
    pub reply_timeout: Duration,
    /// Also send every displayed message to `/chatbox/input`.
    pub mirror_to_chatbox: bool,
    /// How often reply deadlines are checked.
    pub link_poll_interval: Duration,
    pub max_sessions: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(5),
            mirror_to_chatbox: false,
            link_poll_interval: Duration::from_millis(250),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

pub struct BridgeService {
    engine: KnowledgeEngine,
    adapter: Arc<dyn BridgeAdapter>,
    bus: EventBus,
    sessions: SessionRegistry,
    monitor: LinkMonitor,
    displays: Vec<Arc<dyn DisplaySink>>,
    notifier: Option<InteractionNotifier>,
    status: Arc<RwLock<StatusSnapshot>>,
    mirror_to_chatbox: bool,
    link_poll_interval: Duration,
}

impl BridgeService {
    pub fn new(
        engine: KnowledgeEngine,
        adapter: Arc<dyn BridgeAdapter>,
        bus: EventBus,
        config: ServiceConfig,
    ) -> Self {
        let max_history = engine
            .config()
            .map_or(worldbot_types::DEFAULT_MAX_HISTORY_LENGTH, |c| c.max_history_length);
        let initial = adapter.initial_state();
        let status = StatusSnapshot {
            listening_on: adapter.listening_on(),
            sending_to: adapter.sending_to(),
            link_state: LinkState::Uninitialized,
            simulated: initial == LinkState::Simulated,
            notifications_enabled: false,
            knowledge_entries: engine.store().map_or(0, |s| s.len()),
            knowledge_topics: engine.store().map(|s| s.topics().to_vec()).unwrap_or_default(),
            active_sessions: 0,
        };

        let mut service = Self {
            engine,
            adapter,
            bus,
            sessions: SessionRegistry::new(max_history, config.max_sessions),
            monitor: LinkMonitor::new(config.reply_timeout),
            displays: Vec::new(),
            notifier: None,
            status: Arc::new(RwLock::new(status)),
            mirror_to_chatbox: config.mirror_to_chatbox,
            link_poll_interval: config.link_poll_interval,
        };
        let change = service.monitor.on_bound(initial);
        service.apply_link_change(change);
        service
    }

    pub fn with_display(mut self, sink: Arc<dyn DisplaySink>) -> Self {
        self.displays.push(sink);
        self
    }

    pub fn with_notifier(mut self, notifier: Option<InteractionNotifier>) -> Self {
        let enabled = notifier.is_some();
        self.notifier = notifier;
        self.update_status(|s| s.notifications_enabled = enabled);
        self
    }

    /// Shared view of the live status, for the panel.
    pub fn status_handle(&self) -> Arc<RwLock<StatusSnapshot>> {
        Arc::clone(&self.status)
    }

    pub fn link_state(&self) -> LinkState {
        self.monitor.state()
    }

    /// Answer a line typed at the local console.
    pub async fn process_local(&mut self, text: &str) -> String {
        let history = self.sessions.history_mut(LOCAL_SENDER_ID);
        let reply = self.engine.process_input(history, text);
        let decorated = self.engine.decorate(&reply);
        self.refresh_session_count();
        self.display(Some(LOCAL_SENDER_ID), &decorated).await;
        decorated
    }

    /// Forward a chat line to the remote and expect a reply.
    pub async fn submit_chat_message(&mut self, text: &str, sender_id: i32, sender_name: &str) {
        let request = ChatRequest {
            sender_name: sender_name.to_string(),
            sender_id,
            message: text.to_string(),
        };
        self.send(protocol::encode_chat_request(&request), true).await;
    }

    /// Tell the remote that an item was used.
    pub async fn notify_interaction(&mut self, notice: InteractionNotice) {
        self.send(protocol::encode_interaction(&notice), false).await;
    }

    pub fn get_conversation_history_as_text(&self, sender_id: i32) -> String {
        self.sessions.history_text(sender_id)
    }

    /// Dispatch one message from the transport.
    #[instrument(skip(self, message), fields(address = %message.address))]
    pub async fn handle_inbound(&mut self, message: BridgeMessage) {
        let inbound = match protocol::decode(&message) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "dropping inbound message");
                return;
            }
        };

        let is_reply = matches!(inbound, Inbound::BotResponse(_));
        let change = self.monitor.on_inbound(Instant::now(), is_reply);
        self.apply_link_change(change);

        match inbound {
            Inbound::Chat(request) => self.answer_chat(request).await,
            Inbound::Interaction(notice) => self.record_interaction(notice),
            Inbound::BotResponse(text) => self.display(None, &text).await,
        }
    }

    /// Check reply deadlines.
    pub fn poll_link(&mut self) {
        let change = self.monitor.poll(Instant::now());
        self.apply_link_change(change);
    }

    async fn answer_chat(&mut self, request: ChatRequest) {
        debug!(sender = %request.sender_name, sender_id = request.sender_id, "chat request");
        let history = self.sessions.history_mut(request.sender_id);
        let reply = self
            .engine
            .respond(history, &request.message, Some(&request.sender_name));
        let decorated = self.engine.decorate(&reply);
        self.refresh_session_count();

        self.send(protocol::encode_bot_response(&decorated), false).await;
        self.display(Some(request.sender_id), &decorated).await;
    }

    fn record_interaction(&self, notice: InteractionNotice) {
        info!(
            item = %notice.item_name,
            item_id = %notice.item_id,
            player = %notice.sender_name,
            player_id = notice.sender_id,
            "item interaction"
        );
        self.bus.publish_to(
            Topic::Interactions,
            Event::new(
                EVENT_SOURCE,
                EventPayload::Interaction {
                    item_id: notice.item_id.clone(),
                    item_name: notice.item_name.clone(),
                    sender_name: notice.sender_name.clone(),
                    sender_id: notice.sender_id,
                },
            ),
        );
        if let Some(notifier) = self.notifier.clone() {
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&notice).await {
                    warn!(error = %e, "interaction alert not delivered");
                }
            });
        }
    }

    async fn display(&self, sender_id: Option<i32>, text: &str) {
        self.bus.publish_to(
            Topic::Conversation,
            Event::new(
                EVENT_SOURCE,
                EventPayload::BotMessage {
                    sender_id,
                    text: text.to_string(),
                },
            ),
        );
        for sink in &self.displays {
            sink.display_bot_message(text);
        }
        if self.mirror_to_chatbox
            && let Err(e) = self.adapter.send(protocol::encode_chatbox(text)).await
        {
            warn!(error = %e, "chatbox mirror dropped");
        }
    }

    async fn send(&mut self, message: BridgeMessage, expects_reply: bool) {
        let address = message.address.clone();
        match self.adapter.send(message).await {
            Ok(()) => {
                let change = self.monitor.on_outbound(Instant::now(), expects_reply);
                self.apply_link_change(change);
            }
            Err(e) => warn!(address = %address, error = %e, "outbound message dropped"),
        }
    }

    fn apply_link_change(&mut self, change: Option<LinkState>) {
        let Some(state) = change else {
            return;
        };
        match state {
            LinkState::Degraded => warn!(state = %state, "bridge link degraded: reply overdue"),
            _ => info!(state = %state, "bridge link state changed"),
        }
        self.update_status(|s| s.link_state = state);
        self.bus.publish_to(
            Topic::Link,
            Event::new(EVENT_SOURCE, EventPayload::LinkChanged(state)),
        );
    }

    fn refresh_session_count(&self) {
        let count = self.sessions.len();
        self.update_status(|s| s.active_sessions = count);
    }

    fn update_status(&self, apply: impl FnOnce(&mut StatusSnapshot)) {
        let mut status = self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut status);
    }

    /// Move the service onto its own task.
    ///
    /// The task runs until [`ServiceHandle::shutdown`] is called, every
    /// handle is dropped, or the inbound queue closes.
    pub fn spawn(self, inbound: mpsc::Receiver<BridgeMessage>) -> (ServiceHandle, JoinHandle<()>) {
        let (commands, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = ServiceHandle {
            commands,
            shutdown: Arc::new(shutdown),
            status: self.status_handle(),
        };
        let task = tokio::spawn(self.run(inbound, commands_rx, shutdown_rx));
        (handle, task)
    }

    async fn run(
        mut self,
        mut inbound: mpsc::Receiver<BridgeMessage>,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.link_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(link = %self.monitor.state(), "bridge service running");

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(command) = commands.recv() => self.handle_command(command).await,
                message = inbound.recv() => match message {
                    Some(message) => self.handle_inbound(message).await,
                    None => {
                        info!("inbound queue closed");
                        break;
                    }
                },
                _ = ticker.tick() => self.poll_link(),
            }
        }
        info!("bridge service stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::LocalChat { text, reply } => {
                let answer = self.process_local(&text).await;
                let _ = reply.send(answer);
            }
            Command::SubmitChat(request) => {
                self.submit_chat_message(&request.message, request.sender_id, &request.sender_name)
                    .await;
            }
            Command::NotifyInteraction(notice) => self.notify_interaction(notice).await,
            Command::HistoryText { sender_id, reply } => {
                let _ = reply.send(self.get_conversation_history_as_text(sender_id));
            }
        }
    }
}

enum Command {
    LocalChat {
        text: String,
        reply: oneshot::Sender<String>,
    },
    SubmitChat(ChatRequest),
    NotifyInteraction(InteractionNotice),
    HistoryText {
        sender_id: i32,
        reply: oneshot::Sender<String>,
    },
}

/// Cheap, cloneable access to a running [`BridgeService`].
#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::Sender<Command>,
    shutdown: Arc<watch::Sender<bool>>,
    status: Arc<RwLock<StatusSnapshot>>,
}

fn stopped() -> BotError {
    BotError::TransportUnavailable("bridge service has stopped".to_string())
}

impl ServiceHandle {
    async fn submit(&self, command: Command) -> Result<(), BotError> {
        self.commands.send(command).await.map_err(|_| stopped())
    }

    /// Answer `text` locally; the reply is also displayed.
    pub async fn local_chat(&self, text: impl Into<String>) -> Result<String, BotError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::LocalChat {
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn submit_chat_message(
        &self,
        text: impl Into<String>,
        sender_id: i32,
        sender_name: impl Into<String>,
    ) -> Result<(), BotError> {
        self.submit(Command::SubmitChat(ChatRequest {
            sender_name: sender_name.into(),
            sender_id,
            message: text.into(),
        }))
        .await
    }

    pub async fn notify_interaction(
        &self,
        item_id: impl Into<String>,
        item_name: impl Into<String>,
        sender_name: impl Into<String>,
        sender_id: i32,
    ) -> Result<(), BotError> {
        self.submit(Command::NotifyInteraction(InteractionNotice {
            item_id: item_id.into(),
            item_name: item_name.into(),
            sender_name: sender_name.into(),
            sender_id,
        }))
        .await
    }

    pub async fn history_text(&self, sender_id: i32) -> Result<String, BotError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::HistoryText { sender_id, reply }).await?;
        rx.await.map_err(|_| stopped())
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn status_handle(&self) -> Arc<RwLock<StatusSnapshot>> {
        Arc::clone(&self.status)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
