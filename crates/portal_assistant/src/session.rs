//! Assistant session manager.
//!
//! The state machine at the heart of the chat widget. It owns the
//! authoritative message log and arbitrates between the three message
//! producers: the user, canned quick actions, and the live channel.
//!
//! ```text
//! Uninitialized --mount--> Initializing --history loaded--> Ready --unmount--> Unmounted
//! ```
//!
//! All inputs arrive as [`SessionEvent`]s and are applied one at a time;
//! [`crate::runtime`] feeds them from a tokio task, tests feed them directly.
//!
//! Live-path replies are not correlated with the outbound message that
//! triggered them. When a reply timer fires, the assistant message carries
//! whatever inbound payload the channel delivered most recently.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{ChannelEvent, ChannelSink, ChannelState, Connector, LiveChannel};
use crate::config::AssistantConfig;
use crate::error::AssistantError;
use crate::persistence::ConversationStore;
use crate::quick_actions::QuickActionResponder;
use crate::scheduler::{Clock, Scheduler, TimerId};
use crate::types::{Identity, Key, KeyEvent, Message, MessageId, Sender};

/// Lifecycle of a session instance
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
    Unmounted,
}

/// User intents forwarded by the presentation shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Open,
    Close,
    SendUserMessage(String),
    SendQuickAction(String),
    ClearHistory,
    Key(KeyEvent),
    /// Ask for a fresh channel after the current one closed
    Reconnect,
    Unmount,
}

/// Everything the session reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Intent(Intent),
    Channel { generation: u64, event: ChannelEvent },
    TimerFired(TimerId),
}

/// What the presentation shell renders
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ViewModel {
    #[serde(rename = "isOpen")]
    pub is_open: bool,
    pub messages: Vec<Message>,
    #[serde(rename = "isComposing")]
    pub is_composing: bool,
    /// Role menu; empty once the conversation is past its first exchange
    #[serde(rename = "quickActions")]
    pub quick_actions: Vec<String>,
    #[serde(rename = "channelState")]
    pub channel_state: ChannelState,
    pub phase: SessionPhase,
}

/// Collaborators a session needs
#[derive(Clone)]
pub struct SessionDeps {
    pub store: ConversationStore,
    pub connector: Arc<dyn Connector>,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
    pub responder: QuickActionResponder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingReply {
    /// Resolves to the channel's last inbound payload
    Live,
    QuickAction { prompt: String },
}

/// The conversation controller for one mounted identity
pub struct SessionManager {
    session_id: Uuid,
    identity: Identity,
    config: AssistantConfig,
    deps: SessionDeps,
    events: mpsc::UnboundedSender<SessionEvent>,

    phase: SessionPhase,
    messages: Vec<Message>,
    next_id: MessageId,
    is_open: bool,
    composing: bool,
    pending: BTreeMap<TimerId, PendingReply>,
    next_timer: u64,
    last_inbound: Option<String>,

    channel: Option<Box<dyn LiveChannel>>,
    channel_state: ChannelState,
    generation: u64,
}

impl SessionManager {
    /// Create an unmounted session. `events` is the queue channel events
    /// are delivered to; whoever drains it passes them to [`handle`](Self::handle).
    pub fn new(
        identity: Identity,
        config: AssistantConfig,
        deps: SessionDeps,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            identity,
            config,
            deps,
            events,
            phase: SessionPhase::Uninitialized,
            messages: Vec::new(),
            next_id: MessageId(1),
            is_open: false,
            composing: false,
            pending: BTreeMap::new(),
            next_timer: 0,
            last_inbound: None,
            channel: None,
            channel_state: ChannelState::Closed,
            generation: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel_state
    }

    /// Most recent inbound payload, if any has arrived
    pub fn last_inbound_payload(&self) -> Option<&str> {
        self.last_inbound.as_deref()
    }

    /// Replies scheduled and not yet resolved
    pub fn pending_replies(&self) -> usize {
        self.pending.len()
    }

    /// Open the channel, restore history, and greet if there is none.
    pub fn mount(&mut self) {
        if self.phase != SessionPhase::Uninitialized {
            debug!(session = %self.session_id, phase = ?self.phase, "Mount ignored");
            return;
        }
        self.phase = SessionPhase::Initializing;
        info!(
            session = %self.session_id,
            role = %self.identity.role,
            user_id = %self.identity.user_id,
            "Mounting assistant session"
        );

        self.connect();

        let history = self
            .deps
            .store
            .load(self.identity.role, &self.identity.user_id);
        if history.is_empty() {
            let welcome = self.config.welcome_for(&self.identity);
            self.append(Sender::Assistant, welcome);
        } else {
            debug!(session = %self.session_id, count = history.len(), "Restored conversation");
            self.next_id = history
                .iter()
                .map(|m| m.id)
                .max()
                .and_then(MessageId::next)
                .unwrap_or(MessageId(1));
            self.messages = history;
        }

        self.phase = SessionPhase::Ready;
    }

    /// Apply one event
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Intent(intent) => self.apply(intent),
            SessionEvent::Channel { generation, event } => self.on_channel_event(generation, event),
            SessionEvent::TimerFired(timer) => self.on_timer(timer),
        }
    }

    /// Apply one user intent
    pub fn apply(&mut self, intent: Intent) {
        match intent {
            Intent::Open => self.open(),
            Intent::Close => self.close(),
            Intent::SendUserMessage(text) => self.send_user_message(&text),
            Intent::SendQuickAction(prompt) => self.send_quick_action(&prompt),
            Intent::ClearHistory => self.clear_history(),
            Intent::Key(key) => {
                self.handle_key(key);
            }
            Intent::Reconnect => self.reconnect(),
            Intent::Unmount => self.unmount(),
        }
    }

    pub fn open(&mut self) {
        self.is_open = true;
    }

    /// Hide the widget. Pending replies and the channel keep running.
    pub fn close(&mut self) {
        self.is_open = false;
    }

    pub fn toggle(&mut self) {
        self.is_open = !self.is_open;
    }

    /// Escape closes an open widget; platform modifier + `/` toggles it.
    /// Returns whether the key was consumed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.key {
            Key::Escape if self.is_open => {
                self.close();
                true
            }
            Key::Char('/') if key.has_platform_modifier() => {
                self.toggle();
                true
            }
            _ => false,
        }
    }

    /// Append the user's text, forward it to the live channel, and schedule
    /// the assistant reply. Blank input is ignored.
    pub fn send_user_message(&mut self, text: &str) {
        if text.trim().is_empty() || !self.accepts_input() {
            return;
        }

        self.append(Sender::User, text);
        self.composing = true;

        if let Err(e) = self.forward(text) {
            warn!(session = %self.session_id, "Message not delivered: {}", e);
            let notice = self.config.send_failed_notice.clone();
            self.append(Sender::System, notice);
        }

        self.schedule_reply(PendingReply::Live);
    }

    /// Append a canned prompt and schedule its canned reply. Never touches
    /// the live channel.
    pub fn send_quick_action(&mut self, prompt: &str) {
        if prompt.trim().is_empty() || !self.accepts_input() {
            return;
        }

        self.append(Sender::User, prompt);
        self.composing = true;
        self.schedule_reply(PendingReply::QuickAction {
            prompt: prompt.to_string(),
        });
    }

    /// Reset to a fresh welcome message and drop persisted history.
    ///
    /// Replies already scheduled still land afterwards.
    pub fn clear_history(&mut self) {
        if !self.accepts_input() {
            return;
        }
        info!(session = %self.session_id, "Clearing conversation history");

        self.messages.clear();
        self.deps
            .store
            .clear(self.identity.role, &self.identity.user_id);
        let welcome = self.config.welcome_for(&self.identity);
        self.append(Sender::Assistant, welcome);
    }

    /// Replace a closed channel with a fresh one. No-op otherwise.
    pub fn reconnect(&mut self) {
        if !self.accepts_input() || self.channel_state != ChannelState::Closed {
            return;
        }
        self.connect();
    }

    /// Close the channel and cancel pending replies. Idempotent.
    pub fn unmount(&mut self) {
        if self.phase == SessionPhase::Unmounted {
            return;
        }
        info!(session = %self.session_id, pending = self.pending.len(), "Unmounting assistant session");

        for timer in self.pending.keys() {
            self.deps.scheduler.cancel(*timer);
        }
        self.pending.clear();
        self.composing = false;

        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.channel_state = ChannelState::Closed;
        self.phase = SessionPhase::Unmounted;
    }

    /// Resolve a reply timer
    pub fn on_timer(&mut self, timer: TimerId) {
        let Some(reply) = self.pending.remove(&timer) else {
            debug!(session = %self.session_id, %timer, "Ignoring stale timer");
            return;
        };

        let text = match reply {
            PendingReply::Live => self
                .last_inbound
                .clone()
                .unwrap_or_else(|| self.config.offline_reply.clone()),
            PendingReply::QuickAction { prompt } => self.deps.responder.respond(&prompt),
        };
        self.append(Sender::Assistant, text);
        self.composing = !self.pending.is_empty();
    }

    /// Observe a channel transition or inbound payload
    pub fn on_channel_event(&mut self, generation: u64, event: ChannelEvent) {
        if generation != self.generation || self.phase == SessionPhase::Unmounted {
            debug!(session = %self.session_id, generation, "Ignoring event from retired channel");
            return;
        }

        match event {
            ChannelEvent::Opened => {
                debug!(session = %self.session_id, generation, "Channel open");
                self.channel_state = ChannelState::Open;
            }
            // Stashed only; a pending live reply picks it up when its timer fires.
            ChannelEvent::Message(text) => {
                debug!(session = %self.session_id, len = text.len(), "Inbound payload");
                self.last_inbound = Some(text);
            }
            ChannelEvent::Closed { reason } => {
                self.channel_state = ChannelState::Closed;
                match reason {
                    Some(reason) => warn!(
                        session = %self.session_id,
                        "{}",
                        AssistantError::ChannelClosedUnexpectedly(reason)
                    ),
                    None => debug!(session = %self.session_id, "Channel closed"),
                }
            }
        }
    }

    pub fn view(&self) -> ViewModel {
        let user_turns = self.messages.iter().filter(|m| m.is_user()).count();
        let quick_actions = if user_turns <= 1 {
            self.deps.responder.actions_for(self.identity.role)
        } else {
            Vec::new()
        };

        ViewModel {
            is_open: self.is_open,
            messages: self.messages.clone(),
            is_composing: self.composing,
            quick_actions,
            channel_state: self.channel_state,
            phase: self.phase,
        }
    }

    fn accepts_input(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    fn connect(&mut self) {
        if let Some(old) = self.channel.take() {
            old.close();
        }
        self.generation += 1;
        let sink = ChannelSink::new(self.generation, self.events.clone());
        self.channel = Some(self.deps.connector.connect(&self.config.endpoint, sink));
        self.channel_state = ChannelState::Connecting;
        debug!(
            session = %self.session_id,
            endpoint = %self.config.endpoint,
            generation = self.generation,
            "Connecting live channel"
        );
    }

    fn forward(&self, text: &str) -> Result<(), AssistantError> {
        match (&self.channel, self.channel_state) {
            (Some(channel), ChannelState::Open) => channel.send(text),
            _ => Err(AssistantError::ChannelNotOpen),
        }
    }

    fn schedule_reply(&mut self, reply: PendingReply) {
        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        self.pending.insert(timer, reply);
        self.deps
            .scheduler
            .schedule_after(self.config.reply_delay(), timer);
    }

    fn append(&mut self, sender: Sender, text: impl Into<String>) {
        let now = self.deps.clock.now();
        let timestamp = match self.messages.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        let id = self.next_id;
        // Restored logs are checked to leave room, so this only saturates
        // after u64::MAX appends in one session.
        self.next_id = id.next().unwrap_or(id);
        self.messages.push(Message::new(id, sender, text, timestamp));
        self.persist();
    }

    // A lone welcome message is never worth restoring.
    fn persist(&self) {
        if self.messages.len() <= 1 {
            return;
        }
        self.deps
            .store
            .save(self.identity.role, &self.identity.user_id, &self.messages);
    }
}
