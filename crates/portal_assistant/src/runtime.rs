//! Session runtime - async driver for the session manager.
//!
//! One tokio task owns each [`SessionManager`]. Intents from the shell,
//! channel events and timer firings all go through the same queue, so the
//! manager sees them strictly one at a time. After every event the view
//! model is republished on a `watch` channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::channel::{Connector, WsConnector};
use crate::config::AssistantConfig;
use crate::error::{AssistantError, AssistantResult};
use crate::persistence::ConversationStore;
use crate::quick_actions::QuickActionResponder;
use crate::scheduler::{Clock, SystemClock, TokioScheduler};
use crate::session::{Intent, SessionDeps, SessionEvent, SessionManager, SessionPhase, ViewModel};
use crate::types::{Identity, KeyEvent};

/// Builds and mounts sessions
#[derive(Clone)]
pub struct SessionRuntime {
    config: AssistantConfig,
    store: ConversationStore,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    responder: QuickActionResponder,
}

impl SessionRuntime {
    /// Runtime with a websocket connector. Conversations are kept on disk
    /// when `storage_dir` is configured, in memory otherwise.
    pub fn new(config: AssistantConfig) -> Self {
        let store = match &config.storage_dir {
            Some(dir) => ConversationStore::on_disk(dir),
            None => ConversationStore::in_memory(),
        };
        Self {
            config,
            store,
            connector: Arc::new(WsConnector::new()),
            clock: Arc::new(SystemClock),
            responder: QuickActionResponder::new(),
        }
    }

    pub fn with_store(mut self, store: ConversationStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Mount a session for `identity` and start driving it.
    ///
    /// History is loaded before this returns, so the first published view
    /// is already `Ready`. Must be called inside a tokio runtime.
    pub fn mount(&self, identity: Identity) -> SessionHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let deps = SessionDeps {
            store: self.store.clone(),
            connector: Arc::clone(&self.connector),
            scheduler: Arc::new(TokioScheduler::new(events_tx.clone())),
            clock: Arc::clone(&self.clock),
            responder: self.responder.clone(),
        };

        let mut manager = SessionManager::new(identity, self.config.clone(), deps, events_tx.clone());
        manager.mount();
        let session_id = manager.session_id();

        let (view_tx, view_rx) = watch::channel(manager.view());
        let task = tokio::spawn(run(manager, events_rx, view_tx));

        SessionHandle {
            session_id,
            events: events_tx,
            view: view_rx,
            task: Some(task),
        }
    }
}

async fn run(
    mut manager: SessionManager,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    view: watch::Sender<ViewModel>,
) {
    while let Some(event) = events.recv().await {
        manager.handle(event);

        let next = manager.view();
        view.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        if manager.phase() == SessionPhase::Unmounted {
            break;
        }
    }
    debug!(session = %manager.session_id(), "Session task finished");
}

/// Shell-side handle to a mounted session.
///
/// Dropping the handle unmounts the session.
pub struct SessionHandle {
    session_id: Uuid,
    events: mpsc::UnboundedSender<SessionEvent>,
    view: watch::Receiver<ViewModel>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Queue an intent. Fails with `SessionClosed` once the session is gone.
    pub fn send(&self, intent: Intent) -> AssistantResult<()> {
        self.events
            .send(SessionEvent::Intent(intent))
            .map_err(|_| AssistantError::SessionClosed)
    }

    pub fn open(&self) -> AssistantResult<()> {
        self.send(Intent::Open)
    }

    pub fn close(&self) -> AssistantResult<()> {
        self.send(Intent::Close)
    }

    pub fn send_user_message(&self, text: impl Into<String>) -> AssistantResult<()> {
        self.send(Intent::SendUserMessage(text.into()))
    }

    pub fn send_quick_action(&self, prompt: impl Into<String>) -> AssistantResult<()> {
        self.send(Intent::SendQuickAction(prompt.into()))
    }

    pub fn clear_history(&self) -> AssistantResult<()> {
        self.send(Intent::ClearHistory)
    }

    pub fn key(&self, key: KeyEvent) -> AssistantResult<()> {
        self.send(Intent::Key(key))
    }

    pub fn reconnect(&self) -> AssistantResult<()> {
        self.send(Intent::Reconnect)
    }

    /// Latest published view model
    pub fn view(&self) -> ViewModel {
        self.view.borrow().clone()
    }

    /// Wait for the next view model change
    pub async fn changed(&mut self) -> AssistantResult<ViewModel> {
        self.view
            .changed()
            .await
            .map_err(|_| AssistantError::SessionClosed)?;
        Ok(self.view.borrow_and_update().clone())
    }

    /// Wait until the view model satisfies `predicate`
    pub async fn wait_until(
        &mut self,
        predicate: impl FnMut(&ViewModel) -> bool,
    ) -> AssistantResult<ViewModel> {
        self.view
            .wait_for(predicate)
            .await
            .map(|view| view.clone())
            .map_err(|_| AssistantError::SessionClosed)
    }

    /// Independent view subscription, for renderers running elsewhere
    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.view.clone()
    }

    /// Close the channel, cancel pending replies, and wait for the session
    /// task to stop.
    pub async fn unmount(mut self) {
        let _ = self.send(Intent::Unmount);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.events.send(SessionEvent::Intent(Intent::Unmount));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelState, LiveChannel, MockConnector};
    use crate::types::{Role, Sender};
    use std::time::Duration;

    fn runtime(connector: &MockConnector) -> SessionRuntime {
        SessionRuntime::new(AssistantConfig::default().reply_delay_ms(20))
            .with_connector(Arc::new(connector.clone()))
    }

    async fn settle<T>(fut: impl std::future::Future<Output = T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), fut)
            .await
            .expect("session did not settle")
    }

    #[tokio::test]
    async fn test_mount_publishes_ready_view() {
        let connector = MockConnector::auto_open();
        let mut handle = runtime(&connector).mount(Identity::guest(Role::Student));

        let view = handle.view();
        assert_eq!(view.phase, SessionPhase::Ready);
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.quick_actions.len(), 4);

        let view = settle(handle.wait_until(|v| v.channel_state == ChannelState::Open))
            .await
            .unwrap();
        assert!(!view.is_open);
    }

    #[tokio::test]
    async fn test_user_message_round_trip() {
        let connector = MockConnector::auto_open();
        let mut handle = runtime(&connector).mount(Identity::new(Role::Parent, Some("p-7"), "Pat"));
        settle(handle.wait_until(|v| v.channel_state == ChannelState::Open))
            .await
            .unwrap();

        connector.latest().unwrap().push_inbound("Report cards go out Friday.");
        handle.send_user_message("When are report cards?").unwrap();

        let view = settle(handle.wait_until(|v| v.messages.len() == 3 && !v.is_composing))
            .await
            .unwrap();
        assert_eq!(view.messages[1].sender, Sender::User);
        assert_eq!(view.messages[2].text, "Report cards go out Friday.");
        assert_eq!(
            connector.latest().unwrap().sent(),
            vec!["When are report cards?".to_string()]
        );
    }

    #[tokio::test]
    async fn test_open_and_close_intents() {
        let connector = MockConnector::auto_open();
        let mut handle = runtime(&connector).mount(Identity::guest(Role::Admin));

        handle.open().unwrap();
        settle(handle.wait_until(|v| v.is_open)).await.unwrap();

        handle.key(KeyEvent::escape()).unwrap();
        settle(handle.wait_until(|v| !v.is_open)).await.unwrap();
    }

    #[tokio::test]
    async fn test_unmount_closes_channel_and_session() {
        let connector = MockConnector::auto_open();
        let handle = runtime(&connector).mount(Identity::guest(Role::Student));
        let mut view = handle.subscribe();

        handle.send_quick_action("Show my grades").unwrap();
        settle(handle.unmount()).await;

        assert_eq!(connector.latest().unwrap().state(), ChannelState::Closed);
        assert_eq!(view.borrow_and_update().phase, SessionPhase::Unmounted);
        assert!(view.changed().await.is_err());
    }

    #[tokio::test]
    async fn test_intents_after_unmount_fail() {
        let connector = MockConnector::auto_open();
        let mut handle = runtime(&connector).mount(Identity::guest(Role::Student));

        handle.send(Intent::Unmount).unwrap();
        settle(handle.wait_until(|v| v.phase == SessionPhase::Unmounted))
            .await
            .unwrap();
        assert!(matches!(
            settle(handle.changed()).await,
            Err(AssistantError::SessionClosed)
        ));
        assert!(matches!(handle.open(), Err(AssistantError::SessionClosed)));
    }
}
