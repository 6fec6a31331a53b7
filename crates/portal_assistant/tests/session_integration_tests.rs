//! Integration tests for the assistant session core.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use portal_assistant::{
    AssistantConfig, ChannelState, ConversationStore, Identity, ManualScheduler, MockConnector,
    QuickActionResponder, Role, Sender, SessionDeps, SessionEvent, SessionManager, SessionPhase,
    SessionRuntime, KeyEvent, GUEST_USER_ID,
};

const DELAY: Duration = Duration::from_millis(1500);

struct Session {
    manager: SessionManager,
    scheduler: Arc<ManualScheduler>,
    connector: MockConnector,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Session {
    fn mount(identity: Identity, store: &ConversationStore, connector: MockConnector) -> Self {
        let scheduler = Arc::new(ManualScheduler::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let deps = SessionDeps {
            store: store.clone(),
            connector: Arc::new(connector.clone()),
            scheduler: scheduler.clone(),
            clock: scheduler.clone(),
            responder: QuickActionResponder::new(),
        };
        let mut manager = SessionManager::new(identity, AssistantConfig::default(), deps, tx);
        manager.mount();

        let mut session = Self {
            manager,
            scheduler,
            connector,
            rx,
        };
        session.pump();
        session
    }

    fn pump(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.manager.handle(event);
        }
    }

    fn advance(&mut self, by: Duration) {
        self.pump();
        let manager = &mut self.manager;
        self.scheduler.advance_with(by, |timer| manager.on_timer(timer));
    }

    fn count(&self, sender: Sender) -> usize {
        self.manager
            .messages()
            .iter()
            .filter(|m| m.sender == sender)
            .count()
    }
}

fn student() -> Identity {
    Identity::new(Role::Student, Some("s-100"), "Alex")
}

#[test]
fn test_fresh_student_scenario() {
    let store = ConversationStore::in_memory();
    let mut session = Session::mount(student(), &store, MockConnector::auto_open());
    session.manager.open();

    let view = session.manager.view();
    assert!(view.is_open);
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].sender, Sender::Assistant);
    assert_eq!(
        view.quick_actions,
        vec![
            "Show my grades",
            "Check attendance",
            "Upcoming assignments",
            "Fee payment status"
        ]
    );
}

#[test]
fn test_every_user_message_gets_one_reply() {
    let store = ConversationStore::in_memory();
    let mut session = Session::mount(student(), &store, MockConnector::auto_open());

    for text in ["first", "second", "third"] {
        session.manager.send_user_message(text);
    }
    assert_eq!(session.count(Sender::User), 3);
    assert_eq!(session.count(Sender::Assistant), 1);

    session.advance(DELAY);
    assert_eq!(session.count(Sender::Assistant), 4);
    assert!(!session.manager.is_composing());
}

#[test]
fn test_concurrent_sends_resolve_to_four_messages() {
    let store = ConversationStore::in_memory();
    let mut session = Session::mount(student(), &store, MockConnector::auto_open());

    session.manager.send_user_message("a");
    session.manager.send_user_message("b");
    session.advance(DELAY);

    // welcome + 2 user + 2 assistant
    assert_eq!(session.manager.messages().len(), 5);
    assert_eq!(session.count(Sender::User), 2);
}

#[test]
fn test_quick_action_ignores_channel_state() {
    let store = ConversationStore::in_memory();
    let mut session = Session::mount(student(), &store, MockConnector::auto_open());
    session.connector.latest().unwrap().drop_remote("gone");
    session.pump();
    assert_eq!(session.manager.channel_state(), ChannelState::Closed);

    session.manager.send_quick_action("Show my grades");
    session.advance(DELAY);

    let last = session.manager.messages().last().unwrap();
    assert_eq!(last.sender, Sender::Assistant);
    assert_eq!(last.text, QuickActionResponder::new().respond("Show my grades"));
    assert_eq!(session.count(Sender::System), 0);
}

#[test]
fn test_send_on_closed_channel_still_resolves() {
    let store = ConversationStore::in_memory();
    let mut session = Session::mount(student(), &store, MockConnector::auto_open());
    let channel = session.connector.latest().unwrap();

    channel.push_inbound("stale answer");
    channel.drop_remote("network down");
    session.pump();

    session.manager.send_user_message("hello");
    assert_eq!(session.count(Sender::System), 1);
    assert!(session.manager.is_composing());

    session.advance(DELAY);
    assert!(!session.manager.is_composing());
    assert_eq!(
        session.manager.messages().last().unwrap().text,
        "stale answer"
    );
}

#[test]
fn test_history_survives_remount_on_disk() {
    let dir = tempdir().unwrap();
    let store = ConversationStore::on_disk(dir.path());

    {
        let mut session = Session::mount(student(), &store, MockConnector::auto_open());
        session.manager.send_quick_action("Check attendance");
        session.advance(DELAY);
        session.manager.unmount();
    }

    let reopened = Session::mount(student(), &ConversationStore::on_disk(dir.path()), MockConnector::auto_open());
    let texts: Vec<&str> = reopened
        .manager
        .messages()
        .iter()
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[1], "Check attendance");
}

#[test]
fn test_identities_are_isolated() {
    let store = ConversationStore::in_memory();
    {
        let mut parent = Session::mount(
            Identity::new(Role::Parent, Some("shared-id"), "Pat"),
            &store,
            MockConnector::auto_open(),
        );
        parent.manager.send_quick_action("Fee due dates");
        parent.advance(DELAY);
    }

    let admin = Session::mount(
        Identity::new(Role::Admin, Some("shared-id"), "Ada"),
        &store,
        MockConnector::auto_open(),
    );
    assert_eq!(admin.manager.messages().len(), 1);
    assert!(store.load(Role::Admin, "shared-id").is_empty());
    assert_eq!(store.load(Role::Parent, "shared-id").len(), 3);
}

#[test]
fn test_clear_history_then_remount_shows_only_welcome() {
    let store = ConversationStore::in_memory();
    {
        let mut session = Session::mount(student(), &store, MockConnector::auto_open());
        session.manager.send_user_message("something private");
        session.advance(DELAY);
        session.manager.clear_history();
        assert_eq!(session.manager.messages().len(), 1);
    }

    let reopened = Session::mount(student(), &store, MockConnector::auto_open());
    let messages = reopened.manager.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, Sender::Assistant);
    assert!(!messages[0].text.contains("something private"));
}

#[test]
fn test_guest_fallback_identity() {
    let store = ConversationStore::in_memory();
    let mut session = Session::mount(
        Identity::new(Role::Faculty, None, "Visitor"),
        &store,
        MockConnector::auto_open(),
    );
    assert_eq!(session.manager.identity().user_id, GUEST_USER_ID);
    assert!(session.manager.view().quick_actions.is_empty());

    session.manager.send_user_message("hi");
    session.advance(DELAY);
    assert_eq!(store.load(Role::Faculty, GUEST_USER_ID).len(), 3);
}

#[test]
fn test_escape_only_closes_open_widget() {
    let store = ConversationStore::in_memory();
    let mut session = Session::mount(student(), &store, MockConnector::auto_open());

    session.manager.handle_key(KeyEvent::escape());
    assert!(!session.manager.is_open());

    session.manager.open();
    session.manager.handle_key(KeyEvent::escape());
    assert!(!session.manager.is_open());
}

#[test]
fn test_unmount_is_final() {
    let store = ConversationStore::in_memory();
    let mut session = Session::mount(student(), &store, MockConnector::auto_open());
    session.manager.send_quick_action("Show my grades");
    session.manager.unmount();

    session.advance(DELAY * 3);
    assert_eq!(session.manager.phase(), SessionPhase::Unmounted);
    assert_eq!(session.manager.messages().len(), 2);
    assert_eq!(session.manager.pending_replies(), 0);
}

/// Server that answers every text frame with a fixed prefix.
async fn spawn_assistant_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(frame)) = ws.next().await {
                    if let WsMessage::Text(text) = frame {
                        let reply = format!("assistant says: {}", text);
                        if ws.send(WsMessage::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });
    format!("ws://{}/chat", addr)
}

#[tokio::test]
async fn test_websocket_end_to_end() {
    let endpoint = spawn_assistant_server().await;
    let dir = tempdir().unwrap();
    let config = AssistantConfig::default()
        .endpoint(endpoint)
        .reply_delay_ms(200)
        .storage_dir(dir.path());

    let runtime = SessionRuntime::new(config);
    let mut handle = runtime.mount(student());

    tokio::time::timeout(
        Duration::from_secs(5),
        handle.wait_until(|v| v.channel_state == ChannelState::Open),
    )
    .await
    .expect("channel never opened")
    .unwrap();

    handle.send_user_message("what is due tomorrow?").unwrap();
    let view = tokio::time::timeout(
        Duration::from_secs(5),
        handle.wait_until(|v| v.messages.len() == 3),
    )
    .await
    .expect("reply never arrived")
    .unwrap();

    assert_eq!(view.messages[2].sender, Sender::Assistant);
    assert_eq!(view.messages[2].text, "assistant says: what is due tomorrow?");

    handle.unmount().await;
    assert_eq!(runtime.store().load(Role::Student, "s-100").len(), 3);
}
