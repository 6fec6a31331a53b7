//! Live channel to the remote assistant endpoint.
//!
//! A [`Connector`] hands back a [`LiveChannel`] immediately in the
//! `Connecting` state; everything that happens afterwards (open, inbound
//! frames, close) is reported as [`ChannelEvent`]s through a
//! [`ChannelSink`]. Payloads are opaque UTF-8 text in both directions.
//!
//! Channels never reconnect on their own. A closed channel stays closed
//! and a fresh one must be obtained from the connector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::AssistantResult;
use crate::session::SessionEvent;

pub mod mock;
pub mod ws;

pub use mock::{MockChannel, MockConnector};
pub use ws::{WsChannel, WsConnector};

/// Connection state as seen by the adapter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// Something that happened on a live channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    /// One inbound frame
    Message(String),
    /// Delivered once per channel. `reason` is `None` for a local close.
    Closed { reason: Option<String> },
}

/// Delivers channel events into a session queue, tagged with the
/// generation of the channel that produced them.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    generation: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new(generation: u64, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { generation, events }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: ChannelEvent) {
        // A dropped receiver means the session is gone; nothing to notify.
        let _ = self.events.send(SessionEvent::Channel {
            generation: self.generation,
            event,
        });
    }
}

/// An open (or opening) connection owned by the adapter
pub trait LiveChannel: Send {
    fn state(&self) -> ChannelState;

    /// Transmit one text frame. Fails with `ChannelNotOpen` unless open.
    fn send(&self, text: &str) -> AssistantResult<()>;

    /// Close the channel. Closing a closed channel is a no-op.
    fn close(&self);
}

/// Factory for live channels
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &str, sink: ChannelSink) -> Box<dyn LiveChannel>;
}

/// State shared between a channel handle and whatever drives it.
///
/// Guarantees the `Closed` event is reported at most once.
#[derive(Debug, Clone)]
pub(crate) struct StateCell {
    state: Arc<RwLock<ChannelState>>,
    close_reported: Arc<AtomicBool>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ChannelState::Connecting)),
            close_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn get(&self) -> ChannelState {
        *self.state.read()
    }

    /// Connecting -> Open. Returns false if the channel was closed first.
    pub(crate) fn mark_open(&self, sink: &ChannelSink) -> bool {
        let mut state = self.state.write();
        if *state != ChannelState::Connecting {
            return false;
        }
        *state = ChannelState::Open;
        drop(state);
        sink.emit(ChannelEvent::Opened);
        true
    }

    /// Stop accepting sends without reporting anything yet
    pub(crate) fn reject_sends(&self) {
        *self.state.write() = ChannelState::Closed;
    }

    /// Move to Closed and report it, unless already reported.
    pub(crate) fn report_closed(&self, sink: &ChannelSink, reason: Option<String>) {
        *self.state.write() = ChannelState::Closed;
        if !self.close_reported.swap(true, Ordering::SeqCst) {
            sink.emit(ChannelEvent::Closed { reason });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        while let Ok(SessionEvent::Channel { event, .. }) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_close_reported_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(1, tx);
        let cell = StateCell::new();

        assert!(cell.mark_open(&sink));
        cell.report_closed(&sink, Some("reset".to_string()));
        cell.report_closed(&sink, None);

        assert_eq!(
            drain(&mut rx),
            vec![
                ChannelEvent::Opened,
                ChannelEvent::Closed {
                    reason: Some("reset".to_string())
                },
            ]
        );
        assert_eq!(cell.get(), ChannelState::Closed);
    }

    #[test]
    fn test_no_open_after_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(3, tx);
        let cell = StateCell::new();

        cell.reject_sends();
        assert!(!cell.mark_open(&sink));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        ChannelSink::new(9, tx).emit(ChannelEvent::Message("hi".to_string()));

        match rx.try_recv() {
            Ok(SessionEvent::Channel { generation, event }) => {
                assert_eq!(generation, 9);
                assert_eq!(event, ChannelEvent::Message("hi".to_string()));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
