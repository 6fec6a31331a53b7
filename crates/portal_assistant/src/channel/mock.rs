//! Scripted live channel for tests.
//!
//! [`MockConnector`] records every channel it hands out; tests drive
//! those channels (open, inbound frames, remote drops) and inspect what
//! was sent, without a network.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{ChannelEvent, ChannelSink, ChannelState, Connector, LiveChannel, StateCell};
use crate::error::{AssistantError, AssistantResult};

/// A channel whose transport is the test itself
#[derive(Debug, Clone)]
pub struct MockChannel {
    endpoint: String,
    cell: StateCell,
    sink: ChannelSink,
    sent: Arc<RwLock<Vec<String>>>,
}

impl MockChannel {
    pub fn new(endpoint: impl Into<String>, sink: ChannelSink) -> Self {
        Self {
            endpoint: endpoint.into(),
            cell: StateCell::new(),
            sink,
            sent: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn generation(&self) -> u64 {
        self.sink.generation()
    }

    /// Complete the handshake
    pub fn open(&self) {
        self.cell.mark_open(&self.sink);
    }

    /// Deliver one inbound frame from the "server"
    pub fn push_inbound(&self, text: impl Into<String>) {
        self.sink.emit(ChannelEvent::Message(text.into()));
    }

    /// Simulate the remote side dropping the connection
    pub fn drop_remote(&self, reason: impl Into<String>) {
        self.cell.report_closed(&self.sink, Some(reason.into()));
    }

    /// Frames sent so far
    pub fn sent(&self) -> Vec<String> {
        self.sent.read().clone()
    }
}

impl LiveChannel for MockChannel {
    fn state(&self) -> ChannelState {
        self.cell.get()
    }

    fn send(&self, text: &str) -> AssistantResult<()> {
        if self.cell.get() != ChannelState::Open {
            return Err(AssistantError::ChannelNotOpen);
        }
        self.sent.write().push(text.to_string());
        Ok(())
    }

    fn close(&self) {
        self.cell.report_closed(&self.sink, None);
    }
}

/// Connector handing out [`MockChannel`]s
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    auto_open: bool,
    channels: Arc<RwLock<Vec<MockChannel>>>,
}

impl MockConnector {
    /// Channels stay `Connecting` until the test opens them
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels open as soon as they are created
    pub fn auto_open() -> Self {
        Self {
            auto_open: true,
            ..Self::default()
        }
    }

    /// Number of connect calls made
    pub fn connect_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Most recently created channel
    pub fn latest(&self) -> Option<MockChannel> {
        self.channels.read().last().cloned()
    }

    pub fn channels(&self) -> Vec<MockChannel> {
        self.channels.read().clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, endpoint: &str, sink: ChannelSink) -> Box<dyn LiveChannel> {
        let channel = MockChannel::new(endpoint, sink);
        if self.auto_open {
            channel.open();
        }
        self.channels.write().push(channel.clone());
        Box::new(channel)
    }
}
