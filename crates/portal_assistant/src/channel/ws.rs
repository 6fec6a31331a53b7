//! WebSocket live channel.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::{ChannelEvent, ChannelSink, ChannelState, Connector, LiveChannel, StateCell};
use crate::error::{AssistantError, AssistantResult};

enum Outbound {
    Text(String),
    Close,
}

/// Connects to `ws://` / `wss://` endpoints with tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn connect(&self, endpoint: &str, sink: ChannelSink) -> Box<dyn LiveChannel> {
        Box::new(WsChannel::connect(endpoint, sink))
    }
}

/// Handle to one WebSocket connection.
///
/// A background task owns the socket. Must be created inside a tokio runtime.
pub struct WsChannel {
    endpoint: String,
    cell: StateCell,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl WsChannel {
    pub fn connect(endpoint: &str, sink: ChannelSink) -> Self {
        let cell = StateCell::new();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(endpoint.to_string(), cell.clone(), outbound_rx, sink));
        Self {
            endpoint: endpoint.to_string(),
            cell,
            outbound,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl LiveChannel for WsChannel {
    fn state(&self) -> ChannelState {
        self.cell.get()
    }

    fn send(&self, text: &str) -> AssistantResult<()> {
        if self.cell.get() != ChannelState::Open {
            return Err(AssistantError::ChannelNotOpen);
        }
        self.outbound
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| AssistantError::ChannelNotOpen)
    }

    fn close(&self) {
        if self.cell.get() == ChannelState::Closed {
            return;
        }
        self.cell.reject_sends();
        let _ = self.outbound.send(Outbound::Close);
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    endpoint: String,
    cell: StateCell,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    sink: ChannelSink,
) {
    let connected = tokio::select! {
        result = connect_async(endpoint.as_str()) => result,
        _ = wait_for_close(&mut outbound) => {
            debug!(%endpoint, "Closed while connecting");
            cell.report_closed(&sink, None);
            return;
        }
    };

    let ws = match connected {
        Ok((ws, _)) => ws,
        Err(e) => {
            let err = AssistantError::Connect {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            };
            warn!("{}", err);
            cell.report_closed(&sink, Some(err.to_string()));
            return;
        }
    };

    info!(%endpoint, generation = sink.generation(), "Live channel open");
    cell.mark_open(&sink);

    let (mut writer, mut reader) = ws.split();
    let reason = loop {
        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    debug!(len = text.len(), "Inbound frame");
                    sink.emit(ChannelEvent::Message(text.to_string()));
                }
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => sink.emit(ChannelEvent::Message(text)),
                    Err(_) => debug!("Dropping non UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    break Some(
                        frame
                            .map(|f| format!("remote closed ({}): {}", f.code, f.reason))
                            .unwrap_or_else(|| "remote closed".to_string()),
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break Some("connection ended".to_string()),
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = writer.send(WsMessage::Text(text.into())).await {
                        break Some(e.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = writer.send(WsMessage::Close(None)).await;
                    break None;
                }
            },
        }
    };

    match &reason {
        Some(reason) => debug!(%endpoint, %reason, "Live channel closed"),
        None => debug!(%endpoint, "Live channel closed locally"),
    }
    cell.report_closed(&sink, reason);
}

async fn wait_for_close(outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
    // Sends are rejected until open, so only Close (or a dropped handle) arrives here.
    while let Some(command) = outbound.recv().await {
        if let Outbound::Close = command {
            return;
        }
    }
}
