//! # portal_assistant - Campus Portal Assistant Core
//!
//! This crate provides the messaging core behind the portal's chat widget:
//! - A live bidirectional channel to the remote assistant endpoint
//! - Role-specific quick actions with canned replies
//! - Conversation history persisted per (role, user) identity
//! - A session state machine that arbitrates between all of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐  intents   ┌─────────────────┐  view model  ┌─────────────────┐
//! │ Presentation    │───────────▶│ SessionRuntime  │─────────────▶│ Presentation    │
//! │ Shell           │            │ (tokio task)    │   (watch)    │ Shell           │
//! └─────────────────┘            └────────┬────────┘              └─────────────────┘
//!                                         │
//!                                         ▼
//!                                ┌─────────────────┐
//!                                │ SessionManager  │
//!                                └────────┬────────┘
//!         ┌───────────────────────┬───────┴───────────────┬───────────────────────┐
//!         ▼                       ▼                       ▼                       ▼
//! ┌───────────────┐      ┌───────────────┐       ┌───────────────┐       ┌───────────────┐
//! │ Conversation  │      │ QuickAction   │       │ LiveChannel   │       │ Scheduler /   │
//! │ Store         │      │ Responder     │       │ (WebSocket)   │       │ Clock         │
//! └───────────────┘      └───────────────┘       └───────────────┘       └───────────────┘
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod persistence;
pub mod quick_actions;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod types;

pub use channel::{
    ChannelEvent, ChannelSink, ChannelState, Connector, LiveChannel, MockChannel, MockConnector,
    WsChannel, WsConnector,
};
pub use config::*;
pub use error::*;
pub use persistence::*;
pub use quick_actions::*;
pub use runtime::*;
pub use scheduler::*;
pub use session::*;
pub use types::*;
