//! Core types for the assistant conversation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AssistantError;

/// User id used when the signed-in identity has no stable id.
pub const GUEST_USER_ID: &str = "guest";

/// Portal role of the signed-in user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Parent,
    Faculty,
    Admin,
}

impl Role {
    /// All roles, in menu order
    pub const ALL: [Role; 4] = [Role::Student, Role::Parent, Role::Faculty, Role::Admin];

    /// Stable lowercase name, also used in storage keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Parent => "parent",
            Self::Faculty => "faculty",
            Self::Admin => "admin",
        }
    }

    /// Get the display name for this role
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Student => "Student",
            Self::Parent => "Parent",
            Self::Faculty => "Faculty",
            Self::Admin => "Administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "parent" => Ok(Self::Parent),
            "faculty" => Ok(Self::Faculty),
            "admin" => Ok(Self::Admin),
            other => Err(AssistantError::Config(format!("unknown role: {}", other))),
        }
    }
}

/// Who a conversation belongs to.
///
/// Passed explicitly into the session manager; the pair (`role`, `user_id`)
/// identifies the persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub role: Role,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl Identity {
    /// Create an identity, falling back to [`GUEST_USER_ID`] when no usable id is known
    pub fn new(role: Role, user_id: Option<&str>, display_name: impl Into<String>) -> Self {
        let user_id = user_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(GUEST_USER_ID)
            .to_string();

        Self {
            role,
            user_id,
            display_name: display_name.into(),
        }
    }

    /// Identity of an anonymous user for the given role
    pub fn guest(role: Role) -> Self {
        Self::new(role, None, role.display_name())
    }
}

/// Producer of a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
    /// Notices generated by the session itself, such as a failed send
    System,
}

/// Position of a message in its conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// The following id, or `None` once the id space is exhausted
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    /// When the message was appended to the log
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(id: MessageId, sender: Sender, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.into(),
            sender,
            timestamp,
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }
}

/// Keys the session reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
    Char(char),
}

/// A global key press forwarded by the presentation shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    /// Control key held
    pub ctrl: bool,
    /// Command / super key held
    pub meta: bool,
}

impl KeyEvent {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            meta: false,
        }
    }

    pub fn escape() -> Self {
        Self::plain(Key::Escape)
    }

    pub fn ctrl(c: char) -> Self {
        Self {
            key: Key::Char(c),
            ctrl: true,
            meta: false,
        }
    }

    pub fn meta(c: char) -> Self {
        Self {
            key: Key::Char(c),
            ctrl: false,
            meta: true,
        }
    }

    /// Control on Linux/Windows, command on macOS; either counts
    pub fn has_platform_modifier(&self) -> bool {
        self.ctrl || self.meta
    }
}
