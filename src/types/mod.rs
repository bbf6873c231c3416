// src/types/mod.rs - Shared message and ownership types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Core message type that flows from a platform connection into the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    /// Role ids held by the author in the guild the message was sent in
    pub author_roles: Vec<u64>,
    pub guild_id: Option<u64>,
    pub location: ChannelPath,
    pub kind: MessageKind,
    pub content: String,
    /// Message this one replies to, if any
    pub reply_to: Option<u64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChatMessage {
    /// Build a plain guild message; mostly useful for tests and the console platform
    pub fn new(id: u64, author_id: u64, guild_id: u64, channel_id: u64, content: impl Into<String>) -> Self {
        Self {
            id,
            author_id,
            author_name: format!("user{}", author_id),
            author_is_bot: false,
            author_roles: Vec::new(),
            guild_id: Some(guild_id),
            location: ChannelPath {
                thread_id: None,
                channel_id,
                category_id: None,
            },
            kind: MessageKind::Default,
            content: content.into(),
            reply_to: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn has_role(&self, role: u64) -> bool {
        self.author_roles.contains(&role)
    }
}

/// Where a message lives inside a guild. Threads report their parent channel
/// as `channel_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPath {
    pub thread_id: Option<u64>,
    pub channel_id: u64,
    pub category_id: Option<u64>,
}

/// Platform message kinds; only ordinary messages and replies are ever judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Default,
    Reply,
    ThreadCreated,
    MemberJoin,
    Pin,
    Other,
}

impl MessageKind {
    pub fn is_checkable(&self) -> bool {
        matches!(self, MessageKind::Default | MessageKind::Reply)
    }
}

/// Who owns a piece of configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    Guild,
    User,
}

/// Scopes a rule can be attached to, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    Thread,
    Channel,
    Category,
    Guild,
}

impl Container {
    /// Resolution order: thread wins over channel, channel over category,
    /// category over guild
    pub const PRECEDENCE: [Container; 4] = [
        Container::Thread,
        Container::Channel,
        Container::Category,
        Container::Guild,
    ];
}

/// How the bot answers a message that is not toki pona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStrategy {
    /// React with an emoji drawn from the author's reacts
    #[default]
    React,
    /// Delete the message and DM the author a copy
    Delete,
    /// Delete the message and resend it quoted inside a spoiler
    Resend,
}

impl fmt::Display for ResponseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseStrategy::React => "sitelen",
            ResponseStrategy::Delete => "weka",
            ResponseStrategy::Resend => "len",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ResponseStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sitelen" | "sitelen lili" | "react" => Ok(ResponseStrategy::React),
            "weka" | "delete" => Ok(ResponseStrategy::Delete),
            "len" | "resend" => Ok(ResponseStrategy::Resend),
            other => Err(format!("Unknown response strategy: {}", other)),
        }
    }
}
