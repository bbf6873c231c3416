use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::types::ChatMessage;

pub mod console;

/// Failures a platform reports back for a single action
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// Missing permissions, or the target blocks the bot
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The message, user or emoji no longer exists
    #[error("not found: {0}")]
    NotFound(String),
    #[error("HTTP {code}: {text}")]
    Http { code: u16, text: String },
    #[error("connection closed")]
    Closed,
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Something that happened on the platform that the bot may react to
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    MessageCreated(ChatMessage),
    /// `before` is absent when the platform no longer had the old version cached
    MessageEdited {
        before: Option<ChatMessage>,
        after: ChatMessage,
    },
}

/// A message the bot sends into a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub channel_id: u64,
    pub content: String,
    pub reply_to: Option<u64>,
    /// Render mentions without notifying anyone
    pub suppress_mentions: bool,
}

/// Trait defining the interface all platform connections must implement
#[async_trait]
pub trait PlatformConnection: Send + Sync {
    /// Connect to the platform and start receiving events
    async fn connect(&mut self) -> Result<()>;

    /// Get the platform identifier (e.g., "discord", "console")
    fn platform_name(&self) -> &str;

    async fn is_connected(&self) -> bool;

    /// Get a receiver for incoming events. The stream closes when the
    /// platform stops producing events.
    fn get_event_receiver(&self) -> Option<broadcast::Receiver<PlatformEvent>>;

    async fn add_reaction(&self, message: &ChatMessage, emoji: &str) -> PlatformResult<()>;

    async fn remove_own_reaction(&self, message: &ChatMessage, emoji: &str) -> PlatformResult<()>;

    /// Reactions the bot itself currently has on `message`
    async fn own_reactions(&self, message: &ChatMessage) -> PlatformResult<Vec<String>>;

    async fn delete_message(&self, message: &ChatMessage) -> PlatformResult<()>;

    /// Returns the id of the sent message
    async fn send_message(&self, message: OutgoingMessage) -> PlatformResult<u64>;

    async fn send_direct_message(&self, user_id: u64, content: &str) -> PlatformResult<()>;

    /// Gracefully disconnect
    async fn disconnect(&self) -> Result<()>;
}
