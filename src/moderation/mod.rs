// src/moderation/mod.rs - Carries out the response to a message that is not toki pona

use anyhow::Result;
use log::{debug, error, warn};
use rand::seq::IndexedRandom;
use std::sync::Arc;

use crate::config::ModerationSettings;
use crate::platforms::{OutgoingMessage, PlatformConnection, PlatformError};
use crate::store::ConfigStore;
use crate::types::{ChatMessage, Owner, ResponseStrategy};

pub mod format;

use format::{chunk_response, delete_dm, prep_msg_for_resend, react_error_dm, CHUNK_SIZE};

/// What happened to a moderated message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationOutcome {
    Reacted(String),
    Deleted,
    Resent,
    /// The message was already gone
    Vanished,
    /// Nothing could be done; the reason was logged
    Failed,
}

pub struct Moderator {
    platform: Arc<dyn PlatformConnection>,
    store: Arc<dyn ConfigStore>,
    settings: ModerationSettings,
}

impl Moderator {
    pub fn new(platform: Arc<dyn PlatformConnection>, store: Arc<dyn ConfigStore>, settings: ModerationSettings) -> Self {
        Self {
            platform,
            store,
            settings,
        }
    }

    /// Respond the way the author asked to be corrected
    pub async fn respond(&self, message: &ChatMessage) -> Result<ModerationOutcome> {
        let user = self.store.entity(Owner::User, message.author_id).await?;
        debug!("Responding to message {} with {}", message.id, user.response);
        match user.response {
            ResponseStrategy::React => self.react_message(message).await,
            ResponseStrategy::Delete => Ok(self.delete_message(message, true).await),
            ResponseStrategy::Resend => Ok(self.resend_message(message).await),
        }
    }

    async fn reacts_for(&self, author_id: u64) -> Result<Vec<String>> {
        let user = self.store.entity(Owner::User, author_id).await?;
        if user.reacts.is_empty() {
            Ok(self.settings.default_reacts.clone())
        } else {
            Ok(user.reacts)
        }
    }

    /// React with a random pick from the author's reacts. A react the platform
    /// rejects is dropped from the author's list and another is tried; a
    /// permission failure falls back to resending.
    pub async fn react_message(&self, message: &ChatMessage) -> Result<ModerationOutcome> {
        for _ in 0..self.settings.react_attempts {
            let reacts = self.reacts_for(message.author_id).await?;
            let react = {
                let mut rng = rand::rng();
                reacts.choose(&mut rng).cloned()
            };
            let Some(react) = react else {
                break;
            };

            match self.platform.add_reaction(message, &react).await {
                Ok(()) => {
                    debug!("Reacted {} to user message", react);
                    return Ok(ModerationOutcome::Reacted(react));
                }
                Err(PlatformError::Forbidden(reason)) => {
                    warn!("Couldn't react to user message; disallowed ({}). Resending instead", reason);
                    return Ok(self.resend_message(message).await);
                }
                Err(PlatformError::NotFound(reason)) => {
                    warn!("Couldn't react to user message; not found ({})", reason);
                    return Ok(ModerationOutcome::Vanished);
                }
                Err(PlatformError::Closed) => {
                    error!("Couldn't react to user message; connection closed");
                    return Ok(ModerationOutcome::Failed);
                }
                Err(PlatformError::Http { code, text }) => {
                    warn!("Couldn't react {} to user {} ({} {})", react, message.author_name, code, text);
                    self.direct_message(message.author_id, &react_error_dm(&message.content, &react)).await;
                    self.store.delete_react(Owner::User, message.author_id, &react).await?;
                }
            }
        }

        warn!("Gave up reacting to message {} after {} attempts", message.id, self.settings.react_attempts);
        Ok(ModerationOutcome::Failed)
    }

    pub async fn delete_message(&self, message: &ChatMessage, dm: bool) -> ModerationOutcome {
        debug!("Deleting user message");
        match self.platform.delete_message(message).await {
            Ok(()) => {
                if dm {
                    self.direct_message(message.author_id, &delete_dm(&message.content)).await;
                }
                ModerationOutcome::Deleted
            }
            Err(PlatformError::NotFound(_)) => {
                warn!("Couldn't delete message; not found");
                ModerationOutcome::Vanished
            }
            Err(e) => {
                log_failure("delete message", &e);
                ModerationOutcome::Failed
            }
        }
    }

    /// Delete, then post a spoilered quote in the same place. The author is
    /// credited but not pinged.
    pub async fn resend_message(&self, message: &ChatMessage) -> ModerationOutcome {
        let reply = prep_msg_for_resend(&message.content, message.author_id);
        // resending replaces the DM
        self.delete_message(message, false).await;

        let outgoing = OutgoingMessage {
            channel_id: message.location.thread_id.unwrap_or(message.location.channel_id),
            content: reply,
            reply_to: message.reply_to,
            suppress_mentions: true,
        };
        match self.platform.send_message(outgoing).await {
            Ok(id) => {
                debug!("Resent message {} as {}", message.id, id);
                ModerationOutcome::Resent
            }
            Err(e) => {
                log_failure("re-send message", &e);
                ModerationOutcome::Failed
            }
        }
    }

    /// The bot's own reaction on `message`, if any
    pub async fn own_react(&self, message: &ChatMessage) -> Option<String> {
        match self.platform.own_reactions(message).await {
            Ok(reacts) => reacts.into_iter().next(),
            Err(e) => {
                debug!("Couldn't read reactions on message {}: {}", message.id, e);
                None
            }
        }
    }

    pub async fn remove_react(&self, message: &ChatMessage, react: &str) {
        if let Err(e) = self.platform.remove_own_reaction(message, react).await {
            log_failure("remove reaction", &e);
        }
    }

    async fn direct_message(&self, user_id: u64, content: &str) {
        for chunk in chunk_response(content, CHUNK_SIZE) {
            if let Err(e) = self.platform.send_direct_message(user_id, &chunk).await {
                log_failure("DM user", &e);
                return;
            }
        }
    }
}

/// Expected platform refusals are warnings; anything else is an error
fn log_failure(action: &str, e: &PlatformError) {
    match e {
        PlatformError::Forbidden(_) => warn!("Couldn't {}; disallowed", action),
        PlatformError::NotFound(_) => warn!("Couldn't {}; not found", action),
        PlatformError::Http { code, text } => {
            error!("Couldn't {}; reason unknown", action);
            error!("Error code: {}", code);
            error!("Error text: {}", text);
        }
        PlatformError::Closed => error!("Couldn't {}; connection closed", action),
    }
}
