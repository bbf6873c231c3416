use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::moderation::{ModerationOutcome, Moderator};
use crate::platforms::PlatformEvent;
use crate::rules::Gate;
use crate::types::ChatMessage;

/// What an edit led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Valid before, invalid now
    Responded(ModerationOutcome),
    /// Invalid before, valid now; the bot's reaction was taken back
    Unreacted(String),
    Unchanged,
}

/// Core bot engine: feeds platform events through the gate and the moderator
pub struct TenpoBot {
    gate: Arc<Gate>,
    moderator: Arc<Moderator>,
}

impl TenpoBot {
    pub fn new(gate: Arc<Gate>, moderator: Arc<Moderator>) -> Self {
        Self { gate, moderator }
    }

    pub async fn handle_message(&self, message: &ChatMessage) -> Result<Option<ModerationOutcome>> {
        if !self.gate.should_respond(message).await? {
            return Ok(None);
        }
        info!("Message {} from {} is not toki pona", message.id, message.author_name);
        Ok(Some(self.moderator.respond(message).await?))
    }

    /// Compare "the bot had reacted" with "the bot would respond now"
    pub async fn handle_edit(&self, before: Option<&ChatMessage>, after: &ChatMessage) -> Result<EditOutcome> {
        if before.is_some_and(|b| b.content == after.content) {
            debug!("Ignoring edit of message {}; content unchanged", after.id);
            return Ok(EditOutcome::Unchanged);
        }

        let reacted = self.moderator.own_react(after).await;
        let should_respond = self.gate.should_respond(after).await?;

        match (reacted, should_respond) {
            (None, true) => {
                info!("Edited message {} is no longer toki pona", after.id);
                Ok(EditOutcome::Responded(self.moderator.respond(after).await?))
            }
            (Some(react), false) => {
                info!("Edited message {} is toki pona now", after.id);
                self.moderator.remove_react(after, &react).await;
                Ok(EditOutcome::Unreacted(react))
            }
            _ => Ok(EditOutcome::Unchanged),
        }
    }

    async fn handle_event(&self, event: PlatformEvent) -> Result<()> {
        match event {
            PlatformEvent::MessageCreated(message) => {
                self.handle_message(&message).await?;
            }
            PlatformEvent::MessageEdited { before, after } => {
                self.handle_edit(before.as_ref(), &after).await?;
            }
        }
        Ok(())
    }

    /// Process events until the platform closes its stream. Each event gets
    /// its own task; in-flight tasks are awaited before returning.
    pub async fn run(self: Arc<Self>, mut receiver: broadcast::Receiver<PlatformEvent>) -> Result<()> {
        info!("Starting tenpo bot...");
        let mut tasks = JoinSet::new();

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let bot = Arc::clone(&self);
                    tasks.spawn(async move {
                        if let Err(e) = bot.handle_event(event).await {
                            error!("Failed to handle event: {:#}", e);
                        }
                    });
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event receiver lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event receiver closed");
                    break;
                }
            }

            // reap finished tasks so the set stays small
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!("Event task panicked: {}", e);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Event task panicked: {}", e);
            }
        }
        info!("Tenpo bot stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classifier, Dictionary, Threshold, Tier};
    use crate::config::ModerationSettings;
    use crate::moderation::tests::RecordingPlatform;
    use crate::store::{ConfigStore, MemoryStore};
    use crate::types::{Container, Owner};

    const GUILD: u64 = 1;
    const CHANNEL: u64 = 100;

    async fn setup() -> (Arc<TenpoBot>, Arc<RecordingPlatform>) {
        let store = Arc::new(MemoryStore::new());
        store
            .toggle_rule(Owner::Guild, GUILD, CHANNEL, Container::Channel, false)
            .await
            .unwrap();

        let classifier = Arc::new(Classifier::new(Dictionary::builtin(40.0).unwrap()).unwrap());
        let gate = Arc::new(Gate::new(store.clone(), classifier, Threshold::default(), Tier::Alphabetic));
        let platform = Arc::new(RecordingPlatform::default());
        let settings = ModerationSettings {
            default_reacts: vec!["🌱".to_string()],
            ..Default::default()
        };
        let moderator = Arc::new(Moderator::new(platform.clone(), store, settings));
        (Arc::new(TenpoBot::new(gate, moderator)), platform)
    }

    fn message(id: u64, content: &str) -> ChatMessage {
        ChatMessage::new(id, 42, GUILD, CHANNEL, content)
    }

    #[tokio::test]
    async fn test_toki_pona_is_left_alone() {
        let (bot, platform) = setup().await;
        assert_eq!(bot.handle_message(&message(1, "mi moku e kili")).await.unwrap(), None);
        assert!(platform.actions().is_empty());
    }

    #[tokio::test]
    async fn test_other_language_gets_react() {
        let (bot, platform) = setup().await;
        let outcome = bot.handle_message(&message(1, "hello there my friend")).await.unwrap();
        assert_eq!(outcome, Some(ModerationOutcome::Reacted("🌱".to_string())));
        assert_eq!(platform.actions(), vec!["react 🌱"]);
    }

    #[tokio::test]
    async fn test_unchecked_channel_is_ignored() {
        let (bot, platform) = setup().await;
        let elsewhere = ChatMessage::new(1, 42, GUILD, CHANNEL + 1, "hello there my friend");
        assert_eq!(bot.handle_message(&elsewhere).await.unwrap(), None);
        assert!(platform.actions().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_edit_transitions() {
        let (bot, platform) = setup().await;
        let valid = message(7, "mi moku e kili");
        let invalid = message(7, "i ate some fruit");

        // valid -> invalid
        let outcome = bot.handle_edit(Some(&valid), &invalid).await.unwrap();
        assert_eq!(outcome, EditOutcome::Responded(ModerationOutcome::Reacted("🌱".to_string())));

        // still invalid
        let worse = message(7, "i ate lots of fruit");
        assert_eq!(bot.handle_edit(Some(&invalid), &worse).await.unwrap(), EditOutcome::Unchanged);

        // invalid -> valid
        let outcome = bot.handle_edit(Some(&worse), &valid).await.unwrap();
        assert_eq!(outcome, EditOutcome::Unreacted("🌱".to_string()));
        assert_eq!(platform.actions(), vec!["react 🌱", "unreact 🌱"]);

        // identical content
        assert_eq!(bot.handle_edit(Some(&valid), &valid).await.unwrap(), EditOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_run_drains_until_closed() {
        let (bot, platform) = setup().await;
        let (tx, rx) = broadcast::channel(16);
        tx.send(PlatformEvent::MessageCreated(message(1, "hello there my friend"))).unwrap();
        tx.send(PlatformEvent::MessageCreated(message(2, "toki a"))).unwrap();
        tx.send(PlatformEvent::MessageEdited {
            before: None,
            after: message(3, "good morning everyone"),
        })
        .unwrap();
        drop(tx);

        bot.run(rx).await.unwrap();
        let mut actions = platform.actions();
        actions.sort();
        assert_eq!(actions, vec!["react 🌱", "react 🌱"]);
    }
}
