// src/rules/mod.rs - Decides whether a message gets judged at all

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::sync::Arc;

use crate::classifier::{CleanOptions, Classifier, Threshold, Tier};
use crate::store::{ConfigStore, EntityConfig};
use crate::types::{ChatMessage, Owner};

pub mod scope;
pub mod timing;

pub use scope::{Rule, RuleAction, RuleSet};
pub use timing::{EventTimer, EventZone, MeanLunarPhase, PhaseClock, Timing, TimingError};

/// Message-level preconditions: a human author, inside a guild, and an
/// ordinary message or reply
pub fn should_check(message: &ChatMessage) -> bool {
    !message.author_is_bot && message.guild_id.is_some() && message.kind.is_checkable()
}

/// Guild gate, evaluated against the guild's own settings
pub fn should_check_guild(
    message: &ChatMessage,
    guild_id: u64,
    config: &EntityConfig,
    now: DateTime<Utc>,
    clock: &dyn PhaseClock,
) -> bool {
    if config.disabled {
        debug!("Ignoring guild message; disabled");
        return false;
    }
    if config.is_sleeping(now) {
        debug!("Ignoring guild message; sleeping");
        return false;
    }
    match config.timing.is_active(now, clock) {
        Ok(true) => {}
        Ok(false) => {
            debug!("Ignoring guild message; not event time");
            return false;
        }
        Err(e) => {
            warn!("Guild {} has unusable timing: {}", guild_id, e);
            return false;
        }
    }
    if let Some(role) = config.role {
        if !message.has_role(role) {
            debug!("Ignoring guild message; user missing role");
            return false;
        }
    }
    if !config.rules.in_checked_channel(&message.location, guild_id) {
        debug!("Ignoring guild message; not in checked channel");
        return false;
    }
    true
}

/// User gate. Ignorable prefixes are a user setting, so they never stop a
/// guild that checks the channel.
pub fn should_check_user(message: &ChatMessage, guild_id: u64, config: &EntityConfig, now: DateTime<Utc>) -> bool {
    if config.disabled {
        debug!("Ignoring user message; disabled");
        return false;
    }
    if config.is_sleeping(now) {
        debug!("Ignoring user message; sleeping");
        return false;
    }
    if !config.rules.in_checked_channel(&message.location, guild_id) {
        debug!("Ignoring user message; not in configured channel");
        return false;
    }
    if config.startswith_ignorable(&message.content) {
        debug!("Ignoring user message; starts with ignorable");
        return false;
    }
    true
}

/// Combines the gates with the classifier
pub struct Gate {
    store: Arc<dyn ConfigStore>,
    classifier: Arc<Classifier>,
    clock: Arc<dyn PhaseClock>,
    threshold: Threshold,
    tier: Tier,
}

impl Gate {
    pub fn new(store: Arc<dyn ConfigStore>, classifier: Arc<Classifier>, threshold: Threshold, tier: Tier) -> Self {
        Self {
            store,
            classifier,
            clock: Arc::new(MeanLunarPhase),
            threshold,
            tier,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn PhaseClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn is_toki_pona(&self, content: &str, spoilers: bool) -> bool {
        let options = CleanOptions { strip_spoilers: !spoilers };
        self.classifier.check(content, self.threshold, self.tier, options)
    }

    pub async fn should_respond(&self, message: &ChatMessage) -> Result<bool> {
        self.should_respond_at(message, Utc::now()).await
    }

    /// True when a gate that applies finds the message is not toki pona.
    /// The guild is consulted first, then the author.
    pub async fn should_respond_at(&self, message: &ChatMessage, now: DateTime<Utc>) -> Result<bool> {
        if !should_check(message) {
            debug!("Ignoring message; preconditions failed");
            return Ok(false);
        }
        let Some(guild_id) = message.guild_id else {
            return Ok(false);
        };

        let guild = self.store.entity(Owner::Guild, guild_id).await?;
        if should_check_guild(message, guild_id, &guild, now, self.clock.as_ref())
            && !self.is_toki_pona(&message.content, guild.spoilers)
        {
            return Ok(true);
        }

        let user = self.store.entity(Owner::User, message.author_id).await?;
        if should_check_user(message, guild_id, &user, now) && !self.is_toki_pona(&message.content, user.spoilers) {
            return Ok(true);
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Dictionary;
    use crate::store::MemoryStore;
    use crate::types::{Container, MessageKind};
    use chrono::Duration;

    const GUILD: u64 = 1;
    const CHANNEL: u64 = 100;
    const AUTHOR: u64 = 42;

    struct FixedPhase(f64);

    impl PhaseClock for FixedPhase {
        fn phase_degrees(&self, _at: DateTime<Utc>) -> f64 {
            self.0
        }
    }

    fn gate(store: Arc<MemoryStore>) -> Gate {
        let dict = Dictionary::from_words(["toki", "pona", "li", "mi", "jan"]);
        let classifier = Arc::new(Classifier::new(dict).unwrap());
        Gate::new(store, classifier, Threshold::default(), Tier::Dictionary)
    }

    fn message(content: &str) -> ChatMessage {
        ChatMessage::new(7, AUTHOR, GUILD, CHANNEL, content)
    }

    #[test]
    fn test_preconditions() {
        let mut msg = message("hello");
        assert!(should_check(&msg));
        msg.author_is_bot = true;
        assert!(!should_check(&msg));

        let mut msg = message("hello");
        msg.guild_id = None;
        assert!(!should_check(&msg));

        let mut msg = message("hello");
        msg.kind = MessageKind::Pin;
        assert!(!should_check(&msg));
    }

    #[test_log::test(tokio::test)]
    async fn test_guild_rule_triggers_response() {
        let store = Arc::new(MemoryStore::new());
        store.toggle_rule(Owner::Guild, GUILD, CHANNEL, Container::Channel, false).await.unwrap();
        let gate = gate(store.clone());

        assert!(gate.should_respond(&message("hello there")).await.unwrap());
        assert!(!gate.should_respond(&message("toki pona li pona")).await.unwrap());
    }

    #[tokio::test]
    async fn test_nothing_configured_means_no_response() {
        let gate = gate(Arc::new(MemoryStore::new()));
        assert!(!gate.should_respond(&message("hello there")).await.unwrap());
    }

    #[tokio::test]
    async fn test_user_opt_in_and_ignorables() {
        let store = Arc::new(MemoryStore::new());
        let mut user = EntityConfig {
            opens: vec!["(".to_string()],
            ..Default::default()
        };
        user.rules.set_everywhere(true);
        store.save_entity(Owner::User, AUTHOR, user).await.unwrap();
        let gate = gate(store.clone());

        assert!(gate.should_respond(&message("hello there")).await.unwrap());
        assert!(!gate.should_respond(&message("( hello there friend")).await.unwrap());
    }

    #[tokio::test]
    async fn test_guild_ignores_user_prefixes() {
        let store = Arc::new(MemoryStore::new());
        store.toggle_rule(Owner::Guild, GUILD, GUILD, Container::Guild, false).await.unwrap();
        let user = EntityConfig {
            opens: vec!["(".to_string()],
            ..Default::default()
        };
        store.save_entity(Owner::User, AUTHOR, user).await.unwrap();
        let gate = gate(store.clone());

        // countable words after the prefix; only the user gate honours it
        assert!(gate.should_respond(&message("( hello there friend")).await.unwrap());
    }

    #[tokio::test]
    async fn test_guild_sleep_role_and_disable() {
        let store = Arc::new(MemoryStore::new());
        store.toggle_rule(Owner::Guild, GUILD, GUILD, Container::Guild, false).await.unwrap();
        let gate = gate(store.clone());
        let now = Utc::now();

        store.set_sleeping(Owner::Guild, GUILD, Some(now + Duration::minutes(5))).await.unwrap();
        assert!(!gate.should_respond_at(&message("hello"), now).await.unwrap());
        assert!(gate.should_respond_at(&message("hello"), now + Duration::minutes(10)).await.unwrap());
        store.set_sleeping(Owner::Guild, GUILD, None).await.unwrap();

        store.toggle_role(GUILD, 5).await.unwrap();
        assert!(!gate.should_respond(&message("hello")).await.unwrap());
        let mut with_role = message("hello");
        with_role.author_roles.push(5);
        assert!(gate.should_respond(&with_role).await.unwrap());

        store.set_disabled(Owner::Guild, GUILD, true).await.unwrap();
        assert!(!gate.should_respond(&with_role).await.unwrap());
    }

    #[tokio::test]
    async fn test_moon_timing_uses_clock() {
        let store = Arc::new(MemoryStore::new());
        store.toggle_rule(Owner::Guild, GUILD, GUILD, Container::Guild, false).await.unwrap();
        store.set_timing(GUILD, Timing::Moon).await.unwrap();

        let full = gate(store.clone()).with_clock(Arc::new(FixedPhase(181.0)));
        assert!(full.should_respond(&message("hello")).await.unwrap());
        let waxing = gate(store.clone()).with_clock(Arc::new(FixedPhase(90.0)));
        assert!(!waxing.should_respond(&message("hello")).await.unwrap());
    }

    #[tokio::test]
    async fn test_each_entity_uses_its_own_spoiler_setting() {
        let store = Arc::new(MemoryStore::new());
        store.toggle_rule(Owner::Guild, GUILD, GUILD, Container::Guild, false).await.unwrap();
        let gate = gate(store.clone());
        let msg = message("||hello|| toki pona");

        assert!(!gate.should_respond(&msg).await.unwrap());
        let guild = EntityConfig {
            spoilers: true,
            ..store.entity(Owner::Guild, GUILD).await.unwrap()
        };
        store.save_entity(Owner::Guild, GUILD, guild).await.unwrap();
        assert!(gate.should_respond(&msg).await.unwrap());
    }
}
