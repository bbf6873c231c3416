// src/rules/scope.rs - Where an entity wants messages checked

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::types::{ChannelPath, Container};

/// Allow or exempt one container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub container: Container,
    /// Exempts the container instead of checking it
    #[serde(default)]
    pub exception: bool,
}

/// What `toggle_rule` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleAction {
    Insert,
    Update,
    Delete,
}

/// One entity's rules, at most one per container id. An allow rule and an
/// exception for the same container cannot coexist; toggling one replaces
/// the other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    rules: HashMap<u64, Rule>,
    /// Check everywhere no scoped rule decides. Users set this to opt in
    /// across every guild at once.
    #[serde(default)]
    everywhere: bool,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<&Rule> {
        self.rules.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn everywhere(&self) -> bool {
        self.everywhere
    }

    pub fn set_everywhere(&mut self, everywhere: bool) {
        self.everywhere = everywhere;
    }

    /// Insert a missing rule, update one whose kind differs, delete an identical one
    pub fn toggle_rule(&mut self, id: u64, container: Container, exception: bool) -> RuleAction {
        let wanted = Rule { container, exception };
        match self.rules.get(&id) {
            None => {
                self.rules.insert(id, wanted);
                RuleAction::Insert
            }
            Some(existing) if *existing != wanted => {
                self.rules.insert(id, wanted);
                RuleAction::Update
            }
            Some(_) => {
                self.rules.remove(&id);
                RuleAction::Delete
            }
        }
    }

    /// Walk from the most specific container outward. The first container
    /// carrying a rule decides; an exception means "not checked".
    pub fn in_checked_channel(&self, path: &ChannelPath, guild_id: u64) -> bool {
        for container in Container::PRECEDENCE {
            let id = match container {
                Container::Thread => path.thread_id,
                Container::Channel => Some(path.channel_id),
                Container::Category => path.category_id,
                Container::Guild => Some(guild_id),
            };
            let Some(id) = id else { continue };
            if let Some(rule) = self.rules.get(&id).filter(|r| r.container == container) {
                return !rule.exception;
            }
        }
        self.everywhere
    }

    /// Container ids grouped by kind, split into allow rules and exceptions
    pub fn list(&self) -> (HashMap<Container, BTreeSet<u64>>, HashMap<Container, BTreeSet<u64>>) {
        let mut allowed: HashMap<Container, BTreeSet<u64>> = HashMap::new();
        let mut exempt: HashMap<Container, BTreeSet<u64>> = HashMap::new();
        for (id, rule) in &self.rules {
            let target = if rule.exception { &mut exempt } else { &mut allowed };
            target.entry(rule.container).or_default().insert(*id);
        }
        (allowed, exempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: u64 = 1;
    const CATEGORY: u64 = 10;
    const CHANNEL: u64 = 100;
    const THREAD: u64 = 1000;

    fn path(thread: Option<u64>) -> ChannelPath {
        ChannelPath {
            thread_id: thread,
            channel_id: CHANNEL,
            category_id: Some(CATEGORY),
        }
    }

    #[test]
    fn test_toggle_cycle() {
        let mut rules = RuleSet::new();
        assert_eq!(rules.toggle_rule(CHANNEL, Container::Channel, false), RuleAction::Insert);
        assert_eq!(rules.toggle_rule(CHANNEL, Container::Channel, true), RuleAction::Update);
        assert_eq!(rules.len(), 1);
        assert!(rules.get(CHANNEL).unwrap().exception);
        assert_eq!(rules.toggle_rule(CHANNEL, Container::Channel, true), RuleAction::Delete);
        assert!(rules.is_empty());
    }

    #[test]
    fn test_nothing_checked_without_rules() {
        let rules = RuleSet::new();
        assert!(!rules.in_checked_channel(&path(None), GUILD));
    }

    #[test]
    fn test_guild_rule_covers_everything() {
        let mut rules = RuleSet::new();
        rules.toggle_rule(GUILD, Container::Guild, false);
        assert!(rules.in_checked_channel(&path(None), GUILD));
        assert!(rules.in_checked_channel(&path(Some(THREAD)), GUILD));
        assert!(!rules.in_checked_channel(&path(None), 2));
    }

    #[test]
    fn test_specific_scope_wins() {
        let mut rules = RuleSet::new();
        rules.toggle_rule(GUILD, Container::Guild, false);
        rules.toggle_rule(CATEGORY, Container::Category, true);
        assert!(!rules.in_checked_channel(&path(None), GUILD));

        rules.toggle_rule(CHANNEL, Container::Channel, false);
        assert!(rules.in_checked_channel(&path(None), GUILD));

        rules.toggle_rule(THREAD, Container::Thread, true);
        assert!(!rules.in_checked_channel(&path(Some(THREAD)), GUILD));
        assert!(rules.in_checked_channel(&path(Some(THREAD + 1)), GUILD));
    }

    #[test]
    fn test_everywhere_is_the_last_resort() {
        let mut rules = RuleSet::new();
        rules.set_everywhere(true);
        assert!(rules.in_checked_channel(&path(None), GUILD));
        rules.toggle_rule(CHANNEL, Container::Channel, true);
        assert!(!rules.in_checked_channel(&path(None), GUILD));
    }

    #[test]
    fn test_rule_must_match_container_kind() {
        let mut rules = RuleSet::new();
        // an id stored as a category never matches the channel slot
        rules.toggle_rule(CHANNEL, Container::Category, false);
        assert!(!rules.in_checked_channel(&path(None), GUILD));
    }

    #[test]
    fn test_list_splits_exceptions() {
        let mut rules = RuleSet::new();
        rules.toggle_rule(GUILD, Container::Guild, false);
        rules.toggle_rule(CHANNEL, Container::Channel, true);
        let (allowed, exempt) = rules.list();
        assert!(allowed[&Container::Guild].contains(&GUILD));
        assert!(exempt[&Container::Channel].contains(&CHANNEL));
        assert!(!allowed.contains_key(&Container::Channel));
    }

    #[test]
    fn test_json_round_trip_keeps_numeric_keys() {
        let mut rules = RuleSet::new();
        rules.toggle_rule(CHANNEL, Container::Channel, false);
        rules.set_everywhere(true);
        let json = serde_json::to_string(&rules).unwrap();
        let back: RuleSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rules);
    }
}
