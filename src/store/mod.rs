// src/store/mod.rs - Per-guild and per-user settings

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

use crate::rules::scope::{RuleAction, RuleSet};
use crate::rules::timing::Timing;
use crate::types::{Container, Owner, ResponseStrategy};

/// Settings shared by guilds and users. Some fields only mean something for
/// one owner: `reacts`, `opens` and `response` for users, `role` and `timing`
/// for guilds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    pub disabled: bool,
    pub sleeping_until: Option<DateTime<Utc>>,
    /// Emoji to react with; empty means the configured defaults
    pub reacts: Vec<String>,
    /// Messages starting with any of these are never judged
    pub opens: Vec<String>,
    /// Only authors with this role are checked
    pub role: Option<u64>,
    pub rules: RuleSet,
    pub response: ResponseStrategy,
    pub timing: Timing,
    /// Judge spoiler text instead of skipping it
    pub spoilers: bool,
}

impl EntityConfig {
    pub fn is_sleeping(&self, now: DateTime<Utc>) -> bool {
        self.sleeping_until.map_or(false, |until| now < until)
    }

    pub fn startswith_ignorable(&self, content: &str) -> bool {
        self.opens
            .iter()
            .filter(|open| !open.is_empty())
            .any(|open| content.starts_with(open.as_str()))
    }
}

/// Outcome of replacing a react list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactUpdate {
    pub kept: Vec<String>,
    pub banned: Vec<String>,
}

/// In-place edit applied by `ConfigStore::update_entity`
pub type EntityUpdate<'a> = Box<dyn FnOnce(&mut EntityConfig) + Send + 'a>;

/// Persistence for entity settings. Reads go through `entity`; writes go
/// through `save_entity` or `update_entity`. The provided helpers are built on
/// `update_entity`, which implementations must apply atomically per entity so
/// concurrent message tasks never lose each other's edits.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Settings for an entity, defaults if it was never configured
    async fn entity(&self, owner: Owner, id: u64) -> Result<EntityConfig>;

    async fn save_entity(&self, owner: Owner, id: u64, config: EntityConfig) -> Result<()>;

    /// Read, edit and write back one entity with no other write in between
    async fn update_entity(&self, owner: Owner, id: u64, update: EntityUpdate<'_>) -> Result<()>;

    async fn toggle_rule(&self, owner: Owner, id: u64, target: u64, container: Container, exception: bool) -> Result<RuleAction> {
        let mut action = RuleAction::Insert;
        self.update_entity(
            owner,
            id,
            Box::new(|config| action = config.rules.toggle_rule(target, container, exception)),
        )
        .await?;
        debug!("{:?} rule for {:?} {} on {:?} {}", action, owner, id, container, target);
        Ok(action)
    }

    async fn set_everywhere(&self, owner: Owner, id: u64, everywhere: bool) -> Result<()> {
        self.update_entity(owner, id, Box::new(move |config| config.rules.set_everywhere(everywhere)))
            .await
    }

    /// Replace the react list, dropping anything in `banned`
    async fn set_reacts(&self, owner: Owner, id: u64, reacts: Vec<String>, banned: &[String]) -> Result<ReactUpdate> {
        let (refused, kept): (Vec<String>, Vec<String>) = reacts.into_iter().partition(|r| banned.contains(r));
        let stored = kept.clone();
        self.update_entity(owner, id, Box::new(move |config| config.reacts = stored))
            .await?;
        Ok(ReactUpdate { kept, banned: refused })
    }

    /// Drop one react, e.g. after the platform refused it
    async fn delete_react(&self, owner: Owner, id: u64, react: &str) -> Result<bool> {
        let mut removed = false;
        self.update_entity(
            owner,
            id,
            Box::new(|config| {
                let before = config.reacts.len();
                config.reacts.retain(|r| r != react);
                removed = config.reacts.len() != before;
            }),
        )
        .await?;
        Ok(removed)
    }

    /// Set the required role, or clear it when it is already set
    async fn toggle_role(&self, guild_id: u64, role: u64) -> Result<Option<u64>> {
        let mut current = None;
        self.update_entity(
            Owner::Guild,
            guild_id,
            Box::new(|config| {
                config.role = if config.role == Some(role) { None } else { Some(role) };
                current = config.role;
            }),
        )
        .await?;
        Ok(current)
    }

    async fn set_sleeping(&self, owner: Owner, id: u64, until: Option<DateTime<Utc>>) -> Result<()> {
        self.update_entity(owner, id, Box::new(move |config| config.sleeping_until = until))
            .await
    }

    async fn set_disabled(&self, owner: Owner, id: u64, disabled: bool) -> Result<()> {
        self.update_entity(owner, id, Box::new(move |config| config.disabled = disabled))
            .await
    }

    async fn set_timing(&self, guild_id: u64, timing: Timing) -> Result<()> {
        timing.validate().context("Refusing to store invalid timing")?;
        self.update_entity(Owner::Guild, guild_id, Box::new(move |config| config.timing = timing))
            .await
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    owner: Owner,
    id: u64,
    config: EntityConfig,
}

/// `ConfigStore` held in memory, optionally persisted as a JSON snapshot
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<(Owner, u64), EntityConfig>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot if one exists; the path is remembered for `save_snapshot`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entities = HashMap::new();

        if path.exists() {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read store snapshot: {}", path.display()))?;
            let entries: Vec<SnapshotEntry> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse store snapshot: {}", path.display()))?;
            for entry in entries {
                entities.insert((entry.owner, entry.id), entry.config);
            }
            info!("Loaded {} entities from {}", entities.len(), path.display());
        } else {
            warn!("Store snapshot not found, starting empty: {}", path.display());
        }

        Ok(Self {
            entities: RwLock::new(entities),
            snapshot_path: Some(path),
        })
    }

    pub async fn save_snapshot(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let mut entries: Vec<SnapshotEntry> = self
            .entities
            .read()
            .await
            .iter()
            .map(|((owner, id), config)| SnapshotEntry {
                owner: *owner,
                id: *id,
                config: config.clone(),
            })
            .collect();
        entries.sort_by_key(|e| (e.owner, e.id));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&entries).context("Failed to serialize store snapshot")?;
        fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write store snapshot: {}", path.display()))?;

        info!("Saved {} entities to {}", entries.len(), path.display());
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn entity(&self, owner: Owner, id: u64) -> Result<EntityConfig> {
        Ok(self.entities.read().await.get(&(owner, id)).cloned().unwrap_or_default())
    }

    async fn save_entity(&self, owner: Owner, id: u64, config: EntityConfig) -> Result<()> {
        let mut entities = self.entities.write().await;
        if config == EntityConfig::default() {
            entities.remove(&(owner, id));
        } else {
            entities.insert((owner, id), config);
        }
        Ok(())
    }

    async fn update_entity(&self, owner: Owner, id: u64, update: EntityUpdate<'_>) -> Result<()> {
        let mut entities = self.entities.write().await;
        let mut config = entities.remove(&(owner, id)).unwrap_or_default();
        update(&mut config);
        if config != EntityConfig::default() {
            entities.insert((owner, id), config);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_unknown_entity_gets_defaults() {
        let store = MemoryStore::new();
        let config = store.entity(Owner::User, 7).await.unwrap();
        assert_eq!(config, EntityConfig::default());
        assert_eq!(config.response, ResponseStrategy::React);
        assert_eq!(config.timing, Timing::Always);
    }

    #[tokio::test]
    async fn test_toggle_rule_through_store() {
        let store = MemoryStore::new();
        let action = store.toggle_rule(Owner::Guild, 1, 100, Container::Channel, false).await.unwrap();
        assert_eq!(action, RuleAction::Insert);
        assert_eq!(store.len().await, 1);
        let action = store.toggle_rule(Owner::Guild, 1, 100, Container::Channel, false).await.unwrap();
        assert_eq!(action, RuleAction::Delete);
        // back to defaults, nothing left to keep
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_banned_reacts_filtered() {
        let store = MemoryStore::new();
        let banned = vec!["🖕".to_string()];
        let update = store
            .set_reacts(Owner::User, 3, vec!["🌵".to_string(), "🖕".to_string()], &banned)
            .await
            .unwrap();
        assert_eq!(update.kept, vec!["🌵"]);
        assert_eq!(update.banned, vec!["🖕"]);
        assert_eq!(store.entity(Owner::User, 3).await.unwrap().reacts, vec!["🌵"]);

        assert!(store.delete_react(Owner::User, 3, "🌵").await.unwrap());
        assert!(!store.delete_react(Owner::User, 3, "🌵").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_react_deletes_are_not_lost() {
        let reacts: Vec<String> = (0..16).map(|i| format!("r{}", i)).collect();
        for _ in 0..50 {
            let store = Arc::new(MemoryStore::new());
            store.set_reacts(Owner::User, 1, reacts.clone(), &[]).await.unwrap();

            let mut tasks = Vec::new();
            for react in reacts.clone() {
                let store = Arc::clone(&store);
                tasks.push(tokio::spawn(async move {
                    store.delete_react(Owner::User, 1, &react).await.unwrap()
                }));
            }
            for task in tasks {
                assert!(task.await.unwrap());
            }
            assert!(store.entity(Owner::User, 1).await.unwrap().reacts.is_empty());
        }
    }

    #[tokio::test]
    async fn test_everywhere_flag() {
        let store = MemoryStore::new();
        store.set_everywhere(Owner::User, 4, true).await.unwrap();
        assert!(store.entity(Owner::User, 4).await.unwrap().rules.everywhere());
        store.set_everywhere(Owner::User, 4, false).await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_role_toggles() {
        let store = MemoryStore::new();
        assert_eq!(store.toggle_role(1, 55).await.unwrap(), Some(55));
        assert_eq!(store.toggle_role(1, 66).await.unwrap(), Some(66));
        assert_eq!(store.toggle_role(1, 66).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_timing_rejected() {
        let store = MemoryStore::new();
        let bad = Timing::Cron {
            cron: "not cron".to_string(),
            timezone: "UTC".to_string(),
            length: "1h".to_string(),
        };
        assert!(store.set_timing(1, bad).await.is_err());
        assert!(store.set_timing(1, Timing::Moon).await.is_ok());
    }

    #[test]
    fn test_sleep_and_ignorables() {
        let now = Utc::now();
        let config = EntityConfig {
            sleeping_until: Some(now + Duration::hours(1)),
            opens: vec!["".to_string(), "(".to_string(), "en:".to_string()],
            ..Default::default()
        };
        assert!(config.is_sleeping(now));
        assert!(!config.is_sleeping(now + Duration::hours(2)));
        assert!(config.startswith_ignorable("(english aside)"));
        assert!(config.startswith_ignorable("en: hello"));
        assert!(!config.startswith_ignorable("toki"));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("tenpo.json");

        let store = MemoryStore::open(&path).await.unwrap();
        store.set_disabled(Owner::User, 9, true).await.unwrap();
        store.toggle_rule(Owner::Guild, 1, 1, Container::Guild, false).await.unwrap();
        store.save_snapshot().await.unwrap();

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        assert!(reopened.entity(Owner::User, 9).await.unwrap().disabled);
        assert!(reopened.entity(Owner::Guild, 1).await.unwrap().rules.get(1).is_some());
    }
}
